use std::fs::OpenOptions;
use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use tracing::warn;

use account::{create_account, Account};
use types::config::EnvironmentConfig;
use types::Address;

use crate::RunArgs;

/// Defaults, then the config file, then command line overrides.
pub(crate) fn setup_environment(args: &RunArgs) -> Result<Arc<EnvironmentConfig>> {
    let mut config = EnvironmentConfig::default();

    if let Some(datadir) = &args.datadir {
        config.datadir = datadir.clone();
    }

    if let Some(config_file_path) = &args.config_file {
        let config_file = OpenOptions::new()
            .read(true)
            .open(config_file_path.as_path())?;
        config = serde_json::from_reader(config_file)?;
    } else {
        let res: Result<EnvironmentConfig> = OpenOptions::new()
            .read(true)
            .open(config.datadir.join("config.json"))
            .map_err(|e| anyhow::anyhow!("{}", e))
            .and_then(|config_file| {
                serde_json::from_reader(config_file).map_err(|e| anyhow::anyhow!("{}", e))
            });

        match res {
            Ok(c) => {
                config = c;
            }
            Err(error) => {
                warn!(error = ?error, "failed to read config file, reverting to application default");
            }
        }
    }

    if let Some(datadir) = &args.datadir {
        config.datadir = datadir.clone();
    }

    if !args.peer.is_empty() {
        config.peers = args.peer.clone();
    }

    if let Some(p2p_host) = &args.p2p_host {
        config.p2p_host = p2p_host.clone()
    }

    if let Some(rpc_host) = &args.rpc_host {
        config.rpc_host = rpc_host.clone()
    }

    if let Some(p2p_port) = args.p2p_port {
        config.p2p_port = p2p_port
    }

    if let Some(rpc_port) = args.rpc_port {
        config.rpc_port = rpc_port
    }

    if let Some(operator_key) = &args.operator_key {
        config.operator_key = Some(operator_key.clone())
    }

    if let Some(operator) = args.operator {
        config.operator = Some(operator)
    }

    if let Some(block_interval) = args.block_interval {
        config.block_interval = Some(block_interval)
    }

    if !args.unlock.is_empty() {
        config.unlocked_keys = args.unlock.clone();
    }

    if let Some(log_level) = args.log_level {
        config.log_level = log_level.as_str().to_string()
    }

    config.sanitize();

    Ok(Arc::new(config))
}

/// Operator account held by this node and the address every header must be
/// signed by.
///
/// A node started with neither an operator address nor a key runs a fresh
/// single-operator chain with a generated key.
pub(crate) fn resolve_operator(config: &EnvironmentConfig) -> Result<(Option<Account>, Address)> {
    let account = config
        .operator_key
        .as_deref()
        .map(Account::from_secret_hex)
        .transpose()?;
    match (account, config.operator) {
        (Some(account), Some(operator)) => {
            if account.address != operator {
                bail!(
                    "operator key belongs to {:?}, configured operator is {:?}",
                    account.address,
                    operator
                );
            }
            Ok((Some(account), operator))
        }
        (Some(account), None) => {
            let operator = account.address;
            Ok((Some(account), operator))
        }
        (None, Some(operator)) => Ok((None, operator)),
        (None, None) => {
            let account = create_account();
            let operator = account.address;
            warn!(operator = ?operator, "No operator configured, generated a new operator key");
            Ok((Some(account), operator))
        }
    }
}

/// Accounts handed to the signing oracle at startup.
pub(crate) fn unlocked_accounts(config: &EnvironmentConfig) -> Result<Vec<Account>> {
    config
        .unlocked_keys
        .iter()
        .map(|secret| {
            Account::from_secret_hex(secret)
                .map_err(|error| anyhow!("invalid unlocked key: {}", error))
        })
        .collect()
}
