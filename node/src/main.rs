use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use serde_json::json;

use types::Address;

mod environment;
mod node;

#[derive(Parser, Debug)]
#[clap(name = "plasma", author, version, about = "Plasma child chain node", long_about = None)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start a node
    Run(RunArgs),
    /// Print a fresh secret key and its address
    Keygen,
}

#[derive(Args, Debug, Default)]
pub(crate) struct RunArgs {
    #[clap(long)]
    pub config_file: Option<PathBuf>,
    #[clap(long)]
    pub datadir: Option<PathBuf>,
    #[clap(long)]
    pub p2p_host: Option<String>,
    #[clap(long, env = "P2P_PORT")]
    pub p2p_port: Option<u16>,
    #[clap(long)]
    pub rpc_host: Option<String>,
    #[clap(long, env = "HTTP_PORT")]
    pub rpc_port: Option<u16>,
    /// Peer to dial on startup, repeatable
    #[clap(long, env = "PEERS", use_value_delimiter = true)]
    pub peer: Vec<String>,
    /// Hex secret of the operator; the node assembles blocks when set
    #[clap(long)]
    pub operator_key: Option<String>,
    #[clap(long, value_parser = parse_address)]
    pub operator: Option<Address>,
    /// Seconds between automatic block assembly
    #[clap(long)]
    pub block_interval: Option<u64>,
    /// Hex secret of an account the node signs transactions for, repeatable
    #[clap(long = "unlock")]
    pub unlock: Vec<String>,
    #[clap(long, value_enum)]
    pub log_level: Option<Level>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Level {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl Level {
    pub(crate) fn as_str(&self) -> &'static str {
        match self {
            Level::Trace => "trace",
            Level::Debug => "debug",
            Level::Info => "info",
            Level::Warn => "warn",
            Level::Error => "error",
        }
    }
}

pub(crate) fn parse_address(s: &str) -> Result<Address, String> {
    Address::from_str(s.trim().trim_start_matches("0x")).map_err(|e| format!("{}", e))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match &cli.command {
        Commands::Run(args) => node::run(args),
        Commands::Keygen => {
            let account = account::create_account();
            let out = json!({
                "address": account.address,
                "secret": account.secret_hex(),
            });
            println!("{}", serde_json::to_string_pretty(&out)?);
            Ok(())
        }
    }
}
