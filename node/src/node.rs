use std::fs::File;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{info, warn, Level};
use tracing_subscriber::fmt::writer::MakeWriterExt;

use blockchain::{ChainState, DevRootChain};
use p2p::message::{NodeToPeerMessage, PeerMessage, PeerTarget};
use p2p::peer_manager::PeerList;
use p2p::sync::SyncService;
use p2p::{start_dispatcher, Network};
use rpc::start_rpc_server;
use types::config::EnvironmentConfig;
use types::events::LocalEventMessage;

use crate::environment::{resolve_operator, setup_environment, unlocked_accounts};
use crate::RunArgs;

fn broadcast_message(sender: &UnboundedSender<NodeToPeerMessage>, message: PeerMessage) {
    if sender
        .send(NodeToPeerMessage::new(PeerTarget::All, message))
        .is_err()
    {
        warn!("Peer dispatcher stopped, message dropped");
    }
}

pub(crate) fn run(args: &RunArgs) -> Result<()> {
    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(async { _start_node(args).await })
}

fn setup_logging(env: &EnvironmentConfig) -> Result<()> {
    std::fs::create_dir_all(&env.datadir)?;
    let log_level = Level::from_str(&env.log_level)?;
    let debug_log = Arc::new(File::create(env.datadir.join("debug.log"))?);

    let mk_writer = std::io::stderr.with_max_level(Level::ERROR).or_else(
        std::io::stdout
            .with_max_level(log_level)
            .and(debug_log.with_max_level(Level::DEBUG)),
    );

    tracing_subscriber::fmt()
        .with_max_level(Level::TRACE)
        .with_writer(mk_writer)
        .init();
    Ok(())
}

/// Assembles a block every `interval` and announces it.
fn start_block_timer(
    chain: Arc<ChainState>,
    interval: Duration,
    local_sender: UnboundedSender<LocalEventMessage>,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.tick().await;
        loop {
            ticker.tick().await;
            match chain.assemble_block().await {
                Ok(block) => {
                    if local_sender
                        .send(LocalEventMessage::MinedBlock(block))
                        .is_err()
                    {
                        break;
                    }
                }
                Err(error) => {
                    warn!(error = %format!("{:#}", error), "Scheduled block assembly failed");
                }
            }
        }
    });
}

async fn _start_node(args: &RunArgs) -> Result<()> {
    let env = setup_environment(args)?;
    setup_logging(&env)?;

    let (operator_account, operator) = resolve_operator(&env)?;
    let is_operator = operator_account.is_some();
    info!(operator = ?operator, is_operator, datadir = ?env.datadir, "Starting node");

    // Communications
    let (local_sender, mut local_receiver) = tokio::sync::mpsc::unbounded_channel();
    let (node_to_peer_sender, node_to_peer_receiver) = tokio::sync::mpsc::unbounded_channel();

    let root_chain = Arc::new(DevRootChain::new(operator_account));
    for account in unlocked_accounts(&env)? {
        let address = root_chain.unlock(account);
        info!(address = ?address, "Account unlocked for signing");
    }
    let chain = Arc::new(ChainState::new(root_chain.clone(), operator, is_operator));

    let sync_service = Arc::new(SyncService::new(chain.clone(), node_to_peer_sender.clone()));
    let peers = Arc::new(PeerList::new());
    let network = Network::new(sync_service, peers.clone());
    start_dispatcher(peers, node_to_peer_receiver);

    network.listen(&env.p2p_address()).await?;
    let connected = network.connect_all(&env.peers).await;
    info!(connected, configured = env.peers.len(), "Dialed configured peers");

    start_rpc_server(
        env.clone(),
        chain.clone(),
        root_chain.clone(),
        local_sender.clone(),
    )
    .await?;

    match env.block_interval {
        Some(secs) if is_operator => {
            start_block_timer(chain.clone(), Duration::from_secs(secs), local_sender.clone());
        }
        Some(_) => {
            warn!("Block interval ignored, node does not hold the operator key");
        }
        None => {}
    }

    while let Some(event) = local_receiver.recv().await {
        match event {
            LocalEventMessage::MinedBlock(block) => {
                broadcast_message(
                    &node_to_peer_sender,
                    PeerMessage::response_chain(std::iter::once(block.as_ref())),
                );
            }
            LocalEventMessage::BroadcastTx(tx) => {
                broadcast_message(&node_to_peer_sender, PeerMessage::response_transaction(&tx));
            }
            LocalEventMessage::AddPeer(address) => {
                let network = network.clone();
                tokio::spawn(async move {
                    match network.connect(&address).await {
                        Ok(peer_id) => info!(peer_id, peer = %address, "Peer added"),
                        Err(error) => {
                            warn!(peer = %address, error = %error, "Failed to add peer")
                        }
                    }
                });
            }
        }
    }
    Ok(())
}
