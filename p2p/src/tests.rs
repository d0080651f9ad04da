use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver};

use account::{account_from_seed, Account};
use blockchain::{ChainState, DevRootChain};
use traits::ExitGame;
use types::block::Block;
use types::tx::{Transaction, TxOutput};
use types::utxo::UtxoKey;

use crate::message::{MessageKind, NodeToPeerMessage, PeerMessage, PeerTarget};
use crate::peer_manager::PeerList;
use crate::sync::{SyncOutcome, SyncService};
use crate::{start_dispatcher, Network};

struct Operator {
    account: Account,
    root: Arc<DevRootChain>,
    chain: Arc<ChainState>,
}

fn operator() -> Operator {
    let account = account_from_seed(1);
    let root = Arc::new(DevRootChain::new(Some(account.clone())));
    let chain = Arc::new(ChainState::new(root.clone(), account.address, true));
    Operator {
        account,
        root,
        chain,
    }
}

fn follower(operator: &Account) -> (Arc<ChainState>, SyncService, UnboundedReceiver<NodeToPeerMessage>) {
    let chain = Arc::new(ChainState::new(
        Arc::new(DevRootChain::new(None)),
        operator.address,
        false,
    ));
    let (sender, receiver) = unbounded_channel();
    let sync = SyncService::new(chain.clone(), sender);
    (chain, sync, receiver)
}

fn drain(receiver: &mut UnboundedReceiver<NodeToPeerMessage>) -> Vec<NodeToPeerMessage> {
    let mut out = Vec::new();
    while let Ok(msg) = receiver.try_recv() {
        out.push(msg);
    }
    out
}

fn owned(chain: &ChainState) -> Vec<Block> {
    chain.blocks().iter().map(|block| block.as_ref().clone()).collect()
}

#[tokio::test]
async fn test_single_block_extension() {
    let a = operator();
    let block = a.chain.assemble_block().await.unwrap();
    let (b, sync, mut outbox) = follower(&a.account);

    let outcome = sync
        .reconcile(7, vec![block.as_ref().clone()])
        .await
        .unwrap();
    assert_eq!(outcome, SyncOutcome::Appended);
    assert_eq!(b.head(), block);

    let sent = drain(&mut outbox);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, PeerTarget::All);
    assert_eq!(sent[0].message.kind(), Some(MessageKind::ResponseChain));
    assert_eq!(sent[0].message.blocks().unwrap(), vec![block.as_ref().clone()]);
    assert!(sent
        .iter()
        .all(|msg| msg.message.kind() != Some(MessageKind::QueryAll)));
}

#[tokio::test]
async fn test_lagging_peer_requests_full_chain() {
    let a = operator();
    a.chain.assemble_block().await.unwrap();
    let head = a.chain.assemble_block().await.unwrap();
    let (b, sync, mut outbox) = follower(&a.account);

    let outcome = sync
        .handle_remote_message(3, PeerMessage::response_chain([head.as_ref()]))
        .await;
    assert!(outcome.is_ok());
    let sent = drain(&mut outbox);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, PeerTarget::Peer(3));
    assert_eq!(sent[0].message, PeerMessage::query_all());
    assert_eq!(b.height(), 0);

    let outcome = sync.reconcile(3, owned(&a.chain)).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Replaced);
    assert_eq!(b.head(), head);
    assert_eq!(drain(&mut outbox)[0].target, PeerTarget::All);
}

#[tokio::test]
async fn test_shorter_chain_is_ignored() {
    let a = operator();
    let (b, sync, mut outbox) = follower(&a.account);
    let outcome = sync.reconcile(1, owned(&a.chain)).await.unwrap();
    assert_eq!(outcome, SyncOutcome::Ignored);
    assert_eq!(sync.reconcile(1, vec![]).await.unwrap(), SyncOutcome::Ignored);
    assert!(drain(&mut outbox).is_empty());
    assert_eq!(b.height(), 0);
}

#[tokio::test]
async fn test_answers_queries_to_sender_only() {
    let a = operator();
    a.chain.assemble_block().await.unwrap();
    let (sender, mut outbox) = unbounded_channel();
    let sync = SyncService::new(a.chain.clone(), sender);

    sync.handle_remote_message(5, PeerMessage::query_latest())
        .await
        .unwrap();
    sync.handle_remote_message(5, PeerMessage::query_all())
        .await
        .unwrap();
    let sent = drain(&mut outbox);
    assert_eq!(sent.len(), 2);
    assert!(sent.iter().all(|msg| msg.target == PeerTarget::Peer(5)));
    assert_eq!(sent[0].message.blocks().unwrap().len(), 1);
    assert_eq!(sent[1].message.blocks().unwrap(), owned(&a.chain));
}

#[tokio::test]
async fn test_transaction_is_flooded_once() {
    let a = operator();
    let x = account_from_seed(2);
    a.root.deposit(x.address, 10).await.unwrap();
    a.chain.assemble_block().await.unwrap();
    let (sender, mut outbox) = unbounded_channel();
    let sync = SyncService::new(a.chain.clone(), sender);

    let mut tx = Transaction::new(
        &[UtxoKey::new(1, 0, 0)],
        &[TxOutput::new(account_from_seed(3).address, 10)],
        0,
    )
    .unwrap();
    let signature = x.sign(&tx.sig_message()).unwrap();
    tx.set_signature(0, signature);
    let msg = PeerMessage::response_transaction(&tx);

    sync.handle_remote_message(4, msg.clone()).await.unwrap();
    sync.handle_remote_message(6, msg.clone()).await.unwrap();
    assert_eq!(a.chain.pool(), vec![tx]);

    let sent = drain(&mut outbox);
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].target, PeerTarget::AllExcept(4));
    assert_eq!(sent[0].message, msg);
}

#[tokio::test]
async fn test_invalid_transaction_is_not_flooded() {
    let a = operator();
    let (sender, mut outbox) = unbounded_channel();
    let sync = SyncService::new(a.chain.clone(), sender);
    let tx = Transaction::new(
        &[UtxoKey::new(1, 0, 0)],
        &[TxOutput::new(account_from_seed(3).address, 10)],
        0,
    )
    .unwrap();
    assert!(sync
        .handle_remote_message(4, PeerMessage::response_transaction(&tx))
        .await
        .is_err());
    assert!(drain(&mut outbox).is_empty());
    assert!(a.chain.pool().is_empty());
}

#[tokio::test]
async fn test_peers_sync_over_tcp() {
    let a = operator();
    a.chain.assemble_block().await.unwrap();

    let (a_sender, a_receiver) = unbounded_channel();
    let a_network = Network::new(
        Arc::new(SyncService::new(a.chain.clone(), a_sender)),
        Arc::new(PeerList::new()),
    );
    start_dispatcher(a_network.peers(), a_receiver);
    let address = a_network.listen("127.0.0.1:0").await.unwrap();

    let b = Arc::new(ChainState::new(
        Arc::new(DevRootChain::new(None)),
        a.account.address,
        false,
    ));
    let (b_sender, b_receiver) = unbounded_channel();
    let b_network = Network::new(
        Arc::new(SyncService::new(b.clone(), b_sender)),
        Arc::new(PeerList::new()),
    );
    start_dispatcher(b_network.peers(), b_receiver);
    b_network.connect(&address.to_string()).await.unwrap();

    for _ in 0..100 {
        if b.height() == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(b.head(), a.chain.head());
    assert_eq!(b_network.peers().len(), 1);
}
