//! Longest-valid-chain replication scenario, driven over real TCP
//! sockets: a node with a short chain dials a peer with a strictly longer
//! valid chain and adopts it, but ignores one that was tampered with
//! before delivery so it no longer verifies.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;

use govchain::{EntryType, Ledger, LedgerEntry, ReplicationNode};

fn donor_chain_of_length(blocks: u64) -> Ledger {
    let mut ledger = Ledger::new(1_700_000_000, 1);
    for i in 0..blocks - 1 {
        ledger.add_entry(LedgerEntry::new_system(
            EntryType::Register,
            serde_json::json!({"seq": i}),
            1_700_000_000 + i,
        ));
        ledger.commit_block(1_700_000_001 + i).unwrap();
    }
    ledger
}

async fn spawn_listener(node: Arc<ReplicationNode>) {
    tokio::spawn(async move {
        let _ = node.listen().await;
    });
    // give the listener a moment to bind before anyone dials it
    tokio::time::sleep(Duration::from_millis(50)).await;
}

#[tokio::test]
async fn node_adopts_a_strictly_longer_valid_chain_from_a_dialed_peer() {
    let donor_ledger = Arc::new(Mutex::new(donor_chain_of_length(4)));
    let donor = ReplicationNode::new("node-b".to_string(), 19_485, donor_ledger.clone());
    spawn_listener(donor.clone()).await;

    let local = Arc::new(Mutex::new(Ledger::new(1_700_000_000, 1)));
    let node_a = ReplicationNode::new("node-a".to_string(), 19_486, local.clone());
    assert_eq!(local.lock().await.block_count(), 1);

    node_a.connect_to_peer("127.0.0.1:19485").await.expect("dial peer");
    tokio::time::sleep(Duration::from_millis(200)).await;

    let updated = local.lock().await;
    assert_eq!(updated.block_count(), 4);
    assert!(updated.verify_chain().is_ok());

    let registered = updated.get_entries_by_type(EntryType::Register);
    assert_eq!(registered.len(), 3);
    for entry in registered {
        assert!(updated.get_entry(&entry.id).is_some());
    }
}

#[tokio::test]
async fn node_ignores_a_chain_that_was_tampered_with_before_delivery() {
    let mut value = donor_chain_of_length(4).to_json();
    value["chain"][1]["entries"][0]["payload"] = serde_json::json!({"seq": "tampered"});
    let tampered = Ledger::from_json(value).unwrap();

    let donor_ledger = Arc::new(Mutex::new(tampered));
    let donor = ReplicationNode::new("node-b".to_string(), 19_487, donor_ledger.clone());
    spawn_listener(donor.clone()).await;

    let local = Arc::new(Mutex::new(Ledger::new(1_700_000_000, 1)));
    let node_a = ReplicationNode::new("node-a".to_string(), 19_488, local.clone());

    node_a.connect_to_peer("127.0.0.1:19487").await.expect("dial peer");
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(local.lock().await.block_count(), 1);
}
