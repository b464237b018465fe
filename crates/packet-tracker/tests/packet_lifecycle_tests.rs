// Integration tests for the packet lifecycle: ingest, relay candidates and finalization
use packet_tracker::chains::{ChainEvent, FixedConnectionResolver};
use packet_tracker::events::{ChannelOrdering, PacketEvent, PacketInfo};
use packet_tracker::relay::{ChainTip, Coin, CounterpartyFeeFilter, FeeFilter, PacketFilter};
use packet_tracker::store::{FeeLedger, FeeType, PacketKey, PacketStore, PacketTable, StoreStats};
use packet_tracker::{PacketTracker, TrackerError};

const NOW: u64 = 1_700_000_000_000_000_000;

/// Helper function to create a resolver knowing both ends of connection-7 / connection-12
fn create_test_resolver() -> FixedConnectionResolver {
    FixedConnectionResolver::new()
        .with_connection("chain-a", "connection-7", "chain-b", "connection-12")
        .with_connection("chain-b", "connection-12", "chain-a", "connection-7")
}

fn create_test_tracker() -> PacketTracker<FixedConnectionResolver> {
    let store = PacketStore::open_in_memory().unwrap();
    PacketTracker::new(store, create_test_resolver()).unwrap()
}

/// Packet seq `sequence` sent from chain-a channel-3 to chain-b channel-9
fn create_test_packet(sequence: u64, connection_id: &str, height: &str, timestamp: &str) -> PacketInfo {
    PacketInfo {
        height: 120,
        sequence,
        src_port: "transfer".to_string(),
        src_channel: "channel-3".to_string(),
        dst_port: "transfer".to_string(),
        dst_channel: "channel-9".to_string(),
        connection_id: connection_id.to_string(),
        ordering: ChannelOrdering::Unordered,
        data: br#"{"amount":"100","denom":"uatom"}"#.to_vec(),
        timeout_height_raw: height.to_string(),
        timeout_timestamp_raw: timestamp.to_string(),
        ack: Vec::new(),
    }
}

fn from_chain_a() -> Vec<CounterpartyFeeFilter> {
    vec![CounterpartyFeeFilter::unfiltered("chain-a")]
}

fn chain_b() -> Vec<String> {
    vec!["chain-b".to_string()]
}

#[tokio::test]
async fn test_send_visible_until_timeout_height() {
    let tracker = create_test_tracker();
    tracker
        .ingest("chain-a", &[PacketEvent::SendPacket(create_test_packet(42, "connection-7", "0-1000", "0"))])
        .await
        .unwrap();

    let all = PacketFilter::all();
    let candidates = tracker
        .send_candidates("chain-b", ChainTip::new(500, NOW), &from_chain_a(), &all)
        .unwrap();
    assert_eq!(candidates.len(), 1);
    let packet = &candidates[0];
    assert_eq!(packet.sequence, 42);
    assert_eq!(packet.src_channel_id, "channel-3");
    assert_eq!(packet.dst_channel_id, "channel-9");
    assert_eq!(packet.dst_connection_id, "connection-12");
    assert_eq!(packet.timeout.height_raw, "0-1000");

    assert!(tracker
        .send_candidates("chain-b", ChainTip::new(1001, NOW), &from_chain_a(), &all)
        .unwrap()
        .is_empty());

    // the timeout mirror only becomes a candidate once the height has passed
    let no_fee = FeeFilter::default();
    assert!(tracker
        .timeout_candidates("chain-a", ChainTip::new(500, NOW), &chain_b(), &no_fee, &all)
        .unwrap()
        .is_empty());
    let timeouts = tracker
        .timeout_candidates("chain-a", ChainTip::new(1001, NOW), &chain_b(), &no_fee, &all)
        .unwrap();
    assert_eq!(timeouts.len(), 1);
    assert_eq!(timeouts[0].src_connection_id, "connection-7");

    println!("✅ Send packet visible at 500, timed out at 1001");
}

#[tokio::test]
async fn test_acknowledge_clears_everything() {
    let tracker = create_test_tracker();
    let fees = tracker.store().fee_ledger();
    for fee_type in FeeType::ALL {
        fees.add("chain-a", "channel-3", 42, fee_type, "uatom", 10).unwrap();
    }

    tracker
        .ingest("chain-a", &[PacketEvent::SendPacket(create_test_packet(42, "connection-7", "0-1000", "0"))])
        .await
        .unwrap();
    let mut ack = create_test_packet(42, "connection-12", "0-1000", "0");
    ack.ack = br#"{"result":"AQ=="}"#.to_vec();
    tracker.ingest("chain-b", &[PacketEvent::WriteAcknowledgement(ack)]).await.unwrap();
    tracker
        .ingest("chain-a", &[PacketEvent::AcknowledgePacket(create_test_packet(42, "connection-7", "0-1000", "0"))])
        .await
        .unwrap();

    let all = PacketFilter::all();
    let no_fee = FeeFilter::default();
    assert!(tracker
        .send_candidates("chain-b", ChainTip::new(500, NOW), &from_chain_a(), &all)
        .unwrap()
        .is_empty());
    assert!(tracker
        .timeout_candidates("chain-a", ChainTip::new(5000, NOW), &chain_b(), &no_fee, &all)
        .unwrap()
        .is_empty());
    assert!(tracker
        .write_ack_candidates("chain-a", &chain_b(), &no_fee, &all)
        .unwrap()
        .is_empty());

    for fee_type in FeeType::ALL {
        assert_eq!(fees.amount_for("chain-a", "channel-3", 42, fee_type, "uatom").unwrap(), 0);
    }
    assert_eq!(tracker.stats().unwrap(), StoreStats::default());

    println!("✅ Acknowledge removed all records and fees");
}

#[tokio::test]
async fn test_write_ack_moves_packet_to_origin() {
    let tracker = create_test_tracker();
    let fees = tracker.store().fee_ledger();
    fees.add("chain-a", "channel-3", 42, FeeType::Recv, "uatom", 10).unwrap();
    fees.add("chain-a", "channel-3", 42, FeeType::Ack, "uatom", 20).unwrap();
    fees.add("chain-a", "channel-3", 42, FeeType::Timeout, "uatom", 30).unwrap();

    tracker
        .ingest("chain-a", &[PacketEvent::SendPacket(create_test_packet(42, "connection-7", "0-1000", "0"))])
        .await
        .unwrap();
    let mut ack = create_test_packet(42, "connection-12", "0-1000", "0");
    ack.ack = vec![0x0a, 0x01, 0x01];
    tracker.ingest("chain-b", &[PacketEvent::WriteAcknowledgement(ack)]).await.unwrap();

    let stats = tracker.stats().unwrap();
    assert_eq!(stats.send_pending, 0);
    assert_eq!(stats.write_ack_pending, 1);
    // the timeout mirror stays until the acknowledgement lands on the origin
    assert_eq!(stats.timeout_pending, 1);

    let acks = tracker
        .write_ack_candidates("chain-a", &chain_b(), &FeeFilter::default(), &PacketFilter::all())
        .unwrap();
    assert_eq!(acks.len(), 1);
    assert_eq!(acks[0].ack, vec![0x0a, 0x01, 0x01]);
    assert_eq!(acks[0].key(), PacketKey::new("chain-a", "connection-7", "channel-3", 42));

    assert_eq!(fees.amount_for("chain-a", "channel-3", 42, FeeType::Recv, "uatom").unwrap(), 0);
    assert_eq!(fees.amount_for("chain-a", "channel-3", 42, FeeType::Timeout, "uatom").unwrap(), 0);
    assert_eq!(fees.amount_for("chain-a", "channel-3", 42, FeeType::Ack, "uatom").unwrap(), 20);

    println!("✅ Write acknowledgement queued for the origin chain");
}

#[tokio::test]
async fn test_timeout_event_keeps_unrelated_write_ack() {
    let tracker = create_test_tracker();
    tracker
        .ingest(
            "chain-a",
            &[
                PacketEvent::SendPacket(create_test_packet(1, "connection-7", "0-1000", "0")),
                PacketEvent::SendPacket(create_test_packet(2, "connection-7", "0-1000", "0")),
            ],
        )
        .await
        .unwrap();
    tracker
        .ingest("chain-b", &[PacketEvent::WriteAcknowledgement(create_test_packet(2, "connection-12", "0-1000", "0"))])
        .await
        .unwrap();
    tracker
        .ingest("chain-a", &[PacketEvent::TimeoutPacket(create_test_packet(1, "connection-7", "0-1000", "0"))])
        .await
        .unwrap();

    let store = tracker.store();
    assert!(store
        .get_packet(PacketTable::Timeout, &PacketKey::new("chain-a", "connection-7", "channel-3", 1))
        .unwrap()
        .is_none());
    assert!(store
        .get_packet(PacketTable::Send, &PacketKey::new("chain-b", "connection-12", "channel-9", 1))
        .unwrap()
        .is_none());
    assert!(store
        .get_write_ack(&PacketKey::new("chain-a", "connection-7", "channel-3", 2))
        .unwrap()
        .is_some());
}

#[tokio::test]
async fn test_unset_timeout_never_times_out() {
    let tracker = create_test_tracker();
    tracker
        .ingest("chain-a", &[PacketEvent::SendPacket(create_test_packet(7, "connection-7", "0-0", "0"))])
        .await
        .unwrap();

    let candidates = tracker
        .timeout_candidates(
            "chain-a",
            ChainTip::new(u64::MAX, u64::MAX),
            &chain_b(),
            &FeeFilter::default(),
            &PacketFilter::all(),
        )
        .unwrap();
    assert!(candidates.is_empty());
}

#[tokio::test]
async fn test_timestamp_only_timeout() {
    let tracker = create_test_tracker();
    let deadline = NOW + 60_000_000_000;
    tracker
        .ingest(
            "chain-a",
            &[PacketEvent::SendPacket(create_test_packet(8, "connection-7", "", &deadline.to_string()))],
        )
        .await
        .unwrap();

    let all = PacketFilter::all();
    let no_fee = FeeFilter::default();
    assert_eq!(
        tracker
            .send_candidates("chain-b", ChainTip::new(1_000_000, NOW), &from_chain_a(), &all)
            .unwrap()
            .len(),
        1
    );
    assert!(tracker
        .timeout_candidates("chain-a", ChainTip::new(1_000_000, NOW), &chain_b(), &no_fee, &all)
        .unwrap()
        .is_empty());
    assert_eq!(
        tracker
            .timeout_candidates("chain-a", ChainTip::new(1, deadline + 1), &chain_b(), &no_fee, &all)
            .unwrap()
            .len(),
        1
    );
}

#[tokio::test]
async fn test_fee_minimum_is_monotonic() {
    let tracker = create_test_tracker();
    tracker
        .ingest("chain-a", &[PacketEvent::SendPacket(create_test_packet(42, "connection-7", "0-1000", "0"))])
        .await
        .unwrap();
    tracker
        .store()
        .fee_ledger()
        .add("chain-a", "channel-3", 42, FeeType::Recv, "uatom", 100)
        .unwrap();

    let visible = |minimums: Vec<Coin>| {
        let filter = CounterpartyFeeFilter::new(
            "chain-a",
            FeeFilter {
                recv_fee: minimums,
                ..FeeFilter::default()
            },
        );
        tracker
            .send_candidates("chain-b", ChainTip::new(500, NOW), &[filter], &PacketFilter::all())
            .unwrap()
            .len()
    };

    assert_eq!(visible(vec![]), 1);
    assert_eq!(visible(vec![Coin::new("uatom", 50)]), 1);
    assert_eq!(visible(vec![Coin::new("uatom", 100)]), 1);
    assert_eq!(visible(vec![Coin::new("uatom", 101)]), 0);
    assert_eq!(visible(vec![Coin::new("uosmo", 1)]), 0);
    assert_eq!(visible(vec![Coin::new("uosmo", 1), Coin::new("uatom", 100)]), 1);
}

#[tokio::test]
async fn test_fee_minimum_above_sql_integer_range() {
    let tracker = create_test_tracker();
    tracker
        .ingest("chain-a", &[PacketEvent::SendPacket(create_test_packet(42, "connection-7", "0-1000", "0"))])
        .await
        .unwrap();
    // 9.3 tokens of an 18-decimal denom, already beyond i64::MAX
    tracker
        .store()
        .fee_ledger()
        .add("chain-a", "channel-3", 42, FeeType::Recv, "aevmos", 9_300_000_000_000_000_000)
        .unwrap();

    let visible = |minimum: u128| {
        let filter = CounterpartyFeeFilter::new(
            "chain-a",
            FeeFilter {
                recv_fee: vec![Coin::new("aevmos", minimum)],
                ..FeeFilter::default()
            },
        );
        tracker
            .send_candidates("chain-b", ChainTip::new(500, NOW), &[filter], &PacketFilter::all())
            .unwrap()
            .len()
    };

    assert_eq!(visible(10_000_000_000_000_000_000), 0);
    assert_eq!(visible(9_300_000_000_000_000_001), 0);
    assert_eq!(visible(9_300_000_000_000_000_000), 1);
    assert_eq!(visible(900_000_000_000_000_000), 1);

    println!("✅ Fee minimums compare exactly beyond 64-bit integers");
}

#[tokio::test]
async fn test_reingest_is_idempotent() {
    let tracker = create_test_tracker();
    let events = vec![PacketEvent::SendPacket(create_test_packet(42, "connection-7", "0-1000", "0"))];

    let first = tracker.ingest("chain-a", &events).await.unwrap();
    assert_eq!(first.inserted, 2);
    let second = tracker.ingest("chain-a", &events).await.unwrap();
    assert_eq!(second.inserted, 0);
    assert_eq!(tracker.stats().unwrap().send_pending, 1);
}

#[tokio::test]
async fn test_resolution_failure_writes_nothing() {
    let tracker = create_test_tracker();
    let events = vec![
        PacketEvent::SendPacket(create_test_packet(1, "connection-7", "0-1000", "0")),
        PacketEvent::SendPacket(create_test_packet(2, "connection-99", "0-1000", "0")),
    ];

    let err = tracker.ingest("chain-a", &events).await.unwrap_err();
    assert!(matches!(err, TrackerError::Resolution(ref e) if e.connection_id == "connection-99"));
    assert_eq!(tracker.stats().unwrap(), StoreStats::default());
    #[cfg(feature = "metrics")]
    assert_eq!(tracker.metrics().unwrap().resolution_errors.get(), 1);
}

#[tokio::test]
async fn test_startup_reset_clears_all_claims() {
    let tracker = create_test_tracker();
    tracker
        .ingest(
            "chain-a",
            &[
                PacketEvent::SendPacket(create_test_packet(1, "connection-7", "0-1000", "0")),
                PacketEvent::SendPacket(create_test_packet(2, "connection-7", "0-1000", "0")),
            ],
        )
        .await
        .unwrap();
    tracker
        .ingest("chain-b", &[PacketEvent::WriteAcknowledgement(create_test_packet(2, "connection-12", "0-1000", "0"))])
        .await
        .unwrap();

    let send_key = PacketKey::new("chain-b", "connection-12", "channel-9", 1);
    let timeout_key = PacketKey::new("chain-a", "connection-7", "channel-3", 1);
    let ack_key = PacketKey::new("chain-a", "connection-7", "channel-3", 2);
    assert!(tracker.claim(PacketTable::Send, &send_key).unwrap());
    assert!(tracker.claim(PacketTable::Timeout, &timeout_key).unwrap());
    assert!(tracker.claim(PacketTable::WriteAck, &ack_key).unwrap());
    assert_eq!(tracker.stats().unwrap().claimed, 3);

    assert_eq!(tracker.startup_reset().unwrap(), 3);
    assert_eq!(tracker.stats().unwrap().claimed, 0);
    assert!(tracker.claim(PacketTable::Send, &send_key).unwrap());
}

#[tokio::test]
async fn test_ingest_raw_chain_events() {
    let tracker = create_test_tracker();
    let attributes = [
        ("packet_sequence", "42"),
        ("packet_src_port", "transfer"),
        ("packet_src_channel", "channel-3"),
        ("packet_dst_port", "transfer"),
        ("packet_dst_channel", "channel-9"),
        ("packet_channel_ordering", "ORDER_UNORDERED"),
        ("packet_connection", "connection-7"),
        ("packet_data_hex", "7b7d"),
        ("packet_timeout_height", "1-1000"),
        ("packet_timeout_timestamp", "0"),
    ];
    let raw = vec![
        ChainEvent {
            event_type: "message".to_string(),
            attributes: vec![("action".to_string(), "transfer".to_string())],
            height: 120,
            tx_hash: None,
        },
        ChainEvent {
            event_type: "send_packet".to_string(),
            attributes: attributes.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
            height: 120,
            tx_hash: Some("ABCDEF".to_string()),
        },
    ];

    let summary = tracker.ingest_chain_events("chain-a", &raw).await.unwrap();
    assert_eq!(summary.inserted, 2);

    let packet = tracker
        .store()
        .get_packet(PacketTable::Send, &PacketKey::new("chain-b", "connection-12", "channel-9", 42))
        .unwrap()
        .unwrap();
    assert_eq!(packet.packet_data, b"{}".to_vec());
    assert_eq!(packet.timeout.height, 1000);
    assert_eq!(packet.height, 120);
}

#[tokio::test]
async fn test_complete_then_confirming_event() {
    let tracker = create_test_tracker();
    tracker
        .ingest("chain-a", &[PacketEvent::SendPacket(create_test_packet(42, "connection-7", "0-1000", "0"))])
        .await
        .unwrap();

    let candidates = tracker
        .send_candidates("chain-b", ChainTip::new(500, NOW), &from_chain_a(), &PacketFilter::all())
        .unwrap();
    let claimed = tracker.claim_all(PacketTable::Send, candidates).unwrap();
    assert_eq!(claimed.len(), 1);

    let keys: Vec<_> = claimed.iter().map(|r| r.key(PacketTable::Send)).collect();
    assert_eq!(tracker.complete(PacketTable::Send, &keys).unwrap(), 1);

    // the write-ack observed later finds the send record already gone
    let summary = tracker
        .ingest("chain-b", &[PacketEvent::WriteAcknowledgement(create_test_packet(42, "connection-12", "0-1000", "0"))])
        .await
        .unwrap();
    assert_eq!(summary.deleted, 0);
    assert_eq!(summary.inserted, 1);
}
