use std::{collections::HashSet, sync::Arc, time::Duration};

use alloy::primitives::{Address, B256, U256};
use tokio_test::{assert_err, assert_ok};
use tradelog_crawler::{
    Deployment,
    assembler::EventAssembler,
    crawler::{Crawler, CrawlerConfig, PollOutcome},
    decoder::DecoderRegistry,
    error::{CrawlError, ErrorKind},
    registry::ReserveRegistry,
    store::{MemoryStore, TradeStore, WindowBatch},
    testing::{self, MockChain},
    types::{BlockWindow, CrawlRecord},
};

fn config() -> CrawlerConfig {
    CrawlerConfig {
        confirmation_lag: 2,
        max_window_size: 10,
        retry: testing::fast_policy(),
        poll_interval: Duration::from_millis(1),
        ..CrawlerConfig::new(Deployment::new(vec![testing::CONTRACT], 1))
    }
}

async fn crawler(chain: &Arc<MockChain>, store: MemoryStore) -> Crawler<MockChain, MemoryStore> {
    assert_ok!(Crawler::new(chain.clone(), store, config()).await)
}

/// Stored records in chain order.
fn chain_ordered(store: &MemoryStore) -> Vec<CrawlRecord> {
    let mut records = store.records().cloned().collect::<Vec<_>>();
    records.sort_by_key(|r| (r.block_number(), r.key().log_index));
    records
}

/// Fee, trade and reserve registration emitted by one transaction.
#[tokio::test]
async fn test_end_to_end_window() {
    let chain = Arc::new(MockChain::new(100));
    chain.insert_receipt(testing::tx(1), testing::receipt(21_000, 50_000_000_000));
    chain.insert_timestamp(5, 1_700_000_005);
    chain.push_logs([
        testing::fee_log(5, 0, testing::tx(1), 10),
        testing::trade_log(5, 1, testing::tx(1), testing::trade(1, 2, 100)),
        testing::reserve_added_log(5, 2, testing::tx(1), 1, Address::with_last_byte(0xee)),
    ]);
    let mut crawler = crawler(&chain, MemoryStore::new()).await;

    assert_eq!(
        assert_ok!(crawler.poll_once().await),
        PollOutcome::Committed {
            window: BlockWindow::new(1, 10),
            records: 3
        }
    );

    let records = chain_ordered(crawler.store());
    assert_eq!(records.len(), 3);
    let CrawlRecord::FeeDistribution(fee) = &records[0] else {
        panic!("unexpected record {:?}", records[0]);
    };
    assert_eq!(fee.event().platform_fee, U256::from(10));

    let CrawlRecord::Trade(trade) = &records[1] else {
        panic!("unexpected record {:?}", records[1]);
    };
    assert_eq!(trade.trade.src_token, testing::token(1));
    assert_eq!(trade.trade.dst_token, testing::token(2));
    assert_eq!(trade.trade.eth_amount, U256::from(100));
    assert_eq!(trade.timestamp, 1_700_000_005);
    assert_eq!(trade.sender, testing::SENDER);
    assert_eq!(trade.transaction_fee, U256::from(1_050_000_000_000_000u64));

    let CrawlRecord::ReserveRegistration(registration) = &records[2] else {
        panic!("unexpected record {:?}", records[2]);
    };
    assert_eq!(registration.event().reserve_id, testing::reserve_id(1));

    assert_eq!(
        crawler.store().registry().reserve_address(&testing::reserve_id(1)),
        Some(testing::reserve_address(1))
    );
    assert_eq!(crawler.registry(), crawler.store().registry());
    assert_eq!(crawler.checkpoint(), 10);
}

#[tokio::test]
async fn test_reprocessed_window_is_idempotent() {
    let chain = Arc::new(MockChain::new(100));
    let mut logs = Vec::new();
    for i in 1..=4u8 {
        let block = u64::from(i) * 2;
        chain.insert_receipt(testing::tx(i), testing::receipt(21_000, u128::from(i)));
        chain.insert_timestamp(block, block * 12);
        logs.push(testing::fee_log(block, 0, testing::tx(i), 10));
        logs.push(testing::trade_log(block, 1, testing::tx(i), testing::trade(1, 2, 5)));
    }
    let assembler = EventAssembler::new(
        chain.clone(),
        DecoderRegistry::katalyst(),
        testing::fast_policy(),
    );
    let window = BlockWindow::new(1, 10);
    let registry = ReserveRegistry::new();

    let mut once = MemoryStore::new();
    let mut twice = MemoryStore::new();
    for store in [&mut once, &mut twice] {
        let assembled = assert_ok!(assembler.assemble(&registry, &logs).await);
        let batch = WindowBatch {
            window,
            records: assembled.records,
            registry: assembled.registry,
        };
        assert_ok!(store.commit_window(&batch).await);
    }
    let assembled = assert_ok!(assembler.assemble(&registry, &logs).await);
    let batch = WindowBatch {
        window,
        records: assembled.records,
        registry: assembled.registry,
    };
    assert_ok!(twice.commit_window(&batch).await);

    assert_eq!(once.len(), 8);
    assert_eq!(
        once.records().collect::<Vec<_>>(),
        twice.records().collect::<Vec<_>>()
    );
}

#[tokio::test]
async fn test_records_follow_chain_order_across_split_queries() {
    let chain = Arc::new(MockChain::new(100));
    // Forces bisection of every multi-block window
    chain.set_max_logs_per_query(3);
    for i in 1..=9u8 {
        let block = u64::from(i);
        chain.insert_receipt(testing::tx(i), testing::receipt(21_000, 1));
        chain.insert_timestamp(block, block);
        chain.push_logs([
            testing::trade_log(block, 0, testing::tx(i), testing::trade(1, 2, u64::from(i))),
            testing::fee_log(block, 1, testing::tx(i), u64::from(i)),
        ]);
    }
    let mut crawler = crawler(&chain, MemoryStore::new()).await;

    assert_ok!(crawler.poll_once().await);
    let positions = chain_ordered(crawler.store())
        .iter()
        .map(|r| (r.block_number(), r.key().log_index))
        .collect::<Vec<_>>();
    let expected = (1..=9u64)
        .flat_map(|b| [(b, 0), (b, 1)])
        .collect::<Vec<_>>();
    assert_eq!(positions, expected);
    assert!(chain.log_calls() > 1);

    let trades = crawler.store().trades();
    assert_eq!(trades.len(), 9);
    assert!(
        trades
            .iter()
            .zip(1u64..)
            .all(|(t, i)| t.trade.eth_amount == U256::from(i))
    );
}

#[tokio::test]
async fn test_removed_logs_are_never_stored() {
    let chain = Arc::new(MockChain::new(100));
    chain.insert_receipt(testing::tx(1), testing::receipt(21_000, 1));
    chain.insert_receipt(testing::tx(2), testing::receipt(21_000, 1));
    chain.insert_timestamp(3, 30);
    chain.insert_timestamp(4, 40);
    chain.push_logs([
        testing::trade_log(3, 0, testing::tx(1), testing::trade(1, 2, 1)),
        testing::reserve_added_log(3, 1, testing::tx(1), 9, Address::ZERO),
        testing::trade_log(4, 0, testing::tx(2), testing::trade(1, 2, 2)),
    ]);
    chain.remove_block_logs(3);
    let mut crawler = crawler(&chain, MemoryStore::new()).await;

    assert_ok!(crawler.poll_once().await);
    assert_eq!(crawler.store().len(), 1);
    assert!(crawler.store().records().all(|r| r.block_number() == 4));
    assert!(crawler.registry().get(&testing::reserve_id(9)).is_none());
    assert_eq!(chain.receipt_calls(), 1);
}

#[tokio::test]
async fn test_reorg_replacement_at_same_position_is_stored() {
    let chain = Arc::new(MockChain::new(100));
    chain.insert_receipt(testing::tx(2), testing::receipt(21_000, 1));
    chain.insert_timestamp(5, 50);
    let mut tombstone = testing::trade_log(5, 0, testing::tx(1), testing::trade(1, 2, 1));
    tombstone.removed = true;
    chain.push_logs([
        tombstone,
        testing::trade_log(5, 0, testing::tx(2), testing::trade(1, 2, 2)),
    ]);
    let mut crawler = crawler(&chain, MemoryStore::new()).await;

    assert_ok!(crawler.poll_once().await);
    let trades = crawler.store().trades();
    assert_eq!(trades.len(), 1);
    assert_eq!(trades[0].tx_hash, testing::tx(2));
    assert_eq!(trades[0].trade.eth_amount, U256::from(2));
    assert_eq!(crawler.checkpoint(), 10);
}

#[tokio::test]
async fn test_unknown_topic_rejects_whole_window() {
    let chain = Arc::new(MockChain::new(100));
    chain.insert_receipt(testing::tx(1), testing::receipt(21_000, 1));
    chain.insert_timestamp(2, 20);
    let mut unknown = testing::fee_log(6, 0, testing::tx(2), 1);
    unknown.topics[0] = B256::with_last_byte(0x42);
    chain.push_logs([
        testing::fee_log(2, 0, testing::tx(1), 10),
        testing::trade_log(2, 1, testing::tx(1), testing::trade(1, 2, 100)),
        testing::reserve_added_log(2, 2, testing::tx(1), 1, Address::ZERO),
        unknown,
    ]);
    chain.ignore_topic_filter();
    let mut crawler = crawler(&chain, MemoryStore::new()).await;

    let err = assert_err!(crawler.poll_once().await);
    assert!(matches!(
        err,
        CrawlError::UnknownEventTopic { topic: Some(t), .. } if t == B256::with_last_byte(0x42)
    ));
    assert_eq!(err.kind(), ErrorKind::Schema);
    assert!(crawler.store().is_empty());
    assert_eq!(crawler.store().checkpoint(), None);
    assert_eq!(crawler.checkpoint(), 0);
    assert!(crawler.registry().is_empty());
    assert_eq!(chain.receipt_calls(), 0);
}

#[tokio::test]
async fn test_single_flight_block_timestamp() {
    let chain = Arc::new(MockChain::new(100));
    chain.set_call_latency(Duration::from_millis(5));
    chain.insert_timestamp(7, 1_234);
    let mut logs = Vec::new();
    for i in 1..=5u8 {
        chain.insert_receipt(testing::tx(i), testing::receipt(21_000, 1));
        logs.push(testing::trade_log(7, u64::from(i), testing::tx(i), testing::trade(1, 2, 1)));
    }
    chain.push_logs(logs);
    let mut crawler = crawler(&chain, MemoryStore::new()).await;

    assert_ok!(crawler.poll_once().await);
    assert_eq!(crawler.store().trades().len(), 5);
    assert!(crawler.store().trades().iter().all(|t| t.timestamp == 1_234));
    assert_eq!(chain.timestamp_calls(), 1);
    assert_eq!(chain.receipt_calls(), 5);
}

#[tokio::test]
async fn test_failed_commit_keeps_checkpoint() {
    let chain = Arc::new(MockChain::new(100));
    chain.insert_receipt(testing::tx(1), testing::receipt(21_000, 1));
    chain.insert_timestamp(4, 40);
    chain.push_logs([
        testing::trade_log(4, 0, testing::tx(1), testing::trade(1, 2, 1)),
        testing::reserve_added_log(4, 1, testing::tx(1), 3, Address::ZERO),
    ]);
    let mut store = MemoryStore::new();
    store.fail_next_commits(1);
    let mut crawler = crawler(&chain, store).await;

    let err = assert_err!(crawler.poll_once().await);
    assert_eq!(err.kind(), ErrorKind::Persistence);
    assert_eq!(crawler.checkpoint(), 0);
    assert!(crawler.registry().is_empty());
    assert!(crawler.store().is_empty());

    // Same window again
    assert_eq!(
        assert_ok!(crawler.poll_once().await),
        PollOutcome::Committed {
            window: BlockWindow::new(1, 10),
            records: 2
        }
    );
    assert_eq!(crawler.store().len(), 2);
    assert_eq!(crawler.registry().len(), 1);
}

#[tokio::test]
async fn test_transient_failures_do_not_fail_window() {
    let chain = Arc::new(MockChain::new(100));
    chain.insert_receipt(testing::tx(1), testing::receipt(21_000, 1));
    chain.insert_timestamp(4, 40);
    chain.push_logs([testing::trade_log(4, 0, testing::tx(1), testing::trade(1, 2, 1))]);
    let mut crawler = crawler(&chain, MemoryStore::new()).await;

    chain.fail_next_calls(2);
    assert_ok!(crawler.poll_once().await);
    assert_eq!(crawler.store().trades().len(), 1);
    assert_eq!(chain.head_calls(), 3);
}

#[tokio::test]
async fn test_resume_with_registry_snapshot() {
    let excluded = testing::reserve_address(1);
    let chain = Arc::new(MockChain::new(14));
    chain.insert_receipt(testing::tx(2), testing::receipt(21_000, 1));
    chain.insert_timestamp(15, 150);
    chain.push_logs([
        testing::reserve_added_log(3, 0, testing::tx(1), 1, Address::ZERO),
        testing::trade_log(15, 0, testing::tx(2), testing::trade(1, 2, 1)),
    ]);
    let config = CrawlerConfig {
        volume_excluded: HashSet::from([excluded]),
        ..config()
    };

    let mut first = assert_ok!(Crawler::new(chain.clone(), MemoryStore::new(), config.clone()).await);
    assert_ok!(first.poll_once().await);
    assert_eq!(
        assert_ok!(first.poll_once().await),
        PollOutcome::Committed {
            window: BlockWindow::new(11, 12),
            records: 0
        }
    );
    assert_eq!(assert_ok!(first.poll_once().await), PollOutcome::Idle { head: 14 });
    let store = first.into_store();
    assert_eq!(store.checkpoint(), Some(12));

    chain.set_head(30);
    let mut second = assert_ok!(Crawler::new(chain.clone(), store, config).await);
    assert_eq!(second.checkpoint(), 12);
    assert_eq!(
        assert_ok!(second.poll_once().await),
        PollOutcome::Committed {
            window: BlockWindow::new(13, 22),
            records: 1
        }
    );
    // Reserve registered before the restart still resolves
    let trades = second.store().trades();
    assert_eq!(trades.len(), 1);
    assert!(trades[0].volume_excluded);
}

#[tokio::test]
async fn test_run_stops_on_failed_transaction() {
    let chain = Arc::new(MockChain::new(100));
    let mut receipt = testing::receipt(21_000, 1);
    receipt.status = false;
    chain.insert_receipt(testing::tx(1), receipt);
    chain.insert_timestamp(4, 40);
    chain.push_logs([testing::trade_log(4, 0, testing::tx(1), testing::trade(1, 2, 1))]);
    let mut crawler = crawler(&chain, MemoryStore::new()).await;

    let err = assert_err!(crawler.run().await);
    assert!(matches!(err, CrawlError::FailedTransaction(tx) if tx == testing::tx(1)));
    assert_eq!(err.kind(), ErrorKind::Consistency);
    assert_eq!(crawler.checkpoint(), 0);
}
