//! End-to-end tail runs against an in-memory cluster.

mod common;

use std::collections::BTreeMap;
use std::time::Duration;

use chronik_tail::{CancellationToken, Record, TailConfig, TailError, TailSession, TimeoutConfig};
use common::FakeCluster;

fn config(tail: u64) -> TailConfig {
    TailConfig::new("orders", "alice")
        .with_tail_count(tail)
        .with_timeouts(TimeoutConfig {
            dial_timeout_secs: 1,
            read_timeout_secs: 1,
            group_join_timeout_secs: 1,
            coordination_timeout_secs: 1,
        })
}

fn candidates(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

fn session(
    cluster: &FakeCluster,
    config: TailConfig,
    brokers: &[&str],
) -> TailSession<common::FakeDialer, common::FakeGroups, common::FakeReaders> {
    TailSession::new(
        config,
        candidates(brokers),
        cluster.dialer(),
        cluster.groups(),
        cluster.readers(),
    )
    .unwrap()
}

fn first_offset_per_partition(records: &[Record]) -> BTreeMap<i32, i64> {
    let mut first = BTreeMap::new();
    for record in records {
        first.entry(record.partition).or_insert(record.offset);
    }
    first
}

#[tokio::test]
async fn test_reader_starts_at_committed_offsets() {
    let cluster = FakeCluster::with_partitions(&[(0, 50), (1, 70), (2, 60)]);
    let session = session(&cluster, config(10), &["a:9092"]);

    let mut sink = Vec::new();
    let summary = session.run(&mut sink, &CancellationToken::new()).await.unwrap();

    assert_eq!(summary.plan.start_offset(0), Some(40));
    assert_eq!(summary.plan.start_offset(1), Some(60));
    assert_eq!(summary.plan.start_offset(2), Some(50));

    assert_eq!(sink.len(), 10);
    assert_eq!(summary.cursor.emitted, 10);
    assert_eq!(
        first_offset_per_partition(&sink),
        BTreeMap::from([(0, 40), (1, 60), (2, 50)])
    );
}

#[tokio::test]
async fn test_pinning_generation_leaves_before_reader_opens() {
    let cluster = FakeCluster::with_partitions(&[(0, 5), (1, 5)]);
    let session = session(&cluster, config(4), &["a:9092"]);
    let group = session.group_id();

    session.run(&mut Vec::new(), &CancellationToken::new()).await.unwrap();

    assert_eq!(
        cluster.events(),
        vec![
            format!("pin-join {}", group),
            format!("pin-leave {}", group),
            format!("read-open {}", group),
            format!("read-close {}", group),
        ]
    );
    assert_eq!(cluster.max_concurrent_members(), 1);
}

#[tokio::test]
async fn test_partition_failure_commits_nothing() {
    let cluster = FakeCluster::with_partitions(&[(0, 50), (1, 70), (2, 60)]);
    cluster.fail_partition(1);
    let session = session(&cluster, config(10), &["a:9092"]);
    let group = session.group_id();

    let err = session.run(&mut Vec::new(), &CancellationToken::new()).await.unwrap_err();

    assert!(matches!(err, TailError::PartitionFetchFailed { partition: 1, .. }));
    assert!(cluster.committed(&group).is_empty());
    assert!(cluster.events().is_empty());
}

#[tokio::test]
async fn test_dial_trial_stops_at_first_reachable_broker() {
    let cluster = FakeCluster::with_partitions(&[(0, 5)]);
    cluster.mark_unreachable("a:9092");
    cluster.mark_unreachable("b:9092");
    let session = session(&cluster, config(1), &["a:9092", "b:9092", "c:9092", "d:9092"]);

    session.run(&mut Vec::new(), &CancellationToken::new()).await.unwrap();

    assert_eq!(cluster.dialed(), vec!["a:9092", "b:9092", "c:9092"]);
}

#[tokio::test]
async fn test_short_topic_emits_available_records_and_stops() {
    let cluster = FakeCluster::with_partitions(&[(0, 2), (1, 1)]);
    let session = session(&cluster, config(20), &["a:9092"]);

    let mut sink = Vec::new();
    let summary = session.run(&mut sink, &CancellationToken::new()).await.unwrap();

    assert!(summary.plan.is_clamped());
    assert_eq!(sink.len(), 3);
}

#[tokio::test]
async fn test_zero_tail_follow_reads_only_new_records() {
    let cluster = FakeCluster::with_partitions(&[(0, 10)]);
    let session = session(&cluster, config(0).with_follow(true), &["a:9092"]);
    let cancel = CancellationToken::new();

    let producer = cluster.clone();
    let trigger = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        producer.append(0);
        producer.append(0);
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.cancel();
    });

    let mut sink = Vec::new();
    let summary = session.run(&mut sink, &cancel).await.unwrap();

    assert_eq!(sink.iter().map(|r| r.offset).collect::<Vec<_>>(), vec![10, 11]);
    assert!(summary.cursor.cancelled);
    assert!(cluster
        .events()
        .last()
        .is_some_and(|e| e.starts_with("read-close")));

    // Nothing is emitted once cancelled.
    cluster.append(0);
    assert_eq!(sink.len(), 2);
}

#[tokio::test]
async fn test_repeated_runs_reuse_group_and_repin() {
    let cluster = FakeCluster::with_partitions(&[(0, 30)]);
    let first = session(&cluster, config(5), &["a:9092"]);
    first.run(&mut Vec::new(), &CancellationToken::new()).await.unwrap();

    for _ in 0..10 {
        cluster.append(0);
    }

    let second = session(&cluster, config(5), &["a:9092"]);
    assert_eq!(first.group_id(), second.group_id());

    let mut sink = Vec::new();
    second.run(&mut sink, &CancellationToken::new()).await.unwrap();
    assert_eq!(sink.first().map(|r| r.offset), Some(35));
}

#[tokio::test]
async fn test_unknown_topic_is_reported() {
    let cluster = FakeCluster::with_partitions(&[(0, 1)]);
    let config = TailConfig::new("payments", "alice");
    let session = session(&cluster, config, &["a:9092"]);

    let err = session.run(&mut Vec::new(), &CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, TailError::TopicNotFound(ref t) if t == "payments"));
}
