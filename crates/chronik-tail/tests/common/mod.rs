//! In-memory cluster shared by the integration tests.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chronik_tail::client::{
    BrokerConnection, BrokerDialer, GroupClient, GroupGeneration, PartitionConnection,
    PartitionInfo, ReaderClient, RecordStream,
};
use chronik_tail::{ClientError, Record, Watermarks};

#[derive(Default)]
struct State {
    logs: BTreeMap<i32, Vec<Vec<u8>>>,
    committed: HashMap<(String, i32), i64>,
    unreachable: HashSet<String>,
    failing_partitions: HashSet<i32>,
    dialed: Vec<String>,
    events: Vec<String>,
    members: HashMap<String, usize>,
    max_members: usize,
}

impl State {
    fn enter(&mut self, group_id: &str, event: String) {
        let count = self.members.entry(group_id.to_string()).or_default();
        *count += 1;
        self.max_members = self.max_members.max(*count);
        self.events.push(event);
    }

    fn exit(&mut self, group_id: &str, event: String) {
        if let Some(count) = self.members.get_mut(group_id) {
            *count = count.saturating_sub(1);
        }
        self.events.push(event);
    }
}

/// A single-topic cluster with one log per partition.
#[derive(Clone, Default)]
pub struct FakeCluster {
    state: Arc<Mutex<State>>,
}

impl FakeCluster {
    /// Partition `p` holds `count` records valued `"{p}-{offset}"`.
    pub fn with_partitions(counts: &[(i32, i64)]) -> Self {
        let cluster = Self::default();
        for &(partition, count) in counts {
            for _ in 0..count {
                cluster.append(partition);
            }
        }
        cluster
    }

    pub fn append(&self, partition: i32) {
        let mut state = self.state.lock().unwrap();
        let log = state.logs.entry(partition).or_default();
        let offset = log.len();
        log.push(format!("{}-{}", partition, offset).into_bytes());
    }

    pub fn mark_unreachable(&self, address: &str) {
        self.state.lock().unwrap().unreachable.insert(address.to_string());
    }

    pub fn fail_partition(&self, partition: i32) {
        self.state.lock().unwrap().failing_partitions.insert(partition);
    }

    pub fn commit(&self, group_id: &str, partition: i32, offset: i64) {
        self.state
            .lock()
            .unwrap()
            .committed
            .insert((group_id.to_string(), partition), offset);
    }

    pub fn committed(&self, group_id: &str) -> BTreeMap<i32, i64> {
        self.state
            .lock()
            .unwrap()
            .committed
            .iter()
            .filter(|((g, _), _)| g == group_id)
            .map(|((_, p), o)| (*p, *o))
            .collect()
    }

    pub fn dialed(&self) -> Vec<String> {
        self.state.lock().unwrap().dialed.clone()
    }

    pub fn events(&self) -> Vec<String> {
        self.state.lock().unwrap().events.clone()
    }

    pub fn max_concurrent_members(&self) -> usize {
        self.state.lock().unwrap().max_members
    }

    pub fn dialer(&self) -> FakeDialer {
        FakeDialer(self.clone())
    }

    pub fn groups(&self) -> FakeGroups {
        FakeGroups(self.clone())
    }

    pub fn readers(&self) -> FakeReaders {
        FakeReaders(self.clone())
    }
}

pub struct FakeDialer(FakeCluster);
pub struct FakeConnection(FakeCluster);
pub struct FakePartition(FakeCluster, i32);

#[async_trait]
impl BrokerDialer for FakeDialer {
    type Connection = FakeConnection;
    type PartitionConnection = FakePartition;

    async fn dial(&self, address: &str) -> Result<FakeConnection, ClientError> {
        let mut state = self.0.state.lock().unwrap();
        state.dialed.push(address.to_string());
        if state.unreachable.contains(address) {
            return Err(ClientError::Other("connection refused".to_string()));
        }
        Ok(FakeConnection(self.0.clone()))
    }

    async fn dial_partition(
        &self,
        _topic: &str,
        partition: &PartitionInfo,
    ) -> Result<FakePartition, ClientError> {
        Ok(FakePartition(self.0.clone(), partition.id))
    }
}

#[async_trait]
impl BrokerConnection for FakeConnection {
    async fn partitions(&self, topic: &str) -> Result<Vec<PartitionInfo>, ClientError> {
        if topic != "orders" {
            return Err(ClientError::UnknownTopic(topic.to_string()));
        }
        let state = self.0.state.lock().unwrap();
        Ok(state
            .logs
            .keys()
            .map(|&id| PartitionInfo {
                id,
                leader: format!("leader-{}:9092", id),
            })
            .collect())
    }
}

#[async_trait]
impl PartitionConnection for FakePartition {
    async fn watermarks(&self) -> Result<Watermarks, ClientError> {
        let state = self.0.state.lock().unwrap();
        if state.failing_partitions.contains(&self.1) {
            return Err(ClientError::Other("not leader for partition".to_string()));
        }
        let high = state.logs.get(&self.1).map_or(0, |log| log.len() as i64);
        Ok(Watermarks { low: 0, high })
    }
}

pub struct FakeGroups(FakeCluster);

pub struct FakeGeneration {
    cluster: FakeCluster,
    group_id: String,
    assigned: Vec<i32>,
}

#[async_trait]
impl GroupClient for FakeGroups {
    type Generation = FakeGeneration;

    async fn join(
        &self,
        group_id: &str,
        _topic: &str,
        _timeout: Duration,
    ) -> Result<FakeGeneration, ClientError> {
        let mut state = self.0.state.lock().unwrap();
        state.enter(group_id, format!("pin-join {}", group_id));
        let assigned = state.logs.keys().copied().collect();
        Ok(FakeGeneration {
            cluster: self.0.clone(),
            group_id: group_id.to_string(),
            assigned,
        })
    }
}

#[async_trait]
impl GroupGeneration for FakeGeneration {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn member_id(&self) -> &str {
        "pin-member"
    }

    fn assigned_partitions(&self) -> Vec<i32> {
        self.assigned.clone()
    }

    async fn commit(&self, _topic: &str, offsets: &[(i32, i64)]) -> Result<(), ClientError> {
        for &(partition, offset) in offsets {
            self.cluster.commit(&self.group_id, partition, offset);
        }
        Ok(())
    }

    async fn leave(self) -> Result<(), ClientError> {
        let mut state = self.cluster.state.lock().unwrap();
        state.exit(&self.group_id, format!("pin-leave {}", self.group_id));
        Ok(())
    }
}

pub struct FakeReaders(FakeCluster);

pub struct FakeStream {
    cluster: FakeCluster,
    group_id: String,
    positions: BTreeMap<i32, i64>,
    next_partition: usize,
}

#[async_trait]
impl ReaderClient for FakeReaders {
    type Stream = FakeStream;

    async fn open(&self, group_id: &str, _topic: &str) -> Result<FakeStream, ClientError> {
        let mut state = self.0.state.lock().unwrap();
        state.enter(group_id, format!("read-open {}", group_id));

        // Committed position, or the log end when nothing was committed.
        let positions = state
            .logs
            .iter()
            .map(|(&p, log)| {
                let start = state
                    .committed
                    .get(&(group_id.to_string(), p))
                    .copied()
                    .unwrap_or(log.len() as i64);
                (p, start)
            })
            .collect();

        Ok(FakeStream {
            cluster: self.0.clone(),
            group_id: group_id.to_string(),
            positions,
            next_partition: 0,
        })
    }
}

impl FakeStream {
    /// Next record, round-robin across partitions.
    fn poll_record(&mut self) -> Option<Record> {
        let mut state = self.cluster.state.lock().unwrap();
        let partitions: Vec<i32> = self.positions.keys().copied().collect();

        for step in 0..partitions.len() {
            let index = (self.next_partition + step) % partitions.len();
            let partition = partitions[index];
            let position = self.positions[&partition];

            let value = state
                .logs
                .get(&partition)
                .and_then(|log| log.get(position as usize))
                .cloned();
            if let Some(value) = value {
                self.positions.insert(partition, position + 1);
                self.next_partition = index + 1;
                state
                    .committed
                    .insert((self.group_id.clone(), partition), position + 1);
                return Some(Record {
                    partition,
                    offset: position,
                    key: None,
                    value,
                });
            }
        }
        None
    }
}

#[async_trait]
impl RecordStream for FakeStream {
    async fn fetch(&mut self) -> Result<Record, ClientError> {
        loop {
            if let Some(record) = self.poll_record() {
                return Ok(record);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn close(self) -> Result<(), ClientError> {
        let mut state = self.cluster.state.lock().unwrap();
        state.exit(&self.group_id, format!("read-close {}", self.group_id));
        Ok(())
    }
}
