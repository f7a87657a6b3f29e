//! Start offset resolution for "last N records" requests.
//!
//! The resolver dials one broker for metadata, then queries every partition
//! leader concurrently. The whole resolution either produces an offset for
//! every partition or fails; partial plans are never returned.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::client::{BrokerConnection, BrokerDialer, PartitionConnection, PartitionInfo, Watermarks};
use crate::error::{ClientError, DialFailure, Result, TailError};

/// Start position computed for one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PartitionOffset {
    pub partition: i32,
    pub low_water_mark: i64,
    pub high_water_mark: i64,
    pub start_offset: i64,
    /// `start_offset` was raised to the low-water-mark
    pub clamped: bool,
}

impl PartitionOffset {
    /// Offsets between the start offset and the high-water-mark.
    ///
    /// This is an upper bound on records: transaction markers and compacted
    /// gaps occupy offsets but are never delivered.
    pub fn available(&self) -> u64 {
        (self.high_water_mark - self.start_offset).max(0) as u64
    }
}

/// Offsets for every partition of a topic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OffsetPlan {
    pub topic: String,
    pub tail_count: u64,
    pub partitions: BTreeMap<i32, PartitionOffset>,
}

impl OffsetPlan {
    pub fn start_offset(&self, partition: i32) -> Option<i64> {
        self.partitions.get(&partition).map(|p| p.start_offset)
    }

    /// Total offsets the plan spans before reaching the high-water-marks.
    ///
    /// Fixed-count reads stop after `min(N, available)` records. On a
    /// partition with gaps fewer records exist, so such a read ends with a
    /// read timeout once the real records are emitted.
    pub fn available(&self) -> u64 {
        self.partitions.values().map(PartitionOffset::available).sum()
    }

    pub fn is_clamped(&self) -> bool {
        self.partitions.values().any(|p| p.clamped)
    }
}

/// Start offset for the last `tail_count` records of a partition.
///
/// The last N records occupy `[high - N, high - 1]`, so the start is
/// `high - N`; `N = 0` starts at the high-water-mark. A start below the
/// low-water-mark is raised to it and reported as clamped.
pub fn start_offset(watermarks: Watermarks, tail_count: u64) -> (i64, bool) {
    let tail = i64::try_from(tail_count).unwrap_or(i64::MAX);
    let start = watermarks.high.saturating_sub(tail);
    let floor = watermarks.low.max(0);

    if start < floor {
        (floor, true)
    } else {
        (start, false)
    }
}

/// Computes per-partition start offsets for a topic.
pub struct OffsetResolver<D> {
    dialer: Arc<D>,
    timeout: Duration,
}

impl<D: BrokerDialer> OffsetResolver<D> {
    pub fn new(dialer: Arc<D>, timeout: Duration) -> Self {
        Self { dialer, timeout }
    }

    /// Resolve start offsets of `topic` using the first reachable candidate.
    pub async fn resolve(
        &self,
        topic: &str,
        candidates: &[String],
        tail_count: u64,
    ) -> Result<OffsetPlan> {
        let (address, connection) = self.dial_first(candidates).await?;

        let partitions = tokio::time::timeout(self.timeout, connection.partitions(topic))
            .await
            .map_err(|_| TailError::Metadata(format!("listing partitions of {} timed out", topic)))?
            .map_err(|e| match e {
                ClientError::UnknownTopic(t) => TailError::TopicNotFound(t),
                other => TailError::Metadata(format!(
                    "listing partitions of {} via {}: {}",
                    topic, address, other
                )),
            })?;
        drop(connection);

        if partitions.is_empty() {
            return Err(TailError::TopicNotFound(topic.to_string()));
        }
        info!(topic = %topic, partitions = partitions.len(), broker = %address, "Resolving start offsets");

        let watermarks = self.fetch_watermarks(topic, &partitions).await?;

        let mut plan = BTreeMap::new();
        for (partition, marks) in partitions.iter().zip(watermarks) {
            let (start, clamped) = start_offset(marks, tail_count);
            if clamped {
                warn!(
                    topic = %topic,
                    partition = partition.id,
                    requested = tail_count,
                    low = marks.low,
                    high = marks.high,
                    "Tail count exceeds retained records, starting at earliest offset"
                );
            }
            plan.insert(
                partition.id,
                PartitionOffset {
                    partition: partition.id,
                    low_water_mark: marks.low,
                    high_water_mark: marks.high,
                    start_offset: start,
                    clamped,
                },
            );
        }

        Ok(OffsetPlan {
            topic: topic.to_string(),
            tail_count,
            partitions: plan,
        })
    }

    /// Dial candidates in order; stop at the first success.
    async fn dial_first(&self, candidates: &[String]) -> Result<(String, D::Connection)> {
        let mut failures = Vec::new();

        for address in candidates {
            debug!(broker = %address, "Dialing broker");
            let outcome = tokio::time::timeout(self.timeout, self.dialer.dial(address)).await;
            let reason = match outcome {
                Ok(Ok(connection)) => {
                    info!(broker = %address, "Connected to broker");
                    return Ok((address.clone(), connection));
                }
                Ok(Err(e)) => e.to_string(),
                Err(_) => format!("timed out after {:?}", self.timeout),
            };
            warn!(broker = %address, error = %reason, "Broker dial failed");
            failures.push(DialFailure {
                address: address.clone(),
                reason,
            });
        }

        Err(TailError::BrokersUnreachable(failures))
    }

    /// Query every partition leader concurrently, failing on the first error.
    async fn fetch_watermarks(
        &self,
        topic: &str,
        partitions: &[PartitionInfo],
    ) -> Result<Vec<Watermarks>> {
        let mut slots: Vec<Option<Watermarks>> = vec![None; partitions.len()];
        let mut tasks = JoinSet::new();

        for (index, partition) in partitions.iter().cloned().enumerate() {
            let dialer = Arc::clone(&self.dialer);
            let topic = topic.to_string();
            let timeout = self.timeout;

            tasks.spawn(async move {
                let query = async {
                    let connection = dialer.dial_partition(&topic, &partition).await?;
                    connection.watermarks().await
                };
                let result = match tokio::time::timeout(timeout, query).await {
                    Ok(result) => result,
                    Err(_) => Err(ClientError::TimedOut),
                };
                (index, partition.id, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            let (index, partition, result) = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    tasks.abort_all();
                    return Err(TailError::PartitionFetchFailed {
                        topic: topic.to_string(),
                        partition: -1,
                        reason: format!("query task failed: {}", e),
                    });
                }
            };

            match result {
                Ok(marks) => {
                    debug!(topic = %topic, partition, low = marks.low, high = marks.high, "Fetched watermarks");
                    slots[index] = Some(marks);
                }
                Err(e) => {
                    tasks.abort_all();
                    return Err(TailError::PartitionFetchFailed {
                        topic: topic.to_string(),
                        partition,
                        reason: e.to_string(),
                    });
                }
            }
        }

        slots
            .into_iter()
            .zip(partitions)
            .map(|(slot, partition)| {
                slot.ok_or_else(|| TailError::PartitionFetchFailed {
                    topic: topic.to_string(),
                    partition: partition.id,
                    reason: "no result recorded".to_string(),
                })
            })
            .collect()
    }
}
