//! Client-library seams.
//!
//! The core never speaks the Kafka protocol itself. These traits describe the
//! few calls it needs; [`crate::kafka`] implements them on rdkafka.

use async_trait::async_trait;

use crate::error::ClientError;

/// A partition and the address of its current leader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionInfo {
    pub id: i32,
    pub leader: String,
}

/// Low and high watermarks of one partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermarks {
    pub low: i64,
    pub high: i64,
}

/// A consumed record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub partition: i32,
    pub offset: i64,
    pub key: Option<Vec<u8>>,
    pub value: Vec<u8>,
}

/// Opens connections to brokers.
#[async_trait]
pub trait BrokerDialer: Send + Sync + 'static {
    type Connection: BrokerConnection;
    type PartitionConnection: PartitionConnection;

    /// Connect to one broker address for metadata queries.
    async fn dial(&self, address: &str) -> Result<Self::Connection, ClientError>;

    /// Connect directly to the leader of `partition`.
    async fn dial_partition(
        &self,
        topic: &str,
        partition: &PartitionInfo,
    ) -> Result<Self::PartitionConnection, ClientError>;
}

/// Metadata connection to one broker.
#[async_trait]
pub trait BrokerConnection: Send + Sync {
    async fn partitions(&self, topic: &str) -> Result<Vec<PartitionInfo>, ClientError>;
}

/// Connection bound to a single partition leader.
#[async_trait]
pub trait PartitionConnection: Send + Sync {
    async fn watermarks(&self) -> Result<Watermarks, ClientError>;
}

/// Joins consumer groups.
#[async_trait]
pub trait GroupClient: Send + Sync {
    type Generation: GroupGeneration;

    /// Join `group_id` subscribed to `topic` and wait for an assignment.
    ///
    /// Implementations stop waiting once `timeout` elapses and return
    /// [`ClientError::TimedOut`].
    async fn join(
        &self,
        group_id: &str,
        topic: &str,
        timeout: std::time::Duration,
    ) -> Result<Self::Generation, ClientError>;
}

/// One consumer group membership epoch.
#[async_trait]
pub trait GroupGeneration: Send + Sync {
    fn group_id(&self) -> &str;

    fn member_id(&self) -> &str;

    /// Partitions of the subscribed topic assigned to this generation.
    fn assigned_partitions(&self) -> Vec<i32>;

    /// Override the committed position of each `(partition, offset)`.
    async fn commit(&self, topic: &str, offsets: &[(i32, i64)]) -> Result<(), ClientError>;

    /// Leave the group, closing this generation.
    async fn leave(self) -> Result<(), ClientError>;
}

/// Opens long-lived reading sessions.
#[async_trait]
pub trait ReaderClient: Send + Sync {
    type Stream: RecordStream;

    async fn open(&self, group_id: &str, topic: &str) -> Result<Self::Stream, ClientError>;
}

/// A reading session, one fetch at a time.
#[async_trait]
pub trait RecordStream: Send {
    /// Fetch the next record. Must be cancel-safe.
    async fn fetch(&mut self) -> Result<Record, ClientError>;

    /// Release the session.
    async fn close(self) -> Result<(), ClientError>;
}
