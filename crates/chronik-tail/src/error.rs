//! Error types for chronik-tail.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

/// Result type alias for tail operations.
pub type Result<T> = std::result::Result<T, TailError>;

/// A single failed dial attempt against one broker candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialFailure {
    pub address: String,
    pub reason: String,
}

impl fmt::Display for DialFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "dialing {:?}: {}", self.address, self.reason)
    }
}

/// Main error type surfaced by every core operation.
#[derive(Error, Debug)]
pub enum TailError {
    /// Coordination ensemble unreachable or timed out
    #[error("Coordination service unavailable: {0}")]
    Unavailable(String),

    /// Malformed broker or topic registration
    #[error("Corrupt metadata at {path}: {reason}")]
    CorruptMetadata { path: String, reason: String },

    /// Every dial candidate failed
    #[error("No broker reachable: {}", format_failures(.0))]
    BrokersUnreachable(Vec<DialFailure>),

    /// Topic does not exist on the cluster
    #[error("Topic not found: {0}")]
    TopicNotFound(String),

    /// Partition list query failed
    #[error("Metadata error: {0}")]
    Metadata(String),

    /// Watermark query failed for one partition
    #[error("High-water-mark query failed for {topic}/{partition}: {reason}")]
    PartitionFetchFailed {
        topic: String,
        partition: i32,
        reason: String,
    },

    /// Group generation was not assigned in time
    #[error("Group {group_id} not assigned within {timeout:?}")]
    GroupJoinTimeout { group_id: String, timeout: Duration },

    /// Joining the group failed for a reason other than a timeout
    #[error("Joining group {group_id} failed: {reason}")]
    GroupJoinFailed { group_id: String, reason: String },

    /// Offset override commit failed, or leaving after the commit failed
    #[error("Commit failed for group {group_id}: {reason}")]
    CommitFailed { group_id: String, reason: String },

    /// A single fetch exceeded its deadline
    #[error("Read timed out after {0:?}")]
    ReadTimeout(Duration),

    /// A fetch returned an error
    #[error("Read error: {0}")]
    ReadError(String),

    /// Writing a record to the sink failed
    #[error("Output error: {0}")]
    Output(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Invalid caller input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

fn format_failures(failures: &[DialFailure]) -> String {
    if failures.is_empty() {
        return "no broker candidates".to_string();
    }
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors returned by the client-library seams (Kafka side).
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("operation timed out")]
    TimedOut,

    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    #[error(transparent)]
    Kafka(#[from] rdkafka::error::KafkaError),

    #[error("{0}")]
    Other(String),
}

/// Errors returned by the coordination tree seam.
#[derive(Error, Debug)]
pub enum TreeError {
    #[error("coordination service unavailable: {0}")]
    Unavailable(String),

    #[error("node does not exist: {0}")]
    NoNode(String),
}
