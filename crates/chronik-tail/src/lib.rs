//! Topic inspection and offset-pinned tailing for Kafka-compatible clusters.
//!
//! A tail run flows through four stages:
//! - broker discovery ([`ClusterDirectory`] or a static list) into a [`ClusterTopology`]
//! - start offset resolution across partitions ([`OffsetResolver`])
//! - pinning those offsets as a consumer group position ([`GroupCoordinator`])
//! - the streaming read under the same group id ([`StreamReader`])
//!
//! [`TailSession`] wires those stages for a single invocation.

pub mod client;
pub mod config;
pub mod directory;
pub mod error;
pub mod group;
pub mod kafka;
pub mod offsets;
pub mod reader;
pub mod session;
pub mod topology;

pub use client::{Record, Watermarks};
pub use config::{ClusterSource, DialConfig, ReadMode, TailConfig, TimeoutConfig, TlsMaterial};
pub use directory::{ClusterDirectory, CoordinationTree, ZooKeeperTree};
pub use error::{ClientError, DialFailure, Result, TailError, TreeError};
pub use group::{group_id, GroupCoordinator, PinnedGroup};
pub use offsets::{OffsetPlan, OffsetResolver, PartitionOffset};
pub use reader::{LineSink, RecordSink, StreamCursor, StreamReader};
pub use session::{TailSession, TailSummary};
pub use topology::{BrokerRecord, ClusterTopology, TopologyOrigin};

/// Re-exported so callers can cancel a follow-mode read.
pub use tokio_util::sync::CancellationToken;
