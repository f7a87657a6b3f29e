//! One tail invocation: resolve, pin, then read.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::client::{BrokerDialer, GroupClient, ReaderClient};
use crate::config::{ReadMode, TailConfig};
use crate::error::{Result, TailError};
use crate::group::{group_id, GroupCoordinator};
use crate::kafka::{KafkaDialer, KafkaGroupClient, KafkaReaderClient};
use crate::offsets::{OffsetPlan, OffsetResolver};
use crate::reader::{RecordSink, StreamCursor, StreamReader};
use crate::topology::ClusterTopology;

/// Outcome of a completed tail run.
#[derive(Debug, Clone)]
pub struct TailSummary {
    pub plan: OffsetPlan,
    pub cursor: StreamCursor,
}

pub struct TailSession<D, G, R> {
    config: TailConfig,
    candidates: Vec<String>,
    resolver: OffsetResolver<D>,
    coordinator: GroupCoordinator<G>,
    readers: R,
}

impl TailSession<KafkaDialer, KafkaGroupClient, KafkaReaderClient> {
    /// Session over rdkafka clients for the brokers `topology` advertises on
    /// the configured listener.
    pub fn kafka(config: TailConfig, topology: &ClusterTopology) -> Result<Self> {
        let candidates = topology.endpoints_for(&config.listener);
        debug!(
            origin = ?topology.origin(),
            listener = %config.listener,
            candidates = candidates.len(),
            "Selected broker candidates"
        );
        if candidates.is_empty() {
            return Err(TailError::BrokersUnreachable(Vec::new()));
        }

        let dial = config.dial_config();
        let dialer = KafkaDialer::new(dial.clone());
        let groups = KafkaGroupClient::new(&candidates, dial.clone());
        let readers = KafkaReaderClient::new(&candidates, dial);
        Self::new(config, candidates, dialer, groups, readers)
    }
}

impl<D, G, R> TailSession<D, G, R>
where
    D: BrokerDialer,
    G: GroupClient,
    R: ReaderClient,
{
    pub fn new(
        config: TailConfig,
        candidates: Vec<String>,
        dialer: D,
        groups: G,
        readers: R,
    ) -> Result<Self> {
        config.validate()?;
        let resolver = OffsetResolver::new(Arc::new(dialer), config.timeouts.dial_timeout());
        let coordinator = GroupCoordinator::new(groups, config.timeouts.group_join_timeout());
        Ok(Self {
            config,
            candidates,
            resolver,
            coordinator,
            readers,
        })
    }

    pub fn group_id(&self) -> String {
        group_id(&self.config.topic, &self.config.actor)
    }

    /// Resolve offsets, pin them, then stream into `sink`.
    pub async fn run<K: RecordSink>(
        &self,
        sink: &mut K,
        cancel: &CancellationToken,
    ) -> Result<TailSummary> {
        let topic = &self.config.topic;
        let plan = self
            .resolver
            .resolve(topic, &self.candidates, self.config.tail_count)
            .await?;

        let group_id = self.group_id();
        let pinned = self.coordinator.pin(&group_id, &plan).await?;

        let mode = match self.config.read_mode() {
            ReadMode::FixedCount(n) => ReadMode::FixedCount(n.min(plan.available())),
            ReadMode::Follow => ReadMode::Follow,
        };
        info!(topic = %topic, group_id = %group_id, mode = ?mode, "Starting read");

        let reader = StreamReader::open(&self.readers, pinned, self.config.timeouts.read_timeout()).await?;
        let cursor = reader.run(mode, sink, cancel).await?;

        Ok(TailSummary { plan, cursor })
    }
}
