//! rdkafka-backed implementations of the client seams.
//!
//! rdkafka's metadata, watermark, commit and close calls block the calling
//! thread, so they run on the blocking pool. Record fetches use the async
//! `StreamConsumer`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode, Consumer, StreamConsumer};
use rdkafka::error::RDKafkaErrorCode;
use rdkafka::{Message, Offset, TopicPartitionList};
use tracing::debug;

use crate::client::{
    BrokerConnection, BrokerDialer, GroupClient, GroupGeneration, PartitionConnection,
    PartitionInfo, ReaderClient, Record, RecordStream, Watermarks,
};
use crate::config::DialConfig;
use crate::error::ClientError;

/// Interval between assignment checks while joining a group.
const JOIN_POLL_INTERVAL: Duration = Duration::from_millis(100);

async fn blocking<T, F>(f: F) -> Result<T, ClientError>
where
    F: FnOnce() -> Result<T, ClientError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ClientError::Other(format!("blocking task failed: {}", e)))?
}

/// Base client configuration shared by every rdkafka client.
fn client_config(bootstrap: &str, dial: &DialConfig) -> ClientConfig {
    let timeout_ms = dial.timeout.as_millis().to_string();
    let mut config = ClientConfig::new();
    config
        .set("bootstrap.servers", bootstrap)
        .set("socket.connection.setup.timeout.ms", timeout_ms.clone())
        .set("socket.timeout.ms", timeout_ms)
        .set("socket.keepalive.enable", "true")
        .set("enable.partition.eof", "false");

    if let Some(tls) = &dial.tls {
        config.set("security.protocol", "ssl");
        if let Some(ca) = &tls.ca_pem {
            config.set("ssl.ca.pem", ca.as_str());
        }
        if let (Some(cert), Some(key)) = (&tls.cert_pem, &tls.key_pem) {
            config
                .set("ssl.certificate.pem", cert.as_str())
                .set("ssl.key.pem", key.as_str());
        }
    }

    config
}

/// Dials brokers with rdkafka metadata clients.
#[derive(Debug, Clone)]
pub struct KafkaDialer {
    dial: DialConfig,
}

impl KafkaDialer {
    pub fn new(dial: DialConfig) -> Self {
        Self { dial }
    }

    fn consumer(&self, bootstrap: &str) -> Result<BaseConsumer, ClientError> {
        Ok(client_config(bootstrap, &self.dial).create::<BaseConsumer>()?)
    }
}

pub struct KafkaConnection {
    consumer: Arc<BaseConsumer>,
    timeout: Duration,
}

pub struct KafkaPartitionConnection {
    consumer: Arc<BaseConsumer>,
    topic: String,
    partition: i32,
    timeout: Duration,
}

#[async_trait]
impl BrokerDialer for KafkaDialer {
    type Connection = KafkaConnection;
    type PartitionConnection = KafkaPartitionConnection;

    async fn dial(&self, address: &str) -> Result<KafkaConnection, ClientError> {
        let consumer = Arc::new(self.consumer(address)?);
        let timeout = self.dial.timeout;

        // A metadata round-trip proves the broker is reachable.
        let reachable = Arc::clone(&consumer);
        blocking(move || {
            reachable.fetch_metadata(None, timeout)?;
            Ok(())
        })
        .await?;

        Ok(KafkaConnection { consumer, timeout })
    }

    async fn dial_partition(
        &self,
        topic: &str,
        partition: &PartitionInfo,
    ) -> Result<KafkaPartitionConnection, ClientError> {
        Ok(KafkaPartitionConnection {
            consumer: Arc::new(self.consumer(&partition.leader)?),
            topic: topic.to_string(),
            partition: partition.id,
            timeout: self.dial.timeout,
        })
    }
}

#[async_trait]
impl BrokerConnection for KafkaConnection {
    async fn partitions(&self, topic: &str) -> Result<Vec<PartitionInfo>, ClientError> {
        let consumer = Arc::clone(&self.consumer);
        let timeout = self.timeout;
        let topic = topic.to_string();

        blocking(move || {
            let metadata = consumer.fetch_metadata(Some(&topic), timeout)?;
            let entry = metadata
                .topics()
                .iter()
                .find(|t| t.name() == topic)
                .ok_or_else(|| ClientError::UnknownTopic(topic.clone()))?;

            if let Some(err) = entry.error() {
                let code = RDKafkaErrorCode::from(err);
                return Err(match code {
                    RDKafkaErrorCode::UnknownTopicOrPartition | RDKafkaErrorCode::UnknownTopic => {
                        ClientError::UnknownTopic(topic.clone())
                    }
                    other => ClientError::Other(format!("topic {}: {}", topic, other)),
                });
            }

            entry
                .partitions()
                .iter()
                .map(|p| -> Result<PartitionInfo, ClientError> {
                    let leader = metadata
                        .brokers()
                        .iter()
                        .find(|b| b.id() == p.leader())
                        .ok_or_else(|| {
                            ClientError::Other(format!(
                                "partition {} of {} has no available leader",
                                p.id(),
                                topic
                            ))
                        })?;
                    Ok(PartitionInfo {
                        id: p.id(),
                        leader: format!("{}:{}", leader.host(), leader.port()),
                    })
                })
                .collect()
        })
        .await
    }
}

#[async_trait]
impl PartitionConnection for KafkaPartitionConnection {
    async fn watermarks(&self) -> Result<Watermarks, ClientError> {
        let consumer = Arc::clone(&self.consumer);
        let topic = self.topic.clone();
        let partition = self.partition;
        let timeout = self.timeout;

        blocking(move || {
            let (low, high) = consumer.fetch_watermarks(&topic, partition, timeout)?;
            Ok(Watermarks { low, high })
        })
        .await
    }
}

/// Joins consumer groups for offset pinning.
#[derive(Debug, Clone)]
pub struct KafkaGroupClient {
    bootstrap: String,
    dial: DialConfig,
}

impl KafkaGroupClient {
    pub fn new(brokers: &[String], dial: DialConfig) -> Self {
        Self {
            bootstrap: brokers.join(","),
            dial,
        }
    }
}

pub struct KafkaGeneration {
    consumer: Arc<BaseConsumer>,
    group_id: String,
    member_id: String,
    assigned: Vec<i32>,
}

#[async_trait]
impl GroupClient for KafkaGroupClient {
    type Generation = KafkaGeneration;

    async fn join(
        &self,
        group_id: &str,
        topic: &str,
        timeout: Duration,
    ) -> Result<KafkaGeneration, ClientError> {
        let member_id = format!("{}-pin-{}", group_id, std::process::id());
        let mut config = client_config(&self.bootstrap, &self.dial);
        config
            .set("group.id", group_id)
            .set("client.id", member_id.as_str())
            .set("enable.auto.commit", "false")
            .set("enable.auto.offset.store", "false")
            .set("auto.offset.reset", "latest");

        let consumer = Arc::new(config.create::<BaseConsumer>()?);
        consumer.subscribe(&[topic])?;

        let waiting = Arc::clone(&consumer);
        let topic = topic.to_string();
        let assigned = blocking(move || {
            let deadline = Instant::now() + timeout;
            loop {
                // Polling drives the join/sync handshake; records are ignored.
                if let Some(Err(e)) = waiting.poll(JOIN_POLL_INTERVAL) {
                    debug!(error = %e, "Poll error while waiting for assignment");
                }

                let partitions: Vec<i32> = waiting
                    .assignment()?
                    .elements_for_topic(&topic)
                    .iter()
                    .map(|e| e.partition())
                    .collect();
                if !partitions.is_empty() {
                    return Ok(partitions);
                }
                if Instant::now() >= deadline {
                    return Err(ClientError::TimedOut);
                }
            }
        })
        .await;

        let assigned = match assigned {
            Ok(assigned) => assigned,
            Err(e) => {
                if let Err(close) = close_consumer(consumer).await {
                    debug!(error = %close, "Closing unassigned consumer failed");
                }
                return Err(e);
            }
        };

        Ok(KafkaGeneration {
            consumer,
            group_id: group_id.to_string(),
            member_id,
            assigned,
        })
    }
}

/// Unsubscribe and drop the last handle, which runs the leave handshake.
async fn close_consumer(consumer: Arc<BaseConsumer>) -> Result<(), ClientError> {
    blocking(move || {
        consumer.unsubscribe();
        let consumer = Arc::try_unwrap(consumer).map_err(|_| {
            ClientError::Other("consumer still shared, group not left".to_string())
        })?;
        drop(consumer);
        Ok(())
    })
    .await
}

#[async_trait]
impl GroupGeneration for KafkaGeneration {
    fn group_id(&self) -> &str {
        &self.group_id
    }

    fn member_id(&self) -> &str {
        &self.member_id
    }

    fn assigned_partitions(&self) -> Vec<i32> {
        self.assigned.clone()
    }

    async fn commit(&self, topic: &str, offsets: &[(i32, i64)]) -> Result<(), ClientError> {
        let mut list = TopicPartitionList::new();
        for &(partition, offset) in offsets {
            list.add_partition_offset(topic, partition, Offset::Offset(offset))?;
        }

        let consumer = Arc::clone(&self.consumer);
        blocking(move || {
            consumer.commit(&list, CommitMode::Sync)?;
            Ok(())
        })
        .await
    }

    async fn leave(self) -> Result<(), ClientError> {
        close_consumer(self.consumer).await
    }
}

/// Opens auto-committing reader sessions.
#[derive(Debug, Clone)]
pub struct KafkaReaderClient {
    bootstrap: String,
    dial: DialConfig,
}

impl KafkaReaderClient {
    pub fn new(brokers: &[String], dial: DialConfig) -> Self {
        Self {
            bootstrap: brokers.join(","),
            dial,
        }
    }
}

pub struct KafkaRecordStream {
    consumer: StreamConsumer,
}

#[async_trait]
impl ReaderClient for KafkaReaderClient {
    type Stream = KafkaRecordStream;

    async fn open(&self, group_id: &str, topic: &str) -> Result<KafkaRecordStream, ClientError> {
        let mut config = client_config(&self.bootstrap, &self.dial);
        config
            .set("group.id", group_id)
            .set("client.id", format!("{}-read-{}", group_id, std::process::id()))
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest");

        let consumer: StreamConsumer = config.create()?;
        consumer.subscribe(&[topic])?;
        Ok(KafkaRecordStream { consumer })
    }
}

#[async_trait]
impl RecordStream for KafkaRecordStream {
    async fn fetch(&mut self) -> Result<Record, ClientError> {
        let message = self.consumer.recv().await?;
        Ok(Record {
            partition: message.partition(),
            offset: message.offset(),
            key: message.key().map(<[u8]>::to_vec),
            value: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn close(self) -> Result<(), ClientError> {
        let consumer = self.consumer;
        blocking(move || {
            consumer.unsubscribe();
            drop(consumer);
            Ok(())
        })
        .await
    }
}
