//! Cluster discovery through the ZooKeeper tree.

use std::collections::BTreeSet;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::{Result, TailError, TreeError};
use crate::topology::{BrokerRecord, ClusterTopology};

/// Read-only access to a hierarchical coordination store.
#[async_trait]
pub trait CoordinationTree: Send + Sync {
    async fn children(&self, path: &str) -> std::result::Result<Vec<String>, TreeError>;

    async fn data(&self, path: &str) -> std::result::Result<Vec<u8>, TreeError>;
}

/// [`CoordinationTree`] backed by a ZooKeeper session.
pub struct ZooKeeperTree {
    client: zookeeper_client::Client,
}

impl ZooKeeperTree {
    /// Connect to the ensemble at `hosts` (`host:port[,host:port...]`).
    pub async fn connect(hosts: &str, timeout: Duration) -> Result<Self> {
        let mut connector = zookeeper_client::Client::connector();
        connector.session_timeout(timeout);
        connector.connection_timeout(timeout);

        let client = tokio::time::timeout(timeout, connector.connect(hosts))
            .await
            .map_err(|_| {
                TailError::Unavailable(format!("connecting to {} timed out after {:?}", hosts, timeout))
            })?
            .map_err(|e| TailError::Unavailable(format!("connecting to {}: {}", hosts, e)))?;

        info!(hosts = %hosts, "Connected to ZooKeeper");
        Ok(Self { client })
    }
}

fn tree_error(path: &str, err: zookeeper_client::Error) -> TreeError {
    match err {
        zookeeper_client::Error::NoNode => TreeError::NoNode(path.to_string()),
        other => TreeError::Unavailable(format!("{}: {}", path, other)),
    }
}

#[async_trait]
impl CoordinationTree for ZooKeeperTree {
    async fn children(&self, path: &str) -> std::result::Result<Vec<String>, TreeError> {
        self.client
            .list_children(path)
            .await
            .map_err(|e| tree_error(path, e))
    }

    async fn data(&self, path: &str) -> std::result::Result<Vec<u8>, TreeError> {
        self.client
            .get_data(path)
            .await
            .map(|(data, _stat)| data)
            .map_err(|e| tree_error(path, e))
    }
}

/// Resolves topics and brokers registered under `/{cluster}`.
pub struct ClusterDirectory<T> {
    tree: T,
    root: String,
    call_timeout: Duration,
}

impl<T: CoordinationTree> ClusterDirectory<T> {
    /// An empty cluster name addresses the tree root. Every tree read is
    /// bounded by `call_timeout`.
    pub fn new(tree: T, cluster: &str, call_timeout: Duration) -> Self {
        let cluster = cluster.trim_matches('/');
        let root = if cluster.is_empty() {
            String::new()
        } else {
            format!("/{}", cluster)
        };
        Self {
            tree,
            root,
            call_timeout,
        }
    }

    async fn children(&self, path: &str) -> Result<Vec<String>> {
        tokio::time::timeout(self.call_timeout, self.tree.children(path))
            .await
            .map_err(|_| self.elapsed(path))?
            .map_err(|e| map_tree_error(path, e))
    }

    async fn data(&self, path: &str) -> Result<Vec<u8>> {
        tokio::time::timeout(self.call_timeout, self.tree.data(path))
            .await
            .map_err(|_| self.elapsed(path))?
            .map_err(|e| map_tree_error(path, e))
    }

    fn elapsed(&self, path: &str) -> TailError {
        TailError::Unavailable(format!(
            "reading {} timed out after {:?}",
            path, self.call_timeout
        ))
    }

    fn topics_path(&self) -> String {
        format!("{}/brokers/topics", self.root)
    }

    fn broker_ids_path(&self) -> String {
        format!("{}/brokers/ids", self.root)
    }

    /// Names of every registered topic.
    pub async fn list_topics(&self) -> Result<BTreeSet<String>> {
        let path = self.topics_path();
        let topics = self.children(&path).await?;

        debug!(path = %path, count = topics.len(), "Listed topics");
        Ok(topics.into_iter().collect())
    }

    /// Every registered broker, ordered by broker id.
    ///
    /// One malformed node fails the whole call.
    pub async fn list_brokers(&self) -> Result<Vec<BrokerRecord>> {
        let ids_path = self.broker_ids_path();
        let children = self.children(&ids_path).await?;

        let mut brokers = Vec::with_capacity(children.len());
        for child in children {
            let path = format!("{}/{}", ids_path, child);
            let id: i32 = child.parse().map_err(|_| TailError::CorruptMetadata {
                path: path.clone(),
                reason: format!("broker id {:?} is not an integer", child),
            })?;

            let data = self.data(&path).await?;

            brokers.push(BrokerRecord::parse(id, &path, &data)?);
        }

        brokers.sort_by_key(|b| b.id);
        debug!(path = %ids_path, count = brokers.len(), "Listed brokers");
        Ok(brokers)
    }

    pub async fn topology(&self) -> Result<ClusterTopology> {
        Ok(ClusterTopology::from_records(self.list_brokers().await?))
    }
}

fn map_tree_error(path: &str, err: TreeError) -> TailError {
    match err {
        TreeError::Unavailable(reason) => TailError::Unavailable(reason),
        TreeError::NoNode(_) => TailError::CorruptMetadata {
            path: path.to_string(),
            reason: "node does not exist".to_string(),
        },
    }
}
