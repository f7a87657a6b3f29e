//! CLI commands.

pub mod broker;
pub mod tail;
pub mod topic;

pub use broker::BrokerListCommand;
pub use tail::TailCommand;
pub use topic::TopicListCommand;

use anyhow::{bail, Context, Result};
use chronik_tail::{ClusterDirectory, TimeoutConfig, ZooKeeperTree};

/// Connect to the ZooKeeper ensemble at `hosts` for cluster `cluster`.
pub async fn directory(
    hosts: &str,
    cluster: &str,
    timeouts: &TimeoutConfig,
) -> Result<ClusterDirectory<ZooKeeperTree>> {
    if hosts.trim().is_empty() {
        bail!("a ZooKeeper host is required (--zookeeper or CHRONIK_TAIL_ZOOKEEPER)");
    }

    let timeout = timeouts.coordination_timeout();
    let tree = ZooKeeperTree::connect(hosts, timeout)
        .await
        .with_context(|| format!("connecting to ZooKeeper at {}", hosts))?;
    Ok(ClusterDirectory::new(tree, cluster, timeout))
}
