//! Pinning computed offsets as a consumer group's committed position.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{info, warn};

use crate::client::{GroupClient, GroupGeneration};
use crate::error::{ClientError, Result, TailError};
use crate::offsets::OffsetPlan;

/// Prefix of every group id this tool creates.
pub const GROUP_ID_PREFIX: &str = "chronik-tail";

/// Deterministic group id for an actor tailing a topic.
pub fn group_id(topic: &str, actor: &str) -> String {
    format!("{}-{}-{}", GROUP_ID_PREFIX, topic, actor)
}

/// Proof that a group's position was committed and its pinning generation
/// has fully left the group.
///
/// Only [`GroupCoordinator::pin`] creates one; a reading session consumes
/// it, so the two generations can never overlap.
#[derive(Debug)]
pub struct PinnedGroup {
    group_id: String,
    topic: String,
    committed: BTreeMap<i32, i64>,
}

impl PinnedGroup {
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// partition -> committed start offset
    pub fn committed(&self) -> &BTreeMap<i32, i64> {
        &self.committed
    }

    #[cfg(test)]
    pub(crate) fn for_tests(group_id: &str, topic: &str) -> Self {
        Self {
            group_id: group_id.to_string(),
            topic: topic.to_string(),
            committed: BTreeMap::new(),
        }
    }
}

pub struct GroupCoordinator<G> {
    client: G,
    join_timeout: Duration,
}

impl<G: GroupClient> GroupCoordinator<G> {
    pub fn new(client: G, join_timeout: Duration) -> Self {
        Self {
            client,
            join_timeout,
        }
    }

    /// Commit `plan` as the position of `group_id`, then leave the group.
    ///
    /// The generation is closed on every path before this returns.
    pub async fn pin(&self, group_id: &str, plan: &OffsetPlan) -> Result<PinnedGroup> {
        let timeout = self.join_timeout;
        let joined = tokio::time::timeout(timeout, self.client.join(group_id, &plan.topic, timeout)).await;

        let generation = match joined {
            Ok(Ok(generation)) => generation,
            Ok(Err(ClientError::TimedOut)) | Err(_) => {
                return Err(TailError::GroupJoinTimeout {
                    group_id: group_id.to_string(),
                    timeout,
                })
            }
            Ok(Err(e)) => {
                return Err(TailError::GroupJoinFailed {
                    group_id: group_id.to_string(),
                    reason: e.to_string(),
                })
            }
        };

        info!(
            group_id = %group_id,
            member_id = %generation.member_id(),
            assigned = ?generation.assigned_partitions(),
            "Joined group for offset pinning"
        );

        let committed = Self::commit_plan(&generation, plan).await;
        let left = generation.leave().await;

        let committed = committed?;
        left.map_err(|e| TailError::CommitFailed {
            group_id: group_id.to_string(),
            reason: format!("leaving group after commit: {}", e),
        })?;

        info!(group_id = %group_id, partitions = committed.len(), "Pinned group offsets");
        Ok(PinnedGroup {
            group_id: group_id.to_string(),
            topic: plan.topic.clone(),
            committed,
        })
    }

    async fn commit_plan(generation: &G::Generation, plan: &OffsetPlan) -> Result<BTreeMap<i32, i64>> {
        let group_id = generation.group_id().to_string();
        let mut assigned = generation.assigned_partitions();
        assigned.sort_unstable();
        assigned.dedup();

        let mut offsets = BTreeMap::new();
        for partition in &assigned {
            let start = plan.start_offset(*partition).ok_or_else(|| TailError::CommitFailed {
                group_id: group_id.clone(),
                reason: format!("no start offset resolved for assigned partition {}", partition),
            })?;
            offsets.insert(*partition, start);
        }

        let unassigned: Vec<i32> = plan
            .partitions
            .keys()
            .filter(|p| !offsets.contains_key(p))
            .copied()
            .collect();
        if !unassigned.is_empty() {
            warn!(
                group_id = %group_id,
                partitions = ?unassigned,
                "Partitions not assigned to this generation keep their previous position"
            );
        }

        let pairs: Vec<(i32, i64)> = offsets.iter().map(|(p, o)| (*p, *o)).collect();
        generation
            .commit(&plan.topic, &pairs)
            .await
            .map_err(|e| TailError::CommitFailed {
                group_id: group_id.clone(),
                reason: e.to_string(),
            })?;

        Ok(offsets)
    }
}
