//! The fleet API and scheduler drain hooks this crate drives.
//!
//! Implementations are constructed once, authenticated up front, and then
//! shared read-only (behind `Arc`) by every concurrent shard task.

use std::collections::HashMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use shardscale_core::InstanceRecord;

/// Attribute under which scheduler nodes publish their provider name.
pub const DEFAULT_NODE_NAME_ATTRIBUTE: &str = "unique.platform.azure.name";

/// The external fleet-management API for scale groups.
///
/// `resize` and `delete_instances` resolve only when the provider reports
/// the operation complete (or failed).
#[async_trait]
pub trait FleetApi: Send + Sync {
    /// Current instance count of a shard.
    async fn get_capacity(&self, scope: &str, shard: &str) -> anyhow::Result<u64>;

    /// Every instance of a shard with its power and provisioning state.
    async fn list_instances(&self, scope: &str, shard: &str) -> anyhow::Result<Vec<InstanceRecord>>;

    /// Set a shard's capacity to an absolute value.
    async fn resize(&self, scope: &str, shard: &str, capacity: u64) -> anyhow::Result<()>;

    /// Delete exactly the given instances from a shard.
    async fn delete_instances(
        &self,
        scope: &str,
        shard: &str,
        instance_ids: &[String],
    ) -> anyhow::Result<()>;
}

/// A node the scheduler has drained and cleared for termination.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainedNode {
    /// Scheduler-side node id.
    pub node_id: String,
    /// `<shard>_<instance>` identifier of the backing instance.
    pub remote_id: String,
}

/// Scheduler hooks run around instance removal.
#[async_trait]
pub trait DrainHooks: Send + Sync {
    /// Whether the scheduler's node pool is in a state where fleet status
    /// is meaningful.
    async fn is_pool_ready(&self) -> anyhow::Result<bool>;

    /// Drain up to `count` of the candidates and return the ones cleared
    /// for termination. May return fewer than requested.
    async fn pre_drain(
        &self,
        candidates: &[String],
        count: u64,
    ) -> anyhow::Result<Vec<DrainedNode>>;

    /// Release scheduler bookkeeping for nodes that were cleared.
    async fn post_drain(&self, cleared: &[DrainedNode]) -> anyhow::Result<()>;
}

/// A node as seen by the scheduler's node registry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchedulerNode {
    pub id: String,
    #[serde(default)]
    pub attributes: HashMap<String, String>,
    #[serde(default)]
    pub meta: HashMap<String, String>,
}

/// Resolves a scheduler node to the provider name used in remote ids.
#[derive(Debug, Clone)]
pub struct NodeNameLookup {
    key: String,
}

impl Default for NodeNameLookup {
    fn default() -> Self {
        Self::new(DEFAULT_NODE_NAME_ATTRIBUTE)
    }
}

impl NodeNameLookup {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    /// Look in the node's attributes first, then its metadata.
    pub fn resolve(&self, node: &SchedulerNode) -> anyhow::Result<String> {
        node.attributes
            .get(&self.key)
            .or_else(|| node.meta.get(&self.key))
            .cloned()
            .ok_or_else(|| {
                anyhow::anyhow!("attribute {:?} not found on node {}", self.key, node.id)
            })
    }
}
