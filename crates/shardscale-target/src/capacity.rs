//! Live capacity and instance state per shard.
//!
//! Every read goes to the fleet API; nothing is cached between calls.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::debug;

use shardscale_core::{
    FleetError, FleetResult, FleetSnapshot, RemoteInstanceId, ShardRef, ShardStatus,
};

use crate::deadline;
use crate::provider::FleetApi;

#[derive(Clone)]
pub struct ShardCapacityReader {
    fleet: Arc<dyn FleetApi>,
    call_timeout: Duration,
}

impl ShardCapacityReader {
    pub fn new(fleet: Arc<dyn FleetApi>, call_timeout: Duration) -> Self {
        Self { fleet, call_timeout }
    }

    pub async fn capacity(&self, shard: &ShardRef) -> FleetResult<u64> {
        deadline::within(
            self.call_timeout,
            self.fleet.get_capacity(&shard.scope, &shard.name),
        )
        .await
        .map_err(|message| query_error(shard, "capacity", message))
    }

    /// Capacity of every shard, read in order. Any failure aborts.
    pub async fn snapshot(&self, shards: &[ShardRef]) -> FleetResult<FleetSnapshot> {
        let mut snapshot = FleetSnapshot::new();
        for shard in shards {
            let capacity = self.capacity(shard).await?;
            debug!(shard = %shard.name, scope = %shard.scope, capacity, "read shard capacity");
            snapshot.push(shard.clone(), capacity);
        }
        Ok(snapshot)
    }

    /// Remote ids of the shard's instances that are exactly `running`.
    pub async fn running_remote_ids(&self, shard: &ShardRef) -> FleetResult<Vec<RemoteInstanceId>> {
        let instances = deadline::within(
            self.call_timeout,
            self.fleet.list_instances(&shard.scope, &shard.name),
        )
        .await
        .map_err(|message| query_error(shard, "instance listing", message))?;

        Ok(instances
            .into_iter()
            .filter(|i| i.is_drain_candidate())
            .map(|i| RemoteInstanceId::new(shard.name.clone(), i.instance_id))
            .collect())
    }

    /// Capacity, readiness, and latest event of one shard.
    pub async fn shard_status(&self, shard: &ShardRef) -> FleetResult<ShardStatus> {
        let capacity = self.capacity(shard).await?;
        let instances = deadline::within(
            self.call_timeout,
            self.fleet.list_instances(&shard.scope, &shard.name),
        )
        .await
        .map_err(|message| query_error(shard, "instance view", message))?;

        Ok(ShardStatus::from_instances(capacity, &instances))
    }

    /// Status of every shard, read concurrently and returned in shard order.
    ///
    /// All reads are joined before returning; the error reported is the one
    /// from the lowest-indexed failing shard.
    pub async fn fleet_statuses(&self, shards: &[ShardRef]) -> FleetResult<Vec<ShardStatus>> {
        let mut tasks = JoinSet::new();
        for (idx, shard) in shards.iter().enumerate() {
            let reader = self.clone();
            let shard = shard.clone();
            tasks.spawn(async move { (idx, reader.shard_status(&shard).await) });
        }

        let mut slots: Vec<Option<FleetResult<ShardStatus>>> =
            (0..shards.len()).map(|_| None).collect();
        while let Some(joined) = tasks.join_next().await {
            if let Ok((idx, result)) = joined {
                slots[idx] = Some(result);
            }
        }

        slots
            .into_iter()
            .zip(shards)
            .map(|(slot, shard)| match slot {
                Some(result) => result,
                None => Err(query_error(shard, "status", "status task aborted".to_string())),
            })
            .collect()
    }
}

fn query_error(shard: &ShardRef, what: &str, message: String) -> FleetError {
    FleetError::Query {
        shard: shard.name.clone(),
        message: format!("{what} query in scope {} failed: {message}", shard.scope),
    }
}
