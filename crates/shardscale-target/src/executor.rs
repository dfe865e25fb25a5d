//! Applies per-shard changes concurrently.
//!
//! One task per shard is spawned into a [`JoinSet`] and every task is
//! joined before the executor returns. A failing shard never stops its
//! siblings: failures are collected and reported together once the whole
//! set has finished. Shards that succeeded are not rolled back.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;
use tracing::{debug, error, info};

use shardscale_core::{ExecutionReport, ShardFailure, ShardPhase, ShardRef};

use crate::deadline;
use crate::provider::FleetApi;

/// The change one shard task applies.
#[derive(Debug, Clone)]
enum ShardOp {
    Resize(u64),
    Delete(Vec<String>),
}

impl ShardOp {
    fn phase(&self) -> ShardPhase {
        match self {
            ShardOp::Resize(_) => ShardPhase::Resize,
            ShardOp::Delete(_) => ShardPhase::Delete,
        }
    }
}

#[derive(Clone)]
pub struct ShardExecutor {
    fleet: Arc<dyn FleetApi>,
    call_timeout: Duration,
}

impl ShardExecutor {
    pub fn new(fleet: Arc<dyn FleetApi>, call_timeout: Duration) -> Self {
        Self { fleet, call_timeout }
    }

    /// Resize one shard to an absolute capacity and wait for completion.
    ///
    /// A zero capacity is a no-op, never a resize to zero.
    pub async fn grow_shard(
        &self,
        shard: &ShardRef,
        new_capacity: u64,
    ) -> Result<(), ShardFailure> {
        self.run(shard, ShardOp::Resize(new_capacity)).await
    }

    /// Delete exactly `instance_ids` from one shard and wait for completion.
    pub async fn shrink_shard(
        &self,
        shard: &ShardRef,
        instance_ids: &[String],
    ) -> Result<(), ShardFailure> {
        self.run(shard, ShardOp::Delete(instance_ids.to_vec())).await
    }

    /// Resize every shard to its entry in `capacities` concurrently.
    ///
    /// Shards with a zero entry are skipped. Returns the names of resized
    /// shards, or a report naming every shard that failed.
    pub async fn grow_all(
        &self,
        shards: &[ShardRef],
        capacities: &[u64],
    ) -> Result<Vec<String>, ExecutionReport> {
        let mut work = Vec::new();
        for (shard, &capacity) in shards.iter().zip(capacities) {
            if capacity > 0 {
                debug!(shard = %shard.name, desired_count = capacity, "resizing shard");
                work.push((shard.clone(), ShardOp::Resize(capacity)));
            } else {
                debug!(shard = %shard.name, desired_count = 0, "no scaling needed for shard");
            }
        }
        self.fan_out(work).await
    }

    /// Delete each shard's instance set concurrently. Empty sets are skipped.
    pub async fn shrink_all(
        &self,
        work: &[(ShardRef, Vec<String>)],
    ) -> Result<Vec<String>, ExecutionReport> {
        let mut ops = Vec::new();
        for (shard, ids) in work {
            if ids.is_empty() {
                debug!(shard = %shard.name, "no instance deletion needed for shard");
            } else {
                debug!(shard = %shard.name, instances = ?ids, "deleting shard instances");
                ops.push((shard.clone(), ShardOp::Delete(ids.clone())));
            }
        }
        self.fan_out(ops).await
    }

    async fn fan_out(
        &self,
        work: Vec<(ShardRef, ShardOp)>,
    ) -> Result<Vec<String>, ExecutionReport> {
        // idx → (shard name, phase) for tasks that have not reported back.
        let mut pending: BTreeMap<usize, (String, ShardPhase)> = BTreeMap::new();
        let mut outcomes: BTreeMap<usize, Result<String, ShardFailure>> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for (idx, (shard, op)) in work.into_iter().enumerate() {
            pending.insert(idx, (shard.name.clone(), op.phase()));
            let executor = self.clone();
            tasks.spawn(async move {
                let result = executor.run(&shard, op).await.map(|()| shard.name);
                (idx, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((idx, result)) => {
                    pending.remove(&idx);
                    outcomes.insert(idx, result);
                }
                Err(e) => error!(error = %e, "shard task did not complete"),
            }
        }

        // Anything still pending panicked or was cancelled.
        for (idx, (shard, phase)) in pending {
            outcomes.insert(
                idx,
                Err(ShardFailure {
                    shard,
                    phase,
                    message: "shard task did not complete".to_string(),
                }),
            );
        }

        let mut report = ExecutionReport::default();
        for outcome in outcomes.into_values() {
            match outcome {
                Ok(shard) => report.succeeded.push(shard),
                Err(failure) => report.failed.push(failure),
            }
        }

        if report.failed.is_empty() {
            Ok(report.succeeded)
        } else {
            Err(report)
        }
    }

    async fn run(&self, shard: &ShardRef, op: ShardOp) -> Result<(), ShardFailure> {
        let phase = op.phase();
        let result = match op {
            ShardOp::Resize(0) => {
                debug!(shard = %shard.name, desired_count = 0, "no scaling needed for shard");
                return Ok(());
            }
            ShardOp::Resize(capacity) => {
                deadline::within(
                    self.call_timeout,
                    self.fleet.resize(&shard.scope, &shard.name, capacity),
                )
                .await
            }
            ShardOp::Delete(ref ids) if ids.is_empty() => Ok(()),
            ShardOp::Delete(ref ids) => {
                deadline::within(
                    self.call_timeout,
                    self.fleet.delete_instances(&shard.scope, &shard.name, ids),
                )
                .await
            }
        };

        match result {
            Ok(()) => {
                info!(
                    shard = %shard.name,
                    scope = %shard.scope,
                    %phase,
                    "shard operation completed"
                );
                Ok(())
            }
            Err(message) => {
                error!(
                    shard = %shard.name,
                    scope = %shard.scope,
                    %phase,
                    error = %message,
                    "shard operation failed"
                );
                Err(ShardFailure {
                    shard: shard.name.clone(),
                    phase,
                    message,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{FleetOp, SimCall, SimulatedFleet};

    fn shards() -> Vec<ShardRef> {
        vec![
            ShardRef::new("rg-a", "web"),
            ShardRef::new("rg-b", "batch"),
            ShardRef::new("rg-c", "gpu"),
        ]
    }

    fn fleet() -> Arc<SimulatedFleet> {
        Arc::new(
            SimulatedFleet::new()
                .with_shard("rg-a", "web", 1)
                .with_shard("rg-b", "batch", 1)
                .with_shard("rg-c", "gpu", 1),
        )
    }

    #[tokio::test]
    async fn grow_all_resizes_every_shard() {
        let fleet = fleet();
        let exec = ShardExecutor::new(fleet.clone(), Duration::from_secs(30));

        let done = exec.grow_all(&shards(), &[4, 3, 3]).await.unwrap();
        assert_eq!(done, vec!["web", "batch", "gpu"]);
        assert_eq!(fleet.capacity("web").await, Some(4));
        assert_eq!(fleet.capacity("gpu").await, Some(3));
    }

    #[tokio::test]
    async fn zero_capacity_share_is_a_noop() {
        let fleet = fleet();
        let exec = ShardExecutor::new(fleet.clone(), Duration::from_secs(30));

        let done = exec.grow_all(&shards(), &[1, 1, 0]).await.unwrap();
        assert_eq!(done, vec!["web", "batch"]);
        let resized: Vec<_> = fleet
            .calls()
            .await
            .into_iter()
            .filter(|c| matches!(c, SimCall::Resize { .. }))
            .collect();
        assert_eq!(resized.len(), 2);
    }

    #[tokio::test]
    async fn grow_shard_to_zero_leaves_shard_alone() {
        let fleet = Arc::new(SimulatedFleet::new().with_shard("rg-a", "web", 3));
        let exec = ShardExecutor::new(fleet.clone(), Duration::from_secs(30));

        exec.grow_shard(&ShardRef::new("rg-a", "web"), 0).await.unwrap();

        assert!(fleet.calls().await.is_empty());
        assert_eq!(fleet.capacity("web").await, Some(3));
    }

    #[tokio::test]
    async fn one_failure_does_not_stop_siblings() {
        let fleet = fleet();
        fleet.fail(FleetOp::Resize, "batch", "quota exceeded").await;
        let exec = ShardExecutor::new(fleet.clone(), Duration::from_secs(30));

        let report = exec.grow_all(&shards(), &[2, 2, 2]).await.unwrap_err();
        assert_eq!(report.failed.len(), 1);
        assert!(report.has_failed("batch"));
        assert_eq!(report.failed[0].phase, ShardPhase::Resize);
        assert_eq!(report.succeeded, vec!["web", "gpu"]);

        let calls = fleet.calls().await;
        for name in ["web", "batch", "gpu"] {
            let n = calls
                .iter()
                .filter(|c| matches!(c, SimCall::Resize { shard, .. } if shard == name))
                .count();
            assert_eq!(n, 1, "{name}");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn slow_shard_times_out_alone() {
        let fleet = fleet();
        fleet.delay("gpu", Duration::from_secs(120)).await;
        let exec = ShardExecutor::new(fleet.clone(), Duration::from_secs(10));

        let report = exec.grow_all(&shards(), &[2, 2, 2]).await.unwrap_err();
        assert!(report.has_failed("gpu"));
        assert!(report.failed[0].message.contains("timed out"));
        assert_eq!(report.succeeded, vec!["web", "batch"]);
        assert_eq!(fleet.capacity("web").await, Some(2));
    }

    #[tokio::test]
    async fn shrink_skips_empty_sets() {
        let fleet = Arc::new(
            SimulatedFleet::new()
                .with_shard("rg-a", "web", 3)
                .with_shard("rg-b", "batch", 2),
        );
        let exec = ShardExecutor::new(fleet.clone(), Duration::from_secs(30));

        let work = vec![
            (ShardRef::new("rg-a", "web"), vec!["0".to_string(), "2".to_string()]),
            (ShardRef::new("rg-b", "batch"), Vec::new()),
        ];
        let done = exec.shrink_all(&work).await.unwrap();
        assert_eq!(done, vec!["web"]);
        assert_eq!(fleet.capacity("web").await, Some(1));
        assert_eq!(fleet.capacity("batch").await, Some(2));
    }

    #[tokio::test]
    async fn single_shard_calls() {
        let fleet = fleet();
        let exec = ShardExecutor::new(fleet.clone(), Duration::from_secs(30));
        let web = ShardRef::new("rg-a", "web");

        exec.grow_shard(&web, 5).await.unwrap();
        assert_eq!(fleet.capacity("web").await, Some(5));

        exec.shrink_shard(&web, &["1".to_string()]).await.unwrap();
        assert_eq!(fleet.capacity("web").await, Some(4));

        let err = exec.shrink_shard(&web, &["nope".to_string()]).await.unwrap_err();
        assert_eq!(err.phase, ShardPhase::Delete);
        assert_eq!(err.shard, "web");
    }
}
