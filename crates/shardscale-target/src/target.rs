//! Scale and Status entry points.
//!
//! Holds the long-lived collaborator handles. Each call reads fresh
//! capacity, plans, and executes; nothing carries over between calls.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use shardscale_core::config::{DEFAULT_CALL_TIMEOUT, validate_shards};
use shardscale_core::{
    DRY_RUN_COUNT, FleetError, FleetResult, FleetStatus, ScaleDirection, ShardRef, TargetConfig,
    aggregate, plan,
};

use crate::capacity::ShardCapacityReader;
use crate::correlator::ScaleInCorrelator;
use crate::deadline;
use crate::executor::ShardExecutor;
use crate::provider::{DrainHooks, FleetApi};

/// What a successful `scale` call did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScaleOutcome {
    /// The dry-run sentinel was passed; nothing was touched.
    DryRun,
    /// The fleet already matched the target.
    NoChange,
    /// These shards were resized.
    ScaledOut { shards: Vec<String> },
    /// These instances were drained and deleted, per shard.
    ScaledIn { deleted: Vec<(String, Vec<String>)> },
}

/// Scales and reports on a fleet of scale-group shards.
pub struct ShardScaleTarget {
    fleet: Arc<dyn FleetApi>,
    hooks: Arc<dyn DrainHooks>,
    call_timeout: Duration,
}

impl ShardScaleTarget {
    pub fn new(fleet: Arc<dyn FleetApi>, hooks: Arc<dyn DrainHooks>) -> Self {
        Self {
            fleet,
            hooks,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    /// Build from a validated configuration. Its call timeout bounds every
    /// fleet API and scheduler call this target makes.
    pub fn from_config(
        fleet: Arc<dyn FleetApi>,
        hooks: Arc<dyn DrainHooks>,
        config: &TargetConfig,
    ) -> FleetResult<Self> {
        validate_shards(&config.shards)?;
        Ok(Self::new(fleet, hooks).with_call_timeout(config.call_timeout))
    }

    pub fn call_timeout(&self) -> Duration {
        self.call_timeout
    }

    /// Set the deadline applied to each individual collaborator call.
    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    /// Move the fleet to `target` instances in total.
    ///
    /// [`DRY_RUN_COUNT`] returns immediately without touching the fleet.
    pub async fn scale(&self, target: i64, shards: &[ShardRef]) -> FleetResult<ScaleOutcome> {
        if target == DRY_RUN_COUNT {
            debug!("dry run requested, skipping scale");
            return Ok(ScaleOutcome::DryRun);
        }
        let target = u64::try_from(target)
            .map_err(|_| FleetError::InvalidInput(format!("negative target count {target}")))?;
        validate_shards(shards)?;

        let shard_names: Vec<&str> = shards.iter().map(|s| s.name.as_str()).collect();
        debug!(target, shards = ?shard_names, "scale triggered");

        let snapshot = self.reader().snapshot(shards).await?;
        let plan = plan(&snapshot, target)?;

        match plan.direction {
            ScaleDirection::Grow => {
                info!(
                    action = "scale_out",
                    target,
                    current = snapshot.total(),
                    per_shard = ?plan.per_shard_delta,
                    "scaling out"
                );
                let executor = ShardExecutor::new(self.fleet.clone(), self.call_timeout);
                match executor.grow_all(shards, &plan.per_shard_delta).await {
                    Ok(resized) => {
                        info!(
                            action = "scale_out",
                            "successfully performed and verified scaling out"
                        );
                        Ok(ScaleOutcome::ScaledOut { shards: resized })
                    }
                    Err(report) => {
                        warn!(action = "scale_out", %report, "scale out finished with failures");
                        Err(FleetError::Execution(report))
                    }
                }
            }
            ScaleDirection::Shrink => {
                info!(
                    action = "scale_in",
                    target,
                    current = snapshot.total(),
                    remove = plan.magnitude,
                    "scaling in"
                );
                let mut correlator = ScaleInCorrelator::new(
                    self.fleet.clone(),
                    self.hooks.clone(),
                    self.call_timeout,
                );
                let summary = correlator.run(shards, plan.magnitude).await?;
                Ok(ScaleOutcome::ScaledIn {
                    deleted: summary.deleted,
                })
            }
            ScaleDirection::NoChange => {
                info!(current = snapshot.total(), target, "scaling not required");
                Ok(ScaleOutcome::NoChange)
            }
        }
    }

    /// Readiness, total count, and latest event across every shard.
    ///
    /// If the scheduler reports its pool as not ready, no shard is queried.
    pub async fn status(&self, shards: &[ShardRef]) -> FleetResult<FleetStatus> {
        validate_shards(shards)?;

        let pool_ready = deadline::within(self.call_timeout, self.hooks.is_pool_ready())
            .await
            .map_err(FleetError::Scheduler)?;
        if !pool_ready {
            debug!("scheduler pool not ready, skipping shard status");
            return Ok(FleetStatus::not_ready());
        }

        let statuses = self.reader().fleet_statuses(shards).await?;
        let status = aggregate(&statuses);
        debug!(
            ready = status.ready,
            count = status.count,
            last_event = status.last_event,
            "fleet status aggregated"
        );
        Ok(status)
    }

    fn reader(&self) -> ShardCapacityReader {
        ShardCapacityReader::new(self.fleet.clone(), self.call_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::{FleetOp, SimulatedFleet, SimulatedScheduler};

    fn target() -> (Arc<SimulatedFleet>, Arc<SimulatedScheduler>, ShardScaleTarget) {
        let fleet = Arc::new(SimulatedFleet::new().with_shard("rg-a", "web", 2));
        let scheduler = Arc::new(SimulatedScheduler::sharing_log(&fleet));
        let target = ShardScaleTarget::new(fleet.clone(), scheduler.clone())
            .with_call_timeout(Duration::from_secs(30));
        (fleet, scheduler, target)
    }

    #[tokio::test(start_paused = true)]
    async fn configured_timeout_bounds_resize() {
        let fleet = Arc::new(SimulatedFleet::new().with_shard("rg-a", "web", 2));
        fleet
            .delay_op(FleetOp::Resize, "web", Duration::from_secs(60))
            .await;
        let scheduler = Arc::new(SimulatedScheduler::sharing_log(&fleet));
        let config = TargetConfig::new(vec![ShardRef::new("rg-a", "web")])
            .unwrap()
            .with_call_timeout(Duration::from_secs(5));

        let target = ShardScaleTarget::from_config(fleet.clone(), scheduler, &config).unwrap();
        assert_eq!(target.call_timeout(), Duration::from_secs(5));

        let err = target.scale(4, &config.shards).await.unwrap_err();
        let FleetError::Execution(report) = err else {
            panic!("expected execution error");
        };
        assert!(report.has_failed("web"));
        assert_eq!(report.failed[0].message, "timed out after 5s");
        assert_eq!(fleet.capacity("web").await, Some(2));
    }

    #[tokio::test]
    async fn dry_run_makes_no_calls() {
        let (fleet, _, target) = target();
        let outcome = target
            .scale(DRY_RUN_COUNT, &[ShardRef::new("rg-a", "web")])
            .await
            .unwrap();
        assert_eq!(outcome, ScaleOutcome::DryRun);
        assert!(fleet.calls().await.is_empty());
    }

    #[tokio::test]
    async fn negative_target_is_invalid() {
        let (_, _, target) = target();
        let err = target.scale(-5, &[ShardRef::new("rg-a", "web")]).await.unwrap_err();
        assert!(matches!(err, FleetError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn empty_shard_list_is_config_error() {
        let (fleet, _, target) = target();
        let err = target.scale(3, &[]).await.unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
        assert!(fleet.calls().await.is_empty());
    }

    #[tokio::test]
    async fn scheduler_pool_not_ready_skips_fleet() {
        let (fleet, scheduler, target) = target();
        scheduler.set_pool_ready(false).await;

        let status = target.status(&[ShardRef::new("rg-a", "web")]).await.unwrap();
        assert_eq!(status, FleetStatus::not_ready());
        assert_eq!(fleet.calls().await, vec![crate::sim::SimCall::PoolReady]);
    }
}
