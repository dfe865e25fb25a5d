//! Drain-coordinated scale-in.
//!
//! Drives one scale-in through a fixed sequence of phases:
//!
//! ```text
//! CollectingIds ──► PreDrain ──► Deleting ──► PostDrain ──► Done
//!       │              │
//!       └──────────────┴──► Failed   (no instance has been deleted)
//! ```
//!
//! Nothing is deleted before the scheduler has cleared it, and the
//! post-drain hook always runs once deletions have been attempted.
//! Failures in `Deleting` or `PostDrain` do not undo instances that were
//! removed; they are returned as an [`ExecutionReport`].

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info, warn};

use shardscale_core::{
    DrainPhase, ExecutionReport, FleetError, FleetResult, RemoteInstanceId, ShardRef,
};

use crate::capacity::ShardCapacityReader;
use crate::deadline;
use crate::executor::ShardExecutor;
use crate::provider::{DrainHooks, DrainedNode, FleetApi};

/// Where a scale-in currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleInPhase {
    CollectingIds,
    PreDrain,
    Deleting,
    PostDrain,
    Done,
    Failed,
}

/// What a completed scale-in removed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScaleInSummary {
    /// Number of identifiers the scheduler cleared.
    pub cleared: usize,
    /// Instance ids deleted per shard, in shard order.
    pub deleted: Vec<(String, Vec<String>)>,
}

pub struct ScaleInCorrelator {
    reader: ShardCapacityReader,
    executor: ShardExecutor,
    hooks: Arc<dyn DrainHooks>,
    call_timeout: Duration,
    phase: ScaleInPhase,
}

impl ScaleInCorrelator {
    pub fn new(
        fleet: Arc<dyn FleetApi>,
        hooks: Arc<dyn DrainHooks>,
        call_timeout: Duration,
    ) -> Self {
        Self {
            reader: ShardCapacityReader::new(fleet.clone(), call_timeout),
            executor: ShardExecutor::new(fleet, call_timeout),
            hooks,
            call_timeout,
            phase: ScaleInPhase::CollectingIds,
        }
    }

    pub fn phase(&self) -> ScaleInPhase {
        self.phase
    }

    /// Remove `count` instances from `shards` with scheduler coordination.
    pub async fn run(&mut self, shards: &[ShardRef], count: u64) -> FleetResult<ScaleInSummary> {
        self.enter(ScaleInPhase::CollectingIds);
        let result = self.drive(shards, count).await;
        match result {
            Ok(_) => self.enter(ScaleInPhase::Done),
            Err(ref e) if e.is_blocking() => self.enter(ScaleInPhase::Failed),
            // Deletions were attempted; the summary is in the report.
            Err(_) => self.enter(ScaleInPhase::Done),
        }
        result
    }

    async fn drive(&mut self, shards: &[ShardRef], count: u64) -> FleetResult<ScaleInSummary> {
        let mut candidates = Vec::new();
        for shard in shards {
            debug!(shard = %shard.name, scope = %shard.scope, "collecting running instance ids");
            let ids = self.reader.running_remote_ids(shard).await?;
            candidates.extend(ids.iter().map(ToString::to_string));
        }

        self.enter(ScaleInPhase::PreDrain);
        let cleared = deadline::within(self.call_timeout, self.hooks.pre_drain(&candidates, count))
            .await
            .map_err(|message| FleetError::Drain {
                phase: DrainPhase::PreDrain,
                message,
            })?;
        debug!(
            candidates = candidates.len(),
            requested = count,
            cleared = cleared.len(),
            "scheduler cleared nodes for termination"
        );

        let work = correlate(&cleared, shards)?;

        self.enter(ScaleInPhase::Deleting);
        let deletion = self.executor.shrink_all(&work).await;

        self.enter(ScaleInPhase::PostDrain);
        let post_drain = deadline::within(self.call_timeout, self.hooks.post_drain(&cleared)).await;

        let deleted: Vec<(String, Vec<String>)> = work
            .into_iter()
            .filter(|(_, ids)| !ids.is_empty())
            .map(|(shard, ids)| (shard.name, ids))
            .collect();

        let mut report = match deletion {
            Ok(_) => ExecutionReport::default(),
            Err(report) => report,
        };
        if let Err(message) = post_drain {
            warn!(error = %message, "post-drain hook failed after deletion");
            report.post_drain_error = Some(message);
        }

        if !report.is_clean() {
            if report.succeeded.is_empty() && report.failed.is_empty() {
                report.succeeded = deleted.iter().map(|(s, _)| s.clone()).collect();
            }
            warn!(%report, "scale-in finished with failures");
            return Err(FleetError::Execution(report));
        }

        info!(
            cleared = cleared.len(),
            shards = deleted.len(),
            "scale-in complete"
        );
        Ok(ScaleInSummary {
            cleared: cleared.len(),
            deleted,
        })
    }

    fn enter(&mut self, next: ScaleInPhase) {
        debug!(from = ?self.phase, to = ?next, "scale-in phase");
        self.phase = next;
    }
}

/// Map cleared nodes back to per-shard instance-id sets, in shard order.
///
/// Every identifier must split on its last `_` and its prefix must name
/// exactly one shard (case-insensitively). Any identifier that does not
/// fails the whole batch so no partial, unaccounted deletion can happen.
pub fn correlate(
    cleared: &[DrainedNode],
    shards: &[ShardRef],
) -> FleetResult<Vec<(ShardRef, Vec<String>)>> {
    let mut work: Vec<(ShardRef, Vec<String>)> =
        shards.iter().map(|s| (s.clone(), Vec::new())).collect();

    for node in cleared {
        let id = RemoteInstanceId::parse(&node.remote_id)?;
        let prefix = id.shard().to_lowercase();

        let mut matches = work
            .iter_mut()
            .filter(|(shard, _)| shard.name.to_lowercase() == prefix);
        let slot = match (matches.next(), matches.next()) {
            (Some(slot), None) => slot,
            (None, _) => {
                warn!(remote_id = %node.remote_id, "cleared node does not belong to any shard");
                return Err(FleetError::MalformedId(node.remote_id.clone()));
            }
            (Some(_), Some(_)) => {
                warn!(remote_id = %node.remote_id, "cleared node matches more than one shard");
                return Err(FleetError::MalformedId(node.remote_id.clone()));
            }
        };

        let instance = id.instance_id().to_string();
        if !slot.1.contains(&instance) {
            slot.1.push(instance);
        }
    }

    Ok(work)
}
