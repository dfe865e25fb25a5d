//! Delta planner. Splits one aggregate target across shards.
//!
//! # Algorithm
//!
//! ```text
//! current = sum(snapshot capacities)
//!
//! target < current:  Shrink, magnitude = current - target
//! target > current:  Grow,   magnitude = target
//! otherwise:         NoChange
//!
//! base = magnitude / shards,  rem = magnitude % shards
//! delta[i] = base + 1  for i < rem
//! delta[i] = base      otherwise
//! ```
//!
//! Grow carries the absolute target, not the difference: each shard's
//! share is passed straight to a resize call that takes an absolute
//! capacity. Shrink carries the number of instances to remove.

use tracing::debug;

use crate::error::{FleetError, FleetResult};
use crate::types::{FleetSnapshot, ScaleDirection, ScalingPlan};

/// Build a plan for moving `snapshot` to `target_total` instances.
pub fn plan(snapshot: &FleetSnapshot, target_total: u64) -> FleetResult<ScalingPlan> {
    let current = snapshot.total();
    let (magnitude, direction) = scale_direction(current, target_total);
    let per_shard_delta = split_evenly(magnitude, snapshot.len())?;

    debug!(
        current,
        target = target_total,
        %direction,
        magnitude,
        shards = snapshot.len(),
        "scale direction calculated"
    );

    Ok(ScalingPlan {
        direction,
        magnitude,
        per_shard_delta,
    })
}

/// Direction and magnitude for moving from `current` to `target`.
pub fn scale_direction(current: u64, target: u64) -> (u64, ScaleDirection) {
    if target < current {
        (current - target, ScaleDirection::Shrink)
    } else if target > current {
        (target, ScaleDirection::Grow)
    } else {
        (0, ScaleDirection::NoChange)
    }
}

/// Split `magnitude` over `shards` as evenly as possible.
///
/// Remainder units go to the lowest indices first.
pub fn split_evenly(magnitude: u64, shards: usize) -> FleetResult<Vec<u64>> {
    if shards == 0 {
        return Err(FleetError::InvalidInput(
            "cannot split a scaling delta over zero shards".to_string(),
        ));
    }
    let n = shards as u64;
    let base = magnitude / n;
    let remainder = magnitude % n;

    Ok((0..n)
        .map(|i| if i < remainder { base + 1 } else { base })
        .collect())
}
