//! Domain types for fleet scaling.
//!
//! These values live for a single Scale or Status call. They are
//! serializable so the CLI can print them and simulated fleets can be
//! described in TOML.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Sentinel target count meaning "dry run": the call must not touch the fleet.
pub const DRY_RUN_COUNT: i64 = -1;

/// `last_event` value reported when no instance carried an event time.
pub const NO_EVENTS_OBSERVED: i64 = i64::MIN;

/// Key under which [`FleetStatus::meta`] reports the last event time.
pub const LAST_EVENT_META_KEY: &str = "last_event";

// ── Shards ────────────────────────────────────────────────────────

/// Identity of one scale group.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ShardRef {
    /// Resource scope the shard lives in (e.g. a resource group).
    pub scope: String,
    /// Shard name, also the prefix of its remote instance ids.
    pub name: String,
}

impl ShardRef {
    pub fn new(scope: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            scope: scope.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ShardRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope, self.name)
    }
}

/// Capacity of every shard at the start of an operation, in shard order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    entries: Vec<(ShardRef, u64)>,
}

impl FleetSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a shard. Order of calls is the order used for remainders.
    pub fn push(&mut self, shard: ShardRef, capacity: u64) {
        self.entries.push((shard, capacity));
    }

    /// Sum of all shard capacities.
    pub fn total(&self) -> u64 {
        self.entries.iter().map(|(_, c)| c).sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ShardRef, u64)> {
        self.entries.iter().map(|(s, c)| (s, *c))
    }

    pub fn shards(&self) -> impl Iterator<Item = &ShardRef> {
        self.entries.iter().map(|(s, _)| s)
    }
}

impl FromIterator<(ShardRef, u64)> for FleetSnapshot {
    fn from_iter<I: IntoIterator<Item = (ShardRef, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

// ── Plans ─────────────────────────────────────────────────────────

/// Which way a plan moves the fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScaleDirection {
    Grow,
    Shrink,
    NoChange,
}

impl fmt::Display for ScaleDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScaleDirection::Grow => f.write_str("grow"),
            ScaleDirection::Shrink => f.write_str("shrink"),
            ScaleDirection::NoChange => f.write_str("none"),
        }
    }
}

/// Per-shard split of one scaling decision.
///
/// `per_shard_delta[i]` belongs to the i-th shard of the snapshot the plan
/// was built from, and the deltas always sum to `magnitude`. For
/// [`ScaleDirection::Grow`] each delta is the absolute capacity handed to
/// that shard's resize call; for [`ScaleDirection::Shrink`] it is a count
/// of instances to remove.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScalingPlan {
    pub direction: ScaleDirection,
    pub magnitude: u64,
    pub per_shard_delta: Vec<u64>,
}

impl ScalingPlan {
    pub fn is_noop(&self) -> bool {
        self.direction == ScaleDirection::NoChange
    }
}

// ── Instances ─────────────────────────────────────────────────────

/// Power state of a provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PowerState {
    Starting,
    Running,
    Stopping,
    Stopped,
    Deallocating,
    Deallocated,
    Unknown,
}

/// Provisioning state of a provider instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProvisioningState {
    Creating,
    Updating,
    Succeeded,
    Failed,
    Deleting,
    Unknown,
}

/// One instance as reported by the fleet API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceRecord {
    pub instance_id: String,
    pub power_state: PowerState,
    /// Provisioning state of the VM itself.
    pub provisioning_state: ProvisioningState,
    /// Provisioning state from the separately reported instance view, if any.
    #[serde(default)]
    pub instance_view_state: Option<ProvisioningState>,
    /// Time of the most recent provider event, Unix epoch nanoseconds.
    /// Often absent while an operation is still in flight.
    #[serde(default)]
    pub last_event: Option<i64>,
}

impl InstanceRecord {
    /// A running instance with both states succeeded and no event time.
    pub fn running(instance_id: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            power_state: PowerState::Running,
            provisioning_state: ProvisioningState::Succeeded,
            instance_view_state: Some(ProvisioningState::Succeeded),
            last_event: None,
        }
    }

    /// Only instances that are exactly `running` may be drained and removed.
    pub fn is_drain_candidate(&self) -> bool {
        self.power_state == PowerState::Running
    }

    /// Not ready if either the VM or its instance view reports non-success.
    pub fn is_provisioned(&self) -> bool {
        self.provisioning_state == ProvisioningState::Succeeded
            && self
                .instance_view_state
                .is_none_or(|s| s == ProvisioningState::Succeeded)
    }
}

// ── Status ────────────────────────────────────────────────────────

/// Health and size of one shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShardStatus {
    pub capacity: u64,
    pub ready: bool,
    /// Latest known event time in epoch nanoseconds, `None` if unknown.
    pub last_event: Option<i64>,
}

/// Health and size of the whole fleet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetStatus {
    pub ready: bool,
    pub count: u64,
    /// Latest event across the fleet, or [`NO_EVENTS_OBSERVED`].
    pub last_event: i64,
}

impl FleetStatus {
    /// Status reported while the scheduler pool itself is not ready.
    pub fn not_ready() -> Self {
        Self {
            ready: false,
            count: 0,
            last_event: NO_EVENTS_OBSERVED,
        }
    }

    pub fn has_events(&self) -> bool {
        self.last_event != NO_EVENTS_OBSERVED
    }

    /// String-map form used by callers that carry status metadata as text.
    pub fn meta(&self) -> BTreeMap<String, String> {
        BTreeMap::from([(LAST_EVENT_META_KEY.to_string(), self.last_event.to_string())])
    }
}
