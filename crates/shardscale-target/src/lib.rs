//! shardscale-target: executes scaling decisions against a sharded fleet.
//!
//! [`ShardScaleTarget`] is the entry point. It reads live capacity from
//! every shard, plans with `shardscale-core`, and applies the plan:
//!
//! ```text
//! scale(target, shards)
//!   ├── ShardCapacityReader  (capacity per shard → FleetSnapshot)
//!   ├── plan()               (direction + per-shard delta)
//!   ├── grow:   ShardExecutor    (one resize task per shard, all joined)
//!   └── shrink: ScaleInCorrelator
//!         CollectingIds → PreDrain → Deleting → PostDrain → Done
//!
//! status(shards)
//!   ├── DrainHooks::is_pool_ready()
//!   ├── ShardCapacityReader  (one status task per shard)
//!   └── aggregate()
//! ```
//!
//! The fleet API and the scheduler are reached only through the
//! [`FleetApi`] and [`DrainHooks`] traits. [`sim`] provides in-memory
//! implementations for tests and the CLI.

pub mod capacity;
pub mod correlator;
mod deadline;
pub mod executor;
pub mod provider;
pub mod sim;
pub mod target;

pub use capacity::ShardCapacityReader;
pub use correlator::{ScaleInCorrelator, ScaleInPhase, ScaleInSummary};
pub use executor::ShardExecutor;
pub use provider::{DrainHooks, DrainedNode, FleetApi, NodeNameLookup, SchedulerNode};
pub use target::{ScaleOutcome, ShardScaleTarget};
