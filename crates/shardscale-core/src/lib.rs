//! shardscale-core: the pure half of the shardscale target adapter.
//!
//! Holds the fleet data model and every decision that needs no I/O:
//!
//! - [`plan`] turns one aggregate target count into a per-shard delta
//! - [`remote_id`] encodes and decodes the `<shard>_<instance>` identifiers
//!   exchanged with the workload scheduler
//! - [`status`] merges per-shard health into one fleet answer
//! - [`config`] parses the adapter's flat string configuration
//!
//! # Data flow
//!
//! ```text
//! TargetConfig ──► [ShardRef]
//!                     │
//!       capacity reads (shardscale-target)
//!                     ▼
//!               FleetSnapshot ──plan()──► ScalingPlan
//!
//!   [ShardStatus] ──aggregate()──► FleetStatus
//! ```
//!
//! Nothing here is cached between operations; every value is rebuilt from
//! live queries by the caller.

pub mod config;
pub mod error;
pub mod plan;
pub mod remote_id;
pub mod status;
pub mod types;

pub use config::{AuthMode, ProviderCredentials, TargetConfig};
pub use error::{DrainPhase, ExecutionReport, FleetError, FleetResult, ShardFailure, ShardPhase};
pub use plan::{plan, scale_direction, split_evenly};
pub use remote_id::RemoteInstanceId;
pub use status::aggregate;
pub use types::*;
