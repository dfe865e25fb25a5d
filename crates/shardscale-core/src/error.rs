//! Error types for fleet scaling operations.
//!
//! Every variant carries enough context to name the shard and phase that
//! failed. `Config`, `InvalidInput`, `Query`, `Drain` and `MalformedId`
//! are raised before any mutating call is issued. `Execution` is raised
//! after every dispatched shard task has finished.

use std::fmt;

use thiserror::Error;

/// Result type alias for fleet operations.
pub type FleetResult<T> = Result<T, FleetError>;

/// Errors that can occur while planning, executing, or reporting on a fleet.
#[derive(Debug, Error)]
pub enum FleetError {
    #[error("config error: {0}")]
    Config(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("query failed for shard {shard}: {message}")]
    Query { shard: String, message: String },

    #[error("{phase} hook failed: {message}")]
    Drain { phase: DrainPhase, message: String },

    #[error("scheduler readiness check failed: {0}")]
    Scheduler(String),

    #[error("malformed remote instance id: {0}")]
    MalformedId(String),

    #[error("execution failed: {0}")]
    Execution(ExecutionReport),
}

impl FleetError {
    /// Whether this error was raised before any resize/delete was issued.
    ///
    /// The post-drain hook only runs after deletions, so its failure is
    /// never blocking.
    pub fn is_blocking(&self) -> bool {
        !matches!(
            self,
            FleetError::Execution(_)
                | FleetError::Drain {
                    phase: DrainPhase::PostDrain,
                    ..
                }
        )
    }
}

/// Scheduler hook that a [`FleetError::Drain`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainPhase {
    PreDrain,
    PostDrain,
}

impl fmt::Display for DrainPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DrainPhase::PreDrain => f.write_str("pre-drain"),
            DrainPhase::PostDrain => f.write_str("post-drain"),
        }
    }
}

/// The mutating step a shard task was performing when it failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardPhase {
    Resize,
    Delete,
}

impl fmt::Display for ShardPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShardPhase::Resize => f.write_str("resize"),
            ShardPhase::Delete => f.write_str("delete"),
        }
    }
}

/// One shard's failed execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardFailure {
    pub shard: String,
    pub phase: ShardPhase,
    pub message: String,
}

impl fmt::Display for ShardFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({}: {})", self.shard, self.phase, self.message)
    }
}

/// Summary of a fan-out that did not fully succeed.
///
/// Shards listed in `succeeded` were not rolled back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionReport {
    /// Every shard whose task failed, in shard order.
    pub failed: Vec<ShardFailure>,
    /// Shards whose task completed.
    pub succeeded: Vec<String>,
    /// Set when the post-drain hook failed after deletions ran.
    pub post_drain_error: Option<String>,
}

impl ExecutionReport {
    /// True unless every dispatched shard failed.
    ///
    /// A report whose only failure is the post-drain hook is partial even
    /// when no shard had anything to delete.
    pub fn is_partial(&self) -> bool {
        !self.succeeded.is_empty() || self.failed.is_empty()
    }

    /// Whether the named shard is listed as failed.
    pub fn has_failed(&self, shard: &str) -> bool {
        self.failed.iter().any(|f| f.shard == shard)
    }

    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && self.post_drain_error.is_none()
    }
}

impl fmt::Display for ExecutionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.failed.len() + self.succeeded.len();
        if !self.failed.is_empty() {
            write!(f, "{} of {} shards failed: ", self.failed.len(), total)?;
            for (i, failure) in self.failed.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{failure}")?;
            }
        }
        if let Some(ref e) = self.post_drain_error {
            if !self.failed.is_empty() {
                f.write_str("; ")?;
            }
            write!(f, "post-drain hook failed: {e}")?;
        }
        Ok(())
    }
}
