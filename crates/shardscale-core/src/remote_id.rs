//! Remote instance identifiers exchanged with the workload scheduler.
//!
//! The scheduler sees a node by a single string `<shard>_<instance>`.
//! Shard names may themselves contain `_`, instance ids never do, so the
//! string is always split on the last separator.

use std::fmt;
use std::str::FromStr;

use crate::error::{FleetError, FleetResult};

/// Separator between the shard name and the instance id.
pub const SEPARATOR: char = '_';

/// A `(shard, instance)` pair addressed by the scheduler.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RemoteInstanceId {
    shard: String,
    instance_id: String,
}

impl RemoteInstanceId {
    pub fn new(shard: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self {
            shard: shard.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Parse `<shard>_<instance>`, splitting on the last `_`.
    ///
    /// Fails with [`FleetError::MalformedId`] if there is no separator or
    /// either side is empty.
    pub fn parse(raw: &str) -> FleetResult<Self> {
        match raw.rsplit_once(SEPARATOR) {
            Some((shard, instance)) if !shard.is_empty() && !instance.is_empty() => {
                Ok(Self::new(shard, instance))
            }
            _ => Err(FleetError::MalformedId(raw.to_string())),
        }
    }

    pub fn shard(&self) -> &str {
        &self.shard
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn into_parts(self) -> (String, String) {
        (self.shard, self.instance_id)
    }
}

impl fmt::Display for RemoteInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.shard, SEPARATOR, self.instance_id)
    }
}

impl FromStr for RemoteInstanceId {
    type Err = FleetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
