//! Merges per-shard health into one fleet-wide status.
//!
//! ```text
//! ready      = AND over shards (and over every instance within a shard)
//! count      = SUM of shard capacities
//! last_event = MAX of known event times, NO_EVENTS_OBSERVED if none
//! ```

use crate::types::{FleetStatus, InstanceRecord, NO_EVENTS_OBSERVED, ShardStatus};

/// Merge shard statuses. Every shard is visited, even after one is not ready.
pub fn aggregate(statuses: &[ShardStatus]) -> FleetStatus {
    let mut ready = true;
    let mut count: u64 = 0;
    let mut last_event = NO_EVENTS_OBSERVED;

    for status in statuses {
        count += status.capacity;
        if !status.ready {
            ready = false;
        }
        if let Some(t) = status.last_event
            && t > last_event
        {
            last_event = t;
        }
    }

    FleetStatus {
        ready,
        count,
        last_event,
    }
}

impl ShardStatus {
    /// Build a shard's status from its capacity and instance listing.
    pub fn from_instances(capacity: u64, instances: &[InstanceRecord]) -> Self {
        Self {
            capacity,
            ready: instances.iter().all(InstanceRecord::is_provisioned),
            last_event: instances.iter().filter_map(|i| i.last_event).max(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ProvisioningState;

    fn shard(ready: bool, capacity: u64, last_event: Option<i64>) -> ShardStatus {
        ShardStatus {
            capacity,
            ready,
            last_event,
        }
    }

    #[test]
    fn merges_ready_count_and_latest_event() {
        let statuses = [shard(true, 2, Some(100)), shard(false, 3, Some(200))];
        let status = aggregate(&statuses);

        assert_eq!(
            status,
            FleetStatus {
                ready: false,
                count: 5,
                last_event: 200
            }
        );
    }

    #[test]
    fn aggregation_is_idempotent() {
        let statuses = [
            shard(true, 1, None),
            shard(true, 4, Some(50)),
            shard(false, 0, Some(-10)),
        ];
        assert_eq!(aggregate(&statuses), aggregate(&statuses));
    }

    #[test]
    fn not_ready_shard_does_not_stop_counting() {
        let statuses = [shard(false, 2, Some(10)), shard(true, 3, Some(500))];
        let status = aggregate(&statuses);
        assert_eq!(status.count, 5);
        assert_eq!(status.last_event, 500);
    }

    #[test]
    fn unknown_events_report_sentinel() {
        let statuses = [shard(true, 2, None), shard(true, 1, None)];
        let status = aggregate(&statuses);
        assert!(status.ready);
        assert_eq!(status.last_event, NO_EVENTS_OBSERVED);
    }

    #[test]
    fn empty_fleet_is_ready_and_empty() {
        let status = aggregate(&[]);
        assert!(status.ready);
        assert_eq!(status.count, 0);
        assert!(!status.has_events());
    }

    #[test]
    fn shard_status_from_instances() {
        let mut a = InstanceRecord::running("0");
        a.last_event = Some(1_000);
        let mut b = InstanceRecord::running("1");
        b.last_event = Some(3_000);
        let c = InstanceRecord::running("2");

        let status = ShardStatus::from_instances(3, &[a, b.clone(), c]);
        assert!(status.ready);
        assert_eq!(status.last_event, Some(3_000));

        b.instance_view_state = Some(ProvisioningState::Failed);
        let status = ShardStatus::from_instances(3, &[b]);
        assert!(!status.ready);
    }

    #[test]
    fn shard_without_instances_is_ready() {
        let status = ShardStatus::from_instances(0, &[]);
        assert!(status.ready);
        assert_eq!(status.last_event, None);
    }
}
