use std::fmt::Write;

use shardscale_core::{FleetSnapshot, ScaleDirection, ScalingPlan, ShardRef};

pub fn plan(capacities: &[u64], target: u64, format: &str) -> anyhow::Result<()> {
    let snapshot = snapshot_of(capacities);
    let plan = shardscale_core::plan(&snapshot, target)?;

    match format {
        "json" => {
            println!("{}", serde_json::to_string_pretty(&plan)?);
        }
        _ => {
            print!("{}", format_plan(&snapshot, target, &plan));
        }
    }

    Ok(())
}

/// Shards named `shard-0`, `shard-1`, ... in one local scope.
fn snapshot_of(capacities: &[u64]) -> FleetSnapshot {
    capacities
        .iter()
        .enumerate()
        .map(|(i, &c)| (ShardRef::new("local", format!("shard-{i}")), c))
        .collect()
}

fn format_plan(snapshot: &FleetSnapshot, target: u64, plan: &ScalingPlan) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "current {} → target {}: {} by {}",
        snapshot.total(),
        target,
        plan.direction,
        plan.magnitude
    );

    for ((shard, capacity), delta) in snapshot.iter().zip(&plan.per_shard_delta) {
        let line = match plan.direction {
            ScaleDirection::Grow => format!("resize to {delta}"),
            ScaleDirection::Shrink => format!("remove {delta}"),
            ScaleDirection::NoChange => "unchanged".to_string(),
        };
        let _ = writeln!(out, "  {:<12} {:>5}  {line}", shard.name, capacity);
    }
    out
}
