use std::path::Path;
use std::sync::Arc;

use shardscale_target::ShardScaleTarget;
use shardscale_target::sim::FleetDescription;
use tracing::info;

pub async fn simulate(fleet_file: &Path, target: i64) -> anyhow::Result<()> {
    let content = std::fs::read_to_string(fleet_file)?;
    let description = FleetDescription::from_toml_str(&content)?;
    let report = run(&description, target).await?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

async fn run(description: &FleetDescription, target: i64) -> anyhow::Result<serde_json::Value> {
    let config = description.target_config()?;
    let (fleet, scheduler) = description.build();
    let adapter = ShardScaleTarget::from_config(Arc::new(fleet), Arc::new(scheduler), &config)?;
    info!(
        shards = config.shards.len(),
        call_timeout = ?config.call_timeout,
        "simulating scale"
    );

    let outcome = adapter.scale(target, &config.shards).await?;
    info!(?outcome, "simulated scale finished");

    let status = adapter.status(&config.shards).await?;
    Ok(serde_json::json!({
        "outcome": outcome,
        "status": status,
        "meta": status.meta(),
    }))
}
