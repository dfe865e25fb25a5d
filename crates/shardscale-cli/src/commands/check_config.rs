use std::fmt::Write;
use std::path::Path;

use shardscale_core::{AuthMode, TargetConfig};

pub fn check_config(path: &Path) -> anyhow::Result<()> {
    let config = TargetConfig::from_file(path)?;
    print!("{}", format_config(&config));
    Ok(())
}

fn format_config(config: &TargetConfig) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "✓ {} shard(s)", config.shards.len());
    for shard in &config.shards {
        let _ = writeln!(out, "  {shard}");
    }
    let _ = writeln!(out, "call timeout: {:?}", config.call_timeout);
    let auth = match config.credentials.auth_mode() {
        AuthMode::ClientCredentials => "client credentials",
        AuthMode::Environment => "environment",
    };
    let _ = writeln!(out, "auth: {auth}");
    out
}
