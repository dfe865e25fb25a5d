//! Target configuration.
//!
//! A target adapter receives its configuration as a flat string map.
//! [`TargetConfig::from_map`] turns that map into a validated shard list;
//! [`TargetConfig::from_toml_str`] accepts the same settings as TOML for
//! the CLI.
//!
//! ```toml
//! call_timeout = "10m"
//!
//! [[shards]]
//! scope = "rg-east"
//! name = "web"
//!
//! [credentials]
//! tenant_id = "..."
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{FleetError, FleetResult};
use crate::types::ShardRef;

pub const KEY_RESOURCE_SCOPE_LIST: &str = "resource_scope_list";
pub const KEY_SHARD_LIST: &str = "shard_list";
pub const KEY_SHARD_COUNT: &str = "shard_count";
pub const KEY_CALL_TIMEOUT: &str = "call_timeout";

pub const KEY_TENANT_ID: &str = "tenant_id";
pub const KEY_CLIENT_ID: &str = "client_id";
pub const KEY_SUBSCRIPTION_ID: &str = "subscription_id";
pub const KEY_SECRET_KEY: &str = "secret_key";

pub const ENV_TENANT_ID: &str = "ARM_TENANT_ID";
pub const ENV_CLIENT_ID: &str = "ARM_CLIENT_ID";
pub const ENV_SUBSCRIPTION_ID: &str = "ARM_SUBSCRIPTION_ID";
pub const ENV_CLIENT_SECRET: &str = "ARM_CLIENT_SECRET";

/// Deadline applied to each fleet API call when none is configured.
/// Provider resize and delete operations routinely take minutes.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(600);

/// Validated configuration for one fleet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetConfig {
    /// Shards in configuration order.
    pub shards: Vec<ShardRef>,
    /// Deadline for every individual fleet API or scheduler call.
    pub call_timeout: Duration,
    pub credentials: ProviderCredentials,
}

impl TargetConfig {
    /// Build from shards with the default call timeout.
    pub fn new(shards: Vec<ShardRef>) -> FleetResult<Self> {
        validate_shards(&shards)?;
        Ok(Self {
            shards,
            call_timeout: DEFAULT_CALL_TIMEOUT,
            credentials: ProviderCredentials::default(),
        })
    }

    pub fn with_call_timeout(self, call_timeout: Duration) -> Self {
        Self {
            call_timeout,
            ..self
        }
    }

    pub fn with_credentials(self, credentials: ProviderCredentials) -> Self {
        Self {
            credentials,
            ..self
        }
    }

    /// Parse the adapter's flat string map.
    ///
    /// `resource_scope_list` and `shard_list` are comma-separated lists
    /// zipped by index. Credentials missing from the map are taken from
    /// the `ARM_*` environment variables.
    pub fn from_map(config: &HashMap<String, String>) -> FleetResult<Self> {
        Self::from_map_with_env(config, |key| std::env::var(key).ok())
    }

    /// Parse the flat map with an explicit environment lookup.
    pub fn from_map_with_env<F>(config: &HashMap<String, String>, env: F) -> FleetResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let scopes = required_list(config, KEY_RESOURCE_SCOPE_LIST)?;
        let names = required_list(config, KEY_SHARD_LIST)?;

        if scopes.len() != names.len() {
            return Err(FleetError::Config(format!(
                "{KEY_RESOURCE_SCOPE_LIST} has {} entries but {KEY_SHARD_LIST} has {}",
                scopes.len(),
                names.len()
            )));
        }

        if let Some(raw) = config.get(KEY_SHARD_COUNT) {
            let count: usize = raw.trim().parse().map_err(|_| {
                FleetError::Config(format!(
                    "config param {KEY_SHARD_COUNT} is not a number: {raw:?}"
                ))
            })?;
            if count != names.len() {
                return Err(FleetError::Config(format!(
                    "{KEY_SHARD_COUNT} is {count} but {} shards are listed",
                    names.len()
                )));
            }
        }

        let call_timeout = match config.get(KEY_CALL_TIMEOUT) {
            Some(raw) => parse_duration(raw)?,
            None => DEFAULT_CALL_TIMEOUT,
        };

        let shards = scopes
            .into_iter()
            .zip(names)
            .map(|(scope, name)| ShardRef::new(scope, name))
            .collect();

        Ok(Self::new(shards)?
            .with_call_timeout(call_timeout)
            .with_credentials(ProviderCredentials::from_map_with_env(config, env)))
    }

    /// Parse the TOML form of the configuration.
    pub fn from_toml_str(content: &str) -> FleetResult<Self> {
        let file: TargetFile =
            toml::from_str(content).map_err(|e| FleetError::Config(e.to_string()))?;

        let call_timeout = match file.call_timeout {
            Some(ref raw) => parse_duration(raw)?,
            None => DEFAULT_CALL_TIMEOUT,
        };
        Ok(Self::new(file.shards)?
            .with_call_timeout(call_timeout)
            .with_credentials(ProviderCredentials::from_map(&file.credentials)))
    }

    pub fn from_file(path: &Path) -> FleetResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            FleetError::Config(format!("failed to read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }
}

#[derive(Debug, Deserialize)]
struct TargetFile {
    shards: Vec<ShardRef>,
    call_timeout: Option<String>,
    /// Same keys as the flat map: tenant_id, client_id, subscription_id, secret_key.
    #[serde(default)]
    credentials: HashMap<String, String>,
}

/// Reject shard lists the correlator could not address unambiguously.
pub fn validate_shards(shards: &[ShardRef]) -> FleetResult<()> {
    if shards.is_empty() {
        return Err(FleetError::Config("at least one shard is required".to_string()));
    }

    let mut seen = HashSet::new();
    for shard in shards {
        if shard.scope.is_empty() || shard.name.is_empty() {
            return Err(FleetError::Config(format!(
                "shard entries must have a scope and a name, got {shard:?}"
            )));
        }
        // Remote ids are matched case-insensitively by shard name.
        if !seen.insert(shard.name.to_lowercase()) {
            return Err(FleetError::Config(format!(
                "duplicate shard name {:?} (names are compared case-insensitively)",
                shard.name
            )));
        }
    }
    Ok(())
}

fn required_list(config: &HashMap<String, String>, key: &str) -> FleetResult<Vec<String>> {
    let raw = config
        .get(key)
        .ok_or_else(|| FleetError::Config(format!("required config param {key} not found")))?;

    let items: Vec<String> = raw.split(',').map(|s| s.trim().to_string()).collect();
    if items.iter().any(String::is_empty) {
        return Err(FleetError::Config(format!("config param {key} has an empty entry: {raw:?}")));
    }
    Ok(items)
}

/// Parse a duration string like "30s", "5m", or bare seconds.
pub fn parse_duration(s: &str) -> FleetResult<Duration> {
    let s = s.trim();
    let parsed = if let Some(secs) = s.strip_suffix('s') {
        secs.parse::<u64>().ok()
    } else if let Some(mins) = s.strip_suffix('m') {
        mins.parse::<u64>().ok().map(|m| m * 60)
    } else {
        s.parse::<u64>().ok()
    };

    match parsed {
        Some(0) | None => Err(FleetError::Config(format!("invalid duration: {s:?}"))),
        Some(secs) => Ok(Duration::from_secs(secs)),
    }
}

// ── Credentials ───────────────────────────────────────────────────

/// How the fleet API client should authenticate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    /// Explicit tenant, client, and secret were supplied.
    ClientCredentials,
    /// Defer to whatever the provider SDK finds in the environment.
    Environment,
}

/// Provider credentials, each taken from the config map or else the
/// environment.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ProviderCredentials {
    pub tenant_id: Option<String>,
    pub client_id: Option<String>,
    pub subscription_id: Option<String>,
    pub client_secret: Option<String>,
}

impl ProviderCredentials {
    pub fn from_map(config: &HashMap<String, String>) -> Self {
        Self::from_map_with_env(config, |key| std::env::var(key).ok())
    }

    /// Resolve with an explicit environment lookup.
    pub fn from_map_with_env<F>(config: &HashMap<String, String>, env: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |key: &str, var: &str| {
            config
                .get(key)
                .cloned()
                .or_else(|| env(var))
                .filter(|v| !v.is_empty())
        };

        Self {
            tenant_id: lookup(KEY_TENANT_ID, ENV_TENANT_ID),
            client_id: lookup(KEY_CLIENT_ID, ENV_CLIENT_ID),
            subscription_id: lookup(KEY_SUBSCRIPTION_ID, ENV_SUBSCRIPTION_ID),
            client_secret: lookup(KEY_SECRET_KEY, ENV_CLIENT_SECRET),
        }
    }

    pub fn auth_mode(&self) -> AuthMode {
        if self.tenant_id.is_some() && self.client_id.is_some() && self.client_secret.is_some() {
            AuthMode::ClientCredentials
        } else {
            AuthMode::Environment
        }
    }
}

impl fmt::Debug for ProviderCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("subscription_id", &self.subscription_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn map(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn parses_zipped_lists() {
        let config = TargetConfig::from_map(&map(&[
            (KEY_RESOURCE_SCOPE_LIST, "rg-a, rg-b"),
            (KEY_SHARD_LIST, "web,web_gpu"),
        ]))
        .unwrap();

        assert_eq!(
            config.shards,
            vec![ShardRef::new("rg-a", "web"), ShardRef::new("rg-b", "web_gpu")]
        );
        assert_eq!(config.call_timeout, DEFAULT_CALL_TIMEOUT);
    }

    #[test]
    fn missing_list_is_config_error() {
        let err = TargetConfig::from_map(&map(&[(KEY_SHARD_LIST, "web")])).unwrap_err();
        assert!(matches!(err, FleetError::Config(ref m) if m.contains(KEY_RESOURCE_SCOPE_LIST)));
    }

    #[test]
    fn mismatched_lengths_are_rejected() {
        let err = TargetConfig::from_map(&map(&[
            (KEY_RESOURCE_SCOPE_LIST, "rg-a"),
            (KEY_SHARD_LIST, "web,batch"),
        ]))
        .unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
    }

    #[test]
    fn shard_count_must_match_and_be_numeric() {
        let base = [(KEY_RESOURCE_SCOPE_LIST, "rg-a,rg-b"), (KEY_SHARD_LIST, "web,batch")];

        let mut ok = map(&base);
        ok.insert(KEY_SHARD_COUNT.into(), "2".into());
        assert!(TargetConfig::from_map(&ok).is_ok());

        let mut wrong = map(&base);
        wrong.insert(KEY_SHARD_COUNT.into(), "3".into());
        assert!(TargetConfig::from_map(&wrong).is_err());

        let mut nan = map(&base);
        nan.insert(KEY_SHARD_COUNT.into(), "two".into());
        assert!(TargetConfig::from_map(&nan).is_err());
    }

    #[test]
    fn case_insensitive_duplicates_are_rejected() {
        let err = TargetConfig::from_map(&map(&[
            (KEY_RESOURCE_SCOPE_LIST, "rg-a,rg-b"),
            (KEY_SHARD_LIST, "Web,web"),
        ]))
        .unwrap_err();
        assert!(matches!(err, FleetError::Config(ref m) if m.contains("duplicate")));
    }

    #[test]
    fn empty_entries_are_rejected() {
        let err = TargetConfig::from_map(&map(&[
            (KEY_RESOURCE_SCOPE_LIST, "rg-a,"),
            (KEY_SHARD_LIST, "web,batch"),
        ]))
        .unwrap_err();
        assert!(matches!(err, FleetError::Config(_)));
    }

    #[test]
    fn call_timeout_is_parsed() {
        let config = TargetConfig::from_map(&map(&[
            (KEY_RESOURCE_SCOPE_LIST, "rg-a"),
            (KEY_SHARD_LIST, "web"),
            (KEY_CALL_TIMEOUT, "2m"),
        ]))
        .unwrap();
        assert_eq!(config.call_timeout, Duration::from_secs(120));
    }

    #[test]
    fn parse_duration_values() {
        assert_eq!(parse_duration("30s").unwrap(), Duration::from_secs(30));
        assert_eq!(parse_duration("5m").unwrap(), Duration::from_secs(300));
        assert_eq!(parse_duration("45").unwrap(), Duration::from_secs(45));
        assert!(parse_duration("0s").is_err());
        assert!(parse_duration("soon").is_err());
    }

    #[test]
    fn toml_config_round_trip_through_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
call_timeout = "90s"

[[shards]]
scope = "rg-east"
name = "web"

[[shards]]
scope = "rg-west"
name = "batch"
"#
        )
        .unwrap();

        let config = TargetConfig::from_file(file.path()).unwrap();
        assert_eq!(config.shards.len(), 2);
        assert_eq!(config.shards[1], ShardRef::new("rg-west", "batch"));
        assert_eq!(config.call_timeout, Duration::from_secs(90));
    }

    #[test]
    fn flat_map_carries_credentials() {
        let config = TargetConfig::from_map_with_env(
            &map(&[
                (KEY_RESOURCE_SCOPE_LIST, "rg-a"),
                (KEY_SHARD_LIST, "web"),
                (KEY_TENANT_ID, "t"),
                (KEY_CLIENT_ID, "c"),
            ]),
            |var| (var == ENV_CLIENT_SECRET).then(|| "from-env".to_string()),
        )
        .unwrap();

        assert_eq!(config.credentials.tenant_id.as_deref(), Some("t"));
        assert_eq!(config.credentials.client_secret.as_deref(), Some("from-env"));
        assert_eq!(config.credentials.auth_mode(), AuthMode::ClientCredentials);
    }

    #[test]
    fn toml_credentials_table_is_read() {
        let config = TargetConfig::from_toml_str(
            r#"
            [[shards]]
            scope = "rg-east"
            name = "web"

            [credentials]
            tenant_id = "tenant-1"
            client_id = "client-1"
            secret_key = "s3cret"
            "#,
        )
        .unwrap();

        assert_eq!(config.credentials.tenant_id.as_deref(), Some("tenant-1"));
        assert_eq!(config.credentials.auth_mode(), AuthMode::ClientCredentials);
    }

    #[test]
    fn toml_without_shards_is_rejected() {
        assert!(TargetConfig::from_toml_str("shards = []").is_err());
    }

    #[test]
    fn credentials_prefer_config_over_env() {
        let config = map(&[(KEY_TENANT_ID, "tenant-from-config")]);
        let env = |var: &str| match var {
            ENV_TENANT_ID => Some("tenant-from-env".to_string()),
            ENV_CLIENT_ID => Some("client-from-env".to_string()),
            _ => None,
        };

        let creds = ProviderCredentials::from_map_with_env(&config, env);
        assert_eq!(creds.tenant_id.as_deref(), Some("tenant-from-config"));
        assert_eq!(creds.client_id.as_deref(), Some("client-from-env"));
        assert_eq!(creds.client_secret, None);
        assert_eq!(creds.auth_mode(), AuthMode::Environment);
    }

    #[test]
    fn full_credentials_use_client_credentials() {
        let config = map(&[
            (KEY_TENANT_ID, "t"),
            (KEY_CLIENT_ID, "c"),
            (KEY_SECRET_KEY, "s3cret"),
        ]);
        let creds = ProviderCredentials::from_map_with_env(&config, |_| None);
        assert_eq!(creds.auth_mode(), AuthMode::ClientCredentials);
        assert!(!format!("{creds:?}").contains("s3cret"));
    }
}
