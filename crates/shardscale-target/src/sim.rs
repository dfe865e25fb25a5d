//! In-memory fleet and scheduler.
//!
//! [`SimulatedFleet`] and [`SimulatedScheduler`] implement the collaborator
//! traits over plain in-memory state. Every call is appended to a shared,
//! ordered [`SimCall`] log so callers can check which calls were made and
//! in what order. Failures and delays can be injected per shard.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use shardscale_core::config::parse_duration;
use shardscale_core::{DrainPhase, FleetResult, InstanceRecord, ShardRef, TargetConfig};

use crate::provider::{DrainHooks, DrainedNode, FleetApi, NodeNameLookup, SchedulerNode};

/// One recorded collaborator call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimCall {
    GetCapacity { shard: String },
    ListInstances { shard: String },
    Resize { shard: String, capacity: u64 },
    DeleteInstances { shard: String, ids: Vec<String> },
    PoolReady,
    PreDrain { candidates: Vec<String>, count: u64 },
    PostDrain { remote_ids: Vec<String> },
}

/// Fleet operations that can be made to fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FleetOp {
    GetCapacity,
    ListInstances,
    Resize,
    DeleteInstances,
}

type CallLog = Arc<Mutex<Vec<SimCall>>>;

// ── Fleet ─────────────────────────────────────────────────────────

struct SimShard {
    scope: String,
    instances: Vec<InstanceRecord>,
    next_id: u64,
}

impl SimShard {
    fn new(scope: &str) -> Self {
        Self {
            scope: scope.to_string(),
            instances: Vec::new(),
            next_id: 0,
        }
    }

    fn push(&mut self, instance: InstanceRecord) {
        if let Ok(n) = instance.instance_id.parse::<u64>() {
            self.next_id = self.next_id.max(n + 1);
        }
        self.instances.push(instance);
    }

    fn spawn_running(&mut self) {
        let id = self.next_id;
        self.push(InstanceRecord::running(id.to_string()));
    }
}

#[derive(Default)]
struct FleetState {
    shards: BTreeMap<String, SimShard>,
    failures: HashMap<(FleetOp, String), String>,
    delays: HashMap<String, Duration>,
    op_delays: HashMap<(FleetOp, String), Duration>,
}

impl FleetState {
    fn shard_mut(&mut self, scope: &str, name: &str) -> anyhow::Result<&mut SimShard> {
        let shard = self
            .shards
            .get_mut(name)
            .ok_or_else(|| anyhow::anyhow!("scale group {name} not found"))?;
        if shard.scope != scope {
            anyhow::bail!("scale group {name} not found in scope {scope}");
        }
        Ok(shard)
    }
}

/// In-memory scale groups. Capacity always equals the instance count.
#[derive(Default)]
pub struct SimulatedFleet {
    state: Mutex<FleetState>,
    log: CallLog,
}

impl SimulatedFleet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a shard with `running` healthy instances numbered from 0.
    pub fn with_shard(mut self, scope: &str, name: &str, running: u64) -> Self {
        let mut shard = SimShard::new(scope);
        for _ in 0..running {
            shard.spawn_running();
        }
        self.state.get_mut().shards.insert(name.to_string(), shard);
        self
    }

    /// Add an instance to an existing shard.
    pub async fn add_instance(&self, shard: &str, instance: InstanceRecord) {
        let mut state = self.state.lock().await;
        if let Some(s) = state.shards.get_mut(shard) {
            s.push(instance);
        }
    }

    /// Make every future `op` against `shard` fail with `message`.
    pub async fn fail(&self, op: FleetOp, shard: &str, message: &str) {
        let mut state = self.state.lock().await;
        state
            .failures
            .insert((op, shard.to_string()), message.to_string());
    }

    /// Delay every call against `shard` by `delay`.
    pub async fn delay(&self, shard: &str, delay: Duration) {
        self.state.lock().await.delays.insert(shard.to_string(), delay);
    }

    /// Delay only `op` against `shard` by `delay`.
    pub async fn delay_op(&self, op: FleetOp, shard: &str, delay: Duration) {
        self.state
            .lock()
            .await
            .op_delays
            .insert((op, shard.to_string()), delay);
    }

    pub async fn capacity(&self, shard: &str) -> Option<u64> {
        let state = self.state.lock().await;
        state.shards.get(shard).map(|s| s.instances.len() as u64)
    }

    /// Every call made so far, including scheduler calls on a shared log.
    pub async fn calls(&self) -> Vec<SimCall> {
        self.log.lock().await.clone()
    }

    /// Record the call, apply any injected delay, then any injected failure.
    async fn enter(&self, call: SimCall, op: FleetOp, shard: &str) -> anyhow::Result<()> {
        self.log.lock().await.push(call);

        let delay = {
            let state = self.state.lock().await;
            state
                .op_delays
                .get(&(op, shard.to_string()))
                .or_else(|| state.delays.get(shard))
                .copied()
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().await;
        if let Some(message) = state.failures.get(&(op, shard.to_string())) {
            anyhow::bail!("{message}");
        }
        Ok(())
    }
}

#[async_trait]
impl FleetApi for SimulatedFleet {
    async fn get_capacity(&self, scope: &str, shard: &str) -> anyhow::Result<u64> {
        self.enter(SimCall::GetCapacity { shard: shard.to_string() }, FleetOp::GetCapacity, shard)
            .await?;
        let mut state = self.state.lock().await;
        Ok(state.shard_mut(scope, shard)?.instances.len() as u64)
    }

    async fn list_instances(
        &self,
        scope: &str,
        shard: &str,
    ) -> anyhow::Result<Vec<InstanceRecord>> {
        self.enter(
            SimCall::ListInstances {
                shard: shard.to_string(),
            },
            FleetOp::ListInstances,
            shard,
        )
        .await?;
        let mut state = self.state.lock().await;
        Ok(state.shard_mut(scope, shard)?.instances.clone())
    }

    async fn resize(&self, scope: &str, shard: &str, capacity: u64) -> anyhow::Result<()> {
        self.enter(
            SimCall::Resize {
                shard: shard.to_string(),
                capacity,
            },
            FleetOp::Resize,
            shard,
        )
        .await?;

        let mut state = self.state.lock().await;
        let s = state.shard_mut(scope, shard)?;
        let target = capacity as usize;
        s.instances.truncate(target);
        while s.instances.len() < target {
            s.spawn_running();
        }
        Ok(())
    }

    async fn delete_instances(
        &self,
        scope: &str,
        shard: &str,
        instance_ids: &[String],
    ) -> anyhow::Result<()> {
        self.enter(
            SimCall::DeleteInstances {
                shard: shard.to_string(),
                ids: instance_ids.to_vec(),
            },
            FleetOp::DeleteInstances,
            shard,
        )
        .await?;

        let mut state = self.state.lock().await;
        let s = state.shard_mut(scope, shard)?;
        if let Some(missing) = instance_ids
            .iter()
            .find(|id| !s.instances.iter().any(|i| &i.instance_id == *id))
        {
            anyhow::bail!("instance {missing} not found in scale group {shard}");
        }
        s.instances.retain(|i| !instance_ids.contains(&i.instance_id));
        Ok(())
    }
}

// ── Scheduler ─────────────────────────────────────────────────────

struct SchedulerState {
    pool_ready: bool,
    max_cleared: Option<usize>,
    response: Option<Vec<String>>,
    pre_drain_error: Option<String>,
    post_drain_error: Option<String>,
    pre_drain_delay: Option<Duration>,
    post_drain_delay: Option<Duration>,
    nodes: Vec<SchedulerNode>,
}

impl Default for SchedulerState {
    fn default() -> Self {
        Self {
            pool_ready: true,
            max_cleared: None,
            response: None,
            pre_drain_error: None,
            post_drain_error: None,
            pre_drain_delay: None,
            post_drain_delay: None,
            nodes: Vec::new(),
        }
    }
}

/// In-memory drain hooks.
///
/// By default the pool is ready and `pre_drain` clears the first `count`
/// candidates it is offered.
#[derive(Default)]
pub struct SimulatedScheduler {
    state: Mutex<SchedulerState>,
    log: CallLog,
    lookup: NodeNameLookup,
}

impl SimulatedScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scheduler recording into the same call log as `fleet`.
    pub fn sharing_log(fleet: &SimulatedFleet) -> Self {
        Self {
            log: fleet.log.clone(),
            ..Self::default()
        }
    }

    pub async fn set_pool_ready(&self, ready: bool) {
        self.state.lock().await.pool_ready = ready;
    }

    /// Clear at most `n` nodes per pre-drain call.
    pub async fn limit_cleared(&self, n: usize) {
        self.state.lock().await.max_cleared = Some(n);
    }

    /// Return exactly these remote ids from pre-drain, whatever is asked.
    pub async fn respond_with(&self, remote_ids: Vec<String>) {
        self.state.lock().await.response = Some(remote_ids);
    }

    pub async fn fail_pre_drain(&self, message: &str) {
        self.state.lock().await.pre_drain_error = Some(message.to_string());
    }

    pub async fn fail_post_drain(&self, message: &str) {
        self.state.lock().await.post_drain_error = Some(message.to_string());
    }

    /// Delay one drain hook by `delay` before it answers.
    pub async fn delay_hook(&self, phase: DrainPhase, delay: Duration) {
        let mut state = self.state.lock().await;
        match phase {
            DrainPhase::PreDrain => state.pre_drain_delay = Some(delay),
            DrainPhase::PostDrain => state.post_drain_delay = Some(delay),
        }
    }

    /// Register a node so cleared ids report its real node id.
    pub async fn register_node(&self, node: SchedulerNode) {
        self.state.lock().await.nodes.push(node);
    }

    pub async fn calls(&self) -> Vec<SimCall> {
        self.log.lock().await.clone()
    }
}

#[async_trait]
impl DrainHooks for SimulatedScheduler {
    async fn is_pool_ready(&self) -> anyhow::Result<bool> {
        self.log.lock().await.push(SimCall::PoolReady);
        Ok(self.state.lock().await.pool_ready)
    }

    async fn pre_drain(
        &self,
        candidates: &[String],
        count: u64,
    ) -> anyhow::Result<Vec<DrainedNode>> {
        self.log.lock().await.push(SimCall::PreDrain {
            candidates: candidates.to_vec(),
            count,
        });

        let delay = self.state.lock().await.pre_drain_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().await;
        if let Some(ref message) = state.pre_drain_error {
            anyhow::bail!("{message}");
        }

        let chosen: Vec<String> = match state.response {
            Some(ref ids) => ids.clone(),
            None => {
                let limit = state.max_cleared.unwrap_or(usize::MAX).min(count as usize);
                candidates.iter().take(limit).cloned().collect()
            }
        };

        Ok(chosen
            .into_iter()
            .map(|remote_id| {
                let node_id = state
                    .nodes
                    .iter()
                    .find(|n| self.lookup.resolve(n).is_ok_and(|name| name == remote_id))
                    .map(|n| n.id.clone())
                    .unwrap_or_else(|| format!("node-{remote_id}"));
                DrainedNode { node_id, remote_id }
            })
            .collect())
    }

    async fn post_drain(&self, cleared: &[DrainedNode]) -> anyhow::Result<()> {
        self.log.lock().await.push(SimCall::PostDrain {
            remote_ids: cleared.iter().map(|n| n.remote_id.clone()).collect(),
        });

        let delay = self.state.lock().await.post_drain_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(ref message) = self.state.lock().await.post_drain_error {
            anyhow::bail!("{message}");
        }
        Ok(())
    }
}

// ── Descriptions ──────────────────────────────────────────────────

/// TOML description of a simulated fleet and scheduler.
///
/// ```toml
/// [[shards]]
/// scope = "rg-east"
/// name = "web"
/// capacity = 3
///
/// [scheduler]
/// max_cleared = 2
///
/// [target]
/// call_timeout = "30s"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct FleetDescription {
    pub shards: Vec<ShardDescription>,
    #[serde(default)]
    pub scheduler: SchedulerDescription,
    #[serde(default)]
    pub target: TargetDescription,
}

/// Settings for the target driving the simulated fleet.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TargetDescription {
    pub call_timeout: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ShardDescription {
    pub scope: String,
    pub name: String,
    /// Total instances; running instances are generated after any listed ones.
    #[serde(default)]
    pub capacity: u64,
    #[serde(default)]
    pub instances: Vec<InstanceRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchedulerDescription {
    #[serde(default = "default_true")]
    pub pool_ready: bool,
    pub max_cleared: Option<usize>,
    #[serde(default)]
    pub nodes: Vec<SchedulerNode>,
}

impl Default for SchedulerDescription {
    fn default() -> Self {
        Self {
            pool_ready: true,
            max_cleared: None,
            nodes: Vec::new(),
        }
    }
}

fn default_true() -> bool {
    true
}

impl FleetDescription {
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn shard_refs(&self) -> Vec<ShardRef> {
        self.shards
            .iter()
            .map(|s| ShardRef::new(s.scope.clone(), s.name.clone()))
            .collect()
    }

    /// Validated target configuration over the described shards.
    pub fn target_config(&self) -> FleetResult<TargetConfig> {
        let config = TargetConfig::new(self.shard_refs())?;
        match self.target.call_timeout {
            Some(ref raw) => Ok(config.with_call_timeout(parse_duration(raw)?)),
            None => Ok(config),
        }
    }

    /// Build a fleet and a scheduler sharing one call log.
    pub fn build(&self) -> (SimulatedFleet, SimulatedScheduler) {
        let mut fleet = SimulatedFleet::new();
        {
            let state = fleet.state.get_mut();
            for desc in &self.shards {
                let mut shard = SimShard::new(&desc.scope);
                for instance in &desc.instances {
                    shard.push(instance.clone());
                }
                while (shard.instances.len() as u64) < desc.capacity {
                    shard.spawn_running();
                }
                state.shards.insert(desc.name.clone(), shard);
            }
        }

        let mut scheduler = SimulatedScheduler::sharing_log(&fleet);
        {
            let state = scheduler.state.get_mut();
            state.pool_ready = self.scheduler.pool_ready;
            state.max_cleared = self.scheduler.max_cleared;
            state.nodes = self.scheduler.nodes.clone();
        }
        (fleet, scheduler)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::DEFAULT_NODE_NAME_ATTRIBUTE;
    use shardscale_core::PowerState;

    #[tokio::test]
    async fn resize_grows_and_shrinks() {
        let fleet = SimulatedFleet::new().with_shard("rg", "web", 2);
        fleet.resize("rg", "web", 5).await.unwrap();
        assert_eq!(fleet.capacity("web").await, Some(5));

        let ids: Vec<_> = fleet
            .list_instances("rg", "web")
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.instance_id)
            .collect();
        assert_eq!(ids, ["0", "1", "2", "3", "4"]);

        fleet.resize("rg", "web", 1).await.unwrap();
        assert_eq!(fleet.capacity("web").await, Some(1));
    }

    #[tokio::test]
    async fn wrong_scope_is_not_found() {
        let fleet = SimulatedFleet::new().with_shard("rg", "web", 1);
        let err = fleet.get_capacity("other", "web").await.unwrap_err();
        assert!(err.to_string().contains("not found in scope other"));
    }

    #[tokio::test]
    async fn delete_of_unknown_instance_changes_nothing() {
        let fleet = SimulatedFleet::new().with_shard("rg", "web", 2);
        let ids = vec!["0".to_string(), "7".to_string()];
        assert!(fleet.delete_instances("rg", "web", &ids).await.is_err());
        assert_eq!(fleet.capacity("web").await, Some(2));
    }

    #[tokio::test]
    async fn pre_drain_resolves_registered_nodes() {
        let scheduler = SimulatedScheduler::new();
        scheduler
            .register_node(SchedulerNode {
                id: "a1b2".to_string(),
                attributes: HashMap::from([(
                    DEFAULT_NODE_NAME_ATTRIBUTE.to_string(),
                    "web_0".to_string(),
                )]),
                meta: HashMap::new(),
            })
            .await;

        let candidates = vec!["web_0".to_string(), "web_1".to_string()];
        let cleared = scheduler.pre_drain(&candidates, 2).await.unwrap();
        assert_eq!(cleared[0].node_id, "a1b2");
        assert_eq!(cleared[1].node_id, "node-web_1");
    }

    #[tokio::test]
    async fn description_builds_fleet() {
        let desc = FleetDescription::from_toml_str(
            r#"
            [[shards]]
            scope = "rg-east"
            name = "web"
            capacity = 3

            [[shards.instances]]
            instance_id = "10"
            power_state = "stopped"
            provisioning_state = "succeeded"

            [[shards]]
            scope = "rg-west"
            name = "batch"
            capacity = 1

            [scheduler]
            max_cleared = 1

            [target]
            call_timeout = "45s"
            "#,
        )
        .unwrap();

        let config = desc.target_config().unwrap();
        assert_eq!(config.shards.len(), 2);
        assert_eq!(config.call_timeout, Duration::from_secs(45));

        assert_eq!(desc.shard_refs()[1], ShardRef::new("rg-west", "batch"));
        let (fleet, scheduler) = desc.build();

        let web = fleet.list_instances("rg-east", "web").await.unwrap();
        assert_eq!(web.len(), 3);
        assert_eq!(web[0].power_state, PowerState::Stopped);
        assert_eq!(web[1].instance_id, "11");
        assert!(scheduler.is_pool_ready().await.unwrap());
        assert_eq!(scheduler.calls().await.len(), fleet.calls().await.len());
    }
}
