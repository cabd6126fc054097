//! The instance pool manager

use futures::future::join_all;
use std::collections::BTreeSet;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{broadcast, RwLock};
use torlet_core::{
    merge_torrc, DefaultTorrc, InstanceDefinition, LoadBalanceMethod, TorletError, TorletResult,
};
use torlet_runtime::InstanceLauncher;
use tracing::{debug, info};
use uuid::Uuid;

use crate::balancer::{rotate, WeightedSelection};
use crate::group::GroupView;
use crate::instance::Instance;

/// Event emitted by the pool for collaborators that attach to instances
#[derive(Clone, Debug)]
pub enum PoolEvent {
    /// Fired once per successful creation, after the instance joined the
    /// pool
    InstanceCreated(Arc<Instance>),
}

/// The ordered instance sequence plus the weighted-selection cache.
///
/// The cache is only valid for the member set it was built from; every
/// membership mutation clears it in the same critical section.
struct PoolState {
    instances: Vec<Arc<Instance>>,
    weighted_cache: Option<WeightedSelection>,
}

/// Manages a fleet of tor daemon instances: creation, removal, selection,
/// grouping, and batched control forwarding.
///
/// Individual operations are internally consistent, but the pool performs no
/// cross-call transactions; callers are expected to serialize pool-level
/// mutations.
pub struct TorPool {
    state: RwLock<PoolState>,
    method: RwLock<LoadBalanceMethod>,
    launcher: Arc<dyn InstanceLauncher>,
    default_torrc: DefaultTorrc,
    data_directory: PathBuf,
    events: broadcast::Sender<PoolEvent>,
}

impl TorPool {
    /// Create an empty pool
    pub fn new(
        launcher: Arc<dyn InstanceLauncher>,
        default_torrc: DefaultTorrc,
        data_directory: PathBuf,
        method: LoadBalanceMethod,
    ) -> Self {
        let (events, _) = broadcast::channel(64);

        info!(
            launcher = launcher.name(),
            data_directory = %data_directory.display(),
            method = %method,
            "Pool initialized"
        );

        Self {
            state: RwLock::new(PoolState {
                instances: Vec::new(),
                weighted_cache: None,
            }),
            method: RwLock::new(method),
            launcher,
            default_torrc,
            data_directory,
            events,
        }
    }

    /// Subscribe to pool events
    pub fn subscribe(&self) -> broadcast::Receiver<PoolEvent> {
        self.events.subscribe()
    }

    // ---- lifecycle ----------------------------------------------------

    /// Create one instance and wait for it to become ready.
    ///
    /// The instance joins the pool only after its daemon signals readiness;
    /// a startup failure leaves pool membership and order untouched.
    pub async fn create_instance(
        &self,
        definition: InstanceDefinition,
    ) -> TorletResult<Arc<Instance>> {
        if let Some(name) = definition.name.as_deref() {
            let state = self.state.read().await;
            if state.instances.iter().any(|i| i.name.as_deref() == Some(name)) {
                return Err(TorletError::DuplicateName(name.to_string()));
            }
        }

        tokio::fs::create_dir_all(&self.data_directory).await?;

        let torrc = merge_torrc(&self.default_torrc.resolve(), &definition.config);
        let id = Uuid::new_v4();
        let handle = self.launcher.launch(id, &definition, &torrc).await?;

        handle.create().await?;

        let instance = Arc::new(Instance::new(id, definition, torrc, handle));
        {
            let mut state = self.state.write().await;
            if let Some(name) = instance.name.as_deref() {
                // A parallel sub-creation may have claimed the name since the
                // pre-allocation check
                if state.instances.iter().any(|i| i.name.as_deref() == Some(name)) {
                    drop(state);
                    let _ = instance.handle().exit().await;
                    return Err(TorletError::DuplicateName(name.to_string()));
                }
            }
            state.instances.push(instance.clone());
            state.weighted_cache = None;
        }

        info!(
            instance_id = %instance.id,
            name = instance.name.as_deref().unwrap_or("<anonymous>"),
            "Instance created"
        );
        let _ = self.events.send(PoolEvent::InstanceCreated(instance.clone()));

        Ok(instance)
    }

    /// Create several instances in parallel, waiting for all of them.
    ///
    /// Any single failure fails the whole call; sub-creations that already
    /// succeeded stay in the pool (no rollback).
    pub async fn add(
        &self,
        definitions: Vec<InstanceDefinition>,
    ) -> TorletResult<Vec<Arc<Instance>>> {
        let total = definitions.len();
        let results = join_all(
            definitions
                .into_iter()
                .map(|definition| self.create_instance(definition)),
        )
        .await;

        let mut created = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(instance) => created.push(instance),
                Err(e) => errors.push(e),
            }
        }

        match TorletError::from_batch(errors, total) {
            Some(err) => Err(err),
            None => Ok(created),
        }
    }

    /// Create `count` instances from empty definitions
    pub async fn create(&self, count: usize) -> TorletResult<Vec<Arc<Instance>>> {
        self.add((0..count).map(|_| InstanceDefinition::new()).collect())
            .await
    }

    /// Remove the first `count` instances in current pool order and exit
    /// each of them in parallel
    pub async fn remove(&self, count: usize) -> TorletResult<()> {
        let removed: Vec<Arc<Instance>> = {
            let mut state = self.state.write().await;
            let count = count.min(state.instances.len());
            state.weighted_cache = None;
            state.instances.drain(..count).collect()
        };

        info!(removed = removed.len(), "Removing instances from pool head");
        self.exit_instances(removed).await
    }

    /// Remove and exit the instance at `index`
    pub async fn remove_at(&self, index: usize) -> TorletResult<()> {
        let instance = {
            let mut state = self.state.write().await;
            if index >= state.instances.len() {
                return Err(TorletError::InstanceNotFound(format!(
                    "index {} out of range",
                    index
                )));
            }
            state.weighted_cache = None;
            state.instances.remove(index)
        };

        info!(instance_id = %instance.id, "Instance removed");
        instance.handle().exit().await
    }

    /// Remove and exit the instance named `name`
    pub async fn remove_by_name(&self, name: &str) -> TorletResult<()> {
        let instance = {
            let mut state = self.state.write().await;
            let position = state
                .instances
                .iter()
                .position(|i| i.name.as_deref() == Some(name))
                .ok_or_else(|| TorletError::InstanceNotFound(name.to_string()))?;
            state.weighted_cache = None;
            state.instances.remove(position)
        };

        info!(instance_id = %instance.id, name, "Instance removed");
        instance.handle().exit().await
    }

    /// Exit every instance and clear the pool
    pub async fn exit(&self) -> TorletResult<()> {
        let removed: Vec<Arc<Instance>> = {
            let mut state = self.state.write().await;
            state.weighted_cache = None;
            state.instances.drain(..).collect()
        };

        info!(instances = removed.len(), "Pool shutting down");
        self.exit_instances(removed).await
    }

    async fn exit_instances(&self, instances: Vec<Arc<Instance>>) -> TorletResult<()> {
        let total = instances.len();
        let results = join_all(instances.iter().map(|i| i.handle().exit())).await;

        let errors: Vec<TorletError> = results.into_iter().filter_map(Result::err).collect();
        match TorletError::from_batch(errors, total) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    // ---- selection ----------------------------------------------------

    /// Apply the current load-balance method and return the selected
    /// instance.
    ///
    /// Round-robin selects the current head and rotates it to the tail, so
    /// N selections over an unchanged pool of N return each instance
    /// exactly once. Weighted redraws the whole order and selects the new
    /// head.
    pub async fn next_instance(&self) -> TorletResult<Arc<Instance>> {
        let method = *self.method.read().await;
        let mut state = self.state.write().await;

        if state.instances.is_empty() {
            return Err(TorletError::InstanceNotFound("pool is empty".to_string()));
        }

        let selected = match method {
            LoadBalanceMethod::RoundRobin => {
                let selected = state.instances[0].clone();
                state.instances = rotate(&state.instances, 1);
                selected
            }
            LoadBalanceMethod::Weighted => {
                let cache = match state.weighted_cache.take() {
                    Some(cache) => cache,
                    None => WeightedSelection::build(&state.instances),
                };
                state.instances = cache.draw(&mut rand::thread_rng());
                state.weighted_cache = Some(cache);
                state.instances[0].clone()
            }
        };

        debug!(
            method = %method,
            instance_id = %selected.id,
            "Instance selected"
        );
        Ok(selected)
    }

    /// The active load-balance method
    pub async fn load_balance_method(&self) -> LoadBalanceMethod {
        *self.method.read().await
    }

    /// Switch the load-balance method
    pub async fn set_load_balance_method(&self, method: LoadBalanceMethod) {
        info!(method = %method, "Load-balance method changed");
        *self.method.write().await = method;
    }

    // ---- accessors ----------------------------------------------------

    /// Current instances in pool order
    pub async fn instances(&self) -> Vec<Arc<Instance>> {
        self.state.read().await.instances.clone()
    }

    /// The instance at `index` in pool order
    pub async fn instance_at(&self, index: usize) -> TorletResult<Arc<Instance>> {
        let state = self.state.read().await;
        state
            .instances
            .get(index)
            .cloned()
            .ok_or_else(|| TorletError::InstanceNotFound(format!("index {} out of range", index)))
    }

    /// The instance named `name`
    pub async fn instance_by_name(&self, name: &str) -> TorletResult<Arc<Instance>> {
        let state = self.state.read().await;
        state
            .instances
            .iter()
            .find(|i| i.name.as_deref() == Some(name))
            .cloned()
            .ok_or_else(|| TorletError::InstanceNotFound(name.to_string()))
    }

    /// Names of all named instances, in pool order
    pub async fn instance_names(&self) -> Vec<String> {
        let state = self.state.read().await;
        state
            .instances
            .iter()
            .filter_map(|i| i.name.clone())
            .collect()
    }

    /// Number of pool members
    pub async fn len(&self) -> usize {
        self.state.read().await.instances.len()
    }

    /// Whether the pool is empty
    pub async fn is_empty(&self) -> bool {
        self.state.read().await.instances.is_empty()
    }

    // ---- groups -------------------------------------------------------

    /// Every label currently carried by at least one instance, recomputed
    /// on each call
    pub async fn group_names(&self) -> BTreeSet<String> {
        let instances = self.instances().await;
        let mut names = BTreeSet::new();
        for instance in &instances {
            names.extend(instance.groups().await);
        }
        names
    }

    /// A live view over the instances carrying `label`
    pub fn group(&self, label: impl Into<String>) -> GroupView<'_> {
        GroupView::new(self, label.into())
    }

    // ---- control forwarding -------------------------------------------

    /// Rotate the anonymity circuit on every instance
    pub async fn new_identities(&self) -> TorletResult<()> {
        let instances = self.instances().await;
        let total = instances.len();
        info!(instances = total, "Rotating circuits on all instances");

        let results = join_all(instances.iter().map(|i| i.handle().new_identity())).await;
        let errors: Vec<TorletError> = results.into_iter().filter_map(Result::err).collect();
        match TorletError::from_batch(errors, total) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Rotate the anonymity circuit on the instance at `index`
    pub async fn new_identity_at(&self, index: usize) -> TorletResult<()> {
        self.instance_at(index).await?.handle().new_identity().await
    }

    /// Rotate the anonymity circuit on the instance named `name`
    pub async fn new_identity_by_name(&self, name: &str) -> TorletResult<()> {
        self.instance_by_name(name).await?.handle().new_identity().await
    }

    /// Read a configuration keyword from the instance named `name`
    pub async fn get_config_by_name(&self, name: &str, keyword: &str) -> TorletResult<Vec<String>> {
        self.instance_by_name(name).await?.handle().get_config(keyword).await
    }

    /// Read a configuration keyword from the instance at `index`
    pub async fn get_config_at(&self, index: usize, keyword: &str) -> TorletResult<Vec<String>> {
        self.instance_at(index).await?.handle().get_config(keyword).await
    }

    /// Read a configuration keyword from every instance, in pool order
    pub async fn get_config_all(&self, keyword: &str) -> TorletResult<Vec<Vec<String>>> {
        let instances = self.instances().await;
        let total = instances.len();
        let results = join_all(instances.iter().map(|i| i.handle().get_config(keyword))).await;

        let mut values = Vec::with_capacity(total);
        let mut errors = Vec::new();
        for result in results {
            match result {
                Ok(value) => values.push(value),
                Err(e) => errors.push(e),
            }
        }
        match TorletError::from_batch(errors, total) {
            Some(err) => Err(err),
            None => Ok(values),
        }
    }

    /// Write a configuration keyword on the instance named `name`
    pub async fn set_config_by_name(
        &self,
        name: &str,
        keyword: &str,
        value: &str,
    ) -> TorletResult<()> {
        self.instance_by_name(name)
            .await?
            .handle()
            .set_config(keyword, value)
            .await
    }

    /// Write a configuration keyword on the instance at `index`
    pub async fn set_config_at(
        &self,
        index: usize,
        keyword: &str,
        value: &str,
    ) -> TorletResult<()> {
        self.instance_at(index)
            .await?
            .handle()
            .set_config(keyword, value)
            .await
    }

    /// Write a configuration keyword on every instance
    pub async fn set_config_all(&self, keyword: &str, value: &str) -> TorletResult<()> {
        let instances = self.instances().await;
        let total = instances.len();
        info!(keyword, value, instances = total, "Broadcasting configuration write");

        let results = join_all(
            instances
                .iter()
                .map(|i| i.handle().set_config(keyword, value)),
        )
        .await;
        let errors: Vec<TorletError> = results.into_iter().filter_map(Result::err).collect();
        match TorletError::from_batch(errors, total) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Send a control signal to every instance
    pub async fn signal_all(&self, signal: &str) -> TorletResult<()> {
        let instances = self.instances().await;
        let total = instances.len();
        info!(signal, instances = total, "Broadcasting signal");

        let results = join_all(instances.iter().map(|i| i.handle().signal(signal))).await;
        let errors: Vec<TorletError> = results.into_iter().filter_map(Result::err).collect();
        match TorletError::from_batch(errors, total) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    /// Send a control signal to the instance named `name`
    pub async fn signal_by_name(&self, name: &str, signal: &str) -> TorletResult<()> {
        self.instance_by_name(name).await?.handle().signal(signal).await
    }

    /// Send a control signal to the instance at `index`
    pub async fn signal_at(&self, index: usize, signal: &str) -> TorletResult<()> {
        self.instance_at(index).await?.handle().signal(signal).await
    }
}

impl std::fmt::Debug for TorPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TorPool")
            .field("launcher", &self.launcher.name())
            .field("data_directory", &self.data_directory)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;
    use torlet_core::TorrcMap;
    use torlet_runtime::MockLauncher;

    fn pool_with(launcher: Arc<MockLauncher>, dir: &TempDir, method: LoadBalanceMethod) -> TorPool {
        TorPool::new(
            launcher,
            DefaultTorrc::default(),
            dir.path().to_path_buf(),
            method,
        )
    }

    async fn named_pool(names: &[&str]) -> (TorPool, Arc<MockLauncher>, TempDir) {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher.clone(), &dir, LoadBalanceMethod::RoundRobin);
        for name in names {
            pool.create_instance(InstanceDefinition::named(*name))
                .await
                .unwrap();
        }
        (pool, launcher, dir)
    }

    #[tokio::test]
    async fn test_create_with_distinct_names() {
        let (pool, _launcher, _dir) = named_pool(&["a", "b", "c"]).await;

        assert_eq!(pool.len().await, 3);
        let names = pool.instance_names().await;
        assert_eq!(names, vec!["a", "b", "c"]);

        let err = pool
            .create_instance(InstanceDefinition::named("b"))
            .await
            .unwrap_err();
        assert!(matches!(err, TorletError::DuplicateName(_)));
        assert_eq!(pool.len().await, 3);
    }

    #[tokio::test]
    async fn test_round_robin_rotation() {
        let (pool, _launcher, _dir) = named_pool(&["a", "b", "c"]).await;

        let first = pool.next_instance().await.unwrap();
        assert_eq!(first.name.as_deref(), Some("a"));
        assert_eq!(pool.instance_names().await, vec!["b", "c", "a"]);

        let second = pool.next_instance().await.unwrap();
        let third = pool.next_instance().await.unwrap();
        let fourth = pool.next_instance().await.unwrap();
        assert_eq!(second.name.as_deref(), Some("b"));
        assert_eq!(third.name.as_deref(), Some("c"));
        assert_eq!(fourth.name.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_next_on_empty_pool() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::RoundRobin);

        let err = pool.next_instance().await.unwrap_err();
        assert!(matches!(err, TorletError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_weighted_selection_favors_heavy() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::Weighted);

        pool.create_instance(InstanceDefinition::named("heavy").with_weight(100))
            .await
            .unwrap();
        pool.create_instance(InstanceDefinition::named("light").with_weight(1))
            .await
            .unwrap();

        let mut heavy_first = 0;
        for _ in 0..200 {
            if pool.next_instance().await.unwrap().name.as_deref() == Some("heavy") {
                heavy_first += 1;
            }
        }
        assert!(heavy_first > 100, "heavy selected only {heavy_first}/200 times");
    }

    #[tokio::test]
    async fn test_weighted_survives_membership_change() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::Weighted);

        pool.create_instance(InstanceDefinition::named("heavy").with_weight(100))
            .await
            .unwrap();
        pool.create_instance(InstanceDefinition::named("light").with_weight(1))
            .await
            .unwrap();

        // Populate the cache, then invalidate it by removing a member
        pool.next_instance().await.unwrap();
        pool.remove_by_name("heavy").await.unwrap();

        for _ in 0..10 {
            let selected = pool.next_instance().await.unwrap();
            assert_eq!(selected.name.as_deref(), Some("light"));
        }
    }

    #[tokio::test]
    async fn test_group_label_idempotence() {
        let (pool, _launcher, _dir) = named_pool(&["a"]).await;
        let instance = pool.instance_by_name("a").await.unwrap();

        let group = pool.group("fast");
        group.add(&instance).await;
        group.add(&instance).await;
        assert_eq!(instance.groups().await.len(), 1);
        assert_eq!(group.len().await, 1);

        // Removing an absent label is a no-op
        pool.group("slow").remove(&instance).await;
        assert_eq!(instance.groups().await.len(), 1);
    }

    #[tokio::test]
    async fn test_group_views_are_live() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::RoundRobin);

        pool.create_instance(InstanceDefinition::named("x").with_group("g"))
            .await
            .unwrap();
        assert_eq!(pool.group("g").len().await, 1);
        assert!(pool.group_names().await.contains("g"));

        pool.remove_by_name("x").await.unwrap();
        assert!(pool.group("g").is_empty().await);
        assert!(pool.group_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_group_view_sorted_by_name() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::RoundRobin);

        for name in ["c", "a", "b"] {
            pool.create_instance(InstanceDefinition::named(name).with_group("g"))
                .await
                .unwrap();
        }

        let members = pool.group("g").instances().await;
        let names: Vec<_> = members.iter().map(|i| i.sort_key()).collect();
        assert_eq!(names, vec!["a", "b", "c"]);

        // Positions address the filtered, sorted view
        pool.group("g").remove_at(1).await.unwrap();
        let names: Vec<_> = pool
            .group("g")
            .instances()
            .await
            .iter()
            .map(|i| i.sort_key())
            .collect();
        assert_eq!(names, vec!["a", "c"]);

        let err = pool.group("g").remove_at(5).await.unwrap_err();
        assert!(matches!(err, TorletError::InstanceNotFound(_)));
    }

    #[tokio::test]
    async fn test_exit_empties_pool_and_exits_each_once() {
        let (pool, launcher, _dir) = named_pool(&["a", "b", "c"]).await;

        pool.exit().await.unwrap();
        assert!(pool.is_empty().await);

        let handles = launcher.handles().await;
        assert_eq!(handles.len(), 3);
        for handle in handles {
            assert_eq!(handle.exit_calls(), 1);
        }
    }

    #[tokio::test]
    async fn test_remove_head_instances() {
        let (pool, launcher, _dir) = named_pool(&["a", "b", "c"]).await;

        pool.remove(2).await.unwrap();
        assert_eq!(pool.instance_names().await, vec!["c"]);

        let handles = launcher.handles().await;
        assert_eq!(handles[0].exit_calls(), 1);
        assert_eq!(handles[1].exit_calls(), 1);
        assert_eq!(handles[2].exit_calls(), 0);

        // Count larger than the pool clears it
        pool.remove(10).await.unwrap();
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_remove_by_unknown_name() {
        let (pool, _launcher, _dir) = named_pool(&["a", "b"]).await;

        let err = pool.remove_by_name("ghost").await.unwrap_err();
        assert!(matches!(err, TorletError::InstanceNotFound(_)));
        assert_eq!(pool.instance_names().await, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_remove_at_out_of_range() {
        let (pool, _launcher, _dir) = named_pool(&["a"]).await;

        let err = pool.remove_at(3).await.unwrap_err();
        assert!(matches!(err, TorletError::InstanceNotFound(_)));
        assert_eq!(pool.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_startup_leaves_pool_untouched() {
        let launcher = Arc::new(MockLauncher::new());
        launcher.fail_startup_of("broken").await;
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::RoundRobin);

        let err = pool
            .create_instance(InstanceDefinition::named("broken"))
            .await
            .unwrap_err();
        assert!(matches!(err, TorletError::Startup(_)));
        assert!(pool.is_empty().await);
    }

    #[tokio::test]
    async fn test_batch_failure_without_rollback() {
        let launcher = Arc::new(MockLauncher::new());
        launcher.fail_startup_of("broken").await;
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::RoundRobin);

        let err = pool
            .add(vec![
                InstanceDefinition::named("good"),
                InstanceDefinition::named("broken"),
            ])
            .await
            .unwrap_err();

        match err {
            TorletError::Batch { failed, total, .. } => {
                assert_eq!(failed, 1);
                assert_eq!(total, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
        // The sub-creation that succeeded stays in the pool
        assert_eq!(pool.instance_names().await, vec!["good"]);
    }

    #[tokio::test]
    async fn test_create_count_synthesizes_definitions() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::RoundRobin);

        let created = pool.create(4).await.unwrap();
        assert_eq!(created.len(), 4);
        assert_eq!(pool.len().await, 4);
        assert!(pool.instance_names().await.is_empty());
    }

    #[tokio::test]
    async fn test_default_config_merge() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();

        let mut defaults = TorrcMap::new();
        defaults.insert("NewCircuitPeriod".to_string(), json!(30));
        defaults.insert("MaxCircuitDirtiness".to_string(), json!(600));

        let pool = TorPool::new(
            launcher,
            DefaultTorrc::Static(defaults),
            dir.path().to_path_buf(),
            LoadBalanceMethod::RoundRobin,
        );

        let mut definition = InstanceDefinition::named("a");
        definition
            .config
            .insert("MaxCircuitDirtiness".to_string(), json!(10));
        let instance = pool.create_instance(definition).await.unwrap();

        assert_eq!(instance.torrc["NewCircuitPeriod"], json!(30));
        assert_eq!(instance.torrc["MaxCircuitDirtiness"], json!(10));
        assert_eq!(
            pool.get_config_by_name("a", "MaxCircuitDirtiness").await.unwrap(),
            vec!["10"]
        );
    }

    #[tokio::test]
    async fn test_default_generator_invoked_per_instance() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();

        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let pool = TorPool::new(
            launcher,
            DefaultTorrc::Generator(Arc::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                TorrcMap::new()
            })),
            dir.path().to_path_buf(),
            LoadBalanceMethod::RoundRobin,
        );

        pool.create(3).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_instance_created_event() {
        let launcher = Arc::new(MockLauncher::new());
        let dir = TempDir::new().unwrap();
        let pool = pool_with(launcher, &dir, LoadBalanceMethod::RoundRobin);

        let mut events = pool.subscribe();
        let created = pool
            .create_instance(InstanceDefinition::named("a"))
            .await
            .unwrap();

        let PoolEvent::InstanceCreated(instance) = events.recv().await.unwrap();
        assert_eq!(instance.id, created.id);
    }

    #[tokio::test]
    async fn test_control_forwarding() {
        let (pool, launcher, _dir) = named_pool(&["a", "b"]).await;

        pool.new_identities().await.unwrap();
        pool.new_identity_by_name("a").await.unwrap();
        pool.signal_all("RELOAD").await.unwrap();
        pool.signal_at(1, "DUMP").await.unwrap();
        pool.set_config_all("MaxCircuitDirtiness", "20").await.unwrap();

        let handles = launcher.handles().await;
        assert_eq!(handles[0].new_identity_calls(), 2);
        assert_eq!(handles[1].new_identity_calls(), 1);
        assert_eq!(handles[0].signals().await, vec!["RELOAD"]);
        assert_eq!(handles[1].signals().await, vec!["RELOAD", "DUMP"]);

        let values = pool.get_config_all("MaxCircuitDirtiness").await.unwrap();
        assert_eq!(values, vec![vec!["20".to_string()], vec!["20".to_string()]]);

        let err = pool.new_identity_by_name("ghost").await.unwrap_err();
        assert!(matches!(err, TorletError::InstanceNotFound(_)));
    }
}
