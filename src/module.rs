//! Cache Module Contract
//!
//! The [`CacheModule`] trait every cache implementation satisfies, a basic
//! in-memory implementation, and the [`ModuleRegistry`] that wires modules
//! together in dependency order.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::cache::{
    CacheStats, CapacityInfo, EntryStore, ErrorStatistics, HealthReport, PerformanceMetrics,
    SystemClock,
};
use crate::config::{CacheConfiguration, ConfigHandle};
use crate::error::{CacheError, Result};
use crate::events::{EventBus, EventSeverity, EventType};
use crate::ops::{
    self, BackupOptions, BackupResult, BenchmarkOptions, BenchmarkResult, DiagnosticsResult,
    IntegrityCheckOptions, IntegrityCheckResult, RestoreOptions, RestoreResult,
    SelfHealingResult,
};
use crate::retry::RetryPolicy;

// == Module Trait ==
/// Standardized contract shared by every cache module.
///
/// Implementors supply identity, lifecycle and the backing [`EntryStore`];
/// monitoring and operational tooling come from the default methods.
#[async_trait]
pub trait CacheModule: Send + Sync {
    /// Registry key, unique per registry
    fn module_type(&self) -> &str;

    fn name(&self) -> &str;

    /// Module types that must be initialized before this one.
    fn dependencies(&self) -> Vec<String> {
        Vec::new()
    }

    async fn initialize(&self) -> Result<()>;

    async fn shutdown(&self) -> Result<()>;

    fn is_initialized(&self) -> bool;

    /// The backing store, reachable before initialization so health and
    /// diagnostics can report on it.
    fn entry_store(&self) -> &Arc<EntryStore>;

    /// The backing store for data operations.
    ///
    /// # Errors
    /// `NotInitialized` until [`CacheModule::initialize`] has succeeded.
    fn store(&self) -> Result<&Arc<EntryStore>> {
        if self.is_initialized() {
            Ok(self.entry_store())
        } else {
            Err(CacheError::NotInitialized(self.name().to_string()))
        }
    }

    // == Monitoring ==
    fn get_stats(&self, time_range_ms: Option<u64>) -> CacheStats {
        let store = self.entry_store();
        store.monitor().stats(&store.usage(), time_range_ms)
    }

    fn get_health(&self) -> HealthReport {
        let store = self.entry_store();
        let threshold = store.config().limits.error_rate_alert_threshold;
        store
            .monitor()
            .health(&store.usage(), threshold, self.is_initialized())
    }

    fn get_performance_metrics(&self) -> PerformanceMetrics {
        let store = self.entry_store();
        store.monitor().performance(&store.usage())
    }

    fn get_capacity_info(&self) -> CapacityInfo {
        let store = self.entry_store();
        store.monitor().capacity(&store.usage())
    }

    fn get_error_statistics(&self) -> ErrorStatistics {
        self.entry_store().monitor().error_statistics()
    }

    // == Operations ==
    fn run_diagnostics(&self) -> DiagnosticsResult {
        ops::run_diagnostics(self.entry_store(), self.is_initialized())
    }

    fn attempt_self_healing(&self) -> SelfHealingResult {
        ops::attempt_self_healing(self.entry_store(), self.is_initialized())
    }

    async fn run_performance_benchmark(
        &self,
        options: BenchmarkOptions,
        cancel: CancellationToken,
    ) -> Result<BenchmarkResult> {
        let store = self.store()?.clone();
        ops::run_benchmark(store, options, cancel).await
    }

    async fn validate_data_integrity(
        &self,
        options: IntegrityCheckOptions,
        cancel: CancellationToken,
    ) -> Result<IntegrityCheckResult> {
        let store = self.store()?.clone();
        ops::validate_data_integrity(store, options, cancel).await
    }

    fn create_backup(&self, options: &BackupOptions, cancel: &CancellationToken) -> Result<BackupResult> {
        ops::create_backup(self.store()?, options, cancel)
    }

    async fn restore_from_backup(
        &self,
        data: &[u8],
        options: RestoreOptions,
        cancel: CancellationToken,
    ) -> Result<RestoreResult> {
        let store = self.store()?;
        let retry = RetryPolicy::from(&store.config().retry);
        ops::restore_from_backup(store, data, &options, &retry, &cancel).await
    }

    // == Configuration ==
    /// Validates and installs `config`; in-flight operations finish under the
    /// snapshot they started with.
    fn apply_config_update(&self, config: CacheConfiguration) -> Result<()> {
        let store = self.entry_store();
        let slow = Duration::from_millis(config.performance.slow_operation_threshold_ms);
        let previous = store.config_handle().swap(config)?;
        store.monitor().set_slow_threshold(slow);
        store.synthetic_monitor().set_slow_threshold(slow);

        let current = store.config();
        store.events().emit(
            EventType::ConfigChange,
            EventSeverity::Info,
            json!({
                "eviction_policy": current.limits.eviction_policy,
                "previous_eviction_policy": previous.limits.eviction_policy,
                "default_ttl": current.ttl.default_ttl,
                "max_entry_count": current.limits.max_entry_count,
            }),
        );
        info!("{}: configuration updated", self.name());
        Ok(())
    }

    /// Reloads the configuration from the environment.
    fn refresh_config(&self) -> Result<()> {
        self.apply_config_update(CacheConfiguration::from_env()?)
    }
}

// == Basic Module ==
/// General-purpose in-memory cache module.
pub struct BasicCacheModule {
    module_type: String,
    name: String,
    dependencies: Vec<String>,
    store: Arc<EntryStore>,
    initialized: AtomicBool,
}

impl BasicCacheModule {
    /// Creates a module on the system clock publishing to `events`.
    pub fn new(module_type: impl Into<String>, config: ConfigHandle, events: EventBus) -> Self {
        let name = events.source().to_string();
        let store = EntryStore::with_parts(config, Arc::new(SystemClock), events);
        Self::from_store(module_type, name, Arc::new(store))
    }

    pub fn from_store(module_type: impl Into<String>, name: impl Into<String>, store: Arc<EntryStore>) -> Self {
        Self {
            module_type: module_type.into(),
            name: name.into(),
            dependencies: Vec::new(),
            store,
            initialized: AtomicBool::new(false),
        }
    }

    pub fn with_dependencies<I, S>(mut self, dependencies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.dependencies = dependencies.into_iter().map(Into::into).collect();
        self
    }
}

#[async_trait]
impl CacheModule for BasicCacheModule {
    fn module_type(&self) -> &str {
        &self.module_type
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<String> {
        self.dependencies.clone()
    }

    async fn initialize(&self) -> Result<()> {
        self.store.config().validate()?;
        if !self.initialized.swap(true, Ordering::SeqCst) {
            self.store.config_handle().mark_known_good();
            info!("{} ({}) initialized", self.name, self.module_type);
        }
        Ok(())
    }

    async fn shutdown(&self) -> Result<()> {
        if self.initialized.swap(false, Ordering::SeqCst) {
            let removed = self.store.clear(None)?;
            info!("{} shut down, released {} entries", self.name, removed);
        }
        Ok(())
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn entry_store(&self) -> &Arc<EntryStore> {
        &self.store
    }
}

// == Registry ==
/// Modules keyed by module type, with an explicit dependency graph.
#[derive(Default)]
pub struct ModuleRegistry {
    modules: HashMap<String, Arc<dyn CacheModule>>,
}

impl ModuleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// `InvalidConfig` if the module type is already registered.
    pub fn register(&mut self, module: Arc<dyn CacheModule>) -> Result<()> {
        let module_type = module.module_type().to_string();
        if self.modules.contains_key(&module_type) {
            return Err(CacheError::InvalidConfig(format!(
                "module type '{}' is already registered",
                module_type
            )));
        }
        self.modules.insert(module_type, module);
        Ok(())
    }

    pub fn get(&self, module_type: &str) -> Option<Arc<dyn CacheModule>> {
        self.modules.get(module_type).cloned()
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    /// Orders module types so every module follows its dependencies.
    ///
    /// Ties are broken alphabetically.
    ///
    /// # Errors
    /// `InvalidConfig` on a missing dependency or a dependency cycle.
    pub fn resolve_order(&self) -> Result<Vec<String>> {
        let mut pending: BTreeMap<&str, usize> = BTreeMap::new();
        let mut dependents: HashMap<String, Vec<&str>> = HashMap::new();
        for (module_type, module) in &self.modules {
            let dependencies = module.dependencies();
            for dependency in &dependencies {
                if !self.modules.contains_key(dependency) {
                    return Err(CacheError::InvalidConfig(format!(
                        "module '{}' depends on unregistered module '{}'",
                        module_type, dependency
                    )));
                }
                dependents
                    .entry(dependency.clone())
                    .or_default()
                    .push(module_type.as_str());
            }
            pending.insert(module_type.as_str(), dependencies.len());
        }

        let mut ready: VecDeque<&str> = pending
            .iter()
            .filter(|(_, count)| **count == 0)
            .map(|(module_type, _)| *module_type)
            .collect();
        let mut order = Vec::with_capacity(self.modules.len());
        while let Some(module_type) = ready.pop_front() {
            order.push(module_type.to_string());
            let mut unlocked = Vec::new();
            for dependent in dependents.get(module_type).into_iter().flatten() {
                if let Some(count) = pending.get_mut(dependent) {
                    *count -= 1;
                    if *count == 0 {
                        unlocked.push(*dependent);
                    }
                }
            }
            unlocked.sort_unstable();
            ready.extend(unlocked);
        }

        if order.len() < self.modules.len() {
            let stuck: Vec<&str> = pending
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(module_type, _)| *module_type)
                .collect();
            return Err(CacheError::InvalidConfig(format!(
                "dependency cycle among modules: {}",
                stuck.join(", ")
            )));
        }
        Ok(order)
    }

    /// Initializes every module in dependency order, stopping at the first
    /// failure. Returns the order used.
    pub async fn initialize_all(&self) -> Result<Vec<String>> {
        let order = self.resolve_order()?;
        for module_type in &order {
            if let Some(module) = self.modules.get(module_type) {
                module.initialize().await.map_err(|e| {
                    error!("module '{}' failed to initialize: {}", module_type, e);
                    e
                })?;
            }
        }
        info!("initialized {} cache modules", order.len());
        Ok(order)
    }

    /// Shuts modules down in reverse dependency order.
    ///
    /// Every module is attempted; the first failure is returned afterwards.
    pub async fn shutdown_all(&self) -> Result<()> {
        let mut order = match self.resolve_order() {
            Ok(order) => order,
            Err(_) => {
                let mut types: Vec<String> = self.modules.keys().cloned().collect();
                types.sort();
                types
            }
        };
        order.reverse();

        let mut first_error = None;
        for module_type in &order {
            if let Some(module) = self.modules.get(module_type) {
                if let Err(e) = module.shutdown().await {
                    warn!("module '{}' failed to shut down: {}", module_type, e);
                    first_error.get_or_insert(e);
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{GetOptions, HealthStatus, SetOptions};
    use crate::events::CollectingSink;
    use parking_lot::Mutex;

    fn module(module_type: &str) -> BasicCacheModule {
        let config = ConfigHandle::new(CacheConfiguration::default()).unwrap();
        BasicCacheModule::new(module_type, config, EventBus::disconnected(module_type))
    }

    struct RecordingModule {
        inner: BasicCacheModule,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl CacheModule for RecordingModule {
        fn module_type(&self) -> &str {
            self.inner.module_type()
        }
        fn name(&self) -> &str {
            self.inner.name()
        }
        fn dependencies(&self) -> Vec<String> {
            self.inner.dependencies()
        }
        async fn initialize(&self) -> Result<()> {
            self.log.lock().push(format!("init:{}", self.module_type()));
            self.inner.initialize().await
        }
        async fn shutdown(&self) -> Result<()> {
            self.log.lock().push(format!("stop:{}", self.module_type()));
            self.inner.shutdown().await
        }
        fn is_initialized(&self) -> bool {
            self.inner.is_initialized()
        }
        fn entry_store(&self) -> &Arc<EntryStore> {
            self.inner.entry_store()
        }
    }

    #[tokio::test]
    async fn test_store_requires_initialize() {
        let module = module("basic");
        assert!(matches!(module.store(), Err(CacheError::NotInitialized(_))));
        assert_eq!(module.get_health().connection, HealthStatus::Unhealthy);

        tokio_test::assert_ok!(module.initialize().await);
        let store = tokio_test::assert_ok!(module.store());
        store.set("k", "v", SetOptions::default()).unwrap();
        assert!(store.get("k", GetOptions::default()).unwrap().hit);

        tokio_test::assert_ok!(module.shutdown().await);
        tokio_test::assert_err!(module.store());
        assert!(module.entry_store().is_empty());
    }

    #[tokio::test]
    async fn test_tooling_before_initialize_is_rejected() {
        let module = module("basic");
        let result = module
            .run_performance_benchmark(BenchmarkOptions::default(), CancellationToken::new())
            .await;
        assert!(matches!(result, Err(CacheError::NotInitialized(_))));
        let backup = module.create_backup(&BackupOptions::default(), &CancellationToken::new());
        assert!(backup.is_err());
    }

    #[tokio::test]
    async fn test_config_update_emits_event() {
        let (bus, rx) = EventBus::new("quote-cache", 16);
        let sink = Arc::new(CollectingSink::new());
        let dispatcher = crate::events::spawn_dispatcher(rx, vec![sink.clone()]);
        let config = ConfigHandle::new(CacheConfiguration::default()).unwrap();
        let module = BasicCacheModule::new("quote", config, bus);

        let mut next = CacheConfiguration::default();
        next.ttl.default_ttl = 30;
        module.apply_config_update(next).unwrap();
        assert_eq!(module.entry_store().config().ttl.default_ttl, 30);

        let mut bad = CacheConfiguration::default();
        bad.ttl.min_ttl = 10_000;
        assert!(matches!(
            module.apply_config_update(bad),
            Err(CacheError::InvalidConfig(_))
        ));
        assert_eq!(module.entry_store().config().ttl.default_ttl, 30);

        drop(module);
        dispatcher.await.unwrap();
        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, EventType::ConfigChange);
        assert_eq!(events[0].source_module, "quote-cache");
    }

    #[test]
    fn test_registry_rejects_duplicate_type() {
        let mut registry = ModuleRegistry::new();
        registry.register(Arc::new(module("basic"))).unwrap();
        let again = registry.register(Arc::new(module("basic")));
        assert!(matches!(again, Err(CacheError::InvalidConfig(_))));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_resolve_order_follows_dependencies() {
        let mut registry = ModuleRegistry::new();
        registry
            .register(Arc::new(module("quote").with_dependencies(["symbol-mapping", "basic"])))
            .unwrap();
        registry
            .register(Arc::new(module("symbol-mapping").with_dependencies(["basic"])))
            .unwrap();
        registry.register(Arc::new(module("basic"))).unwrap();
        registry.register(Arc::new(module("analytics"))).unwrap();

        let order = registry.resolve_order().unwrap();
        assert_eq!(order, vec!["analytics", "basic", "symbol-mapping", "quote"]);
    }

    #[test]
    fn test_resolve_order_detects_missing_and_cycles() {
        let mut missing = ModuleRegistry::new();
        missing
            .register(Arc::new(module("quote").with_dependencies(["basic"])))
            .unwrap();
        assert!(matches!(
            missing.resolve_order(),
            Err(CacheError::InvalidConfig(msg)) if msg.contains("unregistered")
        ));

        let mut cyclic = ModuleRegistry::new();
        cyclic
            .register(Arc::new(module("a").with_dependencies(["b"])))
            .unwrap();
        cyclic
            .register(Arc::new(module("b").with_dependencies(["a"])))
            .unwrap();
        cyclic.register(Arc::new(module("c"))).unwrap();
        assert!(matches!(
            cyclic.resolve_order(),
            Err(CacheError::InvalidConfig(msg)) if msg.contains("cycle") && msg.contains("a, b")
        ));
    }

    #[tokio::test]
    async fn test_lifecycle_runs_in_dependency_order() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut registry = ModuleRegistry::new();
        for (module_type, deps) in [("quote", vec!["basic"]), ("basic", vec![])] {
            registry
                .register(Arc::new(RecordingModule {
                    inner: module(module_type).with_dependencies(deps),
                    log: log.clone(),
                }))
                .unwrap();
        }

        registry.initialize_all().await.unwrap();
        assert!(registry.get("quote").unwrap().is_initialized());
        registry.shutdown_all().await.unwrap();

        assert_eq!(
            *log.lock(),
            vec!["init:basic", "init:quote", "stop:quote", "stop:basic"]
        );
    }
}
