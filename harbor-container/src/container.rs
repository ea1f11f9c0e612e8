//! # The Container — heart of Harbor
//!
//! Registers named services and resolves them, together with everything
//! they depend on, on demand.
//!
//! # Architecture
//! ```text
//! ContainerBuilder ──build()──> Container ──create_child()──> Container
//!   (validates graph)              │                       (snapshot copy)
//!                                  │ resolve("name")
//!                                  ▼
//!                  ResolutionContext (one per top-level call)
//! ```
//!
//! # Examples
//! ```rust
//! use harbor_container::prelude::*;
//! use std::sync::Arc;
//!
//! struct Logger;
//! struct Repo { logger: Arc<Logger> }
//!
//! let container = Container::new();
//! container
//!     .register("logger", |_| Ok(Logger), ServiceOptions::singleton())
//!     .register(
//!         "repo",
//!         |deps| Ok(Repo { logger: deps.get::<Logger>(0)? }),
//!         ServiceOptions::transient().depends_on(["logger"]),
//!     );
//!
//! let repo: Arc<Repo> = container.resolve("repo").expect("Failed to resolve");
//! let logger: Arc<Logger> = container.resolve("logger").expect("Failed to resolve");
//! assert!(Arc::ptr_eq(&repo.logger, &logger));
//! ```

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use harbor_support::rendering::suggest_similar;
use parking_lot::RwLock;
use tracing::{debug, info, instrument, trace, warn};

use crate::descriptor::{
    Dependencies, Factory, Instance, Registry, ServiceDescriptor, ServiceInfo, ServiceOptions,
    downcast,
};
use crate::dispose::{Dispose, dispose_hook, instance_id};
use crate::error::{BoxError, ContainerError, Result};
use crate::graph::GraphValidator;
use crate::key::ServiceKey;
use crate::provider::Provider;
use crate::resolution::ResolutionContext;

const MAX_SUGGESTIONS: usize = 3;

// ═══════════════════════════════════════════
// Container
// ═══════════════════════════════════════════

/// Thread-safe, name-keyed dependency injection container.
///
/// Registration and resolution both take `&self`; the internal lock is never
/// held while factories or disposal hooks run, so factories are free to
/// use the container themselves. A factory resolving a service that is
/// still being built on its own thread gets
/// [`ContainerError::CircularDependency`], and a [`ContainerError`] it
/// returns from such a call is propagated unwrapped.
pub struct Container {
    registry: RwLock<Registry>,
}

impl Container {
    /// Creates an empty container.
    pub fn new() -> Self {
        Self {
            registry: RwLock::new(Registry::new()),
        }
    }

    /// Creates a builder that validates the graph before handing out the
    /// container.
    pub fn builder() -> ContainerBuilder {
        ContainerBuilder::new()
    }

    // ── Registration ──

    /// Registers a typed factory.
    ///
    /// The factory receives the services listed in `options.dependencies`,
    /// already resolved and in that order. Re-registering a name replaces
    /// the previous descriptor and drops its cached instance.
    pub fn register<T, F>(
        &self,
        name: impl Into<ServiceKey>,
        factory: F,
        options: ServiceOptions,
    ) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies<'_>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register_factory(name, Factory::constructor(factory), options)
    }

    /// Registers an already erased [`Factory`].
    pub fn register_factory(
        &self,
        name: impl Into<ServiceKey>,
        factory: Factory,
        options: ServiceOptions,
    ) -> &Self {
        self.register_descriptor(ServiceDescriptor::new(name, factory, options))
    }

    /// Registers a complete descriptor.
    pub fn register_descriptor(&self, descriptor: ServiceDescriptor) -> &Self {
        self.registry.write().insert(descriptor);
        self
    }

    /// Registers a pre-built value as a singleton.
    ///
    /// The value goes straight into the singleton cache; no factory runs.
    pub fn register_value<T: Send + Sync + 'static>(
        &self,
        name: impl Into<ServiceKey>,
        value: T,
    ) -> &Self {
        self.register_factory(name, Factory::value(value), ServiceOptions::singleton())
    }

    /// Registers an existing erased instance as a singleton, keeping its
    /// identity (the same `Arc` is handed out).
    pub fn register_instance(&self, name: impl Into<ServiceKey>, instance: Instance) -> &Self {
        self.register_factory(name, Factory::Instance(instance), ServiceOptions::singleton())
    }

    /// Registers a typed factory whose cached instance is disposed by
    /// [`Container::dispose`].
    pub fn register_disposable<T, F>(
        &self,
        name: impl Into<ServiceKey>,
        factory: F,
        options: ServiceOptions,
    ) -> &Self
    where
        T: Dispose,
        F: Fn(&Dependencies<'_>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.register_descriptor(
            ServiceDescriptor::new(name, Factory::constructor(factory), options)
                .with_disposer(dispose_hook::<T>()),
        )
    }

    /// Registers a pre-built value as a disposable singleton.
    pub fn register_disposable_value<T: Dispose>(
        &self,
        name: impl Into<ServiceKey>,
        value: T,
    ) -> &Self {
        self.register_descriptor(
            ServiceDescriptor::new(name, Factory::value(value), ServiceOptions::singleton())
                .with_disposer(dispose_hook::<T>()),
        )
    }

    /// Lets a [`Provider`] register its services.
    pub fn add_provider(&self, provider: &dyn Provider) -> &Self {
        debug!(provider = provider.name(), "Adding provider");
        provider.register(self);
        self
    }

    // ── Resolution ──

    /// Resolves a service and downcasts it to `T`.
    ///
    /// ```rust,ignore
    /// let client: Arc<AuthClient> = container.resolve("authClient")?;
    /// ```
    ///
    /// # Errors
    /// - [`ContainerError::ServiceNotFound`] — `name` or one of its
    ///   dependencies is not registered
    /// - [`ContainerError::CircularDependency`] — the graph loops back
    /// - [`ContainerError::ConstructionFailed`] — a factory failed
    /// - [`ContainerError::TypeMismatch`] — the instance is not a `T`
    pub fn resolve<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let key = ServiceKey::new(name);
        let instance = self.resolve_key(&key)?;
        downcast(&key, instance)
    }

    /// Resolves a service without downcasting it.
    pub fn resolve_instance(&self, name: &str) -> Result<Instance> {
        self.resolve_key(&ServiceKey::new(name))
    }

    /// Resolves several services in order, stopping at the first failure.
    pub fn resolve_all<I, S>(&self, names: I) -> Result<Vec<Instance>>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        names
            .into_iter()
            .map(|name| self.resolve_instance(name.as_ref()))
            .collect()
    }

    fn resolve_key(&self, key: &ServiceKey) -> Result<Instance> {
        let mut ctx = ResolutionContext::new(self.identity());
        self.resolve_in(key, &mut ctx)
    }

    // Stable for as long as a resolution borrows `self`.
    fn identity(&self) -> usize {
        std::ptr::from_ref(self) as usize
    }

    /// Resolves `key` on the path recorded in `ctx`.
    ///
    /// Every entry pushed here is popped before returning, whatever the
    /// outcome.
    fn resolve_in(&self, key: &ServiceKey, ctx: &mut ResolutionContext) -> Result<Instance> {
        let found = self.registry.read().lookup(key.as_str());
        let (descriptor, slot) =
            found.ok_or_else(|| self.not_found(key, ctx.current().cloned()))?;

        if let Some(cached) = slot.as_ref().and_then(|slot| slot.get()) {
            trace!(service = %key, "Singleton cache hit");
            return Ok(cached.clone());
        }

        ctx.enter(key)?;
        trace!(service = %key, depth = ctx.depth(), lifecycle = %descriptor.lifecycle(), "Resolving");

        let result = match &slot {
            Some(slot) => slot
                .get_or_try_init(|| self.construct(&descriptor, ctx))
                .cloned(),
            None => self.construct(&descriptor, ctx),
        };

        ctx.leave();
        result
    }

    /// Resolves the declared dependencies left to right, then builds the
    /// instance.
    fn construct(
        &self,
        descriptor: &ServiceDescriptor,
        ctx: &mut ResolutionContext,
    ) -> Result<Instance> {
        let instances = descriptor
            .dependencies()
            .iter()
            .map(|dependency| self.resolve_in(dependency, ctx))
            .collect::<Result<Vec<_>>>()?;

        match descriptor.factory() {
            Factory::Instance(instance) => Ok(instance.clone()),
            Factory::Constructor(factory) => {
                let deps = Dependencies::new(descriptor.name(), descriptor.dependencies(), &instances);
                factory(&deps).map_err(|source| match source.downcast::<ContainerError>() {
                    // A nested `resolve` inside the factory failed; surface it as is.
                    Ok(nested) => *nested,
                    Err(source) => {
                        debug!(service = %descriptor.name(), error = %source, "Factory failed");
                        ContainerError::construction(descriptor.name().clone(), source)
                    }
                })
            }
        }
    }

    fn not_found(&self, key: &ServiceKey, required_by: Option<ServiceKey>) -> ContainerError {
        let names = self.registry.read().names();
        let suggestions = suggest_similar(
            key.as_str(),
            names.iter().map(ServiceKey::as_str),
            MAX_SUGGESTIONS,
        );
        ContainerError::not_found(key.clone(), required_by, suggestions)
    }

    // ── Introspection ──

    pub fn is_registered(&self, name: &str) -> bool {
        self.registry.read().contains(name)
    }

    /// Names of all registered services, sorted.
    pub fn registered_services(&self) -> Vec<ServiceKey> {
        self.registry.read().names()
    }

    /// Removes a service and its cached instance.
    ///
    /// Returns whether a descriptor existed. The removed instance is not
    /// disposed.
    pub fn unregister(&self, name: &str) -> bool {
        let removed = self.registry.write().remove(name);
        if removed {
            debug!(service = name, "Unregistered service");
        }
        removed
    }

    /// The descriptor registered under `name`.
    pub fn configuration(&self, name: &str) -> Option<ServiceDescriptor> {
        self.registry.read().get(name).cloned()
    }

    /// Serializable summaries of every registration, sorted by name.
    pub fn describe(&self) -> Vec<ServiceInfo> {
        let mut infos: Vec<ServiceInfo> = self
            .registry
            .read()
            .descriptors()
            .map(ServiceDescriptor::info)
            .collect();
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        infos
    }

    pub fn len(&self) -> usize {
        self.registry.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.registry.read().is_empty()
    }

    /// Checks the whole graph for missing dependencies and cycles without
    /// constructing anything.
    pub fn validate(&self) -> Result<()> {
        let edges: HashMap<ServiceKey, Vec<ServiceKey>> = self
            .registry
            .read()
            .descriptors()
            .map(|d| (d.name().clone(), d.dependencies().to_vec()))
            .collect();

        GraphValidator::new(edges).validate()
    }

    // ── Scoping & teardown ──

    /// Creates a child holding a snapshot of this container's registrations
    /// and already constructed singletons.
    ///
    /// From then on the two are independent: registrations, resolutions and
    /// teardown on one are never seen by the other.
    pub fn create_child(&self) -> Container {
        let snapshot = self.registry.read().snapshot();
        debug!(registry = ?snapshot, "Created child container");
        Container {
            registry: RwLock::new(snapshot),
        }
    }

    /// Disposes every cached singleton that has a disposal hook, then
    /// empties the container.
    ///
    /// Each distinct instance is disposed once, even when it is registered
    /// under several names. A failing hook is logged and the remaining ones
    /// still run.
    #[instrument(skip(self), name = "container_dispose")]
    pub fn dispose(&self) {
        let registry = std::mem::take(&mut *self.registry.write());

        let mut seen = HashSet::new();
        let (mut disposed, mut failed) = (0usize, 0usize);

        for (name, instance, hook) in registry.cached_instances() {
            let Some(hook) = hook else { continue };
            if !seen.insert(instance_id(&instance)) {
                trace!(service = %name, "Already disposed under another name");
                continue;
            }

            match hook(&instance) {
                Ok(()) => {
                    disposed += 1;
                    trace!(service = %name, "Disposed");
                }
                Err(error) => {
                    failed += 1;
                    warn!(service = %name, error = %error, "Disposal failed");
                }
            }
        }

        info!(disposed, failed, "Container disposed");
    }

    /// Empties the container without running any disposal hook.
    pub fn clear(&self) {
        let registry = std::mem::take(&mut *self.registry.write());
        debug!(removed = registry.len(), "Container cleared");
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("registry", &*self.registry.read())
            .finish()
    }
}

// ============================================================
// ContainerBuilder
// ============================================================

/// Builds a [`Container`] and validates its graph before use.
///
/// # Examples
/// ```rust,ignore
/// let container = Container::builder()
///     .register_value("baseUrl", String::from("https://staging.example.com"))
///     .register("http", |deps| HttpClient::new(deps.get::<String>(0)?), ServiceOptions::singleton().depends_on(["baseUrl"]))
///     .add_provider(&AuthProvider)
///     .build()?;
/// ```
pub struct ContainerBuilder {
    container: Container,
    validate_on_build: bool,
}

impl ContainerBuilder {
    fn new() -> Self {
        Self {
            container: Container::new(),
            validate_on_build: true,
        }
    }

    /// Turns graph validation in [`build()`](Self::build) on or off.
    pub fn validate_on_build(mut self, validate: bool) -> Self {
        self.validate_on_build = validate;
        self
    }

    /// See [`Container::register`].
    pub fn register<T, F>(self, name: impl Into<ServiceKey>, factory: F, options: ServiceOptions) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies<'_>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        self.container.register(name, factory, options);
        self
    }

    /// See [`Container::register_value`].
    pub fn register_value<T: Send + Sync + 'static>(self, name: impl Into<ServiceKey>, value: T) -> Self {
        self.container.register_value(name, value);
        self
    }

    /// See [`Container::register_descriptor`].
    pub fn register_descriptor(self, descriptor: ServiceDescriptor) -> Self {
        self.container.register_descriptor(descriptor);
        self
    }

    /// See [`Container::add_provider`].
    pub fn add_provider(self, provider: &dyn Provider) -> Self {
        self.container.add_provider(provider);
        self
    }

    /// Finishes the container.
    ///
    /// # Errors
    /// With validation on: [`ContainerError::ServiceNotFound`] for a
    /// dependency nobody registered, [`ContainerError::CircularDependency`]
    /// for a cycle.
    #[instrument(skip(self), name = "container_build")]
    pub fn build(self) -> Result<Container> {
        info!(registered = self.container.len(), "Building container");

        if self.validate_on_build {
            self.container.validate()?;
        }

        info!("Container built successfully");
        Ok(self.container)
    }
}

// ═══════════════════════════════════════════
// Prelude
// ═══════════════════════════════════════════

pub mod prelude {
    pub use super::{Container, ContainerBuilder};
    pub use crate::descriptor::{Dependencies, Factory, Instance, ServiceDescriptor, ServiceInfo, ServiceOptions};
    pub use crate::dispose::Dispose;
    pub use crate::error::{BoxError, ContainerError, Result};
    pub use crate::key::ServiceKey;
    pub use crate::lifecycle::Lifecycle;
    pub use crate::provider::Provider;
    #[cfg(feature = "async")]
    pub use crate::pending::Pending;
}

// ═══════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Lifecycle;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Logger {
        id: u32,
    }

    struct Repo {
        logger: Arc<Logger>,
    }

    struct Service {
        repo: Arc<Repo>,
        logger: Arc<Logger>,
    }

    #[derive(Debug)]
    struct Boom;

    impl fmt::Display for Boom {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("boom")
        }
    }

    impl std::error::Error for Boom {}

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::new("harbor_container=trace"))
            .with_test_writer()
            .try_init();
    }

    fn counter() -> Arc<AtomicU32> {
        Arc::new(AtomicU32::new(0))
    }

    fn counting_transient(container: &Container, name: &str, calls: &Arc<AtomicU32>, deps: &[&str]) {
        let calls = calls.clone();
        container.register(
            name,
            move |_| Ok(calls.fetch_add(1, Ordering::SeqCst)),
            ServiceOptions::transient().depends_on(deps.iter().copied()),
        );
    }

    fn layered_container() -> Container {
        let container = Container::new();
        let ids = counter();
        container
            .register(
                "logger",
                move |_| Ok(Logger { id: ids.fetch_add(1, Ordering::SeqCst) }),
                ServiceOptions::singleton(),
            )
            .register(
                "repo",
                |deps| Ok(Repo { logger: deps.get(0)? }),
                ServiceOptions::singleton().depends_on(["logger"]),
            )
            .register(
                "service",
                |deps| {
                    Ok(Service {
                        repo: deps.get(0)?,
                        logger: deps.by_name("logger")?,
                    })
                },
                ServiceOptions::transient().depends_on(["repo", "logger"]),
            );
        container
    }

    #[test]
    fn layered_scenario_shares_singletons() {
        let container = layered_container();

        let first: Arc<Service> = container.resolve("service").unwrap();
        let second: Arc<Service> = container.resolve("service").unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert!(Arc::ptr_eq(&first.repo, &second.repo));
        assert!(Arc::ptr_eq(&first.logger, &second.logger));
        assert!(Arc::ptr_eq(&first.repo.logger, &first.logger));
        assert_eq!(first.logger.id, 0);
    }

    #[test]
    fn register_then_unregister() {
        let container = Container::new();
        container.register_value("port", 8080u16);
        assert!(container.is_registered("port"));
        assert!(!container.is_registered("Port"));

        assert!(container.unregister("port"));
        assert!(!container.is_registered("port"));
        assert!(!container.unregister("port"));
    }

    #[test]
    fn singleton_resolves_to_identical_instance() {
        let container = layered_container();
        let a = container.resolve_instance("logger").unwrap();
        let b = container.resolve_instance("logger").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn singleton_factory_called_once() {
        let calls = counter();
        let container = Container::new();
        container.register(
            "config",
            {
                let calls = calls.clone();
                move |_| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok(String::from("staging"))
                }
            },
            ServiceOptions::default(),
        );

        for _ in 0..3 {
            assert_eq!(container.resolve::<String>("config").unwrap().as_str(), "staging");
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn scoped_is_cached_like_singleton() {
        let container = Container::new();
        container.register("session", |_| Ok(Vec::<u8>::new()), ServiceOptions::scoped());

        let a = container.resolve::<Vec<u8>>("session").unwrap();
        let b = container.resolve::<Vec<u8>>("session").unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn transient_creates_new_each_time() {
        let calls = counter();
        let container = Container::new();
        counting_transient(&container, "id", &calls, &[]);

        let a: Arc<u32> = container.resolve("id").unwrap();
        let b: Arc<u32> = container.resolve("id").unwrap();
        assert_eq!((*a, *b), (0, 1));
        assert!(!Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn transient_dependency_rebuilt_per_path() {
        let calls = counter();
        let container = Container::new();
        counting_transient(&container, "t", &calls, &[]);
        container
            .register("mid", |deps| Ok(*deps.get::<u32>(0)?), ServiceOptions::transient().depends_on(["t"]))
            .register(
                "top",
                |deps| Ok((*deps.get::<u32>(0)?, *deps.get::<u32>(1)?)),
                ServiceOptions::transient().depends_on(["t", "mid"]),
            );

        let top: Arc<(u32, u32)> = container.resolve("top").unwrap();
        assert_eq!(*top, (0, 1));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn singleton_dependency_built_once_in_diamond() {
        let calls = counter();
        let container = Container::new();
        container
            .register(
                "d",
                {
                    let calls = calls.clone();
                    move |_| Ok(calls.fetch_add(1, Ordering::SeqCst))
                },
                ServiceOptions::singleton(),
            )
            .register("b", |deps| Ok(*deps.get::<u32>(0)?), ServiceOptions::transient().depends_on(["d"]))
            .register("c", |deps| Ok(*deps.get::<u32>(0)?), ServiceOptions::transient().depends_on(["d"]))
            .register("a", |_| Ok(()), ServiceOptions::transient().depends_on(["b", "c"]));

        container.resolve_instance("a").unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn dependencies_resolved_in_declared_order() {
        let order = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let container = Container::new();
        for name in ["x", "y", "z"] {
            let order = order.clone();
            container.register(name, move |_| {
                order.lock().push(name);
                Ok(())
            }, ServiceOptions::transient());
        }
        container.register("all", |deps| Ok(deps.len()), ServiceOptions::transient().depends_on(["z", "x", "y"]));

        assert_eq!(*container.resolve::<usize>("all").unwrap(), 3);
        assert_eq!(*order.lock(), ["z", "x", "y"]);
    }

    #[test]
    fn self_dependency_is_circular() {
        init_tracing();
        let container = Container::new();
        container.register("a", |_| Ok(()), ServiceOptions::transient().depends_on(["a"]));

        match container.resolve_instance("a").unwrap_err() {
            ContainerError::CircularDependency(err) => {
                assert_eq!(err.service().unwrap(), "a");
                assert_eq!(err.chain.len(), 2);
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn three_node_cycle_names_the_cycle() {
        init_tracing();
        let container = Container::new();
        container
            .register("a", |_| Ok(()), ServiceOptions::singleton().depends_on(["b"]))
            .register("b", |_| Ok(()), ServiceOptions::singleton().depends_on(["c"]))
            .register("c", |_| Ok(()), ServiceOptions::singleton().depends_on(["a"]));

        let err = container.resolve_instance("b").unwrap_err();
        let msg = err.to_string();
        match err {
            ContainerError::CircularDependency(err) => {
                let names: Vec<&str> = err.chain.iter().map(|k| k.as_str()).collect();
                assert_eq!(names, ["b", "c", "a", "b"]);
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
        assert!(msg.contains("b → c → a → b"));
    }

    #[test]
    fn failed_cycle_caches_nothing() {
        let calls = counter();
        let container = Container::new();
        container
            .register("a", |_| Ok(1u8), ServiceOptions::singleton().depends_on(["b"]))
            .register(
                "b",
                {
                    let calls = calls.clone();
                    move |_| Ok(calls.fetch_add(1, Ordering::SeqCst))
                },
                ServiceOptions::singleton().depends_on(["a"]),
            );

        assert!(container.resolve_instance("a").unwrap_err().is_circular());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        container.register("a", |_| Ok(1u8), ServiceOptions::singleton());
        assert_eq!(*container.resolve::<u32>("b").unwrap(), 0);
    }

    #[test]
    fn missing_service_is_an_error() {
        let container = Container::new();
        container.register_value("authClient", 1u8);

        match container.resolve::<u8>("authclient").unwrap_err() {
            ContainerError::ServiceNotFound(err) => {
                assert_eq!(err.requested, "authclient");
                assert!(err.required_by.is_none());
                assert_eq!(err.suggestions, ["authClient"]);
            }
            other => panic!("Expected ServiceNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_names_requester() {
        let container = Container::new();
        container.register("steps", |_| Ok(()), ServiceOptions::transient().depends_on(["browser"]));

        match container.resolve_instance("steps").unwrap_err() {
            ContainerError::ServiceNotFound(err) => {
                assert_eq!(err.requested, "browser");
                assert_eq!(err.required_by.unwrap(), "steps");
            }
            other => panic!("Expected ServiceNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn factory_error_propagates_and_stack_is_clean() {
        let container = Container::new();
        container
            .register("x", |_| -> std::result::Result<(), BoxError> { Err(Box::new(Boom)) }, ServiceOptions::default())
            .register_value("y", String::from("fine"));

        let err = container.resolve_instance("x").unwrap_err();
        assert!(err.factory_cause().unwrap().downcast_ref::<Boom>().is_some());
        assert!(err.to_string().contains("boom"));

        assert_eq!(container.resolve::<String>("y").unwrap().as_str(), "fine");
    }

    #[test]
    fn failed_resolution_is_not_reported_circular_later() {
        let attempts = counter();
        let container = Container::new();
        container
            .register(
                "flaky",
                {
                    let attempts = attempts.clone();
                    move |_| match attempts.fetch_add(1, Ordering::SeqCst) {
                        0 => Err(Box::new(Boom) as BoxError),
                        n => Ok(n),
                    }
                },
                ServiceOptions::singleton(),
            )
            .register("user", |deps| Ok(*deps.get::<u32>(0)?), ServiceOptions::transient().depends_on(["flaky"]));

        let err = container.resolve_instance("user").unwrap_err();
        assert!(matches!(err, ContainerError::ConstructionFailed { ref service, .. } if service == "flaky"));

        assert_eq!(*container.resolve::<u32>("user").unwrap(), 1);
        assert_eq!(*container.resolve::<u32>("user").unwrap(), 1);
    }

    #[test]
    fn type_mismatch_is_reported() {
        let container = Container::new();
        container.register_value("port", 8080u16);

        assert!(matches!(
            container.resolve::<String>("port").unwrap_err(),
            ContainerError::TypeMismatch { .. }
        ));
    }

    #[test]
    fn reregistration_overwrites() {
        let container = Container::new();
        container.register_value("env", "dev");
        assert_eq!(*container.resolve::<&str>("env").unwrap(), "dev");

        container.register_value("env", "prod");
        assert_eq!(*container.resolve::<&str>("env").unwrap(), "prod");
        assert_eq!(container.len(), 1);
    }

    #[test]
    fn register_instance_keeps_identity() {
        let container = Container::new();
        let shared: Instance = Arc::new(String::from("driver"));
        container.register_instance("driver", shared.clone());

        assert!(Arc::ptr_eq(&container.resolve_instance("driver").unwrap(), &shared));
    }

    #[test]
    fn resolve_all_preserves_order() {
        let container = Container::new();
        container.register_value("a", 1u8).register_value("b", 2u8);

        let values: Vec<u8> = container
            .resolve_all(["b", "a"])
            .unwrap()
            .into_iter()
            .map(|i| *i.downcast::<u8>().unwrap())
            .collect();
        assert_eq!(values, [2, 1]);
    }

    #[test]
    fn resolve_all_fails_fast() {
        let calls = counter();
        let container = Container::new();
        container.register_value("a", 1u8);
        counting_transient(&container, "b", &calls, &[]);

        assert!(container.resolve_all(["a", "missing", "b"]).unwrap_err().is_not_found());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn introspection() {
        let container = layered_container();
        assert_eq!(container.registered_services(), ["logger", "repo", "service"].map(ServiceKey::new));

        let config = container.configuration("service").unwrap();
        assert_eq!(config.lifecycle(), Lifecycle::Transient);
        assert_eq!(config.dependencies(), ["repo", "logger"].map(ServiceKey::new));
        assert!(container.configuration("missing").is_none());

        let infos = container.describe();
        assert_eq!(infos.len(), 3);
        assert_eq!(infos[0].name, "logger");
        assert!(container.validate().is_ok());
    }

    #[test]
    fn child_override_does_not_touch_parent() {
        let parent = Container::new();
        parent.register_value("url", String::from("https://prod"));

        let child = parent.create_child();
        child.register_value("url", String::from("https://staging"));

        assert_eq!(parent.resolve::<String>("url").unwrap().as_str(), "https://prod");
        assert_eq!(child.resolve::<String>("url").unwrap().as_str(), "https://staging");
    }

    #[test]
    fn child_shares_singletons_built_before_creation() {
        let parent = layered_container();
        let before = parent.resolve_instance("logger").unwrap();

        let child = parent.create_child();
        assert!(Arc::ptr_eq(&child.resolve_instance("logger").unwrap(), &before));

        // Built after the snapshot: each side gets its own.
        let parent_repo = parent.resolve_instance("repo").unwrap();
        let child_repo = child.resolve_instance("repo").unwrap();
        assert!(!Arc::ptr_eq(&parent_repo, &child_repo));
    }

    #[test]
    fn parent_changes_after_creation_are_invisible() {
        let parent = Container::new();
        let child = parent.create_child();

        parent.register_value("late", 1u8);
        assert!(!child.is_registered("late"));

        child.register_value("own", 2u8);
        assert!(!parent.is_registered("own"));
    }

    struct Browser {
        closed: Arc<AtomicU32>,
        fail: bool,
    }

    impl Dispose for Browser {
        fn dispose(&self) -> std::result::Result<(), BoxError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Box::new(Boom));
            }
            Ok(())
        }
    }

    #[test]
    fn dispose_once_per_instance() {
        let closed = counter();
        let container = Container::new();
        container
            .register_disposable(
                "browser",
                {
                    let closed = closed.clone();
                    move |_| Ok(Browser { closed: closed.clone(), fail: false })
                },
                ServiceOptions::singleton(),
            )
            .register("page", |deps| Ok(deps.get::<Browser>(0)?), ServiceOptions::singleton().depends_on(["browser"]))
            .register("steps", |deps| Ok(deps.get::<Browser>(0)?), ServiceOptions::transient().depends_on(["browser"]));

        container.resolve_instance("page").unwrap();
        container.resolve_instance("steps").unwrap();
        container.resolve_instance("steps").unwrap();

        container.dispose();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert!(container.is_empty());
        assert!(container.resolve_instance("page").unwrap_err().is_not_found());
    }

    #[test]
    fn dispose_shared_instance_under_two_names_once() {
        let closed = counter();
        let browser = Arc::new(Browser { closed: closed.clone(), fail: false });
        let hook = dispose_hook::<Browser>();

        let container = Container::new();
        for name in ["chrome", "default"] {
            container.register_descriptor(
                ServiceDescriptor::new(name, Factory::Instance(browser.clone()), ServiceOptions::singleton())
                    .with_disposer(hook.clone()),
            );
        }

        container.dispose();
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn failing_dispose_does_not_stop_others() {
        init_tracing();
        let closed = counter();
        let container = Container::new();
        for (name, fail) in [("a", true), ("b", false), ("c", true)] {
            container.register_disposable_value(name, Browser { closed: closed.clone(), fail });
        }

        container.dispose();
        assert_eq!(closed.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn dispose_skips_unbuilt_singletons() {
        let built = counter();
        let container = Container::new();
        container.register_disposable(
            "lazy",
            {
                let built = built.clone();
                move |_| {
                    built.fetch_add(1, Ordering::SeqCst);
                    Ok(Browser { closed: counter(), fail: false })
                }
            },
            ServiceOptions::singleton(),
        );

        container.dispose();
        assert_eq!(built.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn clear_has_no_disposal_side_effects() {
        let closed = counter();
        let container = Container::new();
        container.register_disposable_value("browser", Browser { closed: closed.clone(), fail: false });

        container.clear();
        assert_eq!(closed.load(Ordering::SeqCst), 0);
        assert!(container.resolve_instance("browser").unwrap_err().is_not_found());

        container.register_value("browser", 1u8);
        assert!(container.resolve_instance("browser").is_ok());
    }

    #[test]
    fn concurrent_first_resolution_builds_once() {
        let calls = counter();
        let container = Container::new();
        container.register(
            "pool",
            {
                let calls = calls.clone();
                move |_| {
                    std::thread::sleep(Duration::from_millis(20));
                    Ok(calls.fetch_add(1, Ordering::SeqCst))
                }
            },
            ServiceOptions::singleton(),
        );

        let instances: Vec<Instance> = std::thread::scope(|s| {
            let handles: Vec<_> = (0..8).map(|_| s.spawn(|| container.resolve_instance("pool").unwrap())).collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|w| Arc::ptr_eq(&w[0], &w[1])));
    }

    #[test]
    fn concurrent_resolutions_do_not_share_cycle_state() {
        let container = Container::new();
        container
            .register(
                "slow",
                |_| {
                    std::thread::sleep(Duration::from_millis(10));
                    Ok(())
                },
                ServiceOptions::transient(),
            )
            .register("user", |_| Ok(()), ServiceOptions::transient().depends_on(["slow"]));

        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4).map(|_| s.spawn(|| container.resolve_instance("user"))).collect();
            for handle in handles {
                assert!(handle.join().unwrap().is_ok());
            }
        });
    }

    #[test]
    fn factory_may_use_container_reentrantly() {
        let container = Arc::new(Container::new());
        container.register_value("base", 40u32);

        let inner = Arc::downgrade(&container);
        container.register(
            "answer",
            move |_| {
                let container = inner.upgrade().ok_or("container dropped")?;
                Ok(*container.resolve::<u32>("base")? + 2)
            },
            ServiceOptions::transient(),
        );

        assert_eq!(*container.resolve::<u32>("answer").unwrap(), 42);
    }

    #[test]
    fn singleton_factory_resolving_itself_is_circular() {
        init_tracing();
        let container = Arc::new(Container::new());
        let inner = Arc::downgrade(&container);
        container.register(
            "a",
            move |_| {
                let container = inner.upgrade().ok_or("container dropped")?;
                Ok(*container.resolve::<u32>("a")? + 1)
            },
            ServiceOptions::singleton(),
        );

        let (tx, rx) = std::sync::mpsc::channel();
        let worker = container.clone();
        std::thread::spawn(move || {
            let _ = tx.send(worker.resolve::<u32>("a").map(|v| *v));
        });

        let err = rx
            .recv_timeout(Duration::from_secs(3))
            .expect("resolve('a') blocked on its own singleton cell")
            .unwrap_err();
        match err {
            ContainerError::CircularDependency(err) => {
                let names: Vec<&str> = err.chain.iter().map(|k| k.as_str()).collect();
                assert_eq!(names, ["a", "a"]);
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }

        // Nothing was cached and the thread's path was unwound.
        container.register_value("a", 7u32);
        assert_eq!(*container.resolve::<u32>("a").unwrap(), 7);
    }

    #[test]
    fn transient_factory_resolving_itself_is_circular() {
        let container = Arc::new(Container::new());
        let inner = Arc::downgrade(&container);
        container.register(
            "loop",
            move |_| {
                let container = inner.upgrade().ok_or("container dropped")?;
                container.resolve_instance("loop")?;
                Ok(())
            },
            ServiceOptions::transient(),
        );

        assert!(container.resolve_instance("loop").unwrap_err().is_circular());
    }

    #[test]
    fn nested_factory_resolution_sees_outer_path() {
        let container = Arc::new(Container::new());
        let inner = Arc::downgrade(&container);
        container
            .register("outer", |_| Ok(()), ServiceOptions::singleton().depends_on(["middle"]))
            .register(
                "middle",
                move |_| {
                    let container = inner.upgrade().ok_or("container dropped")?;
                    container.resolve_instance("outer")?;
                    Ok(())
                },
                ServiceOptions::singleton(),
            );

        match container.resolve_instance("outer").unwrap_err() {
            ContainerError::CircularDependency(err) => {
                let names: Vec<&str> = err.chain.iter().map(|k| k.as_str()).collect();
                assert_eq!(names, ["outer", "middle", "outer"]);
            }
            other => panic!("Expected CircularDependency, got: {other:?}"),
        }
    }

    #[test]
    fn nested_container_error_is_not_rewrapped() {
        let container = Arc::new(Container::new());
        let inner = Arc::downgrade(&container);
        container.register(
            "report",
            move |_| {
                let container = inner.upgrade().ok_or("container dropped")?;
                Ok(container.resolve::<String>("missing")?)
            },
            ServiceOptions::transient(),
        );

        match container.resolve_instance("report").unwrap_err() {
            ContainerError::ServiceNotFound(err) => assert_eq!(err.requested, "missing"),
            other => panic!("Expected ServiceNotFound, got: {other:?}"),
        }
    }

    #[test]
    fn same_name_in_another_container_is_not_a_cycle() {
        let parent = Arc::new(Container::new());
        parent.register_value("config", String::from("prod"));

        let child = parent.create_child();
        let outer = parent.clone();
        child.register(
            "config",
            move |_| Ok(format!("{}-override", outer.resolve::<String>("config")?)),
            ServiceOptions::singleton(),
        );

        assert_eq!(child.resolve::<String>("config").unwrap().as_str(), "prod-override");
    }

    #[test]
    fn builder_validates_graph() {
        let result = Container::builder()
            .register("repo", |_| Ok(()), ServiceOptions::singleton().depends_on(["db"]))
            .build();
        assert!(result.unwrap_err().is_not_found());

        let lenient = Container::builder()
            .validate_on_build(false)
            .register("repo", |_| Ok(()), ServiceOptions::singleton().depends_on(["db"]))
            .build();
        assert!(lenient.is_ok());
    }

    #[test]
    fn builder_rejects_cycles() {
        let result = Container::builder()
            .register("a", |_| Ok(()), ServiceOptions::singleton().depends_on(["b"]))
            .register("b", |_| Ok(()), ServiceOptions::singleton().depends_on(["a"]))
            .build();
        assert!(result.unwrap_err().is_circular());
    }

    #[test]
    fn debug_display() {
        let container = layered_container();
        container.resolve_instance("repo").unwrap();

        let debug = format!("{container:?}");
        assert!(debug.contains("Container"));
        assert!(debug.contains("services: 3"));
        assert!(debug.contains("constructed: 2"));
    }
}
