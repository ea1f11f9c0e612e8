//! Service descriptors and the registry that stores them.
//!
//! A [`ServiceDescriptor`] pairs a name with its factory, lifecycle and
//! declared dependencies. The [`Registry`] owns every descriptor of one
//! container plus the singleton slots that cache constructed instances.

use std::any::{Any, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde::Serialize;
use tracing::debug;

use crate::dispose::DisposeFn;
use crate::error::{BoxError, ContainerError, Result};
use crate::key::ServiceKey;
use crate::lifecycle::Lifecycle;

/// A constructed, type-erased service.
///
/// Identity is the `Arc` pointer: two resolutions of a singleton return
/// clones of the same `Arc`.
pub type Instance = Arc<dyn Any + Send + Sync>;

/// Type-erased constructor.
///
/// Receives the declared dependencies, already resolved, in declaration
/// order.
pub type FactoryFn =
    Arc<dyn Fn(&Dependencies<'_>) -> std::result::Result<Instance, BoxError> + Send + Sync>;

/// How a service produces its instance.
#[derive(Clone)]
pub enum Factory {
    /// Called with the resolved dependencies on every construction.
    Constructor(FactoryFn),
    /// A pre-built instance, handed out as-is.
    Instance(Instance),
}

impl Factory {
    /// Wraps a typed constructor closure.
    pub fn constructor<T, F>(factory: F) -> Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies<'_>) -> std::result::Result<T, BoxError> + Send + Sync + 'static,
    {
        Factory::Constructor(Arc::new(move |deps: &Dependencies<'_>| {
            Ok(Arc::new(factory(deps)?) as Instance)
        }))
    }

    /// Wraps a pre-built value.
    pub fn value<T: Send + Sync + 'static>(value: T) -> Self {
        Factory::Instance(Arc::new(value))
    }

    /// Returns `true` for pre-built instances.
    pub fn is_instance(&self) -> bool {
        matches!(self, Factory::Instance(_))
    }
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Factory::Constructor(_) => f.write_str("Constructor"),
            Factory::Instance(_) => f.write_str("Instance"),
        }
    }
}

/// Registration options: lifecycle and declared dependencies.
///
/// ```
/// use harbor_container::descriptor::ServiceOptions;
/// use harbor_container::lifecycle::Lifecycle;
///
/// let options = ServiceOptions::transient().depends_on(["repo", "logger"]);
/// assert_eq!(options.lifecycle, Lifecycle::Transient);
/// assert_eq!(options.dependencies.len(), 2);
/// ```
#[derive(Debug, Clone, Default)]
pub struct ServiceOptions {
    pub lifecycle: Lifecycle,
    pub dependencies: Vec<ServiceKey>,
}

impl ServiceOptions {
    pub fn singleton() -> Self {
        Self::with_lifecycle(Lifecycle::Singleton)
    }

    pub fn transient() -> Self {
        Self::with_lifecycle(Lifecycle::Transient)
    }

    pub fn scoped() -> Self {
        Self::with_lifecycle(Lifecycle::Scoped)
    }

    pub fn with_lifecycle(lifecycle: Lifecycle) -> Self {
        Self {
            lifecycle,
            dependencies: Vec::new(),
        }
    }

    /// Appends dependency names, keeping their order.
    pub fn depends_on<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<ServiceKey>,
    {
        self.dependencies.extend(names.into_iter().map(Into::into));
        self
    }
}

/// One registered service.
///
/// Never mutated after registration; re-registering the name replaces the
/// whole descriptor.
#[derive(Clone)]
pub struct ServiceDescriptor {
    name: ServiceKey,
    factory: Factory,
    lifecycle: Lifecycle,
    dependencies: Vec<ServiceKey>,
    disposer: Option<DisposeFn>,
}

impl ServiceDescriptor {
    pub fn new(name: impl Into<ServiceKey>, factory: Factory, options: ServiceOptions) -> Self {
        Self {
            name: name.into(),
            factory,
            lifecycle: options.lifecycle,
            dependencies: options.dependencies,
            disposer: None,
        }
    }

    /// Attaches a disposal hook, run by `Container::dispose` on the cached
    /// instance.
    pub fn with_disposer(mut self, disposer: DisposeFn) -> Self {
        self.disposer = Some(disposer);
        self
    }

    pub fn name(&self) -> &ServiceKey {
        &self.name
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn dependencies(&self) -> &[ServiceKey] {
        &self.dependencies
    }

    pub fn disposer(&self) -> Option<&DisposeFn> {
        self.disposer.as_ref()
    }

    /// Serializable summary of this descriptor.
    pub fn info(&self) -> ServiceInfo {
        ServiceInfo {
            name: self.name.clone(),
            lifecycle: self.lifecycle,
            dependencies: self.dependencies.clone(),
            pre_built: self.factory.is_instance(),
            disposable: self.disposer.is_some(),
        }
    }
}

impl fmt::Debug for ServiceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceDescriptor")
            .field("name", &self.name)
            .field("factory", &self.factory)
            .field("lifecycle", &self.lifecycle)
            .field("dependencies", &self.dependencies)
            .field("disposable", &self.disposer.is_some())
            .finish()
    }
}

/// What tooling sees of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub name: ServiceKey,
    pub lifecycle: Lifecycle,
    pub dependencies: Vec<ServiceKey>,
    pub pre_built: bool,
    pub disposable: bool,
}

/// Resolved dependencies handed to a factory, in declaration order.
pub struct Dependencies<'a> {
    service: &'a ServiceKey,
    names: &'a [ServiceKey],
    instances: &'a [Instance],
}

impl<'a> Dependencies<'a> {
    pub(crate) fn new(
        service: &'a ServiceKey,
        names: &'a [ServiceKey],
        instances: &'a [Instance],
    ) -> Self {
        debug_assert_eq!(names.len(), instances.len());
        Self {
            service,
            names,
            instances,
        }
    }

    /// The service being constructed.
    pub fn service(&self) -> &ServiceKey {
        self.service
    }

    /// The dependency at `index`, downcast to `T`.
    pub fn get<T: Send + Sync + 'static>(&self, index: usize) -> Result<Arc<T>> {
        let (name, instance) = self
            .names
            .get(index)
            .zip(self.instances.get(index))
            .ok_or_else(|| ContainerError::UndeclaredDependency {
                service: self.service.clone(),
                dependency: format!("#{index}"),
            })?;

        downcast(name, instance.clone())
    }

    /// The dependency declared as `name`, downcast to `T`.
    pub fn by_name<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let index = self
            .names
            .iter()
            .position(|n| n == name)
            .ok_or_else(|| ContainerError::UndeclaredDependency {
                service: self.service.clone(),
                dependency: name.to_string(),
            })?;

        self.get(index)
    }

    /// The erased instance at `index`.
    pub fn instance(&self, index: usize) -> Option<&Instance> {
        self.instances.get(index)
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    /// `(name, instance)` pairs in declaration order.
    pub fn iter(&self) -> impl Iterator<Item = (&'a ServiceKey, &'a Instance)> + use<'a> {
        self.names.iter().zip(self.instances.iter())
    }
}

/// Downcasts an erased instance, naming the service on failure.
pub(crate) fn downcast<T: Send + Sync + 'static>(
    service: &ServiceKey,
    instance: Instance,
) -> Result<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            service: service.clone(),
            expected: type_name::<T>(),
        })
}

/// Lazily filled singleton cache entry.
///
/// Concurrent first resolutions block on the same cell, so the factory runs
/// once.
pub(crate) type SingletonSlot = Arc<OnceCell<Instance>>;

/// Stores the descriptors and singleton slots of one container.
#[derive(Default)]
pub(crate) struct Registry {
    services: HashMap<ServiceKey, ServiceDescriptor>,
    singletons: HashMap<ServiceKey, SingletonSlot>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts or replaces a descriptor.
    ///
    /// A replaced service loses its cached instance. Pre-built instances with
    /// a cached lifecycle are placed in the singleton cache right away.
    pub fn insert(&mut self, descriptor: ServiceDescriptor) {
        let name = descriptor.name.clone();
        let replaced = self.services.contains_key(&name);
        self.singletons.remove(&name);

        if descriptor.lifecycle.is_cached() {
            let slot = match &descriptor.factory {
                Factory::Instance(instance) if descriptor.dependencies.is_empty() => {
                    OnceCell::with_value(instance.clone())
                }
                _ => OnceCell::new(),
            };
            self.singletons.insert(name.clone(), Arc::new(slot));
        }

        debug!(
            service = %name,
            lifecycle = %descriptor.lifecycle,
            dependencies = descriptor.dependencies.len(),
            replaced,
            "Registered service"
        );
        self.services.insert(name, descriptor);
    }

    /// Looks up a descriptor and, for cached lifecycles, its slot.
    pub fn lookup(&self, name: &str) -> Option<(ServiceDescriptor, Option<SingletonSlot>)> {
        let descriptor = self.services.get(name)?;
        Some((descriptor.clone(), self.singletons.get(name).cloned()))
    }

    pub fn get(&self, name: &str) -> Option<&ServiceDescriptor> {
        self.services.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.services.contains_key(name)
    }

    /// Removes a descriptor together with its cached instance.
    pub fn remove(&mut self, name: &str) -> bool {
        self.singletons.remove(name);
        self.services.remove(name).is_some()
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<ServiceKey> {
        let mut names: Vec<_> = self.services.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &ServiceDescriptor> {
        self.services.values()
    }

    /// Independent copy: descriptors are shared, slots are new cells holding
    /// whatever the original had already constructed.
    pub fn snapshot(&self) -> Self {
        let singletons = self
            .singletons
            .iter()
            .map(|(name, slot)| {
                let cell = match slot.get() {
                    Some(instance) => OnceCell::with_value(instance.clone()),
                    None => OnceCell::new(),
                };
                (name.clone(), Arc::new(cell))
            })
            .collect();

        Self {
            services: self.services.clone(),
            singletons,
        }
    }

    /// Constructed singletons with their disposal hooks, sorted by name.
    pub fn cached_instances(&self) -> Vec<(ServiceKey, Instance, Option<DisposeFn>)> {
        let mut cached: Vec<_> = self
            .singletons
            .iter()
            .filter_map(|(name, slot)| {
                let instance = slot.get()?.clone();
                let disposer = self.services.get(name).and_then(|d| d.disposer.clone());
                Some((name.clone(), instance, disposer))
            })
            .collect();
        cached.sort_by(|a, b| a.0.cmp(&b.0));
        cached
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("services", &self.services.len())
            .field(
                "constructed",
                &self.singletons.values().filter(|s| s.get().is_some()).count(),
            )
            .finish()
    }
}
