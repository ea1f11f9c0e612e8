//! Disposal of cached singletons.
//!
//! A service opts into cleanup by implementing [`Dispose`] and being
//! registered through one of the `register_disposable*` methods. The
//! container then calls [`Dispose::dispose`] once per distinct cached
//! instance when [`Container::dispose`](crate::container::Container::dispose)
//! runs.

use std::sync::Arc;

use crate::descriptor::Instance;
use crate::error::BoxError;

/// Cleanup hook for services holding external resources
/// (browser sessions, sockets, temp directories).
pub trait Dispose: Send + Sync + 'static {
    /// Releases the resources held by this service.
    ///
    /// Errors are logged by the container and never stop other services
    /// from being disposed.
    fn dispose(&self) -> Result<(), BoxError>;
}

/// Type-erased disposal hook stored on a descriptor.
pub type DisposeFn = Arc<dyn Fn(&Instance) -> Result<(), BoxError> + Send + Sync>;

/// Builds the hook that disposes an erased instance of `T`.
///
/// Instances of any other type are left alone.
pub fn dispose_hook<T: Dispose>() -> DisposeFn {
    Arc::new(|instance: &Instance| match (**instance).downcast_ref::<T>() {
        Some(service) => service.dispose(),
        None => Ok(()),
    })
}

/// Identity of an instance, used to dispose shared instances only once.
pub(crate) fn instance_id(instance: &Instance) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}
