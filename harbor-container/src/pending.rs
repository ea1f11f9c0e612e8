//! Services whose construction completes asynchronously.
//!
//! The container itself never awaits. An async factory produces a
//! [`Pending`] handle at resolution time, and that handle is the instance:
//! a singleton caches the handle, so every caller awaits the same
//! construction and observes the same outcome.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tracing::trace;

use crate::container::Container;
use crate::descriptor::{Dependencies, ServiceOptions};
use crate::error::{BoxError, ContainerError, FactoryError, Result};
use crate::key::ServiceKey;

type BoxFuture<T> = Pin<Box<dyn Future<Output = std::result::Result<T, BoxError>> + Send>>;

/// A service under asynchronous construction.
///
/// The wrapped future runs at most once, driven by whichever caller awaits
/// [`Pending::get`] first; the others wait for its outcome. If that first
/// caller is dropped mid-way the construction is abandoned and every later
/// `get` reports it as failed.
pub struct Pending<T> {
    service: ServiceKey,
    future: Mutex<Option<BoxFuture<T>>>,
    outcome: OnceCell<std::result::Result<Arc<T>, FactoryError>>,
}

impl<T: Send + Sync + 'static> Pending<T> {
    pub fn new<F>(service: ServiceKey, future: F) -> Self
    where
        F: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        Self {
            service,
            future: Mutex::new(Some(Box::pin(future))),
            outcome: OnceCell::new(),
        }
    }

    /// Waits for the construction and returns the instance.
    ///
    /// # Errors
    /// [`ContainerError::ConstructionFailed`] carrying the factory's error;
    /// every waiter receives the same shared error value.
    pub async fn get(&self) -> Result<Arc<T>> {
        let outcome = self
            .outcome
            .get_or_init(|| async {
                let future = self.future.lock().take();
                trace!(service = %self.service, "Awaiting pending construction");
                match future {
                    Some(future) => future.await.map(Arc::new).map_err(FactoryError::from),
                    None => Err(FactoryError::from(BoxError::from(
                        "construction was abandoned before it completed",
                    ))),
                }
            })
            .await;

        outcome
            .clone()
            .map_err(|source| ContainerError::ConstructionFailed {
                service: self.service.clone(),
                source,
            })
    }

    /// Returns `true` once the construction has finished, successfully or not.
    pub fn is_ready(&self) -> bool {
        self.outcome.initialized()
    }

    pub fn service(&self) -> &ServiceKey {
        &self.service
    }
}

impl<T> fmt::Debug for Pending<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("service", &self.service)
            .field("ready", &self.outcome.initialized())
            .finish()
    }
}

impl Container {
    /// Registers an asynchronous factory.
    ///
    /// The factory runs synchronously at resolution time, where it picks its
    /// dependencies out of `deps`, and returns the future that finishes the
    /// construction. The registered instance is a [`Pending<T>`].
    ///
    /// ```rust,ignore
    /// container.register_async(
    ///     "session",
    ///     |deps| {
    ///         let client = deps.get::<AuthClient>(0);
    ///         async move { client?.login().await }
    ///     },
    ///     ServiceOptions::singleton().depends_on(["authClient"]),
    /// );
    /// let session: Arc<Session> = container.resolve_async("session").await?;
    /// ```
    pub fn register_async<T, F, Fut>(
        &self,
        name: impl Into<ServiceKey>,
        factory: F,
        options: ServiceOptions,
    ) -> &Self
    where
        T: Send + Sync + 'static,
        F: Fn(&Dependencies<'_>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = std::result::Result<T, BoxError>> + Send + 'static,
    {
        self.register(
            name,
            move |deps: &Dependencies<'_>| Ok(Pending::new(deps.service().clone(), factory(deps))),
            options,
        )
    }

    /// Resolves a service registered with [`register_async`](Self::register_async)
    /// and waits for it.
    pub async fn resolve_async<T: Send + Sync + 'static>(&self, name: &str) -> Result<Arc<T>> {
        let pending = self.resolve::<Pending<T>>(name)?;
        pending.get().await
    }
}
