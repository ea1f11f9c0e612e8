//! Error types for Harbor container operations.
//!
//! Every error names the service involved and, where it helps, the
//! path that led there or the names you probably meant.

use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;

use harbor_support::rendering::{render_chain, shorten_type_name};

use crate::key::ServiceKey;

/// Error type returned by user-supplied factories and disposal hooks.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// A factory error as kept by the container.
///
/// Shared so that every waiter on the same pending singleton observes the
/// very same error value.
pub type FactoryError = Arc<dyn StdError + Send + Sync>;

/// Main error type for all container operations.
#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    /// Requested service was never registered (or has been removed).
    #[error("{}", .0)]
    ServiceNotFound(ServiceNotFoundError),

    /// A service reappeared on its own resolution path.
    #[error("{}", .0)]
    CircularDependency(CircularDependencyError),

    /// A user-supplied factory returned an error.
    ///
    /// The factory's error is kept as-is; see
    /// [`ContainerError::factory_cause`].
    #[error("Failed to construct {service}: {source}")]
    ConstructionFailed {
        service: ServiceKey,
        #[source]
        source: FactoryError,
    },

    /// A typed resolve asked for a type the instance does not have.
    #[error(
        "Type mismatch for {service}: expected {}",
        shorten_type_name(.expected)
    )]
    TypeMismatch {
        service: ServiceKey,
        expected: &'static str,
    },

    /// A factory asked for a dependency it never declared.
    #[error(
        "{service} asked for undeclared dependency {dependency}\n  Hint: list it in ServiceOptions::depends_on"
    )]
    UndeclaredDependency {
        service: ServiceKey,
        /// Either a position (`#2`) or a service name.
        dependency: String,
    },
}

impl ContainerError {
    pub(crate) fn not_found(
        requested: ServiceKey,
        required_by: Option<ServiceKey>,
        suggestions: Vec<String>,
    ) -> Self {
        ContainerError::ServiceNotFound(ServiceNotFoundError {
            requested,
            required_by,
            suggestions,
        })
    }

    pub(crate) fn construction(service: ServiceKey, source: BoxError) -> Self {
        ContainerError::ConstructionFailed {
            service,
            source: Arc::from(source),
        }
    }

    /// Returns the unaltered error produced by a failing factory.
    ///
    /// A [`ContainerError`] returned by a factory (typically from a nested
    /// `resolve`) is not wrapped in `ConstructionFailed`; it reaches the
    /// caller as is.
    ///
    /// ```
    /// use harbor_container::prelude::*;
    ///
    /// #[derive(Debug)]
    /// struct Boom;
    /// impl std::fmt::Display for Boom {
    ///     fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    ///         f.write_str("boom")
    ///     }
    /// }
    /// impl std::error::Error for Boom {}
    ///
    /// let container = Container::new();
    /// container.register("x", |_: &Dependencies<'_>| -> std::result::Result<u8, BoxError> {
    ///     Err(Box::new(Boom))
    /// }, ServiceOptions::default());
    ///
    /// let err = container.resolve::<u8>("x").unwrap_err();
    /// assert!(err.factory_cause().unwrap().downcast_ref::<Boom>().is_some());
    /// ```
    pub fn factory_cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        match self {
            ContainerError::ConstructionFailed { source, .. } => Some(&**source),
            _ => None,
        }
    }

    /// Returns `true` for [`ContainerError::ServiceNotFound`].
    pub fn is_not_found(&self) -> bool {
        matches!(self, ContainerError::ServiceNotFound(_))
    }

    /// Returns `true` for [`ContainerError::CircularDependency`].
    pub fn is_circular(&self) -> bool {
        matches!(self, ContainerError::CircularDependency(_))
    }
}

/// Error when a service was not registered.
#[derive(Debug, Clone)]
pub struct ServiceNotFoundError {
    /// The service that was requested
    pub requested: ServiceKey,
    /// The service that declared it as a dependency, if any
    pub required_by: Option<ServiceKey>,
    /// Registered names that look alike
    pub suggestions: Vec<String>,
}

impl fmt::Display for ServiceNotFoundError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Service not registered: {}", self.requested)?;

        if let Some(ref parent) = self.required_by {
            write!(f, "\n  Required by: {parent}")?;
        }

        if !self.suggestions.is_empty() {
            write!(f, "\n  Did you mean one of:")?;
            for suggestion in &self.suggestions {
                write!(f, "\n    - {suggestion}")?;
            }
        }

        write!(
            f,
            "\n  Hint: Did you forget to call .register(\"{}\", ..)?",
            self.requested
        )
    }
}

/// Error when a circular dependency is detected.
///
/// Carries the full resolution path so you can see WHERE the cycle closes.
#[derive(Debug, Clone)]
pub struct CircularDependencyError {
    /// The path that forms the cycle, first and last entries equal.
    /// Example: `["a", "b", "c", "a"]`
    pub chain: Vec<ServiceKey>,
}

impl CircularDependencyError {
    /// The service whose second appearance closed the cycle.
    pub fn service(&self) -> Option<&ServiceKey> {
        self.chain.last()
    }
}

impl fmt::Display for CircularDependencyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Circular dependency detected:\n  {}", render_chain(&self.chain))?;
        write!(
            f,
            "\n  Hint: Break the cycle by moving shared state into a separate service"
        )
    }
}

/// Convenient Result type for container operations.
pub type Result<T> = std::result::Result<T, ContainerError>;
