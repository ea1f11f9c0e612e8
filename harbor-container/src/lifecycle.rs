//! Service lifecycles.
//!
//! A lifecycle decides how long a resolved instance lives:
//! - [`Lifecycle::Singleton`] — one instance per container
//! - [`Lifecycle::Transient`] — a new instance on every resolution
//! - [`Lifecycle::Scoped`] — reserved; currently cached exactly like a singleton

use std::fmt;

use serde::Serialize;

/// Defines the lifetime of a service within the container.
///
/// # Examples
/// ```
/// use harbor_container::lifecycle::Lifecycle;
///
/// assert_eq!(Lifecycle::default(), Lifecycle::Singleton);
/// assert!(Lifecycle::Scoped.is_cached());
/// assert!(!Lifecycle::Transient.is_cached());
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Lifecycle {
    /// Constructed at most once per container and shared by every resolver.
    ///
    /// Lives until the container is disposed, cleared, or the service is
    /// unregistered or re-registered.
    #[default]
    Singleton,

    /// Constructed anew on every resolution, including every dependency path
    /// inside a single top-level resolve.
    Transient,

    /// Reserved for per-scope caching.
    ///
    /// Child containers already take a snapshot of their parent, so there is
    /// no narrower scope to tie an instance to yet; until there is, this
    /// behaves as [`Lifecycle::Singleton`] within the resolving container.
    Scoped,
}

impl Lifecycle {
    /// Returns `true` if resolved instances are kept in the singleton cache.
    #[inline]
    pub fn is_cached(&self) -> bool {
        matches!(self, Lifecycle::Singleton | Lifecycle::Scoped)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Lifecycle::Singleton => write!(f, "Singleton"),
            Lifecycle::Transient => write!(f, "Transient"),
            Lifecycle::Scoped => write!(f, "Scoped"),
        }
    }
}
