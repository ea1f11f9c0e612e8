//! Provider trait — a module of related service registrations.
//!
//! Bootstrap code usually wires services in layers: logging first, then
//! clients that depend on it, then façades on top. Providers let each
//! layer keep its registrations together.
//!
//! # Examples
//! ```rust
//! use harbor_container::prelude::*;
//!
//! struct LoggingProvider;
//!
//! impl Provider for LoggingProvider {
//!     fn register(&self, container: &Container) {
//!         container.register_value("logLevel", String::from("debug"));
//!     }
//! }
//!
//! let container = Container::new();
//! container.add_provider(&LoggingProvider);
//! assert!(container.is_registered("logLevel"));
//! ```

use crate::container::Container;

/// A module that registers related services into a container.
pub trait Provider: Send + Sync {
    /// Registers this provider's services.
    ///
    /// Called once per [`Container::add_provider`] call.
    fn register(&self, container: &Container);

    /// Human-readable name, used in logs.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}
