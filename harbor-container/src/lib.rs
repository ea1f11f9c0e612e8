//! Core container implementation for Harbor.

pub mod container;
pub mod descriptor;
pub mod dispose;
pub mod error;
mod graph;
pub mod key;
pub mod lifecycle;
#[cfg(feature = "async")]
pub mod pending;
pub mod provider;
mod resolution;

pub use container::{Container, ContainerBuilder, prelude};
pub use descriptor::{Dependencies, Factory, Instance, ServiceDescriptor, ServiceInfo, ServiceOptions};
pub use dispose::Dispose;
pub use error::{BoxError, ContainerError, Result};
pub use key::ServiceKey;
pub use lifecycle::Lifecycle;
#[cfg(feature = "async")]
pub use pending::Pending;
pub use provider::Provider;
