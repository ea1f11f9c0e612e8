//! # Harbor — named-service container for Rust
//!
//! Register services by name, declare what each one needs, and resolve
//! fully wired instances on demand.
//!
//! There is no global registry. Applications build their container at the
//! entry point, usually through [`default_container`], and pass it (or
//! services resolved from it) to whoever needs them.

pub use harbor_container::*;
pub use harbor_support::*;

use tracing::info;

/// Builds a validated container from a list of providers.
///
/// Providers are applied in order, so a later provider can override a
/// registration made by an earlier one (e.g. a local-environment override
/// on top of the defaults).
///
/// ```
/// use harbor::prelude::*;
///
/// struct Defaults;
///
/// impl Provider for Defaults {
///     fn register(&self, container: &Container) {
///         container.register_value("baseUrl", String::from("https://staging.example.com"));
///     }
/// }
///
/// let container = harbor::default_container(&[&Defaults]).unwrap();
/// assert!(container.is_registered("baseUrl"));
/// ```
///
/// # Errors
/// Fails when the combined registrations reference a missing service or
/// contain a cycle.
pub fn default_container(providers: &[&dyn Provider]) -> Result<Container> {
    let builder = providers
        .iter()
        .fold(Container::builder(), |builder, provider| builder.add_provider(*provider));

    let container = builder.build()?;
    info!(providers = providers.len(), services = container.len(), "Default container ready");
    Ok(container)
}
