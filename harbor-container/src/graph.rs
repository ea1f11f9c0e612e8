//! Dependency graph validation.
//!
//! Resolution already detects cycles and missing services lazily, on the
//! path it walks. Validation walks *every* registration up front, without
//! constructing anything:
//! - Every declared dependency is registered
//! - No service reaches itself through its dependencies
//!
//! Used by [`ContainerBuilder::build()`](crate::container::ContainerBuilder::build)
//! and [`Container::validate()`](crate::container::Container::validate).

use std::collections::{HashMap, HashSet};

use harbor_support::rendering::suggest_similar;
use tracing::{debug, instrument, warn};

use crate::error::{CircularDependencyError, ContainerError};
use crate::key::ServiceKey;

/// Validates a name → declared-dependencies graph.
///
/// # Algorithm
/// Depth-first search from every node, keeping the current path to detect
/// and report cycles. Nodes already proven sound are skipped.
pub(crate) struct GraphValidator {
    edges: HashMap<ServiceKey, Vec<ServiceKey>>,
    validated: HashSet<ServiceKey>,
    path: Vec<ServiceKey>,
}

impl GraphValidator {
    pub fn new(edges: HashMap<ServiceKey, Vec<ServiceKey>>) -> Self {
        Self {
            edges,
            validated: HashSet::new(),
            path: Vec::new(),
        }
    }

    /// Validates the whole graph.
    ///
    /// Nodes are visited in name order so the reported error is stable.
    ///
    /// # Errors
    /// - [`ContainerError::CircularDependency`] — cycle detected
    /// - [`ContainerError::ServiceNotFound`] — a dependency is not registered
    #[instrument(skip(self), name = "graph_validation", fields(services = self.edges.len()))]
    pub fn validate(&mut self) -> Result<(), ContainerError> {
        let mut keys: Vec<ServiceKey> = self.edges.keys().cloned().collect();
        keys.sort();

        for key in keys {
            self.visit(&key)?;
        }

        debug!("Dependency graph validation passed");
        Ok(())
    }

    fn visit(&mut self, key: &ServiceKey) -> Result<(), ContainerError> {
        if self.validated.contains(key) {
            return Ok(());
        }

        if let Some(start) = self.path.iter().position(|k| k == key) {
            let mut chain = self.path[start..].to_vec();
            chain.push(key.clone());

            warn!(cycle = ?chain, "Circular dependency detected");
            return Err(ContainerError::CircularDependency(CircularDependencyError { chain }));
        }

        let Some(dependencies) = self.edges.get(key).cloned() else {
            let suggestions =
                suggest_similar(key.as_str(), self.edges.keys().map(ServiceKey::as_str), 3);
            return Err(ContainerError::not_found(
                key.clone(),
                self.path.last().cloned(),
                suggestions,
            ));
        };

        self.path.push(key.clone());
        for dependency in &dependencies {
            self.visit(dependency)?;
        }
        self.path.pop();

        self.validated.insert(key.clone());
        Ok(())
    }
}
