//! Per-call resolution state.
//!
//! Every top-level resolve creates its own [`ResolutionContext`] and threads
//! it through the recursive calls, so two resolutions never share cycle
//! state, whether they run one after another or on different threads.
//!
//! A factory may call back into its container. That nested call starts from
//! the path its thread is already walking for the same container, kept in a
//! thread-local stack, so a factory resolving its own name is reported as a
//! cycle instead of waiting on its own singleton cell.

use std::cell::RefCell;

use tracing::warn;

use crate::error::{CircularDependencyError, ContainerError, Result};
use crate::key::ServiceKey;

thread_local! {
    /// Services under construction on this thread, tagged with their container.
    static IN_FLIGHT: RefCell<Vec<(usize, ServiceKey)>> = const { RefCell::new(Vec::new()) };
}

/// The path of services currently being constructed.
#[derive(Debug)]
pub(crate) struct ResolutionContext {
    owner: usize,
    path: Vec<ServiceKey>,
    pushed: usize,
}

impl ResolutionContext {
    /// Starts a context for the container identified by `owner`, picking up
    /// whatever that container is already resolving on this thread.
    pub fn new(owner: usize) -> Self {
        let path = IN_FLIGHT.with_borrow(|stack| {
            stack
                .iter()
                .filter(|(id, _)| *id == owner)
                .map(|(_, key)| key.clone())
                .collect()
        });

        Self {
            owner,
            path,
            pushed: 0,
        }
    }

    /// Pushes `key` onto the path.
    ///
    /// # Errors
    /// [`ContainerError::CircularDependency`] if `key` is already being
    /// resolved further up the path. The path is left untouched.
    pub fn enter(&mut self, key: &ServiceKey) -> Result<()> {
        if let Some(start) = self.path.iter().position(|k| k == key) {
            let mut chain = self.path[start..].to_vec();
            chain.push(key.clone());

            warn!(cycle = ?chain, "Circular dependency detected");
            return Err(ContainerError::CircularDependency(CircularDependencyError { chain }));
        }

        self.path.push(key.clone());
        IN_FLIGHT.with_borrow_mut(|stack| stack.push((self.owner, key.clone())));
        self.pushed += 1;
        Ok(())
    }

    /// Pops the innermost service.
    pub fn leave(&mut self) {
        if self.pushed > 0 {
            self.path.pop();
            IN_FLIGHT.with_borrow_mut(|stack| stack.pop());
            self.pushed -= 1;
        }
    }

    /// The service whose dependencies are being resolved right now.
    pub fn current(&self) -> Option<&ServiceKey> {
        self.path.last()
    }

    pub fn depth(&self) -> usize {
        self.path.len()
    }
}

impl Drop for ResolutionContext {
    // A panicking factory skips `leave`; unwind whatever this context pushed.
    fn drop(&mut self) {
        while self.pushed > 0 {
            self.leave();
        }
    }
}
