//! Tokio runtime spawner implementation.

use std::future::Future;
use std::sync::Arc;

use crate::core::{CoordinationError, CoordinationResult, Spawn};

/// Tokio-based spawner that runs assignment loops on a tokio runtime.
#[derive(Clone)]
pub struct TokioSpawner {
    handle: Arc<tokio::runtime::Handle>,
}

impl TokioSpawner {
    /// Create a spawner from a tokio runtime handle.
    #[must_use]
    pub fn new(handle: tokio::runtime::Handle) -> Self {
        Self {
            handle: Arc::new(handle),
        }
    }

    /// Create a spawner for the runtime the caller is running on.
    ///
    /// # Errors
    ///
    /// Returns `Lifecycle` when called outside a tokio runtime.
    pub fn current() -> CoordinationResult<Self> {
        tokio::runtime::Handle::try_current()
            .map(Self::new)
            .map_err(|e| CoordinationError::Lifecycle(format!("no tokio runtime: {e}")))
    }
}

impl std::fmt::Debug for TokioSpawner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokioSpawner").finish_non_exhaustive()
    }
}

impl Spawn for TokioSpawner {
    fn spawn<F>(&self, fut: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handle.spawn(fut);
    }
}
