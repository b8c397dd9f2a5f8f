//! Engine module loading.
//!
//! [`EngineLoader`] fetches and initializes the engine module at most once.
//! Concurrent callers share the same in-flight load; callers arriving after
//! it resolved get the cached module without suspending. A failed load is
//! handed to every caller that joined it and then forgotten, so the next
//! call starts a fresh attempt.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use futures_util::future::{BoxFuture, FutureExt, Shared};
use tracing::debug;

use crate::engine::EngineModule;
use crate::error::EngineError;

/// Fetches and initializes an engine module.
pub trait ModuleSource: Send + Sync + 'static {
    type Module: EngineModule;

    fn fetch(&self) -> impl Future<Output = Result<Self::Module, EngineError>> + Send;
}

type PendingLoad<M> = Shared<BoxFuture<'static, Result<Arc<M>, EngineError>>>;

enum LoaderState<M> {
    Idle,
    Pending(PendingLoad<M>),
    Loaded(Arc<M>),
}

/// Memoizes a single engine module load.
pub struct EngineLoader<S: ModuleSource> {
    source: Arc<S>,
    state: Mutex<LoaderState<S::Module>>,
}

impl<S: ModuleSource> EngineLoader<S> {
    pub fn new(source: S) -> Self {
        Self {
            source: Arc::new(source),
            state: Mutex::new(LoaderState::Idle),
        }
    }

    /// Returns the loaded module, loading it first if needed.
    pub async fn ensure_loaded(&self) -> Result<Arc<S::Module>, EngineError> {
        let pending = {
            let mut state = self.lock();
            match &*state {
                LoaderState::Loaded(module) => return Ok(Arc::clone(module)),
                LoaderState::Pending(pending) => {
                    debug!("Joining in-flight engine module load");
                    pending.clone()
                }
                LoaderState::Idle => {
                    debug!("Loading engine module");
                    let source = Arc::clone(&self.source);
                    let pending = async move { source.fetch().await.map(Arc::new) }
                        .boxed()
                        .shared();
                    *state = LoaderState::Pending(pending.clone());
                    pending
                }
            }
        };

        let outcome = pending.clone().await;

        let mut state = self.lock();
        // Only the attempt we joined may settle the state; a newer attempt
        // may already have replaced it.
        if let LoaderState::Pending(current) = &*state {
            if current.ptr_eq(&pending) {
                *state = match &outcome {
                    Ok(module) => LoaderState::Loaded(Arc::clone(module)),
                    Err(_) => LoaderState::Idle,
                };
            }
        }
        outcome
    }

    /// Returns the module if a load already completed.
    pub fn get(&self) -> Option<Arc<S::Module>> {
        match &*self.lock() {
            LoaderState::Loaded(module) => Some(Arc::clone(module)),
            _ => None,
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    fn lock(&self) -> MutexGuard<'_, LoaderState<S::Module>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
