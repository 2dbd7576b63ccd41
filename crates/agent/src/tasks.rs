//! Registry of running completion tasks.
//!
//! Each task owns a [`CancellationToken`]; cancelling only signals it, the
//! task itself decides where to stop and what to persist.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use uuid::Uuid;

struct TaskEntry {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

#[derive(Clone, Default)]
pub struct TaskRegistry {
    tasks: Arc<Mutex<HashMap<String, TaskEntry>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Spawn the future built by `make` and return its task id.
    ///
    /// The entry is registered before the task starts and removed by the
    /// task itself when it finishes.
    pub fn spawn<F, Fut>(&self, make: F) -> String
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let id = Uuid::new_v4().to_string();
        let token = CancellationToken::new();
        let future = make(token.clone());

        self.lock().insert(
            id.clone(),
            TaskEntry {
                token,
                handle: None,
            },
        );

        let registry = self.clone();
        let task_id = id.clone();
        let handle = tokio::spawn(async move {
            future.await;
            registry.lock().remove(&task_id);
            debug!(task_id = %task_id, "Task finished");
        });

        if let Some(entry) = self.lock().get_mut(&id) {
            entry.handle = Some(handle);
        }
        id
    }

    /// Signal cancellation. Returns `false` for an unknown or finished task.
    pub fn cancel(&self, id: &str) -> bool {
        match self.lock().get(id) {
            Some(entry) => {
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Wait for a task to finish. Returns `false` when there was nothing to
    /// wait for.
    pub async fn join(&self, id: &str) -> bool {
        let handle = self.lock().get_mut(id).and_then(|entry| entry.handle.take());
        match handle {
            Some(handle) => {
                if let Err(e) = handle.await {
                    debug!(task_id = %id, error = %e, "Task ended abnormally");
                }
                true
            }
            None => false,
        }
    }

    /// Ids of running tasks, sorted.
    pub fn list(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.lock().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
