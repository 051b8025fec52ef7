//! Graceful shutdown coordination via `CancellationToken`.
//!
//! Long-lived tasks (hub loop, reaper, HTTP server) are registered with
//! [`ShutdownCoordinator::track`]; sessions hang off [`ShutdownCoordinator::child_token`]
//! and unwind when the root token is cancelled.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Fallback drain bound when none is configured.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(30);

struct Tracked {
    name: &'static str,
    handle: JoinHandle<()>,
}

/// Owns the process-wide cancellation token and the tasks to drain.
pub struct ShutdownCoordinator {
    token: CancellationToken,
    tasks: Mutex<Vec<Tracked>>,
}

impl ShutdownCoordinator {
    /// Create a coordinator with a fresh token.
    pub fn new() -> Self {
        Self {
            token: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        }
    }

    /// Clone of the root token.
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Token cancelled with the root, or on its own.
    pub fn child_token(&self) -> CancellationToken {
        self.token.child_token()
    }

    /// Register a task to wait for during [`graceful_shutdown`](Self::graceful_shutdown).
    pub fn track(&self, name: &'static str, handle: JoinHandle<()>) {
        self.tasks.lock().push(Tracked { name, handle });
    }

    /// Number of tracked tasks.
    pub fn tracked(&self) -> usize {
        self.tasks.lock().len()
    }

    /// Cancel the root token.
    pub fn shutdown(&self) {
        self.token.cancel();
    }

    /// Whether shutdown has started.
    pub fn is_shutting_down(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Cancel, then wait up to `timeout` for every tracked task.
    ///
    /// Tasks still running when the timeout fires are aborted. Returns `true`
    /// when everything finished in time.
    pub async fn graceful_shutdown(&self, timeout: Option<Duration>) -> bool {
        let timeout = timeout.unwrap_or(DEFAULT_SHUTDOWN_TIMEOUT);
        let tasks = std::mem::take(&mut *self.tasks.lock());

        self.shutdown();
        info!(
            task_count = tasks.len(),
            timeout_secs = timeout.as_secs(),
            "waiting for tasks to complete"
        );

        let names: Vec<&'static str> = tasks.iter().map(|t| t.name).collect();
        let aborts: Vec<_> = tasks.iter().map(|t| t.handle.abort_handle()).collect();
        let drain = futures::future::join_all(tasks.into_iter().map(|t| t.handle));

        if tokio::time::timeout(timeout, drain).await.is_ok() {
            return true;
        }
        for (name, abort) in names.into_iter().zip(aborts) {
            if !abort.is_finished() {
                warn!(task = name, "task did not stop in time, aborting");
                abort.abort();
            }
        }
        false
    }
}

impl Default for ShutdownCoordinator {
    fn default() -> Self {
        Self::new()
    }
}
