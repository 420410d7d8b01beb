use std::time::Duration;

/// Upper bound on how long a worker may stay unresolved.
pub const DEFAULT_WORKER_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CoordinatorConfig {
    pub worker_timeout: Duration,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            worker_timeout: DEFAULT_WORKER_TIMEOUT,
        }
    }
}

impl CoordinatorConfig {
    pub fn with_worker_timeout(worker_timeout: Duration) -> Self {
        Self { worker_timeout }
    }
}
