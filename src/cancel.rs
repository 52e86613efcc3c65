use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::{Duration, Instant},
};

/// Shared cancellation flag with an optional overall deadline.
///
/// Clones observe the same flag. Long running VCS invocations poll it and
/// kill their subprocess once it trips.
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    cancelled: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

impl Cancellation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::new().expiring_after(timeout)
    }

    /// Keeps the shared flag and trips on its own `timeout` from now.
    pub fn expiring_after(self, timeout: Duration) -> Self {
        Cancellation {
            deadline: Instant::now().checked_add(timeout),
            ..self
        }
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }
}
