use crate::error::SchedulerError;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, timeout_at};
use tokio_util::sync::CancellationToken;

/// Cancellation signal plus optional deadline threaded through every
/// blocking store call.
#[derive(Debug, Clone, Default)]
pub struct ExecContext {
    deadline: Option<Instant>,
    cancel: CancellationToken,
}

impl ExecContext {
    /// No deadline, never cancelled unless [`cancel`](Self::cancel) is called.
    pub fn background() -> Self {
        Self::default()
    }

    /// A timeout too large to represent means no deadline.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            deadline: deadline_after(timeout),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            deadline: Some(deadline),
            cancel: CancellationToken::new(),
        }
    }

    /// Derived context: cancelled with its parent, and bounded by the
    /// earlier of the parent's deadline and `timeout`.
    pub fn child(&self, timeout: Option<Duration>) -> Self {
        let deadline = match (self.deadline, timeout) {
            (Some(d), Some(t)) => Some(deadline_after(t).map_or(d, |t| d.min(t))),
            (None, Some(t)) => deadline_after(t),
            (d, None) => d,
        };
        Self {
            deadline,
            cancel: self.cancel.child_token(),
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Drive `fut` until it completes, the deadline passes, or the context
    /// is cancelled, whichever happens first.
    pub async fn run<F, T, E>(&self, fut: F) -> Result<T, SchedulerError>
    where
        F: Future<Output = Result<T, E>>,
        SchedulerError: From<E>,
    {
        if self.cancel.is_cancelled() {
            return Err(SchedulerError::Cancelled);
        }
        // timeout_at still polls the inner future once, so check up front
        if self.deadline.is_some_and(|d| d <= Instant::now()) {
            return Err(SchedulerError::DeadlineExceeded);
        }
        let bounded = async {
            match self.deadline {
                Some(deadline) => match timeout_at(deadline, fut).await {
                    Ok(res) => res.map_err(SchedulerError::from),
                    Err(_) => Err(SchedulerError::DeadlineExceeded),
                },
                None => fut.await.map_err(SchedulerError::from),
            }
        };
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(SchedulerError::Cancelled),
            res = bounded => res,
        }
    }
}

fn deadline_after(timeout: Duration) -> Option<Instant> {
    Instant::now().checked_add(timeout)
}
