use std::ops::Deref;

use tokio::task::JoinHandle;
use tracing::debug;

use crate::deadline::Deadline;
use crate::error::{CancelError, Result};
use crate::wrapper::Wrapper;

/// A [`Wrapper`] that cancels itself with
/// [`CancelError::DeadlineExceeded`] when a deadline passes.
///
/// ```no_run
/// # async fn demo() -> Result<(), rpcprims_call::CancelError> {
/// use std::time::Duration;
/// use rpcprims_call::{Deadline, DeadlineWrapper, Owner};
///
/// let wrapper = DeadlineWrapper::new();
/// let owner = Owner::new();
/// let _scope = wrapper.start(Some(Deadline::from_timeout(Duration::from_secs(1))))?;
/// wrapper.guard(&owner, tokio::time::sleep(Duration::from_millis(10))).await?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, Default)]
pub struct DeadlineWrapper {
    wrapper: Wrapper,
}

impl DeadlineWrapper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm the deadline timer for the lifetime of the returned scope.
    ///
    /// An already expired deadline fails immediately and schedules nothing.
    /// `None` opens a scope without a timer. Must be called from within a
    /// tokio runtime.
    pub fn start(&self, deadline: Option<Deadline>) -> Result<DeadlineScope> {
        let Some(deadline) = deadline else {
            return Ok(DeadlineScope { timer: None });
        };
        if deadline.is_expired() {
            debug!("deadline already passed");
            return Err(CancelError::DeadlineExceeded);
        }

        let wrapper = self.wrapper.clone();
        let timer = tokio::spawn(async move {
            tokio::time::sleep_until(deadline.instant()).await;
            debug!("deadline reached");
            wrapper.cancel(CancelError::DeadlineExceeded);
        });
        Ok(DeadlineScope { timer: Some(timer) })
    }

    /// The underlying cancellation wrapper.
    pub fn wrapper(&self) -> &Wrapper {
        &self.wrapper
    }
}

impl Deref for DeadlineWrapper {
    type Target = Wrapper;

    fn deref(&self) -> &Wrapper {
        &self.wrapper
    }
}

/// Keeps a deadline timer alive. Dropping the scope disarms the timer.
#[derive(Debug)]
pub struct DeadlineScope {
    timer: Option<JoinHandle<()>>,
}

impl DeadlineScope {
    pub fn has_timer(&self) -> bool {
        self.timer.is_some()
    }
}

impl Drop for DeadlineScope {
    fn drop(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }
}
