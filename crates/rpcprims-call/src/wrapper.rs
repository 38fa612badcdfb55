use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{CancelError, Result};
use crate::owner::Owner;

/// A guarded region that can be interrupted from outside.
///
/// At most one [`Owner`] may be inside the region at a time. [`cancel`]
/// stores an error permanently: the owner currently inside (if any) is woken
/// and fails with it, and every later entry fails with the same error.
///
/// Clones share state, so one clone can be handed to a timer or a shutdown
/// watcher while the call context keeps the other.
///
/// [`cancel`]: Wrapper::cancel
#[derive(Clone, Default)]
pub struct Wrapper {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: Mutex<State>,
    interrupt: CancellationToken,
}

#[derive(Default)]
struct State {
    owner: Option<u64>,
    error: Option<CancelError>,
}

impl Wrapper {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Enter the guarded region as `owner`.
    ///
    /// Fails with the stored error once the wrapper is cancelled, and with
    /// [`CancelError::ConcurrentUse`] while another owner is inside.
    pub fn enter(&self, owner: &Owner) -> Result<Guard<'_>> {
        let mut state = self.lock();
        if let Some(err) = &state.error {
            return Err(err.clone());
        }
        if let Some(current) = state.owner {
            warn!(owner = owner.id(), current, "concurrent entry into guarded region");
            return Err(CancelError::ConcurrentUse { owner: current });
        }
        state.owner = Some(owner.id());
        Ok(Guard {
            wrapper: self,
            owner: owner.id(),
        })
    }

    /// Run `fut` inside the guarded region.
    pub async fn guard<F>(&self, owner: &Owner, fut: F) -> Result<F::Output>
    where
        F: Future,
    {
        self.enter(owner)?.run(fut).await
    }

    /// Cancel with `error`. Only the first error is kept.
    pub fn cancel(&self, error: CancelError) {
        {
            let mut state = self.lock();
            if state.error.is_some() {
                return;
            }
            debug!(%error, armed = state.owner.is_some(), "cancelling guarded region");
            state.error = Some(error);
        }
        self.inner.interrupt.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.lock().error.is_some()
    }

    /// The stored cancellation error, if any.
    pub fn error(&self) -> Option<CancelError> {
        self.lock().error.clone()
    }

    /// Whether an owner is currently inside the region.
    pub fn is_armed(&self) -> bool {
        self.lock().owner.is_some()
    }

    fn release(&self, owner: u64) -> Option<CancelError> {
        let mut state = self.lock();
        if state.owner == Some(owner) {
            state.owner = None;
        }
        state.error.clone()
    }
}

impl std::fmt::Debug for Wrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.lock();
        f.debug_struct("Wrapper")
            .field("owner", &state.owner)
            .field("error", &state.error)
            .finish()
    }
}

/// Proof of being inside a [`Wrapper`]'s guarded region.
///
/// Dropping the guard leaves the region; [`Guard::exit`] leaves it and
/// reports a cancellation that arrived meanwhile.
#[must_use = "the region is left as soon as the guard is dropped"]
pub struct Guard<'a> {
    wrapper: &'a Wrapper,
    owner: u64,
}

impl Guard<'_> {
    /// Drive `fut` to completion unless the wrapper is cancelled first, then
    /// leave the region.
    ///
    /// A cancellation that lands after `fut` completed still fails the run.
    pub async fn run<F>(self, fut: F) -> Result<F::Output>
    where
        F: Future,
    {
        let output = tokio::select! {
            biased;
            () = self.wrapper.inner.interrupt.cancelled() => None,
            output = fut => Some(output),
        };
        self.exit()?;
        output.ok_or_else(|| CancelError::Cancelled("interrupted".to_string()))
    }

    /// Leave the region, failing with the stored error if the wrapper was
    /// cancelled.
    pub fn exit(self) -> Result<()> {
        match self.wrapper.release(self.owner) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

impl Drop for Guard<'_> {
    fn drop(&mut self) {
        self.wrapper.release(self.owner);
    }
}
