use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;
use tracing::trace;

use crate::event::{Event, EventKind};
use crate::BoxError;

/// A registered callback for events of kind `K`.
pub type Listener<K> =
    Arc<dyn Fn(Event<K>) -> BoxFuture<'static, Result<Event<K>, BoxError>> + Send + Sync>;

/// The invocation point for one event kind on one target.
///
/// Starts as [`Passthrough`](InvocationSlot::Passthrough) and becomes a
/// [`Chain`](InvocationSlot::Chain) on the first registered listener. A chain
/// never turns back into a passthrough.
pub enum InvocationSlot<K: EventKind> {
    /// No listeners: dispatch returns the payload untouched.
    Passthrough,
    /// Listeners in registration order.
    Chain(Vec<Listener<K>>),
}

impl<K: EventKind> InvocationSlot<K> {
    /// Append a listener, switching to a chain if needed.
    pub fn push(&mut self, listener: Listener<K>) {
        match self {
            InvocationSlot::Passthrough => *self = InvocationSlot::Chain(vec![listener]),
            InvocationSlot::Chain(listeners) => listeners.push(listener),
        }
    }

    pub fn is_passthrough(&self) -> bool {
        matches!(self, InvocationSlot::Passthrough)
    }

    /// Number of registered listeners.
    pub fn len(&self) -> usize {
        match self {
            InvocationSlot::Passthrough => 0,
            InvocationSlot::Chain(listeners) => listeners.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Run the listeners in order and return the final payload.
    ///
    /// Stops after the first listener that intercepts. The first listener
    /// error is returned unchanged and the rest of the chain is skipped.
    pub async fn dispatch(
        &self,
        payload: K::Payload,
        context: K::Context,
    ) -> Result<K::Payload, BoxError> {
        let listeners = match self {
            InvocationSlot::Passthrough => return Ok(payload),
            InvocationSlot::Chain(listeners) => listeners,
        };

        let mut event = Event::new(payload, context);
        for (index, listener) in listeners.iter().enumerate() {
            event = listener(event).await?;
            if event.is_intercepted() {
                trace!(event = K::NAME, index, "event intercepted");
                break;
            }
        }
        Ok(event.into_payload())
    }
}

impl<K: EventKind> Default for InvocationSlot<K> {
    fn default() -> Self {
        InvocationSlot::Passthrough
    }
}

impl<K: EventKind> Clone for InvocationSlot<K> {
    fn clone(&self) -> Self {
        match self {
            InvocationSlot::Passthrough => InvocationSlot::Passthrough,
            InvocationSlot::Chain(listeners) => InvocationSlot::Chain(listeners.clone()),
        }
    }
}

impl<K: EventKind> fmt::Debug for InvocationSlot<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvocationSlot::Passthrough => write!(f, "Passthrough({})", K::NAME),
            InvocationSlot::Chain(listeners) => {
                write!(f, "Chain({}, {} listeners)", K::NAME, listeners.len())
            }
        }
    }
}
