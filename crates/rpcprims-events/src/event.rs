use std::fmt;
use std::ops::Deref;

/// Type-level description of one event kind.
///
/// The payload is what listeners may observe and replace. The context holds
/// fields fixed when the event is created (a method name, a deadline, a peer
/// address) and is read-only afterwards.
pub trait EventKind: Send + Sync + 'static {
    /// Stable name used in logs and in a target's event list.
    const NAME: &'static str;
    type Payload: Send + 'static;
    type Context: Send + Sync + 'static;
}

/// One in-flight dispatch of an event of kind `K`.
///
/// Derefs to the immutable context, so context fields read as
/// `event.method_name`.
pub struct Event<K: EventKind> {
    payload: K::Payload,
    context: K::Context,
    intercepted: bool,
}

impl<K: EventKind> Event<K> {
    pub fn new(payload: K::Payload, context: K::Context) -> Self {
        Self {
            payload,
            context,
            intercepted: false,
        }
    }

    pub fn payload(&self) -> &K::Payload {
        &self.payload
    }

    pub fn payload_mut(&mut self) -> &mut K::Payload {
        &mut self.payload
    }

    pub fn context(&self) -> &K::Context {
        &self.context
    }

    /// Whether a listener stopped the chain.
    pub fn is_intercepted(&self) -> bool {
        self.intercepted
    }

    /// Set the final payload and stop the chain after this listener.
    pub fn intercept(&mut self, value: K::Payload) {
        self.payload = value;
        self.intercepted = true;
    }

    /// Replace the payload; later listeners still run and see `value`.
    pub fn replace(&mut self, value: K::Payload) {
        self.payload = value;
    }

    pub fn into_payload(self) -> K::Payload {
        self.payload
    }
}

impl<K: EventKind> Deref for Event<K> {
    type Target = K::Context;

    fn deref(&self) -> &K::Context {
        &self.context
    }
}

impl<K> fmt::Debug for Event<K>
where
    K: EventKind,
    K::Payload: fmt::Debug,
    K::Context: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("kind", &K::NAME)
            .field("payload", &self.payload)
            .field("context", &self.context)
            .field("intercepted", &self.intercepted)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Counted;

    #[derive(Debug)]
    struct CountedContext {
        extra: u32,
    }

    impl EventKind for Counted {
        const NAME: &'static str = "counted";
        type Payload = u32;
        type Context = CountedContext;
    }

    #[test]
    fn replace_keeps_chain_open() {
        let mut event = Event::<Counted>::new(1, CountedContext { extra: 42 });
        event.replace(2);
        assert_eq!(*event.payload(), 2);
        assert!(!event.is_intercepted());
    }

    #[test]
    fn intercept_sets_final_payload() {
        let mut event = Event::<Counted>::new(1, CountedContext { extra: 42 });
        event.intercept(9);
        assert!(event.is_intercepted());
        assert_eq!(event.into_payload(), 9);
    }

    #[test]
    fn context_fields_read_through_the_event() {
        let mut event = Event::<Counted>::new(1, CountedContext { extra: 42 });
        *event.payload_mut() += 1;
        assert_eq!(event.extra, 42);
        assert_eq!(event.context().extra, 42);
        assert_eq!(*event.payload(), 2);
    }
}
