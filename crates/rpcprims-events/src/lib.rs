//! Event dispatch bus for rpcprims hosts.
//!
//! A host (server or channel) declares a static table of invocation points
//! with [`dispatch_table!`]. Each point starts as a passthrough that returns
//! its payload untouched. Registering the first listener with [`listen`]
//! turns it into an ordered chain for the rest of the host's life.
//!
//! Listeners receive the [`Event`] by value and hand it back. They may
//! [`replace`](Event::replace) the payload and let the chain continue, or
//! [`intercept`](Event::intercept) it and stop the chain. A listener error is
//! returned to the dispatch caller as is and the remaining listeners are
//! skipped.
//!
//! ```
//! use rpcprims_events::{dispatch_table, listen, BoxError, Event, EventKind};
//!
//! struct Greeting;
//!
//! impl EventKind for Greeting {
//!     const NAME: &'static str = "greeting";
//!     type Payload = String;
//!     type Context = ();
//! }
//!
//! dispatch_table! {
//!     pub struct GreeterEvents {
//!         greeting: Greeting,
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let mut events = GreeterEvents::new();
//! assert_eq!(events.greeting("hi".into(), ()).await?, "hi");
//!
//! listen(&mut events, |mut event: Event<Greeting>| async move {
//!     let loud = event.payload().to_uppercase();
//!     event.replace(loud);
//!     Ok::<_, BoxError>(event)
//! });
//! assert_eq!(events.greeting("hi".into(), ()).await?, "HI");
//! # Ok::<(), BoxError>(())
//! # }).unwrap();
//! ```

pub mod event;
pub mod slot;
pub mod target;

pub use event::{Event, EventKind};
pub use slot::{InvocationSlot, Listener};
pub use target::{listen, Dispatches};

/// Error type returned by listeners, passed through dispatch unmodified.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;
