//! Server and channel hosts for rpcprims calls.
//!
//! A [`Server`] accepts connections and runs one call per connection:
//! read the [`RequestHead`], dispatch the [`ServerEvents`] invocation points,
//! then run the [`Handler`] inside the call's deadline scope. A [`Channel`]
//! is the client counterpart.
//!
//! [`graceful_exit`] owns the lifetime of one or more servers: it waits for a
//! termination signal or for any server to stop, then closes and drains all of
//! them. Its signal listeners are removed when it returns, so a later signal
//! gets its usual behaviour.

pub mod call;
pub mod channel;
pub mod error;
pub mod events;
pub mod handler;
pub mod head;
pub mod server;

#[cfg(unix)]
pub mod shutdown;
#[cfg(unix)]
mod signals;

pub use call::Call;
pub use channel::Channel;
pub use error::{Result, ServerError};
pub use events::{
    CallHandler, CallHandlerContext, ChannelEvents, RecvRequest, RecvRequestContext, SendRequest,
    SendRequestContext, ServerEvents,
};
pub use handler::Handler;
pub use head::RequestHead;
pub use server::{Server, ServerConfig};

#[cfg(unix)]
pub use shutdown::{
    default_signals, graceful_exit, graceful_exit_with_signals, ManagedServer, ShutdownTrigger,
};
