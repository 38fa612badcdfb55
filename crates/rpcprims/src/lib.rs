//! RPC runtime primitives for tokio.
//!
//! rpcprims is the core of a streaming RPC framework: message framing over a
//! byte stream, deadlines and cancellation that can interrupt a blocked call
//! from outside, an event bus for extending servers and channels, and a
//! coordinator that drains every running server on shutdown.
//!
//! # Crate Structure
//!
//! - [`transport`]: byte-stream collaborator, TCP and Unix domain sockets
//! - [`frame`]: 5-byte-header message framing and stream iteration
//! - [`call`]: deadlines, cancellation wrappers, status codes, metadata
//! - [`events`]: event dispatch bus and the `dispatch_table!` macro
//! - [`server`]: server and channel hosts, graceful shutdown

/// Re-export transport types.
pub mod transport {
    pub use rpcprims_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use rpcprims_frame::*;
}

/// Re-export call types.
pub mod call {
    pub use rpcprims_call::*;
}

/// Re-export event bus types.
pub mod events {
    pub use rpcprims_events::*;
}

/// Re-export server, channel and shutdown types.
pub mod server {
    pub use rpcprims_server::*;
}
