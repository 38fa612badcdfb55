//! Byte-stream transport for rpcprims calls.
//!
//! A call exchanges framed messages over a byte stream split into a
//! [`RecvStream`] that hands back exactly `n` bytes (or fewer at end of
//! stream) and a [`SendStream`] that accepts writes with an optional
//! half-close. [`DataStream`] names a value that is both.
//!
//! This crate provides those collaborators over:
//! - TCP sockets
//! - Unix domain sockets (Linux/macOS)
//! - An in-memory duplex pipe (tests, in-process wiring)
//!
//! This is the lowest layer of rpcprims. Everything else builds on top of
//! [`IoStream`] and [`Connection`].

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;

#[cfg(unix)]
pub mod uds;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::{connect, Listener};
pub use stream::{Connection, DataStream, IoStream, RecvStream, SendStream};

#[cfg(unix)]
pub use uds::UnixDomainSocket;
