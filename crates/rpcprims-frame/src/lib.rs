//! Length-prefixed message framing for rpcprims calls.
//!
//! Every message on a call stream is framed with:
//! - A 1-byte compression flag (always `0`; compressed frames are rejected)
//! - A 4-byte big-endian payload length
//! - The payload, produced by an [`Encoder`] and read back by a [`Decoder`]
//!
//! [`recv_message`] and [`send_message`] move one message at a time over a
//! byte stream; [`StreamIterator`] turns repeated receives into a finite
//! sequence.

pub mod codec;
pub mod error;
pub mod iter;
pub mod message;
pub mod wire;

pub use codec::{Codec, CodecError, Decoder, Encoder, JsonCodec};
pub use error::{FrameError, Result};
pub use iter::{into_stream, MessageStream, StreamIterator};
pub use message::{
    recv_message, recv_message_with_config, send_message, send_message_with_config, FrameConfig,
};
pub use wire::{encode_frame, FrameHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};
