use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Error type produced by codecs.
pub type CodecError = Box<dyn std::error::Error + Send + Sync>;

/// Turns messages of type `M` into payload bytes.
///
/// `M` may be unsized or borrow from its caller: encoding only ever needs a
/// reference.
pub trait Encoder<M: ?Sized>: Send + Sync {
    /// Encode `message` into payload bytes.
    fn encode(&self, message: &M) -> Result<Bytes, CodecError>;
}

/// Turns payload bytes back into owned messages of type `M`.
pub trait Decoder<M>: Send + Sync {
    /// Decode payload bytes into a message.
    fn decode(&self, data: Bytes) -> Result<M, CodecError>;
}

/// A codec that works in both directions for `M`.
///
/// The framing layer never looks inside a payload; the codec owns the
/// serialization format.
pub trait Codec<M>: Encoder<M> + Decoder<M> {}

impl<M, C> Codec<M> for C where C: Encoder<M> + Decoder<M> + ?Sized {}

/// JSON codec backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl<M> Encoder<M> for JsonCodec
where
    M: Serialize + ?Sized,
{
    fn encode(&self, message: &M) -> Result<Bytes, CodecError> {
        Ok(Bytes::from(serde_json::to_vec(message)?))
    }
}

impl<M> Decoder<M> for JsonCodec
where
    M: DeserializeOwned,
{
    fn decode(&self, data: Bytes) -> Result<M, CodecError> {
        Ok(serde_json::from_slice(&data)?)
    }
}
