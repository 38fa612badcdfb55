use bytes::BytesMut;
use rpcprims_transport::{RecvStream, SendStream};
use tracing::trace;

use crate::codec::{Decoder, Encoder};
use crate::error::{FrameError, Result};
use crate::wire::{encode_frame, FrameHeader, DEFAULT_MAX_PAYLOAD, HEADER_SIZE};

/// Configuration for message framing.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Maximum payload size in bytes, checked on both send and receive.
    /// Default: 16 MiB.
    pub max_payload_size: usize,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
        }
    }
}

/// Receive the next message from `stream` with the default configuration.
///
/// Returns `Ok(None)` when the stream has ended cleanly at a frame boundary.
pub async fn recv_message<M, S, C>(stream: &mut S, codec: &C) -> Result<Option<M>>
where
    S: RecvStream,
    C: Decoder<M>,
{
    recv_message_with_config(stream, codec, &FrameConfig::default()).await
}

/// Receive the next message from `stream`.
///
/// An empty header read means end of stream and yields `Ok(None)`. A set
/// compression flag fails before any payload is read or decoded. A payload
/// shorter than its announced length is a protocol error.
pub async fn recv_message_with_config<M, S, C>(
    stream: &mut S,
    codec: &C,
    config: &FrameConfig,
) -> Result<Option<M>>
where
    S: RecvStream,
    C: Decoder<M>,
{
    let header = stream.recv_data(HEADER_SIZE).await?;
    if header.is_empty() {
        trace!("end of stream at frame boundary");
        return Ok(None);
    }

    let header = FrameHeader::decode(&header)?;
    if header.compressed {
        return Err(FrameError::CompressionNotImplemented);
    }

    let expected = header.length as usize;
    if expected > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: expected,
            max: config.max_payload_size,
        });
    }

    let payload = stream.recv_data(expected).await?;
    if payload.len() != expected {
        return Err(FrameError::IncompletePayload {
            expected,
            actual: payload.len(),
        });
    }

    trace!(size = expected, "received frame");
    codec.decode(payload).map(Some).map_err(FrameError::Codec)
}

/// Encode `message` and send it as one frame with the default configuration.
pub async fn send_message<M, S, C>(stream: &mut S, codec: &C, message: &M, end: bool) -> Result<()>
where
    M: ?Sized,
    S: SendStream,
    C: Encoder<M>,
{
    send_message_with_config(stream, codec, message, end, &FrameConfig::default()).await
}

/// Encode `message` and send it as one frame, half-closing if `end` is set.
///
/// Header and payload go out in a single write.
pub async fn send_message_with_config<M, S, C>(
    stream: &mut S,
    codec: &C,
    message: &M,
    end: bool,
    config: &FrameConfig,
) -> Result<()>
where
    M: ?Sized,
    S: SendStream,
    C: Encoder<M>,
{
    let payload = codec.encode(message).map_err(FrameError::Codec)?;
    if payload.len() > config.max_payload_size {
        return Err(FrameError::PayloadTooLarge {
            size: payload.len(),
            max: config.max_payload_size,
        });
    }

    let mut buf = BytesMut::with_capacity(HEADER_SIZE + payload.len());
    encode_frame(&payload, &mut buf)?;
    stream.send_data(buf.freeze(), end).await?;
    trace!(size = payload.len(), end, "sent frame");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use bytes::Bytes;
    use rpcprims_transport::{Connection, IoStream};

    use super::*;
    use crate::codec::{CodecError, JsonCodec};

    #[derive(Debug, Clone, PartialEq)]
    struct Ping {
        value: String,
    }

    /// Encodes `Ping` as its raw UTF-8 value.
    #[derive(Default)]
    struct ValueCodec {
        decoded: AtomicUsize,
    }

    impl Encoder<Ping> for ValueCodec {
        fn encode(&self, message: &Ping) -> std::result::Result<Bytes, CodecError> {
            Ok(Bytes::copy_from_slice(message.value.as_bytes()))
        }
    }

    impl Decoder<Ping> for ValueCodec {
        fn decode(&self, data: Bytes) -> std::result::Result<Ping, CodecError> {
            self.decoded.fetch_add(1, Ordering::SeqCst);
            Ok(Ping {
                value: String::from_utf8(data.to_vec())?,
            })
        }
    }

    /// In-memory stream: reads from a fixed buffer, records writes.
    #[derive(Default)]
    struct ScriptedStream {
        incoming: Vec<u8>,
        pos: usize,
        sent: Vec<(Bytes, bool)>,
    }

    impl ScriptedStream {
        fn with_incoming(bytes: &[u8]) -> Self {
            Self {
                incoming: bytes.to_vec(),
                ..Self::default()
            }
        }
    }

    impl RecvStream for ScriptedStream {
        async fn recv_data(&mut self, size: usize) -> io::Result<Bytes> {
            let end = (self.pos + size).min(self.incoming.len());
            let data = Bytes::copy_from_slice(&self.incoming[self.pos..end]);
            self.pos = end;
            Ok(data)
        }
    }

    impl SendStream for ScriptedStream {
        async fn send_data(&mut self, data: Bytes, end_stream: bool) -> io::Result<()> {
            self.sent.push((data, end_stream));
            Ok(())
        }
    }

    fn ping(value: &str) -> Ping {
        Ping {
            value: value.to_string(),
        }
    }

    #[tokio::test]
    async fn ping_is_nine_bytes_on_the_wire() {
        let codec = ValueCodec::default();
        let mut stream = ScriptedStream::default();

        send_message(&mut stream, &codec, &ping("ping"), false)
            .await
            .unwrap();

        assert_eq!(stream.sent.len(), 1, "header and payload go out in one write");
        let (data, end) = &stream.sent[0];
        assert_eq!(data.as_ref(), b"\x00\x00\x00\x00\x04ping");
        assert!(!end);

        let mut reader = ScriptedStream::with_incoming(data);
        let message = recv_message::<Ping, _, _>(&mut reader, &codec).await.unwrap();
        assert_eq!(message, Some(ping("ping")));
    }

    #[tokio::test]
    async fn send_with_end_requests_half_close() {
        let mut stream = ScriptedStream::default();
        send_message(&mut stream, &ValueCodec::default(), &ping("x"), true)
            .await
            .unwrap();
        assert!(stream.sent[0].1);
    }

    #[tokio::test]
    async fn payload_sizes_survive_the_wire() {
        let codec = ValueCodec::default();
        for size in [0usize, 1, 4, 255, 256, 65_536] {
            let original = ping(&"a".repeat(size));
            let mut writer = ScriptedStream::default();
            send_message(&mut writer, &codec, &original, false)
                .await
                .unwrap();

            let mut reader = ScriptedStream::with_incoming(&writer.sent[0].0);
            let decoded = recv_message::<Ping, _, _>(&mut reader, &codec).await.unwrap();
            assert_eq!(decoded, Some(original), "size {size}");
        }
    }

    #[tokio::test]
    async fn empty_read_is_end_of_stream() {
        let codec = ValueCodec::default();
        let mut stream = ScriptedStream::default();
        let message = recv_message::<Ping, _, _>(&mut stream, &codec).await.unwrap();
        assert_eq!(message, None);
        assert_eq!(codec.decoded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn compressed_flag_fails_without_decoding() {
        let codec = ValueCodec::default();
        let mut stream = ScriptedStream::with_incoming(b"\x01\x00\x00\x00\x04ping");

        let err = recv_message::<Ping, _, _>(&mut stream, &codec).await.unwrap_err();
        assert!(matches!(err, FrameError::CompressionNotImplemented));
        assert!(err.is_protocol_violation());
        assert_eq!(codec.decoded.load(Ordering::SeqCst), 0);
        assert_eq!(stream.pos, HEADER_SIZE, "payload must not be read");
    }

    #[tokio::test]
    async fn short_payload_is_protocol_error() {
        let codec = ValueCodec::default();
        let mut stream = ScriptedStream::with_incoming(b"\x00\x00\x00\x00\x08pin");

        let err = recv_message::<Ping, _, _>(&mut stream, &codec).await.unwrap_err();
        assert!(matches!(
            err,
            FrameError::IncompletePayload {
                expected: 8,
                actual: 3
            }
        ));
        assert_eq!(codec.decoded.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn truncated_header_is_protocol_error() {
        let mut stream = ScriptedStream::with_incoming(b"\x00\x00");
        let err = recv_message::<Ping, _, _>(&mut stream, &ValueCodec::default())
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::IncompleteHeader { actual: 2 }));
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_reading_payload() {
        let config = FrameConfig {
            max_payload_size: 3,
        };
        let mut stream = ScriptedStream::with_incoming(b"\x00\x00\x00\x00\x04ping");
        let err = recv_message_with_config::<Ping, _, _>(&mut stream, &ValueCodec::default(), &config)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { size: 4, max: 3 }));
        assert_eq!(stream.pos, HEADER_SIZE);

        let mut writer = ScriptedStream::default();
        let err = send_message_with_config(
            &mut writer,
            &ValueCodec::default(),
            &ping("ping"),
            false,
            &config,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, FrameError::PayloadTooLarge { .. }));
        assert!(writer.sent.is_empty());
    }

    #[tokio::test]
    async fn codec_failure_is_reported() {
        let mut stream = ScriptedStream::with_incoming(b"\x00\x00\x00\x00\x02{x");
        let err = recv_message::<serde_json::Value, _, _>(&mut stream, &JsonCodec)
            .await
            .unwrap_err();
        assert!(matches!(err, FrameError::Codec(_)));
        assert!(!err.is_protocol_violation());
    }

    #[tokio::test]
    async fn borrowed_messages_are_sent_without_an_owned_copy() {
        let mut writer = ScriptedStream::default();
        send_message(&mut writer, &JsonCodec, "hello", false)
            .await
            .unwrap();
        assert_eq!(writer.sent[0].0.as_ref(), b"\x00\x00\x00\x00\x07\"hello\"");

        let mut reader = ScriptedStream::with_incoming(&writer.sent[0].0);
        let decoded = recv_message::<String, _, _>(&mut reader, &JsonCodec)
            .await
            .unwrap();
        assert_eq!(decoded.as_deref(), Some("hello"));
    }

    #[tokio::test]
    async fn messages_cross_a_real_byte_stream() {
        let (left, right) = Connection::memory_pair(16);
        let mut client = IoStream::new(left);
        let mut server = IoStream::new(right);

        let writer = tokio::spawn(async move {
            for value in ["one", "two", "three"] {
                let last = value == "three";
                send_message(&mut client, &JsonCodec, &value.to_string(), last)
                    .await
                    .unwrap();
            }
        });

        let mut received = Vec::new();
        while let Some(value) = recv_message::<String, _, _>(&mut server, &JsonCodec)
            .await
            .unwrap()
        {
            received.push(value);
        }
        writer.await.unwrap();
        assert_eq!(received, ["one", "two", "three"]);
    }
}
