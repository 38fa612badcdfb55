use std::future::Future;
use std::marker::PhantomData;

use futures::stream::{self, Stream, StreamExt};
use rpcprims_transport::RecvStream;

use crate::codec::Decoder;
use crate::error::FrameError;
use crate::message::{recv_message_with_config, FrameConfig};

/// A source of successive messages belonging to one call.
///
/// `recv_message` returning `Ok(None)` marks the end of the sequence. Calling
/// it again after that keeps returning `Ok(None)`; messages are never
/// delivered twice.
pub trait StreamIterator: Send {
    /// Message type produced.
    type Message: Send;
    /// Error type produced.
    type Error: Send;

    /// Receive the next message, or `None` once the sequence has ended.
    fn recv_message(
        &mut self,
    ) -> impl Future<Output = Result<Option<Self::Message>, Self::Error>> + Send;
}

/// Turn a [`StreamIterator`] into a lazy, fused [`Stream`].
///
/// The stream ends at the first `None` or after yielding the first error.
pub fn into_stream<I>(iter: I) -> impl Stream<Item = Result<I::Message, I::Error>> + Send
where
    I: StreamIterator,
{
    stream::unfold(Some(iter), |state| async move {
        let mut iter = state?;
        match iter.recv_message().await {
            Ok(Some(message)) => Some((Ok(message), Some(iter))),
            Ok(None) => None,
            Err(err) => Some((Err(err), None)),
        }
    })
    .fuse()
}

/// Messages of type `M` read straight off a [`RecvStream`].
pub struct MessageStream<'a, M, S, C> {
    stream: &'a mut S,
    codec: &'a C,
    config: FrameConfig,
    _message: PhantomData<fn() -> M>,
}

impl<'a, M, S, C> MessageStream<'a, M, S, C> {
    /// Iterate messages on `stream` decoded by `codec`.
    pub fn new(stream: &'a mut S, codec: &'a C) -> Self {
        Self::with_config(stream, codec, FrameConfig::default())
    }

    /// Iterate with an explicit framing configuration.
    pub fn with_config(stream: &'a mut S, codec: &'a C, config: FrameConfig) -> Self {
        Self {
            stream,
            codec,
            config,
            _message: PhantomData,
        }
    }
}

impl<M, S, C> StreamIterator for MessageStream<'_, M, S, C>
where
    M: Send,
    S: RecvStream,
    C: Decoder<M>,
{
    type Message = M;
    type Error = FrameError;

    async fn recv_message(&mut self) -> Result<Option<M>, FrameError> {
        recv_message_with_config(self.stream, self.codec, &self.config).await
    }
}

#[cfg(test)]
mod tests {
    use futures::TryStreamExt;
    use rpcprims_transport::{Connection, IoStream, SendStream};

    use super::*;
    use crate::codec::JsonCodec;
    use crate::message::send_message;

    async fn feed(values: &[&str]) -> IoStream<Connection> {
        let (left, right) = Connection::memory_pair(4096);
        let mut writer = IoStream::new(left);
        for (i, value) in values.iter().enumerate() {
            let last = i + 1 == values.len();
            send_message(&mut writer, &JsonCodec, &value.to_string(), last)
                .await
                .unwrap();
        }
        if values.is_empty() {
            writer
                .send_data(bytes::Bytes::new(), true)
                .await
                .unwrap();
        }
        IoStream::new(right)
    }

    #[tokio::test]
    async fn iterates_until_end_of_stream() {
        let mut stream = feed(&["a", "b", "c"]).await;
        let messages = MessageStream::<String, _, _>::new(&mut stream, &JsonCodec);

        let collected: Vec<String> = into_stream(messages).try_collect().await.unwrap();
        assert_eq!(collected, ["a", "b", "c"]);
    }

    #[tokio::test]
    async fn exhausted_iterator_keeps_reporting_end() {
        let mut stream = feed(&["only"]).await;
        let mut messages = MessageStream::<String, _, _>::new(&mut stream, &JsonCodec);

        assert_eq!(messages.recv_message().await.unwrap().as_deref(), Some("only"));
        assert!(messages.recv_message().await.unwrap().is_none());
        assert!(messages.recv_message().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn fused_stream_stays_finished() {
        let mut stream = feed(&[]).await;
        let messages = MessageStream::<String, _, _>::new(&mut stream, &JsonCodec);
        let mut items = Box::pin(into_stream(messages));

        assert!(items.next().await.is_none());
        assert!(items.next().await.is_none());
    }

    #[tokio::test]
    async fn stream_stops_after_first_error() {
        let (left, right) = Connection::memory_pair(64);
        let mut writer = IoStream::new(left);
        writer
            .send_data(bytes::Bytes::from_static(b"\x01\x00\x00\x00\x01x"), true)
            .await
            .unwrap();
        let mut reader = IoStream::new(right);

        let messages = MessageStream::<String, _, _>::new(&mut reader, &JsonCodec);
        let mut items = Box::pin(into_stream(messages));
        let first = items.next().await.unwrap();
        assert!(matches!(first, Err(FrameError::CompressionNotImplemented)));
        assert!(items.next().await.is_none());
    }
}
