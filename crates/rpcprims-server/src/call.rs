use std::future::Future;
use std::marker::PhantomData;

use bytes::Bytes;
use futures::Stream;
use rpcprims_call::{
    CancelError, Deadline, DeadlineScope, DeadlineWrapper, Metadata, Owner, Wrapper,
};
use rpcprims_frame::{
    into_stream, recv_message_with_config, send_message_with_config, Decoder, Encoder,
    FrameConfig, JsonCodec, StreamIterator,
};
use rpcprims_transport::{Connection, IoStream, SendStream};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::Result;

/// The server side of one call.
///
/// Every read and write runs inside the call's guarded region, so a deadline
/// or a closing server interrupts whatever the handler is blocked on. Once
/// interrupted, every later operation fails with the same error.
pub struct Call {
    method: String,
    metadata: Metadata,
    deadline: Option<Deadline>,
    peer: String,
    stream: IoStream<Connection>,
    wrapper: DeadlineWrapper,
    owner: Owner,
    config: FrameConfig,
    finished: bool,
}

pub(crate) struct CallParts {
    pub method: String,
    pub metadata: Metadata,
    pub deadline: Option<Deadline>,
    pub peer: String,
    pub stream: IoStream<Connection>,
    pub wrapper: DeadlineWrapper,
    pub owner: Owner,
    pub config: FrameConfig,
}

impl Call {
    pub(crate) fn from_parts(parts: CallParts) -> Self {
        Self {
            method: parts.method,
            metadata: parts.metadata,
            deadline: parts.deadline,
            peer: parts.peer,
            stream: parts.stream,
            wrapper: parts.wrapper,
            owner: parts.owner,
            config: parts.config,
            finished: false,
        }
    }

    /// Method name from the request head.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Request metadata, after `recv_request` listeners ran.
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Effective deadline: the earlier of the caller's and the server's.
    pub fn deadline(&self) -> Option<Deadline> {
        self.deadline
    }

    pub fn peer(&self) -> &str {
        &self.peer
    }

    /// Receive the next JSON request, or `None` once the client finished
    /// sending.
    pub async fn recv_message<M>(&mut self) -> Result<Option<M>>
    where
        M: DeserializeOwned + Send,
    {
        self.recv_message_with(&JsonCodec).await
    }

    /// Receive the next request decoded by `codec`.
    pub async fn recv_message_with<M, C>(&mut self, codec: &C) -> Result<Option<M>>
    where
        M: Send,
        C: Decoder<M>,
    {
        let Call {
            stream,
            wrapper,
            owner,
            config,
            ..
        } = self;
        let message = wrapper
            .guard(owner, recv_message_with_config(stream, codec, config))
            .await??;
        Ok(message)
    }

    /// Send one JSON reply. Borrowed and unsized replies (`&str`, slices)
    /// are sent as they are.
    pub async fn send_message<M>(&mut self, message: &M) -> Result<()>
    where
        M: Serialize + Sync + ?Sized,
    {
        self.send_message_with(&JsonCodec, message).await
    }

    /// Send one reply encoded by `codec`.
    pub async fn send_message_with<M, C>(&mut self, codec: &C, message: &M) -> Result<()>
    where
        M: Sync + ?Sized,
        C: Encoder<M>,
    {
        let Call {
            stream,
            wrapper,
            owner,
            config,
            ..
        } = self;
        wrapper
            .guard(owner, send_message_with_config(stream, codec, message, false, config))
            .await??;
        Ok(())
    }

    /// The remaining JSON requests as a stream.
    pub fn messages<'a, M>(&'a mut self) -> impl Stream<Item = Result<M>> + Send + 'a
    where
        M: DeserializeOwned + Send + 'a,
    {
        into_stream(Requests {
            call: self,
            _message: PhantomData,
        })
    }

    /// Cancel the call from inside the handler.
    pub fn cancel(&self, error: CancelError) {
        self.wrapper.cancel(error);
    }

    /// A handle other tasks can use to cancel this call.
    pub fn canceller(&self) -> Wrapper {
        self.wrapper.wrapper().clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.wrapper.is_cancelled()
    }

    /// Half-close the reply stream. Called by the server once the handler
    /// returns; further calls are no-ops.
    pub async fn finish(&mut self) -> Result<()> {
        if self.finished {
            return Ok(());
        }
        let Call {
            stream,
            wrapper,
            owner,
            ..
        } = self;
        wrapper
            .guard(owner, stream.send_data(Bytes::new(), true))
            .await?
            .map_err(rpcprims_frame::FrameError::from)?;
        self.finished = true;
        Ok(())
    }

    pub(crate) fn start_deadline(&self) -> std::result::Result<DeadlineScope, CancelError> {
        self.wrapper.start(self.deadline)
    }

    /// Run `fut` inside the call's guarded region.
    pub(crate) async fn guarded<F>(&self, fut: F) -> std::result::Result<F::Output, CancelError>
    where
        F: Future,
    {
        self.wrapper.guard(&self.owner, fut).await
    }

    pub(crate) fn set_metadata(&mut self, metadata: Metadata) {
        self.metadata = metadata;
    }
}

impl std::fmt::Debug for Call {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Call")
            .field("method", &self.method)
            .field("peer", &self.peer)
            .field("deadline", &self.deadline)
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

struct Requests<'a, M> {
    call: &'a mut Call,
    _message: PhantomData<fn() -> M>,
}

impl<M> StreamIterator for Requests<'_, M>
where
    M: DeserializeOwned + Send,
{
    type Message = M;
    type Error = crate::error::ServerError;

    async fn recv_message(&mut self) -> Result<Option<M>> {
        self.call.recv_message().await
    }
}
