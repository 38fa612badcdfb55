use std::pin::pin;
use std::time::Duration;

use rpcprims_call::{Deadline, DeadlineWrapper, Metadata, Owner, RpcError, Status};
use rpcprims_frame::{recv_message_with_config, send_message_with_config, FrameConfig, JsonCodec};
use rpcprims_transport::{connect, Endpoint, IoStream};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::{Result, ServerError};
use crate::events::{ChannelEvents, SendRequestContext};
use crate::head::RequestHead;

/// Client side: issues calls to one endpoint, one connection per call.
///
/// The whole exchange of a call (connect, send, receive) runs inside one
/// guarded region bounded by the call's timeout.
#[derive(Debug, Clone)]
pub struct Channel {
    endpoint: Endpoint,
    events: ChannelEvents,
    config: FrameConfig,
}

impl Channel {
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, FrameConfig::default())
    }

    pub fn with_config(endpoint: Endpoint, config: FrameConfig) -> Self {
        Self {
            endpoint,
            events: ChannelEvents::new(),
            config,
        }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn events(&self) -> &ChannelEvents {
        &self.events
    }

    pub fn events_mut(&mut self) -> &mut ChannelEvents {
        &mut self.events
    }

    /// Send one request and return the single reply.
    pub async fn unary<Req, Resp>(
        &self,
        method: &str,
        request: &Req,
        timeout: Option<Duration>,
    ) -> Result<Resp>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned + Send,
    {
        let mut replies = self.exchange(method, &[request], timeout).await?;
        if replies.len() > 1 {
            let message = format!("expected one reply, got {}", replies.len());
            return Err(RpcError::new(Status::Internal, message).into());
        }
        replies
            .pop()
            .ok_or_else(|| RpcError::new(Status::Unknown, "call ended without a reply").into())
    }

    /// Send every request, half-close, and collect all replies. Replies are
    /// read as they arrive, so streams larger than the socket buffers work.
    pub async fn stream<Req, Resp>(
        &self,
        method: &str,
        requests: &[Req],
        timeout: Option<Duration>,
    ) -> Result<Vec<Resp>>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned + Send,
    {
        let requests: Vec<&Req> = requests.iter().collect();
        self.exchange(method, &requests, timeout).await
    }

    async fn exchange<Req, Resp>(
        &self,
        method: &str,
        requests: &[&Req],
        timeout: Option<Duration>,
    ) -> Result<Vec<Resp>>
    where
        Req: Serialize + Sync + ?Sized,
        Resp: DeserializeOwned + Send,
    {
        let deadline = timeout.map(Deadline::from_timeout);
        let wrapper = DeadlineWrapper::new();
        let owner = Owner::new();
        let _scope = wrapper.start(deadline)?;

        let context = SendRequestContext {
            method_name: method.to_string(),
            deadline,
        };
        let metadata = wrapper
            .guard(&owner, self.events.send_request(Metadata::new(), context))
            .await?
            .map_err(ServerError::Listener)?;

        let head = RequestHead::new(method, deadline, metadata);
        let config = &self.config;
        let call = async {
            let stream = IoStream::new(connect(&self.endpoint).await?);
            let (mut reader, mut writer) = stream.split();

            let sending = async {
                send_message_with_config(&mut writer, &JsonCodec, &head, requests.is_empty(), config)
                    .await?;
                for (i, request) in requests.iter().enumerate() {
                    let last = i + 1 == requests.len();
                    send_message_with_config(&mut writer, &JsonCodec, *request, last, config)
                        .await?;
                }
                Ok::<_, ServerError>(())
            };
            let receiving = async {
                let mut replies: Vec<Resp> = Vec::new();
                while let Some(reply) =
                    recv_message_with_config(&mut reader, &JsonCodec, config).await?
                {
                    replies.push(reply);
                }
                Ok::<_, ServerError>(replies)
            };

            // Replies are read while requests are still going out, so neither
            // side stalls on a full socket buffer.
            let mut sending = pin!(sending);
            let mut receiving = pin!(receiving);
            let mut sent = None;
            let replies = loop {
                tokio::select! {
                    result = &mut sending, if sent.is_none() => sent = Some(result),
                    replies = &mut receiving => break replies?,
                }
            };
            // A server may answer and close before reading every request; a
            // failed send only matters when nothing came back.
            match sent {
                Some(Err(err)) if replies.is_empty() => Err(err),
                _ => Ok(replies),
            }
        };
        let replies = wrapper.guard(&owner, call).await??;
        debug!(%method, replies = replies.len(), "call finished");
        Ok(replies)
    }
}

#[cfg(test)]
mod tests {
    use futures::future::BoxFuture;
    use rpcprims_call::CancelError;
    use rpcprims_events::{listen, BoxError, Event};
    use serde_json::{json, Value};

    use super::*;
    use crate::call::Call;
    use crate::events::SendRequest;
    use crate::handler::Handler;
    use crate::server::{Server, ServerConfig};

    /// Drains the requests, then replies once with the request metadata.
    struct ShowMetadata;

    impl Handler for ShowMetadata {
        fn handle<'a>(&'a self, call: &'a mut Call) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                let metadata = call.metadata().clone();
                while call.recv_message::<Value>().await?.is_some() {}
                call.send_message(&serde_json::to_value(metadata).unwrap_or_default())
                    .await
            })
        }
    }

    struct Sleepy;

    impl Handler for Sleepy {
        fn handle<'a>(&'a self, call: &'a mut Call) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                call.guarded(tokio::time::sleep(Duration::from_secs(30))).await?;
                call.send_message(&json!("late")).await
            })
        }
    }

    async fn serve(handler: impl Handler) -> Server {
        let endpoint: Endpoint = "127.0.0.1:0".parse().unwrap();
        let mut server = Server::bind(&endpoint, handler, ServerConfig::default())
            .await
            .unwrap();
        server.start().unwrap();
        server
    }

    #[tokio::test]
    async fn send_request_listener_adds_metadata() {
        let server = serve(ShowMetadata).await;
        let mut channel = Channel::new(server.local_endpoint().clone());
        listen(channel.events_mut(), |mut event: Event<SendRequest>| async move {
            let method = event.method_name.clone();
            event.payload_mut().insert("x-method", method);
            Ok::<_, BoxError>(event)
        });

        let reply: Value = channel.unary("/meta", &json!(null), None).await.unwrap();
        assert_eq!(reply, json!({"x-method": "/meta"}));

        server.close();
        server.wait_closed().await;
    }

    /// Replies to each request as it arrives.
    struct Echo;

    impl Handler for Echo {
        fn handle<'a>(&'a self, call: &'a mut Call) -> BoxFuture<'a, Result<()>> {
            Box::pin(async move {
                while let Some(message) = call.recv_message::<Value>().await? {
                    call.send_message(&message).await?;
                }
                Ok(())
            })
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn large_streams_flow_in_both_directions() {
        let server = serve(Echo).await;
        let channel = Channel::new(server.local_endpoint().clone());

        let chunk = "x".repeat(256 * 1024);
        let requests: Vec<String> = (0..128).map(|i| format!("{i}:{chunk}")).collect();
        let replies: Vec<String> = channel
            .stream("/echo", &requests, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        assert_eq!(replies.len(), requests.len());
        assert!(replies.iter().zip(&requests).all(|(reply, request)| reply == request));

        server.close();
        server.wait_closed().await;
    }

    #[tokio::test]
    async fn borrowed_requests_are_accepted() {
        let server = serve(Echo).await;
        let channel = Channel::new(server.local_endpoint().clone());

        let reply: String = channel.unary("/echo", "hello", None).await.unwrap();
        assert_eq!(reply, "hello");

        server.close();
        server.wait_closed().await;
    }

    #[tokio::test]
    async fn client_timeout_fails_with_deadline_exceeded() {
        let server = serve(Sleepy).await;
        let channel = Channel::new(server.local_endpoint().clone());

        let err = channel
            .unary::<Value, Value>("/sleep", &json!(null), Some(Duration::from_millis(100)))
            .await
            .unwrap_err();
        assert_eq!(err.as_cancel(), Some(&CancelError::DeadlineExceeded));

        server.close();
        server.wait_closed().await;
    }

    #[tokio::test]
    async fn zero_timeout_fails_before_connecting() {
        let channel = Channel::new("127.0.0.1:9".parse().unwrap());
        let err = channel
            .unary::<Value, Value>("/x", &json!(null), Some(Duration::ZERO))
            .await
            .unwrap_err();
        assert_eq!(err.as_cancel(), Some(&CancelError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn closed_server_refuses_calls() {
        let server = serve(Sleepy).await;
        server.close();
        server.wait_closed().await;

        let channel = Channel::new(server.local_endpoint().clone());
        let err = channel
            .unary::<Value, Value>("/x", &json!(null), Some(Duration::from_secs(1)))
            .await
            .unwrap_err();
        assert!(matches!(err, ServerError::Transport(_)));
    }
}
