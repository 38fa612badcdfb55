use std::io;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use rpcprims_call::{Deadline, DeadlineWrapper, Owner, RpcError, Status};
use rpcprims_frame::{recv_message_with_config, FrameConfig, JsonCodec, DEFAULT_MAX_PAYLOAD};
use rpcprims_transport::{Connection, Endpoint, IoStream, Listener, TransportError};
use tokio_util::sync::CancellationToken;
use tokio_util::task::{AbortOnDropHandle, TaskTracker};
use tracing::{debug, error, info, warn};

use crate::call::{Call, CallParts};
use crate::error::{Result, ServerError};
use crate::events::{CallHandlerContext, RecvRequestContext, ServerEvents};
use crate::handler::Handler;
use crate::head::RequestHead;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Maximum message payload size in bytes, for requests and replies.
    /// Default: 16 MiB.
    pub max_payload_size: usize,
    /// Upper bound on every call's duration. A caller's earlier deadline
    /// still wins. Default: none.
    pub call_timeout: Option<Duration>,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            max_payload_size: DEFAULT_MAX_PAYLOAD,
            call_timeout: None,
        }
    }
}

struct Shared {
    handler: Arc<dyn Handler>,
    events: ServerEvents,
    config: ServerConfig,
    shutdown: CancellationToken,
}

/// Serves calls on one endpoint. Each accepted connection carries one call.
///
/// Lifecycle: [`bind`](Server::bind), register listeners through
/// [`events_mut`](Server::events_mut), [`start`](Server::start), and later
/// [`close`](Server::close) plus [`wait_closed`](Server::wait_closed).
pub struct Server {
    handler: Arc<dyn Handler>,
    config: ServerConfig,
    events: ServerEvents,
    listener: Option<Listener>,
    local: Endpoint,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl Server {
    /// Bind `endpoint`. No connection is accepted until [`start`](Server::start).
    pub async fn bind(
        endpoint: &Endpoint,
        handler: impl Handler,
        config: ServerConfig,
    ) -> Result<Self> {
        let listener = Listener::bind(endpoint).await?;
        let local = listener.local_endpoint()?;
        Ok(Self {
            handler: Arc::new(handler),
            config,
            events: ServerEvents::new(),
            listener: Some(listener),
            local,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        })
    }

    /// Endpoint actually bound (with the real port for `host:0`).
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local
    }

    pub fn events(&self) -> &ServerEvents {
        &self.events
    }

    /// Listener registry. Listeners added after `start` do not affect the
    /// running server.
    pub fn events_mut(&mut self) -> &mut ServerEvents {
        &mut self.events
    }

    /// Spawn the accept loop. Must be called within a tokio runtime.
    pub fn start(&mut self) -> Result<()> {
        let listener = self.listener.take().ok_or(ServerError::AlreadyStarted)?;
        let shared = Arc::new(Shared {
            handler: Arc::clone(&self.handler),
            events: self.events.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        });
        info!(endpoint = %self.local, "server started");
        self.tracker
            .spawn(accept_loop(listener, shared, self.tracker.clone()));
        Ok(())
    }

    /// Stop accepting and cancel in-flight calls with `UNAVAILABLE`.
    pub fn close(&self) {
        if !self.shutdown.is_cancelled() {
            info!(endpoint = %self.local, "closing server");
        }
        self.shutdown.cancel();
        self.tracker.close();
    }

    pub fn is_closing(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Resolve once the accept loop and every in-flight call have finished.
    ///
    /// Also resolves when the accept loop stops on its own after a listener
    /// failure, without `close` having been called.
    pub async fn wait_closed(&self) {
        self.tracker.wait().await;
    }
}

#[cfg(unix)]
impl crate::shutdown::ManagedServer for Server {
    fn close(&self) {
        Server::close(self);
    }

    fn wait_closed(&self) -> BoxFuture<'_, ()> {
        Box::pin(Server::wait_closed(self))
    }
}

impl std::fmt::Debug for Server {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Server")
            .field("endpoint", &self.local)
            .field("started", &self.listener.is_none())
            .field("closing", &self.shutdown.is_cancelled())
            .field("in_flight", &self.tracker.len())
            .finish()
    }
}

async fn accept_loop(listener: Listener, shared: Arc<Shared>, tracker: TaskTracker) {
    loop {
        let accepted = tokio::select! {
            () = shared.shutdown.cancelled() => break,
            accepted = listener.accept() => accepted,
        };
        match accepted {
            Ok((conn, peer)) => {
                let shared = Arc::clone(&shared);
                tracker.spawn(serve_connection(conn, peer, shared));
            }
            Err(err) if is_transient_accept_error(&err) => {
                warn!(%err, "accept failed, retrying");
                tokio::select! {
                    () = shared.shutdown.cancelled() => break,
                    () = tokio::time::sleep(ACCEPT_RETRY_DELAY) => {}
                }
            }
            Err(err) => {
                error!(%err, "accept failed, stopping server");
                break;
            }
        }
    }
    tracker.close();
    debug!("accept loop stopped");
}

/// Pause after a transient accept failure before trying again.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

/// Accept failures that concern one connection, or a momentary lack of
/// descriptors, rather than the listener itself.
fn is_transient_accept_error(err: &TransportError) -> bool {
    let TransportError::Accept(source) = err else {
        return false;
    };
    if matches!(
        source.kind(),
        io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }
    #[cfg(unix)]
    if matches!(
        source.raw_os_error(),
        Some(libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM)
    ) {
        return true;
    }
    false
}

async fn serve_connection(conn: Connection, peer: String, shared: Arc<Shared>) {
    match run_call(conn, &peer, &shared).await {
        Ok(method) => debug!(%method, %peer, "call finished"),
        Err(err) => warn!(%peer, %err, "call failed"),
    }
}

async fn run_call(conn: Connection, peer: &str, shared: &Shared) -> Result<String> {
    let wrapper = DeadlineWrapper::new();
    let owner = Owner::new();
    let config = FrameConfig {
        max_payload_size: shared.config.max_payload_size,
    };
    let mut stream = IoStream::new(conn);

    let _watcher = {
        let canceller = wrapper.wrapper().clone();
        let shutdown = shared.shutdown.clone();
        AbortOnDropHandle::new(tokio::spawn(async move {
            shutdown.cancelled().await;
            canceller.cancel(RpcError::new(Status::Unavailable, "server is closing").into());
        }))
    };

    let server_deadline = shared.config.call_timeout.map(Deadline::from_timeout);
    let head: RequestHead = {
        let _scope = wrapper.start(server_deadline)?;
        wrapper
            .guard(&owner, recv_message_with_config(&mut stream, &JsonCodec, &config))
            .await??
            .ok_or(ServerError::MissingHead)?
    };
    let deadline = Deadline::earliest(head.deadline()?, server_deadline);
    let method = head.method;
    debug!(%method, %peer, ?deadline, "call started");

    let mut call = Call::from_parts(CallParts {
        method: method.clone(),
        metadata: head.metadata,
        deadline,
        peer: peer.to_string(),
        stream,
        wrapper,
        owner,
        config,
    });
    let _scope = call.start_deadline()?;

    let context = RecvRequestContext {
        method_name: method.clone(),
        deadline,
        peer: peer.to_string(),
    };
    let metadata = call
        .guarded(shared.events.recv_request(call.metadata().clone(), context))
        .await?
        .map_err(ServerError::Listener)?;
    call.set_metadata(metadata);

    let context = CallHandlerContext {
        name: method.clone(),
    };
    let handler = call
        .guarded(shared.events.call_handler(Arc::clone(&shared.handler), context))
        .await?
        .map_err(ServerError::Listener)?;

    handler.handle(&mut call).await?;
    call.finish().await?;
    Ok(method)
}
