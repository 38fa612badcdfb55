use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use rpcprims_call::{RpcError, Status};
use rpcprims_events::{listen, BoxError, Event};
use rpcprims_server::{graceful_exit, Call, Handler, RecvRequest, Server, ServerConfig};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cmd::{parse_duration, parse_endpoint, ServeArgs};
use crate::exit::{server_error, CliResult, FAILURE, SIGNAL_BASE};

/// Metadata key carrying the id assigned to each call.
pub const REQUEST_ID: &str = "x-request-id";

pub async fn run(args: ServeArgs) -> CliResult<i32> {
    let endpoint = parse_endpoint(&args.endpoint)?;
    let config = ServerConfig {
        call_timeout: args.timeout.as_deref().map(parse_duration).transpose()?,
        ..ServerConfig::default()
    };
    let handler = Echo {
        method: args.method,
    };

    let mut server = Server::bind(&endpoint, handler, config)
        .await
        .map_err(|err| server_error("bind failed", err))?;
    listen(server.events_mut(), assign_request_id(RequestIds::new()));
    server
        .start()
        .map_err(|err| server_error("start failed", err))?;
    info!(endpoint = %server.local_endpoint(), "echo server ready");

    let trigger = graceful_exit(&[&server])
        .await
        .map_err(|err| server_error("shutdown failed", err))?;

    match trigger.signal_number() {
        Some(signo) => Ok(SIGNAL_BASE + signo),
        None => {
            warn!("server stopped without a shutdown signal");
            Ok(FAILURE)
        }
    }
}

/// Replies to every request with the request itself.
struct Echo {
    method: Option<String>,
}

impl Handler for Echo {
    fn handle<'a>(&'a self, call: &'a mut Call) -> BoxFuture<'a, rpcprims_server::Result<()>> {
        async move {
            if let Some(expected) = &self.method {
                if call.method() != expected {
                    let message = format!("unknown method {}", call.method());
                    return Err(RpcError::new(Status::Unimplemented, message).into());
                }
            }

            let mut echoed = 0usize;
            while let Some(message) = call.recv_message::<Value>().await? {
                call.send_message(&message).await?;
                echoed += 1;
            }
            debug!(
                method = call.method(),
                request_id = call.metadata().get(REQUEST_ID).unwrap_or("-"),
                echoed,
                "echo finished"
            );
            Ok(())
        }
        .boxed()
    }
}

/// Per-process request id source: `<pid>-<sequence>`.
#[derive(Debug)]
struct RequestIds {
    pid: u32,
    next: AtomicU64,
}

impl RequestIds {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            pid: std::process::id(),
            next: AtomicU64::new(1),
        })
    }

    fn next(&self) -> String {
        format!("{}-{}", self.pid, self.next.fetch_add(1, Ordering::Relaxed))
    }
}

/// `RecvRequest` listener that keeps a caller-supplied request id and assigns
/// a fresh one otherwise.
fn assign_request_id(
    ids: Arc<RequestIds>,
) -> impl Fn(Event<RecvRequest>) -> BoxFuture<'static, Result<Event<RecvRequest>, BoxError>>
       + Send
       + Sync
       + 'static {
    move |mut event: Event<RecvRequest>| {
        let ids = Arc::clone(&ids);
        async move {
            if !event.payload().contains_key(REQUEST_ID) {
                let id = ids.next();
                event.payload_mut().insert(REQUEST_ID, id);
            }
            info!(
                method = %event.method_name,
                peer = %event.peer,
                deadline = ?event.deadline,
                request_id = event.payload().get(REQUEST_ID).unwrap_or("-"),
                "call received"
            );
            Ok::<_, BoxError>(event)
        }
        .boxed()
    }
}
