use std::sync::Arc;

use rpcprims_call::{Deadline, Metadata};
use rpcprims_events::{dispatch_table, EventKind};

use crate::handler::Handler;

/// A request head arrived. Listeners may edit the request metadata.
pub struct RecvRequest;

#[derive(Debug, Clone)]
pub struct RecvRequestContext {
    pub method_name: String,
    pub deadline: Option<Deadline>,
    pub peer: String,
}

impl EventKind for RecvRequest {
    const NAME: &'static str = "recv_request";
    type Payload = Metadata;
    type Context = RecvRequestContext;
}

/// A handler is about to run. Listeners may wrap or substitute it.
pub struct CallHandler;

#[derive(Debug, Clone)]
pub struct CallHandlerContext {
    pub name: String,
}

impl EventKind for CallHandler {
    const NAME: &'static str = "call_handler";
    type Payload = Arc<dyn Handler>;
    type Context = CallHandlerContext;
}

/// A channel is about to send a request head. Listeners may edit the
/// outgoing metadata.
pub struct SendRequest;

#[derive(Debug, Clone)]
pub struct SendRequestContext {
    pub method_name: String,
    pub deadline: Option<Deadline>,
}

impl EventKind for SendRequest {
    const NAME: &'static str = "send_request";
    type Payload = Metadata;
    type Context = SendRequestContext;
}

dispatch_table! {
    /// Invocation points of a [`Server`](crate::Server).
    pub struct ServerEvents {
        /// Dispatched once per call after the request head is read.
        recv_request: RecvRequest,
        /// Dispatched once per call before the handler runs.
        call_handler: CallHandler,
    }
}

dispatch_table! {
    /// Invocation points of a [`Channel`](crate::Channel).
    pub struct ChannelEvents {
        /// Dispatched before each request head is written.
        send_request: SendRequest,
    }
}
