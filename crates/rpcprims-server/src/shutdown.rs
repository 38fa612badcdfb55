use futures::future::{self, BoxFuture, FutureExt};
use tokio::signal::unix::SignalKind;
use tracing::{debug, info, warn};

use crate::error::{Result, ServerError};
use crate::signals::SignalListener;

/// A server whose lifetime the shutdown coordinator manages.
pub trait ManagedServer: Send + Sync {
    /// Request shutdown. Must not block.
    fn close(&self);

    /// Resolve once the server has fully shut down.
    fn wait_closed(&self) -> BoxFuture<'_, ()>;
}

/// What ended a [`graceful_exit`] wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownTrigger {
    /// A termination signal arrived.
    Signal(SignalKind),
    /// The server at this index stopped on its own.
    ServerStopped(usize),
}

impl ShutdownTrigger {
    /// Raw signal number for a signal trigger.
    pub fn signal_number(&self) -> Option<i32> {
        match self {
            ShutdownTrigger::Signal(kind) => Some(kind.as_raw_value()),
            ShutdownTrigger::ServerStopped(_) => None,
        }
    }
}

/// Signals handled when none are given: interrupt and terminate.
pub fn default_signals() -> Vec<SignalKind> {
    vec![SignalKind::interrupt(), SignalKind::terminate()]
}

/// Run until SIGINT/SIGTERM or until any server stops, then close and drain
/// every server.
pub async fn graceful_exit(servers: &[&dyn ManagedServer]) -> Result<ShutdownTrigger> {
    graceful_exit_with_signals(servers, &default_signals()).await
}

/// Like [`graceful_exit`] with an explicit signal set.
///
/// Waits for the first of: any signal in `signals`, or any server's
/// `wait_closed` resolving. Then every server is asked to close and the call
/// returns once all of them have closed. Signal listeners are dropped before
/// the servers are closed, on every path out of this function, and each
/// signal gets its previous behaviour back: a signal that used to terminate
/// the process terminates it again.
pub async fn graceful_exit_with_signals(
    servers: &[&dyn ManagedServer],
    signals: &[SignalKind],
) -> Result<ShutdownTrigger> {
    let trigger = {
        let mut listeners = Vec::with_capacity(signals.len());
        for &kind in signals {
            listeners.push(SignalListener::install(kind).map_err(ServerError::Signal)?);
        }
        debug!(
            signals = listeners.len(),
            servers = servers.len(),
            "waiting for shutdown trigger"
        );

        let signal_waits = listeners.iter_mut().map(|listener| {
            async move {
                listener.recv().await.map_err(ServerError::Signal)?;
                Ok::<_, ServerError>(ShutdownTrigger::Signal(listener.kind()))
            }
            .boxed()
        });
        let server_waits = servers.iter().enumerate().map(|(index, server)| {
            async move {
                server.wait_closed().await;
                Ok::<_, ServerError>(ShutdownTrigger::ServerStopped(index))
            }
            .boxed()
        });
        let waits: Vec<BoxFuture<'_, Result<ShutdownTrigger>>> =
            signal_waits.chain(server_waits).collect();

        if waits.is_empty() {
            future::pending::<()>().await;
        }
        let (first, _, _) = future::select_all(waits).await;
        first
    };
    match &trigger {
        Ok(trigger) => info!(?trigger, "shutting down"),
        Err(err) => warn!(%err, "signal listener failed, shutting down"),
    }
    for server in servers {
        server.close();
    }
    future::join_all(servers.iter().map(|server| server.wait_closed())).await;
    debug!("all servers closed");
    trigger
}
