use futures::future::BoxFuture;

use crate::call::Call;
use crate::error::Result;

/// Serves one call at a time.
///
/// The handler reads requests from and writes replies to `call`. Returning
/// ends the call; the server then half-closes the reply stream.
///
/// ```
/// use futures::future::BoxFuture;
/// use rpcprims_server::{Call, Handler, Result};
///
/// struct Echo;
///
/// impl Handler for Echo {
///     fn handle<'a>(&'a self, call: &'a mut Call) -> BoxFuture<'a, Result<()>> {
///         Box::pin(async move {
///             while let Some(value) = call.recv_message::<serde_json::Value>().await? {
///                 call.send_message(&value).await?;
///             }
///             Ok(())
///         })
///     }
/// }
/// ```
pub trait Handler: Send + Sync + 'static {
    fn handle<'a>(&'a self, call: &'a mut Call) -> BoxFuture<'a, Result<()>>;
}
