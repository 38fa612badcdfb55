//! Call lifetime primitives for rpcprims.
//!
//! A call context owns one [`DeadlineWrapper`] and one [`Owner`]. Every
//! blocking operation of the call runs inside the wrapper's guarded region,
//! so a deadline timer or an outside party (a closing server, a client
//! hanging up) can interrupt it through [`Wrapper::cancel`].
//!
//! Once cancelled, a wrapper stays cancelled: the owner inside the region
//! wakes with the stored [`CancelError`] and every later entry fails with the
//! same error.

pub mod deadline;
pub mod deadline_wrapper;
pub mod error;
pub mod metadata;
pub mod owner;
pub mod status;
pub mod wrapper;

pub use deadline::{encode_timeout, parse_timeout, Deadline, DeadlineHeaderError};
pub use deadline_wrapper::{DeadlineScope, DeadlineWrapper};
pub use error::{CancelError, Result};
pub use metadata::Metadata;
pub use owner::Owner;
pub use status::{RpcError, Status};
pub use wrapper::{Guard, Wrapper};
