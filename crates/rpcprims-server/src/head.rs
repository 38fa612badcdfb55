use rpcprims_call::{Deadline, DeadlineHeaderError, Metadata};
use serde::{Deserialize, Serialize};

/// First message of every call, sent by the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHead {
    pub method: String,
    /// Remaining time in timeout header form, e.g. `"250000u"`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<String>,
    #[serde(default)]
    pub metadata: Metadata,
}

impl RequestHead {
    pub fn new(method: impl Into<String>, deadline: Option<Deadline>, metadata: Metadata) -> Self {
        Self {
            method: method.into(),
            timeout: deadline.map(|d| d.to_header()),
            metadata,
        }
    }

    /// The caller's deadline, measured from now.
    pub fn deadline(&self) -> Result<Option<Deadline>, DeadlineHeaderError> {
        self.timeout.as_deref().map(Deadline::from_header).transpose()
    }
}
