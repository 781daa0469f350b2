//! Events delivered to a user's sessions.

use serde::{Deserialize, Serialize};

use vaultgate_core::{ConsentRequest, RequestId, RequestStatus};

/// Something a user's devices should know about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConsentEvent {
    /// A new request is waiting for the user.
    Pending { request: ConsentRequest },
    /// A request left `Pending`, so other devices can dismiss the prompt.
    Resolved {
        request_id: RequestId,
        status: RequestStatus,
    },
}

impl ConsentEvent {
    pub fn request_id(&self) -> RequestId {
        match self {
            ConsentEvent::Pending { request } => request.id,
            ConsentEvent::Resolved { request_id, .. } => *request_id,
        }
    }
}
