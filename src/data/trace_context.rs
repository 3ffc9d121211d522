//! Trace context for request/operation tracking

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Trace context threaded through store and service calls so log lines from
/// one construction run or retrieval request can be correlated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TraceContext {
    pub trace_id: Uuid,
    pub parent_id: Option<Uuid>,
}

impl TraceContext {
    /// Creates a new root trace context.
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            parent_id: None,
        }
    }

    /// Creates a child context inheriting the trace id.
    pub fn new_child(&self) -> Self {
        Self {
            trace_id: self.trace_id,
            parent_id: Some(self.trace_id),
        }
    }
}

impl Default for TraceContext {
    fn default() -> Self {
        Self::new_root()
    }
}
