//! Wire types for admin messages.
//!
//! Requests:
//!
//! ```json
//! {"id": 7, "type": "BULK_DOWNLOAD", "data": {"url": "https://...", "options": {}}}
//! {"id": 8, "type": "CACHE_STATUS"}
//! {"type": "CLEAR_CACHE"}
//! ```
//!
//! Replies echo the `id` and carry exactly one of `result`, `status` or `error`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::tile::CacheStats;

/// Raw admin message as received.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminMessage {
    /// Correlation id, echoed verbatim in the reply
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl AdminMessage {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            id: None,
            kind: kind.into(),
            data: Value::Null,
        }
    }

    pub fn with_id(mut self, id: impl Into<Value>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }
}

/// `data` payload of a `BULK_DOWNLOAD` message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkDownload {
    pub url: String,

    /// Caller options, accepted and currently unused
    #[serde(default)]
    pub options: Value,
}

/// A decoded admin request.
#[derive(Debug, Clone, PartialEq)]
pub enum AdminRequest {
    BulkDownload(BulkDownload),
    CacheStatus,
    ClearCache,
}

impl AdminRequest {
    /// Decode the `type`/`data` pair of a message.
    pub fn from_message(message: &AdminMessage) -> Result<Self, String> {
        match message.kind.as_str() {
            "BULK_DOWNLOAD" => serde_json::from_value(message.data.clone())
                .map(AdminRequest::BulkDownload)
                .map_err(|e| format!("Invalid BULK_DOWNLOAD data: {e}")),
            "CACHE_STATUS" => Ok(AdminRequest::CacheStatus),
            "CLEAR_CACHE" => Ok(AdminRequest::ClearCache),
            other => Err(format!("Unknown message type: {other}")),
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AdminRequest::BulkDownload(_) => "BULK_DOWNLOAD",
            AdminRequest::CacheStatus => "CACHE_STATUS",
            AdminRequest::ClearCache => "CLEAR_CACHE",
        }
    }
}

/// Reply to an admin message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdminReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,

    pub success: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<CacheStats>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AdminReply {
    pub fn result(id: Option<Value>, result: Value) -> Self {
        Self {
            id,
            success: true,
            result: Some(result),
            status: None,
            error: None,
        }
    }

    pub fn status(id: Option<Value>, status: CacheStats) -> Self {
        Self {
            id,
            success: true,
            result: None,
            status: Some(status),
            error: None,
        }
    }

    pub fn failure(id: Option<Value>, error: impl Into<String>) -> Self {
        Self {
            id,
            success: false,
            result: None,
            status: None,
            error: Some(error.into()),
        }
    }
}
