//! Request, reply and broadcast types for the client channel protocol.
//!
//! Every frame is one JSON object. Clients send requests tagged by `type`;
//! the daemon sends frames tagged by `kind`, either a `reply` to one request
//! or a `broadcast` of a [`ChangeEvent`].

use credsync_core::{ChangeEvent, EventExtra, NormalizedRecord, RecordId, RecordInput, Secret};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request sent by a client over its channel.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Create a record.
    AddItem {
        #[serde(default)]
        item: Option<RecordInput>,
    },

    /// Change a record. `item.id` selects the record.
    UpdateItem {
        #[serde(default)]
        item: Option<RecordInput>,
    },

    /// Delete a record.
    RemoveItem {
        #[serde(alias = "guid")]
        id: RecordId,
    },

    /// Fetch one record.
    GetItem {
        #[serde(alias = "guid")]
        id: RecordId,
    },

    /// Fetch every record.
    ListItems,

    /// A client copied a field value; put it on the system clipboard.
    CopiedField {
        field: String,
        #[serde(alias = "toCopy")]
        value: Secret,
    },

    /// Forward a client-side telemetry event.
    TelemetryEvent {
        method: String,
        object: String,
        #[serde(default)]
        extra: EventExtra,
    },

    /// A client view was opened.
    OpenView { name: String },

    /// A client view was closed.
    CloseView { name: String },

    /// Any `type` this daemon does not know.
    #[serde(other)]
    Unknown,
}

impl Request {
    /// Decode a request.
    ///
    /// Messages that are not objects or carry no string `type` are treated
    /// as [`Request::Unknown`] rather than as errors.
    pub fn parse(message: Value) -> Result<Self, serde_json::Error> {
        let tagged = message
            .get("type")
            .is_some_and(|kind| kind.is_string());
        if !tagged {
            return Ok(Self::Unknown);
        }
        serde_json::from_value(message)
    }

    /// Wire name of the request.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddItem { .. } => "add_item",
            Self::UpdateItem { .. } => "update_item",
            Self::RemoveItem { .. } => "remove_item",
            Self::GetItem { .. } => "get_item",
            Self::ListItems => "list_items",
            Self::CopiedField { .. } => "copied_field",
            Self::TelemetryEvent { .. } => "telemetry_event",
            Self::OpenView { .. } => "open_view",
            Self::CloseView { .. } => "close_view",
            Self::Unknown => "unknown",
        }
    }
}

/// Reply carrying a single record, or `null` when none matched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResponse {
    pub item: Option<NormalizedRecord>,
}

/// Reply carrying every record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemsResponse {
    pub items: Vec<NormalizedRecord>,
}

/// Reply with no payload, serialized as `{}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmptyResponse {}

/// Error description attached to a failed reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// One of `validation`, `not_found`, `storage`, `internal`.
    pub kind: String,
    /// Human-readable description.
    pub message: String,
}

/// Reply to a single request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reply {
    /// The `requestId` the client sent, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<Value>,

    /// The operation result. `null` for unknown requests and for errors.
    pub result: Value,

    /// Present when the request failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorReply>,
}

/// A frame sent from the daemon to one client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Outbound {
    /// Answer to a request made on this channel.
    Reply(Reply),

    /// A change made elsewhere.
    Broadcast { event: ChangeEvent },
}

impl Outbound {
    /// Successful reply.
    pub fn reply(request_id: Option<Value>, result: Value) -> Self {
        Self::Reply(Reply {
            request_id,
            result,
            error: None,
        })
    }

    /// Failed reply.
    pub fn error(request_id: Option<Value>, kind: &str, message: impl Into<String>) -> Self {
        Self::Reply(Reply {
            request_id,
            result: Value::Null,
            error: Some(ErrorReply {
                kind: kind.to_string(),
                message: message.into(),
            }),
        })
    }

    /// The reply, if this frame is one.
    pub fn as_reply(&self) -> Option<&Reply> {
        match self {
            Self::Reply(reply) => Some(reply),
            Self::Broadcast { .. } => None,
        }
    }

    /// The broadcast event, if this frame is one.
    pub fn as_event(&self) -> Option<&ChangeEvent> {
        match self {
            Self::Reply(_) => None,
            Self::Broadcast { event } => Some(event),
        }
    }
}
