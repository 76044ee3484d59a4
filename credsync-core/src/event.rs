//! Change events broadcast to connected clients.

use serde::{Deserialize, Serialize};

use crate::model::{NormalizedRecord, RecordId};

/// A change to the cached record set, in the form clients consume it.
///
/// Serialized with a `type` discriminator, e.g.
/// `{"type":"removed_item","id":"FOO"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ChangeEvent {
    /// A record was created.
    AddedItem { item: NormalizedRecord },

    /// A record changed.
    UpdatedItem { item: NormalizedRecord },

    /// A record was deleted.
    RemovedItem { id: RecordId },

    /// Every record was deleted.
    RemovedAll,
}

impl ChangeEvent {
    /// Wire name of the event.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddedItem { .. } => "added_item",
            Self::UpdatedItem { .. } => "updated_item",
            Self::RemovedItem { .. } => "removed_item",
            Self::RemovedAll => "removed_all",
        }
    }

    /// ID of the affected record, if the event concerns a single record.
    pub fn record_id(&self) -> Option<&RecordId> {
        match self {
            Self::AddedItem { item } | Self::UpdatedItem { item } => Some(item.id()),
            Self::RemovedItem { id } => Some(id),
            Self::RemovedAll => None,
        }
    }
}
