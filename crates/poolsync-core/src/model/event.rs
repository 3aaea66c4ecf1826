// ── Push events ──
//
// Out-of-band notifications of a resource changing on the backend.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use super::identity::{ResourceId, ResourceKind};

/// What happened to the resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PushOperation {
    Create,
    Update,
    Delete,
}

/// A server-originated change notification.
///
/// `delivery_id` is the transport's idempotency token when it provides
/// one; without it, duplicates are recognised by content.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PushEvent<T> {
    pub kind: ResourceKind,
    pub resource_id: ResourceId,
    pub operation: PushOperation,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub payload: Option<T>,
}

impl<T> PushEvent<T> {
    pub fn create(kind: impl Into<ResourceKind>, id: impl Into<ResourceId>, payload: T) -> Self {
        Self::new(kind, id, PushOperation::Create, Some(payload))
    }

    pub fn update(kind: impl Into<ResourceKind>, id: impl Into<ResourceId>, payload: T) -> Self {
        Self::new(kind, id, PushOperation::Update, Some(payload))
    }

    pub fn delete(kind: impl Into<ResourceKind>, id: impl Into<ResourceId>) -> Self {
        Self::new(kind, id, PushOperation::Delete, None)
    }

    fn new(
        kind: impl Into<ResourceKind>,
        id: impl Into<ResourceId>,
        operation: PushOperation,
        payload: Option<T>,
    ) -> Self {
        Self {
            kind: kind.into(),
            resource_id: id.into(),
            operation,
            delivery_id: None,
            payload,
        }
    }

    #[must_use]
    pub fn with_delivery_id(mut self, delivery_id: impl Into<String>) -> Self {
        self.delivery_id = Some(delivery_id.into());
        self
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_without_payload_or_delivery_id() {
        let ev: PushEvent<serde_json::Value> =
            serde_json::from_str(r#"{"kind":"vm","resource_id":12,"operation":"delete"}"#).unwrap();
        assert_eq!(ev.operation, PushOperation::Delete);
        assert_eq!(ev.resource_id, ResourceId::Numeric(12));
        assert!(ev.payload.is_none());
        assert!(ev.delivery_id.is_none());
    }

    #[test]
    fn operation_display_is_snake_case() {
        assert_eq!(PushOperation::Update.to_string(), "update");
        assert_eq!("create".parse::<PushOperation>().unwrap(), PushOperation::Create);
    }
}
