//! Synchronization message envelope.
//!
//! Every mutation travels as `{type, data}`: a kebab-case type string and a
//! loose JSON object. The envelope stays loosely typed on purpose: required
//! fields and referential integrity are enforced by the validator, not by
//! the deserializer, so a malformed message degrades to a structured
//! rejection instead of a decode failure.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::entity::{ContractKey, ContractStatus, EntityKind, MarketKey};
use crate::error::ValidationError;

/// Recognized message types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageKind {
    #[allow(missing_docs)]
    AddEvent,
    #[allow(missing_docs)]
    UpdateEvent,
    #[allow(missing_docs)]
    RemoveEvent,
    #[allow(missing_docs)]
    AddMarket,
    #[allow(missing_docs)]
    UpdateMarket,
    #[allow(missing_docs)]
    RemoveMarket,
    #[allow(missing_docs)]
    AddContract,
    #[allow(missing_docs)]
    UpdateContract,
    #[allow(missing_docs)]
    RemoveContract,
    /// Upsert emitted by the threshold monitor; the hub rewrites it to
    /// `add-contract` or `update-contract` before validation.
    SetContract,
    /// Empties all three collections unconditionally.
    ClearData,
}

impl MessageKind {
    /// The wire name of this type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AddEvent => "add-event",
            Self::UpdateEvent => "update-event",
            Self::RemoveEvent => "remove-event",
            Self::AddMarket => "add-market",
            Self::UpdateMarket => "update-market",
            Self::RemoveMarket => "remove-market",
            Self::AddContract => "add-contract",
            Self::UpdateContract => "update-contract",
            Self::RemoveContract => "remove-contract",
            Self::SetContract => "set-contract",
            Self::ClearData => "clear-data",
        }
    }

    /// Parses a wire type string.
    #[must_use]
    pub fn parse(kind: &str) -> Option<Self> {
        Some(match kind {
            "add-event" => Self::AddEvent,
            "update-event" => Self::UpdateEvent,
            "remove-event" => Self::RemoveEvent,
            "add-market" => Self::AddMarket,
            "update-market" => Self::UpdateMarket,
            "remove-market" => Self::RemoveMarket,
            "add-contract" => Self::AddContract,
            "update-contract" => Self::UpdateContract,
            "remove-contract" => Self::RemoveContract,
            "set-contract" => Self::SetContract,
            "clear-data" => Self::ClearData,
            _ => return None,
        })
    }

    /// The entity kind this type operates on, if any.
    #[must_use]
    pub const fn entity_kind(self) -> Option<EntityKind> {
        match self {
            Self::AddEvent | Self::UpdateEvent | Self::RemoveEvent => Some(EntityKind::Event),
            Self::AddMarket | Self::UpdateMarket | Self::RemoveMarket => Some(EntityKind::Market),
            Self::AddContract | Self::UpdateContract | Self::RemoveContract | Self::SetContract => {
                Some(EntityKind::Contract)
            }
            Self::ClearData => None,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The `{type, data}` message envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Wire type string. Unrecognized values fail validation with
    /// [`ValidationError::UnknownType`], never a decode error.
    #[serde(rename = "type")]
    pub kind: String,
    /// Loose payload object.
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl Message {
    /// Builds a message with a typed kind.
    #[must_use]
    pub fn new(kind: MessageKind, data: Map<String, Value>) -> Self {
        Self {
            kind: kind.as_str().to_string(),
            data,
        }
    }

    /// Resolves the wire type string to a known kind.
    pub fn message_kind(&self) -> Result<MessageKind, ValidationError> {
        MessageKind::parse(&self.kind).ok_or_else(|| ValidationError::UnknownType {
            kind: self.kind.clone(),
        })
    }

    /// The `id` field of the payload, when present as a string.
    #[must_use]
    pub fn data_id(&self) -> Option<&str> {
        self.data.get("id").and_then(Value::as_str)
    }

    /// `clear-data`: empty all collections.
    #[must_use]
    pub fn clear_data() -> Self {
        Self::new(MessageKind::ClearData, Map::new())
    }

    /// `set-contract` carrying a freshly derived value and status.
    #[must_use]
    pub fn set_contract(key: &ContractKey, name: &str, value: f64, status: ContractStatus) -> Self {
        let mut data = Map::new();
        data.insert("id".into(), Value::String(key.id.clone()));
        data.insert("eventId".into(), Value::String(key.event_id.clone()));
        data.insert("marketId".into(), Value::String(key.market_id.clone()));
        data.insert("name".into(), Value::String(name.to_string()));
        data.insert("sellValue".into(), serde_json::json!(value));
        data.insert("status".into(), Value::String(status.as_str().to_string()));
        Self::new(MessageKind::SetContract, data)
    }

    /// `remove-contract` for an entity that disappeared from the source.
    #[must_use]
    pub fn remove_contract(key: &ContractKey) -> Self {
        let mut data = Map::new();
        data.insert("id".into(), Value::String(key.id.clone()));
        data.insert("eventId".into(), Value::String(key.event_id.clone()));
        data.insert("marketId".into(), Value::String(key.market_id.clone()));
        Self::new(MessageKind::RemoveContract, data)
    }

    /// `remove-market`, cascading to the market's contracts.
    #[must_use]
    pub fn remove_market(key: &MarketKey) -> Self {
        let mut data = Map::new();
        data.insert("id".into(), Value::String(key.id.clone()));
        data.insert("eventId".into(), Value::String(key.event_id.clone()));
        Self::new(MessageKind::RemoveMarket, data)
    }
}
