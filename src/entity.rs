//! Entity types for the synchronized betting hierarchy.
//!
//! Events, markets, and contracts form a strict two-level tree: a market
//! references its event, a contract references both its market and its
//! event. Identifiers are deterministic slugs derived from display text,
//! so the same matchup or market name always maps to the same id.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ValidationError;

/// Derives a deterministic entity id from display text.
///
/// Case-folded, space-to-hyphen. The same input always yields the same id,
/// which is what lets independent extraction contexts converge on one key
/// for the same matchup.
///
/// # Examples
///
/// ```
/// use oddsync::entity::slug_id;
///
/// assert_eq!(slug_id("Arsenal v Spurs"), "arsenal-v-spurs");
/// assert_eq!(slug_id("  Match Odds "), "match-odds");
/// ```
#[must_use]
pub fn slug_id(text: &str) -> String {
    text.trim().to_lowercase().replace(' ', "-")
}

/// The three entity kinds of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    /// Root of the tree: one sporting event.
    Event,
    /// A market within an event.
    Market,
    /// A tradable contract within a market.
    Contract,
}

impl EntityKind {
    /// The lowercase name used in error messages and the durable layout.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Event => "event",
            Self::Market => "market",
            Self::Contract => "contract",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Derived monitoring status of a contract.
///
/// Never set directly by a client: `warning` means the sell value crossed a
/// configured threshold, `inactive` means monitoring is currently disabled
/// for the contract.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContractStatus {
    /// Monitoring disabled or not yet armed.
    #[default]
    Inactive,
    /// Monitored, value inside the threshold band.
    Active,
    /// Value at or beyond a threshold.
    Warning,
}

impl ContractStatus {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Active => "active",
            Self::Warning => "warning",
        }
    }
}

impl fmt::Display for ContractStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root entity: one sporting event, keyed by its slug id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    /// Deterministic slug id.
    pub id: String,
    /// Home team display name.
    pub home_team: String,
    /// Away team display name.
    pub away_team: String,
    /// Numeric id of the extraction channel that first created the event.
    #[serde(default)]
    pub origin_id: u64,
}

/// A market within an event, keyed by `(id, event_id)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Market {
    /// Deterministic slug id, derived from the market name.
    pub id: String,
    /// Id of the owning event.
    pub event_id: String,
    /// Market display name.
    pub name: String,
}

/// A contract within a market, keyed by `(id, market_id, event_id)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contract {
    /// Deterministic slug id, derived from the contract name.
    pub id: String,
    /// Id of the owning event.
    pub event_id: String,
    /// Id of the owning market.
    pub market_id: String,
    /// Contract display name.
    pub name: String,
    /// Last observed sell value.
    #[serde(default)]
    pub sell_value: f64,
    /// Derived monitoring status.
    #[serde(default)]
    pub status: ContractStatus,
}

/// Composite uniqueness key for a market.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MarketKey {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    pub event_id: String,
}

impl MarketKey {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(id: impl Into<String>, event_id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            event_id: event_id.into(),
        }
    }
}

/// Composite uniqueness key for a contract.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractKey {
    #[allow(missing_docs)]
    pub id: String,
    #[allow(missing_docs)]
    pub market_id: String,
    #[allow(missing_docs)]
    pub event_id: String,
}

impl ContractKey {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        market_id: impl Into<String>,
        event_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            market_id: market_id.into(),
            event_id: event_id.into(),
        }
    }
}

/// Uniqueness key for any entity kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityKey {
    /// Event id.
    Event(String),
    /// `(id, event_id)`.
    Market(MarketKey),
    /// `(id, market_id, event_id)`.
    Contract(ContractKey),
}

impl EntityKey {
    /// The kind this key addresses.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Event(_) => EntityKind::Event,
            Self::Market(_) => EntityKind::Market,
            Self::Contract(_) => EntityKind::Contract,
        }
    }

    /// Extracts the key for `kind` from loose message data.
    ///
    /// Returns `None` when a key field is absent or not a string.
    #[must_use]
    pub fn from_data(kind: EntityKind, data: &Map<String, Value>) -> Option<Self> {
        let field = |name: &str| data.get(name).and_then(Value::as_str).map(str::to_string);

        match kind {
            EntityKind::Event => Some(Self::Event(field("id")?)),
            EntityKind::Market => Some(Self::Market(MarketKey {
                id: field("id")?,
                event_id: field("eventId")?,
            })),
            EntityKind::Contract => Some(Self::Contract(ContractKey {
                id: field("id")?,
                market_id: field("marketId")?,
                event_id: field("eventId")?,
            })),
        }
    }
}

/// Any entity record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Entity {
    #[allow(missing_docs)]
    Event(Event),
    #[allow(missing_docs)]
    Market(Market),
    #[allow(missing_docs)]
    Contract(Contract),
}

impl Entity {
    /// Decodes an entity of `kind` from loose message data.
    ///
    /// Absent optional fields take their defaults; a present field of the
    /// wrong JSON type is a [`ValidationError::InvalidShape`] failure.
    pub fn from_data(kind: EntityKind, data: &Map<String, Value>) -> Result<Self, ValidationError> {
        let value = Value::Object(data.clone());
        let shape_err = |e: serde_json::Error| ValidationError::InvalidShape {
            reason: format!("malformed {kind} data: {e}"),
        };

        Ok(match kind {
            EntityKind::Event => Self::Event(serde_json::from_value(value).map_err(shape_err)?),
            EntityKind::Market => Self::Market(serde_json::from_value(value).map_err(shape_err)?),
            EntityKind::Contract => {
                Self::Contract(serde_json::from_value(value).map_err(shape_err)?)
            }
        })
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        match self {
            Self::Event(_) => EntityKind::Event,
            Self::Market(_) => EntityKind::Market,
            Self::Contract(_) => EntityKind::Contract,
        }
    }

    /// The uniqueness key of this record.
    #[must_use]
    pub fn key(&self) -> EntityKey {
        match self {
            Self::Event(e) => EntityKey::Event(e.id.clone()),
            Self::Market(m) => EntityKey::Market(MarketKey::new(&m.id, &m.event_id)),
            Self::Contract(c) => {
                EntityKey::Contract(ContractKey::new(&c.id, &c.market_id, &c.event_id))
            }
        }
    }

    /// This record as a JSON object, for field-wise comparison and merge.
    #[must_use]
    pub fn to_json_map(&self) -> Map<String, Value> {
        match serde_json::to_value(self) {
            Ok(Value::Object(map)) => map,
            // Entities are plain structs; anything else is unreachable.
            _ => Map::new(),
        }
    }
}
