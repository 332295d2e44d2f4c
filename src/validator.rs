//! Message validation.
//!
//! Every inbound message is checked against a per-type rule set before it
//! is allowed anywhere near the store: required payload fields, and
//! referential presence (`found_in`) or absence (`not_found_in`) against
//! the authoritative collection. Validation is synchronous and
//! side-effect-free; it collects every violated rule so a rejection
//! carries the whole diagnosis, not just the first failure.

use serde_json::{Map, Value};

use crate::entity::EntityKind;
use crate::error::{Rejection, ValidationError};
use crate::message::{Message, MessageKind};
use crate::store::SyncStore;

/// A referential integrity rule: which collection to search and which
/// payload fields must (all) match an element of it.
#[derive(Debug, Clone, Copy)]
pub struct IntegrityRule {
    /// Collection to search.
    pub kind: EntityKind,
    /// Fields that must match simultaneously, by strict value equality.
    pub fields: &'static [&'static str],
}

/// The rule set for one message type.
#[derive(Debug, Clone, Copy, Default)]
pub struct MessageRule {
    /// Fields that must be present as own keys of the payload.
    pub required_fields: &'static [&'static str],
    /// At least one element of the collection must match (update/remove
    /// must target an existing entity — no silent creation via update).
    pub found_in: Option<IntegrityRule>,
    /// No element of the collection may match (add must not duplicate an
    /// existing entity — no silent overwrite via add).
    pub not_found_in: Option<IntegrityRule>,
}

/// The rule set for a message type.
#[must_use]
pub fn rule_for(kind: MessageKind) -> MessageRule {
    const EVENT_KEY: &[&str] = &["id"];
    const MARKET_KEY: &[&str] = &["id", "eventId"];
    const CONTRACT_KEY: &[&str] = &["id", "eventId", "marketId"];

    let found = |kind, fields| MessageRule {
        required_fields: fields,
        found_in: Some(IntegrityRule { kind, fields }),
        not_found_in: None,
    };
    let not_found = |kind, required, fields| MessageRule {
        required_fields: required,
        found_in: None,
        not_found_in: Some(IntegrityRule { kind, fields }),
    };

    match kind {
        MessageKind::AddEvent => not_found(
            EntityKind::Event,
            &["id", "homeTeam", "awayTeam"] as &[&str],
            EVENT_KEY,
        ),
        MessageKind::UpdateEvent | MessageKind::RemoveEvent => found(EntityKind::Event, EVENT_KEY),
        MessageKind::AddMarket => not_found(
            EntityKind::Market,
            &["id", "eventId", "name"] as &[&str],
            MARKET_KEY,
        ),
        MessageKind::UpdateMarket | MessageKind::RemoveMarket => {
            found(EntityKind::Market, MARKET_KEY)
        }
        MessageKind::AddContract => not_found(
            EntityKind::Contract,
            &["id", "eventId", "marketId", "name"] as &[&str],
            CONTRACT_KEY,
        ),
        MessageKind::UpdateContract | MessageKind::RemoveContract => {
            found(EntityKind::Contract, CONTRACT_KEY)
        }
        // The hub rewrites set-contract before validation; the rule here
        // only guards direct use.
        MessageKind::SetContract => MessageRule {
            required_fields: &["id", "eventId", "marketId", "name"],
            ..MessageRule::default()
        },
        MessageKind::ClearData => MessageRule::default(),
    }
}

/// True if `candidate` matches `data` on every listed field.
///
/// Equality is strict JSON value equality per field; a field absent from
/// both sides counts as equal.
fn matches_all(candidate: &Map<String, Value>, data: &Map<String, Value>, fields: &[&str]) -> bool {
    fields.iter().all(|f| candidate.get(*f) == data.get(*f))
}

/// Stateless rule engine validating messages against the store.
#[derive(Debug, Clone, Copy)]
pub struct MessageValidator<'a> {
    store: &'a SyncStore,
}

impl<'a> MessageValidator<'a> {
    /// A validator reading its reference collections from `store`.
    #[must_use]
    pub const fn new(store: &'a SyncStore) -> Self {
        Self { store }
    }

    /// Validates `message`, returning its resolved kind on success.
    ///
    /// On failure the returned [`Rejection`] lists every violated rule:
    /// all missing required fields, plus any referential violation.
    pub fn validate(&self, message: &Message) -> Result<MessageKind, Rejection> {
        let kind = match message.message_kind() {
            Ok(kind) => kind,
            Err(err) => return Err(Rejection::new(message.clone(), vec![err])),
        };

        let rule = rule_for(kind);
        let data = &message.data;
        let mut errors = Vec::new();

        let missing: Vec<String> = rule
            .required_fields
            .iter()
            .filter(|f| !data.contains_key(**f))
            .map(ToString::to_string)
            .collect();
        if !missing.is_empty() {
            errors.push(ValidationError::MissingFields { fields: missing });
        }

        let subject_id = || message.data_id().unwrap_or("<missing id>").to_string();

        if let Some(integrity) = rule.found_in {
            let collection = self.store.collection_json(integrity.kind);
            if !collection
                .iter()
                .any(|candidate| matches_all(candidate, data, integrity.fields))
            {
                errors.push(ValidationError::NotFound {
                    kind: integrity.kind,
                    id: subject_id(),
                });
            }
        }

        if let Some(integrity) = rule.not_found_in {
            let collection = self.store.collection_json(integrity.kind);
            if collection
                .iter()
                .any(|candidate| matches_all(candidate, data, integrity.fields))
            {
                errors.push(ValidationError::AlreadyExists {
                    kind: integrity.kind,
                    id: subject_id(),
                });
            }
        }

        if errors.is_empty() {
            Ok(kind)
        } else {
            Err(Rejection::new(message.clone(), errors))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryBackend;
    use serde_json::json;
    use std::sync::Arc;

    fn store_with_event() -> SyncStore {
        let mut store = SyncStore::open(Arc::new(MemoryBackend::new()));
        let Value::Object(data) = json!({ "id": "a-v-b", "homeTeam": "A", "awayTeam": "B" })
        else {
            unreachable!()
        };
        store.upsert(EntityKind::Event, &data).unwrap();
        store
    }

    fn message(value: Value) -> Message {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn unknown_type_rejected() {
        let store = store_with_event();
        let rejection = MessageValidator::new(&store)
            .validate(&message(json!({ "type": "frobnicate", "data": {} })))
            .unwrap_err();
        assert!(rejection.any(|e| matches!(e, ValidationError::UnknownType { .. })));
    }

    #[test]
    fn all_missing_fields_are_listed() {
        let store = store_with_event();
        let rejection = MessageValidator::new(&store)
            .validate(&message(json!({
                "type": "add-market",
                "data": { "eventId": "a-v-b" },
            })))
            .unwrap_err();

        let Some(ValidationError::MissingFields { fields }) = rejection
            .errors
            .iter()
            .find(|e| matches!(e, ValidationError::MissingFields { .. }))
        else {
            panic!("expected missing fields, got {:?}", rejection.errors);
        };
        assert_eq!(fields, &["id", "name"]);
    }

    #[test]
    fn update_of_unknown_entity_is_not_found() {
        let store = store_with_event();
        let rejection = MessageValidator::new(&store)
            .validate(&message(json!({
                "type": "update-event",
                "data": { "id": "nobody-v-nothing" },
            })))
            .unwrap_err();
        assert!(rejection.any(|e| matches!(e, ValidationError::NotFound { .. })));
    }

    #[test]
    fn duplicate_add_is_already_exists() {
        let store = store_with_event();
        let rejection = MessageValidator::new(&store)
            .validate(&message(json!({
                "type": "add-event",
                "data": { "id": "a-v-b", "homeTeam": "A", "awayTeam": "B" },
            })))
            .unwrap_err();
        assert!(rejection.any(|e| matches!(e, ValidationError::AlreadyExists { .. })));
    }

    #[test]
    fn composite_key_must_match_all_fields() {
        let mut store = store_with_event();
        let Value::Object(market) =
            json!({ "id": "total-goals", "eventId": "a-v-b", "name": "Total Goals" })
        else {
            unreachable!()
        };
        store.upsert(EntityKind::Market, &market).unwrap();

        // Same market id, different event: not a duplicate.
        let ok = MessageValidator::new(&store).validate(&message(json!({
            "type": "add-market",
            "data": { "id": "total-goals", "eventId": "c-v-d", "name": "Total Goals" },
        })));
        assert!(ok.is_ok());

        // Update addressing only half the composite key: not found.
        let rejection = MessageValidator::new(&store)
            .validate(&message(json!({
                "type": "update-market",
                "data": { "id": "total-goals", "eventId": "c-v-d" },
            })))
            .unwrap_err();
        assert!(rejection.any(|e| matches!(e, ValidationError::NotFound { .. })));
    }

    #[test]
    fn clear_data_needs_nothing() {
        let store = store_with_event();
        let kind = MessageValidator::new(&store)
            .validate(&message(json!({ "type": "clear-data" })))
            .unwrap();
        assert_eq!(kind, MessageKind::ClearData);
    }

    #[test]
    fn validation_is_side_effect_free() {
        let store = store_with_event();
        let before = store.len(EntityKind::Event);
        let _ = MessageValidator::new(&store).validate(&message(json!({
            "type": "add-event",
            "data": { "id": "a-v-b", "homeTeam": "A", "awayTeam": "B" },
        })));
        assert_eq!(store.len(EntityKind::Event), before);
    }
}
