//! End-to-end synchronization scenarios across hub and service.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use oddsync::{
    Applied, Entity, EntityKind, MemoryBackend, Message, SyncHub, SyncService, SyncServiceConfig,
    ValidationError,
};

fn msg(value: serde_json::Value) -> Message {
    serde_json::from_value(value).unwrap()
}

fn add_event(id: &str, home: &str, away: &str) -> Message {
    msg(json!({
        "type": "add-event",
        "data": { "id": id, "homeTeam": home, "awayTeam": away },
    }))
}

fn add_market(id: &str, event_id: &str, name: &str) -> Message {
    msg(json!({
        "type": "add-market",
        "data": { "id": id, "eventId": event_id, "name": name },
    }))
}

fn add_contract(id: &str, event_id: &str, market_id: &str, name: &str) -> Message {
    msg(json!({
        "type": "add-contract",
        "data": { "id": id, "eventId": event_id, "marketId": market_id, "name": name },
    }))
}

fn seeded_hub() -> (SyncHub, oddsync::ChannelId) {
    let mut hub = SyncHub::open(Arc::new(MemoryBackend::new()));
    let (channel, _rx) = hub.connect_extraction(1);

    for m in [
        add_event("a-v-b", "A", "B"),
        add_event("c-v-d", "C", "D"),
        add_market("total-goals", "a-v-b", "Total Goals"),
        add_market("winner", "a-v-b", "Winner"),
        add_market("total-goals", "c-v-d", "Total Goals"),
        add_contract("over-2.5", "a-v-b", "total-goals", "Over 2.5"),
        add_contract("under-2.5", "a-v-b", "total-goals", "Under 2.5"),
        add_contract("home", "a-v-b", "winner", "Home"),
        add_contract("over-2.5", "c-v-d", "total-goals", "Over 2.5"),
    ] {
        hub.handle_message(channel, m).unwrap();
    }
    (hub, channel)
}

#[test]
fn duplicate_add_rejected_and_store_unchanged() {
    let (mut hub, channel) = seeded_hub();
    let before = hub.store().len(EntityKind::Event);

    let err = hub
        .handle_message(channel, add_event("a-v-b", "A", "B"))
        .unwrap_err();
    let oddsync::SyncError::Rejected(rejection) = err else {
        panic!("expected rejection");
    };
    assert!(rejection.any(|e| matches!(e, ValidationError::AlreadyExists { .. })));
    assert_eq!(hub.store().len(EntityKind::Event), before);
}

#[test]
fn update_of_nonexistent_entity_is_not_found() {
    let (mut hub, channel) = seeded_hub();

    let err = hub
        .handle_message(
            channel,
            msg(json!({
                "type": "update-contract",
                "data": {
                    "id": "ghost", "eventId": "a-v-b", "marketId": "total-goals",
                    "sellValue": 10.0,
                },
            })),
        )
        .unwrap_err();
    let oddsync::SyncError::Rejected(rejection) = err else {
        panic!("expected rejection");
    };
    assert!(rejection.any(|e| matches!(e, ValidationError::NotFound { .. })));
}

#[test]
fn event_removal_cascades_to_descendants_only() {
    let (mut hub, channel) = seeded_hub();

    let applied = hub
        .handle_message(
            channel,
            msg(json!({ "type": "remove-event", "data": { "id": "a-v-b" } })),
        )
        .unwrap();
    assert!(matches!(applied, Applied::Removed(_)));

    let store = hub.store();
    assert_eq!(store.len(EntityKind::Event), 1);
    // Only c-v-d's market and contract survive, including the ones sharing
    // slug ids with the removed event's descendants.
    assert_eq!(store.len(EntityKind::Market), 1);
    assert_eq!(store.len(EntityKind::Contract), 1);
    assert!(store.markets().all(|m| m.event_id == "c-v-d"));
    assert!(store.contracts().all(|c| c.event_id == "c-v-d"));
}

#[test]
fn market_removal_requires_full_composite_key() {
    let (mut hub, channel) = seeded_hub();

    hub.handle_message(
        channel,
        msg(json!({
            "type": "remove-market",
            "data": { "id": "total-goals", "eventId": "a-v-b" },
        })),
    )
    .unwrap();

    let store = hub.store();
    // The same-slug market under the other event is untouched.
    assert!(store
        .markets()
        .any(|m| m.id == "total-goals" && m.event_id == "c-v-d"));
    assert!(!store
        .markets()
        .any(|m| m.id == "total-goals" && m.event_id == "a-v-b"));
    // Its contracts went with it; the sibling market's contract stayed.
    assert!(store
        .contracts()
        .all(|c| !(c.market_id == "total-goals" && c.event_id == "a-v-b")));
    assert!(store.contracts().any(|c| c.market_id == "winner"));
}

#[test]
fn clear_data_then_mutations_are_not_found() {
    let (mut hub, channel) = seeded_hub();

    hub.handle_message(channel, msg(json!({ "type": "clear-data" })))
        .unwrap();
    assert!(hub.store().is_empty());

    let err = hub
        .handle_message(
            channel,
            msg(json!({ "type": "update-event", "data": { "id": "a-v-b" } })),
        )
        .unwrap_err();
    assert!(err.is_validation());

    let err = hub
        .handle_message(
            channel,
            msg(json!({ "type": "remove-event", "data": { "id": "a-v-b" } })),
        )
        .unwrap_err();
    assert!(err.is_validation());

    // Re-adding after clear succeeds.
    hub.handle_message(channel, add_event("a-v-b", "A", "B"))
        .unwrap();
}

#[test]
fn racing_adds_accept_exactly_one() {
    let mut hub = SyncHub::open(Arc::new(MemoryBackend::new()));
    let (first, _rx_a) = hub.connect_extraction(1);
    let (second, _rx_b) = hub.connect_extraction(2);
    hub.handle_message(first, add_event("a-v-b", "A", "B"))
        .unwrap();

    let market = add_market("total-goals", "a-v-b", "Total Goals");
    hub.handle_message(first, market.clone()).unwrap();
    let err = hub.handle_message(second, market).unwrap_err();
    let oddsync::SyncError::Rejected(rejection) = err else {
        panic!("expected rejection");
    };
    assert!(rejection.any(|e| matches!(e, ValidationError::AlreadyExists { .. })));
    assert_eq!(hub.store().len(EntityKind::Market), 1);
}

#[test]
fn update_merges_fields_instead_of_replacing() {
    let (mut hub, channel) = seeded_hub();

    hub.handle_message(
        channel,
        msg(json!({
            "type": "update-contract",
            "data": {
                "id": "over-2.5", "eventId": "a-v-b", "marketId": "total-goals",
                "sellValue": 42.0,
            },
        })),
    )
    .unwrap();

    let contract = hub
        .store()
        .contracts()
        .find(|c| c.id == "over-2.5" && c.event_id == "a-v-b")
        .cloned()
        .unwrap();
    // Fields absent from the update keep their stored values.
    assert_eq!(contract.name, "Over 2.5");
    assert_eq!(contract.sell_value, 42.0);
}

#[test]
fn service_relays_between_contexts() {
    let service = SyncService::new(
        SyncServiceConfig::default(),
        Arc::new(MemoryBackend::new()),
    );
    let extraction = service.connect_extraction(7).unwrap();
    let sibling = service.connect_extraction(8).unwrap();
    let display = service.connect_observer(true).unwrap();

    extraction.send(add_event("a-v-b", "A", "B")).unwrap();

    let echoed = display.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(echoed.kind, "add-event");
    assert_eq!(echoed.data["originId"], json!(7));

    // The other extraction context hears it too; the origin does not.
    let relayed = sibling
        .echoes()
        .recv_timeout(Duration::from_secs(2))
        .unwrap();
    assert_eq!(relayed.data["id"].as_str(), Some("a-v-b"));
    assert!(extraction.echoes().try_recv().is_err());
}

#[test]
fn service_swallows_rejections_without_stalling() {
    let service = SyncService::new(
        SyncServiceConfig::default(),
        Arc::new(MemoryBackend::new()),
    );
    let extraction = service.connect_extraction(1).unwrap();
    let display = service.connect_observer(true).unwrap();

    // Rejected: nothing to update yet.
    extraction
        .send(msg(json!({ "type": "update-event", "data": { "id": "a-v-b" } })))
        .unwrap();
    // Accepted afterwards.
    extraction.send(add_event("a-v-b", "A", "B")).unwrap();

    let echoed = display.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(echoed.kind, "add-event");
}

#[test]
fn display_observer_sees_full_entity_payloads() {
    let service = SyncService::new(
        SyncServiceConfig::default(),
        Arc::new(MemoryBackend::new()),
    );
    let extraction = service.connect_extraction(3).unwrap();
    let display = service.connect_observer(true).unwrap();

    extraction.send(add_event("a-v-b", "A", "B")).unwrap();
    extraction
        .send(add_market("total-goals", "a-v-b", "Total Goals"))
        .unwrap();
    extraction
        .send(add_contract("over-2.5", "a-v-b", "total-goals", "Over 2.5"))
        .unwrap();

    let kinds: Vec<String> = (0..3)
        .map(|_| display.recv_timeout(Duration::from_secs(2)).unwrap().kind)
        .collect();
    assert_eq!(kinds, ["add-event", "add-market", "add-contract"]);
}

#[test]
fn entity_payloads_decode_to_typed_records() {
    let (hub, _channel) = seeded_hub();
    let event = hub
        .store()
        .events()
        .find(|e| e.id == "a-v-b")
        .cloned()
        .unwrap();
    assert_eq!(
        Entity::Event(event).to_json_map()["homeTeam"],
        json!("A")
    );
}
