//! Monitor-to-hub pipeline: threshold emissions become store mutations.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{bounded, Receiver};
use serde_json::json;

use oddsync::{
    AlertSink, ChangeNotification, ChangeSource, ContractKey, ContractStatus, EntityKind,
    MarketKey, MemoryBackend, Message, MonitorControl, SyncHub, ThresholdMonitor,
    ThresholdMonitorConfig,
};

struct LiveSource(Receiver<ChangeNotification>);

impl ChangeSource for LiveSource {
    fn notifications(&self) -> Receiver<ChangeNotification> {
        self.0.clone()
    }
}

#[derive(Default)]
struct SpySink {
    alerts: Mutex<Vec<f64>>,
}

impl AlertSink for SpySink {
    fn alert(&self, _key: &ContractKey, _name: &str, value: f64) {
        self.alerts.lock().unwrap().push(value);
    }
}

fn contract_key() -> ContractKey {
    ContractKey::new("over-2.5", "total-goals", "a-v-b")
}

fn seeded_hub() -> (SyncHub, oddsync::ChannelId) {
    let mut hub = SyncHub::open(Arc::new(MemoryBackend::new()));
    let (channel, _rx) = hub.connect_extraction(1);
    for m in [
        json!({ "type": "add-event",
                "data": { "id": "a-v-b", "homeTeam": "A", "awayTeam": "B" } }),
        json!({ "type": "add-market",
                "data": { "id": "total-goals", "eventId": "a-v-b", "name": "Total Goals" } }),
    ] {
        hub.handle_message(channel, serde_json::from_value(m).unwrap())
            .unwrap();
    }
    (hub, channel)
}

fn drain_into_hub(
    emissions: &Receiver<Message>,
    hub: &mut SyncHub,
    channel: oddsync::ChannelId,
    count: usize,
) -> Vec<String> {
    (0..count)
        .map(|_| {
            let message = emissions
                .recv_timeout(Duration::from_secs(2))
                .expect("emission");
            let kind = message.kind.clone();
            hub.handle_message(channel, message).unwrap();
            kind
        })
        .collect()
}

#[test]
fn threshold_sequence_drives_store_status() {
    let (mut hub, channel) = seeded_hub();
    let (tx, rx) = bounded(64);
    let sink = Arc::new(SpySink::default());
    let monitor = ThresholdMonitor::new(
        ThresholdMonitorConfig::default(),
        &LiveSource(rx),
        Arc::clone(&sink) as Arc<dyn AlertSink>,
    );
    let emissions = monitor.emissions();

    tx.send(ChangeNotification::ContractAppeared {
        key: contract_key(),
        name: "Over 2.5".into(),
    })
    .unwrap();
    monitor
        .control(MonitorControl::SetThresholds {
            key: contract_key(),
            lower: Some(10.0),
            upper: Some(90.0),
        })
        .unwrap();

    for raw in ["50", "95", "95", "5", "50"] {
        tx.send(ChangeNotification::ValueChanged {
            key: contract_key(),
            raw: raw.into(),
        })
        .unwrap();
    }

    // Duplicate 95 is suppressed, so four emissions arrive.
    let kinds = drain_into_hub(&emissions, &mut hub, channel, 4);
    assert!(kinds.iter().all(|k| k == "set-contract"));

    let contract = hub.store().contracts().next().cloned().unwrap();
    assert_eq!(contract.sell_value, 50.0);
    assert_eq!(contract.status, ContractStatus::Active);

    // Exactly one alert, on first entry into warning.
    assert_eq!(*sink.alerts.lock().unwrap(), vec![95.0]);
    drop(tx);
}

#[test]
fn muted_contract_updates_store_without_alerting() {
    let (mut hub, channel) = seeded_hub();
    let (tx, rx) = bounded(64);
    let sink = Arc::new(SpySink::default());
    let monitor = ThresholdMonitor::new(
        ThresholdMonitorConfig::default(),
        &LiveSource(rx),
        Arc::clone(&sink) as Arc<dyn AlertSink>,
    );
    let emissions = monitor.emissions();

    tx.send(ChangeNotification::ContractAppeared {
        key: contract_key(),
        name: "Over 2.5".into(),
    })
    .unwrap();
    monitor
        .control(MonitorControl::SetThresholds {
            key: contract_key(),
            lower: None,
            upper: Some(90.0),
        })
        .unwrap();
    monitor
        .control(MonitorControl::SetMuted {
            key: contract_key(),
            muted: true,
        })
        .unwrap();

    tx.send(ChangeNotification::ValueChanged {
        key: contract_key(),
        raw: "95".into(),
    })
    .unwrap();

    drain_into_hub(&emissions, &mut hub, channel, 1);
    let contract = hub.store().contracts().next().cloned().unwrap();
    assert_eq!(contract.status, ContractStatus::Warning);
    assert!(sink.alerts.lock().unwrap().is_empty());
    drop(tx);
}

#[test]
fn event_teardown_removes_contract_from_store() {
    let (mut hub, channel) = seeded_hub();
    let (tx, rx) = bounded(64);
    let monitor = ThresholdMonitor::new(
        ThresholdMonitorConfig::default(),
        &LiveSource(rx),
        Arc::new(oddsync::NoopAlert),
    );
    let emissions = monitor.emissions();

    tx.send(ChangeNotification::ContractAppeared {
        key: contract_key(),
        name: "Over 2.5".into(),
    })
    .unwrap();
    monitor
        .control(MonitorControl::SetThresholds {
            key: contract_key(),
            lower: None,
            upper: Some(90.0),
        })
        .unwrap();
    tx.send(ChangeNotification::ValueChanged {
        key: contract_key(),
        raw: "50".into(),
    })
    .unwrap();
    tx.send(ChangeNotification::EventFinished {
        event_id: "a-v-b".into(),
    })
    .unwrap();

    let kinds = drain_into_hub(&emissions, &mut hub, channel, 2);
    assert_eq!(kinds, ["set-contract", "remove-contract"]);
    assert_eq!(hub.store().len(EntityKind::Contract), 0);
    // The event and market themselves stay; only monitored contracts are
    // torn down by the source.
    assert_eq!(hub.store().len(EntityKind::Event), 1);
    drop(tx);
}

#[test]
fn market_teardown_is_scoped_to_its_event() {
    let (tx, rx) = bounded(64);
    let monitor = ThresholdMonitor::new(
        ThresholdMonitorConfig::default(),
        &LiveSource(rx),
        Arc::new(oddsync::NoopAlert),
    );
    let emissions = monitor.emissions();

    let here = contract_key();
    let elsewhere = ContractKey::new("over-2.5", "total-goals", "c-v-d");
    for (key, name) in [(&here, "Over 2.5"), (&elsewhere, "Over 2.5")] {
        tx.send(ChangeNotification::ContractAppeared {
            key: key.clone(),
            name: name.into(),
        })
        .unwrap();
    }
    tx.send(ChangeNotification::MarketRemoved {
        key: MarketKey::new("total-goals", "a-v-b"),
    })
    .unwrap();
    drop(tx);

    let removal = emissions.recv_timeout(Duration::from_secs(2)).unwrap();
    assert_eq!(removal.kind, "remove-contract");
    assert_eq!(removal.data["eventId"].as_str(), Some("a-v-b"));
    assert!(emissions.recv_timeout(Duration::from_millis(200)).is_err());
}
