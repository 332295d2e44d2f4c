//! Monitor dispatcher worker.
//!
//! Owns the per-contract state machines and drives them from two channels:
//! raw change notifications from the watched source, and control messages
//! (thresholds, mute, enable) from the user surface. Emissions leave on a
//! bounded channel as synchronization messages and never block the worker.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use tracing::debug;

use crate::entity::ContractKey;
use crate::error::{ChannelError, SyncError, SyncResult};
use crate::message::Message;

use super::source::{ChangeNotification, ChangeSource};
use super::state::{ContractMonitor, StatusChange, Thresholds};

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct ThresholdMonitorConfig {
    /// Max queued control messages before `control` blocks.
    pub control_queue_capacity: usize,
    /// Emission buffer capacity; overflow drops, never blocks the worker.
    pub emission_queue_capacity: usize,
}

impl Default for ThresholdMonitorConfig {
    fn default() -> Self {
        Self {
            control_queue_capacity: 1024,
            emission_queue_capacity: 4096,
        }
    }
}

/// User-surface control operations, addressed by contract key.
///
/// Controls for a contract that has not appeared yet are remembered and
/// applied on first appearance, so configuration and observation order
/// does not matter.
#[derive(Debug, Clone, PartialEq)]
pub enum MonitorControl {
    /// Reconfigure the threshold band.
    SetThresholds {
        #[allow(missing_docs)]
        key: ContractKey,
        #[allow(missing_docs)]
        lower: Option<f64>,
        #[allow(missing_docs)]
        upper: Option<f64>,
    },
    /// Mute or unmute alerts. Emissions continue either way.
    SetMuted {
        #[allow(missing_docs)]
        key: ContractKey,
        #[allow(missing_docs)]
        muted: bool,
    },
    /// Enable or disable monitoring outright.
    SetEnabled {
        #[allow(missing_docs)]
        key: ContractKey,
        #[allow(missing_docs)]
        enabled: bool,
    },
}

/// Side channel for audible/visible alerts on warning entry.
pub trait AlertSink: Send + Sync {
    /// A contract just entered warning and is not muted.
    fn alert(&self, key: &ContractKey, name: &str, value: f64);
}

/// Sink that swallows alerts. For embedders that only want emissions.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopAlert;

impl AlertSink for NoopAlert {
    fn alert(&self, _key: &ContractKey, _name: &str, _value: f64) {}
}

#[derive(Debug)]
struct ControlMsg {
    op: MonitorControl,
    // Ack lets callers sequence control against subsequent notifications.
    reply: Sender<()>,
}

/// Pending configuration for a contract that has not appeared yet.
#[derive(Debug, Clone, Default)]
struct PendingConfig {
    thresholds: Option<(Option<f64>, Option<f64>)>,
    muted: Option<bool>,
    enabled: Option<bool>,
}

/// Threshold monitor: a dedicated worker thread owning one state machine
/// per tracked contract.
///
/// Notifications and controls are multiplexed with `select!`; emissions
/// use non-blocking `try_send` so a slow consumer can never stall the
/// worker, only lose emissions (counted).
#[derive(Debug)]
pub struct ThresholdMonitor {
    control_tx: Sender<ControlMsg>,
    emissions_rx: Receiver<Message>,
    dropped_emissions: Arc<AtomicU64>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl ThresholdMonitor {
    /// Spawns the worker consuming `source` and alerting through `sink`.
    #[must_use]
    pub fn new(
        cfg: ThresholdMonitorConfig,
        source: &dyn ChangeSource,
        sink: Arc<dyn AlertSink>,
    ) -> Self {
        let (control_tx, control_rx) = bounded::<ControlMsg>(cfg.control_queue_capacity.max(1));
        let (emissions_tx, emissions_rx) =
            bounded::<Message>(cfg.emission_queue_capacity.max(1));

        let dropped_emissions = Arc::new(AtomicU64::new(0));

        let notifications_rx = source.notifications();
        let thread_dropped = Arc::clone(&dropped_emissions);
        let join = thread::Builder::new()
            .name("oddsync-monitor".to_string())
            .spawn(move || {
                worker_loop(notifications_rx, control_rx, emissions_tx, sink, thread_dropped);
            })
            .expect("failed to spawn oddsync monitor worker");

        Self {
            control_tx,
            emissions_rx,
            dropped_emissions,
            join: Mutex::new(Some(join)),
        }
    }

    /// Applies a control operation, blocking until the worker has taken it.
    pub fn control(&self, op: MonitorControl) -> SyncResult<()> {
        let (reply_tx, reply_rx) = bounded::<()>(1);
        self.control_tx
            .send(ControlMsg {
                op,
                reply: reply_tx,
            })
            .map_err(|_| {
                SyncError::Channel(ChannelError::Disconnected {
                    path: "monitor_control".to_string(),
                })
            })?;
        reply_rx.recv().map_err(|_| {
            SyncError::Channel(ChannelError::Disconnected {
                path: "monitor_control".to_string(),
            })
        })
    }

    /// The emission stream: `set-contract` and `remove-contract` messages.
    #[must_use]
    pub fn emissions(&self) -> Receiver<Message> {
        self.emissions_rx.clone()
    }

    /// Emissions lost to a full or closed consumer.
    #[must_use]
    pub fn dropped_emissions(&self) -> u64 {
        self.dropped_emissions.load(Ordering::Relaxed)
    }
}

impl Drop for ThresholdMonitor {
    fn drop(&mut self) {
        // Close the control channel so the worker can terminate once the
        // notification source also closes.
        let (dummy_control_tx, _) = bounded::<ControlMsg>(1);
        let old_control = std::mem::replace(&mut self.control_tx, dummy_control_tx);
        drop(old_control);

        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                // Detach rather than join: the notification source may
                // outlive this handle, and joining would deadlock on a
                // worker still blocked in select.
                drop(handle);
            }
        }
    }
}

struct Worker {
    monitors: HashMap<ContractKey, ContractMonitor>,
    pending: HashMap<ContractKey, PendingConfig>,
    emissions_tx: Sender<Message>,
    sink: Arc<dyn AlertSink>,
    dropped: Arc<AtomicU64>,
}

impl Worker {
    fn emit(&self, message: Message) {
        match self.emissions_tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    fn emit_change(&self, change: StatusChange) {
        if change.alert {
            self.sink.alert(&change.key, &change.name, change.value);
        }
        self.emit(Message::set_contract(
            &change.key,
            &change.name,
            change.value,
            change.status,
        ));
    }

    fn handle_notification(&mut self, notification: ChangeNotification) {
        match notification {
            ChangeNotification::ContractAppeared { key, name } => {
                let mut monitor = ContractMonitor::new(key.clone(), name);
                if let Some(cfg) = self.pending.remove(&key) {
                    if let Some(muted) = cfg.muted {
                        monitor.set_muted(muted);
                    }
                    if let Some((lower, upper)) = cfg.thresholds {
                        let _ = monitor.set_thresholds(lower, upper);
                    }
                    if let Some(enabled) = cfg.enabled {
                        let _ = monitor.set_enabled(enabled);
                    }
                }
                // Re-appearance replaces any terminal machine.
                self.monitors.insert(key, monitor);
            }
            ChangeNotification::ValueChanged { key, raw } => {
                // Unknown key: the contract was never observed appearing.
                if let Some(monitor) = self.monitors.get_mut(&key) {
                    if let Some(change) = monitor.value_changed(&raw) {
                        self.emit_change(change);
                    }
                }
            }
            ChangeNotification::ContractRemoved { key } => {
                if let Some(mut monitor) = self.monitors.remove(&key) {
                    if monitor.remove() {
                        self.emit(Message::remove_contract(&key));
                    }
                }
            }
            ChangeNotification::MarketRemoved { key } => {
                self.teardown(|k| k.market_id == key.id && k.event_id == key.event_id);
            }
            ChangeNotification::EventFinished { event_id } => {
                debug!(event_id, "event finished, tearing down its contracts");
                self.teardown(|k| k.event_id == event_id);
            }
        }
    }

    /// Removes every monitor matching `predicate`, emitting a
    /// `remove-contract` per torn-down machine.
    fn teardown(&mut self, predicate: impl Fn(&ContractKey) -> bool) {
        let keys: Vec<ContractKey> = self
            .monitors
            .keys()
            .filter(|k| predicate(k))
            .cloned()
            .collect();
        for key in keys {
            if let Some(mut monitor) = self.monitors.remove(&key) {
                if monitor.remove() {
                    self.emit(Message::remove_contract(&key));
                }
            }
        }
    }

    fn handle_control(&mut self, op: MonitorControl) {
        match op {
            MonitorControl::SetThresholds { key, lower, upper } => {
                if let Some(monitor) = self.monitors.get_mut(&key) {
                    if let Some(change) = monitor.set_thresholds(lower, upper) {
                        self.emit_change(change);
                    }
                } else {
                    self.pending.entry(key).or_default().thresholds = Some((lower, upper));
                }
            }
            MonitorControl::SetMuted { key, muted } => {
                if let Some(monitor) = self.monitors.get_mut(&key) {
                    monitor.set_muted(muted);
                } else {
                    self.pending.entry(key).or_default().muted = Some(muted);
                }
            }
            MonitorControl::SetEnabled { key, enabled } => {
                if let Some(monitor) = self.monitors.get_mut(&key) {
                    if let Some(change) = monitor.set_enabled(enabled) {
                        self.emit_change(change);
                    }
                } else {
                    self.pending.entry(key).or_default().enabled = Some(enabled);
                }
            }
        }
    }
}

fn worker_loop(
    notifications_rx: Receiver<ChangeNotification>,
    control_rx: Receiver<ControlMsg>,
    emissions_tx: Sender<Message>,
    sink: Arc<dyn AlertSink>,
    dropped: Arc<AtomicU64>,
) {
    let mut worker = Worker {
        monitors: HashMap::new(),
        pending: HashMap::new(),
        emissions_tx,
        sink,
        dropped,
    };

    let mut notifications_closed = false;
    let mut control_closed = false;

    loop {
        select! {
            recv(notifications_rx) -> msg => {
                match msg {
                    Ok(notification) => worker.handle_notification(notification),
                    Err(_) => notifications_closed = true,
                }
            }
            recv(control_rx) -> msg => {
                match msg {
                    Ok(ControlMsg { op, reply }) => {
                        worker.handle_control(op);
                        let _ = reply.send(());
                    }
                    Err(_) => control_closed = true,
                }
            }
        }

        if notifications_closed && control_closed {
            break;
        }
    }
}
