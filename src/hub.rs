//! Synchronization hub and service worker.
//!
//! [`SyncHub`] is the synchronous core: it owns the store and the
//! broadcaster, stamps extraction-channel provenance onto new events,
//! validates every inbound message, applies the accepted ones, and echoes
//! them to every other attached channel. [`SyncService`] wraps the hub in
//! a dedicated worker thread with channel-based handles, so extraction
//! and observer contexts interact without sharing locks.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{bounded, select, Receiver, Sender, TrySendError};
use serde_json::Value;
use tracing::{debug, warn};

use crate::broadcast::{ChannelId, SyncBroadcaster};
use crate::entity::{Entity, EntityKey, EntityKind};
use crate::error::{ChannelError, Rejection, SyncError, SyncResult, ValidationError};
use crate::message::{Message, MessageKind};
use crate::storage::SnapshotBackend;
use crate::store::SyncStore;
use crate::validator::MessageValidator;

/// What an attached channel is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionKind {
    /// A source context that extracts mutations from a live document.
    /// `origin_id` is stamped onto every event it creates.
    Extraction {
        #[allow(missing_docs)]
        origin_id: u64,
    },
    /// A passive consumer of accepted messages.
    Observer,
    /// The distinguished presentation surface.
    Display,
}

/// Outcome of an accepted message.
#[derive(Debug, Clone, PartialEq)]
pub enum Applied {
    /// An entity was created or merged.
    Upserted(Entity),
    /// An entity (and its dependents, for events and markets) was removed.
    Removed(EntityKey),
    /// All collections were emptied.
    Cleared,
}

/// The synchronous coordination core.
#[derive(Debug)]
pub struct SyncHub {
    store: SyncStore,
    broadcaster: SyncBroadcaster,
    connections: HashMap<ChannelId, ConnectionKind>,
    observer_capacity: usize,
}

impl SyncHub {
    /// Default per-observer echo buffer capacity.
    pub const DEFAULT_OBSERVER_CAPACITY: usize = 1024;

    /// A hub over a freshly loaded store.
    #[must_use]
    pub fn open(backend: Arc<dyn SnapshotBackend>) -> Self {
        Self {
            store: SyncStore::open(backend),
            broadcaster: SyncBroadcaster::new(),
            connections: HashMap::new(),
            observer_capacity: Self::DEFAULT_OBSERVER_CAPACITY,
        }
    }

    /// Overrides the per-observer echo buffer capacity.
    #[must_use]
    pub fn with_observer_capacity(mut self, capacity: usize) -> Self {
        self.observer_capacity = capacity.max(1);
        self
    }

    /// Attaches an extraction channel. Returns its identity and the echo
    /// stream carrying messages accepted from other channels.
    pub fn connect_extraction(&mut self, origin_id: u64) -> (ChannelId, Receiver<Message>) {
        self.connect(ConnectionKind::Extraction { origin_id }, false)
    }

    /// Attaches an observer; `display` marks it as the display surface.
    pub fn connect_observer(&mut self, display: bool) -> (ChannelId, Receiver<Message>) {
        let kind = if display {
            ConnectionKind::Display
        } else {
            ConnectionKind::Observer
        };
        self.connect(kind, display)
    }

    fn connect(&mut self, kind: ConnectionKind, display: bool) -> (ChannelId, Receiver<Message>) {
        let id = ChannelId::new();
        let (tx, rx) = bounded(self.observer_capacity);
        self.connections.insert(id, kind);
        self.broadcaster.attach(id, tx, display);
        debug!(%id, ?kind, "channel attached");
        (id, rx)
    }

    /// Detaches a channel. Its entities stay in the store.
    pub fn disconnect(&mut self, id: ChannelId) {
        self.connections.remove(&id);
        self.broadcaster.detach(id);
        debug!(%id, "channel detached");
    }

    /// Read access to the authoritative store.
    #[must_use]
    pub const fn store(&self) -> &SyncStore {
        &self.store
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn broadcaster(&self) -> &SyncBroadcaster {
        &self.broadcaster
    }

    /// Validates and applies one inbound message, then echoes it to every
    /// other attached channel.
    ///
    /// `set-contract` is rewritten to `add-contract` or `update-contract`
    /// by store presence before validation, so the monitor can upsert
    /// without tracking what the store already holds. Events created by an
    /// extraction channel get that channel's `originId` stamped into the
    /// payload. Rejected messages never mutate the store and are not
    /// echoed.
    pub fn handle_message(
        &mut self,
        channel: ChannelId,
        mut message: Message,
    ) -> SyncResult<Applied> {
        self.rewrite_set_contract(&mut message);
        self.stamp_origin(channel, &mut message);

        let kind = MessageValidator::new(&self.store)
            .validate(&message)
            .map_err(|rejection| {
                warn!(channel = %channel, %rejection, "message rejected");
                SyncError::Rejected(rejection)
            })?;

        let applied = self.apply(kind, &message).map_err(|err| match err {
            // Shape failures surfaced by the store are rejections too.
            SyncError::Validation(e) => {
                let rejection = Rejection::new(message.clone(), vec![e]);
                warn!(channel = %channel, %rejection, "message rejected");
                SyncError::Rejected(rejection)
            }
            other => other,
        })?;

        let delivered = self.broadcaster.broadcast(&message, Some(channel));
        debug!(channel = %channel, kind = %kind, delivered, "message applied");
        Ok(applied)
    }

    fn rewrite_set_contract(&self, message: &mut Message) {
        if message.message_kind() != Ok(MessageKind::SetContract) {
            return;
        }
        if let Some(key) = EntityKey::from_data(EntityKind::Contract, &message.data) {
            let kind = if self.store.contains(&key) {
                MessageKind::UpdateContract
            } else {
                MessageKind::AddContract
            };
            message.kind = kind.as_str().to_string();
        }
        // Without a full key the message stays set-contract and fails
        // validation on its required fields.
    }

    fn stamp_origin(&self, channel: ChannelId, message: &mut Message) {
        if message.message_kind() != Ok(MessageKind::AddEvent) {
            return;
        }
        if let Some(ConnectionKind::Extraction { origin_id }) = self.connections.get(&channel) {
            message
                .data
                .insert("originId".into(), Value::from(*origin_id));
        }
    }

    fn apply(&mut self, kind: MessageKind, message: &Message) -> SyncResult<Applied> {
        match kind {
            MessageKind::AddEvent
            | MessageKind::UpdateEvent
            | MessageKind::AddMarket
            | MessageKind::UpdateMarket
            | MessageKind::AddContract
            | MessageKind::UpdateContract
            | MessageKind::SetContract => {
                // entity_kind is Some for every non-clear kind.
                let entity_kind = kind.entity_kind().unwrap_or(EntityKind::Event);
                let entity = self.store.upsert(entity_kind, &message.data)?;
                Ok(Applied::Upserted(entity))
            }
            MessageKind::RemoveEvent | MessageKind::RemoveMarket | MessageKind::RemoveContract => {
                let entity_kind = kind.entity_kind().unwrap_or(EntityKind::Event);
                let key =
                    EntityKey::from_data(entity_kind, &message.data).ok_or_else(|| {
                        ValidationError::InvalidShape {
                            reason: format!("{entity_kind} removal is missing its key fields"),
                        }
                    })?;
                self.store.remove(&key);
                Ok(Applied::Removed(key))
            }
            MessageKind::ClearData => {
                self.store.clear();
                Ok(Applied::Cleared)
            }
        }
    }
}

#[allow(missing_docs)]
#[derive(Debug, Clone)]
pub struct SyncServiceConfig {
    /// Max queued inbound messages before extraction sends drop.
    pub inbound_queue_capacity: usize,
    /// Max queued connect/disconnect requests.
    pub control_queue_capacity: usize,
    /// Per-observer echo buffer capacity.
    pub observer_queue_capacity: usize,
}

impl Default for SyncServiceConfig {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: 4096,
            control_queue_capacity: 256,
            observer_queue_capacity: 1024,
        }
    }
}

#[derive(Debug)]
struct Inbound {
    channel: ChannelId,
    message: Message,
}

#[derive(Debug)]
enum ServiceControl {
    ConnectExtraction {
        origin_id: u64,
        reply: Sender<(ChannelId, Receiver<Message>)>,
    },
    ConnectObserver {
        display: bool,
        reply: Sender<(ChannelId, Receiver<Message>)>,
    },
    Disconnect {
        channel: ChannelId,
    },
}

/// A channel handle for an extraction context.
///
/// Sends are fire-and-forget: a full hub queue silently drops the message
/// (synchronization is best effort), a closed hub is an error.
#[derive(Debug)]
pub struct ExtractionHandle {
    channel: ChannelId,
    inbound_tx: Sender<Inbound>,
    echo_rx: Receiver<Message>,
    control_tx: Sender<ServiceControl>,
}

impl ExtractionHandle {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Enqueues a mutation for the hub.
    pub fn send(&self, message: Message) -> SyncResult<()> {
        match self.inbound_tx.try_send(Inbound {
            channel: self.channel,
            message,
        }) {
            Ok(()) | Err(TrySendError::Full(_)) => Ok(()),
            Err(TrySendError::Disconnected(_)) => {
                Err(SyncError::Channel(ChannelError::Disconnected {
                    path: "sync_inbound".to_string(),
                }))
            }
        }
    }

    /// Messages accepted from other channels.
    #[must_use]
    pub const fn echoes(&self) -> &Receiver<Message> {
        &self.echo_rx
    }
}

impl Drop for ExtractionHandle {
    fn drop(&mut self) {
        let _ = self.control_tx.try_send(ServiceControl::Disconnect {
            channel: self.channel,
        });
    }
}

/// A channel handle for an observer context.
#[derive(Debug)]
pub struct ObserverHandle {
    channel: ChannelId,
    echo_rx: Receiver<Message>,
    control_tx: Sender<ServiceControl>,
}

impl ObserverHandle {
    #[allow(missing_docs)]
    #[must_use]
    pub const fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Blocks for the next accepted message.
    pub fn recv(&self) -> SyncResult<Message> {
        self.echo_rx
            .recv()
            .map_err(|_| SyncError::Channel(ChannelError::Disconnected {
                path: "sync_echo".to_string(),
            }))
    }

    /// Bounded wait for the next accepted message.
    pub fn recv_timeout(&self, timeout: Duration) -> SyncResult<Message> {
        self.echo_rx.recv_timeout(timeout).map_err(|e| match e {
            crossbeam_channel::RecvTimeoutError::Timeout => {
                SyncError::Channel(ChannelError::Timeout {
                    duration_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
                })
            }
            crossbeam_channel::RecvTimeoutError::Disconnected => {
                SyncError::Channel(ChannelError::Disconnected {
                    path: "sync_echo".to_string(),
                })
            }
        })
    }

    /// Non-blocking poll for the next accepted message.
    #[must_use]
    pub fn try_recv(&self) -> Option<Message> {
        self.echo_rx.try_recv().ok()
    }
}

impl Drop for ObserverHandle {
    fn drop(&mut self) {
        let _ = self.control_tx.try_send(ServiceControl::Disconnect {
            channel: self.channel,
        });
    }
}

/// The hub behind a dedicated worker thread.
#[derive(Debug)]
pub struct SyncService {
    inbound_tx: Sender<Inbound>,
    control_tx: Sender<ServiceControl>,
    join: Mutex<Option<JoinHandle<()>>>,
}

impl SyncService {
    /// Spawns the worker owning a hub over `backend`.
    #[must_use]
    pub fn new(cfg: SyncServiceConfig, backend: Arc<dyn SnapshotBackend>) -> Self {
        let (inbound_tx, inbound_rx) = bounded::<Inbound>(cfg.inbound_queue_capacity.max(1));
        let (control_tx, control_rx) = bounded::<ServiceControl>(cfg.control_queue_capacity.max(1));

        let hub = SyncHub::open(backend).with_observer_capacity(cfg.observer_queue_capacity);
        let join = thread::Builder::new()
            .name("oddsync-hub".to_string())
            .spawn(move || worker_loop(hub, inbound_rx, control_rx))
            .expect("failed to spawn oddsync hub worker");

        Self {
            inbound_tx,
            control_tx,
            join: Mutex::new(Some(join)),
        }
    }

    /// Attaches an extraction channel.
    pub fn connect_extraction(&self, origin_id: u64) -> SyncResult<ExtractionHandle> {
        let (reply_tx, reply_rx) = bounded(1);
        self.request(ServiceControl::ConnectExtraction {
            origin_id,
            reply: reply_tx,
        })?;
        let (channel, echo_rx) = self.await_reply(reply_rx)?;
        Ok(ExtractionHandle {
            channel,
            inbound_tx: self.inbound_tx.clone(),
            echo_rx,
            control_tx: self.control_tx.clone(),
        })
    }

    /// Attaches an observer channel.
    pub fn connect_observer(&self, display: bool) -> SyncResult<ObserverHandle> {
        let (reply_tx, reply_rx) = bounded(1);
        self.request(ServiceControl::ConnectObserver {
            display,
            reply: reply_tx,
        })?;
        let (channel, echo_rx) = self.await_reply(reply_rx)?;
        Ok(ObserverHandle {
            channel,
            echo_rx,
            control_tx: self.control_tx.clone(),
        })
    }

    fn request(&self, control: ServiceControl) -> SyncResult<()> {
        self.control_tx.send(control).map_err(|_| {
            SyncError::Channel(ChannelError::Disconnected {
                path: "sync_control".to_string(),
            })
        })
    }

    fn await_reply(
        &self,
        reply_rx: Receiver<(ChannelId, Receiver<Message>)>,
    ) -> SyncResult<(ChannelId, Receiver<Message>)> {
        reply_rx.recv().map_err(|_| {
            SyncError::Channel(ChannelError::Disconnected {
                path: "sync_control".to_string(),
            })
        })
    }
}

impl Drop for SyncService {
    fn drop(&mut self) {
        // Close both channels so the worker can terminate. Handles may
        // outlive the service; the worker exits once the last sender is
        // gone, so detach instead of joining.
        let (dummy_inbound, _) = bounded::<Inbound>(1);
        drop(std::mem::replace(&mut self.inbound_tx, dummy_inbound));
        let (dummy_control, _) = bounded::<ServiceControl>(1);
        drop(std::mem::replace(&mut self.control_tx, dummy_control));

        if let Ok(mut guard) = self.join.lock() {
            if let Some(handle) = guard.take() {
                drop(handle);
            }
        }
    }
}

fn worker_loop(
    mut hub: SyncHub,
    inbound_rx: Receiver<Inbound>,
    control_rx: Receiver<ServiceControl>,
) {
    let mut inbound_closed = false;
    let mut control_closed = false;

    loop {
        select! {
            recv(inbound_rx) -> msg => {
                match msg {
                    Ok(Inbound { channel, message }) => {
                        // Rejections are already logged inside the hub.
                        let _ = hub.handle_message(channel, message);
                    }
                    Err(_) => inbound_closed = true,
                }
            }
            recv(control_rx) -> msg => {
                match msg {
                    Ok(ServiceControl::ConnectExtraction { origin_id, reply }) => {
                        let _ = reply.send(hub.connect_extraction(origin_id));
                    }
                    Ok(ServiceControl::ConnectObserver { display, reply }) => {
                        let _ = reply.send(hub.connect_observer(display));
                    }
                    Ok(ServiceControl::Disconnect { channel }) => {
                        hub.disconnect(channel);
                    }
                    Err(_) => control_closed = true,
                }
            }
        }

        if inbound_closed && control_closed {
            break;
        }
    }
}
