//! Best-effort fan-out of accepted messages.
//!
//! Every channel that successfully applied a mutation is echoed to every
//! other attached channel. Delivery is non-blocking: a slow or closed
//! observer loses messages (counted) but can never stall the hub. One
//! attached channel may be distinguished as the display surface; the hub
//! routes presentation-only traffic there.

use std::collections::HashMap;
use std::fmt;

use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use tracing::trace;
use uuid::Uuid;

use crate::message::Message;

/// Opaque identity of an attached channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(Uuid);

impl ChannelId {
    /// A fresh random identity.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ChannelId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fan-out registry for attached observer channels.
#[derive(Debug, Default)]
pub struct SyncBroadcaster {
    observers: HashMap<ChannelId, Sender<Message>>,
    display: Option<ChannelId>,
    dropped: u64,
}

impl SyncBroadcaster {
    /// An empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an observer. `display` marks it as the display surface;
    /// a later display attachment supersedes the current one.
    pub fn attach(&mut self, id: ChannelId, tx: Sender<Message>, display: bool) {
        self.observers.insert(id, tx);
        if display {
            self.display = Some(id);
        }
    }

    /// Detaches an observer. Unknown ids are a no-op.
    pub fn detach(&mut self, id: ChannelId) {
        self.observers.remove(&id);
        if self.display == Some(id) {
            self.display = None;
        }
    }

    /// Sends `message` to every attached observer except `origin`.
    ///
    /// Returns the number of observers the message actually reached.
    /// Closed observers are pruned on the way.
    pub fn broadcast(&mut self, message: &Message, origin: Option<ChannelId>) -> usize {
        let mut delivered = 0;
        let mut closed = Vec::new();

        for (id, tx) in &self.observers {
            if Some(*id) == origin {
                continue;
            }
            match tx.try_send(message.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    self.dropped += 1;
                }
                Err(TrySendError::Disconnected(_)) => {
                    self.dropped += 1;
                    closed.push(*id);
                }
            }
        }

        for id in closed {
            trace!(%id, "pruning closed observer");
            self.detach(id);
        }
        delivered
    }

    /// The current display surface, if any.
    #[must_use]
    pub const fn display(&self) -> Option<ChannelId> {
        self.display
    }

    /// Messages lost to full or closed observers.
    #[must_use]
    pub const fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Number of attached observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.observers.len()
    }

    #[allow(missing_docs)]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn broadcast_skips_the_origin() {
        let mut broadcaster = SyncBroadcaster::new();
        let origin = ChannelId::new();
        let other = ChannelId::new();

        let (origin_tx, origin_rx) = bounded(4);
        let (other_tx, other_rx) = bounded(4);
        broadcaster.attach(origin, origin_tx, false);
        broadcaster.attach(other, other_tx, false);

        let delivered = broadcaster.broadcast(&Message::clear_data(), Some(origin));
        assert_eq!(delivered, 1);
        assert!(origin_rx.try_recv().is_err());
        assert_eq!(other_rx.try_recv().unwrap().kind, "clear-data");
    }

    #[test]
    fn full_observer_drops_without_blocking() {
        let mut broadcaster = SyncBroadcaster::new();
        let id = ChannelId::new();
        let (tx, rx) = bounded(1);
        broadcaster.attach(id, tx, false);

        assert_eq!(broadcaster.broadcast(&Message::clear_data(), None), 1);
        assert_eq!(broadcaster.broadcast(&Message::clear_data(), None), 0);
        assert_eq!(broadcaster.dropped(), 1);
        drop(rx);
    }

    #[test]
    fn closed_observer_is_pruned() {
        let mut broadcaster = SyncBroadcaster::new();
        let id = ChannelId::new();
        let (tx, rx) = bounded(4);
        broadcaster.attach(id, tx, true);
        assert_eq!(broadcaster.display(), Some(id));

        drop(rx);
        assert_eq!(broadcaster.broadcast(&Message::clear_data(), None), 0);
        assert!(broadcaster.is_empty());
        assert_eq!(broadcaster.display(), None);
    }

    #[test]
    fn later_display_attachment_supersedes() {
        let mut broadcaster = SyncBroadcaster::new();
        let first = ChannelId::new();
        let second = ChannelId::new();
        let (tx_a, _rx_a) = bounded(1);
        let (tx_b, _rx_b) = bounded(1);

        broadcaster.attach(first, tx_a, true);
        broadcaster.attach(second, tx_b, true);
        assert_eq!(broadcaster.display(), Some(second));

        broadcaster.detach(second);
        assert_eq!(broadcaster.display(), None);
        assert_eq!(broadcaster.len(), 1);
    }
}
