//! Change notifications and the source capability.
//!
//! The host environment watches a live document and reports mutations:
//! value text changed, a contract container appeared or disappeared, the
//! event status attribute flipped to finished. The monitor only consumes
//! notifications; abstracting the source as an injected channel keeps the
//! state machine testable with synthetic sequences.

use crossbeam_channel::{bounded, Receiver};

use crate::entity::{ContractKey, MarketKey};

/// One raw mutation notification from the watched region.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeNotification {
    /// The sell value text of a contract changed. `raw` is the unparsed
    /// text; parsing (and parse failure) is the monitor's concern.
    ValueChanged {
        #[allow(missing_docs)]
        key: ContractKey,
        #[allow(missing_docs)]
        raw: String,
    },

    /// A contract container appeared (child added).
    ContractAppeared {
        #[allow(missing_docs)]
        key: ContractKey,
        /// Display name, needed for synchronization messages.
        name: String,
    },

    /// A contract container disappeared (child removed).
    ContractRemoved {
        #[allow(missing_docs)]
        key: ContractKey,
    },

    /// A market container was torn down, taking its contracts with it.
    MarketRemoved {
        #[allow(missing_docs)]
        key: MarketKey,
    },

    /// The event status attribute flipped to finished; every contract of
    /// the event is torn down.
    EventFinished {
        #[allow(missing_docs)]
        event_id: String,
    },
}

/// A source of change notifications for a watched region.
///
/// Restartable and infinite from the monitor's point of view: the monitor
/// consumes until the channel closes and never originates notifications.
pub trait ChangeSource {
    /// The notification stream for this source.
    fn notifications(&self) -> Receiver<ChangeNotification>;
}

/// A source that replays a fixed sequence, for tests and demos.
#[derive(Debug)]
pub struct ScriptedSource {
    rx: Receiver<ChangeNotification>,
}

impl ScriptedSource {
    /// A source that delivers `sequence` in order, then closes.
    #[must_use]
    pub fn new(sequence: Vec<ChangeNotification>) -> Self {
        let (tx, rx) = bounded(sequence.len().max(1));
        for notification in sequence {
            // Capacity covers the whole sequence.
            let _ = tx.send(notification);
        }
        Self { rx }
    }
}

impl ChangeSource for ScriptedSource {
    fn notifications(&self) -> Receiver<ChangeNotification> {
        self.rx.clone()
    }
}
