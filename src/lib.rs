//! # oddsync - Threshold monitoring and store synchronization for live betting markets
//!
//! oddsync keeps a mirrored store of betting entities in sync across isolated
//! process contexts, and watches contract sell values against user-configured
//! thresholds.
//!
//! ## Core Concepts
//!
//! - **Event / Market / Contract**: the two-level entity tree, addressed by
//!   deterministic slug ids and composite keys
//! - **Message**: the `{type, data}` envelope every mutation travels as
//! - **Validator**: per-type required-field and referential-integrity rules;
//!   rejected messages never reach the store
//! - **Hub**: validates, applies, and echoes messages between channels
//! - **Monitor**: per-contract threshold state machines over a live
//!   change-notification stream
//!
//! ## Usage
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use oddsync::{Message, MemoryBackend, SyncHub};
//!
//! let mut hub = SyncHub::open(Arc::new(MemoryBackend::new()));
//! let (channel, _echoes) = hub.connect_extraction(1);
//!
//! let message: Message = serde_json::from_str(
//!     r#"{ "type": "add-event",
//!          "data": { "id": "a-v-b", "homeTeam": "A", "awayTeam": "B" } }"#,
//! )?;
//! hub.handle_message(channel, message)?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod broadcast;
pub mod entity;
pub mod error;
pub mod hub;
pub mod message;
pub mod monitor;
pub mod storage;
pub mod store;
pub mod validator;

// Re-export primary types at crate root for convenience
pub use broadcast::{ChannelId, SyncBroadcaster};
pub use entity::{
    slug_id, Contract, ContractKey, ContractStatus, Entity, EntityKey, EntityKind, Event, Market,
    MarketKey,
};
pub use error::{ChannelError, Rejection, SyncError, SyncResult, ValidationError};
pub use hub::{
    Applied, ConnectionKind, ExtractionHandle, ObserverHandle, SyncHub, SyncService,
    SyncServiceConfig,
};
pub use message::{Message, MessageKind};
pub use monitor::{
    AlertSink, ChangeNotification, ChangeSource, MonitorControl, NoopAlert, ScriptedSource,
    ThresholdMonitor, ThresholdMonitorConfig,
};
pub use storage::{FileBackend, MemoryBackend, SnapshotBackend, SnapshotKey, StorageError};
pub use store::SyncStore;
pub use validator::MessageValidator;
