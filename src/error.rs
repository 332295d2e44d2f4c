//! Error types for oddsync.
//!
//! All errors are strongly typed using thiserror. Validation failures never
//! escape the validation boundary as bare errors: they are bundled into a
//! [`Rejection`] carrying the offending message and every violated rule, so
//! callers see the whole diagnosis at once.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::entity::EntityKind;
use crate::message::Message;
use crate::storage::StorageError;

/// Validation failures raised at the message boundary.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The message/entity payload is structurally malformed.
    #[error("invalid shape: {reason}")]
    InvalidShape {
        #[allow(missing_docs)]
        reason: String,
    },

    /// The message type matches no known rule set.
    #[error("unknown message type: {kind}")]
    UnknownType {
        #[allow(missing_docs)]
        kind: String,
    },

    /// Required payload fields are absent. Lists all of them, not just the
    /// first.
    #[error("missing required fields: {}", fields.join(", "))]
    MissingFields {
        #[allow(missing_docs)]
        fields: Vec<String>,
    },

    /// An update/remove targets a key with no matching live entity.
    #[error("{kind} {id} not found")]
    NotFound {
        #[allow(missing_docs)]
        kind: EntityKind,
        #[allow(missing_docs)]
        id: String,
    },

    /// An add would duplicate an existing entity key.
    #[error("{kind} {id} already exists")]
    AlreadyExists {
        #[allow(missing_docs)]
        kind: EntityKind,
        #[allow(missing_docs)]
        id: String,
    },
}

/// A rejected message: the offending envelope plus the full list of
/// violated rules. Rejected messages never mutate the store.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("message '{}' rejected: {}", message.kind, errors.iter().map(ToString::to_string).collect::<Vec<_>>().join("; "))]
pub struct Rejection {
    /// The message that failed validation.
    pub message: Message,
    /// Every violated rule, in check order.
    pub errors: Vec<ValidationError>,
    /// When the rejection was raised.
    pub timestamp: DateTime<Utc>,
}

impl Rejection {
    /// Bundles validation errors with the offending message.
    #[must_use]
    pub fn new(message: Message, errors: Vec<ValidationError>) -> Self {
        Self {
            message,
            errors,
            timestamp: Utc::now(),
        }
    }

    /// True if any violated rule matches `predicate`.
    pub fn any(&self, predicate: impl Fn(&ValidationError) -> bool) -> bool {
        self.errors.iter().any(predicate)
    }
}

/// Channel failures between process contexts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChannelError {
    /// The peer end of the channel is gone.
    #[error("channel disconnected: {path}")]
    Disconnected {
        #[allow(missing_docs)]
        path: String,
    },

    /// A bounded receive timed out.
    #[error("channel receive timed out after {duration_ms}ms")]
    Timeout {
        #[allow(missing_docs)]
        duration_ms: u64,
    },
}

/// Top-level error type for oddsync.
#[derive(Debug, Error)]
pub enum SyncError {
    /// A message was rejected at the validation boundary.
    #[error("rejected: {0}")]
    Rejected(#[from] Rejection),

    /// A standalone validation failure outside the rejection path.
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    /// A durable write or read was refused by the snapshot backend.
    #[error("persistence failure: {0}")]
    Persistence(#[from] StorageError),

    /// A channel operation failed.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),
}

impl SyncError {
    /// Returns true if this is a validation-class failure (rejection or
    /// bare validation error).
    #[must_use]
    pub const fn is_validation(&self) -> bool {
        matches!(self, Self::Rejected(_) | Self::Validation(_))
    }

    /// Returns true if this is a persistence failure.
    #[must_use]
    pub const fn is_persistence(&self) -> bool {
        matches!(self, Self::Persistence(_))
    }
}

/// Result type alias for oddsync operations.
pub type SyncResult<T> = Result<T, SyncError>;
