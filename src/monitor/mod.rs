//! Threshold monitoring subsystem.
//!
//! One state machine per tracked contract, driven by an asynchronous
//! change-notification stream. The subsystem is embedded-first: a worker
//! thread consumes notifications and control messages, and emits
//! synchronization messages on a bounded channel that the hub (or a test)
//! drains.

/// Worker thread, control channel, and alert sink.
pub mod dispatcher;
/// Change-notification types and source capability.
pub mod source;
/// Per-contract threshold state machine.
pub mod state;

pub use dispatcher::{AlertSink, MonitorControl, NoopAlert, ThresholdMonitor, ThresholdMonitorConfig};
pub use source::{ChangeNotification, ChangeSource, ScriptedSource};
pub use state::{ContractMonitor, MonitorState, StatusChange, Thresholds};
