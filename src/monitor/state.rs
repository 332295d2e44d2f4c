//! Per-contract threshold state machine.
//!
//! States: `uninitialized → inactive → active ⇄ warning`, terminal
//! `removed`. The machine is pure: it consumes value changes and control
//! updates, and reports what (if anything) should be emitted. Channel
//! plumbing and alert delivery live in the dispatcher.

use crate::entity::{ContractKey, ContractStatus};

/// State of one contract's monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// Observed, no threshold armed yet.
    Inactive,
    /// Armed, last value inside the threshold band.
    Active,
    /// Armed, last value at or beyond a threshold.
    Warning,
    /// The entity disappeared from the source. Terminal.
    Removed,
}

/// User-configured threshold band for one contract.
///
/// A bound is armed only when it is a finite number greater than zero;
/// anything else (empty input, zero, negative, NaN, infinite) disables
/// that bound.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Thresholds {
    lower: Option<f64>,
    upper: Option<f64>,
}

fn valid_bound(bound: Option<f64>) -> Option<f64> {
    bound.filter(|v| v.is_finite() && *v > 0.0)
}

impl Thresholds {
    /// Builds a band, keeping only valid bounds.
    #[must_use]
    pub fn new(lower: Option<f64>, upper: Option<f64>) -> Self {
        Self {
            lower: valid_bound(lower),
            upper: valid_bound(upper),
        }
    }

    /// True if at least one bound is armed.
    #[must_use]
    pub const fn armed(&self) -> bool {
        self.lower.is_some() || self.upper.is_some()
    }

    /// Derives the status for a value: warning iff the value is at or
    /// beyond either armed bound.
    #[must_use]
    pub fn status_for(&self, value: f64) -> ContractStatus {
        let breached = self.upper.is_some_and(|u| value >= u)
            || self.lower.is_some_and(|l| value <= l);
        if breached {
            ContractStatus::Warning
        } else {
            ContractStatus::Active
        }
    }
}

/// What a state transition asks the dispatcher to do.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    /// Contract addressed.
    pub key: ContractKey,
    /// Display name for the synchronization message.
    pub name: String,
    /// Value to carry. The last seen value, or 0.0 if none was ever seen.
    pub value: f64,
    /// Newly derived status.
    pub status: ContractStatus,
    /// True if the alert sink should fire (entered warning, not muted).
    pub alert: bool,
}

/// The running state machine for one tracked contract.
///
/// Construction is the `uninitialized → inactive` transition: a machine
/// exists only once the entity has been observed.
#[derive(Debug, Clone)]
pub struct ContractMonitor {
    key: ContractKey,
    name: String,
    state: MonitorState,
    thresholds: Thresholds,
    muted: bool,
    enabled: bool,
    last_value: Option<f64>,
}

impl ContractMonitor {
    /// First observation of a contract: lands in `inactive`.
    #[must_use]
    pub fn new(key: ContractKey, name: impl Into<String>) -> Self {
        Self {
            key,
            name: name.into(),
            state: MonitorState::Inactive,
            thresholds: Thresholds::default(),
            muted: false,
            enabled: true,
            last_value: None,
        }
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn state(&self) -> MonitorState {
        self.state
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn key(&self) -> &ContractKey {
        &self.key
    }

    #[allow(missing_docs)]
    #[must_use]
    pub const fn muted(&self) -> bool {
        self.muted
    }

    /// Mute toggle. Independent of the state machine; checked at alert
    /// time only.
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
    }

    /// Reconfigures the threshold band.
    ///
    /// Disarming both bounds while active or warning drops the machine to
    /// `inactive` and asks for an emission. Arming does not emit by
    /// itself: activation waits for the next deliverable value change.
    pub fn set_thresholds(&mut self, lower: Option<f64>, upper: Option<f64>) -> Option<StatusChange> {
        self.thresholds = Thresholds::new(lower, upper);
        self.deactivate_if_disarmed()
    }

    /// Enables or disables monitoring outright.
    pub fn set_enabled(&mut self, enabled: bool) -> Option<StatusChange> {
        self.enabled = enabled;
        self.deactivate_if_disarmed()
    }

    fn monitoring(&self) -> bool {
        self.enabled && self.thresholds.armed()
    }

    fn deactivate_if_disarmed(&mut self) -> Option<StatusChange> {
        if self.monitoring() {
            return None;
        }
        match self.state {
            MonitorState::Active | MonitorState::Warning => {
                self.state = MonitorState::Inactive;
                Some(self.change(ContractStatus::Inactive, false))
            }
            MonitorState::Inactive | MonitorState::Removed => None,
        }
    }

    /// Consumes one value-change notification.
    ///
    /// Unparseable or non-finite text is "no value": it never triggers a
    /// warning and never emits. A value exactly equal to the last seen one
    /// is suppressed. Every other value re-derives the status and asks for
    /// an emission carrying value and status; entering `warning` from any
    /// other state requests an alert unless muted.
    pub fn value_changed(&mut self, raw: &str) -> Option<StatusChange> {
        if self.state == MonitorState::Removed {
            return None;
        }

        let value = match raw.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => return None,
        };

        if self.last_value == Some(value) {
            return None;
        }
        self.last_value = Some(value);

        if !self.monitoring() {
            return None;
        }

        let status = self.thresholds.status_for(value);
        let entered_warning =
            status == ContractStatus::Warning && self.state != MonitorState::Warning;
        self.state = match status {
            ContractStatus::Warning => MonitorState::Warning,
            _ => MonitorState::Active,
        };

        Some(self.change(status, entered_warning && !self.muted))
    }

    /// The entity disappeared from the source. Terminal; returns `false`
    /// if the machine was already removed.
    pub fn remove(&mut self) -> bool {
        if self.state == MonitorState::Removed {
            return false;
        }
        self.state = MonitorState::Removed;
        true
    }

    fn change(&self, status: ContractStatus, alert: bool) -> StatusChange {
        StatusChange {
            key: self.key.clone(),
            name: self.name.clone(),
            value: self.last_value.unwrap_or(0.0),
            status,
            alert,
        }
    }
}
