// core/failure.rs

// Tour failures as the caller sees them. A critical failure means the tour
// cannot go on without someone stepping in; anything else can be retried with
// `resume()`. The cause keeps enough detail to tell a blocked path from a
// deliberate interruption or a device that never answered.

use super::poi::PoiId;
use std::time::Duration;
use thiserror::Error;

/// Reason code carried by a cancellation outcome (`E` on the wire)
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CancelReason {
    /// Interrupted while en route to a POI (`E = 9`)
    EnRouteToPoi,
    /// Interrupted while en route to the dock (`E = 7`)
    EnRouteToDock,
    /// Any other reason code the device reports
    Other(u32),
}

impl CancelReason {
    pub const EN_ROUTE_TO_POI: u32 = 9;
    pub const EN_ROUTE_TO_DOCK: u32 = 7;

    pub fn from_code(code: u32) -> Self {
        match code {
            Self::EN_ROUTE_TO_POI => CancelReason::EnRouteToPoi,
            Self::EN_ROUTE_TO_DOCK => CancelReason::EnRouteToDock,
            other => CancelReason::Other(other),
        }
    }

    pub fn code(&self) -> u32 {
        match self {
            CancelReason::EnRouteToPoi => Self::EN_ROUTE_TO_POI,
            CancelReason::EnRouteToDock => Self::EN_ROUTE_TO_DOCK,
            CancelReason::Other(code) => *code,
        }
    }

    fn describe(&self) -> String {
        match self {
            CancelReason::EnRouteToPoi => "interrupted while en route to POI".to_string(),
            CancelReason::EnRouteToDock => "interrupted while en route to dock".to_string(),
            CancelReason::Other(code) => format!("interrupted (reason {code})"),
        }
    }
}

/// What went wrong, beyond the message shown to the user
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FailureCause {
    /// The device could not be initialised or its map could not be read
    DeviceUnavailable,
    /// Tour POIs absent from the device map
    MissingPois(Vec<PoiId>),
    /// The device reported a failed outcome with this status code
    Navigation { code: u32 },
    /// The leg was stopped before it reached its destination
    Interrupted(CancelReason),
    /// No outcome arrived within the configured timeout
    TimedOut,
    /// The outcome channel closed without delivering anything
    OutcomeLost,
}

/// A failed tour operation: message, criticality and cause
#[derive(Clone, Debug, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct TourFailure {
    message: String,
    critical: bool,
    cause: FailureCause,
}

impl TourFailure {
    pub fn new(message: impl Into<String>, critical: bool, cause: FailureCause) -> Self {
        TourFailure {
            message: message.into(),
            critical,
            cause,
        }
    }

    /// Initialisation failed on the device side
    pub fn device_unavailable() -> Self {
        Self::new("device could not be initialized", true, FailureCause::DeviceUnavailable)
    }

    /// Some tour POIs are not in the current map
    pub fn missing_pois(missing: Vec<PoiId>) -> Self {
        Self::new(
            "missing POI(s) in current map",
            true,
            FailureCause::MissingPois(missing),
        )
    }

    /// Failed outcome reported by the device
    pub fn navigation(code: u32, message: impl Into<String>, critical: bool) -> Self {
        Self::new(message, critical, FailureCause::Navigation { code })
    }

    pub fn interrupted(reason: CancelReason) -> Self {
        Self::new(reason.describe(), false, FailureCause::Interrupted(reason))
    }

    pub fn timed_out(limit: Duration) -> Self {
        Self::new(
            format!("no outcome received within {} ms", limit.as_millis()),
            false,
            FailureCause::TimedOut,
        )
    }

    pub fn outcome_lost() -> Self {
        Self::new(
            "outcome channel closed before the command finished",
            false,
            FailureCause::OutcomeLost,
        )
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the tour cannot continue without manual intervention
    pub fn is_critical(&self) -> bool {
        self.critical
    }

    pub fn cause(&self) -> &FailureCause {
        &self.cause
    }

    /// True for a deliberate interruption rather than a failure to reach the goal
    pub fn is_interruption(&self) -> bool {
        matches!(self.cause, FailureCause::Interrupted(_))
    }
}
