//! Command outcomes as the robot reports them.
//!
//! The wire shape is fixed by the device: `{ "A": code, "M": message }` for a
//! normal completion, plus a nested `D` and a reason code `E` when the command
//! was cancelled by `stop()`:
//!
//! ```text
//! { "A": 202, "D": { "A": 202, "M": "" }, "M": "", "E": 9 }
//! ```

use crate::core::CancelReason;
use serde::{Deserialize, Serialize};

/// Destination reached
pub const SUCCESS: u32 = 0x000;
/// Software stop on the robot; the tour cannot continue
pub const SOFTWARE_STOP: u32 = 0x001;
/// Destination could not be reached
pub const UNREACHABLE: u32 = 0x002;
/// Command cancelled by `stop()`
pub const CANCELLED: u32 = 0x0CA;

/// Status codes after which the tour must be treated as terminal
pub const CRITICAL_CODES: &[u32] = &[SOFTWARE_STOP];

/// Nested status block of a cancellation outcome
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutcomeDetail {
    #[serde(rename = "A")]
    pub code: u32,
    #[serde(rename = "M", default)]
    pub message: String,
}

/// A command outcome delivered through the outcome handlers
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    #[serde(rename = "A")]
    pub code: u32,
    #[serde(rename = "D", default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<OutcomeDetail>,
    #[serde(rename = "M", default)]
    pub message: String,
    #[serde(rename = "E", default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<u32>,
}

/// How the correlation layer reads an outcome
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutcomeClass {
    Reached,
    Failed { critical: bool },
    Interrupted(CancelReason),
}

impl Outcome {
    pub fn success() -> Self {
        Outcome {
            code: SUCCESS,
            detail: None,
            message: String::new(),
            reason: None,
        }
    }

    /// The failed outcome the robot reports when it cannot complete a leg
    pub fn failure(critical: bool) -> Self {
        let (code, message) = if critical {
            (SOFTWARE_STOP, "software stop error")
        } else {
            (UNREACHABLE, "couldn't reach destination")
        };
        Outcome {
            code,
            detail: None,
            message: message.to_string(),
            reason: None,
        }
    }

    pub fn interrupted(reason: CancelReason) -> Self {
        Outcome {
            code: CANCELLED,
            detail: Some(OutcomeDetail {
                code: CANCELLED,
                message: String::new(),
            }),
            message: String::new(),
            reason: Some(reason.code()),
        }
    }

    pub fn classify(&self) -> OutcomeClass {
        match self.code {
            SUCCESS => OutcomeClass::Reached,
            CANCELLED => {
                // Some firmware only fills the reason code
                let reason = self.reason.unwrap_or(0);
                OutcomeClass::Interrupted(CancelReason::from_code(reason))
            }
            code => OutcomeClass::Failed {
                critical: CRITICAL_CODES.contains(&code),
            },
        }
    }
}
