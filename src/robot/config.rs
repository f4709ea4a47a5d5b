//! Simulated robot configuration
//!
//! Every field has a default, so a tour file only needs to name the failures
//! it wants to inject:
//!
//! ```yaml
//! simulation:
//!   fail_on_poi_id: 13
//!   critical_failure: false
//!   map_data_path: config/map_data.json
//!   eta_range: { min_ms: 50, max_ms: 75 }
//! ```

use crate::ConfigError;
use crate::core::PoiId;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Travel time range for simulated legs, in milliseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatencyRange {
    #[serde(default = "default_min_ms")]
    pub min_ms: u64,
    #[serde(default = "default_max_ms")]
    pub max_ms: u64,
}

fn default_min_ms() -> u64 {
    100
}
fn default_max_ms() -> u64 {
    200
}

impl Default for LatencyRange {
    fn default() -> Self {
        Self {
            min_ms: default_min_ms(),
            max_ms: default_max_ms(),
        }
    }
}

impl LatencyRange {
    pub fn new(min_ms: u64, max_ms: u64) -> Self {
        Self { min_ms, max_ms }
    }

    pub fn min(&self) -> Duration {
        Duration::from_millis(self.min_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_millis(self.max_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_ms > self.max_ms {
            return Err(ConfigError::Invalid(format!(
                "eta_range.min_ms ({}) exceeds eta_range.max_ms ({})",
                self.min_ms, self.max_ms
            )));
        }
        Ok(())
    }
}

/// Failure injection and timing for [`SimulatedRobot`](super::SimulatedRobot)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// Injected failures use the critical status code instead of the recoverable one
    pub critical_failure: bool,
    /// `initialize()` fails
    pub fail_on_init: bool,
    /// Docking legs are accepted but never reach the dock
    pub fail_on_dock: bool,
    /// Docking commands are rejected outright
    pub fail_on_go_to_dock: bool,
    /// Legs to this POI are accepted but never reach it
    pub fail_on_poi_id: Option<PoiId>,
    /// Commands to this POI are rejected outright
    pub fail_on_go_to_poi_id: Option<PoiId>,
    /// JSON map data loaded during `initialize()`
    pub map_data_path: Option<PathBuf>,
    pub eta_range: LatencyRange,
    /// Seed for travel times; 0 draws from entropy
    pub random_seed: u64,
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.eta_range.validate()
    }
}
