//! AMR Tour - guided tours for autonomous mobile robots
//!
//! This library sequences a robot through an ordered list of points of
//! interest and back to its charging dock. It turns the robot's
//! accept-now/report-later command protocol into one awaitable result per
//! leg, and classifies failures as critical or retryable.

#![warn(unused_extern_crates)]

pub mod core;
pub mod navigation;
pub mod robot;

// Re-export commonly used items for easier access
pub use crate::core::{
    CancelReason, FailureCause, MapData, PoiId, PointOfInterest, TourFailure, TourPosition,
    TourState,
};
pub use navigation::{CommandCorrelator, Destination, SequencerConfig, TourError, TourSequencer};
pub use robot::{
    DockId, Outcome, RobotClient, RobotError, SimulatedRobot, SimulationConfig, NEAREST_DOCK,
};

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use thiserror::Error;

/// Main configuration structure for a tour run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TourConfig {
    /// Sequencer settings
    #[serde(default)]
    pub sequencer: SequencerConfig,
    /// Simulated robot settings
    #[serde(default)]
    pub simulation: SimulationConfig,
    /// Tour stops, in visiting order
    #[serde(default)]
    pub pois: Vec<PointOfInterest>,
}

impl TourConfig {
    /// Loads and validates a YAML tour file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let file = std::fs::File::open(path.as_ref())?;
        let config: TourConfig = serde_yaml::from_reader(file)?;
        config.validate()?;
        log::info!(
            "Loaded tour of {} POIs from {}",
            config.pois.len(),
            path.as_ref().display()
        );
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.simulation.validate()?;
        if self.sequencer.outcome_timeout_ms == Some(0) {
            return Err(ConfigError::Invalid(
                "sequencer.outcome_timeout_ms must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("malformed configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Locks a mutex, recovering the data if a previous holder panicked
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
