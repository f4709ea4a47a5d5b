//! Robot command interface
//!
//! The tour never talks to a robot transport directly. It drives a
//! [`RobotClient`], which reports command acceptance and command completion
//! separately:
//! - `go_to_poi` / `go_to_dock` return as soon as the robot has taken the command
//! - the outcome of that command arrives later through the handler registered
//!   with `on_poi_outcome` / `on_dock_outcome`
//! - `stop()` interrupts the current command, whose handler then receives a
//!   cancellation outcome

pub mod config;
pub mod outcome;
pub mod simulated;

use crate::core::{MapData, PoiId};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

#[cfg(test)]
use mockall::automock;

pub use config::{LatencyRange, SimulationConfig};
pub use outcome::{Outcome, OutcomeClass, OutcomeDetail};
pub use simulated::SimulatedRobot;

/// Docking station identifier
pub type DockId = i32;

/// Lets the robot pick the nearest docking station
pub const NEAREST_DOCK: DockId = -1;

/// Callback receiving command outcomes
pub type OutcomeHandler = Arc<dyn Fn(Outcome) + Send + Sync>;

/// Errors raised by the robot before a command is underway
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RobotError {
    #[error("robot initialisation failed: {0}")]
    Initialization(String),
    #[error("map data unavailable: {0}")]
    MapUnavailable(String),
    #[error("{0}")]
    CommandRejected(String),
    #[error("transport error: {0}")]
    Transport(String),
}

/// Remote control surface of an AMR
#[cfg_attr(test, automock)]
#[async_trait]
pub trait RobotClient: Send + Sync {
    /// Connects to the robot and prepares it for commands
    async fn initialize(&self) -> Result<(), RobotError>;

    /// Returns the map the robot is currently using
    async fn fetch_current_map(&self) -> Result<MapData, RobotError>;

    /// Sends the robot to a POI; resolves on acceptance, not on arrival
    async fn go_to_poi(&self, poi_id: PoiId) -> Result<(), RobotError>;

    /// Sends the robot to a docking station; resolves on acceptance
    async fn go_to_dock(&self, dock_id: DockId) -> Result<(), RobotError>;

    /// Interrupts the command in progress, if any
    async fn stop(&self) -> Result<(), RobotError>;

    /// Replaces the handler for POI command outcomes
    fn on_poi_outcome(&self, handler: OutcomeHandler);

    /// Replaces the handler for docking command outcomes
    fn on_dock_outcome(&self, handler: OutcomeHandler);
}
