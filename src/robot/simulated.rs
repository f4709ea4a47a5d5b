//! Simulated AMR
//!
//! Stands in for the real robot in tests and demos. Commands are accepted
//! immediately and complete after a random travel time drawn from the
//! configured `eta_range`; failures are injected per POI or per docking leg.
//! Only one motion runs at a time: a new command replaces the current motion
//! without reporting it, while `stop()` reports a cancellation.

use super::config::{LatencyRange, SimulationConfig};
use super::outcome::Outcome;
use super::{DockId, OutcomeHandler, RobotClient, RobotError};
use crate::core::{CancelReason, MapData, PoiId};
use crate::{lock, ConfigError};
use async_trait::async_trait;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

type HandlerSlot = Arc<Mutex<Option<OutcomeHandler>>>;

#[derive(Debug, Clone, Copy)]
enum Leg {
    Poi(PoiId),
    Dock(DockId),
}

impl Leg {
    fn cancel_reason(&self) -> CancelReason {
        match self {
            Leg::Poi(_) => CancelReason::EnRouteToPoi,
            Leg::Dock(_) => CancelReason::EnRouteToDock,
        }
    }
}

impl std::fmt::Display for Leg {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Leg::Poi(id) => write!(f, "leg to POI {id}"),
            Leg::Dock(id) => write!(f, "leg to dock {id}"),
        }
    }
}

struct Motion {
    id: u64,
    leg: Leg,
    task: JoinHandle<()>,
}

/// In-process robot with configurable travel times and failure injection
pub struct SimulatedRobot {
    config: Mutex<SimulationConfig>,
    map: Mutex<MapData>,
    poi_handler: HandlerSlot,
    dock_handler: HandlerSlot,
    motion: Arc<Mutex<Option<Motion>>>,
    motions_started: AtomicU64,
    rng: Mutex<StdRng>,
}

impl SimulatedRobot {
    /// Creates a robot whose map is loaded from `map_data_path` on `initialize()`
    pub fn new(config: SimulationConfig) -> Result<Self, ConfigError> {
        Self::with_map(config, MapData::default())
    }

    /// Creates a robot that starts with the given map
    pub fn with_map(config: SimulationConfig, map: MapData) -> Result<Self, ConfigError> {
        config.validate()?;
        let rng = if config.random_seed == 0 {
            StdRng::from_entropy()
        } else {
            StdRng::seed_from_u64(config.random_seed)
        };
        Ok(SimulatedRobot {
            config: Mutex::new(config),
            map: Mutex::new(map),
            poi_handler: Arc::default(),
            dock_handler: Arc::default(),
            motion: Arc::default(),
            motions_started: AtomicU64::new(0),
            rng: Mutex::new(rng),
        })
    }

    pub fn config(&self) -> SimulationConfig {
        lock(&self.config).clone()
    }

    pub fn set_critical_failure(&self, critical: bool) {
        lock(&self.config).critical_failure = critical;
    }

    pub fn set_fail_on_init(&self, fail: bool) {
        lock(&self.config).fail_on_init = fail;
    }

    pub fn set_fail_on_dock(&self, fail: bool) {
        lock(&self.config).fail_on_dock = fail;
    }

    pub fn set_fail_on_go_to_dock(&self, fail: bool) {
        lock(&self.config).fail_on_go_to_dock = fail;
    }

    pub fn set_fail_on_poi_id(&self, poi_id: Option<PoiId>) {
        lock(&self.config).fail_on_poi_id = poi_id;
    }

    pub fn set_fail_on_go_to_poi_id(&self, poi_id: Option<PoiId>) {
        lock(&self.config).fail_on_go_to_poi_id = poi_id;
    }

    /// Changes the travel time of legs started from now on
    pub fn set_eta_range(&self, eta_range: LatencyRange) -> Result<(), ConfigError> {
        eta_range.validate()?;
        lock(&self.config).eta_range = eta_range;
        Ok(())
    }

    /// True while a leg is under way
    pub fn is_moving(&self) -> bool {
        lock(&self.motion).is_some()
    }

    fn handlers_for(&self, leg: Leg) -> HandlerSlot {
        match leg {
            Leg::Poi(_) => Arc::clone(&self.poi_handler),
            Leg::Dock(_) => Arc::clone(&self.dock_handler),
        }
    }

    fn travel_time(&self, eta: LatencyRange) -> Duration {
        lock(&self.rng).gen_range(eta.min()..=eta.max())
    }

    /// Starts a motion that reports `outcome` once the travel time has elapsed
    fn start_motion(&self, leg: Leg, outcome: Outcome, eta: LatencyRange) {
        let travel = self.travel_time(eta);
        let id = self.motions_started.fetch_add(1, Ordering::Relaxed) + 1;
        let handlers = self.handlers_for(leg);
        let motion_slot = Arc::clone(&self.motion);
        debug!(
            "{} takes {} ms and ends with status {:#05x}",
            leg,
            travel.as_millis(),
            outcome.code
        );

        // Held while spawning so the motion is registered before its task can finish
        let mut current = lock(&self.motion);
        let task = tokio::spawn(async move {
            tokio::time::sleep(travel).await;
            {
                let mut current = lock(&motion_slot);
                if current.as_ref().map(|m| m.id) != Some(id) {
                    return;
                }
                *current = None;
            }
            deliver(&handlers, outcome);
        });
        if let Some(previous) = current.replace(Motion { id, leg, task }) {
            debug!("{} superseded by {}", previous.leg, leg);
            previous.task.abort();
        }
    }
}

impl Drop for SimulatedRobot {
    fn drop(&mut self) {
        if let Some(motion) = lock(&self.motion).take() {
            motion.task.abort();
        }
    }
}

fn deliver(handlers: &Mutex<Option<OutcomeHandler>>, outcome: Outcome) {
    let handler = lock(handlers).clone();
    match handler {
        Some(handler) => handler(outcome),
        None => debug!("no outcome handler registered; dropping status {:#05x}", outcome.code),
    }
}

#[async_trait]
impl RobotClient for SimulatedRobot {
    async fn initialize(&self) -> Result<(), RobotError> {
        let (fail, path) = {
            let config = lock(&self.config);
            (config.fail_on_init, config.map_data_path.clone())
        };
        if fail {
            return Err(RobotError::Initialization(
                "couldn't initialize the AMR's client API".to_string(),
            ));
        }

        if let Some(path) = path {
            let raw = tokio::fs::read(&path).await.map_err(|e| {
                RobotError::Initialization(format!("cannot read {}: {e}", path.display()))
            })?;
            let map = MapData::from_json(&raw).map_err(|e| {
                RobotError::Initialization(format!("invalid map data in {}: {e}", path.display()))
            })?;
            info!("Loaded map data from {} ({} POIs)", path.display(), map.pois.len());
            *lock(&self.map) = map;
        }
        Ok(())
    }

    async fn fetch_current_map(&self) -> Result<MapData, RobotError> {
        Ok(lock(&self.map).clone())
    }

    async fn go_to_poi(&self, poi_id: PoiId) -> Result<(), RobotError> {
        let config = self.config();
        if config.fail_on_go_to_poi_id == Some(poi_id) {
            debug!("Rejecting command to POI {poi_id}");
            return Err(RobotError::CommandRejected(
                Outcome::failure(config.critical_failure).message,
            ));
        }

        let outcome = if config.fail_on_poi_id == Some(poi_id) {
            Outcome::failure(config.critical_failure)
        } else {
            Outcome::success()
        };
        self.start_motion(Leg::Poi(poi_id), outcome, config.eta_range);
        Ok(())
    }

    async fn go_to_dock(&self, dock_id: DockId) -> Result<(), RobotError> {
        let config = self.config();
        if config.fail_on_go_to_dock {
            debug!("Rejecting command to dock {dock_id}");
            return Err(RobotError::CommandRejected(
                Outcome::failure(config.critical_failure).message,
            ));
        }

        let outcome = if config.fail_on_dock {
            Outcome::failure(config.critical_failure)
        } else {
            Outcome::success()
        };
        self.start_motion(Leg::Dock(dock_id), outcome, config.eta_range);
        Ok(())
    }

    async fn stop(&self) -> Result<(), RobotError> {
        let motion = lock(&self.motion).take();
        if let Some(motion) = motion {
            motion.task.abort();
            info!("Stopped during {}", motion.leg);
            let handlers = self.handlers_for(motion.leg);
            deliver(&handlers, Outcome::interrupted(motion.leg.cancel_reason()));
        }
        Ok(())
    }

    fn on_poi_outcome(&self, handler: OutcomeHandler) {
        *lock(&self.poi_handler) = Some(handler);
    }

    fn on_dock_outcome(&self, handler: OutcomeHandler) {
        *lock(&self.dock_handler) = Some(handler);
    }
}
