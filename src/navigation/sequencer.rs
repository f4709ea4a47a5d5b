// navigation/sequencer.rs

// Tour sequencer: decides which leg comes next and keeps track of where the
// robot is. Position only moves on a confirmed arrival; a failed leg leaves the
// robot where it was and is remembered so `resume()` can try it again.
//
// Overlapping calls: `next()` and `resume()` fail fast while a leg is in
// flight. `cancel()` and `skip()` stop the leg in flight first (its caller gets
// an interruption failure) and then send their own command. While
// `initialize()` talks to the robot every other operation is refused, and each
// successful initialization starts a new tour generation so a leg planned
// against an older tour can never move the position of the new one.

use super::correlation::{Arrival, CommandCorrelator, Destination, DispatchError};
use crate::core::{missing_pois, PointOfInterest, TourFailure, TourPosition, TourState};
use crate::lock;
use crate::robot::{DockId, RobotClient, RobotError, NEAREST_DOCK};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use thiserror::Error;

/// Sequencer settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Docking station used after the last POI and on cancel
    pub dock_id: DockId,
    /// How long to wait for a leg's outcome; unbounded when unset
    pub outcome_timeout_ms: Option<u64>,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        SequencerConfig {
            dock_id: NEAREST_DOCK,
            outcome_timeout_ms: None,
        }
    }
}

impl SequencerConfig {
    pub fn outcome_timeout(&self) -> Option<Duration> {
        self.outcome_timeout_ms.map(Duration::from_millis)
    }
}

/// Errors returned by tour operations
#[derive(Debug, Error)]
pub enum TourError {
    /// The leg or the initialisation failed; see [`TourFailure::is_critical`]
    #[error(transparent)]
    Failure(#[from] TourFailure),
    /// The robot refused the command before starting it
    #[error("robot rejected the command: {0}")]
    Rejected(#[source] RobotError),
    /// Another leg is still awaiting its outcome
    #[error("a command is already in flight towards {0}")]
    CommandInFlight(Destination),
    #[error("tour has not been initialized")]
    NotInitialized,
    /// `initialize()` is still talking to the robot
    #[error("tour initialization is in progress")]
    Initializing,
    /// The tour was reinitialized while this leg was under way
    #[error("tour was reinitialized while heading to {0}")]
    Superseded(Destination),
    #[error("tour has no stop at index {0}")]
    UnknownStop(usize),
}

impl TourError {
    pub fn failure(&self) -> Option<&TourFailure> {
        match self {
            TourError::Failure(failure) => Some(failure),
            _ => None,
        }
    }

    /// True when the tour needs manual intervention before it can continue
    pub fn is_critical(&self) -> bool {
        self.failure().is_some_and(TourFailure::is_critical)
    }
}

#[derive(Default)]
struct Tour {
    pois: Vec<PointOfInterest>,
    initialized: bool,
    initializing: bool,
    generation: u64, // bumped by every successful initialize()
    position: TourPosition,
    retry: Option<Destination>, // last leg that failed, if nothing succeeded since
    last_failure: Option<TourFailure>,
}

impl Tour {
    fn poi(&self, index: usize) -> Result<Destination, TourError> {
        self.pois
            .get(index)
            .map(|poi| Destination::Poi { index, id: poi.id() })
            .ok_or(TourError::UnknownStop(index))
    }

    /// The leg `next()` would take from `position`
    fn leg_after(&self, position: TourPosition, dock_id: DockId) -> Result<Destination, TourError> {
        match position.following(self.pois.len()) {
            Some(index) => self.poi(index),
            None => Ok(Destination::Dock(dock_id)),
        }
    }

    /// The leg that brings the robot back to `position`
    fn leg_to(&self, position: TourPosition, dock_id: DockId) -> Result<Destination, TourError> {
        match position {
            TourPosition::AtPoi(index) => self.poi(index),
            TourPosition::Docked => Ok(Destination::Dock(dock_id)),
        }
    }
}

// Holds off other operations until initialize() returns or is dropped
struct Initialization<'a> {
    tour: &'a Mutex<Tour>,
}

impl Drop for Initialization<'_> {
    fn drop(&mut self) {
        lock(self.tour).initializing = false;
    }
}

/// Drives an AMR through a tour of POIs and back to its dock
pub struct TourSequencer {
    correlator: CommandCorrelator,
    dock_id: DockId,
    tour: Mutex<Tour>,
}

impl TourSequencer {
    pub fn new(robot: Arc<dyn RobotClient>, config: &SequencerConfig) -> Self {
        TourSequencer {
            correlator: CommandCorrelator::new(robot).with_timeout(config.outcome_timeout()),
            dock_id: config.dock_id,
            tour: Mutex::new(Tour::default()),
        }
    }

    /// Initializes the robot and checks that every tour POI is on its map.
    ///
    /// On failure the previous tour, if any, is left untouched.
    pub async fn initialize(&self, pois: Vec<PointOfInterest>) -> Result<(), TourError> {
        let _initialization = self.begin_initialization()?;
        info!("Initializing tour of {} POIs...", pois.len());

        let robot = self.correlator.robot();
        if let Err(err) = robot.initialize().await {
            error!("Robot initialization failed: {err}");
            return Err(self.fail(TourFailure::device_unavailable()));
        }
        let map = match robot.fetch_current_map().await {
            Ok(map) => map,
            Err(err) => {
                error!("Could not read the robot's map: {err}");
                return Err(self.fail(TourFailure::device_unavailable()));
            }
        };

        let missing = missing_pois(&pois, &map);
        if !missing.is_empty() {
            warn!("Tour POIs missing from the current map: {missing:?}");
            return Err(self.fail(TourFailure::missing_pois(missing)));
        }

        if let Some(destination) = self.correlator.in_flight() {
            return Err(TourError::CommandInFlight(destination));
        }
        let mut tour = self.tour();
        tour.pois = pois;
        tour.initialized = true;
        tour.generation += 1;
        tour.position = TourPosition::Docked;
        tour.retry = None;
        info!("Tour initialized with {} POIs", tour.pois.len());
        Ok(())
    }

    /// Goes to the next POI, or to the dock after the last one.
    ///
    /// Resolves with the reached POI, or `None` once docked.
    pub async fn next(&self) -> Result<Option<PointOfInterest>, TourError> {
        let (destination, generation) = {
            let tour = self.initialized_tour()?;
            (tour.leg_after(tour.position, self.dock_id)?, tour.generation)
        };
        self.travel(destination, generation).await
    }

    /// Retries the leg that last failed, or returns to the current position.
    pub async fn resume(&self) -> Result<Option<PointOfInterest>, TourError> {
        let (destination, generation) = {
            let tour = self.initialized_tour()?;
            let destination = match tour.retry {
                Some(retry) => retry,
                None => tour.leg_to(tour.position, self.dock_id)?,
            };
            (destination, tour.generation)
        };
        self.travel(destination, generation).await
    }

    /// Abandons the tour and sends the robot to its dock, interrupting any leg in flight.
    pub async fn cancel(&self) -> Result<(), TourError> {
        drop(self.idle_tour()?);
        self.correlator.interrupt().await.map_err(TourError::Rejected)?;
        let generation = self.idle_tour()?.generation;
        self.travel(Destination::Dock(self.dock_id), generation).await?;
        Ok(())
    }

    /// Heads for the POI after the one currently targeted, interrupting any leg in flight.
    pub async fn skip(&self) -> Result<Option<PointOfInterest>, TourError> {
        drop(self.initialized_tour()?);
        let interrupted = self.correlator.interrupt().await.map_err(TourError::Rejected)?;

        let (destination, generation) = {
            let tour = self.initialized_tour()?;
            let from = match interrupted.or(tour.retry) {
                Some(Destination::Poi { index, .. }) => TourPosition::AtPoi(index),
                Some(Destination::Dock(_)) => TourPosition::Docked,
                None => tour.position,
            };
            (tour.leg_after(from, self.dock_id)?, tour.generation)
        };
        info!("Skipping ahead to {destination}");
        self.travel(destination, generation).await
    }

    /// The POI the robot last reached, `None` when docked
    pub fn current_poi(&self) -> Option<PointOfInterest> {
        let tour = self.tour();
        tour.position.index().and_then(|i| tour.pois.get(i).cloned())
    }

    /// The POI `next()` would head for, `None` when it would dock
    pub fn next_poi(&self) -> Option<PointOfInterest> {
        let tour = self.tour();
        tour.position
            .following(tour.pois.len())
            .and_then(|i| tour.pois.get(i).cloned())
    }

    /// Last recorded failure, kept for display until another failure replaces it
    pub fn tour_failure(&self) -> Option<TourFailure> {
        self.tour().last_failure.clone()
    }

    pub fn position(&self) -> TourPosition {
        self.tour().position
    }

    pub fn pois(&self) -> Vec<PointOfInterest> {
        self.tour().pois.clone()
    }

    /// Destination of the leg holding the command slot, accepted or not
    pub fn in_flight(&self) -> Option<Destination> {
        self.correlator.in_flight()
    }

    /// Reports a leg as en route only once the robot has accepted it
    pub fn state(&self) -> TourState {
        let en_route = self.correlator.en_route();
        let tour = self.tour();
        if !tour.initialized {
            return TourState::Uninitialized;
        }
        match (en_route, tour.position) {
            (Some(Destination::Poi { index, .. }), _) => TourState::EnRouteToPoi(index),
            (Some(Destination::Dock(_)), _) => TourState::EnRouteToDock,
            (None, TourPosition::Docked) => TourState::Docked,
            (None, TourPosition::AtPoi(index)) => TourState::AtPoi(index),
        }
    }

    async fn travel(
        &self,
        destination: Destination,
        generation: u64,
    ) -> Result<Option<PointOfInterest>, TourError> {
        info!("Heading to {destination}");
        match self.correlator.dispatch(destination).await {
            Ok(arrival) => self.arrive(arrival, generation),
            Err(DispatchError::InFlight(current)) => {
                warn!("Refusing leg to {destination}: still heading to {current}");
                Err(TourError::CommandInFlight(current))
            }
            Err(DispatchError::Rejected(err)) => Err(TourError::Rejected(err)),
            Err(DispatchError::Failed { ticket, failure }) => {
                // A newer command supersedes this leg as the one to retry
                let latest = self.correlator.latest_ticket() == ticket;
                let mut tour = self.tour();
                if tour.generation != generation {
                    debug!("Leg to {destination} belonged to a previous tour; not recording it");
                    return Err(TourError::Failure(failure));
                }
                if latest {
                    tour.retry = Some(destination);
                }
                tour.last_failure = Some(failure.clone());
                Err(TourError::Failure(failure))
            }
        }
    }

    fn arrive(&self, arrival: Arrival, generation: u64) -> Result<Option<PointOfInterest>, TourError> {
        let mut tour = self.tour();
        if tour.generation != generation {
            warn!(
                "Reached {} after the tour was reinitialized; position left unchanged",
                arrival.destination
            );
            return Err(TourError::Superseded(arrival.destination));
        }
        match arrival.destination {
            Destination::Poi { index, .. } => {
                let poi = tour.pois.get(index).cloned().ok_or(TourError::UnknownStop(index))?;
                tour.position = TourPosition::AtPoi(index);
                tour.retry = None;
                Ok(Some(poi))
            }
            Destination::Dock(_) => {
                tour.position = TourPosition::Docked;
                tour.retry = None;
                Ok(None)
            }
        }
    }

    fn fail(&self, failure: TourFailure) -> TourError {
        self.tour().last_failure = Some(failure.clone());
        TourError::Failure(failure)
    }

    fn tour(&self) -> MutexGuard<'_, Tour> {
        lock(&self.tour)
    }

    /// The tour, unless initialize() is running
    fn idle_tour(&self) -> Result<MutexGuard<'_, Tour>, TourError> {
        let tour = self.tour();
        if tour.initializing {
            return Err(TourError::Initializing);
        }
        Ok(tour)
    }

    fn initialized_tour(&self) -> Result<MutexGuard<'_, Tour>, TourError> {
        let tour = self.idle_tour()?;
        if tour.initialized {
            Ok(tour)
        } else {
            Err(TourError::NotInitialized)
        }
    }

    fn begin_initialization(&self) -> Result<Initialization<'_>, TourError> {
        let mut tour = self.idle_tour()?;
        if let Some(destination) = self.correlator.in_flight() {
            return Err(TourError::CommandInFlight(destination));
        }
        tour.initializing = true;
        Ok(Initialization { tour: &self.tour })
    }
}


// Current Functionality:
// - Initializes the robot and validates tour POIs against the device map.
// - Sequences POI legs in order, docking after the last one and looping after that.
// - Retries failed legs with resume(), skips ahead or cancels with preemption.
// - Keeps the last failure for display.
