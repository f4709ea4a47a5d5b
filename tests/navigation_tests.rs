use amr_tour::robot::{DockId, LatencyRange, OutcomeHandler};
use amr_tour::{
    CancelReason, Destination, FailureCause, MapData, PoiId, PointOfInterest, RobotClient,
    RobotError, SequencerConfig, SimulatedRobot, SimulationConfig, TourError, TourPosition,
    TourSequencer, TourState,
};
use async_trait::async_trait;
use rstest::{fixture, rstest};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TOUR_IDS: [u32; 3] = [12, 13, 14];

struct Harness {
    robot: Arc<SimulatedRobot>,
    sequencer: TourSequencer,
}

fn tour_pois() -> Vec<PointOfInterest> {
    TOUR_IDS
        .iter()
        .enumerate()
        .map(|(i, id)| {
            PointOfInterest::new(
                *id,
                format!("POI {}", i + 1),
                format!("img/poi_{}.png", i + 1),
                format!("video/poi_{}.mp4", i + 1),
            )
        })
        .collect()
}

fn fast_robot() -> Arc<SimulatedRobot> {
    let config = SimulationConfig {
        eta_range: LatencyRange::new(5, 10),
        random_seed: 7,
        ..Default::default()
    };
    Arc::new(SimulatedRobot::with_map(config, MapData::from_ids(TOUR_IDS)).unwrap())
}

#[fixture]
fn harness() -> Harness {
    let robot = fast_robot();
    let sequencer = TourSequencer::new(robot.clone(), &SequencerConfig::default());
    Harness { robot, sequencer }
}

async fn ready(harness: Harness) -> Harness {
    harness.sequencer.initialize(tour_pois()).await.unwrap();
    harness
}

fn ids(poi: Option<PointOfInterest>) -> Option<u32> {
    poi.map(|p| p.id())
}

fn failure(err: TourError) -> amr_tour::TourFailure {
    match err {
        TourError::Failure(failure) => failure,
        other => panic!("expected a tour failure, got {other:?}"),
    }
}

/// Simulated robot that is slow to initialize and to accept POI commands
struct SlowRobot {
    inner: SimulatedRobot,
    init_delay: Duration,
    accept_delay: Duration,
    accepted: Mutex<Vec<String>>,
}

impl SlowRobot {
    fn new(init_delay: Duration, accept_delay: Duration, eta: LatencyRange) -> Self {
        let config = SimulationConfig {
            eta_range: eta,
            random_seed: 7,
            ..Default::default()
        };
        SlowRobot {
            inner: SimulatedRobot::with_map(config, MapData::from_ids(TOUR_IDS)).unwrap(),
            init_delay,
            accept_delay,
            accepted: Mutex::default(),
        }
    }

    /// Commands in the order the robot took them
    fn accepted(&self) -> Vec<String> {
        self.accepted.lock().unwrap().clone()
    }
}

#[async_trait]
impl RobotClient for SlowRobot {
    async fn initialize(&self) -> Result<(), RobotError> {
        tokio::time::sleep(self.init_delay).await;
        self.inner.initialize().await
    }

    async fn fetch_current_map(&self) -> Result<MapData, RobotError> {
        self.inner.fetch_current_map().await
    }

    async fn go_to_poi(&self, poi_id: PoiId) -> Result<(), RobotError> {
        tokio::time::sleep(self.accept_delay).await;
        self.inner.go_to_poi(poi_id).await?;
        self.accepted.lock().unwrap().push(format!("poi {poi_id}"));
        Ok(())
    }

    async fn go_to_dock(&self, dock_id: DockId) -> Result<(), RobotError> {
        self.inner.go_to_dock(dock_id).await?;
        self.accepted.lock().unwrap().push(format!("dock {dock_id}"));
        Ok(())
    }

    async fn stop(&self) -> Result<(), RobotError> {
        self.inner.stop().await
    }

    fn on_poi_outcome(&self, handler: OutcomeHandler) {
        self.inner.on_poi_outcome(handler);
    }

    fn on_dock_outcome(&self, handler: OutcomeHandler) {
        self.inner.on_dock_outcome(handler);
    }
}

async fn wait_until_moving(sequencer: &TourSequencer) {
    while !sequencer.state().is_moving() {
        tokio::task::yield_now().await;
    }
}

#[rstest]
#[tokio::test]
async fn visits_every_poi_then_docks_and_loops(harness: Harness) {
    let Harness { sequencer, .. } = ready(harness).await;

    assert_eq!(ids(sequencer.next().await.unwrap()), Some(12));
    assert_eq!(ids(sequencer.next().await.unwrap()), Some(13));
    assert_eq!(ids(sequencer.next().await.unwrap()), Some(14));
    assert_eq!(sequencer.next().await.unwrap(), None);
    assert_eq!(sequencer.state(), TourState::Docked);

    assert_eq!(ids(sequencer.next().await.unwrap()), Some(12));
    assert!(sequencer.tour_failure().is_none());
}

#[rstest]
#[tokio::test]
async fn current_and_next_poi_follow_the_tour(harness: Harness) {
    let Harness { sequencer, .. } = ready(harness).await;
    assert_eq!(sequencer.current_poi(), None);
    assert_eq!(ids(sequencer.next_poi()), Some(12));

    sequencer.next().await.unwrap();
    assert_eq!(ids(sequencer.current_poi()), Some(12));
    assert_eq!(ids(sequencer.next_poi()), Some(13));

    sequencer.next().await.unwrap();
    sequencer.next().await.unwrap();
    assert_eq!(ids(sequencer.current_poi()), Some(14));
    assert_eq!(sequencer.next_poi(), None);
    assert_eq!(sequencer.state(), TourState::AtPoi(2));
}

#[rstest]
#[tokio::test]
async fn commands_before_initialization_are_refused(harness: Harness) {
    let sequencer = harness.sequencer;

    assert_eq!(sequencer.state(), TourState::Uninitialized);
    assert!(matches!(sequencer.next().await, Err(TourError::NotInitialized)));
    assert!(matches!(sequencer.resume().await, Err(TourError::NotInitialized)));
    assert!(matches!(sequencer.skip().await, Err(TourError::NotInitialized)));
}

#[rstest]
#[tokio::test]
async fn refuses_pois_missing_from_the_map(harness: Harness) {
    let mut pois = tour_pois();
    pois.push(PointOfInterest::new(99, "Gone", "", ""));

    let failure = failure(harness.sequencer.initialize(pois).await.unwrap_err());

    assert!(failure.is_critical());
    assert_eq!(failure.message(), "missing POI(s) in current map");
    assert_eq!(failure.cause(), &FailureCause::MissingPois(vec![99]));
    assert_eq!(harness.sequencer.state(), TourState::Uninitialized);
    assert_eq!(harness.sequencer.tour_failure(), Some(failure));
}

#[rstest]
#[tokio::test]
async fn device_initialization_failure_is_critical(harness: Harness) {
    harness.robot.set_fail_on_init(true);

    let err = harness.sequencer.initialize(tour_pois()).await.unwrap_err();

    assert!(err.is_critical());
    assert_eq!(err.to_string(), "device could not be initialized");
    assert_eq!(harness.sequencer.state(), TourState::Uninitialized);
}

#[rstest]
#[tokio::test]
async fn recoverable_failure_is_retried_with_resume(harness: Harness) {
    let Harness { robot, sequencer } = ready(harness).await;
    robot.set_fail_on_poi_id(Some(12));

    let err = sequencer.next().await.unwrap_err();
    assert!(!err.is_critical());
    assert_eq!(err.to_string(), "couldn't reach destination");
    assert_eq!(sequencer.position(), TourPosition::Docked);
    assert_eq!(sequencer.current_poi(), None);

    robot.set_fail_on_poi_id(None);
    assert_eq!(ids(sequencer.resume().await.unwrap()), Some(12));
    assert_eq!(ids(sequencer.next().await.unwrap()), Some(13));
    // The failure stays on display until it is replaced
    assert!(sequencer.tour_failure().is_some());
}

#[rstest]
#[tokio::test]
async fn resume_retargets_the_failed_leg(harness: Harness) {
    let Harness { robot, sequencer } = ready(harness).await;
    sequencer.next().await.unwrap();
    robot.set_fail_on_poi_id(Some(13));

    assert!(sequencer.next().await.is_err());
    assert_eq!(ids(sequencer.current_poi()), Some(12));

    robot.set_fail_on_poi_id(None);
    assert_eq!(ids(sequencer.resume().await.unwrap()), Some(13));
}

#[rstest]
#[tokio::test]
async fn resume_without_a_failure_returns_to_the_current_stop(harness: Harness) {
    let Harness { sequencer, .. } = ready(harness).await;
    sequencer.next().await.unwrap();

    assert_eq!(ids(sequencer.resume().await.unwrap()), Some(12));
    assert_eq!(sequencer.state(), TourState::AtPoi(0));
}

#[rstest]
#[tokio::test]
async fn critical_failure_is_reported_as_such(harness: Harness) {
    let Harness { robot, sequencer } = ready(harness).await;
    robot.set_critical_failure(true);
    robot.set_fail_on_poi_id(Some(13));

    assert_eq!(ids(sequencer.next().await.unwrap()), Some(12));
    let failure = failure(sequencer.next().await.unwrap_err());

    assert!(failure.is_critical());
    assert_eq!(failure.message(), "software stop error");
    assert_eq!(failure.cause(), &FailureCause::Navigation { code: 0x001 });
    assert_eq!(sequencer.tour_failure(), Some(failure));
}

#[rstest]
#[tokio::test]
async fn rejected_command_leaves_the_robot_where_it_was(harness: Harness) {
    let Harness { robot, sequencer } = ready(harness).await;
    robot.set_fail_on_go_to_poi_id(Some(12));

    let err = sequencer.next().await.unwrap_err();

    assert!(matches!(err, TourError::Rejected(_)));
    assert_eq!(sequencer.state(), TourState::Docked);
    assert!(sequencer.in_flight().is_none());
}

#[rstest]
#[tokio::test]
async fn docking_failure_keeps_the_last_poi(harness: Harness) {
    let Harness { robot, sequencer } = ready(harness).await;
    for _ in TOUR_IDS {
        sequencer.next().await.unwrap();
    }
    robot.set_fail_on_dock(true);

    assert!(sequencer.next().await.is_err());
    assert_eq!(ids(sequencer.current_poi()), Some(14));

    robot.set_fail_on_dock(false);
    assert_eq!(sequencer.resume().await.unwrap(), None);
    assert_eq!(sequencer.state(), TourState::Docked);
}

#[rstest]
#[tokio::test]
async fn overlapping_next_fails_fast(harness: Harness) {
    let Harness { sequencer, .. } = ready(harness).await;

    let (first, second) = tokio::join!(sequencer.next(), async {
        tokio::task::yield_now().await;
        sequencer.next().await
    });

    assert_eq!(ids(first.unwrap()), Some(12));
    assert!(matches!(
        second,
        Err(TourError::CommandInFlight(Destination::Poi { id: 12, .. }))
    ));
}

#[rstest]
#[tokio::test]
async fn cancel_interrupts_the_leg_and_docks(harness: Harness) {
    let Harness { sequencer, .. } = ready(harness).await;

    let (interrupted, cancelled) = tokio::join!(sequencer.next(), async {
        wait_until_moving(&sequencer).await;
        sequencer.cancel().await
    });

    cancelled.unwrap();
    let failure = failure(interrupted.unwrap_err());
    assert!(!failure.is_critical());
    assert_eq!(
        failure.cause(),
        &FailureCause::Interrupted(CancelReason::EnRouteToPoi)
    );
    assert_eq!(sequencer.state(), TourState::Docked);
    assert_eq!(sequencer.current_poi(), None);
}

#[rstest]
#[tokio::test]
async fn cancel_from_a_poi_returns_to_the_dock(harness: Harness) {
    let Harness { sequencer, .. } = ready(harness).await;
    sequencer.next().await.unwrap();
    sequencer.next().await.unwrap();

    sequencer.cancel().await.unwrap();

    assert_eq!(sequencer.current_poi(), None);
    assert_eq!(ids(sequencer.next().await.unwrap()), Some(12));
}

#[rstest]
#[tokio::test]
async fn skip_while_en_route_heads_for_the_following_poi(harness: Harness) {
    let Harness { sequencer, .. } = ready(harness).await;

    let (interrupted, skipped) = tokio::join!(sequencer.next(), async {
        wait_until_moving(&sequencer).await;
        sequencer.skip().await
    });

    assert!(failure(interrupted.unwrap_err()).is_interruption());
    assert_eq!(ids(skipped.unwrap()), Some(13));
    assert_eq!(sequencer.state(), TourState::AtPoi(1));
}

#[rstest]
#[tokio::test]
async fn skip_after_a_failure_passes_over_the_failed_poi(harness: Harness) {
    let Harness { robot, sequencer } = ready(harness).await;
    robot.set_fail_on_poi_id(Some(12));
    assert!(sequencer.next().await.is_err());

    assert_eq!(ids(sequencer.skip().await.unwrap()), Some(13));
}

#[rstest]
#[case::poi(0, CancelReason::EnRouteToPoi)]
#[case::dock(3, CancelReason::EnRouteToDock)]
#[tokio::test]
async fn robot_stop_reports_where_the_leg_was_going(
    harness: Harness,
    #[case] completed_legs: usize,
    #[case] reason: CancelReason,
) {
    let Harness { robot, sequencer } = ready(harness).await;
    for _ in 0..completed_legs {
        sequencer.next().await.unwrap();
    }

    let (interrupted, ()) = tokio::join!(sequencer.next(), async {
        wait_until_moving(&sequencer).await;
        robot.stop().await.unwrap();
    });

    let failure = failure(interrupted.unwrap_err());
    assert_eq!(failure.cause(), &FailureCause::Interrupted(reason));
    assert!(!failure.is_critical());
    assert!(sequencer.in_flight().is_none());
}

#[rstest]
#[tokio::test]
async fn reinitializing_restarts_the_tour(harness: Harness) {
    let Harness { sequencer, .. } = ready(harness).await;
    sequencer.next().await.unwrap();

    sequencer.initialize(tour_pois()[1..].to_vec()).await.unwrap();

    assert_eq!(sequencer.state(), TourState::Docked);
    assert_eq!(sequencer.pois().len(), 2);
    assert_eq!(ids(sequencer.next().await.unwrap()), Some(13));
}

#[rstest]
#[tokio::test]
async fn cancel_right_after_initialization_stays_docked(harness: Harness) {
    let Harness { robot, sequencer } = ready(harness).await;

    sequencer.cancel().await.unwrap();

    assert_eq!(sequencer.state(), TourState::Docked);
    assert_eq!(sequencer.current_poi(), None);
    assert_eq!(ids(sequencer.next_poi()), Some(12));
    assert!(!robot.is_moving());
}

#[tokio::test]
async fn timed_out_leg_is_retried_by_resume() {
    let robot = fast_robot();
    let config = SequencerConfig {
        outcome_timeout_ms: Some(40),
        ..Default::default()
    };
    let sequencer = TourSequencer::new(robot.clone(), &config);
    sequencer.initialize(tour_pois()).await.unwrap();
    assert_eq!(ids(sequencer.next().await.unwrap()), Some(12));

    robot.set_eta_range(LatencyRange::new(500, 500)).unwrap();
    let failure = failure(sequencer.next().await.unwrap_err());

    assert_eq!(failure.cause(), &FailureCause::TimedOut);
    assert!(!failure.is_critical());
    assert_eq!(sequencer.position(), TourPosition::AtPoi(0));
    assert_eq!(sequencer.state(), TourState::AtPoi(0));

    robot.set_eta_range(LatencyRange::new(5, 10)).unwrap();
    assert_eq!(ids(sequencer.resume().await.unwrap()), Some(13));
}

#[tokio::test]
async fn next_is_refused_while_the_tour_is_reinitialized() {
    let robot = Arc::new(SlowRobot::new(
        Duration::from_millis(40),
        Duration::ZERO,
        LatencyRange::new(5, 10),
    ));
    let sequencer = TourSequencer::new(robot.clone(), &SequencerConfig::default());
    sequencer.initialize(tour_pois()).await.unwrap();
    sequencer.next().await.unwrap();
    sequencer.next().await.unwrap();

    let (initialized, next) = tokio::join!(sequencer.initialize(tour_pois()[..1].to_vec()), async {
        tokio::task::yield_now().await;
        sequencer.next().await
    });

    initialized.unwrap();
    assert!(matches!(next, Err(TourError::Initializing)));
    assert_eq!(sequencer.pois().len(), 1);
    assert_eq!(sequencer.state(), TourState::Docked);
    assert_eq!(sequencer.resume().await.unwrap(), None);
    assert_eq!(ids(sequencer.next().await.unwrap()), Some(12));
    assert_eq!(sequencer.next().await.unwrap(), None);
}

#[tokio::test]
async fn cancel_waits_for_the_pending_leg_to_be_accepted() {
    let robot = Arc::new(SlowRobot::new(
        Duration::ZERO,
        Duration::from_millis(30),
        LatencyRange::new(50, 60),
    ));
    let sequencer = TourSequencer::new(robot.clone(), &SequencerConfig::default());
    sequencer.initialize(tour_pois()).await.unwrap();

    let (interrupted, cancelled) = tokio::join!(sequencer.next(), async {
        tokio::task::yield_now().await;
        sequencer.cancel().await
    });

    cancelled.unwrap();
    assert!(failure(interrupted.unwrap_err()).is_interruption());
    assert_eq!(robot.accepted(), vec!["poi 12", "dock -1"]);
    assert_eq!(sequencer.state(), TourState::Docked);
    assert!(!robot.inner.is_moving());
}

#[tokio::test]
async fn legs_are_en_route_only_once_accepted() {
    let robot = Arc::new(SlowRobot::new(
        Duration::ZERO,
        Duration::from_millis(30),
        LatencyRange::new(100, 100),
    ));
    let sequencer = TourSequencer::new(robot.clone(), &SequencerConfig::default());
    sequencer.initialize(tour_pois()).await.unwrap();

    let (reached, (waiting, accepted)) = tokio::join!(sequencer.next(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        let waiting = (sequencer.state(), sequencer.in_flight());
        tokio::time::sleep(Duration::from_millis(40)).await;
        (waiting, sequencer.state())
    });

    assert_eq!(
        waiting,
        (TourState::Docked, Some(Destination::Poi { index: 0, id: 12 }))
    );
    assert_eq!(accepted, TourState::EnRouteToPoi(0));
    assert_eq!(ids(reached.unwrap()), Some(12));
}

#[tokio::test]
async fn rejected_leg_never_shows_as_en_route() {
    let robot = Arc::new(SlowRobot::new(
        Duration::ZERO,
        Duration::from_millis(30),
        LatencyRange::new(5, 10),
    ));
    robot.inner.set_fail_on_go_to_poi_id(Some(12));
    let sequencer = TourSequencer::new(robot.clone(), &SequencerConfig::default());
    sequencer.initialize(tour_pois()).await.unwrap();

    let (rejected, waiting) = tokio::join!(sequencer.next(), async {
        tokio::time::sleep(Duration::from_millis(10)).await;
        sequencer.state()
    });

    assert!(matches!(rejected, Err(TourError::Rejected(_))));
    assert_eq!(waiting, TourState::Docked);
    assert_eq!(sequencer.state(), TourState::Docked);
    assert!(robot.accepted().is_empty());
}
