// src/main.rs
// Entry point for AMR Tour: runs a guided tour on the simulated robot.

// Loads the tour file, initializes the robot and walks it through every POI
// and back to the dock, once per lap. Recoverable failures are retried with
// `resume()`; a critical failure stops the run.
use amr_tour::{SimulatedRobot, TourConfig, TourError, TourSequencer};
use clap::Parser;
use log::{error, info, warn};
use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line options
#[derive(Debug, Parser)]
#[command(name = "amr-tour", version, about = "Guided tours for autonomous mobile robots")]
struct Args {
    /// Tour configuration file
    #[arg(short, long, default_value = "config/tour.yaml")]
    config: PathBuf,

    /// Number of complete tours to run
    #[arg(short, long, default_value_t = 1)]
    laps: u32,

    /// Retries per leg before giving up on a recoverable failure
    #[arg(long, default_value_t = 3)]
    max_retries: u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    info!("Starting AMR Tour...");

    let config = TourConfig::load(&args.config)?;
    let robot = Arc::new(SimulatedRobot::new(config.simulation.clone())?);
    let sequencer = TourSequencer::new(robot, &config.sequencer);

    sequencer.initialize(config.pois.clone()).await?;

    for lap in 1..=args.laps {
        info!("Lap {lap}/{}", args.laps);
        run_lap(&sequencer, args.max_retries).await?;
    }

    info!("AMR Tour completed");
    Ok(())
}

/// Visits every POI in order and ends at the dock
async fn run_lap(sequencer: &TourSequencer, max_retries: u32) -> Result<(), TourError> {
    loop {
        let mut result = sequencer.next().await;
        let mut retries = 0;

        while let Err(err) = &result {
            if err.is_critical() || retries == max_retries {
                error!("Tour halted, manual intervention required: {err}");
                return result.map(|_| ());
            }
            retries += 1;
            warn!("{err}; retrying ({retries}/{max_retries})");
            result = sequencer.resume().await;
        }

        match result? {
            Some(poi) => info!("Presenting {poi}"),
            None => return Ok(()),
        }
    }
}
