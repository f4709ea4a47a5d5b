//! Tour navigation for AMR Tour
//!
//! This module holds the tour sequencer and the command/outcome correlation
//! it relies on to issue exactly one navigation command at a time.

pub mod correlation;
pub mod sequencer;

pub use correlation::{Arrival, CommandCorrelator, Destination, DispatchError};
pub use sequencer::{SequencerConfig, TourError, TourSequencer};
