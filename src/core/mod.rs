// core/mod.rs

// Value types shared by the robot boundary and the tour sequencer: POIs, tour
// failures, device map data with its compatibility check, and tour position.

pub mod failure;
pub mod map;
pub mod poi;
pub mod state;

pub use failure::{CancelReason, FailureCause, TourFailure};
pub use map::{is_compatible, missing_pois, MapData, MapPoi};
pub use poi::{PoiId, PointOfInterest};
pub use state::{TourPosition, TourState};
