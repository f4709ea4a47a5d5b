// core/state.rs

// Tour progress. The position is the only mutable piece of tour state: either
// the dock or the index of the last POI the robot actually reached. The wider
// `TourState` adds the leg in flight so callers can tell "at POI 2" from
// "leaving POI 2 for POI 3".

/// Where the robot last arrived
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum TourPosition {
    /// At the charging dock, not at any POI
    #[default]
    Docked,
    /// At the POI with this index in the tour
    AtPoi(usize),
}

impl TourPosition {
    pub fn index(&self) -> Option<usize> {
        match self {
            TourPosition::Docked => None,
            TourPosition::AtPoi(index) => Some(*index),
        }
    }

    /// Index of the POI after this position, or `None` when the dock comes next
    pub fn following(&self, tour_len: usize) -> Option<usize> {
        let next = match self {
            TourPosition::Docked => 0,
            TourPosition::AtPoi(index) => index + 1,
        };
        (next < tour_len).then_some(next)
    }
}

/// Robot operating states for a tour
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TourState {
    Uninitialized,
    Docked,
    EnRouteToPoi(usize),
    AtPoi(usize),
    EnRouteToDock,
}

impl TourState {
    pub fn is_moving(&self) -> bool {
        matches!(self, TourState::EnRouteToPoi(_) | TourState::EnRouteToDock)
    }
}
