// core/poi.rs

// A stop on the tour. POIs are built once by the caller before the tour starts
// and never change afterwards; two POIs are the same stop when their ids match,
// whatever their label or media paths say.

use serde::{Deserialize, Serialize};
use std::hash::{Hash, Hasher};

/// Identifier of a POI in the robot's map (`id_poi` in the device map data)
pub type PoiId = u32;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PointOfInterest {
    id: PoiId,
    label: String,
    #[serde(default)]
    image_path: String, // shown while the robot is on its way
    #[serde(default)]
    video_path: String, // played once the POI is reached
}

impl PointOfInterest {
    /// Creates a POI; `id` must match an `id_poi` in the robot's map
    pub fn new(
        id: PoiId,
        label: impl Into<String>,
        image_path: impl Into<String>,
        video_path: impl Into<String>,
    ) -> Self {
        PointOfInterest {
            id,
            label: label.into(),
            image_path: image_path.into(),
            video_path: video_path.into(),
        }
    }

    pub fn id(&self) -> PoiId {
        self.id
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn image_path(&self) -> &str {
        &self.image_path
    }

    pub fn video_path(&self) -> &str {
        &self.video_path
    }
}

impl PartialEq for PointOfInterest {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for PointOfInterest {}

impl Hash for PointOfInterest {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl std::fmt::Display for PointOfInterest {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{} (#{})", self.label, self.id)
    }
}
