// core/map.rs

// Map data as reported by the robot, and the compatibility check that gates
// tour initialisation: every tour POI must exist in the device map, otherwise
// the whole tour is refused.

use super::poi::{PoiId, PointOfInterest};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A POI entry in the device map
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MapPoi {
    pub id_poi: PoiId,
    #[serde(default)]
    pub name: String,
}

/// The robot's current map, read once during initialisation
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MapData {
    #[serde(default)]
    pub pois: Vec<MapPoi>,
}

impl MapData {
    /// Builds map data holding the given POI ids
    pub fn from_ids(ids: impl IntoIterator<Item = PoiId>) -> Self {
        MapData {
            pois: ids
                .into_iter()
                .map(|id_poi| MapPoi {
                    id_poi,
                    name: String::new(),
                })
                .collect(),
        }
    }

    /// Parses the device's JSON map data; fields other than the POI ids are ignored
    pub fn from_json(raw: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(raw)
    }

    pub fn poi_ids(&self) -> HashSet<PoiId> {
        self.pois.iter().map(|p| p.id_poi).collect()
    }

    pub fn contains(&self, id: PoiId) -> bool {
        self.pois.iter().any(|p| p.id_poi == id)
    }
}

/// Returns the tour POI ids that the map does not know, in tour order
pub fn missing_pois(requested: &[PointOfInterest], map: &MapData) -> Vec<PoiId> {
    let known = map.poi_ids();
    requested
        .iter()
        .map(PointOfInterest::id)
        .filter(|id| !known.contains(id))
        .collect()
}

/// True only if every requested POI id is present in the map
pub fn is_compatible(requested: &[PointOfInterest], map: &MapData) -> bool {
    missing_pois(requested, map).is_empty()
}
