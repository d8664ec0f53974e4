//! Place, prediction and geocoding records

use serde::{Deserialize, Serialize};

use super::LatLng;

/// Parameters of a nearby-places search.
///
/// Also the cache key for the `places` category, so two equal queries
/// share one cached result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearbyQuery {
    pub location: LatLng,
    #[serde(rename = "type")]
    pub place_type: String,
    /// Search radius in metres.
    pub radius: u32,
}

impl NearbyQuery {
    pub fn new(location: LatLng, place_type: impl Into<String>, radius: u32) -> Self {
        Self {
            location,
            place_type: place_type.into(),
            radius,
        }
    }
}

/// A point of interest returned by a places search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub place_id: String,
    pub name: String,
    pub location: LatLng,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vicinity: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rating: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_ratings_total: Option<u32>,
    #[serde(default)]
    pub types: Vec<String>,
}

/// One autocomplete suggestion, in provider rank order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Prediction {
    pub description: String,
    pub place_id: String,
}

/// A reverse-geocoding match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodeResult {
    pub formatted_address: String,
    pub place_id: String,
    pub location: LatLng,
}
