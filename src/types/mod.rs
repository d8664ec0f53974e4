//! Public types for the Wayfare API.

mod geo;
mod place;

pub use geo::LatLng;
pub use place::{GeocodeResult, NearbyQuery, Place, Prediction};
