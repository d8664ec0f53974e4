//! Provider implementations for place lookups.
//!
//! Services depend on the capability traits in [`traits`]; [`PlacesClient`]
//! implements all of them against a Google Places-style HTTP API.

pub mod places;
pub mod traits;

pub use places::PlacesClient;
pub use traits::{AutocompleteProvider, GeocodingProvider, PlacesProvider};
