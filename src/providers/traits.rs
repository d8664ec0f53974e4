//! Provider traits for capability-specific implementations.
//!
//! Lookup services take capability traits (`PlacesProvider`,
//! `AutocompleteProvider`, `GeocodingProvider`) rather than a concrete
//! client, so tests and alternative backends can stand in for the HTTP
//! client.
//!
//! Providers may fail with any [`WayfareError`](crate::WayfareError); the
//! optimizer passes these through to callers unchanged.

use async_trait::async_trait;

use crate::Result;
use crate::types::{GeocodeResult, LatLng, NearbyQuery, Place, Prediction};

// ============================================================================
// Places Provider
// ============================================================================

/// Provider for nearby points of interest.
#[async_trait]
pub trait PlacesProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    /// Places of `query.place_type` within `query.radius` metres of
    /// `query.location`.
    async fn nearby(&self, query: &NearbyQuery) -> Result<Vec<Place>>;
}

// ============================================================================
// Autocomplete Provider
// ============================================================================

/// Provider for ranked query completions.
#[async_trait]
pub trait AutocompleteProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    async fn autocomplete(&self, input: &str) -> Result<Vec<Prediction>>;
}

// ============================================================================
// Geocoding Provider
// ============================================================================

/// Provider for coordinate-to-address lookups.
#[async_trait]
pub trait GeocodingProvider: Send + Sync {
    /// Provider name for logging/debugging.
    fn name(&self) -> &str;

    async fn reverse_geocode(&self, location: LatLng) -> Result<Vec<GeocodeResult>>;
}
