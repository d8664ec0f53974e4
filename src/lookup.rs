//! Category-specialised lookups routed through the optimizer.
//!
//! [`LookupService`] is what screens call: each method picks its
//! category and TTL, builds the fetch closure over the provider, and
//! hands both to [`RequestOptimizer::run`].

use std::sync::Arc;
use std::time::Duration;

use tracing::debug;

use crate::optimizer::RequestOptimizer;
use crate::providers::{AutocompleteProvider, GeocodingProvider, PlacesProvider};
use crate::telemetry;
use crate::types::{GeocodeResult, LatLng, NearbyQuery, Place, Prediction};
use crate::{Result, WayfareError};

/// Rate-limit bucket and cache namespace for nearby searches.
pub const PLACES: &str = "places";
/// Rate-limit bucket and cache namespace for autocomplete.
pub const AUTOCOMPLETE: &str = "autocomplete";
/// Rate-limit bucket and cache namespace for reverse geocoding.
pub const GEOCODING: &str = "geocoding";

/// Per-category cache lifetimes and the autocomplete threshold.
#[derive(Debug, Clone)]
pub struct LookupConfig {
    /// Default: 10 minutes.
    pub places_ttl: Duration,
    /// Default: 5 minutes.
    pub autocomplete_ttl: Duration,
    /// Default: 1 hour.
    pub geocoding_ttl: Duration,
    /// Trimmed inputs with fewer characters return no predictions without
    /// any lookup. Default: 3.
    pub min_autocomplete_chars: usize,
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            places_ttl: Duration::from_secs(10 * 60),
            autocomplete_ttl: Duration::from_secs(5 * 60),
            geocoding_ttl: Duration::from_secs(60 * 60),
            min_autocomplete_chars: 3,
        }
    }
}

impl LookupConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn places_ttl(mut self, ttl: Duration) -> Self {
        self.places_ttl = ttl;
        self
    }

    pub fn autocomplete_ttl(mut self, ttl: Duration) -> Self {
        self.autocomplete_ttl = ttl;
        self
    }

    pub fn geocoding_ttl(mut self, ttl: Duration) -> Self {
        self.geocoding_ttl = ttl;
        self
    }

    pub fn min_autocomplete_chars(mut self, n: usize) -> Self {
        self.min_autocomplete_chars = n;
        self
    }
}

/// Places, autocomplete and geocoding lookups sharing one optimizer.
pub struct LookupService {
    optimizer: RequestOptimizer,
    places: Arc<dyn PlacesProvider>,
    autocomplete: Arc<dyn AutocompleteProvider>,
    geocoding: Arc<dyn GeocodingProvider>,
    config: LookupConfig,
}

impl LookupService {
    /// Use one provider for all three capabilities.
    pub fn new<P>(optimizer: RequestOptimizer, provider: P) -> Self
    where
        P: PlacesProvider + AutocompleteProvider + GeocodingProvider + 'static,
    {
        let provider = Arc::new(provider);
        Self::with_providers(
            optimizer,
            provider.clone(),
            provider.clone(),
            provider,
            LookupConfig::default(),
        )
    }

    pub fn with_providers(
        optimizer: RequestOptimizer,
        places: Arc<dyn PlacesProvider>,
        autocomplete: Arc<dyn AutocompleteProvider>,
        geocoding: Arc<dyn GeocodingProvider>,
        config: LookupConfig,
    ) -> Self {
        Self {
            optimizer,
            places,
            autocomplete,
            geocoding,
            config,
        }
    }

    pub fn with_config(mut self, config: LookupConfig) -> Self {
        self.config = config;
        self
    }

    pub fn optimizer(&self) -> &RequestOptimizer {
        &self.optimizer
    }

    pub async fn nearby_places(&self, query: &NearbyQuery) -> Result<Vec<Place>> {
        check_location(query.location)?;

        let provider = Arc::clone(&self.places);
        let owned = query.clone();
        self.optimizer
            .run(
                PLACES,
                query,
                move || async move { provider.nearby(&owned).await },
                self.config.places_ttl,
            )
            .await
    }

    /// Predictions for `input`, or an empty list when the trimmed input is
    /// shorter than `min_autocomplete_chars`. The short case never touches
    /// the cache, the rate limiter or the provider.
    pub async fn autocomplete(&self, input: &str) -> Result<Vec<Prediction>> {
        let input = input.trim();
        if input.chars().count() < self.config.min_autocomplete_chars {
            metrics::counter!(telemetry::SHORT_CIRCUIT_TOTAL).increment(1);
            debug!(len = input.chars().count(), "autocomplete input too short");
            return Ok(Vec::new());
        }

        let provider = Arc::clone(&self.autocomplete);
        let owned = input.to_string();
        self.optimizer
            .run(
                AUTOCOMPLETE,
                input,
                move || async move { provider.autocomplete(&owned).await },
                self.config.autocomplete_ttl,
            )
            .await
    }

    pub async fn reverse_geocode(&self, location: LatLng) -> Result<Vec<GeocodeResult>> {
        check_location(location)?;

        let provider = Arc::clone(&self.geocoding);
        self.optimizer
            .run(
                GEOCODING,
                &location,
                move || async move { provider.reverse_geocode(location).await },
                self.config.geocoding_ttl,
            )
            .await
    }
}

/// Reject coordinates before they can take a rate-limit slot.
fn check_location(location: LatLng) -> Result<()> {
    if location.is_valid() {
        return Ok(());
    }
    Err(WayfareError::InvalidInput(format!(
        "location out of range: {location}"
    )))
}
