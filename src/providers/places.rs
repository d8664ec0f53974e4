//! Places API client for nearby search, autocomplete and reverse geocoding.
//!
//! Speaks the Google Maps Platform JSON web-service format: every
//! response carries a `status` string alongside its payload, and
//! quota/auth problems are reported there rather than via HTTP status.
//! See: <https://developers.google.com/maps/documentation/places/web-service>

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use super::traits::{AutocompleteProvider, GeocodingProvider, PlacesProvider};
use crate::types::{GeocodeResult, LatLng, NearbyQuery, Place, Prediction};
use crate::{Result, WayfareError};

/// Default base URL for the places API
pub const DEFAULT_BASE_URL: &str = "https://maps.googleapis.com";

/// Default per-request timeout. The optimizer imposes none of its own,
/// so this is what bounds a hung lookup.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the places web service.
#[derive(Clone)]
pub struct PlacesClient {
    api_key: String,
    http: Client,
    base_url: String,
}

impl PlacesClient {
    /// Create a client against the public endpoint.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, DEFAULT_BASE_URL, DEFAULT_TIMEOUT)
    }

    /// Create a client with a custom base URL (for testing with wiremock).
    pub fn with_base_url(api_key: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Self::with_options(api_key, base_url, DEFAULT_TIMEOUT)
    }

    pub fn with_options(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| WayfareError::Configuration(format!("HTTP client: {e}")))?;

        Ok(Self {
            api_key: api_key.into(),
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    /// Search for places near a location.
    pub async fn nearby(&self, query: &NearbyQuery) -> Result<Vec<Place>> {
        if !query.location.is_valid() {
            return Err(WayfareError::InvalidInput(format!(
                "location out of range: {}",
                query.location
            )));
        }

        let url = format!("{}/maps/api/place/nearbysearch/json", self.base_url);
        let params = [
            ("location", query.location.to_string()),
            ("radius", query.radius.to_string()),
            ("type", query.place_type.clone()),
        ];
        let body: NearbyResponse = self.get(&url, &params).await?;
        check_status(&body.status, body.error_message)?;

        debug!(count = body.results.len(), "nearby search returned");
        Ok(body.results.into_iter().map(Place::from).collect())
    }

    /// Ranked completions for a partial query.
    pub async fn autocomplete(&self, input: &str) -> Result<Vec<Prediction>> {
        let url = format!("{}/maps/api/place/autocomplete/json", self.base_url);
        let body: AutocompleteResponse = self.get(&url, &[("input", input.to_string())]).await?;
        check_status(&body.status, body.error_message)?;
        Ok(body.predictions)
    }

    /// Addresses at a coordinate, best match first.
    pub async fn reverse_geocode(&self, location: LatLng) -> Result<Vec<GeocodeResult>> {
        let url = format!("{}/maps/api/geocode/json", self.base_url);
        let body: GeocodeResponse = self
            .get(&url, &[("latlng", location.to_string())])
            .await?;
        check_status(&body.status, body.error_message)?;
        Ok(body.results.into_iter().map(GeocodeResult::from).collect())
    }

    async fn get<R: for<'de> Deserialize<'de>>(
        &self,
        url: &str,
        params: &[(&str, String)],
    ) -> Result<R> {
        let response = self
            .http
            .get(url)
            .query(params)
            .query(&[("key", self.api_key.as_str())])
            .send()
            .await
            .map_err(|e| WayfareError::Http(e.to_string()))?;

        handle_response_errors(&response)?;

        response
            .json()
            .await
            .map_err(|e| WayfareError::Json(e.to_string()))
    }
}

/// Map a non-2xx HTTP status to an error.
fn handle_response_errors(response: &reqwest::Response) -> Result<()> {
    let status = response.status();

    if status.is_success() {
        return Ok(());
    }

    match status.as_u16() {
        401 | 403 => Err(WayfareError::AuthenticationFailed),
        429 => {
            let retry_after = response
                .headers()
                .get("retry-after")
                .and_then(|v| v.to_str().ok())
                .and_then(|s| s.parse::<u64>().ok())
                .map(Duration::from_secs);
            Err(WayfareError::RateLimited { retry_after })
        }
        code => Err(WayfareError::Api {
            status: code,
            message: format!("places API error: {status}"),
        }),
    }
}

/// Map the body-level `status` field to an error.
fn check_status(status: &str, message: Option<String>) -> Result<()> {
    match status {
        "OK" | "ZERO_RESULTS" => Ok(()),
        "OVER_QUERY_LIMIT" => Err(WayfareError::RateLimited { retry_after: None }),
        "REQUEST_DENIED" => Err(WayfareError::AuthenticationFailed),
        "INVALID_REQUEST" => Err(WayfareError::InvalidInput(
            message.unwrap_or_else(|| "invalid request".to_string()),
        )),
        other => Err(WayfareError::Provider {
            status: other.to_string(),
            message,
        }),
    }
}

#[derive(Deserialize)]
struct NearbyResponse {
    status: String,
    #[serde(default)]
    results: Vec<RawPlace>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct AutocompleteResponse {
    status: String,
    #[serde(default)]
    predictions: Vec<Prediction>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct GeocodeResponse {
    status: String,
    #[serde(default)]
    results: Vec<RawGeocode>,
    error_message: Option<String>,
}

#[derive(Deserialize)]
struct Geometry {
    location: LatLng,
}

#[derive(Deserialize)]
struct RawPlace {
    place_id: String,
    name: String,
    geometry: Geometry,
    vicinity: Option<String>,
    rating: Option<f32>,
    user_ratings_total: Option<u32>,
    #[serde(default)]
    types: Vec<String>,
}

impl From<RawPlace> for Place {
    fn from(raw: RawPlace) -> Self {
        Place {
            place_id: raw.place_id,
            name: raw.name,
            location: raw.geometry.location,
            vicinity: raw.vicinity,
            rating: raw.rating,
            user_ratings_total: raw.user_ratings_total,
            types: raw.types,
        }
    }
}

#[derive(Deserialize)]
struct RawGeocode {
    formatted_address: String,
    place_id: String,
    geometry: Geometry,
}

impl From<RawGeocode> for GeocodeResult {
    fn from(raw: RawGeocode) -> Self {
        GeocodeResult {
            formatted_address: raw.formatted_address,
            place_id: raw.place_id,
            location: raw.geometry.location,
        }
    }
}

// ============================================================================
// Provider Trait Implementations
// ============================================================================

#[async_trait]
impl PlacesProvider for PlacesClient {
    fn name(&self) -> &str {
        "places-api"
    }

    async fn nearby(&self, query: &NearbyQuery) -> Result<Vec<Place>> {
        PlacesClient::nearby(self, query).await
    }
}

#[async_trait]
impl AutocompleteProvider for PlacesClient {
    fn name(&self) -> &str {
        "places-api"
    }

    async fn autocomplete(&self, input: &str) -> Result<Vec<Prediction>> {
        PlacesClient::autocomplete(self, input).await
    }
}

#[async_trait]
impl GeocodingProvider for PlacesClient {
    fn name(&self) -> &str {
        "places-api"
    }

    async fn reverse_geocode(&self, location: LatLng) -> Result<Vec<GeocodeResult>> {
        PlacesClient::reverse_geocode(self, location).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ok_and_zero_results_are_success() {
        assert!(check_status("OK", None).is_ok());
        assert!(check_status("ZERO_RESULTS", None).is_ok());
    }

    #[test]
    fn body_status_maps_to_errors() {
        assert!(matches!(
            check_status("OVER_QUERY_LIMIT", None),
            Err(WayfareError::RateLimited { .. })
        ));
        assert!(matches!(
            check_status("REQUEST_DENIED", Some("key invalid".into())),
            Err(WayfareError::AuthenticationFailed)
        ));
        assert!(matches!(
            check_status("INVALID_REQUEST", Some("missing location".into())),
            Err(WayfareError::InvalidInput(m)) if m == "missing location"
        ));
        assert!(matches!(
            check_status("UNKNOWN_ERROR", None),
            Err(WayfareError::Provider { status, .. }) if status == "UNKNOWN_ERROR"
        ));
    }

    #[test]
    fn trailing_slash_is_trimmed() {
        let client = PlacesClient::with_base_url("k", "http://localhost:1234/").unwrap();
        assert_eq!(client.base_url, "http://localhost:1234");
    }
}
