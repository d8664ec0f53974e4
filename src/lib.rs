//! Wayfare - request optimization for travel-assistant lookups
//!
//! This crate sits between UI-facing lookup services and rate-limited
//! third-party APIs (places, autocomplete, geocoding). Every remote call
//! goes through a single [`RequestOptimizer`], which provides:
//!
//! - a TTL cache keyed by category and canonicalised parameters,
//! - a sliding-window rate limiter per category, plus a global minimum
//!   spacing between requests,
//! - coalescing of identical concurrent requests onto one fetch.
//!
//! # Example
//!
//! ```rust,no_run
//! use wayfare::{LatLng, LookupService, NearbyQuery, OptimizerConfig, PlacesClient, RequestOptimizer};
//!
//! #[tokio::main]
//! async fn main() -> wayfare::Result<()> {
//!     let optimizer = RequestOptimizer::new(OptimizerConfig::default());
//!     let _sweeper = optimizer.spawn_sweeper();
//!
//!     let lookups = LookupService::new(optimizer, PlacesClient::new("your-api-key")?);
//!     let query = NearbyQuery::new(LatLng::new(3.15, 101.71), "restaurant", 1000);
//!
//!     for place in lookups.nearby_places(&query).await? {
//!         println!("{} ({:?})", place.name, place.rating);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
#[cfg(feature = "cli")]
pub mod config;
pub mod error;
pub mod key;
pub mod lookup;
pub mod optimizer;
pub mod providers;
pub mod telemetry;
pub mod types;

// Re-export main types at crate root
pub use error::{Result, WayfareError};
pub use key::RequestKey;
pub use lookup::{LookupConfig, LookupService};
pub use optimizer::{CacheStats, OptimizerConfig, RequestOptimizer};
pub use providers::PlacesClient;

// Re-export all types
pub use types::{GeocodeResult, LatLng, NearbyQuery, Place, Prediction};
