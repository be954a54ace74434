//! Nominatim reverse geocoder with rate limiting.
//!
//! This module provides place name lookups against a Nominatim server with:
//! - One request per `min_interval_ms` (the public server allows 1 req/s)
//! - Automatic retry with exponential backoff on 429 and transport errors
//! - "Locality, Country" names built from the address parts

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use log::{debug, warn};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::{Result, TripClusterError};
use crate::geocode::ReverseGeocoder;
use crate::GpsPoint;

/// Configuration for [`NominatimGeocoder`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NominatimConfig {
    /// Server root, without the `/reverse` path.
    /// Default: https://nominatim.openstreetmap.org
    pub base_url: String,

    /// Sent as the User-Agent header; the public server rejects generic agents.
    pub user_agent: String,

    /// Minimum time between two requests.
    /// Default: 1000 ms
    pub min_interval_ms: u64,

    /// Retries after a 429 or a transport error.
    /// Default: 3
    pub max_retries: u32,

    /// Per-request timeout.
    /// Default: 30 s
    pub timeout_secs: u64,

    /// Nominatim zoom level; 10 resolves to city granularity.
    /// Default: 10
    pub zoom: u8,
}

impl Default for NominatimConfig {
    fn default() -> Self {
        Self {
            base_url: "https://nominatim.openstreetmap.org".to_string(),
            user_agent: concat!("trip-cluster/", env!("CARGO_PKG_VERSION")).to_string(),
            min_interval_ms: 1000,
            max_retries: 3,
            timeout_secs: 30,
            zoom: 10,
        }
    }
}

/// API response for the reverse endpoint
#[derive(Debug, Default, Deserialize)]
struct ReverseResponse {
    display_name: Option<String>,
    address: Option<Address>,
    error: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Address {
    city: Option<String>,
    town: Option<String>,
    village: Option<String>,
    municipality: Option<String>,
    hamlet: Option<String>,
    county: Option<String>,
    state: Option<String>,
    country: Option<String>,
}

/// Build a display name from a reverse response.
fn place_name(response: ReverseResponse) -> Option<String> {
    if response.error.is_some() {
        return None;
    }

    let address = response.address.unwrap_or_default();
    let locality = address
        .city
        .or(address.town)
        .or(address.village)
        .or(address.municipality)
        .or(address.hamlet)
        .or(address.county)
        .or(address.state);

    match (locality, address.country) {
        (Some(locality), Some(country)) => Some(format!("{}, {}", locality, country)),
        (Some(locality), None) => Some(locality),
        (None, Some(country)) => Some(country),
        (None, None) => response.display_name,
    }
}

/// Rate limiter enforcing a minimum interval between requests
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
    consecutive_429s: AtomicU32,
}

impl RateLimiter {
    fn new(min_interval: Duration) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval,
            consecutive_429s: AtomicU32::new(0),
        }
    }

    /// Wait until a request may be sent and claim the slot.
    ///
    /// The lock is held while sleeping so concurrent callers queue up.
    async fn acquire(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(previous) = *last {
            let next_allowed = previous + self.min_interval;
            let now = Instant::now();
            if next_allowed > now {
                let wait = next_allowed - now;
                debug!("[Nominatim] Rate limit: waiting {:?}", wait);
                tokio::time::sleep(wait).await;
            }
        }
        *last = Some(Instant::now());
    }

    fn record_success(&self) {
        self.consecutive_429s.store(0, Ordering::Relaxed);
    }

    fn record_429(&self) -> Duration {
        let count = self.consecutive_429s.fetch_add(1, Ordering::Relaxed) + 1;
        // Exponential backoff: 2s, 4s, 8s, 16s
        let backoff_ms = 1000 * (1u64 << count.min(4));
        Duration::from_millis(backoff_ms)
    }
}

/// Reverse geocoder backed by a Nominatim server.
pub struct NominatimGeocoder {
    client: Client,
    config: NominatimConfig,
    rate_limiter: Arc<RateLimiter>,
}

impl NominatimGeocoder {
    pub fn new(config: NominatimConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.clone())
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| TripClusterError::Http {
                message: format!("Failed to create HTTP client: {}", e),
                status_code: None,
            })?;

        Ok(Self {
            client,
            rate_limiter: Arc::new(RateLimiter::new(Duration::from_millis(
                config.min_interval_ms,
            ))),
            config,
        })
    }

    pub fn config(&self) -> &NominatimConfig {
        &self.config
    }

    /// Look up the place name for a point.
    pub async fn lookup(&self, point: GpsPoint) -> Result<Option<String>> {
        let url = format!("{}/reverse", self.config.base_url.trim_end_matches('/'));
        let query = [
            ("format", "jsonv2".to_string()),
            ("lat", point.latitude.to_string()),
            ("lon", point.longitude.to_string()),
            ("zoom", self.config.zoom.to_string()),
            ("addressdetails", "1".to_string()),
        ];

        let mut retries = 0;

        loop {
            self.rate_limiter.acquire().await;

            match self.client.get(&url).query(&query).send().await {
                Ok(resp) => {
                    let status = resp.status();

                    if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                        retries += 1;
                        if retries > self.config.max_retries {
                            return Err(TripClusterError::Http {
                                message: "Max retries exceeded (429)".to_string(),
                                status_code: Some(status.as_u16()),
                            });
                        }

                        let backoff = self.rate_limiter.record_429();
                        warn!(
                            "[Nominatim] 429 for ({:.4}, {:.4}), retry {} after {:?}",
                            point.latitude, point.longitude, retries, backoff
                        );
                        tokio::time::sleep(backoff).await;
                        continue;
                    }

                    if !status.is_success() {
                        return Err(TripClusterError::Http {
                            message: format!("Reverse lookup failed: {}", status),
                            status_code: Some(status.as_u16()),
                        });
                    }

                    self.rate_limiter.record_success();
                    let body = resp.json::<ReverseResponse>().await.map_err(|e| {
                        TripClusterError::Geocode {
                            message: format!("Parse error: {}", e),
                        }
                    })?;
                    return Ok(place_name(body));
                }
                Err(e) => {
                    retries += 1;
                    if retries > self.config.max_retries {
                        return Err(TripClusterError::Http {
                            message: format!("Request error: {}", e),
                            status_code: None,
                        });
                    }

                    let backoff = Duration::from_millis(500 * (1u64 << retries.min(6)));
                    warn!(
                        "[Nominatim] Error for ({:.4}, {:.4}): {}, retry {} after {:?}",
                        point.latitude, point.longitude, e, retries, backoff
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

impl ReverseGeocoder for NominatimGeocoder {
    fn reverse_geocode(
        &self,
        point: GpsPoint,
    ) -> impl Future<Output = Result<Option<String>>> + Send {
        self.lookup(point)
    }
}
