use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;
use tokio::time::{sleep, Instant};
use tracing::{debug, warn};

use crate::categories::{Category, CategoryQuery};
use crate::config::AppConfig;
use crate::errors::{AppError, AppResult};
use crate::geo::{haversine_meters, walk_minutes};
use crate::sources::{Candidate, OpenPeriod, OpeningHours, PlaceDetails, SourceAdapter, SourceId};

const SEARCH_LANGUAGE: &str = "es";
const FIND_PLACE_FIELDS: &str =
    "place_id,name,formatted_address,geometry,rating,price_level,types,business_status,photos";
const DETAIL_FIELDS: &str =
    "formatted_phone_number,website,opening_hours,rating,price_level,photos";

#[derive(Clone)]
pub struct GooglePlacesClient {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    limiter: Arc<RateLimiter>,
}

impl GooglePlacesClient {
    pub fn new(config: &AppConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .expect("places http client");
        Self {
            http,
            endpoint: config.places_endpoint.clone(),
            api_key: config.google_places_api_key.clone(),
            limiter: Arc::new(RateLimiter::new(config.places_rate_limit_qps.max(1))),
        }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn search_catalog(
        &self,
        lat: f64,
        lng: f64,
        category: &Category,
    ) -> AppResult<Vec<Candidate>> {
        let Some(key) = self.api_key.as_ref() else {
            debug!(
                category = category.id,
                "places credential missing; skipping search"
            );
            return Ok(Vec::new());
        };

        let location = format!("{lat},{lng}");
        let radius = category.radius_m.to_string();
        let request = match category.query {
            CategoryQuery::GoogleNearby(kind) => self
                .http
                .get(format!("{}/nearbysearch/json", self.endpoint))
                .query(&[
                    ("location", location.as_str()),
                    ("radius", radius.as_str()),
                    ("type", kind),
                    ("key", key.expose_secret()),
                    ("language", SEARCH_LANGUAGE),
                ]),
            CategoryQuery::GoogleText(text) => self
                .http
                .get(format!("{}/textsearch/json", self.endpoint))
                .query(&[
                    ("query", text),
                    ("location", location.as_str()),
                    ("radius", radius.as_str()),
                    ("key", key.expose_secret()),
                    ("language", SEARCH_LANGUAGE),
                ]),
            CategoryQuery::OsmTags(_) => return Ok(Vec::new()),
        };

        self.limiter.wait().await;
        let response = request.send().await?.error_for_status()?;
        let payload: SearchPayload = response.json().await?;
        if !search_status_accepted(&payload.status) {
            return Err(AppError::Provider(format!(
                "places search returned {}",
                payload.status
            )));
        }
        Ok(self.to_candidates(payload.results, lat, lng, category.max_results))
    }

    pub async fn find_place_id(
        &self,
        name: &str,
        lat: f64,
        lng: f64,
    ) -> AppResult<Option<String>> {
        let Some(key) = self.api_key.as_ref() else {
            return Ok(None);
        };

        let bias = format!("circle:50000@{lat},{lng}");
        self.limiter.wait().await;
        let response = self
            .http
            .get(format!("{}/findplacefromtext/json", self.endpoint))
            .query(&[
                ("input", name),
                ("inputtype", "textquery"),
                ("locationbias", bias.as_str()),
                ("fields", FIND_PLACE_FIELDS),
                ("key", key.expose_secret()),
                ("language", SEARCH_LANGUAGE),
            ])
            .send()
            .await?
            .error_for_status()?;
        let payload: FindPlacePayload = response.json().await?;
        if !search_status_accepted(&payload.status) {
            return Err(AppError::Provider(format!(
                "find place returned {}",
                payload.status
            )));
        }
        Ok(payload
            .candidates
            .into_iter()
            .next()
            .and_then(|candidate| candidate.place_id))
    }

    pub async fn place_details(&self, place_id: &str) -> AppResult<Option<PlaceDetails>> {
        let Some(key) = self.api_key.as_ref() else {
            return Ok(None);
        };

        self.limiter.wait().await;
        let response = self
            .http
            .get(format!("{}/details/json", self.endpoint))
            .query(&[
                ("place_id", place_id),
                ("fields", DETAIL_FIELDS),
                ("key", key.expose_secret()),
                ("language", SEARCH_LANGUAGE),
            ])
            .send()
            .await?
            .error_for_status()?;
        let payload: DetailsPayload = response.json().await?;
        if payload.status != "OK" {
            debug!(place_id, status = payload.status, "place details unavailable");
            return Ok(None);
        }
        let Some(result) = payload.result else {
            return Ok(None);
        };

        Ok(Some(PlaceDetails {
            phone: result.formatted_phone_number,
            website: result.website,
            opening_hours: result.opening_hours.map(OpeningHours::from),
            photo_url: result
                .photos
                .first()
                .and_then(|photo| self.photo_url(&photo.photo_reference)),
            rating: result.rating,
            price_level: result.price_level,
        }))
    }

    fn to_candidates(
        &self,
        results: Vec<SearchResultPayload>,
        lat: f64,
        lng: f64,
        cap: usize,
    ) -> Vec<Candidate> {
        // Provider relevance ranking is positional; keep it instead of re-sorting.
        results
            .into_iter()
            .filter_map(|result| self.to_candidate(result, lat, lng))
            .take(cap)
            .collect()
    }

    fn to_candidate(&self, result: SearchResultPayload, lat: f64, lng: f64) -> Option<Candidate> {
        let place_id = result.place_id?;
        let name = result
            .name
            .map(|name| name.trim().to_string())
            .filter(|name| !name.is_empty())?;
        let location = result.geometry?.location;
        let distance = haversine_meters(lat, lng, location.lat, location.lng);
        Some(Candidate {
            source_id: SourceId::Google(place_id),
            name,
            address: result.address,
            lat: location.lat,
            lng: location.lng,
            rating: result.rating,
            price_level: result.price_level,
            types: result.types,
            tags: BTreeMap::new(),
            business_status: result.business_status,
            photo_url: result
                .photos
                .first()
                .and_then(|photo| self.photo_url(&photo.photo_reference)),
            distance_meters: distance,
            walk_minutes: walk_minutes(distance),
        })
    }

    fn photo_url(&self, reference: &str) -> Option<String> {
        let key = self.api_key.as_ref()?;
        Some(format!(
            "{}/photo?maxwidth=400&photo_reference={}&key={}",
            self.endpoint,
            reference,
            key.expose_secret()
        ))
    }
}

#[async_trait]
impl SourceAdapter for GooglePlacesClient {
    async fn search(&self, lat: f64, lng: f64, category: &Category) -> AppResult<Vec<Candidate>> {
        match self.search_catalog(lat, lng, category).await {
            Ok(candidates) => Ok(candidates),
            Err(err) => {
                warn!(
                    ?err,
                    category = category.id,
                    "places search failed; returning no candidates"
                );
                Ok(Vec::new())
            }
        }
    }
}

fn search_status_accepted(status: &str) -> bool {
    matches!(status, "OK" | "ZERO_RESULTS")
}

struct RateLimiter {
    min_interval: Duration,
    last_tick: AsyncMutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(qps: u32) -> Self {
        let interval_ms = (1000_f64 / f64::from(qps.max(1))).ceil() as u64;
        Self {
            min_interval: Duration::from_millis(interval_ms.max(50)),
            last_tick: AsyncMutex::new(None),
        }
    }

    async fn wait(&self) {
        let mut guard = self.last_tick.lock().await;
        if let Some(prev) = *guard {
            let elapsed = prev.elapsed();
            if elapsed < self.min_interval {
                sleep(self.min_interval - elapsed).await;
            }
        }
        *guard = Some(Instant::now());
    }
}

#[derive(Debug, Deserialize)]
struct SearchPayload {
    status: String,
    #[serde(default)]
    results: Vec<SearchResultPayload>,
}

#[derive(Debug, Deserialize)]
struct FindPlacePayload {
    status: String,
    #[serde(default)]
    candidates: Vec<SearchResultPayload>,
}

#[derive(Debug, Deserialize)]
struct SearchResultPayload {
    place_id: Option<String>,
    name: Option<String>,
    #[serde(default, alias = "vicinity", alias = "formatted_address")]
    address: Option<String>,
    geometry: Option<GeometryPayload>,
    rating: Option<f64>,
    price_level: Option<u8>,
    #[serde(default)]
    types: Vec<String>,
    business_status: Option<String>,
    #[serde(default)]
    photos: Vec<PhotoPayload>,
}

#[derive(Debug, Deserialize)]
struct GeometryPayload {
    location: LocationPayload,
}

#[derive(Debug, Deserialize)]
struct LocationPayload {
    lat: f64,
    lng: f64,
}

#[derive(Debug, Deserialize)]
struct PhotoPayload {
    photo_reference: String,
}

#[derive(Debug, Deserialize)]
struct DetailsPayload {
    status: String,
    result: Option<DetailsResultPayload>,
}

#[derive(Debug, Deserialize)]
struct DetailsResultPayload {
    formatted_phone_number: Option<String>,
    website: Option<String>,
    opening_hours: Option<HoursPayload>,
    rating: Option<f64>,
    price_level: Option<u8>,
    #[serde(default)]
    photos: Vec<PhotoPayload>,
}

#[derive(Debug, Deserialize)]
struct HoursPayload {
    #[serde(default)]
    periods: Vec<PeriodPayload>,
    #[serde(default)]
    weekday_text: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PeriodPayload {
    open: PeriodPointPayload,
    close: Option<PeriodPointPayload>,
}

#[derive(Debug, Deserialize)]
struct PeriodPointPayload {
    day: u8,
    time: String,
}

impl From<HoursPayload> for OpeningHours {
    fn from(payload: HoursPayload) -> Self {
        Self {
            periods: payload
                .periods
                .into_iter()
                .map(|period| OpenPeriod {
                    day: period.open.day,
                    open: period.open.time,
                    close: period.close.map(|point| point.time),
                })
                .collect(),
            weekday_text: payload.weekday_text,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn keyed_client() -> GooglePlacesClient {
        GooglePlacesClient {
            http: Client::new(),
            endpoint: "https://places.test/api/place".into(),
            api_key: Some(SecretString::from("unit-key".to_string())),
            limiter: Arc::new(RateLimiter::new(10)),
        }
    }

    fn disabled_client() -> GooglePlacesClient {
        GooglePlacesClient {
            http: Client::new(),
            endpoint: "http://127.0.0.1:9/api/place".into(),
            api_key: None,
            limiter: Arc::new(RateLimiter::new(10)),
        }
    }

    #[test]
    fn maps_results_and_keeps_provider_order() {
        let payload: SearchPayload = serde_json::from_value(json!({
            "status": "OK",
            "results": [
                {
                    "place_id": "far",
                    "name": "Bar Llunyà",
                    "formatted_address": "Av. Diagonal 600",
                    "geometry": {"location": {"lat": 41.3950, "lng": 2.1900}},
                    "rating": 4.7,
                    "price_level": 3,
                    "types": ["restaurant"],
                    "business_status": "OPERATIONAL",
                    "photos": [{"photo_reference": "ref-1"}]
                },
                {
                    "place_id": "near",
                    "name": "Bar Proper",
                    "vicinity": "Carrer de Pelai 10",
                    "geometry": {"location": {"lat": 41.3852, "lng": 2.1735}}
                },
                {
                    "name": "Sense identificador",
                    "geometry": {"location": {"lat": 41.0, "lng": 2.0}}
                }
            ]
        }))
        .unwrap();

        let client = keyed_client();
        let candidates = client.to_candidates(payload.results, 41.3851, 2.1734, 10);

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].source_id, SourceId::Google("far".into()));
        assert_eq!(candidates[1].source_id, SourceId::Google("near".into()));
        assert!(candidates[0].distance_meters > candidates[1].distance_meters);
        assert_eq!(candidates[0].address.as_deref(), Some("Av. Diagonal 600"));
        assert_eq!(candidates[1].address.as_deref(), Some("Carrer de Pelai 10"));
        let photo = candidates[0].photo_url.as_deref().unwrap();
        assert!(photo.starts_with("https://places.test/api/place/photo?maxwidth=400"));
        assert!(photo.contains("photo_reference=ref-1"));
        assert!(photo.contains("key=unit-key"));
    }

    #[test]
    fn truncates_to_requested_cap() {
        let payload: SearchPayload = serde_json::from_value(json!({
            "status": "OK",
            "results": [
                {"place_id": "a", "name": "A", "geometry": {"location": {"lat": 41.0, "lng": 2.0}}},
                {"place_id": "b", "name": "B", "geometry": {"location": {"lat": 41.0, "lng": 2.0}}},
                {"place_id": "c", "name": "C", "geometry": {"location": {"lat": 41.0, "lng": 2.0}}}
            ]
        }))
        .unwrap();

        let candidates = keyed_client().to_candidates(payload.results, 41.0, 2.0, 2);
        assert_eq!(candidates.len(), 2);
    }

    #[test]
    fn accepts_empty_result_statuses_only() {
        assert!(search_status_accepted("OK"));
        assert!(search_status_accepted("ZERO_RESULTS"));
        assert!(!search_status_accepted("OVER_QUERY_LIMIT"));
        assert!(!search_status_accepted("REQUEST_DENIED"));
    }

    #[test]
    fn converts_structured_hours() {
        let payload: HoursPayload = serde_json::from_value(json!({
            "periods": [
                {"open": {"day": 1, "time": "0900"}, "close": {"day": 1, "time": "2000"}},
                {"open": {"day": 0, "time": "0000"}}
            ],
            "weekday_text": ["lunes: 9:00–20:00"]
        }))
        .unwrap();

        let hours = OpeningHours::from(payload);
        assert_eq!(hours.periods.len(), 2);
        assert_eq!(hours.periods[0].day, 1);
        assert_eq!(hours.periods[0].close.as_deref(), Some("2000"));
        assert!(hours.periods[1].close.is_none());
        assert_eq!(hours.weekday_text, vec!["lunes: 9:00–20:00"]);
    }

    #[tokio::test]
    async fn missing_credential_short_circuits_every_call() {
        let client = disabled_client();
        let restaurant = crate::categories::category_by_id("restaurant").unwrap();

        assert!(client.search(41.0, 2.0, restaurant).await.unwrap().is_empty());
        assert!(client.find_place_id("Bar", 41.0, 2.0).await.unwrap().is_none());
        assert!(client.place_details("x").await.unwrap().is_none());
    }
}
