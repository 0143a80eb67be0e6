use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::categories::{Category, CategoryQuery, TagFilter};
use crate::config::AppConfig;
use crate::errors::AppResult;
use crate::geo::{haversine_meters, walk_minutes};
use crate::sources::{Candidate, SourceAdapter, SourceId};

const OVERPASS_TIMEOUT_SECS: u32 = 25;

#[derive(Clone)]
pub struct OverpassClient {
    http: Client,
    endpoint: String,
}

impl OverpassClient {
    pub fn new(config: &AppConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs.max(
                u64::from(OVERPASS_TIMEOUT_SECS),
            )))
            .build()
            .expect("overpass http client");
        Self {
            http,
            endpoint: config.overpass_endpoint.clone(),
        }
    }

    async fn search_area(
        &self,
        lat: f64,
        lng: f64,
        category: &Category,
    ) -> AppResult<Vec<Candidate>> {
        let Some(query) = build_query(lat, lng, category) else {
            return Ok(Vec::new());
        };
        debug!(category = category.id, "querying overpass interpreter");
        let response = self
            .http
            .post(&self.endpoint)
            .body(query)
            .send()
            .await?
            .error_for_status()?;
        let parsed: OverpassResponse = response.json().await?;
        Ok(candidates_from_elements(
            parsed.elements,
            lat,
            lng,
            category.max_results,
        ))
    }
}

#[async_trait]
impl SourceAdapter for OverpassClient {
    async fn search(&self, lat: f64, lng: f64, category: &Category) -> AppResult<Vec<Candidate>> {
        match self.search_area(lat, lng, category).await {
            Ok(candidates) => Ok(candidates),
            Err(err) => {
                warn!(
                    ?err,
                    category = category.id,
                    "overpass search failed; returning no candidates"
                );
                Ok(Vec::new())
            }
        }
    }
}

fn build_query(lat: f64, lng: f64, category: &Category) -> Option<String> {
    let CategoryQuery::OsmTags(filters) = category.query else {
        return None;
    };

    let mut statements = String::new();
    for filter in filters {
        let selector = tag_selector(filter);
        for kind in ["node", "way", "relation"] {
            let _ = writeln!(
                statements,
                "  {kind}{selector}(around:{radius},{lat},{lng});",
                radius = category.radius_m
            );
        }
    }

    Some(format!(
        "[out:json][timeout:{OVERPASS_TIMEOUT_SECS}];\n(\n{statements});\nout center;"
    ))
}

fn tag_selector(filter: &TagFilter) -> String {
    if let [value] = filter.values {
        format!("[\"{}\"=\"{}\"]", filter.key, value)
    } else {
        format!("[\"{}\"~\"^({})$\"]", filter.key, filter.values.join("|"))
    }
}

fn candidates_from_elements(
    elements: Vec<OverpassElement>,
    lat: f64,
    lng: f64,
    cap: usize,
) -> Vec<Candidate> {
    let mut candidates: Vec<Candidate> = elements
        .into_iter()
        .filter_map(|element| {
            let name = element
                .tags
                .get("name")
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())?;
            let (element_lat, element_lng) = element.coordinates()?;
            let distance = haversine_meters(lat, lng, element_lat, element_lng);
            Some(Candidate {
                source_id: SourceId::Osm(format!("{}/{}", element.kind, element.id)),
                name,
                address: street_address(&element.tags),
                lat: element_lat,
                lng: element_lng,
                rating: None,
                price_level: None,
                types: Vec::new(),
                tags: element.tags,
                business_status: None,
                photo_url: None,
                distance_meters: distance,
                walk_minutes: walk_minutes(distance),
            })
        })
        .collect();

    candidates.sort_by_key(|candidate| candidate.distance_meters);
    candidates.truncate(cap);
    candidates
}

fn street_address(tags: &BTreeMap<String, String>) -> Option<String> {
    let street = tags.get("addr:street")?;
    match tags.get("addr:housenumber") {
        Some(number) => Some(format!("{street} {number}")),
        None => Some(street.clone()),
    }
}

#[derive(Debug, Deserialize)]
struct OverpassResponse {
    #[serde(default)]
    elements: Vec<OverpassElement>,
}

#[derive(Debug, Deserialize)]
struct OverpassElement {
    #[serde(rename = "type")]
    kind: String,
    id: i64,
    lat: Option<f64>,
    lon: Option<f64>,
    center: Option<OverpassCenter>,
    #[serde(default)]
    tags: BTreeMap<String, String>,
}

impl OverpassElement {
    fn coordinates(&self) -> Option<(f64, f64)> {
        match (self.lat, self.lon) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => self.center.as_ref().map(|center| (center.lat, center.lon)),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OverpassCenter {
    lat: f64,
    lon: f64,
}
