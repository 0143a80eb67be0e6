use std::sync::Arc;

use chrono::Utc;
use futures_util::future::join_all;
use parking_lot::Mutex;
use rusqlite::Connection;
use serde::Serialize;
use tracing::{debug, warn};

use crate::cache::TileCache;
use crate::categories::{select_categories, Category, SourceKind};
use crate::config::AppConfig;
use crate::enrichment::DetailEnricher;
use crate::errors::AppResult;
use crate::geo::{haversine_meters, tile_key, walk_minutes};
use crate::google::GooglePlacesClient;
use crate::overpass::OverpassClient;
use crate::sources::{Candidate, OpeningHours, SourceAdapter, SourceId};
use crate::store::{PlaceRecord, PlaceStore};

#[derive(Debug, Clone, Serialize)]
pub struct PlaceResult {
    pub place_db_id: i64,
    pub source: SourceKind,
    pub osm_id: Option<String>,
    pub google_place_id: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub rating: Option<f64>,
    pub price_level: Option<u8>,
    pub types: Vec<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub opening_hours: Option<OpeningHours>,
    pub photo_url: Option<String>,
    pub business_status: Option<String>,
    pub distance_meters: u32,
    pub walk_minutes: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct CategoryResults {
    pub category_id: &'static str,
    pub label: &'static str,
    pub icon: &'static str,
    pub places: Vec<PlaceResult>,
}

pub struct NearbyEngine {
    store: PlaceStore,
    cache: TileCache,
    osm: Arc<dyn SourceAdapter>,
    google: Arc<dyn SourceAdapter>,
    enricher: DetailEnricher,
}

impl NearbyEngine {
    pub fn new(db: Arc<Mutex<Connection>>, config: &AppConfig) -> Self {
        let store = PlaceStore::new(db.clone());
        let cache = TileCache::new(db);
        let google_client = GooglePlacesClient::new(config);
        let enricher = DetailEnricher::new(google_client.clone(), store.clone());
        Self {
            store,
            cache,
            osm: Arc::new(OverpassClient::new(config)),
            google: Arc::new(google_client),
            enricher,
        }
    }

    #[cfg(test)]
    pub fn with_adapters(
        db: Arc<Mutex<Connection>>,
        config: &AppConfig,
        osm: Arc<dyn SourceAdapter>,
        google: Arc<dyn SourceAdapter>,
    ) -> Self {
        let store = PlaceStore::new(db.clone());
        let cache = TileCache::new(db);
        let enricher = DetailEnricher::new(GooglePlacesClient::new(config), store.clone());
        Self {
            store,
            cache,
            osm,
            google,
            enricher,
        }
    }

    pub async fn fetch_nearby_places(
        &self,
        lat: f64,
        lng: f64,
        category_ids: Option<&[String]>,
    ) -> Vec<CategoryResults> {
        if !valid_coordinates(lat, lng) {
            warn!(lat, lng, "invalid coordinates; returning no results");
            return Vec::new();
        }

        let tile = tile_key(lat, lng);
        let categories = select_categories(category_ids);
        debug!(tile, count = categories.len(), "aggregating nearby categories");

        let searches = categories.into_iter().map(|category| {
            let tile = tile.clone();
            async move {
                match self.search_category(&tile, lat, lng, category).await {
                    Ok(places) => CategoryResults {
                        category_id: category.id,
                        label: category.label,
                        icon: category.icon,
                        places,
                    },
                    Err(err) => {
                        warn!(
                            ?err,
                            category = category.id,
                            "category search failed; dropping category"
                        );
                        CategoryResults {
                            category_id: category.id,
                            label: category.label,
                            icon: category.icon,
                            places: Vec::new(),
                        }
                    }
                }
            }
        });

        join_all(searches)
            .await
            .into_iter()
            .filter(|results| !results.places.is_empty())
            .collect()
    }

    async fn search_category(
        &self,
        tile: &str,
        lat: f64,
        lng: f64,
        category: &'static Category,
    ) -> AppResult<Vec<PlaceResult>> {
        if let Some(entry) = self.cache.get(tile, category.id) {
            if !entry.is_stale(Utc::now()) {
                debug!(category = category.id, tile, "tile cache hit");
                return self.from_cache(&entry.place_ids, lat, lng, category);
            }
            debug!(category = category.id, tile, "tile cache entry expired");
        }

        let adapter = match category.source() {
            SourceKind::Osm => &self.osm,
            SourceKind::Google => &self.google,
        };
        let candidates = adapter.search(lat, lng, category).await?;
        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        let mut results = Vec::with_capacity(candidates.len());
        for candidate in &candidates {
            let place_db_id = self.store.upsert(candidate)?;
            results.push(result_from_candidate(place_db_id, category, candidate));
        }
        if category.fetch_details {
            self.enricher.enrich(&mut results).await;
        }

        let ids: Vec<i64> = results.iter().map(|result| result.place_db_id).collect();
        self.cache.put(tile, category.id, &ids);
        Ok(results)
    }

    fn from_cache(
        &self,
        ids: &[i64],
        lat: f64,
        lng: f64,
        category: &Category,
    ) -> AppResult<Vec<PlaceResult>> {
        let records = self.store.load_by_ids(ids)?;
        let mut results: Vec<PlaceResult> = records
            .into_iter()
            .map(|record| result_from_record(record, category, lat, lng))
            .collect();
        // Stored order was computed from a neighboring coordinate in the same
        // tile; distance-ranked categories need a re-sort against this one.
        if category.source() == SourceKind::Osm {
            results.sort_by_key(|result| result.distance_meters);
        }
        Ok(results)
    }
}

fn valid_coordinates(lat: f64, lng: f64) -> bool {
    lat.is_finite() && lng.is_finite() && lat != 0.0 && lng != 0.0
}

fn result_from_candidate(
    place_db_id: i64,
    category: &Category,
    candidate: &Candidate,
) -> PlaceResult {
    let (osm_id, google_place_id) = match &candidate.source_id {
        SourceId::Osm(code) => (Some(code.clone()), None),
        SourceId::Google(place_id) => (None, Some(place_id.clone())),
    };
    PlaceResult {
        place_db_id,
        source: category.source(),
        osm_id,
        google_place_id,
        name: candidate.name.clone(),
        address: candidate.address.clone(),
        lat: candidate.lat,
        lng: candidate.lng,
        rating: candidate.rating,
        price_level: candidate.price_level,
        types: candidate.types.clone(),
        phone: None,
        website: None,
        opening_hours: None,
        photo_url: candidate.photo_url.clone(),
        business_status: candidate.business_status.clone(),
        distance_meters: candidate.distance_meters,
        walk_minutes: candidate.walk_minutes,
    }
}

fn result_from_record(record: PlaceRecord, category: &Category, lat: f64, lng: f64) -> PlaceResult {
    let distance = haversine_meters(lat, lng, record.lat, record.lng);
    PlaceResult {
        place_db_id: record.id,
        source: category.source(),
        osm_id: record.osm_id,
        google_place_id: record.google_place_id,
        name: record.name,
        address: record.address,
        lat: record.lat,
        lng: record.lng,
        rating: record.rating,
        price_level: record.price_level,
        types: record.types,
        phone: record.phone,
        website: record.website,
        opening_hours: record.opening_hours,
        photo_url: record.photo_url,
        business_status: record.business_status,
        distance_meters: distance,
        walk_minutes: walk_minutes(distance),
    }
}
