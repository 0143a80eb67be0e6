use tracing::{debug, warn};

use crate::categories::SourceKind;
use crate::engine::PlaceResult;
use crate::errors::AppResult;
use crate::google::GooglePlacesClient;
use crate::sources::PlaceDetails;
use crate::store::PlaceStore;

#[derive(Clone)]
pub struct DetailEnricher {
    google: GooglePlacesClient,
    store: PlaceStore,
}

impl DetailEnricher {
    pub fn new(google: GooglePlacesClient, store: PlaceStore) -> Self {
        Self { google, store }
    }

    // Sequential on purpose: the details provider is metered.
    pub async fn enrich(&self, results: &mut [PlaceResult]) {
        if !self.google.enabled() {
            debug!("details credential missing; skipping enrichment");
            return;
        }

        for result in results.iter_mut() {
            match self.details_for(result).await {
                Ok(Some(details)) => {
                    if let Err(err) = self.store.apply_details(result.place_db_id, &details) {
                        warn!(?err, place = result.name, "failed persisting place details");
                    }
                    apply_to_result(result, details);
                }
                Ok(None) => {}
                Err(err) => {
                    warn!(
                        ?err,
                        place = result.name,
                        "detail lookup failed; leaving place unenriched"
                    );
                }
            }
        }
    }

    async fn details_for(&self, result: &PlaceResult) -> AppResult<Option<PlaceDetails>> {
        match result.source {
            SourceKind::Google => {
                let Some(place_id) = result.google_place_id.as_deref() else {
                    return Ok(None);
                };
                self.google.place_details(place_id).await
            }
            SourceKind::Osm => {
                let matched = self
                    .google
                    .find_place_id(&result.name, result.lat, result.lng)
                    .await?;
                let Some(place_id) = matched else {
                    debug!(place = result.name, "no cross-source match");
                    return Ok(None);
                };
                self.google.place_details(&place_id).await
            }
        }
    }
}

fn apply_to_result(result: &mut PlaceResult, details: PlaceDetails) {
    if details.phone.is_some() {
        result.phone = details.phone;
    }
    if details.website.is_some() {
        result.website = details.website;
    }
    if details.opening_hours.is_some() {
        result.opening_hours = details.opening_hours;
    }
    if details.photo_url.is_some() {
        result.photo_url = details.photo_url;
    }
    if details.rating.is_some() {
        result.rating = details.rating;
    }
    if details.price_level.is_some() {
        result.price_level = details.price_level;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;
    use tempfile::tempdir;

    use crate::config::AppConfig;
    use crate::db::bootstrap;

    use super::*;

    fn offline_config() -> AppConfig {
        AppConfig {
            database_file_name: "enrich-test.db".into(),
            overpass_endpoint: "http://127.0.0.1:9".into(),
            places_endpoint: "http://127.0.0.1:9".into(),
            places_rate_limit_qps: 5,
            google_places_api_key: None,
            messages_endpoint: "http://127.0.0.1:9".into(),
            anthropic_api_key: None,
            description_model: "model".into(),
            http_timeout_secs: 1,
        }
    }

    fn sample_result() -> PlaceResult {
        PlaceResult {
            place_db_id: 1,
            source: SourceKind::Osm,
            osm_id: Some("node/7".into()),
            google_place_id: None,
            name: "Farmàcia Prop".into(),
            address: None,
            lat: 41.3851,
            lng: 2.1734,
            rating: None,
            price_level: None,
            types: Vec::new(),
            phone: None,
            website: None,
            opening_hours: None,
            photo_url: None,
            business_status: None,
            distance_meters: 90,
            walk_minutes: 2,
        }
    }

    #[tokio::test]
    async fn disabled_provider_leaves_results_untouched() {
        let dir = tempdir().unwrap();
        let context = bootstrap(dir.path(), "enrich-test.db").unwrap();
        let store = PlaceStore::new(Arc::new(Mutex::new(context.connection)));
        let enricher = DetailEnricher::new(GooglePlacesClient::new(&offline_config()), store);

        let mut results = vec![sample_result()];
        enricher.enrich(&mut results).await;
        assert!(results[0].phone.is_none());
        assert!(results[0].opening_hours.is_none());
    }

    #[test]
    fn detail_merge_fills_gaps_without_clearing() {
        let mut result = sample_result();
        result.rating = Some(4.1);
        result.phone = Some("+34 933 111 111".into());

        apply_to_result(
            &mut result,
            PlaceDetails {
                phone: None,
                website: Some("https://example.test".into()),
                opening_hours: None,
                photo_url: None,
                rating: Some(4.6),
                price_level: None,
            },
        );

        assert_eq!(result.phone.as_deref(), Some("+34 933 111 111"));
        assert_eq!(result.website.as_deref(), Some("https://example.test"));
        assert_eq!(result.rating, Some(4.6));
    }
}
