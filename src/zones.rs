use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use rand::distributions::Alphanumeric;
use rand::{thread_rng, Rng};
use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use serde_json::json;
use tracing::{debug, info};

use crate::categories::SourceKind;
use crate::config::AppConfig;
use crate::db::now_timestamp;
use crate::descriptions::{DescriptionGenerator, LocalizedText};
use crate::engine::{CategoryResults, NearbyEngine};
use crate::errors::AppResult;

#[derive(Debug, Clone, Copy, Serialize)]
pub struct MaterializeSummary {
    pub zones_created: u32,
    pub total_places: u32,
}

pub struct ZoneMaterializer {
    db: Arc<Mutex<Connection>>,
    engine: NearbyEngine,
    descriptions: DescriptionGenerator,
}

impl ZoneMaterializer {
    pub fn new(db: Arc<Mutex<Connection>>, config: &AppConfig) -> Self {
        let engine = NearbyEngine::new(db.clone(), config);
        let descriptions = DescriptionGenerator::new(config);
        Self {
            db,
            engine,
            descriptions,
        }
    }

    #[cfg(test)]
    pub fn with_engine(
        db: Arc<Mutex<Connection>>,
        engine: NearbyEngine,
        descriptions: DescriptionGenerator,
    ) -> Self {
        Self {
            db,
            engine,
            descriptions,
        }
    }

    pub fn engine(&self) -> &NearbyEngine {
        &self.engine
    }

    pub async fn generate_recommendations(
        &self,
        property_id: &str,
        lat: f64,
        lng: f64,
        category_ids: Option<&[String]>,
    ) -> AppResult<MaterializeSummary> {
        let results = self.engine.fetch_nearby_places(lat, lng, category_ids).await;
        if results.is_empty() {
            info!(property_id, "no nearby places found; nothing to materialize");
            return Ok(MaterializeSummary {
                zones_created: 0,
                total_places: 0,
            });
        }

        let mut zones_created = 0u32;
        let mut total_places = 0u32;
        let mut next_order = self.next_zone_order(property_id)?;

        for category in &results {
            let descriptions = self
                .descriptions
                .generate(category.label, &category.places)
                .await;
            if self.write_zone(property_id, category, &descriptions, &mut next_order)? {
                zones_created += 1;
            }
            total_places += category.places.len() as u32;
        }

        info!(
            property_id,
            zones_created, total_places, "materialized recommendation zones"
        );
        Ok(MaterializeSummary {
            zones_created,
            total_places,
        })
    }

    fn next_zone_order(&self, property_id: &str) -> AppResult<i64> {
        let connection = self.db.lock();
        let max: Option<i64> = connection.query_row(
            "SELECT MAX(zone_order) FROM zones WHERE property_id = ?1",
            params![property_id],
            |row| row.get(0),
        )?;
        Ok(max.map_or(0, |value| value + 1))
    }

    fn write_zone(
        &self,
        property_id: &str,
        category: &CategoryResults,
        descriptions: &HashMap<usize, LocalizedText>,
        next_order: &mut i64,
    ) -> AppResult<bool> {
        let mut connection = self.db.lock();
        let tx = connection.transaction()?;

        let existing: Option<i64> = tx
            .query_row(
                "SELECT id FROM zones WHERE property_id = ?1 AND category = ?2",
                params![property_id, category.category_id],
                |row| row.get(0),
            )
            .optional()?;

        let now = now_timestamp();
        let (zone_id, created) = match existing {
            Some(zone_id) => {
                tx.execute(
                    "DELETE FROM recommendations WHERE zone_id = ?1",
                    params![zone_id],
                )?;
                tx.execute(
                    "UPDATE zones SET updated_at = ?1 WHERE id = ?2",
                    params![now, zone_id],
                )?;
                debug!(
                    zone_id,
                    category = category.category_id,
                    "replacing recommendations in existing zone"
                );
                (zone_id, false)
            }
            None => {
                let zone_id = tx.query_row(
                    "INSERT INTO zones (
                        property_id, category, name, icon, description, qr_code,
                        access_code, status, is_published, zone_order, created_at, updated_at
                    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'ACTIVE', 1, ?8, ?9, ?9)
                    RETURNING id",
                    params![
                        property_id,
                        category.category_id,
                        localized_label(category.label),
                        category.icon,
                        zone_blurb(category.label),
                        qr_code(property_id, category.category_id),
                        access_code(),
                        *next_order,
                        now,
                    ],
                    |row| row.get::<_, i64>(0),
                )?;
                *next_order += 1;
                debug!(
                    zone_id,
                    category = category.category_id,
                    "created recommendation zone"
                );
                (zone_id, true)
            }
        };

        for (position, place) in category.places.iter().enumerate() {
            let description_json = descriptions
                .get(&position)
                .map(serde_json::to_string)
                .transpose()?;
            tx.execute(
                "INSERT INTO recommendations (
                    zone_id, place_id, source, distance_meters, walk_minutes,
                    position, description
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    zone_id,
                    place.place_db_id,
                    source_tag(place.source),
                    place.distance_meters,
                    place.walk_minutes,
                    position as i64,
                    description_json,
                ],
            )?;
        }

        tx.commit()?;
        Ok(created)
    }
}

fn source_tag(source: SourceKind) -> &'static str {
    match source {
        SourceKind::Osm => "AUTO_OSM",
        SourceKind::Google => "AUTO_GOOGLE",
    }
}

fn localized_label(label: &str) -> String {
    json!({ "es": label }).to_string()
}

fn zone_blurb(label: &str) -> String {
    json!({ "es": format!("{label} cerca de tu alojamiento") }).to_string()
}

fn qr_code(property_id: &str, category_id: &str) -> String {
    format!(
        "REC-{}-{}-{}",
        property_suffix(property_id),
        category_id,
        base36(Utc::now().timestamp_millis())
    )
}

fn access_code() -> String {
    let salt: String = thread_rng()
        .sample_iter(&Alphanumeric)
        .take(4)
        .map(char::from)
        .collect();
    format!("R{}{}", base36(Utc::now().timestamp_millis()), salt).to_uppercase()
}

fn property_suffix(property_id: &str) -> String {
    let chars: Vec<char> = property_id.chars().collect();
    let start = chars.len().saturating_sub(6);
    chars[start..].iter().collect()
}

fn base36(mut value: i64) -> String {
    const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    if value <= 0 {
        return "0".to_string();
    }
    let mut encoded = Vec::new();
    while value > 0 {
        encoded.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    encoded.reverse();
    encoded.into_iter().map(char::from).collect()
}
