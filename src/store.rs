use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::now_timestamp;
use crate::errors::AppResult;
use crate::sources::{Candidate, OpeningHours, PlaceDetails, SourceId};

#[derive(Clone)]
pub struct PlaceStore {
    db: Arc<Mutex<Connection>>,
}

#[derive(Debug, Clone)]
pub struct PlaceRecord {
    pub id: i64,
    pub osm_id: Option<String>,
    pub google_place_id: Option<String>,
    pub source: String,
    pub name: String,
    pub address: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub rating: Option<f64>,
    pub price_level: Option<u8>,
    pub types: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub business_status: Option<String>,
    pub phone: Option<String>,
    pub website: Option<String>,
    pub opening_hours: Option<OpeningHours>,
    pub photo_url: Option<String>,
}

impl PlaceStore {
    pub fn new(db: Arc<Mutex<Connection>>) -> Self {
        Self { db }
    }

    pub fn upsert(&self, candidate: &Candidate) -> AppResult<i64> {
        let source = candidate.source_id.source().as_str();
        match &candidate.source_id {
            SourceId::Osm(code) => self.upsert_keyed("osm_id", code, source, candidate),
            SourceId::Google(place_id) => {
                self.upsert_keyed("google_place_id", place_id, source, candidate)
            }
        }
    }

    fn upsert_keyed(
        &self,
        key_column: &str,
        key: &str,
        source: &str,
        candidate: &Candidate,
    ) -> AppResult<i64> {
        let types_json = if candidate.types.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&candidate.types)?)
        };
        let tags_json = if candidate.tags.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&candidate.tags)?)
        };

        let sql = format!(
            "INSERT INTO places (
                {key_column}, source, name, address, lat, lng, rating, price_level,
                types, osm_tags, business_status, photo_url, last_fetched_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            ON CONFLICT({key_column}) DO UPDATE SET
                name = excluded.name,
                address = COALESCE(excluded.address, places.address),
                lat = excluded.lat,
                lng = excluded.lng,
                rating = COALESCE(excluded.rating, places.rating),
                price_level = COALESCE(excluded.price_level, places.price_level),
                types = excluded.types,
                osm_tags = excluded.osm_tags,
                business_status = COALESCE(excluded.business_status, places.business_status),
                photo_url = COALESCE(excluded.photo_url, places.photo_url),
                last_fetched_at = excluded.last_fetched_at
            RETURNING id"
        );

        let connection = self.db.lock();
        let id = connection.query_row(
            &sql,
            params![
                key,
                source,
                candidate.name,
                candidate.address,
                candidate.lat,
                candidate.lng,
                candidate.rating,
                candidate.price_level,
                types_json,
                tags_json,
                candidate.business_status,
                candidate.photo_url,
                now_timestamp(),
            ],
            |row| row.get::<_, i64>(0),
        )?;
        Ok(id)
    }

    pub fn apply_details(&self, place_id: i64, details: &PlaceDetails) -> AppResult<()> {
        let hours_json = details
            .opening_hours
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;
        let connection = self.db.lock();
        connection.execute(
            "UPDATE places SET
                phone = COALESCE(?1, phone),
                website = COALESCE(?2, website),
                opening_hours = COALESCE(?3, opening_hours),
                photo_url = COALESCE(?4, photo_url),
                rating = COALESCE(?5, rating),
                price_level = COALESCE(?6, price_level)
             WHERE id = ?7",
            params![
                details.phone,
                details.website,
                hours_json,
                details.photo_url,
                details.rating,
                details.price_level,
                place_id,
            ],
        )?;
        Ok(())
    }

    pub fn load_by_ids(&self, ids: &[i64]) -> AppResult<Vec<PlaceRecord>> {
        let connection = self.db.lock();
        let mut statement = connection.prepare(
            "SELECT id, osm_id, google_place_id, source, name, address, lat, lng,
                    rating, price_level, types, osm_tags, business_status, phone,
                    website, opening_hours, photo_url
             FROM places WHERE id = ?1",
        )?;

        let mut records = Vec::with_capacity(ids.len());
        for id in ids {
            let record = statement
                .query_row(params![id], map_place_row)
                .optional()?;
            if let Some(record) = record {
                records.push(record);
            }
        }
        Ok(records)
    }
}

fn map_place_row(row: &Row<'_>) -> rusqlite::Result<PlaceRecord> {
    let types: Option<String> = row.get(10)?;
    let tags: Option<String> = row.get(11)?;
    let hours: Option<String> = row.get(15)?;
    Ok(PlaceRecord {
        id: row.get(0)?,
        osm_id: row.get(1)?,
        google_place_id: row.get(2)?,
        source: row.get(3)?,
        name: row.get(4)?,
        address: row.get(5)?,
        lat: row.get(6)?,
        lng: row.get(7)?,
        rating: row.get(8)?,
        price_level: row.get(9)?,
        types: types
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default(),
        tags: tags
            .and_then(|text| serde_json::from_str(&text).ok())
            .unwrap_or_default(),
        business_status: row.get(12)?,
        phone: row.get(13)?,
        website: row.get(14)?,
        opening_hours: hours.and_then(|text| serde_json::from_str(&text).ok()),
        photo_url: row.get(16)?,
    })
}
