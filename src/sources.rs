use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::categories::{Category, SourceKind};
use crate::errors::AppResult;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceId {
    Osm(String),
    Google(String),
}

impl SourceId {
    pub fn source(&self) -> SourceKind {
        match self {
            SourceId::Osm(_) => SourceKind::Osm,
            SourceId::Google(_) => SourceKind::Google,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Candidate {
    pub source_id: SourceId,
    pub name: String,
    pub address: Option<String>,
    pub lat: f64,
    pub lng: f64,
    pub rating: Option<f64>,
    pub price_level: Option<u8>,
    pub types: Vec<String>,
    pub tags: BTreeMap<String, String>,
    pub business_status: Option<String>,
    pub photo_url: Option<String>,
    pub distance_meters: u32,
    pub walk_minutes: u32,
}

#[derive(Debug, Clone, Default)]
pub struct PlaceDetails {
    pub phone: Option<String>,
    pub website: Option<String>,
    pub opening_hours: Option<OpeningHours>,
    pub photo_url: Option<String>,
    pub rating: Option<f64>,
    pub price_level: Option<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpeningHours {
    pub periods: Vec<OpenPeriod>,
    pub weekday_text: Vec<String>,
}

// Day numbering follows the provider: 0 = Sunday. A missing close marks an
// always-open period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenPeriod {
    pub day: u8,
    pub open: String,
    pub close: Option<String>,
}

#[async_trait]
pub trait SourceAdapter: Send + Sync {
    async fn search(&self, lat: f64, lng: f64, category: &Category) -> AppResult<Vec<Candidate>>;
}
