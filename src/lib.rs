mod cache;
mod categories;
mod config;
mod db;
mod descriptions;
mod engine;
mod enrichment;
mod errors;
mod geo;
mod google;
mod overpass;
mod sources;
mod store;
mod zones;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use cache::{CachedEntry, TileCache, CACHE_TTL_DAYS};
pub use categories::{category_by_id, Category, CategoryQuery, SourceKind, TagFilter, CATEGORIES};
pub use config::{AppConfig, PublicAppConfig};
pub use db::{bootstrap, DatabaseContext};
pub use descriptions::{DescriptionGenerator, LocalizedText};
pub use engine::{CategoryResults, NearbyEngine, PlaceResult};
pub use enrichment::DetailEnricher;
pub use errors::{AppError, AppResult};
pub use geo::{haversine_meters, tile_key, walk_minutes};
pub use google::GooglePlacesClient;
pub use overpass::OverpassClient;
pub use sources::{Candidate, OpenPeriod, OpeningHours, PlaceDetails, SourceAdapter, SourceId};
pub use store::{PlaceRecord, PlaceStore};
pub use zones::{MaterializeSummary, ZoneMaterializer};

pub struct NearbyApp {
    db_path: PathBuf,
    config: AppConfig,
    materializer: ZoneMaterializer,
}

impl NearbyApp {
    pub fn initialize<P: AsRef<Path>>(data_dir: P) -> AppResult<Self> {
        init_tracing();
        let config = AppConfig::from_env();
        let DatabaseContext { connection, path } = bootstrap(&data_dir, &config.database_file_name)?;
        let db = Arc::new(Mutex::new(connection));
        let materializer = ZoneMaterializer::new(db, &config);
        Ok(Self {
            db_path: path,
            config,
            materializer,
        })
    }

    pub async fn generate_recommendations(
        &self,
        property_id: &str,
        lat: f64,
        lng: f64,
        category_ids: Option<&[String]>,
    ) -> AppResult<MaterializeSummary> {
        self.materializer
            .generate_recommendations(property_id, lat, lng, category_ids)
            .await
    }

    pub async fn fetch_nearby_places(
        &self,
        lat: f64,
        lng: f64,
        category_ids: Option<&[String]>,
    ) -> Vec<CategoryResults> {
        self.materializer
            .engine()
            .fetch_nearby_places(lat, lng, category_ids)
            .await
    }

    pub fn database_path(&self) -> &Path {
        &self.db_path
    }

    pub fn public_config(&self) -> PublicAppConfig {
        self.config.public_profile()
    }
}

pub fn init_tracing() {
    static INIT: OnceCell<()> = OnceCell::new();
    let _ = INIT.get_or_init(|| {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("info,nearby_places=debug"));
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    });
}
