use std::{env, io};

use secrecy::SecretString;
use serde::Serialize;
use tracing::debug;

const DEFAULT_OVERPASS_ENDPOINT: &str = "https://overpass-api.de/api/interpreter";
const DEFAULT_PLACES_ENDPOINT: &str = "https://maps.googleapis.com/maps/api/place";
const DEFAULT_MESSAGES_ENDPOINT: &str = "https://api.anthropic.com";
const DEFAULT_DESCRIPTION_MODEL: &str = "claude-haiku-4-5-20251001";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_file_name: String,
    pub overpass_endpoint: String,
    pub places_endpoint: String,
    pub places_rate_limit_qps: u32,
    pub google_places_api_key: Option<SecretString>,
    pub messages_endpoint: String,
    pub anthropic_api_key: Option<SecretString>,
    pub description_model: String,
    pub http_timeout_secs: u64,
}

#[derive(Clone, Debug, Serialize)]
pub struct PublicAppConfig {
    pub database_file_name: String,
    pub overpass_endpoint: String,
    pub places_endpoint: String,
    pub places_rate_limit_qps: u32,
    pub messages_endpoint: String,
    pub description_model: String,
    pub http_timeout_secs: u64,
    pub has_google_places_key: bool,
    pub has_anthropic_key: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        load_dotenv_if_applicable();
        Self {
            database_file_name: env::var("DATABASE_FILE_NAME")
                .unwrap_or_else(|_| "nearby-places.db".to_string()),
            overpass_endpoint: env::var("OVERPASS_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_OVERPASS_ENDPOINT.to_string()),
            places_endpoint: env::var("PLACES_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_PLACES_ENDPOINT.to_string()),
            places_rate_limit_qps: parse_u32("PLACES_RATE_LIMIT_QPS", 3),
            google_places_api_key: env::var("GOOGLE_PLACES_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            messages_endpoint: env::var("ANTHROPIC_BASE_URL")
                .unwrap_or_else(|_| DEFAULT_MESSAGES_ENDPOINT.to_string()),
            anthropic_api_key: env::var("ANTHROPIC_API_KEY")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(SecretString::from),
            description_model: env::var("DESCRIPTION_MODEL")
                .unwrap_or_else(|_| DEFAULT_DESCRIPTION_MODEL.to_string()),
            http_timeout_secs: parse_u64("HTTP_TIMEOUT_SECS", 10).max(1),
        }
    }

    pub fn public_profile(&self) -> PublicAppConfig {
        PublicAppConfig {
            database_file_name: self.database_file_name.clone(),
            overpass_endpoint: self.overpass_endpoint.clone(),
            places_endpoint: self.places_endpoint.clone(),
            places_rate_limit_qps: self.places_rate_limit_qps,
            messages_endpoint: self.messages_endpoint.clone(),
            description_model: self.description_model.clone(),
            http_timeout_secs: self.http_timeout_secs,
            has_google_places_key: self.google_places_api_key.is_some(),
            has_anthropic_key: self.anthropic_api_key.is_some(),
        }
    }
}

fn load_dotenv_if_applicable() {
    if !should_load_dotenv() {
        debug!("skipping .env load outside dev mode");
        return;
    }

    if let Err(err) = dotenvy::dotenv() {
        match &err {
            dotenvy::Error::Io(io_err) if io_err.kind() == io::ErrorKind::NotFound => {}
            _ => debug!(?err, "unable to load .env file"),
        }
    }
}

fn should_load_dotenv() -> bool {
    cfg!(debug_assertions) || parse_bool("ALLOW_DOTENV", false)
}

fn parse_bool(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|v| matches!(v.trim(), "1" | "true" | "TRUE" | "True"))
        .unwrap_or(default)
}

fn parse_u64(key: &str, default: u64) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u64>().ok())
        .unwrap_or(default)
}

fn parse_u32(key: &str, default: u32) -> u32 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(default)
}
