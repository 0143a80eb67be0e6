use std::collections::HashMap;
use std::fmt::Write as _;
use std::time::Duration;

use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::engine::PlaceResult;
use crate::errors::AppResult;

const ANTHROPIC_VERSION: &str = "2023-06-01";
const MAX_RESPONSE_TOKENS: u32 = 2048;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalizedText {
    pub es: String,
    pub en: String,
    pub fr: String,
}

#[derive(Clone)]
pub struct DescriptionGenerator {
    http: Client,
    endpoint: String,
    api_key: Option<SecretString>,
    model: String,
}

impl DescriptionGenerator {
    pub fn new(config: &AppConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()
            .expect("messages http client");
        Self {
            http,
            endpoint: config.messages_endpoint.clone(),
            api_key: config.anthropic_api_key.clone(),
            model: config.description_model.clone(),
        }
    }

    pub fn enabled(&self) -> bool {
        self.api_key.is_some()
    }

    pub async fn generate(
        &self,
        category_label: &str,
        places: &[PlaceResult],
    ) -> HashMap<usize, LocalizedText> {
        let Some(key) = self.api_key.as_ref() else {
            debug!(
                category = category_label,
                "description credential missing; skipping generation"
            );
            return HashMap::new();
        };
        if places.is_empty() {
            return HashMap::new();
        }

        match self.request_batch(key, category_label, places).await {
            Ok(map) => map,
            Err(err) => {
                warn!(
                    ?err,
                    category = category_label,
                    "description generation failed; leaving places undescribed"
                );
                HashMap::new()
            }
        }
    }

    async fn request_batch(
        &self,
        key: &SecretString,
        category_label: &str,
        places: &[PlaceResult],
    ) -> AppResult<HashMap<usize, LocalizedText>> {
        let body = json!({
            "model": self.model,
            "max_tokens": MAX_RESPONSE_TOKENS,
            "temperature": 0.3,
            "messages": [{"role": "user", "content": build_prompt(category_label, places)}],
        });
        let response = self
            .http
            .post(format!("{}/v1/messages", self.endpoint))
            .header("x-api-key", key.expose_secret())
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let payload: MessagesPayload = response.json().await?;
        let text = payload
            .content
            .first()
            .map(|block| block.text.as_str())
            .unwrap_or_default();
        Ok(parse_batch(text, places.len()))
    }
}

fn build_prompt(category_label: &str, places: &[PlaceResult]) -> String {
    let mut listing = String::new();
    for (position, place) in places.iter().enumerate() {
        let _ = write!(listing, "{}. {}", position + 1, place.name);
        if let Some(address) = &place.address {
            let _ = write!(listing, " | {address}");
        }
        if let Some(rating) = place.rating {
            let _ = write!(listing, " | valoración {rating}");
        }
        if let Some(hours) = &place.opening_hours {
            if !hours.weekday_text.is_empty() {
                let _ = write!(listing, " | {}", hours.weekday_text.join("; "));
            }
        }
        listing.push('\n');
    }

    format!(
        "Escribe descripciones breves y atractivas para estos lugares de la categoría \
         \"{category_label}\", pensadas para huéspedes de un alojamiento cercano.\n\n\
         {listing}\n\
         Para cada lugar escribe una descripción de máximo 15 palabras en español, \
         inglés y francés.\n\
         Responde únicamente con un array JSON válido, sin texto adicional ni marcas \
         de código:\n\
         [{{\"index\": 1, \"es\": \"...\", \"en\": \"...\", \"fr\": \"...\"}}]"
    )
}

fn parse_batch(raw: &str, count: usize) -> HashMap<usize, LocalizedText> {
    let cleaned = strip_code_fences(raw);
    let (Some(start), Some(end)) = (cleaned.find('['), cleaned.rfind(']')) else {
        if !cleaned.is_empty() {
            warn!("description payload carried no JSON array");
        }
        return HashMap::new();
    };
    if end < start {
        return HashMap::new();
    }

    let entries: Vec<DescriptionEntry> = match serde_json::from_str(&cleaned[start..=end]) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(?err, "description payload was not valid JSON");
            return HashMap::new();
        }
    };

    let mut map = HashMap::new();
    for entry in entries {
        if entry.index == 0 || entry.index > count {
            continue;
        }
        map.insert(
            entry.index - 1,
            LocalizedText {
                es: entry.es,
                en: entry.en,
                fr: entry.fr,
            },
        );
    }
    map
}

fn strip_code_fences(raw: &str) -> String {
    raw.replace("```json", "").replace("```", "").trim().to_string()
}

#[derive(Debug, Deserialize)]
struct MessagesPayload {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct DescriptionEntry {
    index: usize,
    #[serde(default)]
    es: String,
    #[serde(default)]
    en: String,
    #[serde(default)]
    fr: String,
}
