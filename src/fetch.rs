//! Direct HTTP fetch of the beach dataset
//!
//! One GET, no retries. Falling back to the embedded browser is the
//! orchestrator's job.

use async_trait::async_trait;
use reqwest::{Client, StatusCode, header};
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::SourceConfig;
use crate::models::{RawBeach, decode_beach_list};
use crate::validate::looks_like_api_payload;

#[derive(Error, Debug)]
pub enum FetchError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {0}")]
    Status(StatusCode),

    #[error("response is not JSON: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("response does not look like beach data: {0}")]
    Shape(String),
}

/// Anything able to produce the raw beach list in one attempt
#[async_trait]
pub trait BeachSource: Send + Sync {
    async fn fetch(&self) -> Result<Vec<RawBeach>, FetchError>;
}

/// Plain GET against the canonical endpoint with a mobile-browser signature
pub struct DirectFetcher {
    client: Client,
    url: String,
}

impl DirectFetcher {
    pub fn new(config: &SourceConfig) -> Result<Self, FetchError> {
        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/json"),
        );

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds.into()))
            .user_agent(config.user_agent.clone())
            .default_headers(headers)
            .build()?;

        Ok(Self {
            client,
            url: config.api_url.clone(),
        })
    }

    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Validate and decode a direct response body
pub fn parse_api_body(body: &str) -> Result<Vec<RawBeach>, FetchError> {
    let value: Value = serde_json::from_str(body)?;
    if !looks_like_api_payload(&value) {
        let detail = match value.as_array() {
            Some(items) if items.is_empty() => "empty list".to_string(),
            Some(_) => "first element lacks id or beachName".to_string(),
            None => "not a list".to_string(),
        };
        return Err(FetchError::Shape(detail));
    }
    match value {
        Value::Array(items) => Ok(decode_beach_list(items)),
        _ => Err(FetchError::Shape("not a list".to_string())),
    }
}

#[async_trait]
impl BeachSource for DirectFetcher {
    #[instrument(name = "direct_fetch", skip(self), fields(url = %self.url))]
    async fn fetch(&self) -> Result<Vec<RawBeach>, FetchError> {
        let response = self.client.get(&self.url).send().await?;

        let status = response.status();
        if !status.is_success() {
            debug!("Direct fetch rejected with status {}", status);
            return Err(FetchError::Status(status));
        }

        let body = response.text().await?;
        let beaches = parse_api_body(&body)?;
        info!("Direct fetch returned {} beaches", beaches.len());
        Ok(beaches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_api_body_accepts_beaches() {
        let beaches =
            parse_api_body(r#"[{"id": 1, "beachName": "Bellevue", "data": []}]"#).unwrap();
        assert_eq!(beaches.len(), 1);
        assert_eq!(beaches[0].beach_name.as_deref(), Some("Bellevue"));
    }

    #[test]
    fn test_parse_api_body_rejections() {
        assert!(matches!(
            parse_api_body("<html>Just a moment...</html>"),
            Err(FetchError::Parse(_))
        ));
        assert!(matches!(parse_api_body("[]"), Err(FetchError::Shape(_))));
        assert!(matches!(
            parse_api_body(r#"{"error": "blocked"}"#),
            Err(FetchError::Shape(_))
        ));
        assert!(matches!(
            parse_api_body(r#"[{"id": 1, "latitude": 55.0}]"#),
            Err(FetchError::Shape(_))
        ));
    }

    #[test]
    fn test_malformed_later_records_are_kept() {
        let body = r#"[
            {"id": 1, "beachName": "Bellevue", "latitude": 55.77, "data": []},
            {"id": 2, "beachName": "Amager", "latitude": "55.65", "data": null},
            {"id": 3, "beachName": 42, "data": [{"waterQuality": "2"}]},
            "stray"
        ]"#;
        let beaches = parse_api_body(body).unwrap();
        assert_eq!(beaches.len(), 3);
        assert_eq!(beaches[1].latitude, Some(55.65));
        assert!(beaches[1].data.is_empty());
        assert_eq!(beaches[2].beach_name.as_deref(), Some("42"));
        assert_eq!(beaches[2].data[0].water_quality, Some(2.0));
    }

    #[test]
    fn test_client_creation() {
        let fetcher = DirectFetcher::new(&SourceConfig::default()).unwrap();
        assert_eq!(fetcher.url(), "https://badevand.dk/api/next/beaches");
    }
}
