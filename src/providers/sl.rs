//! Client for the SL Transport site-departures API with proxy fallback.

use std::time::Duration;

use reqwest::Client;
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::{Config, ProxyMode};

#[derive(Debug, Error)]
pub enum SlError {
    #[error("Network error: {0}")]
    NetworkError(String),
    #[error("Parse error: {0}")]
    ParseError(String),
    #[error("API error: {0}")]
    ApiError(String),
    #[error("All departure sources failed, last error: {0}")]
    AllSourcesFailed(String),
}

/// One entry in the fallback chain: a full request URL plus the rule for
/// unwrapping the body it returns.
#[derive(Debug, Clone)]
pub struct Source {
    pub url: String,
    pub mode: ProxyMode,
    /// Short name for log lines ("direct" or the proxy prefix)
    pub label: String,
}

/// SL Transport API client walking an ordered source chain
pub struct SlClient {
    client: Client,
    sources: Vec<Source>,
}

impl SlClient {
    pub fn new(config: &Config) -> Result<Self, SlError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.fetch.timeout_secs))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| SlError::NetworkError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            sources: fetch_plan(config),
        })
    }

    /// Fetch the raw departure payload, trying each source in order.
    /// The first source that yields a structurally valid payload wins.
    pub async fn fetch_departures(&self) -> Result<SiteDeparturesResponse, SlError> {
        let mut last_error: Option<SlError> = None;

        for source in &self.sources {
            match self.try_source(source).await {
                Ok(payload) => {
                    debug!(
                        source = %source.label,
                        departures = payload.departures.len(),
                        "Fetched departures"
                    );
                    return Ok(payload);
                }
                Err(e) => {
                    warn!(source = %source.label, error = %e, "Departure source failed");
                    last_error = Some(e);
                }
            }
        }

        Err(SlError::AllSourcesFailed(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no sources configured".to_string()),
        ))
    }

    async fn try_source(&self, source: &Source) -> Result<SiteDeparturesResponse, SlError> {
        let response = self
            .client
            .get(&source.url)
            .send()
            .await
            .map_err(|e| SlError::NetworkError(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SlError::ApiError(format!("HTTP error: {}", status.as_u16())));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SlError::NetworkError(e.to_string()))?;

        let result = parse_source_body(&body, source.mode);
        if let Err(e) = &result {
            // Truncate on a char boundary, bodies carry Swedish text
            let snippet: String = body.chars().take(500).collect();
            warn!(source = %source.label, error = %e, body = %snippet, "Unusable response body");
        }
        result
    }
}

/// Build the ordered source chain: the direct endpoint first, then each
/// configured proxy wrapping the same request URL.
fn fetch_plan(config: &Config) -> Vec<Source> {
    let api_url = format!(
        "{}/sites/{}/departures?transport=BUS&line={}&forecast={}",
        config.fetch.base_url, config.stop.site_id, config.stop.line, config.fetch.forecast_minutes
    );

    let mut sources = vec![Source {
        url: api_url.clone(),
        mode: ProxyMode::Direct,
        label: "direct".to_string(),
    }];

    for proxy in &config.fetch.proxies {
        sources.push(Source {
            url: format!("{}{}", proxy.prefix, api_url),
            mode: proxy.response,
            label: proxy.prefix.clone(),
        });
    }

    sources
}

/// Decode a response body according to the source's wrapping mode.
///
/// `Wrapped` sources return `{"contents": "<json>"}` with the real payload
/// JSON-encoded a second time inside the `contents` field.
fn parse_source_body(body: &str, mode: ProxyMode) -> Result<SiteDeparturesResponse, SlError> {
    match mode {
        ProxyMode::Direct => {
            serde_json::from_str(body).map_err(|e| SlError::ParseError(e.to_string()))
        }
        ProxyMode::Wrapped => {
            let envelope: ProxyEnvelope =
                serde_json::from_str(body).map_err(|e| SlError::ParseError(e.to_string()))?;
            serde_json::from_str(&envelope.contents)
                .map_err(|e| SlError::ParseError(format!("wrapped contents: {}", e)))
        }
    }
}

#[derive(Debug, Deserialize)]
struct ProxyEnvelope {
    contents: String,
}

/// Raw site-departures payload
#[derive(Debug, Clone, Deserialize)]
pub struct SiteDeparturesResponse {
    #[serde(default)]
    pub departures: Vec<ApiDeparture>,
}

/// One raw departure record as returned by the SL Transport API
#[derive(Debug, Clone, Deserialize)]
pub struct ApiDeparture {
    pub line: Option<LineRef>,
    pub destination: Option<String>,
    /// Live estimate, present only when real-time data is available
    pub expected: Option<String>,
    /// Timetabled departure time
    pub planned: Option<String>,
    pub direction: Option<String>,
}

/// The `line` field appears either as a bare designation string or as an
/// object carrying the designation.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum LineRef {
    Name(String),
    Designation { designation: Option<String> },
}

impl ApiDeparture {
    /// Line designation regardless of which shape the provider used
    pub fn line_designation(&self) -> Option<&str> {
        match self.line.as_ref()? {
            LineRef::Name(name) => Some(name.as_str()),
            LineRef::Designation { designation } => designation.as_deref(),
        }
    }

    /// Best available departure time: the live estimate if present,
    /// otherwise the timetabled time
    pub fn expected_time(&self) -> Option<&str> {
        self.expected.as_deref().or(self.planned.as_deref())
    }

    /// Whether the provider sent a live estimate for this departure
    pub fn is_real_time(&self) -> bool {
        self.expected.is_some()
    }
}
