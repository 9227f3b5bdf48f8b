//! PostgREST-style backend client used by the hosted data API.

use std::fmt;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::Deserialize;

use super::{RemoteBackend, RemoteError, RemoteResult, ReplayRequest};
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

const REST_PATH: &str = "/rest/v1";
const MAX_ERROR_CHARS: usize = 180;

#[derive(Clone, PartialEq, Eq)]
pub struct RestBackendConfig {
    pub base_url: String,
    pub anon_key: String,
    /// User session token; the anon key is sent as bearer when absent.
    pub access_token: Option<String>,
}

impl fmt::Debug for RestBackendConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("RestBackendConfig")
            .field("base_url", &self.base_url)
            .field("anon_key", &"[REDACTED]")
            .field(
                "access_token",
                &self.access_token.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

#[derive(Clone)]
pub struct RestRemoteBackend {
    rest_url: String,
    anon_key: String,
    bearer: String,
    client: Client,
}

impl RestRemoteBackend {
    pub fn new(config: RestBackendConfig) -> Result<Self> {
        let rest_url = normalize_rest_url(&config.base_url)?;
        let anon_key = normalize_text_option(Some(config.anon_key))
            .ok_or_else(|| Error::Config("Backend anon key must not be empty".to_string()))?;
        let bearer = normalize_text_option(config.access_token).unwrap_or_else(|| anon_key.clone());

        Ok(Self {
            rest_url,
            anon_key,
            bearer,
            client: Client::builder()
                .build()
                .map_err(|error| Error::Config(format!("failed to build HTTP client: {error}")))?,
        })
    }

    fn table_url(&self, table_name: &str) -> RemoteResult<String> {
        let valid = !table_name.is_empty()
            && table_name
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '_');
        if !valid {
            return Err(RemoteError::new(format!(
                "invalid table name '{table_name}'"
            )));
        }
        Ok(format!("{}/{}", self.rest_url, table_name))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request
            .header("apikey", &self.anon_key)
            .bearer_auth(&self.bearer)
            .header("Accept", "application/json")
    }

    async fn send(&self, request: RequestBuilder) -> RemoteResult<()> {
        let response = self.authorized(request).send().await?;
        if response.status().is_success() {
            return Ok(());
        }

        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        Err(RemoteError::new(parse_api_error(status, &body)))
    }
}

#[async_trait]
impl RemoteBackend for RestRemoteBackend {
    async fn insert(&self, request: &ReplayRequest) -> RemoteResult<()> {
        let url = self.table_url(&request.table_name)?;
        self.send(
            self.client
                .post(url)
                .header("Prefer", "return=minimal,resolution=ignore-duplicates")
                .header("Idempotency-Key", &request.idempotency_key)
                .json(&request.payload),
        )
        .await
    }

    async fn update(&self, request: &ReplayRequest) -> RemoteResult<()> {
        let url = self.table_url(&request.table_name)?;
        self.send(
            self.client
                .patch(url)
                .query(&[("id", format!("eq.{}", request.record_id))])
                .header("Prefer", "return=minimal")
                .json(&request.payload),
        )
        .await
    }

    async fn delete(&self, request: &ReplayRequest) -> RemoteResult<()> {
        let url = self.table_url(&request.table_name)?;
        self.send(
            self.client
                .delete(url)
                .query(&[("id", format!("eq.{}", request.record_id))])
                .header("Prefer", "return=minimal"),
        )
        .await
    }
}

pub fn normalize_rest_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return Err(Error::Config("Backend URL must not be empty".to_string()));
    }
    if !is_http_url(trimmed) {
        return Err(Error::Config(
            "Backend URL must include http:// or https://".to_string(),
        ));
    }
    if trimmed.ends_with(REST_PATH) {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{trimmed}{REST_PATH}"))
    }
}

#[derive(Debug, Deserialize)]
struct RestErrorResponse {
    message: Option<String>,
    details: Option<String>,
    hint: Option<String>,
    error: Option<String>,
}

fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<RestErrorResponse>(body) {
        if let Some(message) = payload
            .message
            .or(payload.error)
            .or(payload.details)
            .or(payload.hint)
        {
            return format!("{} ({})", clip_error_text(&message), status.as_u16());
        }
    }

    let trimmed = body.trim();
    if trimmed.is_empty() {
        format!("HTTP {}", status.as_u16())
    } else {
        format!("{} ({})", clip_error_text(trimmed), status.as_u16())
    }
}

/// Backend error bodies can echo whole rows back; keep the first line short.
fn clip_error_text(text: &str) -> String {
    text.trim().chars().take(MAX_ERROR_CHARS).collect()
}
