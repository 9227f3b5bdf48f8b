//! Sync runtime configuration.
//!
//! Settings come from an optional JSON file and are then overlaid with
//! `TALLY_*` environment variables. Keys and tokens placed here are public
//! client credentials; service-role secrets must never be stored here.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::queue::{DeadLetterPolicy, DEFAULT_QUEUE_KEY};
use crate::remote::RestBackendConfig;
use crate::sync::{SyncOptions, DEFAULT_REMOTE_TIMEOUT_SECS};
use crate::util::{is_http_url, normalize_text_option};
use crate::{Error, Result};

pub const ENV_BACKEND_URL: &str = "TALLY_BACKEND_URL";
pub const ENV_BACKEND_ANON_KEY: &str = "TALLY_BACKEND_ANON_KEY";
pub const ENV_ACCESS_TOKEN: &str = "TALLY_ACCESS_TOKEN";
pub const ENV_PROBE_URL: &str = "TALLY_PROBE_URL";
pub const ENV_MAX_RETRIES: &str = "TALLY_MAX_RETRIES";
pub const ENV_REMOTE_TIMEOUT_SECS: &str = "TALLY_REMOTE_TIMEOUT_SECS";

const fn default_remote_timeout_secs() -> u64 {
    DEFAULT_REMOTE_TIMEOUT_SECS
}

fn default_queue_key() -> String {
    DEFAULT_QUEUE_KEY.to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SyncSettings {
    #[serde(default = "default_queue_key")]
    pub queue_key: String,
    #[serde(default = "default_remote_timeout_secs")]
    pub remote_timeout_secs: u64,
    /// Failed replays before an item is dead-lettered; unset retries forever.
    #[serde(default)]
    pub max_retries: Option<u32>,
    #[serde(default)]
    pub backend_url: Option<String>,
    #[serde(default)]
    pub backend_anon_key: Option<String>,
    #[serde(default)]
    pub backend_access_token: Option<String>,
    #[serde(default)]
    pub connectivity_probe_url: Option<String>,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            queue_key: default_queue_key(),
            remote_timeout_secs: DEFAULT_REMOTE_TIMEOUT_SECS,
            max_retries: None,
            backend_url: None,
            backend_anon_key: None,
            backend_access_token: None,
            connectivity_probe_url: None,
        }
    }
}

impl SyncSettings {
    /// Read settings from a JSON file. A missing file yields the defaults.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(error) => return Err(error.into()),
        };
        let settings: Self = serde_json::from_str(&raw).map_err(|error| {
            Error::Config(format!("invalid settings in {}: {error}", path.display()))
        })?;
        Ok(settings.normalized())
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(raw)
            .map_err(|error| Error::Config(format!("invalid settings JSON: {error}")))?;
        Ok(settings.normalized())
    }

    /// Overlay values from the process environment.
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides(|name| std::env::var(name).ok())
    }

    /// Overlay values from an arbitrary variable lookup.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |name: &str| normalize_text_option(lookup(name));

        if let Some(url) = read(ENV_BACKEND_URL) {
            self.backend_url = Some(url);
        }
        if let Some(key) = read(ENV_BACKEND_ANON_KEY) {
            self.backend_anon_key = Some(key);
        }
        if let Some(token) = read(ENV_ACCESS_TOKEN) {
            self.backend_access_token = Some(token);
        }
        if let Some(url) = read(ENV_PROBE_URL) {
            self.connectivity_probe_url = Some(url);
        }
        if let Some(raw) = read(ENV_MAX_RETRIES) {
            self.max_retries = Some(parse_number(ENV_MAX_RETRIES, &raw)?);
        }
        if let Some(raw) = read(ENV_REMOTE_TIMEOUT_SECS) {
            self.remote_timeout_secs = parse_number(ENV_REMOTE_TIMEOUT_SECS, &raw)?;
        }
        Ok(self.normalized())
    }

    pub fn validate(&self) -> Result<()> {
        if self.remote_timeout_secs == 0 {
            return Err(Error::Config(
                "remote_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.max_retries == Some(0) {
            return Err(Error::Config(
                "max_retries must be at least 1 when set".to_string(),
            ));
        }
        for (field, value) in [
            ("backend_url", &self.backend_url),
            ("connectivity_probe_url", &self.connectivity_probe_url),
        ] {
            if let Some(url) = value {
                if !is_http_url(url) {
                    return Err(Error::Config(format!(
                        "{field} must include http:// or https://"
                    )));
                }
            }
        }
        Ok(())
    }

    pub const fn dead_letter_policy(&self) -> DeadLetterPolicy {
        DeadLetterPolicy {
            max_retries: self.max_retries,
        }
    }

    pub const fn sync_options(&self) -> SyncOptions {
        SyncOptions {
            remote_timeout: Duration::from_secs(self.remote_timeout_secs),
            dead_letter: self.dead_letter_policy(),
        }
    }

    /// Backend connection details, when both URL and anon key are configured.
    pub fn rest_backend_config(&self) -> Option<RestBackendConfig> {
        Some(RestBackendConfig {
            base_url: self.backend_url.clone()?,
            anon_key: self.backend_anon_key.clone()?,
            access_token: self.backend_access_token.clone(),
        })
    }

    fn normalized(mut self) -> Self {
        self.queue_key =
            normalize_text_option(Some(self.queue_key)).unwrap_or_else(default_queue_key);
        self.backend_url = normalize_text_option(self.backend_url)
            .map(|url| url.trim_end_matches('/').to_string());
        self.backend_anon_key = normalize_text_option(self.backend_anon_key);
        self.backend_access_token = normalize_text_option(self.backend_access_token);
        self.connectivity_probe_url = normalize_text_option(self.connectivity_probe_url);
        self
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, raw: &str) -> Result<T> {
    raw.parse()
        .map_err(|_| Error::Config(format!("{name} must be a non-negative integer, got '{raw}'")))
}
