//! Network reachability checks gating sync passes.
//!
//! A positive answer is advisory: remote calls can still fail afterwards and
//! are handled by the per-item retry path.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use crate::util::is_http_url;
use crate::{Error, Result};

const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 4;

#[async_trait]
pub trait ConnectivityCheck: Send + Sync {
    async fn is_online(&self) -> bool;
}

/// Connectivity flag driven by the host platform's network callbacks.
#[derive(Debug, Clone)]
pub struct StaticConnectivity {
    online: Arc<AtomicBool>,
}

impl StaticConnectivity {
    pub fn new(online: bool) -> Self {
        Self {
            online: Arc::new(AtomicBool::new(online)),
        }
    }

    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }
}

impl Default for StaticConnectivity {
    fn default() -> Self {
        Self::new(true)
    }
}

#[async_trait]
impl ConnectivityCheck for StaticConnectivity {
    async fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }
}

/// Probes a URL; any HTTP response counts as online.
#[derive(Clone)]
pub struct HttpConnectivity {
    probe_url: String,
    client: Client,
}

impl HttpConnectivity {
    pub fn new(probe_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(probe_url, Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS))
    }

    pub fn with_timeout(probe_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let probe_url = probe_url.into().trim().to_string();
        if !is_http_url(&probe_url) {
            return Err(Error::Config(
                "Connectivity probe URL must include http:// or https://".to_string(),
            ));
        }

        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| Error::Config(format!("failed to build probe client: {error}")))?;
        Ok(Self { probe_url, client })
    }
}

#[async_trait]
impl ConnectivityCheck for HttpConnectivity {
    async fn is_online(&self) -> bool {
        match self.client.head(&self.probe_url).send().await {
            Ok(response) => {
                tracing::debug!(
                    "Connectivity probe {} answered {}",
                    self.probe_url,
                    response.status()
                );
                true
            }
            Err(error) => {
                tracing::debug!("Connectivity probe {} failed: {}", self.probe_url, error);
                false
            }
        }
    }
}
