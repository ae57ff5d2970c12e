//! HTTP probe backed by reqwest.

use std::time::Duration;

use async_trait::async_trait;
use tracing::trace;

use super::HttpProbe;
use crate::error::{EnforcerError, Result};

/// Connect and read timeout of a single probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(1);

pub struct ReqwestProbe {
    client: reqwest::Client,
}

impl ReqwestProbe {
    pub fn new() -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(PROBE_TIMEOUT)
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| EnforcerError::Config(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpProbe for ReqwestProbe {
    async fn http_get(&self, url: &str) -> Result<u16> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| EnforcerError::Http {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        let status = response.status().as_u16();
        trace!("GET {} -> {}", url, status);
        Ok(status)
    }
}
