//! Google Cloud Storage object store.
//!
//! Objects are fetched through the JSON API media endpoint
//! (`GET /storage/v1/b/{bucket}/o/{object}?alt=media`). Authentication uses an
//! OAuth access token taken from `GOOGLE_OAUTH_ACCESS_TOKEN`; without one the
//! request is anonymous, which is enough for public buckets and emulators.

use std::fs::File;
use std::path::Path;
use std::time::Duration;

use reqwest::Url;
use reqwest::blocking::Client;
use reserva_common::{PipelineError, Result};
use tracing::{debug, info};

use super::ObjectStore;

/// Default public endpoint.
const DEFAULT_ENDPOINT: &str = "https://storage.googleapis.com";

/// Default timeout for a download in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Environment variable holding an OAuth2 access token.
pub const TOKEN_ENV: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Environment variable pointing at a storage emulator.
pub const EMULATOR_ENV: &str = "STORAGE_EMULATOR_HOST";

/// Configuration for the GCS store.
#[derive(Debug, Clone)]
pub struct GcsConfig {
    /// API endpoint, scheme included.
    pub endpoint: String,
    /// Request timeout in seconds.
    pub timeout_secs: u64,
    /// Bearer token; anonymous access when `None`.
    pub access_token: Option<String>,
}

impl Default for GcsConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            access_token: None,
        }
    }
}

impl GcsConfig {
    /// Create a new configuration builder.
    pub fn builder() -> GcsConfigBuilder {
        GcsConfigBuilder::default()
    }

    /// Defaults, overridden by `STORAGE_EMULATOR_HOST` and `GOOGLE_OAUTH_ACCESS_TOKEN`.
    pub fn from_env() -> Self {
        let mut builder = Self::builder();
        if let Ok(host) = std::env::var(EMULATOR_ENV)
            && !host.trim().is_empty()
        {
            builder = builder.endpoint(host);
        }
        if let Ok(token) = std::env::var(TOKEN_ENV)
            && !token.trim().is_empty()
        {
            builder = builder.access_token(token.trim());
        }
        builder.build()
    }
}

/// Builder for [`GcsConfig`].
#[derive(Default)]
pub struct GcsConfigBuilder {
    endpoint: Option<String>,
    timeout_secs: Option<u64>,
    access_token: Option<String>,
}

impl GcsConfigBuilder {
    /// Set the API endpoint. A bare `host:port` is taken as plain HTTP.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout in seconds.
    pub fn timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Set the bearer token.
    pub fn access_token(mut self, token: impl Into<String>) -> Self {
        self.access_token = Some(token.into());
        self
    }

    /// Build the configuration.
    pub fn build(self) -> GcsConfig {
        let endpoint = self
            .endpoint
            .map(|e| {
                let e = e.trim().trim_end_matches('/').to_string();
                if e.contains("://") { e } else { format!("http://{e}") }
            })
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        GcsConfig {
            endpoint,
            timeout_secs: self.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS),
            access_token: self.access_token,
        }
    }
}

/// Downloads objects from Google Cloud Storage.
pub struct GcsObjectStore {
    config: GcsConfig,
    client: Client,
}

impl GcsObjectStore {
    /// Create a store configured from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new() -> Result<Self> {
        Self::with_config(GcsConfig::from_env())
    }

    /// Create a store with an explicit configuration.
    pub fn with_config(config: GcsConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| PipelineError::Storage(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self { config, client })
    }

    /// Media URL for an object; the object name is percent-encoded as one segment.
    pub fn media_url(&self, bucket: &str, object: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.endpoint).map_err(|e| {
            PipelineError::Storage(format!("Invalid endpoint '{}': {e}", self.config.endpoint))
        })?;

        url.path_segments_mut()
            .map_err(|_| {
                PipelineError::Storage(format!(
                    "Endpoint '{}' cannot carry a path",
                    self.config.endpoint
                ))
            })?
            .pop_if_empty()
            .extend(["storage", "v1", "b", bucket, "o", object]);
        url.query_pairs_mut().append_pair("alt", "media");

        Ok(url)
    }
}

impl ObjectStore for GcsObjectStore {
    fn download(&self, bucket: &str, object: &str, dest: &Path) -> Result<u64> {
        let url = self.media_url(bucket, object)?;
        debug!("GET {}", url);

        let mut request = self.client.get(url);
        if let Some(token) = &self.config.access_token {
            request = request.bearer_auth(token);
        }
        let mut response = request.send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(PipelineError::Storage(format!(
                "GCS error {} for gs://{}/{}: {}",
                status, bucket, object, body
            )));
        }

        let mut file = File::create(dest)?;
        let bytes = response.copy_to(&mut file)?;
        info!("Downloaded {} bytes from gs://{}/{}", bytes, bucket, object);
        Ok(bytes)
    }

    fn name(&self) -> &str {
        "gcs"
    }
}
