//! HTTP PUT trigger

use async_trait::async_trait;
use pushload_config::HttpConfig;
use pushload_interfaces::{PushTrigger, TransportError};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;
use url::Url;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// Issues `PUT <pushEndpoint>` requests with a `version=<n>` form body.
///
/// Holds one pooled reqwest client, so clones share connections.
#[derive(Debug, Clone)]
pub struct HttpPushTrigger {
    client: Client,
}

impl HttpPushTrigger {
    /// Create a new trigger with default configuration
    pub fn new() -> Result<Self, TransportError> {
        Self::with_config(&HttpConfig::default())
    }

    /// Create a new trigger with specific configuration
    pub fn with_config(config: &HttpConfig) -> Result<Self, TransportError> {
        debug!(
            "Creating HTTP trigger with timeout: {}s",
            config.timeout.as_secs()
        );
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .danger_accept_invalid_certs(!config.verify_ssl)
            .build()
            .map_err(|e| TransportError::Connect(format!("building HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn put_error(endpoint: &str, error: reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout(format!("PUT {}", endpoint))
    } else {
        TransportError::Put {
            endpoint: endpoint.to_string(),
            reason: error.to_string(),
        }
    }
}

#[async_trait]
impl PushTrigger for HttpPushTrigger {
    async fn put(&self, endpoint: &str, version: u64) -> Result<(), TransportError> {
        let url = Url::parse(endpoint).map_err(|e| TransportError::Put {
            endpoint: endpoint.to_string(),
            reason: format!("invalid endpoint: {}", e),
        })?;

        let response = self
            .client
            .put(url)
            .header(CONTENT_TYPE, FORM_CONTENT_TYPE)
            .body(format!("version={}", version))
            .send()
            .await
            .map_err(|e| put_error(endpoint, e))?;

        let status = response.status();
        debug!(endpoint, version, status = status.as_u16(), "PUT sent");
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::PutStatus {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
            })
        }
    }
}
