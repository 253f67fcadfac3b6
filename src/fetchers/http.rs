//! Shared HTTP client with connectivity classification.

use super::FetchError;
use crate::config::HttpSettings;
use crate::utils::truncate_for_log;
use reqwest::Client;
use tracing::{debug, instrument, warn};

/// Thin wrapper over [`reqwest::Client`] used by every fetcher.
///
/// A connect failure is only reported as [`FetchError::Offline`] after the
/// probe URL also fails; otherwise it is an ordinary per-source error.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
    probe_url: String,
}

impl HttpClient {
    pub fn new(settings: &HttpSettings) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(settings.user_agent.clone())
            .timeout(settings.timeout())
            .build()?;
        Ok(Self {
            client,
            probe_url: settings.connectivity_probe_url.clone(),
        })
    }

    /// The underlying client, for callers that build their own requests.
    pub fn inner(&self) -> &Client {
        &self.client
    }

    /// GET `url` and return the body, failing on non-2xx statuses.
    #[instrument(level = "debug", skip(self))]
    pub async fn get_text(&self, url: &str) -> Result<String, FetchError> {
        let resp = match self.client.get(url).send().await {
            Ok(resp) => resp,
            Err(e) => return Err(self.classify(url, e).await),
        };

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status,
            });
        }

        let body = resp.text().await.map_err(|e| FetchError::Http {
            url: url.to_string(),
            source: e,
        })?;
        debug!(bytes = body.len(), preview = %truncate_for_log(&body, 120), "Fetched body");
        Ok(body)
    }

    async fn classify(&self, url: &str, e: reqwest::Error) -> FetchError {
        if e.is_connect() && !self.is_online().await {
            warn!(%url, probe = %self.probe_url, "Connect failed and probe is unreachable");
            return FetchError::Offline {
                probe: self.probe_url.clone(),
            };
        }
        FetchError::Http {
            url: url.to_string(),
            source: e,
        }
    }

    async fn is_online(&self) -> bool {
        self.client.head(&self.probe_url).send().await.is_ok()
    }
}
