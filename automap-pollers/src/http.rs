//! Poller that delegates device reads to an HTTP polling gateway.
//!
//! The gateway speaks the device management protocol on our behalf and
//! exchanges JSON:
//!
//! - `POST {endpoint}/scalar` with `{host, port, auth, ids}` returns a row
//! - `POST {endpoint}/table` with `{host, port, auth, ids, max_rows}` returns
//!   a list of rows
//!
//! ## Example
//!
//! ```rust,no_run
//! use automap_pollers::http::HttpPoller;
//! use automap_pollers::{Credentials, Poller, Target};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let poller = HttpPoller::builder()
//!         .endpoint("http://localhost:8161")
//!         .build()?;
//!
//!     let row = poller
//!         .poll_scalar(&Target::new("sw1"), &Credentials::default(), &["1.3.6.1.2.1.2.1.0"])
//!         .await?;
//!     println!("{row:?}");
//!     Ok(())
//! }
//! ```

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::poller::{Credentials, Poller, Row, Target};
use crate::PollError;

/// Poller backed by an HTTP gateway.
#[derive(Debug, Clone)]
pub struct HttpPoller {
    client: Client,
    endpoint: String,
}

#[derive(Debug, Serialize)]
#[serde(tag = "version", rename_all = "lowercase")]
enum Auth<'a> {
    V2 {
        community: &'a str,
    },
    V3 {
        user: &'a str,
        auth_password: &'a str,
        priv_password: &'a str,
    },
}

impl<'a> From<&'a Credentials> for Auth<'a> {
    fn from(creds: &'a Credentials) -> Self {
        match creds {
            Credentials::V2 { community } => Auth::V2 { community },
            Credentials::V3 {
                user,
                auth_password,
                priv_password,
            } => Auth::V3 {
                user,
                auth_password,
                priv_password,
            },
        }
    }
}

#[derive(Debug, Serialize)]
struct PollRequest<'a> {
    host: &'a str,
    port: u16,
    auth: Auth<'a>,
    ids: &'a [&'a str],
    #[serde(skip_serializing_if = "Option::is_none")]
    max_rows: Option<u32>,
}

impl HttpPoller {
    /// Create a new builder for configuring the poller.
    pub fn builder() -> HttpPollerBuilder {
        HttpPollerBuilder::default()
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        request: &PollRequest<'_>,
    ) -> Result<T, PollError> {
        let url = format!("{}/{}", self.endpoint, path);
        let response = self.client.post(&url).json(request).send().await?;

        if response.status() == reqwest::StatusCode::UNAUTHORIZED
            || response.status() == reqwest::StatusCode::FORBIDDEN
        {
            return Err(PollError::Auth(format!(
                "gateway rejected credentials for {}",
                request.host
            )));
        }

        if response.status() == reqwest::StatusCode::BAD_GATEWAY
            || response.status() == reqwest::StatusCode::GATEWAY_TIMEOUT
        {
            return Err(PollError::Unreachable(request.host.to_string()));
        }

        if !response.status().is_success() {
            return Err(PollError::Transport(format!(
                "gateway returned status {}",
                response.status()
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PollError::Parse(e.to_string()))
    }
}

#[async_trait]
impl Poller for HttpPoller {
    async fn poll_scalar(
        &self,
        target: &Target,
        credentials: &Credentials,
        metric_ids: &[&str],
    ) -> Result<Row, PollError> {
        let request = PollRequest {
            host: target.host(),
            port: target.port,
            auth: credentials.into(),
            ids: metric_ids,
            max_rows: None,
        };
        self.post("scalar", &request).await
    }

    async fn poll_table(
        &self,
        target: &Target,
        credentials: &Credentials,
        metric_ids: &[&str],
        row_hint: Option<u32>,
    ) -> Result<Vec<Row>, PollError> {
        let request = PollRequest {
            host: target.host(),
            port: target.port,
            auth: credentials.into(),
            ids: metric_ids,
            max_rows: row_hint,
        };
        self.post("table", &request).await
    }
}

/// Builder for HttpPoller.
#[derive(Debug, Default)]
pub struct HttpPollerBuilder {
    endpoint: Option<String>,
    timeout: Option<Duration>,
}

impl HttpPollerBuilder {
    /// Set the gateway endpoint (e.g., "http://localhost:8161").
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Set the request timeout (default: 10 seconds).
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Build the poller.
    pub fn build(self) -> Result<HttpPoller, PollError> {
        let timeout = self.timeout.unwrap_or(Duration::from_secs(10));
        let client = Client::builder().timeout(timeout).build()?;

        let endpoint = self
            .endpoint
            .unwrap_or_else(|| "http://localhost:8161".to_string());

        Ok(HttpPoller {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }
}
