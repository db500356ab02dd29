//! Picks the device poller the settings ask for.

use async_trait::async_trait;
use automap_pollers::{Credentials, FixturePoller, PollError, Poller, Row, Target};

use crate::settings::Settings;

/// The poller a running instance talks to devices through.
#[derive(Debug)]
pub enum DevicePoller {
    Fixture(FixturePoller),
    #[cfg(feature = "http")]
    Gateway(automap_pollers::http::HttpPoller),
}

impl DevicePoller {
    /// Fixture file when configured, else the HTTP gateway.
    pub async fn from_settings(settings: &Settings) -> anyhow::Result<Self> {
        if let Some(path) = &settings.fixture.path {
            tracing::info!(path = %path.display(), "Polling from fixture");
            return Ok(DevicePoller::Fixture(FixturePoller::from_file(path).await?));
        }

        #[cfg(feature = "http")]
        if let Some(endpoint) = &settings.gateway.endpoint {
            tracing::info!(%endpoint, "Polling through gateway");
            let poller = automap_pollers::http::HttpPoller::builder()
                .endpoint(endpoint.clone())
                .timeout(std::time::Duration::from_secs(settings.gateway.timeout_secs))
                .build()?;
            return Ok(DevicePoller::Gateway(poller));
        }

        anyhow::bail!("No poller configured: set fixture.path or gateway.endpoint")
    }
}

#[async_trait]
impl Poller for DevicePoller {
    async fn poll_scalar(
        &self,
        target: &Target,
        credentials: &Credentials,
        metric_ids: &[&str],
    ) -> Result<Row, PollError> {
        match self {
            DevicePoller::Fixture(p) => p.poll_scalar(target, credentials, metric_ids).await,
            #[cfg(feature = "http")]
            DevicePoller::Gateway(p) => p.poll_scalar(target, credentials, metric_ids).await,
        }
    }

    async fn poll_table(
        &self,
        target: &Target,
        credentials: &Credentials,
        metric_ids: &[&str],
        row_hint: Option<u32>,
    ) -> Result<Vec<Row>, PollError> {
        match self {
            DevicePoller::Fixture(p) => p.poll_table(target, credentials, metric_ids, row_hint).await,
            #[cfg(feature = "http")]
            DevicePoller::Gateway(p) => {
                p.poll_table(target, credentials, metric_ids, row_hint).await
            }
        }
    }
}
