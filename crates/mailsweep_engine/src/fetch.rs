use std::time::Duration;

use crate::types::{FetchError, FetchKind};

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub connect_timeout: Duration,
    /// Whole-request bound; a timed-out fetch is equivalent to a network
    /// failure and falls through to the next link tier.
    pub request_timeout: Duration,
    pub redirect_limit: usize,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(10),
            redirect_limit: 5,
        }
    }
}

/// Fires one-click unsubscribe requests. Seam for tests and alternative
/// transports; the orchestrator never touches HTTP directly.
#[async_trait::async_trait]
pub trait LinkFetcher: Send + Sync {
    /// Background GET of a header unsubscribe link. `Ok` means the endpoint
    /// answered 2xx; any failure is a tier failure, not a fatal error.
    async fn fetch_unsubscribe(&self, url: &str) -> Result<(), FetchError>;
}

#[derive(Debug, Clone)]
pub struct ReqwestLinkFetcher {
    settings: FetchSettings,
}

impl ReqwestLinkFetcher {
    pub fn new(settings: FetchSettings) -> Self {
        Self { settings }
    }

    fn build_client(&self) -> Result<reqwest::Client, FetchError> {
        let redirect_limit = self.settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });

        reqwest::Client::builder()
            .connect_timeout(self.settings.connect_timeout)
            .timeout(self.settings.request_timeout)
            .redirect(policy)
            .build()
            .map_err(|err| FetchError::new(FetchKind::Network, err.to_string()))
    }
}

#[async_trait::async_trait]
impl LinkFetcher for ReqwestLinkFetcher {
    async fn fetch_unsubscribe(&self, url: &str) -> Result<(), FetchError> {
        let parsed = url::Url::parse(url)
            .map_err(|err| FetchError::new(FetchKind::InvalidUrl, err.to_string()))?;
        let client = self.build_client()?;

        let response = client.get(parsed).send().await.map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::new(
                FetchKind::HttpStatus(status.as_u16()),
                status.to_string(),
            ));
        }

        Ok(())
    }
}

fn map_reqwest_error(err: reqwest::Error) -> FetchError {
    if err.is_timeout() {
        return FetchError::new(FetchKind::Timeout, err.to_string());
    }
    if err.is_redirect() {
        return FetchError::new(FetchKind::RedirectLimitExceeded, err.to_string());
    }
    FetchError::new(FetchKind::Network, err.to_string())
}
