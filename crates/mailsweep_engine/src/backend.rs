use std::collections::BTreeMap;
use std::time::Duration;

use mailsweep_core::EmailId;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone)]
pub struct BackendSettings {
    /// Base URL of the scan/unsubscribe service, no trailing slash.
    pub base_url: String,
    pub request_timeout: Duration,
}

impl BackendSettings {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BackendError {
    /// Network-level failure: the service never answered.
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    /// Non-2xx without a usable payload.
    #[error("backend rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    /// HTTP 403: the mailbox lacks the required scope.
    #[error("permission denied: {message}")]
    PermissionDenied {
        message: String,
        help_text: Option<String>,
    },
}

/// Batched unsubscribe delegation. Link maps are keyed by email id and only
/// carry ids the client could resolve locally.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct UnsubscribeRequest {
    pub email_ids: Vec<EmailId>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub header_links: BTreeMap<EmailId, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub body_links: BTreeMap<EmailId, String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub mailto_links: BTreeMap<EmailId, String>,
    pub archive: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailtoEntry {
    pub message_id: EmailId,
    pub link: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UnsubscribeDetails {
    #[serde(default)]
    pub processed_email_ids: Vec<EmailId>,
    #[serde(default)]
    pub processed_senders: Vec<String>,
    #[serde(default)]
    pub mailto_links: Vec<MailtoEntry>,
    #[serde(default)]
    pub unsubscribe_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct UnsubscribeResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: UnsubscribeDetails,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ArchiveDetails {
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub help_text: Option<String>,
    #[serde(default)]
    pub archive_errors: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct ArchiveResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub details: Option<ArchiveDetails>,
}

#[derive(Debug, Clone, Default, Serialize)]
struct ArchiveRequest<'a> {
    email_ids: &'a [EmailId],
}

/// Backend collaborator contract. The engine only ever issues two batched
/// calls per run; auth and token refresh stay with the host.
#[async_trait::async_trait]
pub trait BackendApi: Send + Sync {
    async fn unsubscribe(
        &self,
        request: &UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse, BackendError>;

    async fn archive(&self, email_ids: &[EmailId]) -> Result<ArchiveResponse, BackendError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackendClient {
    settings: BackendSettings,
    client: reqwest::Client,
}

impl HttpBackendClient {
    pub fn new(settings: BackendSettings) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|err| BackendError::Unavailable(err.to_string()))?;
        Ok(Self { settings, client })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.settings.base_url.trim_end_matches('/'), path)
    }
}

#[async_trait::async_trait]
impl BackendApi for HttpBackendClient {
    async fn unsubscribe(
        &self,
        request: &UnsubscribeRequest,
    ) -> Result<UnsubscribeResponse, BackendError> {
        let response = self
            .client
            .post(self.endpoint("unsubscribe"))
            .json(request)
            .send()
            .await
            .map_err(|err| BackendError::Unavailable(err.to_string()))?;

        let status = response.status();
        // The service reports per-batch failures inside a 2xx-or-not JSON
        // body; only an unparseable non-2xx answer is a hard rejection.
        match response.json::<UnsubscribeResponse>().await {
            Ok(parsed) => Ok(parsed),
            Err(err) if status.is_success() => Err(BackendError::Unavailable(err.to_string())),
            Err(_) => Err(BackendError::Rejected {
                status: status.as_u16(),
                message: status.to_string(),
            }),
        }
    }

    async fn archive(&self, email_ids: &[EmailId]) -> Result<ArchiveResponse, BackendError> {
        let response = self
            .client
            .post(self.endpoint("archive"))
            .json(&ArchiveRequest { email_ids })
            .send()
            .await
            .map_err(|err| BackendError::Unavailable(err.to_string()))?;

        let status = response.status();
        let parsed = match response.json::<ArchiveResponse>().await {
            Ok(parsed) => parsed,
            Err(err) if status.is_success() => {
                return Err(BackendError::Unavailable(err.to_string()));
            }
            Err(_) => {
                return Err(BackendError::Rejected {
                    status: status.as_u16(),
                    message: status.to_string(),
                });
            }
        };

        if status.as_u16() == 403 {
            let details = parsed.details.unwrap_or_default();
            return Err(BackendError::PermissionDenied {
                message: parsed
                    .message
                    .or(details.reason)
                    .unwrap_or_else(|| "archiving requires additional permissions".to_string()),
                help_text: details.help_text,
            });
        }

        Ok(parsed)
    }
}
