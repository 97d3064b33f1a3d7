use std::fmt;

/// Failure classification for a single unsubscribe-link fetch.
///
/// Every kind is recoverable inside the orchestrator: a failed header tier
/// falls through to the next link tier instead of surfacing an error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchKind {
    InvalidUrl,
    Timeout,
    HttpStatus(u16),
    RedirectLimitExceeded,
    Network,
}

impl fmt::Display for FetchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchKind::InvalidUrl => write!(f, "invalid url"),
            FetchKind::HttpStatus(code) => write!(f, "http status {code}"),
            FetchKind::Timeout => write!(f, "timeout"),
            FetchKind::RedirectLimitExceeded => write!(f, "redirect limit exceeded"),
            FetchKind::Network => write!(f, "network error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    pub kind: FetchKind,
    pub message: String,
}

impl FetchError {
    pub fn new(kind: FetchKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for FetchError {}
