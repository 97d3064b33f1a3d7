//! Mailsweep engine: tiered unsubscribe orchestration and backend delegation.
mod backend;
mod fetch;
mod orchestrator;
mod progress;
mod types;

pub use backend::{
    ArchiveDetails, ArchiveResponse, BackendApi, BackendError, BackendSettings, HttpBackendClient,
    MailtoEntry, UnsubscribeDetails, UnsubscribeRequest, UnsubscribeResponse,
};
pub use fetch::{FetchSettings, LinkFetcher, ReqwestLinkFetcher};
pub use orchestrator::{Orchestrator, RunOptions};
pub use progress::{ChannelProgressSink, NullProgressSink, ProgressEvent, ProgressSink};
pub use types::{FetchError, FetchKind};
