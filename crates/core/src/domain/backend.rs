//! Processing backend contract
//!
//! Wire types for the submit / progress / cleanup endpoints and the
//! [`BackendClient`] trait implemented by the HTTP client in `infra`.

use crate::domain::effects::{EffectType, WireEffect};
use crate::domain::visualization::VisualizationFrame;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors talking to the processing backend
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BackendError {
    /// Connection, TLS or timeout failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Non-success status without a usable error body
    #[error("Backend returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The backend reported a processing failure
    #[error("Backend rejected request: {0}")]
    Rejected(String),

    #[error("Malformed backend response: {0}")]
    Decode(String),

    /// Progress stream broke or ended without a terminal event
    #[error("Progress stream error: {0}")]
    Stream(String),
}

pub type Result<T> = std::result::Result<T, BackendError>;

impl BackendError {
    pub fn is_stream(&self) -> bool {
        matches!(self, BackendError::Stream(_))
    }
}

impl From<serde_json::Error> for BackendError {
    fn from(e: serde_json::Error) -> Self {
        BackendError::Decode(e.to_string())
    }
}

/// Which endpoint carries a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Transport {
    /// One request, one response
    #[default]
    Single,
    /// Server-sent progress events ending in a terminal event
    Streaming,
}

/// Body of a submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub link: String,
    pub effects: Vec<WireEffect>,
}

/// Successful submission result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubmitOutcome {
    /// Location of the processed file
    pub file_url: String,
    /// Location of the unprocessed source, when the backend keeps it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_file_url: Option<String>,
    #[serde(default)]
    pub result: Option<String>,
    #[serde(default)]
    pub visualizations: Vec<VisualizationFrame>,
}

/// Raw submit response body
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SubmitReply {
    Failure { error: String },
    Success(SubmitOutcome),
}

impl SubmitReply {
    pub fn into_result(self) -> Result<SubmitOutcome> {
        match self {
            SubmitReply::Success(outcome) => Ok(outcome),
            SubmitReply::Failure { error } => Err(BackendError::Rejected(error)),
        }
    }
}

/// Progress notification from the streaming transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProgressEvent {
    Downloading,
    Processing {
        /// Wire id of the effect type being applied
        effect_id: u8,
    },
    Done {
        file_url: String,
        #[serde(default)]
        result: Option<String>,
        #[serde(default)]
        visualizations: Vec<VisualizationFrame>,
    },
    Error {
        message: String,
    },
}

impl ProgressEvent {
    /// Done and error end the stream
    pub fn is_terminal(&self) -> bool {
        matches!(self, ProgressEvent::Done { .. } | ProgressEvent::Error { .. })
    }

    /// Human readable status line
    pub fn describe(&self) -> String {
        match self {
            ProgressEvent::Downloading => "Downloading from YouTube...".to_string(),
            ProgressEvent::Processing { effect_id } => match EffectType::from_id(*effect_id) {
                Some(t) => format!("Applying Effect [{}]: {}", effect_id, t.long_name()),
                None => format!("Applying Effect [{}]", effect_id),
            },
            ProgressEvent::Done { .. } => "Done".to_string(),
            ProgressEvent::Error { message } => format!("Error: {}", message),
        }
    }

    /// Outcome carried by a `done` event
    pub fn into_outcome(self) -> Option<SubmitOutcome> {
        match self {
            ProgressEvent::Done {
                file_url,
                result,
                visualizations,
            } => Some(SubmitOutcome {
                file_url,
                original_file_url: None,
                result,
                visualizations,
            }),
            _ => None,
        }
    }
}

/// Status of a running submission as seen by the user
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressTracker {
    last: Option<ProgressEvent>,
    events: usize,
}

impl ProgressTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, event: &ProgressEvent) {
        self.events += 1;
        self.last = Some(event.clone());
    }

    pub fn is_finished(&self) -> bool {
        self.last.as_ref().is_some_and(ProgressEvent::is_terminal)
    }

    pub fn events_seen(&self) -> usize {
        self.events
    }

    pub fn message(&self) -> String {
        match &self.last {
            None => "Preparing...".to_string(),
            Some(event) => event.describe(),
        }
    }
}

/// Ordered sequence of progress events
///
/// Dropping the stream tells the producer to stop and close its transport.
#[derive(Debug)]
pub struct ProgressStream {
    rx: mpsc::Receiver<Result<ProgressEvent>>,
}

/// Producer half of a [`ProgressStream`]
pub type ProgressSender = mpsc::Sender<Result<ProgressEvent>>;

impl ProgressStream {
    pub fn channel(capacity: usize) -> (ProgressSender, Self) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (tx, Self { rx })
    }

    /// Stream that yields `events` and then ends
    pub fn from_events(events: Vec<Result<ProgressEvent>>) -> Self {
        let (tx, stream) = Self::channel(events.len());
        for event in events {
            // Capacity matches the event count
            let _ = tx.try_send(event);
        }
        stream
    }

    /// Next event, or `None` once the producer is gone
    pub async fn next(&mut self) -> Option<Result<ProgressEvent>> {
        self.rx.recv().await
    }
}

/// Client for the processing backend
#[async_trait::async_trait]
pub trait BackendClient: Send + Sync {
    /// Submit a chain and wait for the single response
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome>;

    /// Submit a chain and receive progress events as they happen
    async fn open_progress(&self, request: &SubmitRequest) -> Result<ProgressStream>;

    /// Ask the backend to delete a processed file; missing files count as deleted
    async fn cleanup(&self, file_url: &str) -> Result<()>;
}

/// File id used by the cleanup endpoint: the URL's last path segment
pub fn file_id_from_url(url: &str) -> Option<&str> {
    let end = url.find(['?', '#']).unwrap_or(url.len());
    url[..end]
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|segment| !segment.is_empty() && !segment.contains(':'))
}
