//! Submission session
//!
//! Owns the source link, the effect chain being edited, and whatever the
//! backend returned for the last submission.

use crate::domain::backend::{
    BackendClient, BackendError, ProgressEvent, ProgressStream, ProgressTracker, SubmitOutcome,
    SubmitRequest,
};
use crate::domain::effects::{EffectChain, ValidationError, WireEffect};
use crate::domain::visualization::EffectResult;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error("No progress stream is open")]
    NoProgress,
}

pub type Result<T> = std::result::Result<T, SessionError>;

/// One user's submit/inspect cycle
pub struct Session<B: BackendClient> {
    backend: B,
    link: String,
    chain: EffectChain,
    submitted: Vec<WireEffect>,
    outcome: Option<SubmitOutcome>,
    progress: Option<ProgressStream>,
    tracker: ProgressTracker,
}

impl<B: BackendClient> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            link: String::new(),
            chain: EffectChain::new(),
            submitted: Vec::new(),
            outcome: None,
            progress: None,
            tracker: ProgressTracker::new(),
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn link(&self) -> &str {
        &self.link
    }

    pub fn set_link(&mut self, link: impl Into<String>) {
        self.link = link.into();
    }

    pub fn chain(&self) -> &EffectChain {
        &self.chain
    }

    pub fn chain_mut(&mut self) -> &mut EffectChain {
        &mut self.chain
    }

    pub fn outcome(&self) -> Option<&SubmitOutcome> {
        self.outcome.as_ref()
    }

    pub fn progress_message(&self) -> String {
        self.tracker.message()
    }

    pub fn is_streaming(&self) -> bool {
        self.progress.is_some()
    }

    /// Build the request; nothing invalid reaches the network
    fn prepare(&mut self) -> Result<SubmitRequest> {
        let link = self.link.trim();
        if link.is_empty() {
            return Err(ValidationError::EmptyLink.into());
        }
        self.chain.validate()?;

        let request = SubmitRequest {
            link: link.to_string(),
            effects: self.chain.to_wire_format(),
        };

        // Results from an earlier submission no longer apply
        self.outcome = None;
        self.progress = None;
        self.tracker = ProgressTracker::new();
        self.submitted = request.effects.clone();
        Ok(request)
    }

    /// Submit over the single request/response transport
    #[instrument(skip(self), fields(effects = self.chain.len()))]
    pub async fn submit(&mut self) -> Result<&SubmitOutcome> {
        let request = self.prepare()?;
        info!(link = %request.link, "Submitting effect chain");

        let outcome = self.backend.submit(&request).await?;
        info!(
            file_url = %outcome.file_url,
            frames = outcome.visualizations.len(),
            "Submission complete"
        );
        Ok(&*self.outcome.insert(outcome))
    }

    /// Submit over the streaming transport; read events with [`Session::next_progress`]
    #[instrument(skip(self), fields(effects = self.chain.len()))]
    pub async fn open_progress(&mut self) -> Result<()> {
        let request = self.prepare()?;
        info!(link = %request.link, "Submitting effect chain with progress");

        let stream = self.backend.open_progress(&request).await?;
        self.progress = Some(stream);
        Ok(())
    }

    /// Next progress event
    ///
    /// Returns `Ok(None)` once a terminal event has been handled. A `done`
    /// event stores the outcome; an `error` event becomes
    /// [`BackendError::Rejected`]; a stream that ends early becomes
    /// [`BackendError::Stream`].
    pub async fn next_progress(&mut self) -> Result<Option<ProgressEvent>> {
        let stream = match self.progress.as_mut() {
            Some(stream) => stream,
            None if self.tracker.is_finished() => return Ok(None),
            None => return Err(SessionError::NoProgress),
        };

        let event = match stream.next().await {
            Some(Ok(event)) => event,
            Some(Err(e)) => {
                self.progress = None;
                warn!(error = %e, "Progress stream failed");
                return Err(e.into());
            }
            None => {
                self.progress = None;
                warn!(events = self.tracker.events_seen(), "Progress stream ended early");
                return Err(BackendError::Stream(
                    "stream ended before a terminal event".to_string(),
                )
                .into());
            }
        };

        self.tracker.record(&event);
        debug!(status = %event.describe(), "Progress event");

        match &event {
            ProgressEvent::Done { .. } => {
                self.progress = None;
                let outcome = event.clone().into_outcome();
                if let Some(outcome) = &outcome {
                    info!(file_url = %outcome.file_url, "Submission complete");
                }
                self.outcome = outcome;
            }
            ProgressEvent::Error { message } => {
                self.progress = None;
                return Err(BackendError::Rejected(message.clone()).into());
            }
            _ => {}
        }
        Ok(Some(event))
    }

    /// Submit with progress and drive the stream to its terminal event
    pub async fn submit_streaming<F>(&mut self, mut on_event: F) -> Result<&SubmitOutcome>
    where
        F: FnMut(&ProgressEvent),
    {
        self.open_progress().await?;
        while let Some(event) = self.next_progress().await? {
            on_event(&event);
            if event.is_terminal() {
                break;
            }
        }
        self.outcome
            .as_ref()
            .ok_or_else(|| BackendError::Stream("no outcome received".to_string()).into())
    }

    /// Returned frames paired with the effects that were submitted
    pub fn results(&self) -> Vec<EffectResult> {
        match &self.outcome {
            Some(outcome) => EffectResult::pair(&outcome.visualizations, &self.submitted),
            None => Vec::new(),
        }
    }

    /// Forget everything and release the processed file on the backend
    #[instrument(skip(self))]
    pub async fn reset(&mut self) {
        // Dropping the receiver stops the producer and closes its transport
        self.progress = None;

        if let Some(outcome) = self.outcome.take() {
            if let Err(e) = self.backend.cleanup(&outcome.file_url).await {
                warn!(file_url = %outcome.file_url, error = %e, "Cleanup failed");
            }
        }

        self.link.clear();
        self.chain.clear();
        self.submitted.clear();
        self.tracker = ProgressTracker::new();
        info!("Session reset");
    }
}
