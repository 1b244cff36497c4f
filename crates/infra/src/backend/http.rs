//! reqwest-based processing backend client

use crate::backend::sse::SseParser;
use reqwest::{Client, Response, StatusCode, Url};
use sigscope_core::domain::backend::{
    file_id_from_url, BackendClient, BackendError, ProgressEvent, ProgressSender, ProgressStream,
    Result, SubmitOutcome, SubmitReply, SubmitRequest,
};
use sigscope_core::domain::config::BackendConfig;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Buffered progress events before the producer waits for the reader
const PROGRESS_CHANNEL_CAPACITY: usize = 32;
/// Longest response body echoed into an error
const MAX_ERROR_BODY: usize = 512;
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for the `/link`, `/progress` and `/delete` endpoints
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// Bounded by the request timeout
    client: Client,
    /// Progress streams stay open as long as processing runs
    stream_client: Client,
    base_url: String,
}

impl HttpBackend {
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(transport)?;
        let stream_client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .build()
            .map_err(transport)?;

        Ok(Self {
            client,
            stream_client,
            base_url: config.base_url.trim().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `DELETE` target for `file_id`
    ///
    /// Escapes already present in the id are kept; characters a path segment
    /// cannot carry are percent-encoded.
    fn delete_url(&self, file_id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.url("delete")).map_err(|e| {
            BackendError::Transport(format!("Invalid backend URL '{}': {}", self.base_url, e))
        })?;
        let path = format!("{}/{}", url.path().trim_end_matches('/'), file_id);
        url.set_path(&path);
        Ok(url)
    }
}

#[async_trait::async_trait]
impl BackendClient for HttpBackend {
    #[instrument(skip(self, request), fields(effects = request.effects.len()))]
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitOutcome> {
        let response = self
            .client
            .post(self.url("link"))
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        let body = response.bytes().await.map_err(transport)?;
        debug!(status = status.as_u16(), bytes = body.len(), "Submit response received");

        match serde_json::from_slice::<SubmitReply>(&body) {
            Ok(reply) if status.is_success() => reply.into_result(),
            Ok(SubmitReply::Failure { error }) => Err(BackendError::Rejected(error)),
            Ok(SubmitReply::Success(_)) => Err(status_error(status, &body)),
            Err(e) if status.is_success() => Err(e.into()),
            Err(_) => Err(status_error(status, &body)),
        }
    }

    #[instrument(skip(self, request), fields(effects = request.effects.len()))]
    async fn open_progress(&self, request: &SubmitRequest) -> Result<ProgressStream> {
        let response = self
            .stream_client
            .post(self.url("progress"))
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .json(request)
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.bytes().await.map_err(transport)?;
            return Err(match serde_json::from_slice::<SubmitReply>(&body) {
                Ok(SubmitReply::Failure { error }) => BackendError::Rejected(error),
                _ => status_error(status, &body),
            });
        }

        info!("Progress stream opened");
        let (tx, stream) = ProgressStream::channel(PROGRESS_CHANNEL_CAPACITY);
        tokio::spawn(pump_events(response, tx));
        Ok(stream)
    }

    #[instrument(skip(self))]
    async fn cleanup(&self, file_url: &str) -> Result<()> {
        let file_id = file_id_from_url(file_url).ok_or_else(|| {
            BackendError::Decode(format!("Cannot derive a file id from '{}'", file_url))
        })?;

        let response = self
            .client
            .delete(self.delete_url(file_id)?)
            .send()
            .await
            .map_err(transport)?;

        match response.status() {
            StatusCode::NOT_FOUND => {
                debug!(file_id, "File already gone");
                Ok(())
            }
            status if status.is_success() => {
                info!(file_id, "Processed file deleted");
                Ok(())
            }
            status => {
                let body = response.bytes().await.map_err(transport)?;
                Err(status_error(status, &body))
            }
        }
    }
}

/// Forward server-sent events until a terminal event, the end of the body,
/// or the reader going away
async fn pump_events(mut response: Response, tx: ProgressSender) {
    let mut parser = SseParser::new();

    loop {
        let chunk = tokio::select! {
            _ = tx.closed() => {
                debug!("Progress reader dropped, closing stream");
                return;
            }
            chunk = response.chunk() => chunk,
        };

        let payloads = match chunk {
            Ok(Some(bytes)) => parser.feed(&bytes),
            Ok(None) => {
                // Ending without a terminal event is reported by the reader
                if let Some(payload) = parser.finish() {
                    forward(&tx, &payload).await;
                }
                debug!("Progress stream body ended");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Progress stream interrupted");
                let _ = tx.send(Err(BackendError::Stream(e.to_string()))).await;
                return;
            }
        };

        for payload in payloads {
            if forward(&tx, &payload).await {
                return;
            }
        }
    }
}

/// Send one decoded payload; returns true when the stream should stop
async fn forward(tx: &ProgressSender, payload: &str) -> bool {
    let event = serde_json::from_str::<ProgressEvent>(payload).map_err(BackendError::from);
    let terminal = match &event {
        Ok(event) => event.is_terminal(),
        Err(e) => {
            warn!(error = %e, "Undecodable progress event");
            true
        }
    };
    tx.send(event).await.is_err() || terminal
}

fn transport(e: reqwest::Error) -> BackendError {
    BackendError::Transport(e.to_string())
}

fn status_error(status: StatusCode, body: &[u8]) -> BackendError {
    let mut body = String::from_utf8_lossy(body).into_owned();
    if body.len() > MAX_ERROR_BODY {
        let mut cut = MAX_ERROR_BODY;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        body.truncate(cut);
    }
    BackendError::Status {
        status: status.as_u16(),
        body,
    }
}
