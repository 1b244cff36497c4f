//! Frame-driven sampling loop
//!
//! The UI redraw loop calls [`SamplingLoop::on_frame`] once per display frame.
//! When a frame has been requested the loop runs one tick: refresh the
//! analyser buffers, estimate the dominant frequency, publish a
//! [`LiveAudioSample`], and request the next frame.

use crate::domain::analysis::{estimate_dominant_frequency, normalize_time_domain};
use crate::domain::graph::{AudioGraphHandle, GraphError};
use tokio::sync::watch;
use tracing::{debug, error, trace};

pub type Result<T> = std::result::Result<T, GraphError>;

/// One published snapshot of live audio
#[derive(Debug, Clone, PartialEq)]
pub struct LiveAudioSample {
    /// Newest time-domain window, normalized to `[-1, 1]`
    pub time_domain: Vec<f32>,
    pub dominant_frequency_hz: u32,
    /// Monotonic tick counter
    pub frame_index: u64,
}

/// Cooperative scheduler driving live analysis
pub struct SamplingLoop {
    handle: Option<AudioGraphHandle>,
    pending: bool,
    frame_index: u64,
    publisher: watch::Sender<Option<LiveAudioSample>>,
}

impl Default for SamplingLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl SamplingLoop {
    pub fn new() -> Self {
        let (publisher, _) = watch::channel(None);
        Self {
            handle: None,
            pending: false,
            frame_index: 0,
            publisher,
        }
    }

    /// Latest-value receiver for published samples
    pub fn subscribe(&self) -> watch::Receiver<Option<LiveAudioSample>> {
        self.publisher.subscribe()
    }

    /// Most recently published sample
    pub fn latest(&self) -> Option<LiveAudioSample> {
        self.publisher.borrow().clone()
    }

    pub fn is_running(&self) -> bool {
        self.pending
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// Begin sampling from `handle` on the next frame
    pub fn start(&mut self, handle: AudioGraphHandle) {
        debug!(fft_size = handle.fft_size(), "Sampling loop started");
        self.handle = Some(handle);
        self.pending = true;
    }

    /// Cancel the pending frame request; safe to call when stopped
    pub fn stop(&mut self) {
        if self.pending || self.handle.is_some() {
            debug!(frame_index = self.frame_index, "Sampling loop stopped");
        }
        self.pending = false;
        self.handle = None;
    }

    /// Display-frame callback
    ///
    /// Returns `Ok(true)` when a sample was published. On failure the loop
    /// stops itself before returning the error.
    pub fn on_frame(&mut self) -> Result<bool> {
        if !self.pending {
            return Ok(false);
        }
        // The request is consumed by this tick and renewed on success
        self.pending = false;

        match self.tick() {
            Ok(sample) => {
                trace!(
                    frame_index = sample.frame_index,
                    dominant_frequency_hz = sample.dominant_frequency_hz,
                    "Published live sample"
                );
                self.publisher.send_replace(Some(sample));
                self.pending = true;
                Ok(true)
            }
            Err(e) => {
                error!(
                    operation = "tick",
                    frame_index = self.frame_index,
                    error = %e,
                    "Sampling tick failed, stopping loop"
                );
                self.stop();
                Err(e)
            }
        }
    }

    fn tick(&mut self) -> Result<LiveAudioSample> {
        let handle = self
            .handle
            .as_mut()
            .ok_or_else(|| GraphError::state("tick", "detached"))?;

        handle.refresh()?;

        let dominant_frequency_hz =
            estimate_dominant_frequency(&handle.frequency, handle.sample_rate(), handle.fft_size());
        let time_domain = normalize_time_domain(&handle.time_domain);

        self.frame_index += 1;
        Ok(LiveAudioSample {
            time_domain,
            dominant_frequency_hz,
            frame_index: self.frame_index,
        })
    }
}
