//! Audio graph abstractions and the controller that owns them
//!
//! The controller holds the playback context, the source node feeding the
//! analyser, and the analyser itself. Platform contexts (cpal) live in the
//! `infra` crate behind the [`AudioHost`] / [`AudioContext`] traits.

use crate::domain::analysis::{AnalysisConfig, Analyser, SampleTap, SharedAnalyser};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Errors raised by the audio graph
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GraphError {
    /// The platform cannot provide audio output
    #[error("Audio initialization failed: {0}")]
    AudioInit(String),

    /// An operation was attempted in a state that does not allow it
    #[error("Cannot {operation} while audio graph is {state}")]
    GraphState {
        operation: &'static str,
        state: String,
    },

    #[error("Invalid analyser configuration: {0}")]
    InvalidConfig(String),

    /// Device failure after initialization
    #[error("Audio device error: {0}")]
    Device(String),
}

pub type Result<T> = std::result::Result<T, GraphError>;

impl GraphError {
    pub fn state(operation: &'static str, state: impl fmt::Display) -> Self {
        GraphError::GraphState {
            operation,
            state: state.to_string(),
        }
    }
}

/// Lifecycle state of a playback context
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextState {
    Suspended,
    Running,
    Closed,
}

impl fmt::Display for ContextState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContextState::Suspended => "suspended",
            ContextState::Running => "running",
            ContextState::Closed => "closed",
        };
        f.write_str(s)
    }
}

static NEXT_ELEMENT_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_CONTROLLER_ID: AtomicU64 = AtomicU64::new(1);
static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

const UNCLAIMED: u64 = 0;

// ============================================================================
// MEDIA ELEMENT
// ============================================================================

/// Playable mono clip with a fractional playback cursor
///
/// Control methods are called from the UI thread; [`MediaElement::render_at`]
/// runs on the audio callback thread.
pub struct MediaElement {
    id: u64,
    samples: Arc<[f32]>,
    sample_rate: u32,
    /// Playback position in source frames, stored as f64 bits
    cursor: AtomicU64,
    paused: AtomicBool,
    ended: AtomicBool,
    owner: AtomicU64,
}

impl MediaElement {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            id: NEXT_ELEMENT_ID.fetch_add(1, Ordering::Relaxed),
            samples: samples.into(),
            sample_rate,
            cursor: AtomicU64::new(0f64.to_bits()),
            paused: AtomicBool::new(true),
            ended: AtomicBool::new(false),
            owner: AtomicU64::new(UNCLAIMED),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    pub fn position_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.cursor() / self.sample_rate as f64
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Acquire)
    }

    pub fn has_ended(&self) -> bool {
        self.ended.load(Ordering::Acquire)
    }

    /// Start or continue playback; an ended clip restarts from the beginning
    pub fn play(&self) {
        if self.ended.swap(false, Ordering::AcqRel) {
            self.set_cursor(0.0);
        }
        self.paused.store(false, Ordering::Release);
    }

    pub fn pause(&self) {
        self.paused.store(true, Ordering::Release);
    }

    pub fn seek(&self, secs: f64) {
        let frame = (secs.max(0.0) * self.sample_rate as f64).min(self.samples.len() as f64);
        self.set_cursor(frame);
        self.ended.store(false, Ordering::Release);
    }

    fn cursor(&self) -> f64 {
        f64::from_bits(self.cursor.load(Ordering::Acquire))
    }

    fn set_cursor(&self, frame: f64) {
        self.cursor.store(frame.to_bits(), Ordering::Release);
    }

    /// Render mono output at `out_rate`, advancing the cursor
    ///
    /// Uses linear interpolation between source frames. Writes silence while
    /// paused and past the end; returns the number of frames taken from the clip.
    pub fn render_at(&self, out: &mut [f32], out_rate: u32) -> usize {
        if self.is_paused() || out_rate == 0 || self.sample_rate == 0 {
            out.fill(0.0);
            return 0;
        }

        let len = self.samples.len();
        let step = self.sample_rate as f64 / out_rate as f64;
        let mut position = self.cursor();
        let mut rendered = 0;

        for slot in out.iter_mut() {
            if position >= len as f64 {
                *slot = 0.0;
                continue;
            }

            let i0 = position.floor() as usize;
            let i1 = (i0 + 1).min(len - 1);
            let frac = (position - i0 as f64) as f32;
            *slot = self.samples[i0] * (1.0 - frac) + self.samples[i1] * frac;

            position += step;
            rendered += 1;
        }

        self.set_cursor(position.min(len as f64));
        if position >= len as f64 {
            self.ended.store(true, Ordering::Release);
            self.paused.store(true, Ordering::Release);
        }

        rendered
    }

    fn claim(&self, owner: u64) -> bool {
        match self
            .owner
            .compare_exchange(UNCLAIMED, owner, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => true,
            Err(current) => current == owner,
        }
    }

    fn release(&self, owner: u64) {
        let _ = self
            .owner
            .compare_exchange(owner, UNCLAIMED, Ordering::AcqRel, Ordering::Acquire);
    }

    pub fn is_attached(&self) -> bool {
        self.owner.load(Ordering::Acquire) != UNCLAIMED
    }
}

impl fmt::Debug for MediaElement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaElement")
            .field("id", &self.id)
            .field("frames", &self.samples.len())
            .field("sample_rate", &self.sample_rate)
            .field("paused", &self.is_paused())
            .field("ended", &self.has_ended())
            .finish()
    }
}

// ============================================================================
// PLATFORM SEAMS
// ============================================================================

/// Handle to a connected media source
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceNode {
    id: u64,
    element_id: u64,
}

impl SourceNode {
    pub fn new(element_id: u64) -> Self {
        Self {
            id: NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed),
            element_id,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn element_id(&self) -> u64 {
        self.element_id
    }
}

/// Playback context: one output stream and the source routed into it
pub trait AudioContext {
    fn sample_rate(&self) -> u32;

    fn state(&self) -> ContextState;

    fn resume(&mut self) -> Result<()>;

    fn suspend(&mut self) -> Result<()>;

    /// Route `element` to the output and copy what it plays into `tap`
    fn connect_source(&mut self, element: Arc<MediaElement>, tap: SampleTap) -> Result<SourceNode>;

    fn disconnect_source(&mut self, node: SourceNode) -> Result<()>;

    fn close(&mut self) -> Result<()>;
}

/// Factory for playback contexts
pub trait AudioHost {
    type Context: AudioContext;

    /// Create a suspended context, or fail with [`GraphError::AudioInit`]
    fn create_context(&self) -> Result<Self::Context>;
}

// ============================================================================
// CONTROLLER
// ============================================================================

/// Buffers refreshed from the analyser on every tick
#[derive(Clone)]
pub struct AudioGraphHandle {
    analyser: SharedAnalyser,
    sample_rate: u32,
    fft_size: usize,
    pub time_domain: Vec<u8>,
    pub frequency: Vec<u8>,
}

impl AudioGraphHandle {
    fn new(analyser: SharedAnalyser, sample_rate: u32, fft_size: usize) -> Self {
        Self {
            analyser,
            sample_rate,
            fft_size,
            time_domain: vec![128; fft_size],
            frequency: vec![0; fft_size / 2],
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn fft_size(&self) -> usize {
        self.fft_size
    }

    /// Overwrite both buffers with the analyser's current view
    pub fn refresh(&mut self) -> Result<()> {
        let mut analyser = self
            .analyser
            .lock()
            .map_err(|_| GraphError::state("refresh", "poisoned"))?;
        analyser.get_byte_time_domain_data(&mut self.time_domain)?;
        analyser.get_byte_frequency_data(&mut self.frequency)?;
        Ok(())
    }
}

impl fmt::Debug for AudioGraphHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioGraphHandle")
            .field("sample_rate", &self.sample_rate)
            .field("fft_size", &self.fft_size)
            .finish()
    }
}

/// Owns the live playback resources for one media element
pub struct AudioGraphController<H: AudioHost> {
    id: u64,
    host: H,
    element: Arc<MediaElement>,
    context: Option<H::Context>,
    source: Option<SourceNode>,
    analyser: Option<(SharedAnalyser, SampleTap)>,
    claimed: bool,
}

impl<H: AudioHost> AudioGraphController<H> {
    pub fn new(host: H, element: Arc<MediaElement>) -> Self {
        Self {
            id: NEXT_CONTROLLER_ID.fetch_add(1, Ordering::Relaxed),
            host,
            element,
            context: None,
            source: None,
            analyser: None,
            claimed: false,
        }
    }

    pub fn element(&self) -> &Arc<MediaElement> {
        &self.element
    }

    pub fn context_state(&self) -> Option<ContextState> {
        self.context.as_ref().map(AudioContext::state)
    }

    pub fn is_initialized(&self) -> bool {
        matches!(self.context_state(), Some(s) if s != ContextState::Closed)
    }

    /// Create the playback context if it does not exist yet
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Ok(());
        }

        let context = self.host.create_context()?;
        info!(
            controller = self.id,
            sample_rate = context.sample_rate(),
            "Audio context created"
        );
        self.context = Some(context);
        Ok(())
    }

    /// Connect the element to an analyser and return buffers sized for it
    pub fn attach(&mut self, config: &AnalysisConfig) -> Result<AudioGraphHandle> {
        let context = match self.context.as_mut() {
            None => return Err(GraphError::state("attach", "uninitialized")),
            Some(ctx) if ctx.state() == ContextState::Closed => {
                return Err(GraphError::state("attach", ContextState::Closed))
            }
            Some(ctx) => ctx,
        };

        let (analyser, tap) = match &self.analyser {
            Some(existing) => existing.clone(),
            None => {
                let tap = SampleTap::new(config.fft_size * 4);
                let analyser = Analyser::new(config, context.sample_rate(), tap.clone())?;
                let created = (Arc::new(Mutex::new(analyser)), tap);
                self.analyser = Some(created.clone());
                created
            }
        };

        if !self.claimed {
            if !self.element.claim(self.id) {
                return Err(GraphError::state("attach", "attached to another controller"));
            }
            self.claimed = true;
        }

        if let Some(previous) = self.source.take() {
            debug!(controller = self.id, node = previous.id(), "Replacing source node");
            context.disconnect_source(previous)?;
        }

        let node = context.connect_source(self.element.clone(), tap)?;
        self.source = Some(node);

        let (sample_rate, fft_size) = {
            let guard = lock_analyser(&analyser);
            (guard.sample_rate(), guard.fft_size())
        };
        debug!(controller = self.id, node = node.id(), fft_size, "Source attached to analyser");

        Ok(AudioGraphHandle::new(analyser, sample_rate, fft_size))
    }

    /// Resume a suspended context
    pub fn resume(&mut self) -> Result<()> {
        match self.context.as_mut() {
            None => Err(GraphError::state("resume", "uninitialized")),
            Some(ctx) => match ctx.state() {
                ContextState::Closed => Err(GraphError::state("resume", ContextState::Closed)),
                ContextState::Running => Ok(()),
                ContextState::Suspended => {
                    ctx.resume()?;
                    debug!(controller = self.id, "Audio context resumed");
                    Ok(())
                }
            },
        }
    }

    /// Release every resource; safe to call repeatedly
    pub fn teardown(&mut self) {
        let had_resources =
            self.source.is_some() || self.analyser.is_some() || self.context.is_some();

        if let Some(node) = self.source.take() {
            if let Some(ctx) = self.context.as_mut() {
                if let Err(e) = ctx.disconnect_source(node) {
                    warn!(operation = "disconnect", node = node.id(), error = %e, "Teardown step failed");
                }
            }
        }

        if let Some((analyser, _tap)) = self.analyser.take() {
            lock_analyser(&analyser).close();
        }

        if let Some(mut ctx) = self.context.take() {
            if ctx.state() != ContextState::Closed {
                if let Err(e) = ctx.close() {
                    warn!(operation = "close", state = %ctx.state(), error = %e, "Teardown step failed");
                }
            }
        }

        if self.claimed {
            self.element.release(self.id);
            self.claimed = false;
        }

        if had_resources {
            info!(controller = self.id, "Audio graph torn down");
        }
    }
}

impl<H: AudioHost> Drop for AudioGraphController<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn lock_analyser(analyser: &SharedAnalyser) -> MutexGuard<'_, Analyser> {
    analyser.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
