//! Live playback with real-time analysis
//!
//! Ties the audio graph controller, the media element, and the sampling loop
//! together behind play / pause / toggle.

use crate::domain::analysis::AnalysisConfig;
use crate::domain::graph::{AudioGraphController, AudioGraphHandle, AudioHost, GraphError, MediaElement};
use crate::domain::sampling::{LiveAudioSample, SamplingLoop};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, instrument, warn};

pub type Result<T> = std::result::Result<T, GraphError>;

/// Plays one media element while publishing live samples
pub struct LivePlayer<H: AudioHost> {
    controller: AudioGraphController<H>,
    sampling: SamplingLoop,
    config: AnalysisConfig,
    handle: Option<AudioGraphHandle>,
}

impl<H: AudioHost> LivePlayer<H> {
    pub fn new(host: H, element: Arc<MediaElement>, config: AnalysisConfig) -> Self {
        Self {
            controller: AudioGraphController::new(host, element),
            sampling: SamplingLoop::new(),
            config,
            handle: None,
        }
    }

    pub fn element(&self) -> &Arc<MediaElement> {
        self.controller.element()
    }

    pub fn is_playing(&self) -> bool {
        !self.element().is_paused()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<LiveAudioSample>> {
        self.sampling.subscribe()
    }

    pub fn latest(&self) -> Option<LiveAudioSample> {
        self.sampling.latest()
    }

    /// Start playback; the audio graph is built on first use
    #[instrument(skip(self))]
    pub fn play(&mut self) -> Result<()> {
        self.controller.initialize()?;

        let handle = match &self.handle {
            Some(handle) => handle.clone(),
            None => {
                let handle = self.controller.attach(&self.config)?;
                self.handle = Some(handle.clone());
                handle
            }
        };

        self.controller.resume()?;
        self.element().play();
        self.sampling.start(handle);
        info!(position_secs = self.element().position_secs(), "Playback started");
        Ok(())
    }

    /// Pause the media first so no sample is published for audio that stopped
    pub fn pause(&mut self) {
        self.element().pause();
        self.sampling.stop();
        info!(position_secs = self.element().position_secs(), "Playback paused");
    }

    pub fn toggle(&mut self) -> Result<()> {
        if self.is_playing() {
            self.pause();
            Ok(())
        } else {
            self.play()
        }
    }

    /// Display-frame callback; returns whether a new sample was published
    pub fn on_frame(&mut self) -> Result<bool> {
        if self.element().has_ended() && self.sampling.is_running() {
            info!("Playback reached end of media");
            self.pause();
            return Ok(false);
        }

        match self.sampling.on_frame() {
            Ok(published) => Ok(published),
            Err(e) => {
                warn!(error = %e, "Live analysis failed, pausing playback");
                self.element().pause();
                Err(e)
            }
        }
    }

    /// Stop everything and release the audio graph
    pub fn teardown(&mut self) {
        self.sampling.stop();
        self.element().pause();
        self.handle = None;
        self.controller.teardown();
    }
}

impl<H: AudioHost> Drop for LivePlayer<H> {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::analysis::SampleTap;
    use crate::domain::graph::{AudioContext, ContextState, SourceNode};

    struct SilentContext {
        state: ContextState,
    }

    impl AudioContext for SilentContext {
        fn sample_rate(&self) -> u32 {
            44100
        }
        fn state(&self) -> ContextState {
            self.state
        }
        fn resume(&mut self) -> Result<()> {
            self.state = ContextState::Running;
            Ok(())
        }
        fn suspend(&mut self) -> Result<()> {
            self.state = ContextState::Suspended;
            Ok(())
        }
        fn connect_source(&mut self, element: Arc<MediaElement>, _tap: SampleTap) -> Result<SourceNode> {
            Ok(SourceNode::new(element.id()))
        }
        fn disconnect_source(&mut self, _node: SourceNode) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            self.state = ContextState::Closed;
            Ok(())
        }
    }

    struct SilentHost;

    impl AudioHost for SilentHost {
        type Context = SilentContext;
        fn create_context(&self) -> Result<SilentContext> {
            Ok(SilentContext { state: ContextState::Suspended })
        }
    }

    fn player() -> LivePlayer<SilentHost> {
        let element = Arc::new(MediaElement::new(vec![0.1; 44100], 44100));
        LivePlayer::new(SilentHost, element, AnalysisConfig::default())
    }

    #[test]
    fn test_play_publishes_on_frame() {
        let mut player = player();
        player.play().unwrap();
        assert!(player.is_playing());
        assert!(player.on_frame().unwrap());
        assert_eq!(player.latest().unwrap().dominant_frequency_hz, 0);
    }

    #[test]
    fn test_pause_before_tick_publishes_nothing() {
        let mut player = player();
        player.play().unwrap();
        player.pause();

        assert!(!player.on_frame().unwrap());
        assert!(player.latest().is_none());
        assert!(!player.is_playing());
    }

    #[test]
    fn test_toggle_round_trip() {
        let mut player = player();
        player.toggle().unwrap();
        assert!(player.is_playing());
        player.toggle().unwrap();
        assert!(!player.is_playing());
        player.toggle().unwrap();
        assert!(player.on_frame().unwrap());
    }

    #[test]
    fn test_media_end_stops_loop() {
        let mut player = player();
        player.play().unwrap();

        let mut out = vec![0.0; 44100];
        player.element().render_at(&mut out, 44100);
        assert!(player.element().has_ended());

        assert!(!player.on_frame().unwrap());
        assert!(!player.on_frame().unwrap());
    }

    #[test]
    fn test_teardown_twice() {
        let mut player = player();
        player.play().unwrap();
        player.teardown();
        player.teardown();
        assert!(!player.on_frame().unwrap());
        assert!(!player.element().is_attached());

        // A torn-down player rebuilds its graph on the next play
        player.play().unwrap();
        assert!(player.on_frame().unwrap());
    }
}
