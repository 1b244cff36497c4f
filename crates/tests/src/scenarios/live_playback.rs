//! Live playback driven through a scripted audio host

use super::screen;
use ratatui::{backend::TestBackend, Terminal};
use sigscope_app::LiveApp;
use sigscope_core::domain::analysis::{AnalysisConfig, SampleTap};
use sigscope_core::domain::graph::{
    AudioContext, AudioHost, ContextState, GraphError, MediaElement, SourceNode,
};
use sigscope_core::domain::playback::LivePlayer;
use std::cell::RefCell;
use std::f32::consts::PI;
use std::rc::Rc;
use std::sync::Arc;

const RATE: u32 = 48_000;

type Route = Rc<RefCell<Option<(Arc<MediaElement>, SampleTap)>>>;

/// Stands in for the device callback: the test decides when audio flows
#[derive(Clone, Default)]
struct ScriptedHost {
    route: Route,
    contexts: Rc<RefCell<usize>>,
}

impl ScriptedHost {
    /// Render `frames` of output into the analyser tap
    fn pump(&self, frames: usize) {
        if let Some((element, tap)) = self.route.borrow().as_ref() {
            let mut out = vec![0.0f32; frames];
            element.render_at(&mut out, RATE);
            tap.push_slice(&out);
        }
    }
}

struct ScriptedContext {
    route: Route,
    state: ContextState,
}

impl AudioContext for ScriptedContext {
    fn sample_rate(&self) -> u32 {
        RATE
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<(), GraphError> {
        self.state = ContextState::Running;
        Ok(())
    }

    fn suspend(&mut self) -> Result<(), GraphError> {
        self.state = ContextState::Suspended;
        Ok(())
    }

    fn connect_source(
        &mut self,
        element: Arc<MediaElement>,
        tap: SampleTap,
    ) -> Result<SourceNode, GraphError> {
        let node = SourceNode::new(element.id());
        *self.route.borrow_mut() = Some((element, tap));
        Ok(node)
    }

    fn disconnect_source(&mut self, _node: SourceNode) -> Result<(), GraphError> {
        *self.route.borrow_mut() = None;
        Ok(())
    }

    fn close(&mut self) -> Result<(), GraphError> {
        self.state = ContextState::Closed;
        Ok(())
    }
}

impl AudioHost for ScriptedHost {
    type Context = ScriptedContext;

    fn create_context(&self) -> Result<ScriptedContext, GraphError> {
        *self.contexts.borrow_mut() += 1;
        Ok(ScriptedContext {
            route: self.route.clone(),
            state: ContextState::Suspended,
        })
    }
}

/// Two seconds of a 1500 Hz tone, which sits exactly on bin 64 of a 2048 window
fn tone() -> Arc<MediaElement> {
    let samples = (0..RATE * 2)
        .map(|i| (2.0 * PI * 1500.0 * i as f32 / RATE as f32).sin() * 0.08)
        .collect();
    Arc::new(MediaElement::new(samples, RATE))
}

fn config() -> AnalysisConfig {
    AnalysisConfig {
        smoothing_time_constant: 0.0,
        ..Default::default()
    }
}

#[test]
fn test_playing_publishes_dominant_frequency() {
    let host = ScriptedHost::default();
    let mut player = LivePlayer::new(host.clone(), tone(), config());

    player.play().unwrap();
    host.pump(4096);

    assert!(player.on_frame().unwrap());
    let sample = player.latest().unwrap();
    assert_eq!(sample.dominant_frequency_hz, 1500);
    assert_eq!(sample.time_domain.len(), 2048);
    assert!(sample.time_domain.iter().all(|v| (-1.0..=1.0).contains(v)));

    // The next display frame publishes again
    host.pump(1024);
    assert!(player.on_frame().unwrap());
    assert!(player.latest().unwrap().frame_index > sample.frame_index);
}

#[test]
fn test_pause_within_one_tick_publishes_nothing() {
    let host = ScriptedHost::default();
    let mut player = LivePlayer::new(host.clone(), tone(), config());
    let mut updates = player.subscribe();

    player.play().unwrap();
    host.pump(2048);
    player.pause();

    assert!(!player.on_frame().unwrap());
    assert!(player.latest().is_none());
    assert!(!updates.has_changed().unwrap());

    // Paused media renders silence
    let position = player.element().position_secs();
    host.pump(2048);
    assert_eq!(player.element().position_secs(), position);
}

#[test]
fn test_resume_reuses_graph() {
    let host = ScriptedHost::default();
    let mut player = LivePlayer::new(host.clone(), tone(), config());

    player.play().unwrap();
    player.pause();
    player.play().unwrap();
    host.pump(2048);

    assert!(player.on_frame().unwrap());
    assert_eq!(*host.contexts.borrow(), 1);
}

#[test]
fn test_teardown_twice_then_play_again() {
    let host = ScriptedHost::default();
    let element = tone();
    let mut player = LivePlayer::new(host.clone(), element.clone(), config());

    player.play().unwrap();
    host.pump(2048);
    player.on_frame().unwrap();

    player.teardown();
    player.teardown();
    assert!(!element.is_attached());
    assert!(host.route.borrow().is_none());
    assert!(!player.on_frame().unwrap());

    player.play().unwrap();
    assert_eq!(*host.contexts.borrow(), 2);
    assert!(element.is_attached());
}

#[test]
fn test_media_end_pauses() {
    let host = ScriptedHost::default();
    let element = Arc::new(MediaElement::new(vec![0.1; 512], RATE));
    let mut player = LivePlayer::new(host.clone(), element.clone(), config());

    player.play().unwrap();
    host.pump(1024);

    assert!(element.has_ended());
    assert!(!player.on_frame().unwrap());
    assert!(!player.is_playing());
}

#[test]
fn test_live_screen_shows_readout() {
    let host = ScriptedHost::default();
    let player = LivePlayer::new(host.clone(), tone(), config());
    let mut app = LiveApp::new(player, "tone.wav");

    app.handle_key(ratatui::crossterm::event::KeyCode::Char(' '));
    host.pump(4096);
    app.tick();

    let mut terminal = Terminal::new(TestBackend::new(70, 16)).unwrap();
    terminal.draw(|f| app.render(f)).unwrap();

    let text = screen(terminal.backend().buffer());
    assert!(text.contains("tone.wav"));
    assert!(text.contains("Dominant frequency: 1500 Hz"));
    assert!(text.contains("Playing"));
}
