//! Interactive terminal loops
//!
//! Both loops redraw on a fixed interval and poll the keyboard between
//! frames. The live loop doubles as the display-refresh callback that drives
//! the sampling loop.

use ratatui::backend::Backend;
use ratatui::crossterm::event::{self, Event, KeyCode, KeyEventKind};
use ratatui::{Frame, Terminal};
use sigscope_core::domain::chart::{TimeMode, Trace};
use sigscope_core::domain::graph::AudioHost;
use sigscope_core::domain::playback::LivePlayer;
use sigscope_core::domain::visualization::EffectResult;
use sigscope_ui::{ComparisonView, LiveView};
use std::io;
use std::time::Duration;
use tracing::{debug, error};

/// Poll the keyboard for up to `timeout`
fn next_key(timeout: Duration) -> io::Result<Option<KeyCode>> {
    if event::poll(timeout)? {
        if let Event::Key(key) = event::read()? {
            if key.kind == KeyEventKind::Press {
                return Ok(Some(key.code));
            }
        }
    }
    Ok(None)
}

fn clock(secs: f64) -> String {
    let whole = secs.max(0.0).floor() as u64;
    format!("{}:{:02}", whole / 60, whole % 60)
}

// ============================================================================
// LIVE PLAYBACK
// ============================================================================

/// Live playback screen state
pub struct LiveApp<H: AudioHost> {
    player: LivePlayer<H>,
    title: String,
    trace: Trace,
    /// Last failure, shown until playback restarts
    error: Option<String>,
    should_quit: bool,
}

impl<H: AudioHost> LiveApp<H> {
    pub fn new(player: LivePlayer<H>, title: impl Into<String>) -> Self {
        Self {
            player,
            title: title.into(),
            trace: Trace::default(),
            error: None,
            should_quit: false,
        }
    }

    pub fn player(&self) -> &LivePlayer<H> {
        &self.player
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn trace(&self) -> Trace {
        self.trace
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Char('i') => self.trace = self.trace.toggled(),
            KeyCode::Char(' ') => match self.player.toggle() {
                Ok(()) => self.error = None,
                Err(e) => {
                    error!(error = %e, "Playback toggle failed");
                    self.error = Some(e.to_string());
                }
            },
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }

    /// One display frame: run the sampling tick
    pub fn tick(&mut self) {
        if let Err(e) = self.player.on_frame() {
            self.error = Some(format!("Analysis stopped: {}", e));
        }
    }

    pub fn status(&self) -> String {
        if let Some(error) = &self.error {
            return error.clone();
        }

        let element = self.player.element();
        let state = if self.player.is_playing() {
            "Playing"
        } else if element.has_ended() {
            "Finished"
        } else {
            "Paused"
        };
        format!(
            "{}  {} / {}",
            state,
            clock(element.position_secs()),
            clock(element.duration_secs())
        )
    }

    pub fn render(&self, frame: &mut Frame) {
        let sample = self.player.latest();
        let status = self.status();
        LiveView {
            title: &self.title,
            status: &status,
            sample: sample.as_ref(),
            trace: self.trace,
        }
        .render(frame, frame.area());
    }

    /// Run until the user quits, then release the audio graph
    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>, interval: Duration) -> io::Result<()> {
        debug!(interval_ms = interval.as_millis() as u64, "Live loop started");
        while !self.should_quit {
            self.tick();
            terminal.draw(|frame| self.render(frame))?;
            if let Some(key) = next_key(interval)? {
                self.handle_key(key);
            }
        }
        self.player.teardown();
        debug!("Live loop finished");
        Ok(())
    }
}

// ============================================================================
// COMPARISON
// ============================================================================

/// Processed-results screen state
pub struct ComparisonApp {
    results: Vec<EffectResult>,
    status: String,
    target_points: usize,
    scroll: usize,
    time_mode: TimeMode,
    should_quit: bool,
}

impl ComparisonApp {
    pub fn new(results: Vec<EffectResult>, status: impl Into<String>, target_points: usize) -> Self {
        Self {
            results,
            status: status.into(),
            target_points,
            scroll: 0,
            time_mode: TimeMode::default(),
            should_quit: false,
        }
    }

    pub fn scroll(&self) -> usize {
        self.scroll
    }

    pub fn time_mode(&self) -> TimeMode {
        self.time_mode
    }

    pub fn should_quit(&self) -> bool {
        self.should_quit
    }

    pub fn handle_key(&mut self, key: KeyCode) {
        match key {
            KeyCode::Down | KeyCode::Char('j') => {
                if self.scroll + 1 < self.results.len() {
                    self.scroll += 1;
                }
            }
            KeyCode::Up | KeyCode::Char('k') => self.scroll = self.scroll.saturating_sub(1),
            KeyCode::Char('c') => {
                self.time_mode = self.time_mode.toggled();
                debug!(mode = self.time_mode.label(), "Time view switched");
            }
            KeyCode::Char('q') | KeyCode::Char('Q') | KeyCode::Esc => self.should_quit = true,
            _ => {}
        }
    }

    pub fn render(&self, frame: &mut Frame) {
        ComparisonView {
            results: &self.results,
            status: &self.status,
            target_points: self.target_points,
            scroll: self.scroll,
            time_mode: self.time_mode,
        }
        .render(frame, frame.area());
    }

    pub fn run<B: Backend>(&mut self, terminal: &mut Terminal<B>, interval: Duration) -> io::Result<()> {
        while !self.should_quit {
            terminal.draw(|frame| self.render(frame))?;
            if let Some(key) = next_key(interval)? {
                self.handle_key(key);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::backend::TestBackend;
    use sigscope_core::domain::analysis::{AnalysisConfig, SampleTap};
    use sigscope_core::domain::graph::{
        AudioContext, ContextState, GraphError, MediaElement, SourceNode,
    };
    use std::sync::Arc;

    struct NullContext {
        state: ContextState,
    }

    impl AudioContext for NullContext {
        fn sample_rate(&self) -> u32 {
            8000
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
            _tap: SampleTap,
        ) -> Result<SourceNode, GraphError> {
            Ok(SourceNode::new(element.id()))
        }
        fn disconnect_source(&mut self, _node: SourceNode) -> Result<(), GraphError> {
            Ok(())
        }
        fn close(&mut self) -> Result<(), GraphError> {
            self.state = ContextState::Closed;
            Ok(())
        }
    }

    struct NullHost;

    impl AudioHost for NullHost {
        type Context = NullContext;
        fn create_context(&self) -> Result<NullContext, GraphError> {
            Ok(NullContext {
                state: ContextState::Suspended,
            })
        }
    }

    fn live_app() -> LiveApp<NullHost> {
        let element = Arc::new(MediaElement::new(vec![0.0; 8000 * 75], 8000));
        LiveApp::new(
            LivePlayer::new(NullHost, element, AnalysisConfig::default()),
            "clip.wav",
        )
    }

    #[test]
    fn test_clock() {
        assert_eq!(clock(0.0), "0:00");
        assert_eq!(clock(75.9), "1:15");
        assert_eq!(clock(-3.0), "0:00");
    }

    #[test]
    fn test_live_keys() {
        let mut app = live_app();
        assert_eq!(app.status(), "Paused  0:00 / 1:15");

        app.handle_key(KeyCode::Char(' '));
        assert!(app.player().is_playing());
        assert!(app.status().starts_with("Playing"));

        app.tick();
        app.handle_key(KeyCode::Char(' '));
        assert!(!app.player().is_playing());

        app.handle_key(KeyCode::Char('i'));
        assert_eq!(app.trace(), Trace::Step);
        app.handle_key(KeyCode::Char('i'));
        assert_eq!(app.trace(), Trace::Smooth);

        app.handle_key(KeyCode::Char('x'));
        assert!(!app.should_quit());
        app.handle_key(KeyCode::Char('q'));
        assert!(app.should_quit());
    }

    #[test]
    fn test_live_render() {
        let app = live_app();
        let mut terminal = Terminal::new(TestBackend::new(60, 14)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();

        let buffer = terminal.backend().buffer();
        let text: String = buffer.content.iter().map(|c| c.symbol()).collect();
        assert!(text.contains("clip.wav"));
        assert!(text.contains("Paused"));
    }

    #[test]
    fn test_comparison_scroll_bounds() {
        let mut app = ComparisonApp::new(Vec::new(), "Done", 50);
        app.handle_key(KeyCode::Down);
        assert_eq!(app.scroll(), 0);
        app.handle_key(KeyCode::Up);
        assert_eq!(app.scroll(), 0);
        app.handle_key(KeyCode::Esc);
        assert!(app.should_quit());
    }

    #[test]
    fn test_comparison_time_mode_toggle() {
        let mut app = ComparisonApp::new(Vec::new(), "Done", 50);
        assert_eq!(app.time_mode(), TimeMode::Stems);

        app.handle_key(KeyCode::Char('c'));
        assert_eq!(app.time_mode(), TimeMode::Continuous);

        let mut terminal = Terminal::new(TestBackend::new(60, 8)).unwrap();
        terminal.draw(|f| app.render(f)).unwrap();
        let text: String = terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|c| c.symbol())
            .collect();
        assert!(text.contains("time view: continuous"));

        app.handle_key(KeyCode::Char('c'));
        assert_eq!(app.time_mode(), TimeMode::Stems);
        assert!(!app.should_quit());
    }
}
