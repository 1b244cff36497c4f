//! Screen layouts

use crate::chart::{color, render_chart};
use ratatui::{
    layout::{Alignment, Constraint, Direction, Layout, Rect},
    style::{Modifier, Style},
    text::Line,
    widgets::{Block, Borders, Clear, Paragraph},
    Frame,
};
use sigscope_core::domain::chart::{self, palette, TimeMode, Trace};
use sigscope_core::domain::sampling::LiveAudioSample;
use sigscope_core::domain::visualization::EffectResult;

/// Smallest height of one effect row in the comparison view
const MIN_RESULT_HEIGHT: u16 = 12;

fn text_style() -> Style {
    Style::default().fg(color(palette::TEXT))
}

fn panel(title: &str) -> Block<'static> {
    Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color(palette::GRID)))
        .style(Style::default().bg(color(palette::BACKGROUND)))
        .title(Line::styled(
            format!(" {} ", title),
            text_style().add_modifier(Modifier::BOLD),
        ))
}

// ============================================================================
// LIVE VIEW
// ============================================================================

/// Live playback screen: status, dominant frequency and the waveform
#[derive(Debug, Clone, Copy)]
pub struct LiveView<'a> {
    pub title: &'a str,
    pub status: &'a str,
    pub sample: Option<&'a LiveAudioSample>,
    pub trace: Trace,
}

impl LiveView<'_> {
    pub fn render(&self, frame: &mut Frame, area: Rect) {
        frame.render_widget(Clear, area);
        let block = panel(self.title);
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1), // status
                Constraint::Length(1), // dominant frequency
                Constraint::Min(5),    // waveform
                Constraint::Length(1), // help
            ])
            .split(inner);

        frame.render_widget(Paragraph::new(self.status).style(text_style()), rows[0]);

        let readout = match self.sample {
            Some(sample) => format!("Dominant frequency: {} Hz", sample.dominant_frequency_hz),
            None => "Dominant frequency: -".to_string(),
        };
        frame.render_widget(Paragraph::new(readout).style(text_style()), rows[1]);

        let spec = self
            .sample
            .and_then(|sample| chart::live_waveform(&sample.time_domain, self.trace));
        render_chart(frame, rows[2], spec.as_ref());
        if spec.is_none() {
            frame.render_widget(
                Paragraph::new("Press space to start playback")
                    .alignment(Alignment::Center)
                    .style(text_style()),
                centered_line(rows[2]),
            );
        }

        frame.render_widget(
            Paragraph::new(format!("space play/pause  i trace: {}  q quit", self.trace.label()))
                .style(Style::default().fg(color(palette::BAND))),
            rows[3],
        );
    }
}

fn centered_line(area: Rect) -> Rect {
    Rect {
        y: area.y + area.height / 2,
        height: area.height.min(1),
        ..area
    }
}

// ============================================================================
// COMPARISON VIEW
// ============================================================================

/// Input/output charts for every processed effect
#[derive(Debug, Clone, Copy)]
pub struct ComparisonView<'a> {
    pub results: &'a [EffectResult],
    pub status: &'a str,
    /// Points per series on the stem charts
    pub target_points: usize,
    /// Index of the first result shown
    pub scroll: usize,
    pub time_mode: TimeMode,
}

impl ComparisonView<'_> {
    /// Results that fit in `area` at once
    pub fn visible_rows(area: Rect) -> usize {
        (area.height.saturating_sub(2) / MIN_RESULT_HEIGHT).max(1) as usize
    }

    pub fn render(&self, frame: &mut Frame, area: Rect) {
        frame.render_widget(Clear, area);

        let rows = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Length(1),
                Constraint::Min(0),
                Constraint::Length(1),
            ])
            .split(area);

        frame.render_widget(Paragraph::new(self.status).style(text_style()), rows[0]);
        frame.render_widget(
            Paragraph::new(format!(
                "up/down scroll  c time view: {}  q quit",
                self.time_mode.label()
            ))
            .style(Style::default().fg(color(palette::BAND))),
            rows[2],
        );

        if self.results.is_empty() {
            frame.render_widget(
                Paragraph::new("No visualizations returned")
                    .alignment(Alignment::Center)
                    .style(text_style()),
                centered_line(rows[1]),
            );
            return;
        }

        let start = self.scroll.min(self.results.len() - 1);
        let visible = &self.results[start..];
        let visible = &visible[..visible.len().min(Self::visible_rows(area))];

        let slots = Layout::default()
            .direction(Direction::Vertical)
            .constraints(vec![Constraint::Ratio(1, visible.len() as u32); visible.len()])
            .split(rows[1]);

        for (result, &slot) in visible.iter().zip(slots.iter()) {
            self.render_result(frame, slot, result);
        }
    }

    fn render_result(&self, frame: &mut Frame, area: Rect, result: &EffectResult) {
        let block = panel(&result.title());
        let inner = block.inner(area);
        frame.render_widget(block, area);

        let halves = Layout::default()
            .direction(Direction::Horizontal)
            .constraints([Constraint::Percentage(50), Constraint::Percentage(50)])
            .split(inner);

        let time = chart::time_domain(&result.frame, self.time_mode, self.target_points)
            .map(|spec| spec.with_title("Time Domain"));
        let spectrum = chart::spectrum(&result.frame).map(|spec| spec.with_title("Frequency Domain"));

        render_chart(frame, halves[0], time.as_ref());
        render_chart(frame, halves[1], spectrum.as_ref());
    }
}
