//! Chart widget rendering
//!
//! Every chart is drawn in a unit square: data coordinates are projected
//! through the [`ChartSpec`] axes first, so log-scaled and linear axes go
//! through the same ratatui `Chart`.

use ratatui::{
    layout::{Constraint, Rect},
    style::{Color, Style},
    symbols::Marker,
    text::Line,
    widgets::{Axis, Block, Borders, Chart, Clear, Dataset, GraphType, LegendPosition},
    Frame,
};
use sigscope_core::domain::chart::{palette, Axis as AxisSpec, AxisScale, ChartSpec, Rgb, SeriesStyle};

/// Upper bound on labels along one axis
const MAX_AXIS_LABELS: usize = 5;
/// Vertical lines used to shade a band
const BAND_COLUMNS: usize = 160;
/// Gap between dashes of the baseline, in unit coordinates
const DASH_SPACING: f64 = 0.025;
/// Projected distance at which a tick counts as sitting on a label slot
const LABEL_TOLERANCE: f64 = 1e-3;

pub fn color(rgb: Rgb) -> Color {
    Color::Rgb(rgb.0, rgb.1, rgb.2)
}

/// Mix `fg` over `bg`; `opacity` 0 gives `bg`
pub fn blend(fg: Rgb, bg: Rgb, opacity: f32) -> Rgb {
    let a = opacity.clamp(0.0, 1.0);
    let mix = |f: u8, b: u8| (f as f32 * a + b as f32 * (1.0 - a)).round() as u8;
    Rgb(mix(fg.0, bg.0), mix(fg.1, bg.1), mix(fg.2, bg.2))
}

/// One ratatui dataset, owning its projected points
struct Layer {
    name: Option<String>,
    points: Vec<(f64, f64)>,
    graph: GraphType,
    marker: Marker,
    color: Color,
}

impl Layer {
    fn new(points: Vec<(f64, f64)>, graph: GraphType, color: Color) -> Self {
        Self {
            name: None,
            points,
            graph,
            marker: Marker::Braille,
            color,
        }
    }
}

/// Draw `spec` into `area`
///
/// The area is always cleared first; `None` leaves it blank.
pub fn render_chart(frame: &mut Frame, area: Rect, spec: Option<&ChartSpec>) {
    frame.render_widget(Clear, area);
    let Some(spec) = spec else {
        return;
    };

    let layers = layers(spec);
    let datasets: Vec<Dataset> = layers
        .iter()
        .map(|layer| {
            let dataset = Dataset::default()
                .marker(layer.marker)
                .graph_type(layer.graph)
                .style(Style::default().fg(layer.color))
                .data(&layer.points);
            match &layer.name {
                Some(name) => dataset.name(name.clone()),
                None => dataset,
            }
        })
        .collect();

    let text = Style::default().fg(color(palette::TEXT));
    let background = Style::default().bg(color(palette::BACKGROUND));

    let mut block = Block::default()
        .borders(Borders::ALL)
        .border_style(Style::default().fg(color(palette::GRID)))
        .style(background);
    if let Some(title) = &spec.title {
        block = block.title(Line::styled(format!(" {} ", title), text));
    }

    let chart = Chart::new(datasets)
        .block(block)
        .style(background.fg(color(palette::TEXT)))
        .x_axis(axis(&spec.x, text))
        .y_axis(axis(&spec.y, text))
        .legend_position(spec.legend.then_some(LegendPosition::TopRight))
        .hidden_legend_constraints((Constraint::Ratio(1, 2), Constraint::Ratio(1, 2)));

    frame.render_widget(chart, area);
}

fn axis<'a>(spec: &AxisSpec, style: Style) -> Axis<'a> {
    let axis = Axis::default()
        .bounds([0.0, 1.0])
        .style(style)
        .labels(axis_labels(spec));
    match &spec.title {
        Some(title) => axis.title(Line::styled(title.clone(), style)),
        None => axis,
    }
}

/// Labels for evenly spaced slots along the axis
///
/// ratatui spaces labels evenly, so the axis ticks are used only when
/// every slot lands on one of them (decades on a log axis, for example).
/// Otherwise the slot values are formatted directly.
pub fn axis_labels(spec: &AxisSpec) -> Vec<String> {
    for count in (2..=MAX_AXIS_LABELS).rev() {
        let labels: Option<Vec<String>> = slots(count)
            .map(|slot| {
                spec.ticks
                    .iter()
                    .find(|tick| (spec.project(tick.value) - slot).abs() < LABEL_TOLERANCE)
                    .map(|tick| tick.label.clone())
            })
            .collect();
        if let Some(labels) = labels {
            return labels;
        }
    }

    slots(3).map(|slot| format_value(unproject(spec, slot))).collect()
}

fn slots(count: usize) -> impl Iterator<Item = f64> {
    let last = (count - 1).max(1) as f64;
    (0..count).map(move |k| k as f64 / last)
}

fn unproject(spec: &AxisSpec, position: f64) -> f64 {
    match spec.scale {
        AxisScale::Linear => spec.min + position * (spec.max - spec.min),
        AxisScale::Log10 if spec.min > 0.0 && spec.max > 0.0 => {
            let lo = spec.min.log10();
            10f64.powf(lo + position * (spec.max.log10() - lo))
        }
        AxisScale::Log10 => spec.min,
    }
}

fn format_value(value: f64) -> String {
    if value.abs() >= 1000.0 {
        format!("{:.0}", value)
    } else {
        let text = format!("{:.2}", value);
        let text = text.trim_end_matches('0').trim_end_matches('.');
        match text {
            "-0" | "" => "0".to_string(),
            other => other.to_string(),
        }
    }
}

/// Band, reference lines and series, back to front
fn layers(spec: &ChartSpec) -> Vec<Layer> {
    let project = |(x, y): (f64, f64)| (spec.x.project(x), spec.y.project(y));
    let mut layers = Vec::new();

    if let Some(band) = &spec.band {
        let low = spec.x.project(band.low).clamp(0.0, 1.0);
        let high = spec.x.project(band.high).clamp(0.0, 1.0);
        if low < high {
            // Bars rise from y = 0, the bottom edge of the unit square
            let columns = (0..=BAND_COLUMNS)
                .map(|i| (low + (high - low) * i as f64 / BAND_COLUMNS as f64, 1.0))
                .collect();
            let shade = blend(band.color, palette::BACKGROUND, band.opacity);
            layers.push(Layer::new(columns, GraphType::Bar, color(shade)));
        }
    }

    let grid = color(palette::GRID);
    for &guide in &spec.guides {
        let y = spec.y.project(guide);
        layers.push(Layer::new(vec![(0.0, y), (1.0, y)], GraphType::Line, grid));
    }
    for &guide in &spec.x_guides {
        let x = spec.x.project(guide);
        layers.push(Layer::new(vec![(x, 0.0), (x, 1.0)], GraphType::Line, grid));
    }

    if let Some(baseline) = spec.baseline {
        let y = spec.y.project(baseline);
        let dashes = (0..)
            .map(|i| i as f64 * DASH_SPACING)
            .take_while(|&x| x <= 1.0)
            .map(|x| (x, y))
            .collect();
        let mut layer = Layer::new(dashes, GraphType::Scatter, grid);
        layer.marker = Marker::Dot;
        layers.push(layer);
    }

    let stem_base = spec.y.project(spec.baseline.unwrap_or(0.0)).clamp(0.0, 1.0);
    for series in &spec.series {
        let series_color = color(series.color);
        let name = spec.legend.then(|| series.name.clone());

        match series.style {
            SeriesStyle::Stem => {
                let heads: Vec<(f64, f64)> = series.points.iter().copied().map(project).collect();
                let stems = heads
                    .iter()
                    .flat_map(|&(x, y)| [(x, stem_base), (x, y), (x, stem_base)])
                    .collect();

                let mut stem_layer = Layer::new(stems, GraphType::Line, series_color);
                stem_layer.name = name;
                layers.push(stem_layer);

                let mut head_layer = Layer::new(heads, GraphType::Scatter, series_color);
                head_layer.marker = Marker::Dot;
                layers.push(head_layer);
            }
            _ => {
                let path = series.path().into_iter().map(project).collect();
                let mut layer = Layer::new(path, GraphType::Line, series_color);
                layer.name = name;
                layers.push(layer);
            }
        }
    }

    layers
}
