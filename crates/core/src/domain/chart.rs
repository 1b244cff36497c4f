//! Chart construction
//!
//! Turns live samples and backend frames into backend-agnostic chart
//! descriptions. Building is pure; drawing lives in the `sigscope-ui` crate.

use crate::domain::visualization::{VisualizationFrame, AUDIBLE_MAX_HZ, AUDIBLE_MIN_HZ};

/// 24-bit colour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

/// Dark-theme palette
pub mod palette {
    use super::Rgb;

    pub const INPUT: Rgb = Rgb(0x25, 0x63, 0xeb);
    pub const OUTPUT: Rgb = Rgb(0xdc, 0x26, 0x26);
    pub const LIVE: Rgb = Rgb(0x3b, 0x82, 0xf6);
    pub const BAND: Rgb = Rgb(0x9c, 0xa3, 0xaf);
    pub const BACKGROUND: Rgb = Rgb(0x1f, 0x1f, 0x1f);
    pub const GRID: Rgb = Rgb(0x44, 0x44, 0x44);
    pub const TEXT: Rgb = Rgb(0xff, 0xff, 0xff);

    /// Band shading intensity, 0 = invisible
    pub const BAND_OPACITY: f32 = 0.1;
}

/// Fixed tick positions of the spectrum axis
pub const FREQUENCY_TICKS: [f64; 10] = [
    20.0, 50.0, 100.0, 200.0, 500.0, 1000.0, 2000.0, 5000.0, 10_000.0, 20_000.0,
];

/// Spectrum y padding in dB
const SPECTRUM_PADDING_DB: f64 = 10.0;
/// Stem chart y padding, as a share of the bound's magnitude
const STEM_PADDING_RATIO: f64 = 0.2;
/// Samples drawn per segment when flattening smooth curves
const CURVE_RESOLUTION: usize = 8;
/// Time segments marked across the live trace
const LIVE_SEGMENTS: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisScale {
    Linear,
    Log10,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Tick {
    pub value: f64,
    pub label: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Axis {
    pub title: Option<String>,
    pub scale: AxisScale,
    pub min: f64,
    pub max: f64,
    pub ticks: Vec<Tick>,
}

impl Axis {
    pub fn linear(min: f64, max: f64) -> Self {
        Self {
            title: None,
            scale: AxisScale::Linear,
            min,
            max,
            ticks: linear_ticks(min, max, 5),
        }
    }

    pub fn log10(min: f64, max: f64, ticks: &[f64]) -> Self {
        Self {
            title: None,
            scale: AxisScale::Log10,
            min,
            max,
            ticks: ticks
                .iter()
                .map(|&value| Tick { value, label: format_hz(value) })
                .collect(),
        }
    }

    pub fn titled(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }

    /// Position of `value` along the axis in `[0, 1]` (unclamped)
    pub fn project(&self, value: f64) -> f64 {
        match self.scale {
            AxisScale::Linear => {
                let span = self.max - self.min;
                if span == 0.0 {
                    0.5
                } else {
                    (value - self.min) / span
                }
            }
            AxisScale::Log10 => {
                if value <= 0.0 || self.min <= 0.0 {
                    return 0.0;
                }
                let lo = self.min.log10();
                let span = self.max.log10() - lo;
                if span == 0.0 {
                    0.5
                } else {
                    (value.log10() - lo) / span
                }
            }
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

/// Interpolating curve through a series
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Curve {
    /// Cardinal spline through every point
    Cardinal { tension: f64 },
    /// Monotone in x; never overshoots between points
    MonotoneX,
}

/// How a series is drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SeriesStyle {
    Line,
    /// Vertical line from the baseline to each point, with a point marker
    Stem,
    /// Hold each value until the next point
    Step,
    Smooth(Curve),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub name: String,
    pub color: Rgb,
    pub style: SeriesStyle,
    pub points: Vec<(f64, f64)>,
}

impl Series {
    pub fn new(name: &str, color: Rgb, style: SeriesStyle, points: Vec<(f64, f64)>) -> Self {
        Self {
            name: name.to_string(),
            color,
            style,
            points,
        }
    }

    /// Polyline approximating the series in data space
    ///
    /// Stem series return their raw points; the renderer draws the stems.
    pub fn path(&self) -> Vec<(f64, f64)> {
        match self.style {
            SeriesStyle::Line | SeriesStyle::Stem => self.points.clone(),
            SeriesStyle::Step => step_after(&self.points),
            SeriesStyle::Smooth(Curve::Cardinal { tension }) => {
                cardinal_spline(&self.points, tension, CURVE_RESOLUTION)
            }
            SeriesStyle::Smooth(Curve::MonotoneX) => monotone_x(&self.points, CURVE_RESOLUTION),
        }
    }
}

/// Shaded vertical band
#[derive(Debug, Clone, PartialEq)]
pub struct Band {
    pub low: f64,
    pub high: f64,
    pub color: Rgb,
    pub opacity: f32,
}

/// Complete chart description
#[derive(Debug, Clone, PartialEq)]
pub struct ChartSpec {
    pub title: Option<String>,
    pub x: Axis,
    pub y: Axis,
    pub series: Vec<Series>,
    pub band: Option<Band>,
    pub legend: bool,
    /// Dashed horizontal reference line
    pub baseline: Option<f64>,
    /// Faint horizontal guide lines
    pub guides: Vec<f64>,
    /// Faint vertical guide lines
    pub x_guides: Vec<f64>,
}

impl ChartSpec {
    pub fn with_title(mut self, title: &str) -> Self {
        self.title = Some(title.to_string());
        self
    }
}

/// How the single live trace is drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Trace {
    #[default]
    Smooth,
    /// Hold each sample until the next one
    Step,
}

impl Trace {
    pub fn toggled(self) -> Self {
        match self {
            Trace::Smooth => Trace::Step,
            Trace::Step => Trace::Smooth,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            Trace::Smooth => "smooth",
            Trace::Step => "step",
        }
    }

    fn style(self) -> SeriesStyle {
        match self {
            Trace::Smooth => SeriesStyle::Smooth(Curve::Cardinal { tension: 0.0 }),
            Trace::Step => SeriesStyle::Step,
        }
    }
}

/// Time-domain half of a comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeMode {
    /// Downsampled stems, see [`time_comparison`]
    #[default]
    Stems,
    /// Every sample as a smoothed curve, see [`time_continuous`]
    Continuous,
}

impl TimeMode {
    pub fn toggled(self) -> Self {
        match self {
            TimeMode::Stems => TimeMode::Continuous,
            TimeMode::Continuous => TimeMode::Stems,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            TimeMode::Stems => "stems",
            TimeMode::Continuous => "continuous",
        }
    }
}

// ============================================================================
// BUILDERS
// ============================================================================

/// Live waveform: fixed `[-1, 1]` amplitude over the sample index
///
/// The trace is split into ten time segments by vertical guides.
pub fn live_waveform(samples: &[f32], trace: Trace) -> Option<ChartSpec> {
    if samples.is_empty() {
        return None;
    }

    let points: Vec<(f64, f64)> = samples
        .iter()
        .enumerate()
        .map(|(i, &v)| (i as f64, v as f64))
        .collect();
    let x_max = (samples.len() - 1).max(1) as f64;

    Some(ChartSpec {
        title: None,
        x: Axis::linear(0.0, x_max),
        y: Axis::linear(-1.0, 1.0),
        series: vec![Series::new("Live", palette::LIVE, trace.style(), points)],
        band: None,
        legend: false,
        baseline: Some(0.0),
        guides: vec![-0.5, 0.5],
        x_guides: (1..LIVE_SEGMENTS)
            .map(|i| x_max * i as f64 / LIVE_SEGMENTS as f64)
            .collect(),
    })
}

/// Time-domain comparison chart in `mode`
pub fn time_domain(frame: &VisualizationFrame, mode: TimeMode, target_points: usize) -> Option<ChartSpec> {
    match mode {
        TimeMode::Stems => time_comparison(frame, target_points),
        TimeMode::Continuous => time_continuous(frame),
    }
}

/// Input/output stems, downsampled to roughly `target_points` per series
pub fn time_comparison(frame: &VisualizationFrame, target_points: usize) -> Option<ChartSpec> {
    let td = &frame.time_domain;
    if td.is_empty() || !td.is_consistent() {
        return None;
    }

    let stride = downsample_stride(td.len(), target_points);
    let pick = |values: &[f64]| -> Vec<(f64, f64)> {
        td.time
            .iter()
            .zip(values.iter())
            .step_by(stride)
            .map(|(&t, &v)| (t, v))
            .collect()
    };
    let input = pick(&td.input);
    let output = pick(&td.output);

    Some(time_chart(
        Series::new("Input", palette::INPUT, SeriesStyle::Stem, input),
        Series::new("Output", palette::OUTPUT, SeriesStyle::Stem, output),
    ))
}

/// Input/output waveforms without downsampling
pub fn time_continuous(frame: &VisualizationFrame) -> Option<ChartSpec> {
    let td = &frame.time_domain;
    if td.is_empty() || !td.is_consistent() {
        return None;
    }

    let zip = |values: &[f64]| -> Vec<(f64, f64)> {
        td.time.iter().copied().zip(values.iter().copied()).collect()
    };
    let smooth = SeriesStyle::Smooth(Curve::Cardinal { tension: 0.0 });

    Some(time_chart(
        Series::new("Input", palette::INPUT, smooth, zip(&td.input)),
        Series::new("Output", palette::OUTPUT, smooth, zip(&td.output)),
    ))
}

fn time_chart(input: Series, output: Series) -> ChartSpec {
    let (x_min, x_max) = widen(bounds(input.points.iter().map(|p| p.0)));
    let (y_min, y_max) = padded_amplitude(bounds(
        input.points.iter().chain(output.points.iter()).map(|p| p.1),
    ));

    ChartSpec {
        title: None,
        x: Axis::linear(x_min, x_max).titled("Time (seconds)"),
        y: Axis::linear(y_min, y_max).titled("Amplitude"),
        series: vec![input, output],
        band: None,
        legend: true,
        baseline: Some(0.0),
        guides: Vec::new(),
        x_guides: Vec::new(),
    }
}

/// Input/output spectra on a log frequency axis with the effect band shaded
pub fn spectrum(frame: &VisualizationFrame) -> Option<ChartSpec> {
    let fd = &frame.frequency_domain;
    if !fd.is_consistent() {
        return None;
    }

    let bins = fd.audible_bins();
    if bins.is_empty() {
        return None;
    }

    let input: Vec<(f64, f64)> = bins.iter().map(|&(hz, i, _)| (hz, i)).collect();
    let output: Vec<(f64, f64)> = bins.iter().map(|&(hz, _, o)| (hz, o)).collect();

    let (lo, hi) = bounds(bins.iter().flat_map(|&(_, i, o)| [i, o]));
    let y = Axis::linear(lo - SPECTRUM_PADDING_DB, hi + SPECTRUM_PADDING_DB).titled("Magnitude (dB)");
    let x = Axis::log10(AUDIBLE_MIN_HZ, AUDIBLE_MAX_HZ, &FREQUENCY_TICKS).titled("Frequency (Hz)");

    let (band_low, band_high) = frame.effect_info.frequency_range;
    let band_low = band_low.max(AUDIBLE_MIN_HZ);
    let band_high = band_high.min(AUDIBLE_MAX_HZ);
    let band = (band_low < band_high).then(|| Band {
        low: band_low,
        high: band_high,
        color: palette::BAND,
        opacity: palette::BAND_OPACITY,
    });

    Some(ChartSpec {
        title: None,
        x,
        y,
        series: vec![
            Series::new("Input", palette::INPUT, SeriesStyle::Smooth(Curve::MonotoneX), input),
            Series::new("Output", palette::OUTPUT, SeriesStyle::Smooth(Curve::MonotoneX), output),
        ],
        band,
        legend: true,
        baseline: None,
        guides: Vec::new(),
        x_guides: Vec::new(),
    })
}

/// `ceil(len / target)`, at least 1
pub fn downsample_stride(len: usize, target_points: usize) -> usize {
    if target_points == 0 {
        return 1;
    }
    len.div_ceil(target_points).max(1)
}

fn bounds(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values
        .filter(|v| v.is_finite())
        .fold(None, |acc: Option<(f64, f64)>, v| match acc {
            None => Some((v, v)),
            Some((lo, hi)) => Some((lo.min(v), hi.max(v))),
        })
        .unwrap_or((0.0, 0.0))
}

fn widen((lo, hi): (f64, f64)) -> (f64, f64) {
    if hi - lo > f64::EPSILON {
        (lo, hi)
    } else {
        (lo - 1.0, hi + 1.0)
    }
}

fn padded_amplitude((lo, hi): (f64, f64)) -> (f64, f64) {
    widen((
        lo - lo.abs() * STEM_PADDING_RATIO,
        hi + hi.abs() * STEM_PADDING_RATIO,
    ))
}

// ============================================================================
// CURVES
// ============================================================================

fn step_after(points: &[(f64, f64)]) -> Vec<(f64, f64)> {
    let mut out = Vec::with_capacity(points.len() * 2);
    for pair in points.windows(2) {
        let (x0, y0) = pair[0];
        let (x1, _) = pair[1];
        out.push((x0, y0));
        out.push((x1, y0));
    }
    if let Some(&last) = points.last() {
        out.push(last);
    }
    out
}

fn hermite(p0: f64, p1: f64, m0: f64, m1: f64, t: f64) -> f64 {
    let t2 = t * t;
    let t3 = t2 * t;
    (2.0 * t3 - 3.0 * t2 + 1.0) * p0
        + (t3 - 2.0 * t2 + t) * m0
        + (-2.0 * t3 + 3.0 * t2) * p1
        + (t3 - t2) * m1
}

/// Cardinal spline through `points`, `resolution` samples per segment
///
/// Tension 0 gives a Catmull-Rom curve; tension 1 gives straight lines.
pub fn cardinal_spline(points: &[(f64, f64)], tension: f64, resolution: usize) -> Vec<(f64, f64)> {
    if points.len() < 3 || resolution == 0 {
        return points.to_vec();
    }

    let scale = (1.0 - tension) / 2.0;
    let n = points.len();
    let tangent = |i: usize| -> (f64, f64) {
        let prev = points[i.saturating_sub(1)];
        let next = points[(i + 1).min(n - 1)];
        (scale * (next.0 - prev.0), scale * (next.1 - prev.1))
    };

    let mut out = Vec::with_capacity((n - 1) * resolution + 1);
    for i in 0..n - 1 {
        let (p0, p1) = (points[i], points[i + 1]);
        let (m0, m1) = (tangent(i), tangent(i + 1));
        for step in 0..resolution {
            let t = step as f64 / resolution as f64;
            out.push((
                hermite(p0.0, p1.0, m0.0, m1.0, t),
                hermite(p0.1, p1.1, m0.1, m1.1, t),
            ));
        }
    }
    out.push(points[n - 1]);
    out
}

/// Monotone cubic interpolation in x (Steffen's method)
///
/// Points must be sorted by x. The curve never overshoots between points.
pub fn monotone_x(points: &[(f64, f64)], resolution: usize) -> Vec<(f64, f64)> {
    let n = points.len();
    if n < 3 || resolution == 0 {
        return points.to_vec();
    }

    let h: Vec<f64> = points.windows(2).map(|w| w[1].0 - w[0].0).collect();
    let s: Vec<f64> = points
        .windows(2)
        .zip(h.iter())
        .map(|(w, &dx)| if dx == 0.0 { 0.0 } else { (w[1].1 - w[0].1) / dx })
        .collect();

    let mut m = vec![0.0; n];
    for i in 1..n - 1 {
        let (h0, h1) = (h[i - 1], h[i]);
        let (s0, s1) = (s[i - 1], s[i]);
        let p = if h0 + h1 == 0.0 { 0.0 } else { (s0 * h1 + s1 * h0) / (h0 + h1) };
        m[i] = (s0.signum() + s1.signum()) * s0.abs().min(s1.abs()).min(0.5 * p.abs());
    }
    m[0] = end_slope(h[0], s[0], m[1]);
    m[n - 1] = end_slope(h[n - 2], s[n - 2], m[n - 2]);

    let mut out = Vec::with_capacity((n - 1) * resolution + 1);
    for i in 0..n - 1 {
        let (x0, y0) = points[i];
        let y1 = points[i + 1].1;
        let dx = h[i];
        for step in 0..resolution {
            let t = step as f64 / resolution as f64;
            out.push((x0 + dx * t, hermite(y0, y1, m[i] * dx, m[i + 1] * dx, t)));
        }
    }
    out.push(points[n - 1]);
    out
}

fn end_slope(h: f64, s: f64, neighbour: f64) -> f64 {
    if h == 0.0 {
        neighbour
    } else {
        (3.0 * s - neighbour) / 2.0
    }
}

// ============================================================================
// TICKS
// ============================================================================

/// Roughly `count` evenly spaced ticks at 1-2-5 multiples covering `[min, max]`
pub fn linear_ticks(min: f64, max: f64, count: usize) -> Vec<Tick> {
    if !(min.is_finite() && max.is_finite()) || max <= min || count == 0 {
        return Vec::new();
    }

    let span = max - min;
    if !span.is_finite() {
        return endpoint_ticks(min, max);
    }

    let raw = span / count as f64;
    let magnitude = 10f64.powf(raw.log10().floor());
    let error = raw / magnitude;
    let step = magnitude
        * if error >= 50f64.sqrt() {
            10.0
        } else if error >= 10f64.sqrt() {
            5.0
        } else if error >= 2f64.sqrt() {
            2.0
        } else {
            1.0
        };

    let first = (min / step).ceil();
    let last = (max / step).floor();
    if !(step.is_finite() && step > 0.0) || last - first > (count * 4) as f64 {
        return endpoint_ticks(min, max);
    }

    (first as i64..=last as i64)
        .map(|k| {
            let value = k as f64 * step;
            Tick { value, label: format_number(value) }
        })
        .collect()
}

fn endpoint_ticks(min: f64, max: f64) -> Vec<Tick> {
    [min, max]
        .into_iter()
        .map(|value| Tick { value, label: format_number(value) })
        .collect()
}

fn format_number(value: f64) -> String {
    let scaled = value * 1000.0;
    let rounded = if scaled.is_finite() { scaled.round() / 1000.0 } else { value };
    if rounded == 0.0 {
        return "0".to_string();
    }
    if rounded.abs() >= 1e6 {
        return format!("{:e}", rounded);
    }
    format!("{}", rounded)
}

fn format_hz(hz: f64) -> String {
    if hz >= 1000.0 {
        format!("{}k", hz / 1000.0)
    } else {
        format!("{}", hz)
    }
}
