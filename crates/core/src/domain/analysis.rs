//! Spectral analysis
//!
//! Dominant-frequency estimation over magnitude buffers and a real-time
//! analyser fed from the audio callback through a lock-free tap.

use crate::domain::graph::GraphError;
use crossbeam::queue::ArrayQueue;
use rustfft::num_complex::Complex;
use rustfft::{Fft, FftPlanner};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::f32::consts::PI;
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

pub type Result<T> = std::result::Result<T, GraphError>;

/// Smallest accepted transform window
pub const MIN_FFT_SIZE: usize = 32;
/// Largest accepted transform window
pub const MAX_FFT_SIZE: usize = 32768;

// ============================================================================
// FREQUENCY ESTIMATOR
// ============================================================================

/// Element of a frequency-domain magnitude buffer
pub trait Magnitude: Copy + PartialOrd {
    /// Value that denotes silence for this representation
    const FLOOR: Self;
}

impl Magnitude for u8 {
    const FLOOR: Self = 0;
}

impl Magnitude for f32 {
    const FLOOR: Self = f32::NEG_INFINITY;
}

/// Index of the first bin holding the buffer maximum, if any bin is above the floor
pub fn peak_bin<M: Magnitude>(buffer: &[M]) -> Option<usize> {
    let mut best: Option<(usize, M)> = None;
    for (bin, &value) in buffer.iter().enumerate() {
        let current = best.map(|(_, v)| v).unwrap_or(M::FLOOR);
        // Strict comparison keeps the first maximum and skips NaN
        if value > current {
            best = Some((bin, value));
        }
    }
    best.map(|(bin, _)| bin)
}

/// Estimate the dominant frequency of a magnitude buffer
///
/// Returns `round(bin * sample_rate / fft_size)` for the strongest bin, or 0
/// when the buffer is silent, empty, or the window size is zero.
pub fn estimate_dominant_frequency<M: Magnitude>(
    buffer: &[M],
    sample_rate_hz: u32,
    fft_size: usize,
) -> u32 {
    if fft_size == 0 {
        return 0;
    }

    match peak_bin(buffer) {
        Some(bin) => {
            let hz = bin as f64 * sample_rate_hz as f64 / fft_size as f64;
            hz.round() as u32
        }
        None => 0,
    }
}

/// Map unsigned-byte time-domain samples to `[-1, 1)`
pub fn normalize_time_domain(bytes: &[u8]) -> Vec<f32> {
    bytes.iter().map(|&v| normalize_byte(v)).collect()
}

#[inline]
pub fn normalize_byte(value: u8) -> f32 {
    value as f32 / 128.0 - 1.0
}

// ============================================================================
// ANALYSER CONFIGURATION
// ============================================================================

/// Analyser settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Transform window size (power of two)
    pub fft_size: usize,

    /// Averaging constant between consecutive spectra, 0 = none
    pub smoothing_time_constant: f32,

    /// Spectrum value mapped to byte 0
    pub min_decibels: f32,

    /// Spectrum value mapped to byte 255
    pub max_decibels: f32,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            fft_size: 2048,
            smoothing_time_constant: 0.5,
            min_decibels: -100.0,
            max_decibels: -30.0,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.fft_size.is_power_of_two()
            || !(MIN_FFT_SIZE..=MAX_FFT_SIZE).contains(&self.fft_size)
        {
            return Err(GraphError::InvalidConfig(format!(
                "fft_size {} must be a power of two in [{}, {}]",
                self.fft_size, MIN_FFT_SIZE, MAX_FFT_SIZE
            )));
        }

        if !(0.0..=1.0).contains(&self.smoothing_time_constant) {
            return Err(GraphError::InvalidConfig(format!(
                "smoothing_time_constant {} must be within [0, 1]",
                self.smoothing_time_constant
            )));
        }

        if !(self.min_decibels < self.max_decibels) {
            return Err(GraphError::InvalidConfig(format!(
                "min_decibels {} must be below max_decibels {}",
                self.min_decibels, self.max_decibels
            )));
        }

        Ok(())
    }

    /// Number of frequency bins produced per analysis
    pub fn frequency_bin_count(&self) -> usize {
        self.fft_size / 2
    }
}

// ============================================================================
// SAMPLE TAP
// ============================================================================

/// Lock-free channel from the audio callback to the analyser
///
/// Bounded; when full, the oldest samples are overwritten so the analyser
/// always sees the most recent audio.
#[derive(Clone)]
pub struct SampleTap {
    queue: Arc<ArrayQueue<f32>>,
}

impl SampleTap {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Arc::new(ArrayQueue::new(capacity.max(1))),
        }
    }

    /// Push rendered samples (real-time safe)
    #[inline]
    pub fn push_slice(&self, samples: &[f32]) {
        for &sample in samples {
            self.queue.force_push(sample);
        }
    }

    pub fn pop(&self) -> Option<f32> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }
}

impl std::fmt::Debug for SampleTap {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SampleTap")
            .field("len", &self.queue.len())
            .field("capacity", &self.queue.capacity())
            .finish()
    }
}

// ============================================================================
// ANALYSER
// ============================================================================

/// Real-time analyser over the newest `fft_size` samples
pub struct Analyser {
    config: AnalysisConfig,
    sample_rate: u32,
    tap: SampleTap,
    window: VecDeque<f32>,
    blackman: Vec<f32>,
    fft: Arc<dyn Fft<f32>>,
    spectrum: Vec<Complex<f32>>,
    scratch: Vec<Complex<f32>>,
    smoothed: Vec<f32>,
    closed: bool,
}

/// Analyser shared between the controller and its handles
pub type SharedAnalyser = Arc<Mutex<Analyser>>;

impl Analyser {
    pub fn new(config: &AnalysisConfig, sample_rate: u32, tap: SampleTap) -> Result<Self> {
        config.validate()?;

        let n = config.fft_size;
        let fft = FftPlanner::<f32>::new().plan_fft_forward(n);
        let scratch = vec![Complex::default(); fft.get_inplace_scratch_len()];

        debug!(fft_size = n, sample_rate, "Analyser created");

        Ok(Self {
            config: config.clone(),
            sample_rate,
            tap,
            window: std::iter::repeat(0.0).take(n).collect(),
            blackman: blackman_window(n),
            fft,
            spectrum: vec![Complex::default(); n],
            scratch,
            smoothed: vec![0.0; n / 2],
            closed: false,
        })
    }

    pub fn fft_size(&self) -> usize {
        self.config.fft_size
    }

    pub fn frequency_bin_count(&self) -> usize {
        self.config.frequency_bin_count()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Stop analysing; later reads fail
    pub fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.window.iter_mut().for_each(|s| *s = 0.0);
            self.smoothed.iter_mut().for_each(|s| *s = 0.0);
            debug!("Analyser closed");
        }
    }

    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.closed {
            Err(GraphError::GraphState {
                operation,
                state: "closed".to_string(),
            })
        } else {
            Ok(())
        }
    }

    /// Move every sample waiting in the tap into the window
    pub fn pull(&mut self) -> Result<usize> {
        self.ensure_open("pull")?;

        let mut pulled = 0;
        while let Some(sample) = self.tap.pop() {
            self.window.pop_front();
            self.window.push_back(sample);
            pulled += 1;
        }
        trace!(pulled, "Analyser pulled samples");
        Ok(pulled)
    }

    /// Newest samples as floats in `[-1, 1]`
    pub fn get_float_time_domain_data(&mut self, out: &mut [f32]) -> Result<()> {
        self.pull()?;
        for (dst, src) in out.iter_mut().zip(self.window.iter()) {
            *dst = *src;
        }
        Ok(())
    }

    /// Newest samples as unsigned bytes, 128 = zero
    pub fn get_byte_time_domain_data(&mut self, out: &mut [u8]) -> Result<()> {
        self.pull()?;
        for (dst, &src) in out.iter_mut().zip(self.window.iter()) {
            *dst = (128.0 * (1.0 + src)).floor().clamp(0.0, 255.0) as u8;
        }
        Ok(())
    }

    /// Smoothed spectrum in dB, one value per bin
    pub fn get_float_frequency_data(&mut self, out: &mut [f32]) -> Result<()> {
        self.analyse()?;
        for (dst, &mag) in out.iter_mut().zip(self.smoothed.iter()) {
            *dst = linear_to_db(mag);
        }
        Ok(())
    }

    /// Smoothed spectrum scaled into bytes over `[min_decibels, max_decibels]`
    pub fn get_byte_frequency_data(&mut self, out: &mut [u8]) -> Result<()> {
        self.analyse()?;
        let min = self.config.min_decibels;
        let range = self.config.max_decibels - min;
        for (dst, &mag) in out.iter_mut().zip(self.smoothed.iter()) {
            let db = linear_to_db(mag);
            let scaled = (255.0 / range) * (db - min);
            *dst = if scaled.is_finite() {
                scaled.floor().clamp(0.0, 255.0) as u8
            } else {
                0
            };
        }
        Ok(())
    }

    fn analyse(&mut self) -> Result<()> {
        self.pull()?;

        let n = self.config.fft_size;
        for ((bin, &sample), &w) in self
            .spectrum
            .iter_mut()
            .zip(self.window.iter())
            .zip(self.blackman.iter())
        {
            *bin = Complex::new(sample * w, 0.0);
        }

        self.fft
            .process_with_scratch(&mut self.spectrum, &mut self.scratch);

        let tau = self.config.smoothing_time_constant;
        let scale = 1.0 / n as f32;
        for (smoothed, bin) in self.smoothed.iter_mut().zip(self.spectrum.iter()) {
            let magnitude = bin.norm() * scale;
            let next = tau * *smoothed + (1.0 - tau) * magnitude;
            *smoothed = if next.is_finite() { next } else { 0.0 };
        }
        Ok(())
    }
}

impl std::fmt::Debug for Analyser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Analyser")
            .field("config", &self.config)
            .field("sample_rate", &self.sample_rate)
            .field("closed", &self.closed)
            .finish()
    }
}

fn blackman_window(n: usize) -> Vec<f32> {
    const ALPHA: f32 = 0.16;
    let a0 = 0.5 * (1.0 - ALPHA);
    let a1 = 0.5;
    let a2 = 0.5 * ALPHA;
    (0..n)
        .map(|i| {
            let x = i as f32 / n as f32;
            a0 - a1 * (2.0 * PI * x).cos() + a2 * (4.0 * PI * x).cos()
        })
        .collect()
}

#[inline]
fn linear_to_db(magnitude: f32) -> f32 {
    if magnitude > 0.0 {
        20.0 * magnitude.log10()
    } else {
        f32::NEG_INFINITY
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_silent_buffer_is_zero_hz() {
        assert_eq!(estimate_dominant_frequency(&[0u8; 1024], 48000, 2048), 0);
        assert_eq!(estimate_dominant_frequency::<u8>(&[], 48000, 2048), 0);
        assert_eq!(estimate_dominant_frequency(&[5u8; 4], 48000, 0), 0);
        assert_eq!(
            estimate_dominant_frequency(&[f32::NEG_INFINITY; 16], 44100, 32),
            0
        );
    }

    #[test]
    fn test_single_peak() {
        let mut buffer = [0u8; 1024];
        buffer[10] = 200;
        // 10 * 44100 / 2048 = 215.33
        assert_eq!(estimate_dominant_frequency(&buffer, 44100, 2048), 215);
    }

    #[test]
    fn test_first_maximum_wins() {
        let mut buffer = [0u8; 64];
        buffer[3] = 90;
        buffer[7] = 90;
        assert_eq!(peak_bin(&buffer), Some(3));
    }

    #[test]
    fn test_float_spectrum_peak() {
        let mut buffer = vec![-120.0f32; 512];
        buffer[100] = -20.0;
        buffer[101] = f32::NAN;
        assert_eq!(estimate_dominant_frequency(&buffer, 48000, 1024), 4688);
    }

    #[test]
    fn test_normalize_time_domain() {
        let normalized = normalize_time_domain(&[0, 128, 255]);
        assert_eq!(normalized[0], -1.0);
        assert_eq!(normalized[1], 0.0);
        assert!((normalized[2] - 0.992).abs() < 0.001);
    }

    #[test]
    fn test_config_validation() {
        assert!(AnalysisConfig::default().validate().is_ok());

        let bad_size = AnalysisConfig { fft_size: 1000, ..Default::default() };
        assert!(matches!(bad_size.validate(), Err(GraphError::InvalidConfig(_))));

        let too_big = AnalysisConfig { fft_size: 65536, ..Default::default() };
        assert!(too_big.validate().is_err());

        let bad_smoothing = AnalysisConfig {
            smoothing_time_constant: 1.5,
            ..Default::default()
        };
        assert!(bad_smoothing.validate().is_err());

        let bad_range = AnalysisConfig {
            min_decibels: -10.0,
            max_decibels: -30.0,
            ..Default::default()
        };
        assert!(bad_range.validate().is_err());
    }

    #[test]
    fn test_tap_drops_oldest() {
        let tap = SampleTap::new(4);
        tap.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(tap.len(), 4);
        assert_eq!(tap.pop(), Some(3.0));
    }

    #[test]
    fn test_analyser_detects_sine() {
        let rate = 48000;
        let config = AnalysisConfig { smoothing_time_constant: 0.0, ..Default::default() };
        let tap = SampleTap::new(config.fft_size * 2);
        let mut analyser = Analyser::new(&config, rate, tap.clone()).unwrap();

        // 1500 Hz lands exactly on bin 64 of a 2048 window; the amplitude
        // keeps the peak and its neighbours below max_decibels
        let samples: Vec<f32> = (0..config.fft_size)
            .map(|i| (2.0 * PI * 1500.0 * i as f32 / rate as f32).sin() * 0.08)
            .collect();
        tap.push_slice(&samples);

        let mut bytes = vec![0u8; analyser.frequency_bin_count()];
        analyser.get_byte_frequency_data(&mut bytes).unwrap();
        assert_eq!(estimate_dominant_frequency(&bytes, rate, config.fft_size), 1500);

        let mut db = vec![0.0f32; analyser.frequency_bin_count()];
        analyser.get_float_frequency_data(&mut db).unwrap();
        assert_eq!(peak_bin(&db), Some(64));
    }

    #[test]
    fn test_analyser_time_domain_bytes() {
        let config = AnalysisConfig { fft_size: 32, ..Default::default() };
        let tap = SampleTap::new(64);
        let mut analyser = Analyser::new(&config, 8000, tap.clone()).unwrap();

        tap.push_slice(&[-1.0, 0.0, 0.5]);
        let mut bytes = vec![0u8; 32];
        analyser.get_byte_time_domain_data(&mut bytes).unwrap();

        // Newest samples sit at the end of the window
        assert_eq!(&bytes[29..], &[0, 128, 192]);
        assert!(bytes[..29].iter().all(|&b| b == 128));
    }

    #[test]
    fn test_silence_maps_to_zero_bytes() {
        let config = AnalysisConfig { fft_size: 64, ..Default::default() };
        let mut analyser = Analyser::new(&config, 8000, SampleTap::new(64)).unwrap();

        let mut bytes = vec![7u8; 32];
        analyser.get_byte_frequency_data(&mut bytes).unwrap();
        assert!(bytes.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_closed_analyser_rejects_reads() {
        let config = AnalysisConfig::default();
        let mut analyser = Analyser::new(&config, 48000, SampleTap::new(16)).unwrap();
        analyser.close();
        analyser.close();

        let mut bytes = vec![0u8; 16];
        let err = analyser.get_byte_time_domain_data(&mut bytes).unwrap_err();
        assert!(matches!(err, GraphError::GraphState { operation: "pull", .. }));
    }

    proptest! {
        #[test]
        fn prop_single_max_maps_to_bin_frequency(
            len in 1usize..2048,
            bin_seed in any::<usize>(),
            peak in 1u8..=255,
            rate in 8000u32..192_000,
        ) {
            let bin = bin_seed % len;
            let mut buffer = vec![0u8; len];
            buffer[bin] = peak;
            let fft_size = len * 2;

            let expected = (bin as f64 * rate as f64 / fft_size as f64).round() as u32;
            prop_assert_eq!(estimate_dominant_frequency(&buffer, rate, fft_size), expected);
        }

        #[test]
        fn prop_normalized_range(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
            for v in normalize_time_domain(&bytes) {
                prop_assert!((-1.0..1.0).contains(&v));
            }
        }
    }
}
