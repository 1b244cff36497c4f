//! Visualization frames returned by the processing backend

use crate::domain::effects::WireEffect;
use serde::{Deserialize, Serialize};

/// Lowest frequency shown on spectrum charts (exclusive)
pub const AUDIBLE_MIN_HZ: f64 = 20.0;
/// Highest frequency shown on spectrum charts (inclusive)
pub const AUDIBLE_MAX_HZ: f64 = 20_000.0;

/// Input/output signals for one applied effect
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisualizationFrame {
    pub effect_info: EffectInfo,
    pub time_domain: TimeDomain,
    pub frequency_domain: FrequencyDomain,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EffectInfo {
    pub name: String,
    /// Band the effect acts on, `[low_hz, high_hz]`
    #[serde(alias = "range")]
    pub frequency_range: (f64, f64),
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TimeDomain {
    /// Sample times in seconds
    pub time: Vec<f64>,
    pub input: Vec<f64>,
    pub output: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrequencyDomain {
    pub frequencies: Vec<f64>,
    pub power_input: Vec<f64>,
    pub power_output: Vec<f64>,
}

impl TimeDomain {
    /// Points usable for plotting (all three series share the same length)
    pub fn len(&self) -> usize {
        self.time.len().min(self.input.len()).min(self.output.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_consistent(&self) -> bool {
        self.time.len() == self.input.len() && self.time.len() == self.output.len()
    }
}

impl FrequencyDomain {
    pub fn is_consistent(&self) -> bool {
        self.frequencies.len() == self.power_input.len()
            && self.frequencies.len() == self.power_output.len()
    }

    /// Bins inside the audible band as `(hz, input_db, output_db)`
    pub fn audible_bins(&self) -> Vec<(f64, f64, f64)> {
        self.frequencies
            .iter()
            .zip(self.power_input.iter())
            .zip(self.power_output.iter())
            .filter(|((&hz, _), _)| is_audible(hz))
            .map(|((&hz, &input), &output)| (hz, input, output))
            .collect()
    }
}

/// `(20 Hz, 20 kHz]`
#[inline]
pub fn is_audible(hz: f64) -> bool {
    hz > AUDIBLE_MIN_HZ && hz <= AUDIBLE_MAX_HZ
}

/// Keep only the frequencies inside the audible band
pub fn audible_band(frequencies: &[f64]) -> Vec<f64> {
    frequencies.iter().copied().filter(|&hz| is_audible(hz)).collect()
}

/// One backend frame paired with the effect that produced it
#[derive(Debug, Clone, PartialEq)]
pub struct EffectResult {
    pub label: String,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub frame: VisualizationFrame,
}

impl EffectResult {
    /// Pair a frame with the submitted effect at the same position
    ///
    /// Frames beyond the submitted chain fall back to the backend's effect name.
    pub fn pair(frames: &[VisualizationFrame], submitted: &[WireEffect]) -> Vec<EffectResult> {
        frames
            .iter()
            .enumerate()
            .map(|(i, frame)| match submitted.get(i) {
                Some(effect) => EffectResult {
                    label: effect.effect_type.label().to_string(),
                    start: effect.start,
                    end: effect.end,
                    frame: frame.clone(),
                },
                None => EffectResult {
                    label: frame.effect_info.name.clone(),
                    start: None,
                    end: None,
                    frame: frame.clone(),
                },
            })
            .collect()
    }

    /// Heading such as `Reverb (0s - 5s)`
    pub fn title(&self) -> String {
        fn secs(t: Option<f64>) -> String {
            match t {
                Some(t) => format!("{}s", t),
                None => "?s".to_string(),
            }
        }
        format!("{} ({} - {})", self.label, secs(self.start), secs(self.end))
    }
}
