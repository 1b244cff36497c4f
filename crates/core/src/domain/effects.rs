//! Effect chain model
//!
//! Holds the ordered list of effects the user wants the backend to apply,
//! validates every edit at the model boundary, and serializes the chain into
//! the wire format expected by the processing backend.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;
use tracing::{debug, trace};

/// Errors raised when an edit would leave an effect in an invalid state
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Unknown effect: {0}")]
    UnknownEffect(EffectId),

    #[error("Unknown field '{field}' for {effect_type}")]
    UnknownField {
        field: String,
        effect_type: EffectType,
    },

    #[error("Invalid time range: start {start}s must be before end {end}s")]
    InvalidTimeRange { start: f64, end: f64 },

    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("Position {position} out of range (chain has {len} effects)")]
    PositionOutOfRange { position: usize, len: usize },

    #[error("Source link cannot be empty")]
    EmptyLink,

    #[error("Invalid time '{0}' (expected seconds or m:s)")]
    InvalidTime(String),

    #[error("Unknown effect type: {0}")]
    UnknownEffectType(String),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

/// Opaque unique identifier for an effect row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EffectId(u64);

impl EffectId {
    pub fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for EffectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Effect kinds understood by the processing backend
///
/// Serialized as the integer id the backend expects (1-6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum EffectType {
    LowShelf,
    PeakFilter,
    HighShelfCompressor,
    Compressor,
    Reverb,
    Chorus,
}

impl EffectType {
    pub const ALL: [EffectType; 6] = [
        EffectType::LowShelf,
        EffectType::PeakFilter,
        EffectType::HighShelfCompressor,
        EffectType::Compressor,
        EffectType::Reverb,
        EffectType::Chorus,
    ];

    /// Backend wire id
    pub fn id(&self) -> u8 {
        match self {
            EffectType::LowShelf => 1,
            EffectType::PeakFilter => 2,
            EffectType::HighShelfCompressor => 3,
            EffectType::Compressor => 4,
            EffectType::Reverb => 5,
            EffectType::Chorus => 6,
        }
    }

    pub fn from_id(id: u8) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }

    /// Short label shown next to an effect row
    pub fn label(&self) -> &'static str {
        match self {
            EffectType::LowShelf => "Bass Boost",
            EffectType::PeakFilter => "Mids Boost",
            EffectType::HighShelfCompressor => "High Boost",
            EffectType::Compressor => "Compressor",
            EffectType::Reverb => "Reverb",
            EffectType::Chorus => "Chorus",
        }
    }

    /// Descriptive name used in progress messages
    pub fn long_name(&self) -> &'static str {
        match self {
            EffectType::LowShelf => "Low Shelf Filter",
            EffectType::PeakFilter => "Midrange Peak Filter",
            EffectType::HighShelfCompressor => "High Shelf + Compressor",
            EffectType::Compressor => "Compressor",
            EffectType::Reverb => "Reverb",
            EffectType::Chorus => "Chorus",
        }
    }

    /// Parameter schema for this effect type
    pub fn schema(&self) -> &'static [ParamSpec] {
        match self {
            EffectType::LowShelf => &[GAIN, CUTOFF],
            EffectType::PeakFilter => &[GAIN, CENTER, BANDWIDTH],
            EffectType::HighShelfCompressor => &[GAIN, CUTOFF, THRESHOLD, RATIO],
            EffectType::Compressor => &[THRESHOLD, RATIO, ATTACK, RELEASE],
            EffectType::Reverb => &[DELAY, DECAY, MIX],
            EffectType::Chorus => &[DELAY, DEPTH, RATE, MIX],
        }
    }

    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.schema().iter().find(|p| p.name == name)
    }

    /// Fresh parameter map holding the schema defaults
    pub fn default_parameters(&self) -> BTreeMap<String, f64> {
        self.schema()
            .iter()
            .map(|p| (p.name.to_string(), p.default))
            .collect()
    }
}

impl fmt::Display for EffectType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

impl From<EffectType> for u8 {
    fn from(effect_type: EffectType) -> Self {
        effect_type.id()
    }
}

impl TryFrom<u8> for EffectType {
    type Error = ValidationError;

    fn try_from(id: u8) -> Result<Self> {
        Self::from_id(id).ok_or_else(|| ValidationError::UnknownEffectType(id.to_string()))
    }
}

impl FromStr for EffectType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase();
        if let Ok(id) = normalized.parse::<u8>() {
            return Self::try_from(id);
        }
        match normalized.as_str() {
            "bass" | "low-shelf" | "lowshelf" => Ok(EffectType::LowShelf),
            "mids" | "mid" | "peak" | "peak-filter" => Ok(EffectType::PeakFilter),
            "high" | "high-shelf" | "highshelf" => Ok(EffectType::HighShelfCompressor),
            "compressor" | "comp" => Ok(EffectType::Compressor),
            "reverb" => Ok(EffectType::Reverb),
            "chorus" => Ok(EffectType::Chorus),
            _ => Err(ValidationError::UnknownEffectType(s.to_string())),
        }
    }
}

/// One named numeric parameter of an effect
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub default: f64,
}

/// Default values for effect parameters
pub mod defaults {
    pub const MIX: f64 = 0.3;
    pub const THRESHOLD_DB: f64 = -20.0;
    pub const NUMERIC: f64 = 10.0;
}

const GAIN: ParamSpec = ParamSpec { name: "gain", label: "Gain (dB)", default: defaults::NUMERIC };
const CUTOFF: ParamSpec = ParamSpec { name: "cutoff", label: "Cutoff (Hz)", default: defaults::NUMERIC };
const CENTER: ParamSpec = ParamSpec { name: "center", label: "Center (Hz)", default: defaults::NUMERIC };
const BANDWIDTH: ParamSpec = ParamSpec { name: "bandwidth", label: "Bandwidth (Hz)", default: defaults::NUMERIC };
const THRESHOLD: ParamSpec = ParamSpec { name: "threshold", label: "Threshold (dB)", default: defaults::THRESHOLD_DB };
const RATIO: ParamSpec = ParamSpec { name: "ratio", label: "Ratio", default: defaults::NUMERIC };
const ATTACK: ParamSpec = ParamSpec { name: "attack", label: "Attack (ms)", default: defaults::NUMERIC };
const RELEASE: ParamSpec = ParamSpec { name: "release", label: "Release (ms)", default: defaults::NUMERIC };
const DELAY: ParamSpec = ParamSpec { name: "delay", label: "Delay (ms)", default: defaults::NUMERIC };
const DECAY: ParamSpec = ParamSpec { name: "decay", label: "Decay", default: defaults::NUMERIC };
const DEPTH: ParamSpec = ParamSpec { name: "depth", label: "Depth (ms)", default: defaults::NUMERIC };
const RATE: ParamSpec = ParamSpec { name: "rate", label: "Rate (Hz)", default: defaults::NUMERIC };
const MIX: ParamSpec = ParamSpec { name: "mix", label: "Mix", default: defaults::MIX };

/// A single effect row in the chain
#[derive(Debug, Clone, PartialEq)]
pub struct EffectSpec {
    pub id: EffectId,
    pub effect_type: EffectType,
    /// Start time in seconds (None = let the backend decide)
    pub start: Option<f64>,
    /// End time in seconds (None = let the backend decide)
    pub end: Option<f64>,
    pub parameters: BTreeMap<String, f64>,
}

impl EffectSpec {
    pub fn new(id: EffectId, effect_type: EffectType) -> Self {
        Self {
            id,
            effect_type,
            start: None,
            end: None,
            parameters: effect_type.default_parameters(),
        }
    }

    /// Check every invariant of a spec
    pub fn validate(&self) -> Result<()> {
        for (field, time) in [("start", self.start), ("end", self.end)] {
            if let Some(t) = time {
                if !t.is_finite() || t < 0.0 {
                    return Err(ValidationError::InvalidValue {
                        field: field.to_string(),
                        reason: format!("{} is not a valid time in seconds", t),
                    });
                }
            }
        }

        if let (Some(start), Some(end)) = (self.start, self.end) {
            if start >= end {
                return Err(ValidationError::InvalidTimeRange { start, end });
            }
        }

        let schema = self.effect_type.schema();
        if self.parameters.len() != schema.len() {
            return Err(ValidationError::InvalidValue {
                field: "parameters".to_string(),
                reason: format!("expected the {} parameter set", self.effect_type),
            });
        }
        for (name, value) in &self.parameters {
            if self.effect_type.param(name).is_none() {
                return Err(ValidationError::UnknownField {
                    field: name.clone(),
                    effect_type: self.effect_type,
                });
            }
            if !value.is_finite() {
                return Err(ValidationError::InvalidValue {
                    field: name.clone(),
                    reason: "must be a finite number".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Time range as shown next to an effect row, e.g. `0s - 5s`
    pub fn time_range_label(&self) -> String {
        fn fmt_time(t: Option<f64>) -> String {
            t.map(|t| format!("{}s", t)).unwrap_or_else(|| "-".to_string())
        }
        format!("{} - {}", fmt_time(self.start), fmt_time(self.end))
    }
}

/// Editable field of an effect row
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectField {
    EffectType,
    Start,
    End,
    Parameter(String),
}

impl EffectField {
    /// Resolve a field name against the schema of `effect_type`
    pub fn parse(name: &str, effect_type: EffectType) -> Result<Self> {
        match name {
            "effectType" | "effect_type" | "type" => Ok(EffectField::EffectType),
            "start" => Ok(EffectField::Start),
            "end" => Ok(EffectField::End),
            other if effect_type.param(other).is_some() => {
                Ok(EffectField::Parameter(other.to_string()))
            }
            other => Err(ValidationError::UnknownField {
                field: other.to_string(),
                effect_type,
            }),
        }
    }
}

/// New value for an effect field
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FieldValue {
    EffectType(EffectType),
    Time(Option<f64>),
    Number(f64),
}

/// Serialized effect as sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireEffect {
    pub id: EffectId,
    pub effect_type: EffectType,
    pub start: Option<f64>,
    pub end: Option<f64>,
    pub parameters: BTreeMap<String, f64>,
}

impl From<&EffectSpec> for WireEffect {
    fn from(spec: &EffectSpec) -> Self {
        Self {
            id: spec.id,
            effect_type: spec.effect_type,
            start: spec.start,
            end: spec.end,
            parameters: spec.parameters.clone(),
        }
    }
}

/// Ordered chain of effects
///
/// Order is significant: the backend applies effects in sequence.
#[derive(Debug, Clone, Default)]
pub struct EffectChain {
    effects: Vec<EffectSpec>,
    next_id: u64,
}

impl EffectChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new effect with its default parameters
    pub fn add(&mut self, effect_type: EffectType) -> EffectId {
        self.next_id += 1;
        let id = EffectId::new(self.next_id);
        self.effects.push(EffectSpec::new(id, effect_type));
        debug!(%id, %effect_type, position = self.effects.len() - 1, "Effect added");
        id
    }

    /// Replace one field of an effect
    ///
    /// The edit is applied to a copy and only swapped in once the copy validates.
    pub fn update(&mut self, id: EffectId, field: &str, value: FieldValue) -> Result<()> {
        let index = self.position(id).ok_or(ValidationError::UnknownEffect(id))?;
        let current = &self.effects[index];
        let field = EffectField::parse(field, current.effect_type)?;

        let mut updated = current.clone();
        match (&field, value) {
            (EffectField::EffectType, FieldValue::EffectType(effect_type)) => {
                if effect_type != updated.effect_type {
                    updated.effect_type = effect_type;
                    updated.parameters = effect_type.default_parameters();
                }
            }
            (EffectField::Start, FieldValue::Time(t)) => updated.start = t,
            (EffectField::End, FieldValue::Time(t)) => updated.end = t,
            (EffectField::Parameter(name), FieldValue::Number(n)) => {
                updated.parameters.insert(name.clone(), n);
            }
            (field, value) => {
                return Err(ValidationError::InvalidValue {
                    field: format!("{:?}", field),
                    reason: format!("{:?} has the wrong kind for this field", value),
                });
            }
        }

        updated.validate()?;
        trace!(%id, ?field, "Effect updated");
        self.effects[index] = updated;
        Ok(())
    }

    /// Remove an effect; unknown ids are ignored
    pub fn remove(&mut self, id: EffectId) {
        if let Some(index) = self.position(id) {
            self.effects.remove(index);
            debug!(%id, "Effect removed");
        }
    }

    /// Move an effect to `new_position`, keeping the others in relative order
    pub fn reorder(&mut self, id: EffectId, new_position: usize) -> Result<()> {
        let from = self.position(id).ok_or(ValidationError::UnknownEffect(id))?;
        if new_position >= self.effects.len() {
            return Err(ValidationError::PositionOutOfRange {
                position: new_position,
                len: self.effects.len(),
            });
        }

        let spec = self.effects.remove(from);
        self.effects.insert(new_position, spec);
        debug!(%id, from, to = new_position, "Effect reordered");
        Ok(())
    }

    /// Ordered wire representation (does not mutate the chain)
    pub fn to_wire_format(&self) -> Vec<WireEffect> {
        self.effects.iter().map(WireEffect::from).collect()
    }

    pub fn validate(&self) -> Result<()> {
        self.effects.iter().try_for_each(EffectSpec::validate)
    }

    pub fn get(&self, id: EffectId) -> Option<&EffectSpec> {
        self.effects.iter().find(|e| e.id == id)
    }

    pub fn position(&self, id: EffectId) -> Option<usize> {
        self.effects.iter().position(|e| e.id == id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &EffectSpec> {
        self.effects.iter()
    }

    pub fn effects(&self) -> &[EffectSpec] {
        &self.effects
    }

    pub fn ids(&self) -> Vec<EffectId> {
        self.effects.iter().map(|e| e.id).collect()
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    /// Drop every effect (full form reset)
    pub fn clear(&mut self) {
        self.effects.clear();
    }
}

/// Parse a time typed as seconds (`"75.5"`) or minutes and seconds (`"1:15.5"`)
pub fn parse_time_input(value: &str) -> Result<f64> {
    let trimmed = value.trim();
    let invalid = || ValidationError::InvalidTime(value.to_string());

    let seconds = match trimmed.split_once(':') {
        Some((minutes, seconds)) => {
            let minutes: f64 = minutes.trim().parse().map_err(|_| invalid())?;
            let seconds: f64 = seconds.trim().parse().map_err(|_| invalid())?;
            minutes * 60.0 + seconds
        }
        None => trimmed.parse().map_err(|_| invalid())?,
    };

    if seconds.is_finite() && seconds >= 0.0 {
        Ok(seconds)
    } else {
        Err(invalid())
    }
}
