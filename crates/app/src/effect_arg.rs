//! `--effect` argument parsing
//!
//! Syntax: `<type>[@<start>-<end>][,<param>=<value>...]`, for example
//! `reverb@0:05-0:12,mix=0.5` or `bass,gain=6`. Times accept seconds or
//! `m:s`; either side of the range may be left empty.

use sigscope_core::domain::effects::{
    parse_time_input, EffectChain, EffectId, EffectType, FieldValue, ValidationError,
};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum EffectArgError {
    #[error("Malformed effect '{arg}': {reason}")]
    Syntax { arg: String, reason: String },

    #[error(transparent)]
    Invalid(#[from] ValidationError),
}

pub type Result<T> = std::result::Result<T, EffectArgError>;

/// Parse one effect argument and append it to `chain`
///
/// The chain is left untouched when the argument is rejected.
pub fn apply_effect_arg(chain: &mut EffectChain, arg: &str) -> Result<EffectId> {
    let syntax = |reason: &str| EffectArgError::Syntax {
        arg: arg.to_string(),
        reason: reason.to_string(),
    };

    let mut parts = arg.split(',');
    let head = parts.next().unwrap_or_default().trim();
    let (type_name, range) = match head.split_once('@') {
        Some((type_name, range)) => (type_name, Some(range)),
        None => (head, None),
    };
    if type_name.trim().is_empty() {
        return Err(syntax("missing effect type"));
    }
    let effect_type: EffectType = type_name.parse()?;

    let (start, end) = match range {
        Some(range) => {
            let (start, end) = range
                .split_once('-')
                .ok_or_else(|| syntax("time range must look like <start>-<end>"))?;
            (optional_time(start)?, optional_time(end)?)
        }
        None => (None, None),
    };

    let mut params = Vec::new();
    for part in parts {
        let (name, value) = part
            .split_once('=')
            .ok_or_else(|| syntax("parameters must look like <name>=<value>"))?;
        let value: f64 = value
            .trim()
            .parse()
            .map_err(|_| syntax(&format!("'{}' is not a number", value.trim())))?;
        params.push((name.trim(), value));
    }

    // Build on a scratch copy so a bad argument leaves no half-made effect
    let mut scratch = chain.clone();
    let id = scratch.add(effect_type);
    if start.is_some() {
        scratch.update(id, "start", FieldValue::Time(start))?;
    }
    if end.is_some() {
        scratch.update(id, "end", FieldValue::Time(end))?;
    }
    for (name, value) in params {
        scratch.update(id, name, FieldValue::Number(value))?;
    }

    *chain = scratch;
    Ok(id)
}

fn optional_time(value: &str) -> Result<Option<f64>> {
    if value.trim().is_empty() {
        Ok(None)
    } else {
        Ok(Some(parse_time_input(value)?))
    }
}
