//! Sigscope terminal application
//!
//! Command-line parsing helpers and the interactive terminal loops used by
//! the `sigscope` binary.

pub mod effect_arg;
pub mod tui;

pub use effect_arg::{apply_effect_arg, EffectArgError};
pub use tui::{ComparisonApp, LiveApp};
