//! Platform audio support
//!
//! Playback goes through CPAL, which abstracts the platform APIs:
//! - Windows: WASAPI
//! - Linux: ALSA/PulseAudio
//! - macOS: CoreAudio

pub mod cpal_backend;
pub mod decoder;

pub use cpal_backend::{CpalContext, CpalHost};
pub use decoder::{decode_wav, decode_wav_file, DecodeError};
