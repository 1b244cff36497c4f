//! Sigscope platform adapters: audio output, WAV decoding, and the HTTP
//! client for the processing backend.

pub mod audio;
pub mod backend;
