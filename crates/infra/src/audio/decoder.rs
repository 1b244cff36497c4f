//! WAV decoding into playable media elements

use hound::{SampleFormat, WavReader};
use sigscope_core::domain::graph::MediaElement;
use std::io::Read;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info};

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("Audio file contains no samples")]
    Empty,

    #[error("Unsupported WAV layout: {0}")]
    Unsupported(String),
}

pub type Result<T> = std::result::Result<T, DecodeError>;

/// Decode a WAV file into a mono media element
pub fn decode_wav_file<P: AsRef<Path>>(path: P) -> Result<MediaElement> {
    let path = path.as_ref();
    let reader = WavReader::open(path)?;
    let element = decode_wav(reader)?;
    info!(
        path = %path.display(),
        duration_secs = element.duration_secs(),
        sample_rate = element.sample_rate(),
        "Audio file decoded"
    );
    Ok(element)
}

/// Decode any WAV stream, downmixing to mono
pub fn decode_wav<R: Read>(mut reader: WavReader<R>) -> Result<MediaElement> {
    let spec = reader.spec();
    if spec.channels == 0 {
        return Err(DecodeError::Unsupported("zero channels".to_string()));
    }

    let interleaved: Vec<f32> = match spec.sample_format {
        SampleFormat::Float => reader.samples::<f32>().collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(DecodeError::Unsupported(format!(
                    "{} bits per sample",
                    spec.bits_per_sample
                )));
            }
            let max_val = (1u64 << (spec.bits_per_sample - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max_val))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    let channels = spec.channels as usize;
    let mono: Vec<f32> = interleaved
        .chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect();

    if mono.is_empty() {
        return Err(DecodeError::Empty);
    }

    debug!(
        channels,
        frames = mono.len(),
        bits = spec.bits_per_sample,
        "Downmixed to mono"
    );
    Ok(MediaElement::new(mono, spec.sample_rate))
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};
    use tempfile::TempDir;

    #[test]
    fn test_decode_stereo_int_downmix() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stereo.wav");
        let spec = WavSpec {
            channels: 2,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for _ in 0..100 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let element = decode_wav_file(&path).unwrap();
        assert_eq!(element.len(), 100);
        assert_eq!(element.sample_rate(), 22050);

        element.play();
        let mut out = [0.0f32; 4];
        element.render_at(&mut out, 22050);
        assert!(out.iter().all(|&s| (s - 0.25).abs() < 1e-6));
    }

    #[test]
    fn test_decode_float() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("mono.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 48000,
            bits_per_sample: 32,
            sample_format: SampleFormat::Float,
        };
        let mut writer = WavWriter::create(&path, spec).unwrap();
        for i in 0..480 {
            writer.write_sample(i as f32 / 480.0).unwrap();
        }
        writer.finalize().unwrap();

        let element = decode_wav_file(&path).unwrap();
        assert!((element.duration_secs() - 0.01).abs() < 1e-9);
    }

    #[test]
    fn test_decode_empty_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("empty.wav");
        let spec = WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: SampleFormat::Int,
        };
        WavWriter::create(&path, spec).unwrap().finalize().unwrap();

        assert!(matches!(decode_wav_file(&path), Err(DecodeError::Empty)));
    }

    #[test]
    fn test_decode_missing_file() {
        assert!(matches!(
            decode_wav_file("/nonexistent/clip.wav"),
            Err(DecodeError::Wav(_))
        ));
    }
}
