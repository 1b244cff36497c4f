//! CPAL-based playback context
//!
//! Provides the platform audio output behind the core `AudioHost` /
//! `AudioContext` traits. The output callback renders the connected media
//! element, copies the mono signal into the analyser tap, and fans it out to
//! every output channel.

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{
    BufferSize, FromSample, Sample, SampleFormat, SizedSample, Stream,
    StreamConfig as CpalStreamConfig,
};
use sigscope_core::domain::analysis::SampleTap;
use sigscope_core::domain::graph::{
    AudioContext, AudioHost, ContextState, GraphError, MediaElement, Result, SourceNode,
};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Frames rendered per pass when the device does not fix its buffer size
const SCRATCH_FRAMES: usize = 4096;

/// Default CPAL host
pub struct CpalHost {
    host: cpal::Host,
}

impl Default for CpalHost {
    fn default() -> Self {
        Self::new()
    }
}

impl CpalHost {
    pub fn new() -> Self {
        info!("Initializing CPAL host");
        Self {
            host: cpal::default_host(),
        }
    }
}

impl AudioHost for CpalHost {
    type Context = CpalContext;

    fn create_context(&self) -> Result<CpalContext> {
        let device = self
            .host
            .default_output_device()
            .ok_or_else(|| GraphError::AudioInit("No output device available".to_string()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| GraphError::AudioInit(format!("No usable output configuration: {}", e)))?;

        let sample_format = supported.sample_format();
        let config: CpalStreamConfig = supported.config();

        #[allow(deprecated)]
        let name = device.name().unwrap_or_else(|_| "Unknown Device".to_string());
        info!(
            device = %name,
            sample_rate = config.sample_rate,
            channels = config.channels,
            sample_format = ?sample_format,
            "Output device selected"
        );

        Ok(CpalContext {
            device,
            config,
            sample_format,
            stream: None,
            state: ContextState::Suspended,
        })
    }
}

/// One output stream on the default device
pub struct CpalContext {
    device: cpal::Device,
    config: CpalStreamConfig,
    sample_format: SampleFormat,
    stream: Option<(SourceNode, Stream)>,
    state: ContextState,
}

impl CpalContext {
    fn ensure_open(&self, operation: &'static str) -> Result<()> {
        if self.state == ContextState::Closed {
            Err(GraphError::state(operation, self.state))
        } else {
            Ok(())
        }
    }

    fn scratch_frames(&self) -> usize {
        match self.config.buffer_size {
            BufferSize::Fixed(frames) => (frames as usize).max(SCRATCH_FRAMES),
            BufferSize::Default => SCRATCH_FRAMES,
        }
    }

    fn build_stream<T>(&self, element: Arc<MediaElement>, tap: SampleTap) -> Result<Stream>
    where
        T: SizedSample + FromSample<f32>,
    {
        let channels = self.config.channels.max(1) as usize;
        let out_rate = self.config.sample_rate;
        let mut scratch = vec![0.0f32; self.scratch_frames()];

        self.device
            .build_output_stream(
                &self.config,
                move |data: &mut [T], _: &cpal::OutputCallbackInfo| {
                    write_output(data, channels, &mut scratch, &element, &tap, out_rate);
                },
                |err| error!(error = %err, "Output stream error"),
                None,
            )
            .map_err(|e| GraphError::Device(format!("Failed to build stream: {}", e)))
    }
}

/// Render `element` into interleaved `data`, one scratch-sized block at a time
///
/// Runs on the audio callback thread and never allocates.
fn write_output<T>(
    data: &mut [T],
    channels: usize,
    scratch: &mut [f32],
    element: &MediaElement,
    tap: &SampleTap,
    out_rate: u32,
) where
    T: Sample + FromSample<f32>,
{
    if scratch.is_empty() || channels == 0 {
        data.fill(T::EQUILIBRIUM);
        return;
    }

    for block in data.chunks_mut(scratch.len() * channels) {
        let frames = block.len() / channels;
        let mono = &mut scratch[..frames];

        element.render_at(mono, out_rate);
        tap.push_slice(mono);

        for (frame, &sample) in block.chunks_mut(channels).zip(mono.iter()) {
            frame.fill(T::from_sample(sample));
        }
    }
}

impl AudioContext for CpalContext {
    fn sample_rate(&self) -> u32 {
        self.config.sample_rate
    }

    fn state(&self) -> ContextState {
        self.state
    }

    fn resume(&mut self) -> Result<()> {
        self.ensure_open("resume")?;
        if let Some((_, stream)) = &self.stream {
            stream
                .play()
                .map_err(|e| GraphError::Device(format!("Failed to start stream: {}", e)))?;
        }
        self.state = ContextState::Running;
        Ok(())
    }

    fn suspend(&mut self) -> Result<()> {
        self.ensure_open("suspend")?;
        if let Some((_, stream)) = &self.stream {
            stream
                .pause()
                .map_err(|e| GraphError::Device(format!("Failed to pause stream: {}", e)))?;
        }
        self.state = ContextState::Suspended;
        Ok(())
    }

    fn connect_source(&mut self, element: Arc<MediaElement>, tap: SampleTap) -> Result<SourceNode> {
        self.ensure_open("connect")?;
        let node = SourceNode::new(element.id());

        let stream = match self.sample_format {
            SampleFormat::F32 => self.build_stream::<f32>(element, tap),
            SampleFormat::F64 => self.build_stream::<f64>(element, tap),
            SampleFormat::I16 => self.build_stream::<i16>(element, tap),
            SampleFormat::I32 => self.build_stream::<i32>(element, tap),
            SampleFormat::U16 => self.build_stream::<u16>(element, tap),
            other => Err(GraphError::Device(format!(
                "Unsupported output sample format: {:?}",
                other
            ))),
        }?;

        if self.state == ContextState::Running {
            stream
                .play()
                .map_err(|e| GraphError::Device(format!("Failed to start stream: {}", e)))?;
        }

        if let Some((previous, _)) = self.stream.replace((node, stream)) {
            warn!(node = previous.id(), "Connected source replaced without disconnect");
        }
        debug!(node = node.id(), element = node.element_id(), "Source connected");
        Ok(node)
    }

    fn disconnect_source(&mut self, node: SourceNode) -> Result<()> {
        match &self.stream {
            Some((current, _)) if *current == node => {
                self.stream = None;
                debug!(node = node.id(), "Source disconnected");
            }
            _ => debug!(node = node.id(), "Source already disconnected"),
        }
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        self.stream = None;
        self.state = ContextState::Closed;
        info!("Audio context closed");
        Ok(())
    }
}

impl fmt::Debug for CpalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CpalContext")
            .field("sample_rate", &self.config.sample_rate)
            .field("channels", &self.config.channels)
            .field("sample_format", &self.sample_format)
            .field("state", &self.state)
            .field("connected", &self.stream.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn playing(samples: Vec<f32>, rate: u32) -> MediaElement {
        let element = MediaElement::new(samples, rate);
        element.play();
        element
    }

    #[test]
    fn test_write_output_converts_to_i16() {
        let element = playing(vec![0.5; 4], 4);
        let tap = SampleTap::new(16);
        let mut scratch = vec![0.0f32; 8];
        let mut data = vec![0i16; 8];

        write_output(&mut data, 2, &mut scratch, &element, &tap, 4);

        let expected = i16::from_sample(0.5f32);
        assert_ne!(expected, 0);
        assert!(data.iter().all(|&s| s == expected));
        assert_eq!(tap.len(), 4);
    }

    #[test]
    fn test_write_output_converts_to_u16() {
        let element = playing(vec![0.0; 4], 4);
        let tap = SampleTap::new(16);
        let mut scratch = vec![0.0f32; 8];
        let mut data = vec![0u16; 4];

        write_output(&mut data, 1, &mut scratch, &element, &tap, 4);

        assert!(data.iter().all(|&s| s == u16::EQUILIBRIUM));
    }

    #[test]
    fn test_write_output_larger_than_scratch() {
        let samples: Vec<f32> = (0..10).map(|i| i as f32 / 10.0).collect();
        let element = playing(samples.clone(), 10);
        let tap = SampleTap::new(64);
        let mut scratch = vec![0.0f32; 3];
        let mut data = vec![0.0f32; 20];

        write_output(&mut data, 2, &mut scratch, &element, &tap, 10);

        for (frame, expected) in data.chunks(2).zip(samples.iter()) {
            assert_eq!(frame, &[*expected, *expected]);
        }
        assert_eq!(tap.len(), 10);
        assert_eq!(scratch.len(), 3);
    }

    #[test]
    fn test_write_output_paused_is_silent() {
        let element = MediaElement::new(vec![0.8; 16], 8);
        let tap = SampleTap::new(16);
        let mut scratch = vec![0.0f32; 8];
        let mut data = vec![7i32; 6];

        write_output(&mut data, 3, &mut scratch, &element, &tap, 8);

        assert!(data.iter().all(|&s| s == 0));
    }
}
