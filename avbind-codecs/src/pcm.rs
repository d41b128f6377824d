//! PCM pass-through engine.
//!
//! Encoding copies interleaved samples into packets unchanged; decoding
//! slices packets back into sample blocks. Useful wherever a real audio codec
//! is not needed, and for exercising the coder's audio framing.

use crate::traits::{
    CodecConfig, CodecDescriptor, CodecEngine, DecodeStep, DecodedFrame, EncodeInput,
    EncodedUnit, EngineCaps, RawUnit,
};
use avbind_core::{AudioSamples, Buffer, CodecError, CodecId, Error, Result, SampleFormat};

/// Samples per decoded block when no frame size is configured.
pub const DEFAULT_DECODE_SAMPLES: usize = 1024;

/// Interleaved PCM engine.
#[derive(Debug)]
pub struct PcmEngine {
    id: CodecId,
    config: Option<CodecConfig>,
    frame_size: Option<usize>,
}

impl PcmEngine {
    /// Create an engine for one of the PCM codec ids.
    pub fn new(id: CodecId) -> Self {
        Self {
            id,
            config: None,
            frame_size: None,
        }
    }

    fn sample_format(&self) -> SampleFormat {
        match self.id {
            CodecId::PcmF32le => SampleFormat::F32,
            _ => SampleFormat::S16,
        }
    }

    fn config(&self) -> Result<&CodecConfig> {
        self.config
            .as_ref()
            .ok_or_else(|| Error::invalid_state("pcm engine is not open"))
    }

    fn bytes_per_frame(config: &CodecConfig, format: SampleFormat) -> usize {
        config.channels as usize * format.bytes_per_sample()
    }
}

impl CodecEngine for PcmEngine {
    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor {
            id: self.id,
            name: self.id.name(),
            long_name: "PCM pass-through",
            can_encode: true,
            can_decode: true,
        }
    }

    fn open(&mut self, config: &CodecConfig) -> Result<EngineCaps> {
        let format = self.sample_format();
        if config.sample_format != Some(format) {
            return Err(Error::invalid_config(format!(
                "{} needs {format} samples, got {:?}",
                self.id, config.sample_format
            )));
        }
        if config.channels == 0 || config.sample_rate == 0 {
            return Err(Error::invalid_config("pcm needs channels and sample rate"));
        }
        let frame_size = config.options.get_int("frame_size")?;
        self.frame_size = usize::try_from(frame_size).ok().filter(|n| *n > 0);
        self.config = Some(config.clone());
        Ok(EngineCaps {
            frame_size: self.frame_size,
            reorder_delay: 0,
            extra_data: None,
        })
    }

    fn decode(&mut self, unit: &RawUnit<'_>) -> Result<DecodeStep> {
        let format = self.sample_format();
        let config = self.config()?;
        if unit.data.is_empty() {
            return Ok(DecodeStep {
                consumed: 0,
                output: None,
            });
        }
        let bpf = Self::bytes_per_frame(config, format);
        let block = self.frame_size.unwrap_or(DEFAULT_DECODE_SAMPLES) * bpf;
        let take = unit.data.len().min(block);
        let take = take - take % bpf;
        if take == 0 {
            // Less than one whole sample left: drop it.
            return Ok(DecodeStep {
                consumed: unit.data.len(),
                output: None,
            });
        }

        let buffer = Buffer::from_vec(unit.data[..take].to_vec());
        let mut samples =
            AudioSamples::from_buffer(buffer, config.channels, config.sample_rate, format)?;
        samples.set_time_base(config.time_base);
        samples.set_complete(true, take / bpf, unit.pts)?;
        Ok(DecodeStep {
            consumed: take,
            output: Some(DecodedFrame::Samples(samples)),
        })
    }

    fn encode(&mut self, input: EncodeInput<'_>) -> Result<Option<EncodedUnit>> {
        let format = self.sample_format();
        let config = self.config()?;
        match input {
            EncodeInput::Samples { data, pts, .. } => {
                let bpf = Self::bytes_per_frame(config, format);
                Ok(Some(EncodedUnit {
                    data: Buffer::from_vec(data.to_vec()),
                    pts,
                    dts: pts,
                    duration: config.samples_duration(data.len() / bpf),
                    key: true,
                }))
            }
            EncodeInput::Flush => Ok(None),
            EncodeInput::Picture { .. } => {
                Err(CodecError::WrongMediaType("pcm cannot encode pictures".into()).into())
            }
        }
    }

    fn close(&mut self) {
        self.config = None;
        self.frame_size = None;
    }
}
