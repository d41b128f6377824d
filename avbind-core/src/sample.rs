//! Decoded audio sample blocks.
//!
//! Samples are always interleaved: one "sample" below means one value per
//! channel, so a block of `n` samples occupies `n * channels * bytes_per_sample`
//! bytes.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::timestamp::{TimeBase, NO_PTS};
use std::fmt;

/// Interleaved audio sample formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SampleFormat {
    /// Unsigned 8-bit.
    U8,
    /// Signed 16-bit.
    S16,
    /// Signed 32-bit.
    S32,
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
}

impl SampleFormat {
    /// Get the size of a single sample in bytes.
    pub fn bytes_per_sample(&self) -> usize {
        match self {
            Self::U8 => 1,
            Self::S16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 => 8,
        }
    }

    /// Check if this is a floating-point format.
    pub fn is_float(&self) -> bool {
        matches!(self, Self::F32 | Self::F64)
    }

    /// Byte value representing silence.
    pub fn silence_byte(&self) -> u8 {
        match self {
            Self::U8 => 0x80,
            _ => 0,
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::U8 => write!(f, "u8"),
            Self::S16 => write!(f, "s16"),
            Self::S32 => write!(f, "s32"),
            Self::F32 => write!(f, "f32"),
            Self::F64 => write!(f, "f64"),
        }
    }
}

/// A block of decoded audio.
#[derive(Clone)]
pub struct AudioSamples {
    format: SampleFormat,
    channels: u32,
    sample_rate: u32,
    buffer: Buffer,
    num_samples: usize,
    max_samples: usize,
    pts: i64,
    time_base: TimeBase,
    complete: bool,
}

impl AudioSamples {
    /// Allocate room for `max_samples` samples.
    pub fn new(
        max_samples: usize,
        channels: u32,
        sample_rate: u32,
        format: SampleFormat,
    ) -> Result<Self> {
        check_layout(channels, sample_rate)?;
        let bytes = max_samples
            .checked_mul(channels as usize * format.bytes_per_sample())
            .ok_or_else(|| Error::invalid_arg("audio block size overflows"))?;
        let buffer = Buffer::allocate(bytes)?;
        Ok(Self::with_buffer(buffer, max_samples, channels, sample_rate, format))
    }

    /// Build a block over an existing buffer without copying.
    ///
    /// Capacity is however many whole samples fit in the buffer.
    pub fn from_buffer(
        buffer: Buffer,
        channels: u32,
        sample_rate: u32,
        format: SampleFormat,
    ) -> Result<Self> {
        check_layout(channels, sample_rate)?;
        let max_samples = buffer.len() / (channels as usize * format.bytes_per_sample());
        Ok(Self::with_buffer(buffer, max_samples, channels, sample_rate, format))
    }

    fn with_buffer(
        buffer: Buffer,
        max_samples: usize,
        channels: u32,
        sample_rate: u32,
        format: SampleFormat,
    ) -> Self {
        Self {
            format,
            channels,
            sample_rate,
            buffer,
            num_samples: 0,
            max_samples,
            pts: NO_PTS,
            time_base: TimeBase::MICROSECONDS,
            complete: false,
        }
    }

    pub fn format(&self) -> SampleFormat {
        self.format
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Bytes occupied by one sample across all channels.
    pub fn bytes_per_frame(&self) -> usize {
        self.channels as usize * self.format.bytes_per_sample()
    }

    /// Number of valid samples.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Capacity in samples.
    pub fn max_samples(&self) -> usize {
        self.max_samples
    }

    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// The valid sample bytes.
    pub fn data(&self) -> &[u8] {
        &self.buffer.data()[..self.num_samples * self.bytes_per_frame()]
    }

    /// Mutable access to the whole capacity; fails while the buffer is shared.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let bytes = self.max_samples * self.bytes_per_frame();
        Ok(&mut self.buffer.data_mut()?[..bytes])
    }

    /// Presentation timestamp of the first sample, `NO_PTS` if unknown.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    pub fn set_time_base(&mut self, time_base: TimeBase) {
        self.time_base = time_base;
    }

    /// Duration of the valid samples in `target` units.
    pub fn duration_in(&self, target: TimeBase) -> i64 {
        match TimeBase::from_sample_rate(self.sample_rate) {
            Ok(tb) => tb.rescale(self.num_samples as i64, target),
            Err(_) => 0,
        }
    }

    /// Timestamp just past the last valid sample, in this block's time base.
    pub fn next_pts(&self) -> i64 {
        if self.pts == NO_PTS {
            return NO_PTS;
        }
        self.pts.saturating_add(self.duration_in(self.time_base))
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Mark `num_samples` samples valid and stamp the block.
    pub fn set_complete(&mut self, complete: bool, num_samples: usize, pts: i64) -> Result<()> {
        if !complete {
            self.complete = false;
            return Ok(());
        }
        if num_samples > self.max_samples {
            return Err(Error::invalid_arg(format!(
                "{num_samples} samples exceed capacity {}",
                self.max_samples
            )));
        }
        self.num_samples = num_samples;
        self.pts = pts;
        self.complete = true;
        Ok(())
    }

    /// Fill the valid samples with silence.
    pub fn silence(&mut self) -> Result<()> {
        let bytes = self.num_samples * self.bytes_per_frame();
        let fill = self.format.silence_byte();
        self.buffer.data_mut()?[..bytes].fill(fill);
        Ok(())
    }
}

impl fmt::Debug for AudioSamples {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioSamples")
            .field("format", &self.format)
            .field("channels", &self.channels)
            .field("sample_rate", &self.sample_rate)
            .field("num_samples", &self.num_samples)
            .field("max_samples", &self.max_samples)
            .field("pts", &self.pts)
            .field("complete", &self.complete)
            .finish()
    }
}

fn check_layout(channels: u32, sample_rate: u32) -> Result<()> {
    if channels == 0 || sample_rate == 0 {
        return Err(Error::invalid_arg(format!(
            "audio needs channels and sample rate, got {channels} ch @ {sample_rate} Hz"
        )));
    }
    Ok(())
}
