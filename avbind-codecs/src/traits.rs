//! Codec engine contract.
//!
//! A [`CodecEngine`] is the opaque encoder/decoder a
//! [`StreamCoder`](crate::coder::StreamCoder) drives. Engines work purely in
//! the coder's time base: every timestamp crossing this boundary, in either
//! direction, is expressed in [`CodecConfig::time_base`] ticks, and the coder
//! owns all conversion to and from container and caller time bases.

use crate::options::OptionSet;
use avbind_core::{
    AudioSamples, Buffer, CodecId, Direction, MediaType, Picture, PixelFormat, Rational,
    Result, SampleFormat, TimeBase,
};
use bitflags::bitflags;

bitflags! {
    /// Coder behaviour flags handed to the engine at open.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CoderFlags: u32 {
        /// Use a fixed quality scale instead of a bit-rate target.
        const QSCALE = 0x0002;
        /// Emit global headers in extra data instead of in-band.
        const GLOBAL_HEADER = 0x0040_0000;
        /// Minimize buffering at the cost of efficiency.
        const LOW_DELAY = 0x0008_0000;
        /// Only produce closed GOPs.
        const CLOSED_GOP = 0x8000_0000;
        /// Only use bit-exact algorithms.
        const BITEXACT = 0x0080_0000;
    }
}

/// Information about a codec engine.
#[derive(Debug, Clone)]
pub struct CodecDescriptor {
    /// Codec implemented by the engine.
    pub id: CodecId,
    /// Engine name.
    pub name: &'static str,
    /// Long name/description.
    pub long_name: &'static str,
    /// Whether this engine supports encoding.
    pub can_encode: bool,
    /// Whether this engine supports decoding.
    pub can_decode: bool,
}

impl CodecDescriptor {
    pub fn media_type(&self) -> MediaType {
        self.id.media_type()
    }

    /// Check if the engine can run in the given direction.
    pub fn supports(&self, direction: Direction) -> bool {
        match direction {
            Direction::Inbound => self.can_decode,
            Direction::Outbound => self.can_encode,
        }
    }
}

/// Parameters handed to an engine at open.
#[derive(Debug, Clone)]
pub struct CodecConfig {
    pub id: CodecId,
    pub direction: Direction,
    /// Time base for every timestamp exchanged with the engine.
    pub time_base: TimeBase,
    pub bit_rate: u64,
    pub bit_rate_tolerance: u64,
    pub global_quality: i32,
    pub flags: CoderFlags,
    pub codec_tag: u32,
    pub extra_data: Option<Vec<u8>>,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub frame_rate: Option<Rational>,
    pub gop_size: u32,
    pub sample_rate: u32,
    pub channels: u32,
    pub sample_format: Option<SampleFormat>,
    pub options: OptionSet,
}

impl CodecConfig {
    /// Duration of one video frame in time-base ticks.
    ///
    /// Falls back to a single tick when no frame rate is known.
    pub fn frame_duration(&self) -> i64 {
        self.frame_rate
            .and_then(|rate| TimeBase::from_frame_rate(rate).ok())
            .map(|frame_tb| frame_tb.rescale(1, self.time_base))
            .filter(|ticks| *ticks > 0)
            .unwrap_or(1)
    }

    /// Duration of `samples` audio samples in time-base ticks.
    pub fn samples_duration(&self, samples: usize) -> i64 {
        match TimeBase::from_sample_rate(self.sample_rate) {
            Ok(sample_tb) => sample_tb.rescale(samples as i64, self.time_base),
            Err(_) => 0,
        }
    }
}

/// What an engine reports once opened.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineCaps {
    /// Fixed samples per audio frame, `None` if any size is accepted.
    pub frame_size: Option<usize>,
    /// Maximum number of units emitted out of presentation order.
    pub reorder_delay: usize,
    /// Codec extra data produced at open.
    pub extra_data: Option<Vec<u8>>,
}

/// Encoded bytes handed to a decoding engine.
#[derive(Debug, Clone, Copy)]
pub struct RawUnit<'a> {
    /// Remaining bytes of the packet. Empty means drain.
    pub data: &'a [u8],
    /// Packet pts in engine ticks; only set for the first unit of a packet.
    pub pts: i64,
    pub dts: i64,
    pub key: bool,
}

/// Decoded output of an engine, stamped in engine ticks.
#[derive(Debug, Clone)]
pub enum DecodedFrame {
    Picture(Picture),
    Samples(AudioSamples),
}

/// Result of one engine decode call.
#[derive(Debug, Clone)]
pub struct DecodeStep {
    /// Bytes of the unit consumed.
    pub consumed: usize,
    pub output: Option<DecodedFrame>,
}

/// Input to one engine encode call.
#[derive(Debug, Clone, Copy)]
pub enum EncodeInput<'a> {
    /// A picture stamped at `pts` engine ticks.
    Picture { picture: &'a Picture, pts: i64 },
    /// One codec frame of interleaved samples.
    Samples {
        data: &'a [u8],
        /// Samples that carry signal; the rest of `data` is padding.
        valid_samples: usize,
        pts: i64,
        /// Last frame of the stream.
        final_frame: bool,
    },
    /// Drain one buffered unit.
    Flush,
}

/// Encoded output of an engine, stamped in engine ticks.
///
/// Engines that do not know a timestamp report `NO_PTS` and let the coder
/// fill it in.
#[derive(Debug, Clone)]
pub struct EncodedUnit {
    pub data: Buffer,
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    pub key: bool,
}

/// Common trait for codec engines.
pub trait CodecEngine: Send {
    /// Get codec information.
    fn descriptor(&self) -> CodecDescriptor;

    /// Prepare for coding with the given parameters.
    fn open(&mut self, config: &CodecConfig) -> Result<EngineCaps>;

    /// Decode from the start of `unit`, consuming some or all of it.
    fn decode(&mut self, unit: &RawUnit<'_>) -> Result<DecodeStep>;

    /// Encode one input, returning at most one unit.
    fn encode(&mut self, input: EncodeInput<'_>) -> Result<Option<EncodedUnit>>;

    /// Release coding state. The engine may be opened again afterwards.
    fn close(&mut self);
}
