//! Container engine traits for demuxing and muxing.
//!
//! Engines speak in each stream's native time base. The
//! [`Container`](crate::container::Container) owns every conversion to and
//! from caller time bases.

use crate::index::IndexEntry;
use crate::metadata::Metadata;
use avbind_core::{
    Buffer, CodecId, MediaType, Packet, PixelFormat, Rational, Result, SampleFormat, TimeBase,
    NO_PTS,
};
use bitflags::bitflags;

bitflags! {
    /// Seek behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SeekFlags: u32 {
        /// Land on the nearest entry at or before the target.
        const BACKWARDS = 1;
        /// Timestamps are byte positions.
        const BYTE = 2;
        /// Any entry qualifies, not only key frames.
        const ANY = 4;
        /// Timestamps are frame numbers.
        const FRAME = 8;
    }
}

bitflags! {
    /// Container behaviour flags.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ContainerFlags: u32 {
        /// Generate missing pts.
        const GEN_PTS = 0x0001;
        /// Do not build stream indexes while reading.
        const IGNORE_INDEX = 0x0002;
        /// Do not block when reading.
        const NON_BLOCK = 0x0004;
        /// Ignore dts reported by the demuxer.
        const IGNORE_DTS = 0x0008;
    }
}

/// How much parsing a decoder should do on a stream's packets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ParseType {
    None,
    #[default]
    Full,
    Headers,
    Timestamps,
}

/// Everything an engine knows about one stream.
#[derive(Debug, Clone)]
pub struct StreamDescriptor {
    /// Format-specific stream id.
    pub id: i32,
    pub media_type: MediaType,
    pub codec: Option<CodecId>,
    pub time_base: TimeBase,
    pub frame_rate: Option<Rational>,
    /// Start time in `time_base`, `NO_PTS` if unknown.
    pub start_time: i64,
    /// Duration in `time_base`, `NO_PTS` if unknown.
    pub duration: i64,
    /// Number of frames, 0 if unknown.
    pub num_frames: i64,
    pub language: Option<String>,
    pub sample_aspect_ratio: Option<Rational>,
    pub metadata: Metadata,
    pub width: u32,
    pub height: u32,
    pub pixel_format: Option<PixelFormat>,
    pub sample_rate: u32,
    pub channels: u32,
    pub sample_format: Option<SampleFormat>,
    pub bit_rate: u64,
    pub extra_data: Option<Vec<u8>>,
    /// Seek points known up front.
    pub index: Vec<IndexEntry>,
}

impl StreamDescriptor {
    /// Describe a stream of `media_type` counting in `time_base`.
    pub fn new(media_type: MediaType, time_base: TimeBase) -> Self {
        Self {
            id: 0,
            media_type,
            codec: None,
            time_base,
            frame_rate: None,
            start_time: NO_PTS,
            duration: NO_PTS,
            num_frames: 0,
            language: None,
            sample_aspect_ratio: None,
            metadata: Metadata::new(),
            width: 0,
            height: 0,
            pixel_format: None,
            sample_rate: 0,
            channels: 0,
            sample_format: None,
            bit_rate: 0,
            extra_data: None,
            index: Vec::new(),
        }
    }

    /// Describe a video stream.
    pub fn video(codec: CodecId, width: u32, height: u32, frame_rate: Rational) -> Result<Self> {
        let mut descriptor = Self::new(MediaType::Video, TimeBase::from_frame_rate(frame_rate)?);
        descriptor.codec = Some(codec);
        descriptor.width = width;
        descriptor.height = height;
        descriptor.frame_rate = Some(frame_rate);
        Ok(descriptor)
    }

    /// Describe an audio stream.
    pub fn audio(codec: CodecId, sample_rate: u32, channels: u32) -> Result<Self> {
        let mut descriptor = Self::new(MediaType::Audio, TimeBase::from_sample_rate(sample_rate)?);
        descriptor.codec = Some(codec);
        descriptor.sample_rate = sample_rate;
        descriptor.channels = channels;
        Ok(descriptor)
    }
}

impl Default for StreamDescriptor {
    fn default() -> Self {
        Self::new(MediaType::Unknown, TimeBase::default())
    }
}

/// One encoded unit read from a container.
#[derive(Debug, Clone)]
pub struct DemuxedUnit {
    pub stream_index: usize,
    pub data: Buffer,
    /// Timestamps in the stream's native time base.
    pub pts: i64,
    pub dts: i64,
    pub duration: i64,
    /// Byte position in the source, -1 if unknown.
    pub position: i64,
    pub key: bool,
}

/// Container-wide properties.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerProperties {
    /// Duration in microseconds, `NO_PTS` if unknown.
    pub duration: i64,
    /// Start time in microseconds, `NO_PTS` if unknown.
    pub start_time: i64,
    /// Size in bytes, -1 if unknown.
    pub file_size: i64,
    /// Bits per second, 0 if unknown.
    pub bit_rate: i64,
}

impl Default for ContainerProperties {
    fn default() -> Self {
        Self {
            duration: NO_PTS,
            start_time: NO_PTS,
            file_size: -1,
            bit_rate: 0,
        }
    }
}

/// Demuxer trait for reading container formats.
pub trait DemuxEngine: Send {
    /// Get container format name.
    fn format_name(&self) -> &str;

    /// Open the source and discover its streams.
    fn open(&mut self) -> Result<()>;

    /// Streams known so far. May grow while reading.
    fn streams(&self) -> Vec<StreamDescriptor>;

    /// Read the next unit; `Ok(None)` at end of stream.
    ///
    /// `Error::TransientIo` means the read may succeed if retried.
    fn read_unit(&mut self) -> Result<Option<DemuxedUnit>>;

    /// Reposition so the next unit read is a key frame near `target`.
    ///
    /// `stream_index` selects the time base of the timestamps, or -1 for
    /// microseconds.
    fn seek(
        &mut self,
        stream_index: i32,
        min: i64,
        target: i64,
        max: i64,
        flags: SeekFlags,
    ) -> Result<()>;

    fn properties(&self) -> ContainerProperties {
        ContainerProperties::default()
    }

    fn metadata(&self) -> Metadata {
        Metadata::new()
    }

    /// Close the demuxer.
    fn close(&mut self);
}

/// Muxer trait for writing container formats.
pub trait MuxEngine: Send {
    /// Get container format name.
    fn format_name(&self) -> &str;

    /// Declare a stream. Called once per stream, in index order.
    fn add_stream(&mut self, descriptor: &StreamDescriptor) -> Result<()>;

    /// Whether streams may be declared after the header.
    fn accepts_late_streams(&self) -> bool {
        false
    }

    /// Write the header.
    fn write_header(&mut self, metadata: &Metadata) -> Result<()>;

    /// Write one packet, stamped in its stream's time base.
    fn write_unit(&mut self, packet: &Packet) -> Result<()>;

    /// Write the trailer and finalize.
    fn write_trailer(&mut self) -> Result<()>;

    /// Push buffered output to the sink.
    fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    /// Close the muxer.
    fn close(&mut self);
}
