//! Streams inside a container.

use crate::index::{IndexEntry, StreamIndex, DEFAULT_INDEX_CAP};
use crate::metadata::Metadata;
use crate::traits::{ParseType, SeekFlags, StreamDescriptor};
use avbind_codecs::StreamCoder;
use avbind_core::{
    CodecId, Direction, Error, MediaType, Packet, Rational, Result, TimeBase, NO_PTS,
};
use tracing::trace;

/// One stream of a container.
#[derive(Debug)]
pub struct Stream {
    index: i32,
    id: i32,
    direction: Direction,
    media_type: MediaType,
    codec: Option<CodecId>,
    time_base: Option<TimeBase>,
    frame_rate: Option<Rational>,
    start_time: i64,
    duration: i64,
    current_dts: i64,
    num_frames: i64,
    language: Option<String>,
    sample_aspect_ratio: Option<Rational>,
    metadata: Metadata,
    parse_type: ParseType,
    seek_index: StreamIndex,
    coder: Option<StreamCoder>,
    pub(crate) declared: bool,
}

impl Stream {
    /// Create an empty stream at `index`.
    pub fn new(index: i32, id: i32, direction: Direction) -> Self {
        Self::with_index_cap(index, id, direction, DEFAULT_INDEX_CAP)
    }

    pub(crate) fn with_index_cap(index: i32, id: i32, direction: Direction, cap: usize) -> Self {
        Self {
            index,
            id,
            direction,
            media_type: MediaType::Unknown,
            codec: None,
            time_base: None,
            frame_rate: None,
            start_time: NO_PTS,
            duration: NO_PTS,
            current_dts: NO_PTS,
            num_frames: 0,
            language: None,
            sample_aspect_ratio: None,
            metadata: Metadata::new(),
            parse_type: ParseType::default(),
            seek_index: StreamIndex::new(cap),
            coder: None,
            declared: false,
        }
    }

    /// Build an inbound stream from a demuxer's description.
    ///
    /// The stream gets a decoder pre-loaded with the described codec
    /// parameters; `coder` supplies its engine when one is available.
    pub(crate) fn from_descriptor(
        index: i32,
        descriptor: &StreamDescriptor,
        cap: usize,
        mut coder: StreamCoder,
    ) -> Result<Self> {
        let mut stream = Self::with_index_cap(index, descriptor.id, Direction::Inbound, cap);
        stream.media_type = descriptor.media_type;
        stream.codec = descriptor.codec;
        stream.time_base = Some(descriptor.time_base);
        stream.frame_rate = descriptor.frame_rate;
        stream.start_time = descriptor.start_time;
        stream.duration = descriptor.duration;
        stream.num_frames = descriptor.num_frames;
        stream.language = descriptor.language.clone();
        stream.sample_aspect_ratio = descriptor.sample_aspect_ratio;
        stream.metadata = descriptor.metadata.clone();
        for entry in &descriptor.index {
            stream.seek_index.add(*entry)?;
        }

        match descriptor.media_type {
            MediaType::Video => {
                if let Some(format) = descriptor.pixel_format {
                    coder.set_pixel_format(format)?;
                }
                coder.set_width(descriptor.width)?;
                coder.set_height(descriptor.height)?;
                if let Some(rate) = descriptor.frame_rate {
                    coder.set_frame_rate(rate)?;
                }
            }
            MediaType::Audio => {
                if let Some(format) = descriptor.sample_format {
                    coder.set_sample_format(format)?;
                }
                coder.set_sample_rate(descriptor.sample_rate)?;
                coder.set_channels(descriptor.channels)?;
            }
            _ => {}
        }
        coder.set_bit_rate(descriptor.bit_rate)?;
        coder.set_extra_data(descriptor.extra_data.clone())?;
        coder.set_time_base(descriptor.time_base)?;
        coder.bind_stream(index, descriptor.time_base);
        stream.coder = Some(coder);
        Ok(stream)
    }

    /// Describe this stream to a muxer.
    pub(crate) fn descriptor(&self) -> StreamDescriptor {
        let mut descriptor = StreamDescriptor::new(self.media_type(), self.time_base());
        descriptor.id = self.id;
        descriptor.codec = self.codec_id();
        descriptor.frame_rate = self.frame_rate();
        descriptor.start_time = self.start_time;
        descriptor.duration = self.duration;
        descriptor.num_frames = self.num_frames;
        descriptor.language = self.language.clone();
        descriptor.sample_aspect_ratio = self.sample_aspect_ratio;
        descriptor.metadata = self.metadata.clone();
        if let Some(coder) = &self.coder {
            descriptor.width = coder.width();
            descriptor.height = coder.height();
            descriptor.pixel_format = coder.pixel_format();
            descriptor.sample_rate = coder.sample_rate();
            descriptor.channels = coder.channels();
            descriptor.sample_format = coder.sample_format();
            descriptor.bit_rate = coder.bit_rate();
            descriptor.extra_data = coder.extra_data().map(<[u8]>::to_vec);
        }
        descriptor
    }

    pub fn index(&self) -> i32 {
        self.index
    }

    /// Format-specific stream id.
    pub fn id(&self) -> i32 {
        self.id
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Media type, taken from the coder when the stream has none of its own.
    pub fn media_type(&self) -> MediaType {
        match (self.media_type, &self.coder) {
            (MediaType::Unknown, Some(coder)) => coder.media_type(),
            (media_type, _) => media_type,
        }
    }

    pub fn codec_id(&self) -> Option<CodecId> {
        self.codec
            .or_else(|| self.coder.as_ref().and_then(StreamCoder::codec_id))
    }

    /// Time base of every timestamp on this stream.
    ///
    /// Until one is set explicitly, outbound streams follow their coder's
    /// time base, falling back to microseconds.
    pub fn time_base(&self) -> TimeBase {
        self.time_base
            .or_else(|| self.coder.as_ref().and_then(StreamCoder::time_base))
            .unwrap_or(TimeBase::MICROSECONDS)
    }

    pub fn set_time_base(&mut self, time_base: TimeBase) -> Result<()> {
        if self.declared {
            return Err(Error::invalid_state(
                "cannot change the time base of a stream already declared to the muxer",
            ));
        }
        self.time_base = Some(time_base);
        self.rebind_coder();
        Ok(())
    }

    /// Freeze the time base and rebind the coder to it.
    pub(crate) fn freeze_time_base(&mut self) {
        self.time_base = Some(self.time_base());
        self.rebind_coder();
    }

    fn rebind_coder(&mut self) {
        let time_base = self.time_base();
        let index = self.index;
        if let Some(coder) = self.coder.as_mut() {
            coder.bind_stream(index, time_base);
        }
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        self.frame_rate
            .or_else(|| self.coder.as_ref().and_then(StreamCoder::frame_rate))
    }

    pub fn set_frame_rate(&mut self, rate: Rational) {
        self.frame_rate = Some(rate);
    }

    /// First timestamp on the stream, `NO_PTS` if unknown.
    pub fn start_time(&self) -> i64 {
        self.start_time
    }

    /// Duration in the stream time base, `NO_PTS` if unknown.
    pub fn duration(&self) -> i64 {
        self.duration
    }

    /// Dts of the last packet read or written.
    pub fn current_dts(&self) -> i64 {
        self.current_dts
    }

    pub fn num_frames(&self) -> i64 {
        self.num_frames
    }

    pub fn language(&self) -> Option<&str> {
        self.language.as_deref()
    }

    pub fn set_language(&mut self, language: impl Into<String>) {
        self.language = Some(language.into());
    }

    pub fn sample_aspect_ratio(&self) -> Option<Rational> {
        self.sample_aspect_ratio
    }

    pub fn set_sample_aspect_ratio(&mut self, ratio: Rational) {
        self.sample_aspect_ratio = Some(ratio);
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }

    pub fn parse_type(&self) -> ParseType {
        self.parse_type
    }

    pub fn set_parse_type(&mut self, parse_type: ParseType) {
        self.parse_type = parse_type;
    }

    // Coder

    pub fn stream_coder(&self) -> Option<&StreamCoder> {
        self.coder.as_ref()
    }

    pub fn stream_coder_mut(&mut self) -> Option<&mut StreamCoder> {
        self.coder.as_mut()
    }

    /// Bind a coder, replacing the current one.
    ///
    /// Fails while the current coder is open, or if the coder runs in the
    /// other direction.
    pub fn set_stream_coder(&mut self, mut coder: StreamCoder) -> Result<()> {
        if self.coder.as_ref().is_some_and(StreamCoder::is_open) {
            return Err(Error::invalid_state(
                "cannot replace a stream coder while it is open",
            ));
        }
        if coder.direction() != self.direction {
            return Err(Error::invalid_arg(format!(
                "{:?} coder on {:?} stream {}",
                coder.direction(),
                self.direction,
                self.index
            )));
        }
        let time_base = self
            .time_base
            .or_else(|| coder.time_base())
            .unwrap_or(TimeBase::MICROSECONDS);
        coder.bind_stream(self.index, time_base);
        self.coder = Some(coder);
        Ok(())
    }

    /// Unbind and return the coder. Fails while it is open.
    pub fn take_stream_coder(&mut self) -> Result<Option<StreamCoder>> {
        if self.coder.as_ref().is_some_and(StreamCoder::is_open) {
            return Err(Error::invalid_state("cannot take an open stream coder"));
        }
        let mut coder = self.coder.take();
        if let Some(coder) = coder.as_mut() {
            coder.unbind_stream();
        }
        Ok(coder)
    }

    /// Assign this stream's index to `packet` and convert it to the stream
    /// time base.
    pub fn stamp_output_packet(&self, packet: &mut Packet) {
        packet.rescale_to(self.time_base());
        packet.set_stream_index(self.index);
    }

    /// Track a packet that passed through the stream.
    pub(crate) fn record_packet(&mut self, packet: &Packet) {
        if packet.dts() != NO_PTS {
            self.current_dts = packet.dts();
        }
        self.num_frames += 1;
        let pts = if packet.pts() != NO_PTS {
            packet.pts()
        } else {
            packet.dts()
        };
        if pts == NO_PTS {
            return;
        }
        if self.start_time == NO_PTS || pts < self.start_time {
            self.start_time = pts;
        }
        let end = pts.saturating_add(packet.duration().max(0));
        let span = end.saturating_sub(self.start_time);
        if self.direction == Direction::Outbound && (self.duration == NO_PTS || span > self.duration)
        {
            self.duration = span;
        }
        trace!(stream = self.index, pts, dts = packet.dts(), "stream packet");
    }

    pub(crate) fn reset_position(&mut self) {
        self.current_dts = NO_PTS;
    }

    // Index

    /// Add a seek point, replacing one with the same timestamp.
    pub fn add_index_entry(&mut self, entry: IndexEntry) -> Result<()> {
        self.seek_index.add(entry)
    }

    pub fn num_index_entries(&self) -> usize {
        self.seek_index.len()
    }

    pub fn index_entry(&self, position: usize) -> Option<&IndexEntry> {
        self.seek_index.get(position)
    }

    /// Nearest qualifying index position for `target`; see
    /// [`StreamIndex::search`].
    pub fn find_timestamp_position_in_index(&self, target: i64, flags: SeekFlags) -> Option<usize> {
        self.seek_index.search(target, flags)
    }

    pub fn find_timestamp_entry_in_index(&self, target: i64, flags: SeekFlags) -> Option<&IndexEntry> {
        self.find_timestamp_position_in_index(target, flags)
            .and_then(|pos| self.seek_index.get(pos))
    }

    pub fn seek_index(&self) -> &StreamIndex {
        &self.seek_index
    }
}
