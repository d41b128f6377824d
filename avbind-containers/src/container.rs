//! Container sessions.
//!
//! A [`Container`] is opened either for reading, around a [`DemuxEngine`], or
//! for writing, around a [`MuxEngine`]. It owns the [`Stream`]s, converts
//! every timestamp between engine and stream time bases, and enforces the
//! header, packet and trailer ordering of a write session.

use crate::index::{IndexEntry, IndexFlags};
use crate::interleave::Interleaver;
use crate::metadata::Metadata;
use crate::options::ContainerOptions;
use crate::stream::Stream;
use crate::traits::{
    ContainerFlags, ContainerProperties, DemuxEngine, DemuxedUnit, MuxEngine, SeekFlags,
    StreamDescriptor,
};
use avbind_codecs::StreamCoder;
use avbind_core::{ContainerError, Direction, Error, Packet, Result, TimeBase, NO_PTS};
use std::collections::VecDeque;
use std::fmt;
use tracing::{debug, trace, warn};

/// Which way a container session moves data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum ContainerType {
    Read,
    Write,
}

enum Engine {
    Demux(Box<dyn DemuxEngine>),
    Mux(Box<dyn MuxEngine>),
}

/// A container opened for reading or writing.
pub struct Container {
    engine: Option<Engine>,
    options: ContainerOptions,
    streams: Vec<Stream>,
    read_ahead: VecDeque<Packet>,
    interleaver: Interleaver,
    metadata: Metadata,
    header_written: bool,
    trailer_written: bool,
    bytes_written: i64,
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl Container {
    /// Create a closed container.
    pub fn new() -> Self {
        Self {
            engine: None,
            options: ContainerOptions::default(),
            streams: Vec::new(),
            read_ahead: VecDeque::new(),
            interleaver: Interleaver::default(),
            metadata: Metadata::new(),
            header_written: false,
            trailer_written: false,
            bytes_written: 0,
        }
    }

    fn demuxer_of(engine: &mut Option<Engine>) -> Result<&mut Box<dyn DemuxEngine>> {
        match engine {
            Some(Engine::Demux(demuxer)) => Ok(demuxer),
            Some(Engine::Mux(_)) => Err(Error::invalid_state("container is open for writing")),
            None => Err(Error::invalid_state("container is not open")),
        }
    }

    fn muxer_of(engine: &mut Option<Engine>) -> Result<&mut Box<dyn MuxEngine>> {
        match engine {
            Some(Engine::Mux(muxer)) => Ok(muxer),
            Some(Engine::Demux(_)) => Err(Error::invalid_state("container is open for reading")),
            None => Err(Error::invalid_state("container is not open")),
        }
    }

    // Lifecycle

    /// Open for reading through `demuxer`.
    pub fn open_read(
        &mut self,
        mut demuxer: Box<dyn DemuxEngine>,
        options: ContainerOptions,
    ) -> Result<()> {
        if self.engine.is_some() {
            return Err(Error::invalid_state("container is already open"));
        }
        options.validate()?;
        options.check_interrupt()?;
        demuxer.open()?;

        self.reset(options);
        self.metadata = demuxer.metadata();
        debug!(
            format = demuxer.format_name(),
            streams = demuxer.streams().len(),
            "opened container for reading"
        );
        self.engine = Some(Engine::Demux(demuxer));
        if let Err(e) = self.sync_streams() {
            self.abandon();
            return Err(e);
        }
        Ok(())
    }

    /// Open for writing through `muxer`.
    pub fn open_write(&mut self, muxer: Box<dyn MuxEngine>, options: ContainerOptions) -> Result<()> {
        if self.engine.is_some() {
            return Err(Error::invalid_state("container is already open"));
        }
        options.validate()?;
        options.check_interrupt()?;

        self.reset(options);
        debug!(format = muxer.format_name(), "opened container for writing");
        self.engine = Some(Engine::Mux(muxer));
        Ok(())
    }

    fn reset(&mut self, options: ContainerOptions) {
        self.interleaver = Interleaver::new(options.max_interleave_delta);
        self.options = options;
        self.streams.clear();
        self.read_ahead.clear();
        self.metadata = Metadata::new();
        self.header_written = false;
        self.trailer_written = false;
        self.bytes_written = 0;
    }

    fn abandon(&mut self) {
        if let Some(engine) = self.engine.take() {
            match engine {
                Engine::Demux(mut demuxer) => demuxer.close(),
                Engine::Mux(mut muxer) => muxer.close(),
            }
        }
        self.streams.clear();
        self.read_ahead.clear();
    }

    /// Close the session.
    ///
    /// A write session that wrote its header gets its trailer first. Every
    /// open coder is closed and the engine released even when a step fails;
    /// the first failure is returned. Closing a closed container does nothing.
    pub fn close(&mut self) -> Result<()> {
        if self.engine.is_none() {
            return Ok(());
        }
        let mut first_error = None;
        if matches!(self.engine, Some(Engine::Mux(_))) && self.header_written {
            if let Err(e) = self.write_trailer() {
                first_error.get_or_insert(e);
            }
        }
        for stream in &mut self.streams {
            if let Some(coder) = stream.stream_coder_mut() {
                if let Err(e) = coder.close() {
                    first_error.get_or_insert(e);
                }
            }
        }
        self.abandon();
        self.interleaver = Interleaver::new(self.options.max_interleave_delta);
        debug!(failed = first_error.is_some(), "closed container");
        first_error.map_or(Ok(()), Err)
    }

    pub fn is_open(&self) -> bool {
        self.engine.is_some()
    }

    pub fn container_type(&self) -> Option<ContainerType> {
        match self.engine {
            Some(Engine::Demux(_)) => Some(ContainerType::Read),
            Some(Engine::Mux(_)) => Some(ContainerType::Write),
            None => None,
        }
    }

    pub fn format_name(&self) -> Option<&str> {
        match &self.engine {
            Some(Engine::Demux(demuxer)) => Some(demuxer.format_name()),
            Some(Engine::Mux(muxer)) => Some(muxer.format_name()),
            None => None,
        }
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.options
    }

    // Streams

    fn inbound_coder(&self, descriptor: &StreamDescriptor) -> Result<StreamCoder> {
        let mut coder = StreamCoder::new(Direction::Inbound, descriptor.media_type);
        if let (Some(registry), Some(codec)) = (&self.options.registry, descriptor.codec) {
            if registry.contains(codec) {
                coder.set_codec(registry, codec)?;
            }
        }
        Ok(coder)
    }

    /// Pick up streams the demuxer reported since the last call.
    fn sync_streams(&mut self) -> Result<()> {
        let descriptors = match &self.engine {
            Some(Engine::Demux(demuxer)) => demuxer.streams(),
            _ => return Ok(()),
        };
        for descriptor in descriptors.iter().skip(self.streams.len()) {
            let index = i32::try_from(self.streams.len())
                .map_err(|_| Error::invalid_state("too many streams"))?;
            let coder = self.inbound_coder(descriptor)?;
            let stream =
                Stream::from_descriptor(index, descriptor, self.options.index_cap, coder)?;
            debug!(
                index,
                media = %stream.media_type(),
                time_base = %stream.time_base(),
                "discovered stream"
            );
            self.streams.push(stream);
        }
        Ok(())
    }

    pub fn num_streams(&self) -> usize {
        self.streams.len()
    }

    pub fn streams(&self) -> &[Stream] {
        &self.streams
    }

    fn position_of(&self, index: i32) -> Result<usize> {
        usize::try_from(index)
            .ok()
            .filter(|&i| i < self.streams.len())
            .ok_or_else(|| ContainerError::StreamNotFound { index }.into())
    }

    pub fn stream(&self, index: i32) -> Result<&Stream> {
        let pos = self.position_of(index)?;
        Ok(&self.streams[pos])
    }

    pub fn stream_mut(&mut self, index: i32) -> Result<&mut Stream> {
        let pos = self.position_of(index)?;
        Ok(&mut self.streams[pos])
    }

    /// Whether [`add_new_stream`](Self::add_new_stream) would succeed now.
    pub fn can_streams_be_added_dynamically(&self) -> bool {
        match &self.engine {
            Some(Engine::Mux(muxer)) => !self.header_written || muxer.accepts_late_streams(),
            _ => false,
        }
    }

    /// Add an outbound stream with format-specific `id`.
    ///
    /// Streams are added before the header, or later if the muxer accepts
    /// late streams; a late stream is declared to the muxer with its first
    /// packet.
    pub fn add_new_stream(&mut self, id: i32) -> Result<&mut Stream> {
        let muxer = match &self.engine {
            Some(Engine::Mux(muxer)) => muxer,
            Some(Engine::Demux(_)) => {
                return Err(ContainerError::StreamsLocked(
                    "container is open for reading".into(),
                )
                .into())
            }
            None => return Err(Error::invalid_state("container is not open")),
        };
        if self.trailer_written {
            return Err(ContainerError::StreamsLocked("trailer already written".into()).into());
        }
        if self.header_written && !muxer.accepts_late_streams() {
            return Err(ContainerError::StreamsLocked(format!(
                "{} does not accept streams after the header",
                muxer.format_name()
            ))
            .into());
        }
        let index = i32::try_from(self.streams.len())
            .map_err(|_| Error::invalid_state("too many streams"))?;
        debug!(index, id, "added stream");
        self.streams.push(Stream::with_index_cap(
            index,
            id,
            Direction::Outbound,
            self.options.index_cap,
        ));
        Ok(&mut self.streams[index as usize])
    }

    // Reading

    /// Read the next packet, `Ok(None)` at end of stream.
    ///
    /// Packets come back stamped in their stream's time base. Transient read
    /// failures are retried up to the configured retry count.
    pub fn read_next_packet(&mut self) -> Result<Option<Packet>> {
        Self::demuxer_of(&mut self.engine)?;
        if let Some(packet) = self.read_ahead.pop_front() {
            return Ok(Some(packet));
        }
        self.read_from_engine()
    }

    fn read_from_engine(&mut self) -> Result<Option<Packet>> {
        let mut retries = 0i32;
        loop {
            self.options.check_interrupt()?;
            let demuxer = Self::demuxer_of(&mut self.engine)?;
            match demuxer.read_unit() {
                Ok(Some(unit)) => return self.accept_unit(unit).map(Some),
                Ok(None) => return Ok(None),
                Err(e)
                    if e.is_transient()
                        && (self.options.read_retry_count < 0
                            || retries < self.options.read_retry_count) =>
                {
                    retries += 1;
                    warn!(retry = retries, error = %e, "retrying container read");
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn accept_unit(&mut self, unit: DemuxedUnit) -> Result<Packet> {
        if unit.stream_index >= self.streams.len() {
            self.sync_streams()?;
        }
        let flags = self.options.flags;
        let stream = self.streams.get_mut(unit.stream_index).ok_or_else(|| {
            ContainerError::StreamNotFound {
                index: i32::try_from(unit.stream_index).unwrap_or(i32::MAX),
            }
        })?;

        let mut packet = Packet::wrap(unit.data);
        packet.set_stream_index(stream.index());
        packet.set_time_base(stream.time_base());
        packet.set_pts(unit.pts);
        packet.set_dts(if flags.contains(ContainerFlags::IGNORE_DTS) {
            NO_PTS
        } else {
            unit.dts
        });
        if flags.contains(ContainerFlags::GEN_PTS) && packet.pts() == NO_PTS {
            packet.set_pts(packet.dts());
        }
        packet.set_duration(unit.duration);
        packet.set_position(unit.position);
        packet.set_key(unit.key);

        stream.record_packet(&packet);
        if unit.key && !flags.contains(ContainerFlags::IGNORE_INDEX) {
            let timestamp = if packet.pts() != NO_PTS {
                packet.pts()
            } else {
                packet.dts()
            };
            if timestamp != NO_PTS {
                let size = u32::try_from(packet.size()).unwrap_or(u32::MAX);
                stream.add_index_entry(IndexEntry::new(
                    timestamp,
                    unit.position,
                    size,
                    0,
                    IndexFlags::KEYFRAME,
                ))?;
            }
        }
        trace!(
            stream = packet.stream_index(),
            pts = packet.pts(),
            dts = packet.dts(),
            size = packet.size(),
            "read packet"
        );
        Ok(packet)
    }

    /// Read ahead until every known stream has produced a packet.
    ///
    /// Reads at most the configured probe limit. The packets read are
    /// handed out again by [`read_next_packet`](Self::read_next_packet).
    pub fn query_stream_metadata(&mut self) -> Result<()> {
        Self::demuxer_of(&mut self.engine)?;
        self.sync_streams()?;
        let mut seen = vec![false; self.streams.len()];
        for packet in &self.read_ahead {
            if let Ok(pos) = usize::try_from(packet.stream_index()) {
                if let Some(flag) = seen.get_mut(pos) {
                    *flag = true;
                }
            }
        }

        let mut probed = 0;
        while (seen.is_empty() || seen.iter().any(|s| !s)) && probed < self.options.probe_packet_limit {
            let Some(packet) = self.read_from_engine()? else {
                break;
            };
            probed += 1;
            seen.resize(self.streams.len(), false);
            if let Ok(pos) = usize::try_from(packet.stream_index()) {
                seen[pos] = true;
            }
            self.read_ahead.push_back(packet);
        }
        debug!(
            probed,
            streams = self.streams.len(),
            buffered = self.read_ahead.len(),
            "queried stream metadata"
        );
        Ok(())
    }

    /// Packets read ahead and not yet handed out.
    pub fn buffered_packets(&self) -> usize {
        self.read_ahead.len()
    }

    /// Seek so the next packet read is a key frame near `target`.
    ///
    /// `stream_index` selects the time base of `min`, `target` and `max`, or
    /// -1 for microseconds. Buffered read-ahead is dropped.
    pub fn seek_key_frame(
        &mut self,
        stream_index: i32,
        min: i64,
        target: i64,
        max: i64,
        flags: SeekFlags,
    ) -> Result<()> {
        Self::demuxer_of(&mut self.engine)?;
        if !(min <= target && target <= max) {
            return Err(Error::invalid_arg(format!(
                "seek target {target} outside [{min}, {max}]"
            )));
        }
        if stream_index != -1 {
            self.position_of(stream_index)?;
        }
        self.options.check_interrupt()?;

        let demuxer = Self::demuxer_of(&mut self.engine)?;
        demuxer.seek(stream_index, min, target, max, flags)?;
        self.read_ahead.clear();
        for stream in &mut self.streams {
            stream.reset_position();
        }
        debug!(stream = stream_index, target, ?flags, "seeked");
        Ok(())
    }

    // Writing

    /// Declare every stream to the muxer and write the header.
    ///
    /// Stream time bases are frozen here. Repeat calls do nothing.
    pub fn write_header(&mut self) -> Result<()> {
        let muxer = Self::muxer_of(&mut self.engine)?;
        if self.header_written {
            return Ok(());
        }
        self.options.check_interrupt()?;
        for stream in &mut self.streams {
            stream.freeze_time_base();
            muxer.add_stream(&stream.descriptor())?;
            stream.declared = true;
        }
        muxer.write_header(&self.metadata)?;
        self.header_written = true;
        debug!(streams = self.streams.len(), "wrote header");
        Ok(())
    }

    /// Write one packet to the stream named by its stream index.
    ///
    /// The packet is converted to the stream time base first. Dts must not
    /// go backwards on a stream. With `force_interleave` the packet is queued
    /// and released in dts order across streams.
    pub fn write_packet(&mut self, packet: &Packet, force_interleave: bool) -> Result<()> {
        let muxer = Self::muxer_of(&mut self.engine)?;
        if !self.header_written {
            return Err(Error::invalid_state("header must be written before packets"));
        }
        if self.trailer_written {
            return Err(Error::invalid_state("trailer already written"));
        }
        let index = packet.stream_index();
        let stream = usize::try_from(index)
            .ok()
            .and_then(|pos| self.streams.get_mut(pos))
            .ok_or(ContainerError::StreamNotFound { index })?;

        let mut out = packet.clone();
        stream.stamp_output_packet(&mut out);
        let last = stream.current_dts();
        if out.dts() != NO_PTS && last != NO_PTS && out.dts() < last {
            return Err(ContainerError::NonMonotonicDts {
                stream: index,
                dts: out.dts(),
                last,
            }
            .into());
        }
        if !stream.declared {
            stream.freeze_time_base();
            muxer.add_stream(&stream.descriptor())?;
            stream.declared = true;
            debug!(stream = index, "declared late stream");
        }
        stream.record_packet(&out);
        self.bytes_written += i64::try_from(out.size()).unwrap_or(i64::MAX);
        trace!(
            stream = index,
            pts = out.pts(),
            dts = out.dts(),
            interleave = force_interleave,
            "write packet"
        );

        if force_interleave {
            self.interleaver.push(out)?;
            let num_streams = self.streams.len();
            while let Some(ready) = self.interleaver.pop_ready(num_streams) {
                muxer.write_unit(&ready)?;
            }
            Ok(())
        } else {
            muxer.write_unit(&out)
        }
    }

    /// Drain queued packets and write the trailer. Repeat calls do nothing.
    ///
    /// An interrupt leaves unwritten packets queued for the next call.
    pub fn write_trailer(&mut self) -> Result<()> {
        let muxer = Self::muxer_of(&mut self.engine)?;
        if !self.header_written {
            return Err(Error::invalid_state("trailer written before header"));
        }
        if self.trailer_written {
            return Ok(());
        }
        while !self.interleaver.is_empty() {
            self.options.check_interrupt()?;
            let Some(packet) = self.interleaver.pop_earliest() else {
                break;
            };
            muxer.write_unit(&packet)?;
        }
        muxer.write_trailer()?;
        self.trailer_written = true;
        debug!(bytes = self.bytes_written, "wrote trailer");
        Ok(())
    }

    /// Push buffered muxer output to its sink.
    pub fn flush_packets(&mut self) -> Result<()> {
        let muxer = Self::muxer_of(&mut self.engine)?;
        if !self.header_written {
            return Err(Error::invalid_state("nothing to flush before the header"));
        }
        muxer.flush()
    }

    pub fn is_header_written(&self) -> bool {
        self.header_written
    }

    pub fn is_trailer_written(&self) -> bool {
        self.trailer_written
    }

    /// Packets queued for interleaving.
    pub fn queued_packets(&self) -> usize {
        self.interleaver.len()
    }

    // Properties

    fn properties(&self) -> ContainerProperties {
        match &self.engine {
            Some(Engine::Demux(demuxer)) => demuxer.properties(),
            _ => ContainerProperties::default(),
        }
    }

    fn stream_micros(&self, pick: fn(&Stream) -> i64) -> impl Iterator<Item = i64> + '_ {
        self.streams.iter().filter_map(move |stream| {
            let value = pick(stream);
            (value != NO_PTS).then(|| stream.time_base().rescale(value, TimeBase::MICROSECONDS))
        })
    }

    /// Duration in microseconds, `NO_PTS` if unknown.
    pub fn duration(&self) -> i64 {
        let reported = self.properties().duration;
        if reported != NO_PTS {
            return reported;
        }
        self.stream_micros(Stream::duration).max().unwrap_or(NO_PTS)
    }

    /// Start time in microseconds, `NO_PTS` if unknown.
    pub fn start_time(&self) -> i64 {
        let reported = self.properties().start_time;
        if reported != NO_PTS {
            return reported;
        }
        self.stream_micros(Stream::start_time).min().unwrap_or(NO_PTS)
    }

    /// Size in bytes: the source size when reading, payload bytes written so
    /// far when writing. -1 if unknown.
    pub fn file_size(&self) -> i64 {
        match &self.engine {
            Some(Engine::Mux(_)) => self.bytes_written,
            _ => self.properties().file_size,
        }
    }

    /// Bits per second, 0 if unknown.
    pub fn bit_rate(&self) -> i64 {
        let reported = self.properties().bit_rate;
        if reported > 0 {
            return reported;
        }
        let (size, duration) = (self.file_size(), self.duration());
        if size > 0 && duration != NO_PTS && duration > 0 {
            (i128::from(size) * 8 * 1_000_000 / i128::from(duration)) as i64
        } else {
            0
        }
    }

    pub fn flags(&self) -> ContainerFlags {
        self.options.flags
    }

    pub fn set_flag(&mut self, flag: ContainerFlags, on: bool) {
        self.options.flags.set(flag, on);
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Container metadata, written with the header.
    pub fn metadata_mut(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

impl Drop for Container {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = %e, "closing container on drop failed");
        }
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Container")
            .field("type", &self.container_type())
            .field("format", &self.format_name())
            .field("streams", &self.streams.len())
            .field("header_written", &self.header_written)
            .field("trailer_written", &self.trailer_written)
            .field("read_ahead", &self.read_ahead.len())
            .finish()
    }
}
