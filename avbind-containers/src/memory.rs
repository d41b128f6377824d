//! In-memory demux and mux engines.
//!
//! [`MemoryDemuxer`] plays back a prepared list of units and
//! [`MemoryMuxer`] records what a container writes. Neither touches a byte
//! layout; they exist to drive [`Container`](crate::container::Container)
//! without a real format.

use crate::metadata::Metadata;
use crate::traits::{
    ContainerProperties, DemuxEngine, DemuxedUnit, MuxEngine, SeekFlags, StreamDescriptor,
};
use avbind_core::{ContainerError, Error, Packet, Result, TimeBase, Timestamp, NO_PTS};
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tracing::trace;

/// Demuxer over units held in memory.
#[derive(Debug, Clone)]
pub struct MemoryDemuxer {
    streams: Vec<StreamDescriptor>,
    late_streams: Vec<(usize, StreamDescriptor)>,
    units: Vec<DemuxedUnit>,
    metadata: Metadata,
    cursor: usize,
    transient_failures: usize,
    opened: bool,
}

impl MemoryDemuxer {
    pub fn new(streams: Vec<StreamDescriptor>, units: Vec<DemuxedUnit>) -> Self {
        Self {
            streams,
            late_streams: Vec::new(),
            units,
            metadata: Metadata::new(),
            cursor: 0,
            transient_failures: 0,
            opened: false,
        }
    }

    /// Fail the next `count` reads with a transient error.
    #[must_use]
    pub fn with_transient_errors(mut self, count: usize) -> Self {
        self.transient_failures = count;
        self
    }

    #[must_use]
    pub fn with_metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// Report `descriptor` only once `after` units have been read.
    #[must_use]
    pub fn with_late_stream(mut self, after: usize, descriptor: StreamDescriptor) -> Self {
        self.late_streams.push((after, descriptor));
        self
    }

    fn time_base_of(&self, stream_index: usize) -> TimeBase {
        self.streams()
            .get(stream_index)
            .map_or(TimeBase::MICROSECONDS, |s| s.time_base)
    }

    fn unit_time(&self, unit: &DemuxedUnit) -> Timestamp {
        let value = if unit.pts != NO_PTS { unit.pts } else { unit.dts };
        Timestamp::new(value, self.time_base_of(unit.stream_index))
    }

    fn span_micros(&self) -> Option<(i64, i64)> {
        let mut span: Option<(i64, i64)> = None;
        for unit in &self.units {
            let start = self.unit_time(unit);
            let Some(first) = start.to_micros() else {
                continue;
            };
            let end = Timestamp::new(
                start.value.saturating_add(unit.duration.max(0)),
                start.time_base,
            )
            .to_micros()
            .unwrap_or(first);
            span = Some(match span {
                Some((lo, hi)) => (lo.min(first), hi.max(end)),
                None => (first, end),
            });
        }
        span
    }
}

impl DemuxEngine for MemoryDemuxer {
    fn format_name(&self) -> &str {
        "memory"
    }

    fn open(&mut self) -> Result<()> {
        if self.opened {
            return Err(Error::invalid_state("demuxer already open"));
        }
        self.opened = true;
        self.cursor = 0;
        Ok(())
    }

    fn streams(&self) -> Vec<StreamDescriptor> {
        let mut streams = self.streams.clone();
        streams.extend(
            self.late_streams
                .iter()
                .filter(|(after, _)| self.cursor >= *after)
                .map(|(_, descriptor)| descriptor.clone()),
        );
        streams
    }

    fn read_unit(&mut self) -> Result<Option<DemuxedUnit>> {
        if !self.opened {
            return Err(Error::invalid_state("demuxer not open"));
        }
        if self.transient_failures > 0 {
            self.transient_failures -= 1;
            return Err(Error::transient("source not ready"));
        }
        let unit = self.units.get(self.cursor).cloned();
        if unit.is_some() {
            self.cursor += 1;
        }
        Ok(unit)
    }

    fn seek(
        &mut self,
        stream_index: i32,
        min: i64,
        target: i64,
        max: i64,
        flags: SeekFlags,
    ) -> Result<()> {
        let stream = usize::try_from(stream_index).ok();
        let by_byte = flags.contains(SeekFlags::BYTE);
        let target_base = stream.map_or(TimeBase::MICROSECONDS, |s| self.time_base_of(s));
        let at = |value: i64| Timestamp::new(value, target_base);

        let candidates: Vec<(usize, Timestamp)> = self
            .units
            .iter()
            .enumerate()
            .filter(|(_, unit)| stream.map_or(true, |s| unit.stream_index == s))
            .filter(|(_, unit)| flags.contains(SeekFlags::ANY) || unit.key)
            .map(|(i, unit)| {
                let time = if by_byte {
                    at(unit.position)
                } else {
                    self.unit_time(unit)
                };
                (i, time)
            })
            .filter(|(_, time)| *time >= at(min) && *time <= at(max))
            .collect();

        let chosen = if flags.contains(SeekFlags::BACKWARDS) {
            candidates
                .iter()
                .filter(|(_, time)| *time <= at(target))
                .max_by_key(|(_, time)| *time)
                .or_else(|| candidates.iter().min_by_key(|(_, time)| *time))
        } else {
            candidates
                .iter()
                .filter(|(_, time)| *time >= at(target))
                .min_by_key(|(_, time)| *time)
                .or_else(|| candidates.iter().max_by_key(|(_, time)| *time))
        };
        let (position, _) = chosen.ok_or_else(|| {
            ContainerError::SeekFailed(format!("no key frame in [{min}, {max}]"))
        })?;
        self.cursor = *position;
        trace!(cursor = self.cursor, target, "memory demuxer seeked");
        Ok(())
    }

    fn properties(&self) -> ContainerProperties {
        let file_size = self.units.iter().map(|u| u.data.len() as i64).sum::<i64>();
        match self.span_micros() {
            Some((start, end)) => {
                let duration = end - start;
                let bit_rate = if duration > 0 {
                    (i128::from(file_size) * 8 * 1_000_000 / i128::from(duration)) as i64
                } else {
                    0
                };
                ContainerProperties {
                    duration,
                    start_time: start,
                    file_size,
                    bit_rate,
                }
            }
            None => ContainerProperties {
                file_size,
                ..ContainerProperties::default()
            },
        }
    }

    fn metadata(&self) -> Metadata {
        self.metadata.clone()
    }

    fn close(&mut self) {
        self.opened = false;
    }
}

/// Everything a [`MemoryMuxer`] was asked to do.
#[derive(Debug, Clone, Default)]
pub struct MuxLog {
    pub streams: Vec<StreamDescriptor>,
    pub metadata: Metadata,
    pub header_written: bool,
    pub packets: Vec<Packet>,
    pub trailer_written: bool,
    pub flushes: usize,
    pub closed: bool,
}

impl MuxLog {
    /// `(stream index, dts)` of every packet written, in order.
    pub fn dts_order(&self) -> Vec<(i32, i64)> {
        self.packets
            .iter()
            .map(|p| (p.stream_index(), p.dts()))
            .collect()
    }
}

/// Shared view of a [`MemoryMuxer`]'s log, usable after the muxer moved
/// into a container.
#[derive(Debug, Clone)]
pub struct MuxRecorder {
    log: Arc<Mutex<MuxLog>>,
}

impl MuxRecorder {
    pub fn lock(&self) -> MutexGuard<'_, MuxLog> {
        self.log.lock()
    }
}

/// Muxer that records its input.
#[derive(Debug, Default)]
pub struct MemoryMuxer {
    log: Arc<Mutex<MuxLog>>,
    late_streams: bool,
}

impl MemoryMuxer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept streams declared after the header.
    #[must_use]
    pub fn with_late_streams(mut self, on: bool) -> Self {
        self.late_streams = on;
        self
    }

    pub fn recorder(&self) -> MuxRecorder {
        MuxRecorder {
            log: Arc::clone(&self.log),
        }
    }
}

impl MuxEngine for MemoryMuxer {
    fn format_name(&self) -> &str {
        "memory"
    }

    fn add_stream(&mut self, descriptor: &StreamDescriptor) -> Result<()> {
        let mut log = self.log.lock();
        if log.header_written && !self.late_streams {
            return Err(ContainerError::StreamsLocked("header already written".into()).into());
        }
        log.streams.push(descriptor.clone());
        Ok(())
    }

    fn accepts_late_streams(&self) -> bool {
        self.late_streams
    }

    fn write_header(&mut self, metadata: &Metadata) -> Result<()> {
        let mut log = self.log.lock();
        log.metadata = metadata.clone();
        log.header_written = true;
        Ok(())
    }

    fn write_unit(&mut self, packet: &Packet) -> Result<()> {
        let mut log = self.log.lock();
        if !log.header_written {
            return Err(Error::invalid_state("unit written before header"));
        }
        let index = packet.stream_index();
        let declared = usize::try_from(index).map_or(false, |i| i < log.streams.len());
        if !declared {
            return Err(ContainerError::StreamNotFound { index }.into());
        }
        log.packets.push(packet.clone());
        Ok(())
    }

    fn write_trailer(&mut self) -> Result<()> {
        self.log.lock().trailer_written = true;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.log.lock().flushes += 1;
        Ok(())
    }

    fn close(&mut self) {
        self.log.lock().closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use avbind_core::{Buffer, CodecId, MediaType};

    fn unit(stream_index: usize, ts: i64, key: bool) -> DemuxedUnit {
        DemuxedUnit {
            stream_index,
            data: Buffer::from_vec(vec![1u8; 10]),
            pts: ts,
            dts: ts,
            duration: 10,
            position: ts,
            key,
        }
    }

    fn demuxer() -> MemoryDemuxer {
        let stream = StreamDescriptor::new(MediaType::Video, TimeBase::MILLISECONDS);
        let units = (0..6).map(|i| unit(0, i * 10, i % 2 == 0)).collect();
        MemoryDemuxer::new(vec![stream], units)
    }

    #[test]
    fn test_reads_in_order_then_ends() {
        let mut demuxer = demuxer();
        assert!(demuxer.read_unit().is_err());
        demuxer.open().unwrap();
        let mut count = 0;
        while let Some(unit) = demuxer.read_unit().unwrap() {
            assert_eq!(unit.pts, count * 10);
            count += 1;
        }
        assert_eq!(count, 6);
    }

    #[test]
    fn test_transient_errors_then_success() {
        let mut demuxer = demuxer().with_transient_errors(2);
        demuxer.open().unwrap();
        assert!(demuxer.read_unit().unwrap_err().is_transient());
        assert!(demuxer.read_unit().unwrap_err().is_transient());
        assert_eq!(demuxer.read_unit().unwrap().unwrap().pts, 0);
    }

    #[test]
    fn test_seek_lands_on_key_units() {
        let mut demuxer = demuxer();
        demuxer.open().unwrap();
        demuxer
            .seek(0, 0, 30, 50, SeekFlags::BACKWARDS)
            .unwrap();
        assert_eq!(demuxer.read_unit().unwrap().unwrap().pts, 20);

        demuxer.seek(0, 0, 30, 50, SeekFlags::empty()).unwrap();
        assert_eq!(demuxer.read_unit().unwrap().unwrap().pts, 40);

        demuxer.seek(0, 0, 30, 50, SeekFlags::ANY).unwrap();
        assert_eq!(demuxer.read_unit().unwrap().unwrap().pts, 30);
    }

    #[test]
    fn test_seek_in_microseconds() {
        let mut demuxer = demuxer();
        demuxer.open().unwrap();
        demuxer
            .seek(-1, 0, 25_000, 60_000, SeekFlags::BACKWARDS)
            .unwrap();
        assert_eq!(demuxer.read_unit().unwrap().unwrap().pts, 20);
    }

    #[test]
    fn test_seek_outside_range_fails() {
        let mut demuxer = demuxer();
        demuxer.open().unwrap();
        assert!(demuxer.seek(0, 100, 100, 200, SeekFlags::empty()).is_err());
    }

    #[test]
    fn test_properties_from_units() {
        let props = demuxer().properties();
        assert_eq!(props.start_time, 0);
        assert_eq!(props.duration, 60_000);
        assert_eq!(props.file_size, 60);
        assert_eq!(props.bit_rate, 8_000);
    }

    #[test]
    fn test_late_stream_appears_after_reads() {
        let audio = StreamDescriptor::audio(CodecId::PcmS16le, 8000, 1).unwrap();
        let mut demuxer = demuxer().with_late_stream(2, audio);
        demuxer.open().unwrap();
        assert_eq!(demuxer.streams().len(), 1);
        demuxer.read_unit().unwrap();
        demuxer.read_unit().unwrap();
        assert_eq!(demuxer.streams().len(), 2);
    }

    #[test]
    fn test_muxer_records() {
        let mut muxer = MemoryMuxer::new();
        let recorder = muxer.recorder();
        let mut packet = Packet::new();
        packet.set_stream_index(0);
        assert!(muxer.write_unit(&packet).is_err());

        muxer
            .add_stream(&StreamDescriptor::new(MediaType::Audio, TimeBase::MILLISECONDS))
            .unwrap();
        muxer.write_header(&Metadata::new()).unwrap();
        muxer.write_unit(&packet).unwrap();
        packet.set_stream_index(1);
        assert!(muxer.write_unit(&packet).is_err());
        assert!(muxer
            .add_stream(&StreamDescriptor::default())
            .is_err());
        muxer.write_trailer().unwrap();

        let log = recorder.lock();
        assert_eq!(log.packets.len(), 1);
        assert!(log.trailer_written);
    }
}
