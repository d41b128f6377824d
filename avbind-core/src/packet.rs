//! Packet abstractions for encoded media data.
//!
//! Packets carry compressed data between containers and coders. The payload
//! lives in a shared [`Buffer`]; timestamps are expressed in the packet's own
//! [`TimeBase`].

use crate::buffer::{allocation_ceiling, Buffer, BufferOwnership};
use crate::error::{Error, Result};
use crate::timestamp::{TimeBase, NO_PTS};
use bitflags::bitflags;
use std::fmt;

bitflags! {
    /// Flags for packet properties.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PacketFlags: u32 {
        /// This packet contains a keyframe.
        const KEYFRAME = 0x0001;
        /// Packet data is corrupted.
        const CORRUPT = 0x0002;
        /// Packet should be discarded.
        const DISCARD = 0x0004;
        /// Packet contains a disposable frame (can be dropped).
        const DISPOSABLE = 0x0008;
    }
}

/// An encoded media packet.
#[derive(Clone)]
pub struct Packet {
    buffer: Option<Buffer>,
    /// Capacity requested by `allocate_new_payload` but not yet allocated.
    pending: Option<usize>,
    size: usize,
    complete: bool,
    stream_index: i32,
    pts: i64,
    dts: i64,
    duration: i64,
    position: i64,
    flags: PacketFlags,
    time_base: TimeBase,
    convergence_duration: i64,
}

impl Packet {
    /// Create an empty packet with no payload.
    pub fn new() -> Self {
        Self {
            buffer: None,
            pending: None,
            size: 0,
            complete: false,
            stream_index: -1,
            pts: NO_PTS,
            dts: NO_PTS,
            duration: 0,
            position: -1,
            flags: PacketFlags::empty(),
            time_base: TimeBase::default(),
            convergence_duration: 0,
        }
    }

    /// Create a packet with room for `size` payload bytes.
    pub fn with_capacity(size: usize) -> Result<Self> {
        let mut packet = Self::new();
        packet.allocate_new_payload(size)?;
        Ok(packet)
    }

    /// Create a complete packet whose payload is all of `buffer`.
    pub fn wrap(buffer: Buffer) -> Self {
        let mut packet = Self::new();
        packet.size = buffer.len();
        packet.complete = true;
        packet.buffer = Some(buffer);
        packet
    }

    /// Create a complete packet holding a copy of `bytes`.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let mut packet = Self::new();
        packet.write_payload(bytes)?;
        Ok(packet)
    }

    /// Create a packet from another one, sharing or copying its payload.
    pub fn from_packet(other: &Packet, copy_data: bool) -> Result<Self> {
        let mut packet = other.clone();
        if copy_data {
            if let Some(buffer) = &other.buffer {
                packet.buffer = Some(buffer.copy()?);
            }
        }
        Ok(packet)
    }

    /// Drop the current payload reference and reserve `size` bytes.
    ///
    /// Storage is allocated on first write. Other holders of the previous
    /// buffer are unaffected.
    pub fn allocate_new_payload(&mut self, size: usize) -> Result<()> {
        let ceiling = allocation_ceiling();
        if size > ceiling {
            return Err(Error::OutOfMemory {
                requested: size,
                ceiling,
            });
        }
        self.buffer = None;
        self.pending = Some(size);
        self.size = 0;
        self.complete = false;
        Ok(())
    }

    fn materialize(&mut self) -> Result<()> {
        if let Some(size) = self.pending {
            self.buffer = Some(Buffer::allocate(size)?);
            self.pending = None;
        }
        Ok(())
    }

    /// Clear timestamps, flags and size, keeping the payload buffer.
    pub fn reset(&mut self) {
        self.pts = NO_PTS;
        self.dts = NO_PTS;
        self.size = 0;
        self.flags = PacketFlags::empty();
        self.duration = 0;
        self.position = -1;
        self.stream_index = -1;
        self.complete = false;
        self.convergence_duration = 0;
    }

    /// Mark the packet complete with `size` valid bytes, or clear completeness.
    pub fn set_complete(&mut self, complete: bool, size: usize) -> Result<()> {
        if !complete {
            self.complete = false;
            return Ok(());
        }
        let max = self.max_size();
        if size > max {
            return Err(Error::invalid_arg(format!(
                "packet size {size} exceeds payload capacity {max}"
            )));
        }
        self.materialize()?;
        self.size = size;
        self.complete = true;
        Ok(())
    }

    /// Replace the payload with a copy of `bytes` and mark the packet complete.
    pub fn write_payload(&mut self, bytes: &[u8]) -> Result<()> {
        let writable = matches!(
            &self.buffer,
            Some(b) if b.is_unique() && b.ownership() == BufferOwnership::Owned
        );
        if self.pending.is_none() && (!writable || self.max_size() < bytes.len()) {
            self.allocate_new_payload(bytes.len())?;
        } else if self.pending.map_or(false, |p| p < bytes.len()) {
            self.allocate_new_payload(bytes.len())?;
        }
        self.data_mut()?[..bytes.len()].copy_from_slice(bytes);
        self.set_complete(true, bytes.len())
    }

    /// Mutable access to the full payload capacity.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        self.materialize()?;
        match &mut self.buffer {
            Some(buffer) => buffer.data_mut(),
            None => Ok(&mut []),
        }
    }

    /// The valid payload bytes.
    pub fn data(&self) -> &[u8] {
        match &self.buffer {
            Some(buffer) => &buffer.data()[..self.size.min(buffer.len())],
            None => &[],
        }
    }

    /// The payload buffer, if one has been allocated.
    pub fn buffer(&self) -> Option<&Buffer> {
        self.buffer.as_ref()
    }

    /// Number of valid payload bytes.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Largest size `set_complete` accepts.
    pub fn max_size(&self) -> usize {
        match (self.pending, &self.buffer) {
            (Some(size), _) => size,
            (None, Some(buffer)) => buffer.len(),
            (None, None) => 0,
        }
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn stream_index(&self) -> i32 {
        self.stream_index
    }

    pub fn set_stream_index(&mut self, index: i32) {
        self.stream_index = index;
    }

    /// Presentation timestamp, `NO_PTS` if unknown.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    /// Decode timestamp, `NO_PTS` if unknown.
    pub fn dts(&self) -> i64 {
        self.dts
    }

    pub fn set_dts(&mut self, dts: i64) {
        self.dts = dts;
    }

    pub fn duration(&self) -> i64 {
        self.duration
    }

    pub fn set_duration(&mut self, duration: i64) {
        self.duration = duration;
    }

    /// Byte position in the source, −1 if unknown.
    pub fn position(&self) -> i64 {
        self.position
    }

    pub fn set_position(&mut self, position: i64) {
        self.position = position;
    }

    pub fn flags(&self) -> PacketFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: PacketFlags) {
        self.flags = flags;
    }

    /// Check if this is a keyframe packet.
    pub fn is_key(&self) -> bool {
        self.flags.contains(PacketFlags::KEYFRAME)
    }

    /// Set the keyframe flag.
    pub fn set_key(&mut self, keyframe: bool) {
        self.flags.set(PacketFlags::KEYFRAME, keyframe);
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    /// Set the time base without touching the timestamp values.
    pub fn set_time_base(&mut self, time_base: TimeBase) {
        self.time_base = time_base;
    }

    pub fn convergence_duration(&self) -> i64 {
        self.convergence_duration
    }

    pub fn set_convergence_duration(&mut self, duration: i64) {
        self.convergence_duration = duration;
    }

    /// Convert every timestamp field into `target` and adopt it.
    pub fn rescale_to(&mut self, target: TimeBase) {
        if target == self.time_base {
            return;
        }
        let from = self.time_base;
        self.pts = from.rescale(self.pts, target);
        self.dts = from.rescale(self.dts, target);
        self.duration = from.rescale(self.duration, target);
        self.convergence_duration = from.rescale(self.convergence_duration, target);
        self.time_base = target;
    }
}

impl Default for Packet {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("stream_index", &self.stream_index)
            .field("size", &self.size)
            .field("pts", &self.pts)
            .field("dts", &self.dts)
            .field("duration", &self.duration)
            .field("time_base", &self.time_base)
            .field("flags", &self.flags)
            .field("complete", &self.complete)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_packet_defaults() {
        let p = Packet::new();
        assert_eq!(p.stream_index(), -1);
        assert_eq!(p.pts(), NO_PTS);
        assert_eq!(p.dts(), NO_PTS);
        assert_eq!(p.position(), -1);
        assert!(!p.is_complete());
        assert!(p.data().is_empty());
    }

    #[test]
    fn test_set_complete_bounds() {
        let mut p = Packet::new();
        p.allocate_new_payload(100).unwrap();
        assert!(!p.is_complete());
        assert!(matches!(
            p.set_complete(true, 150),
            Err(Error::InvalidArgument(_))
        ));
        assert!(!p.is_complete());
        p.set_complete(true, 80).unwrap();
        assert!(p.is_complete());
        assert_eq!(p.size(), 80);
        assert_eq!(p.data().len(), 80);

        p.set_complete(false, 0).unwrap();
        assert!(!p.is_complete());
    }

    #[test]
    fn test_allocation_is_lazy() {
        let mut p = Packet::new();
        p.allocate_new_payload(64).unwrap();
        assert!(p.buffer().is_none());
        assert_eq!(p.max_size(), 64);
        p.data_mut().unwrap()[0] = 1;
        assert_eq!(p.buffer().map(|b| b.len()), Some(64));
    }

    #[test]
    fn test_new_payload_leaves_old_holders_intact() {
        let mut p = Packet::from_slice(b"abc").unwrap();
        let old = p.buffer().cloned().unwrap();
        p.allocate_new_payload(10).unwrap();
        p.write_payload(b"xyz").unwrap();
        assert_eq!(old.data(), b"abc");
        assert_eq!(p.data(), b"xyz");
    }

    #[test]
    fn test_reset_keeps_buffer() {
        let mut p = Packet::from_slice(b"abcd").unwrap();
        p.set_pts(10);
        p.set_dts(9);
        p.set_stream_index(2);
        p.set_key(true);
        p.set_position(100);
        p.set_duration(3);
        p.reset();

        assert_eq!(p.pts(), NO_PTS);
        assert_eq!(p.dts(), NO_PTS);
        assert_eq!(p.size(), 0);
        assert_eq!(p.flags(), PacketFlags::empty());
        assert_eq!(p.duration(), 0);
        assert_eq!(p.position(), -1);
        assert_eq!(p.stream_index(), -1);
        assert!(!p.is_complete());
        assert!(p.buffer().is_some());
        assert_eq!(p.max_size(), 4);
    }

    #[test]
    fn test_wrap_shares_buffer() {
        let buf = Buffer::from_vec(vec![1, 2, 3]);
        let p = Packet::wrap(buf.clone());
        assert!(p.is_complete());
        assert_eq!(p.size(), 3);
        assert_eq!(buf.ref_count(), 2);
    }

    #[test]
    fn test_from_packet_copy() {
        let mut a = Packet::from_slice(b"data").unwrap();
        a.set_pts(5);
        let shared = Packet::from_packet(&a, false).unwrap();
        let copied = Packet::from_packet(&a, true).unwrap();
        assert!(shared.buffer().unwrap().ptr_eq(a.buffer().unwrap()));
        assert!(!copied.buffer().unwrap().ptr_eq(a.buffer().unwrap()));
        assert_eq!(copied.pts(), 5);
        assert_eq!(copied.data(), b"data");
    }

    #[test]
    fn test_write_payload_on_shared_buffer_reallocates() {
        let mut a = Packet::from_slice(b"1234").unwrap();
        let b = a.clone();
        a.write_payload(b"56").unwrap();
        assert_eq!(b.data(), b"1234");
        assert_eq!(a.data(), b"56");
    }

    #[test]
    fn test_rescale_to() {
        let mut p = Packet::new();
        p.set_time_base(TimeBase::MILLISECONDS);
        p.set_pts(1000);
        p.set_duration(40);
        p.rescale_to(TimeBase::MPEG);
        assert_eq!(p.pts(), 90000);
        assert_eq!(p.dts(), NO_PTS);
        assert_eq!(p.duration(), 3600);
        assert_eq!(p.time_base(), TimeBase::MPEG);
    }
}
