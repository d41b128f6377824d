//! # avbind
//!
//! Packetization and timestamp reconciliation between containers and
//! per-stream coders.
//!
//! Encoded data moves from a demuxed [`Container`] through a [`Stream`] to its
//! bound [`StreamCoder`], and back out through a muxing container. Along the
//! way avbind keeps three time domains consistent (stream time base, coder
//! time base and codec-internal counters), reassembles audio into the
//! engine's frame size, and preserves dts order across interleaved streams.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use avbind::prelude::*;
//!
//! fn main() -> avbind::Result<()> {
//!     let registry = CodecRegistry::with_builtin();
//!     let mut coder = StreamCoder::new(Direction::Outbound, MediaType::Audio);
//!     coder.set_codec(&registry, CodecId::PcmS16le)?;
//!     coder.set_sample_rate(48_000)?;
//!     coder.set_channels(2)?;
//!     coder.set_sample_format(SampleFormat::S16)?;
//!
//!     let mut container = Container::new();
//!     container.open_write(Box::new(MemoryMuxer::new()), ContainerOptions::new())?;
//!     let stream = container.add_new_stream(0)?;
//!     stream.set_stream_coder(coder)?;
//!     if let Some(coder) = stream.stream_coder_mut() {
//!         coder.open()?;
//!     }
//!     container.write_header()?;
//!
//!     let mut samples = AudioSamples::new(1024, 2, 48_000, SampleFormat::S16)?;
//!     samples.set_complete(true, 1024, 0)?;
//!     let mut packets = Vec::new();
//!     if let Some(coder) = container.stream_mut(0)?.stream_coder_mut() {
//!         packets = coder.encode_audio(Some(&samples))?;
//!         packets.extend(coder.encode_audio(None)?);
//!     }
//!     for packet in &packets {
//!         container.write_packet(packet, true)?;
//!     }
//!     container.close()
//! }
//! ```
//!
//! ## Architecture
//!
//! - `avbind-core`: rationals and time bases, buffers, packets, pictures and
//!   sample blocks, errors
//! - `avbind-codecs`: the codec engine contract and [`StreamCoder`]
//! - `avbind-containers`: demux and mux engine contracts, streams, indexes,
//!   interleaving and [`Container`]
//!
//! This crate re-exports the commonly used types.

pub mod prelude;

// Re-export core types
pub use avbind_core::{
    allocation_ceiling, set_allocation_ceiling, AudioSamples, Buffer, BufferOwnership, BufferPool,
    CodecError, CodecId, ContainerError, Direction, Error, ErrorKind, Interrupt, MediaType,
    Packet, PacketFlags, Picture, PixelFormat, PoolStats, Rational, Result, Rounding,
    SampleFormat, TimeBase, Timestamp, NO_PTS,
};

// Re-export codec types
pub use avbind_codecs::{
    CodecEngine, CodecRegistry, CoderFlags, CoderState, Decoded, OptionSet, OptionValue,
    PcmEngine, RawVideoEngine, StreamCoder, StreamLink, TimestampReport,
};

// Re-export container types
pub use avbind_containers::{
    Container, ContainerFlags, ContainerOptions, ContainerType, DemuxEngine, DemuxedUnit,
    IndexEntry, IndexFlags, Interleaver, MemoryDemuxer, MemoryMuxer, Metadata, MuxEngine, MuxLog,
    MuxRecorder, ParseType, SeekFlags, Stream, StreamDescriptor, StreamIndex,
};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
