//! Containers, streams and packet interleaving.
//!
//! A [`Container`] moves encoded packets between a demux or mux engine and
//! its [`Stream`]s. Each stream carries its own time base, a seek
//! [`StreamIndex`] and optionally a bound
//! [`StreamCoder`](avbind_codecs::StreamCoder).
//!
//! Engines implement [`DemuxEngine`] or [`MuxEngine`] and only ever see
//! timestamps in native stream time bases. [`MemoryDemuxer`] and
//! [`MemoryMuxer`] are in-memory engines for driving a container without a
//! real format.

pub mod metadata;
pub mod traits;
pub mod index;
pub mod stream;
pub mod interleave;
pub mod options;
pub mod container;
pub mod memory;

pub use metadata::Metadata;
pub use traits::{
    ContainerFlags, ContainerProperties, DemuxEngine, DemuxedUnit, MuxEngine, ParseType,
    SeekFlags, StreamDescriptor,
};
pub use index::{IndexEntry, IndexFlags, StreamIndex, DEFAULT_INDEX_CAP};
pub use stream::Stream;
pub use interleave::{Interleaver, DEFAULT_MAX_INTERLEAVE_DELTA};
pub use options::{ContainerOptions, DEFAULT_PROBE_PACKET_LIMIT};
pub use container::{Container, ContainerType};
pub use memory::{MemoryDemuxer, MemoryMuxer, MuxLog, MuxRecorder};
