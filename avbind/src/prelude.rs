//! Prelude module for convenient imports.
//!
//! ```rust
//! use avbind::prelude::*;
//! ```

// Core error types
pub use crate::{Error, ErrorKind, Result};

// Timestamps
pub use crate::{Rational, TimeBase, Timestamp, NO_PTS};

// Media data
pub use crate::{AudioSamples, Buffer, Packet, Picture, PixelFormat, SampleFormat};

// Identifiers
pub use crate::{CodecId, Direction, MediaType};

// Coding
pub use crate::{CodecRegistry, StreamCoder};

// Containers
pub use crate::{
    Container, ContainerOptions, DemuxEngine, MemoryDemuxer, MemoryMuxer, MuxEngine, SeekFlags,
    Stream, StreamDescriptor,
};

// Cancellation
pub use crate::Interrupt;
