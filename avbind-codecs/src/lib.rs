//! # avbind codecs
//!
//! Stream coders and the codec engine contract.
//!
//! ## Coding
//!
//! - [`StreamCoder`] - Encoder or decoder for one stream, with parameter
//!   validation, audio reassembly and timestamp reconciliation
//! - [`CodecEngine`] - Capability trait implemented by codec back ends
//! - [`CodecRegistry`] - Maps codec identifiers to engine factories
//!
//! ## Options
//!
//! Every coder carries an [`OptionSet`] checked against a fixed per-media
//! table ([`VIDEO_OPTIONS`], [`AUDIO_OPTIONS`]); bad names, types and ranges
//! are rejected when set.
//!
//! ## Built-in engines
//!
//! - [`PcmEngine`] - Interleaved PCM pass-through
//! - [`RawVideoEngine`] - Uncompressed video, optionally emitted in B-frame
//!   style decode order

pub mod traits;
pub mod options;
pub mod registry;
pub mod reorder;
pub mod audio_fifo;
pub mod coder;
pub mod pcm;
pub mod rawvideo;

pub use traits::{
    CodecConfig, CodecDescriptor, CodecEngine, CoderFlags, DecodeStep, DecodedFrame,
    EncodeInput, EncodedUnit, EngineCaps, RawUnit,
};
pub use options::{OptionKind, OptionSet, OptionSpec, OptionValue, AUDIO_OPTIONS, VIDEO_OPTIONS};
pub use registry::{CodecRegistry, EngineFactory};
pub use reorder::{PendingPts, PtsRing};
pub use audio_fifo::{AudioChunk, AudioFifo};
pub use coder::{CoderState, Decoded, StreamCoder, StreamLink, DEFAULT_AUDIO_FRAME_SIZE};
pub use pcm::PcmEngine;
pub use rawvideo::{RawVideoEngine, TimestampReport};
