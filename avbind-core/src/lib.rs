//! # avbind core
//!
//! Core types shared by every avbind component:
//! - Error handling types
//! - Exact rational arithmetic and time-base rescaling
//! - Reference-counted buffers and a recycling pool
//! - Packets, pictures and audio sample blocks
//! - Cooperative cancellation

pub mod error;
pub mod rational;
pub mod timestamp;
pub mod buffer;
pub mod pool;
pub mod packet;
pub mod frame;
pub mod sample;
pub mod format;
pub mod interrupt;

pub use error::{CodecError, ContainerError, Error, ErrorKind, Result};
pub use rational::{rescale_rnd, Rational, Rounding};
pub use timestamp::{TimeBase, Timestamp, NO_PTS};
pub use buffer::{allocation_ceiling, set_allocation_ceiling, Buffer, BufferOwnership};
pub use pool::{BufferPool, PoolStats};
pub use packet::{Packet, PacketFlags};
pub use frame::{Picture, PixelFormat, PlaneLayout};
pub use sample::{AudioSamples, SampleFormat};
pub use format::{CodecId, Direction, MediaType};
pub use interrupt::Interrupt;
