//! Decoded video pictures.
//!
//! A [`Picture`] keeps every plane in one shared [`Buffer`]. Plane geometry is
//! a pure function of (format, width, height) and is recomputed on demand.

use crate::buffer::Buffer;
use crate::error::{Error, Result};
use crate::timestamp::{TimeBase, NO_PTS};
use std::fmt;

/// Row alignment applied to every plane stride.
pub const STRIDE_ALIGN: usize = 32;

/// Pixel format for video frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PixelFormat {
    /// Planar YUV 4:2:0, 12bpp (1 Cr & Cb sample per 2x2 Y samples).
    Yuv420p,
    /// Planar YUV 4:2:2, 16bpp (1 Cr & Cb sample per 2x1 Y samples).
    Yuv422p,
    /// Planar YUV 4:4:4, 24bpp (no subsampling).
    Yuv444p,
    /// Y plane followed by an interleaved UV plane.
    Nv12,
    /// Packed RGB24, 24bpp.
    Rgb24,
    /// Packed RGBA, 32bpp.
    Rgba,
    /// Grayscale, 8bpp.
    Gray8,
}

/// Where one plane lives inside a picture buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlaneLayout {
    /// Byte offset of the first row.
    pub offset: usize,
    /// Bytes per row, including alignment padding.
    pub stride: usize,
    /// Bytes of pixel data per row.
    pub row_bytes: usize,
    /// Number of rows.
    pub rows: usize,
}

impl PlaneLayout {
    /// Total bytes spanned by the plane.
    pub fn size(&self) -> usize {
        self.stride * self.rows
    }
}

impl PixelFormat {
    /// Get the number of planes for this pixel format.
    pub fn num_planes(&self) -> usize {
        match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => 3,
            Self::Nv12 => 2,
            Self::Rgb24 | Self::Rgba | Self::Gray8 => 1,
        }
    }

    /// Get the bits per pixel.
    pub fn bits_per_pixel(&self) -> u32 {
        match self {
            Self::Yuv420p | Self::Nv12 => 12,
            Self::Yuv422p => 16,
            Self::Yuv444p | Self::Rgb24 => 24,
            Self::Rgba => 32,
            Self::Gray8 => 8,
        }
    }

    /// Get chroma subsampling factors (horizontal, vertical).
    pub fn chroma_subsampling(&self) -> (usize, usize) {
        match self {
            Self::Yuv420p | Self::Nv12 => (2, 2),
            Self::Yuv422p => (2, 1),
            _ => (1, 1),
        }
    }

    /// Compute the layout of every plane for the given dimensions.
    pub fn plane_layouts(&self, width: u32, height: u32) -> Vec<PlaneLayout> {
        let (w, h) = (width as usize, height as usize);
        let (hsub, vsub) = self.chroma_subsampling();
        let chroma_w = w.div_ceil(hsub);
        let chroma_h = h.div_ceil(vsub);

        let rows: Vec<(usize, usize)> = match self {
            Self::Yuv420p | Self::Yuv422p | Self::Yuv444p => {
                vec![(w, h), (chroma_w, chroma_h), (chroma_w, chroma_h)]
            }
            Self::Nv12 => vec![(w, h), (chroma_w * 2, chroma_h)],
            Self::Rgb24 => vec![(w * 3, h)],
            Self::Rgba => vec![(w * 4, h)],
            Self::Gray8 => vec![(w, h)],
        };

        let mut offset = 0;
        rows.into_iter()
            .map(|(row_bytes, rows)| {
                let stride = (row_bytes + STRIDE_ALIGN - 1) & !(STRIDE_ALIGN - 1);
                let layout = PlaneLayout {
                    offset,
                    stride,
                    row_bytes,
                    rows,
                };
                offset += layout.size();
                layout
            })
            .collect()
    }

    /// Bytes needed to hold a whole picture.
    pub fn buffer_size(&self, width: u32, height: u32) -> usize {
        self.plane_layouts(width, height)
            .iter()
            .map(PlaneLayout::size)
            .sum()
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Yuv420p => write!(f, "yuv420p"),
            Self::Yuv422p => write!(f, "yuv422p"),
            Self::Yuv444p => write!(f, "yuv444p"),
            Self::Nv12 => write!(f, "nv12"),
            Self::Rgb24 => write!(f, "rgb24"),
            Self::Rgba => write!(f, "rgba"),
            Self::Gray8 => write!(f, "gray8"),
        }
    }
}

/// A decoded video picture.
#[derive(Clone)]
pub struct Picture {
    format: PixelFormat,
    width: u32,
    height: u32,
    buffer: Buffer,
    pts: i64,
    time_base: TimeBase,
    key: bool,
    quality: i32,
    complete: bool,
}

impl Picture {
    /// Allocate a zeroed picture.
    pub fn new(format: PixelFormat, width: u32, height: u32) -> Result<Self> {
        check_dimensions(width, height)?;
        let buffer = Buffer::allocate(format.buffer_size(width, height))?;
        Ok(Self::with_buffer(format, width, height, buffer))
    }

    /// Build a picture over an existing buffer without copying.
    pub fn from_buffer(
        format: PixelFormat,
        width: u32,
        height: u32,
        buffer: Buffer,
    ) -> Result<Self> {
        check_dimensions(width, height)?;
        let needed = format.buffer_size(width, height);
        if buffer.len() < needed {
            return Err(Error::invalid_arg(format!(
                "{format} {width}x{height} needs {needed} bytes, buffer has {}",
                buffer.len()
            )));
        }
        Ok(Self::with_buffer(format, width, height, buffer))
    }

    fn with_buffer(format: PixelFormat, width: u32, height: u32, buffer: Buffer) -> Self {
        Self {
            format,
            width,
            height,
            buffer,
            pts: NO_PTS,
            time_base: TimeBase::MICROSECONDS,
            key: false,
            quality: 0,
            complete: false,
        }
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// The buffer holding all planes.
    pub fn buffer(&self) -> &Buffer {
        &self.buffer
    }

    /// Total bytes of picture data.
    pub fn size(&self) -> usize {
        self.format.buffer_size(self.width, self.height)
    }

    /// All plane bytes, in plane order.
    pub fn data(&self) -> &[u8] {
        &self.buffer.data()[..self.size()]
    }

    /// Mutable access to all plane bytes; fails while the buffer is shared.
    pub fn data_mut(&mut self) -> Result<&mut [u8]> {
        let size = self.size();
        Ok(&mut self.buffer.data_mut()?[..size])
    }

    pub fn num_planes(&self) -> usize {
        self.format.num_planes()
    }

    pub fn plane_layout(&self, index: usize) -> Option<PlaneLayout> {
        self.format
            .plane_layouts(self.width, self.height)
            .get(index)
            .copied()
    }

    /// Get a plane's data.
    pub fn plane(&self, index: usize) -> Option<&[u8]> {
        let layout = self.plane_layout(index)?;
        Some(&self.buffer.data()[layout.offset..layout.offset + layout.size()])
    }

    /// Get a mutable reference to a plane's data.
    pub fn plane_mut(&mut self, index: usize) -> Result<&mut [u8]> {
        let layout = self
            .plane_layout(index)
            .ok_or_else(|| Error::invalid_arg(format!("{} has no plane {index}", self.format)))?;
        Ok(&mut self.buffer.data_mut()?[layout.offset..layout.offset + layout.size()])
    }

    /// Get the stride (bytes per row) for a plane.
    pub fn stride(&self, plane: usize) -> usize {
        self.plane_layout(plane).map(|l| l.stride).unwrap_or(0)
    }

    /// Presentation timestamp in [`Picture::time_base`], `NO_PTS` if unknown.
    pub fn pts(&self) -> i64 {
        self.pts
    }

    pub fn set_pts(&mut self, pts: i64) {
        self.pts = pts;
    }

    pub fn time_base(&self) -> TimeBase {
        self.time_base
    }

    pub fn set_time_base(&mut self, time_base: TimeBase) {
        self.time_base = time_base;
    }

    /// Presentation timestamp converted to `target`.
    pub fn pts_in(&self, target: TimeBase) -> i64 {
        self.time_base.rescale(self.pts, target)
    }

    pub fn is_key(&self) -> bool {
        self.key
    }

    pub fn set_key(&mut self, key: bool) {
        self.key = key;
    }

    /// Encoder quality hint; 0 means unset.
    pub fn quality(&self) -> i32 {
        self.quality
    }

    pub fn set_quality(&mut self, quality: i32) {
        self.quality = quality;
    }

    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Mark the picture as holding a whole frame stamped at `pts`.
    pub fn set_complete(&mut self, complete: bool, pts: i64) {
        self.complete = complete;
        if complete {
            self.pts = pts;
        }
    }
}

impl fmt::Debug for Picture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Picture")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("format", &self.format)
            .field("pts", &self.pts)
            .field("time_base", &self.time_base)
            .field("key", &self.key)
            .field("complete", &self.complete)
            .finish()
    }
}

fn check_dimensions(width: u32, height: u32) -> Result<()> {
    if width == 0 || height == 0 {
        return Err(Error::invalid_arg(format!(
            "picture dimensions must be positive, got {width}x{height}"
        )));
    }
    Ok(())
}
