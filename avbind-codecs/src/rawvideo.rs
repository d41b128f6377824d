//! Raw video pass-through engine.
//!
//! Pictures become packets byte for byte. With `max_b_frames` set, the engine
//! holds pictures back and emits them in a B-frame style decode order, so
//! the coder's timestamp reconstruction can be exercised without a real
//! video codec.

use crate::traits::{
    CodecConfig, CodecDescriptor, CodecEngine, DecodeStep, DecodedFrame, EncodeInput,
    EncodedUnit, EngineCaps, RawUnit,
};
use avbind_core::{
    Buffer, CodecError, CodecId, Error, Picture, PixelFormat, Result, TimeBase, NO_PTS,
};
use std::collections::VecDeque;

/// Which timestamps the engine reports on encoded units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimestampReport {
    #[default]
    Both,
    PtsOnly,
    DtsOnly,
}

#[derive(Debug)]
struct Queued {
    data: Buffer,
    pts: i64,
    key: bool,
}

#[derive(Debug)]
struct Geometry {
    format: PixelFormat,
    width: u32,
    height: u32,
}

/// Uncompressed video engine.
#[derive(Debug, Default)]
pub struct RawVideoEngine {
    report: TimestampReport,
    geometry: Option<Geometry>,
    time_base: TimeBase,
    time_base_ticks: i64,
    delay: usize,
    gop_size: u64,
    submitted: u64,
    emitted: i64,
    first_pts: i64,
    group: Vec<Queued>,
    out: VecDeque<Queued>,
}

impl RawVideoEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an engine that only reports some timestamps.
    pub fn with_report(report: TimestampReport) -> Self {
        Self {
            report,
            ..Self::default()
        }
    }

    fn geometry(&self) -> Result<&Geometry> {
        self.geometry
            .as_ref()
            .ok_or_else(|| Error::invalid_state("raw video engine is not open"))
    }

    fn submit(&mut self, picture: &Picture, pts: i64) -> Result<()> {
        let geometry = self.geometry()?;
        if picture.format() != geometry.format
            || picture.width() != geometry.width
            || picture.height() != geometry.height
        {
            return Err(Error::invalid_arg(format!(
                "picture is {} {}x{}, engine expects {} {}x{}",
                picture.format(),
                picture.width(),
                picture.height(),
                geometry.format,
                geometry.width,
                geometry.height
            )));
        }

        let data = if picture.buffer().len() == picture.size() {
            picture.buffer().clone()
        } else {
            Buffer::from_vec(picture.data().to_vec())
        };
        let key = match self.gop_size {
            0 => self.submitted == 0,
            gop => self.submitted % gop == 0,
        };
        let frame = Queued { data, pts, key };

        if self.submitted == 0 {
            self.first_pts = if pts == NO_PTS { 0 } else { pts };
        }
        if self.submitted == 0 || self.delay == 0 {
            self.out.push_back(frame);
        } else {
            self.group.push(frame);
            if self.group.len() == self.delay + 1 {
                // Anchor goes first, then the frames that reference it.
                if let Some(anchor) = self.group.pop() {
                    self.out.push_back(anchor);
                }
                self.out.extend(self.group.drain(..));
            }
        }
        self.submitted += 1;
        Ok(())
    }

    fn emit(&mut self) -> Option<EncodedUnit> {
        let frame = self.out.pop_front()?;
        let dts = if self.delay == 0 {
            frame.pts
        } else {
            self.first_pts
                .saturating_add((self.emitted - self.delay as i64) * self.time_base_ticks)
        };
        self.emitted += 1;
        let (pts, dts) = match self.report {
            TimestampReport::Both => (frame.pts, dts),
            TimestampReport::PtsOnly => (frame.pts, NO_PTS),
            TimestampReport::DtsOnly => (NO_PTS, dts),
        };
        Some(EncodedUnit {
            data: frame.data,
            pts,
            dts,
            duration: self.time_base_ticks,
            key: frame.key,
        })
    }
}

impl CodecEngine for RawVideoEngine {
    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor {
            id: CodecId::RawVideo,
            name: "rawvideo",
            long_name: "raw video pass-through",
            can_encode: true,
            can_decode: true,
        }
    }

    fn open(&mut self, config: &CodecConfig) -> Result<EngineCaps> {
        let format = config
            .pixel_format
            .ok_or_else(|| Error::invalid_config("raw video needs a pixel format"))?;
        if config.width == 0 || config.height == 0 {
            return Err(Error::invalid_config("raw video needs width and height"));
        }
        let delay = config.options.get_int("max_b_frames")?;
        self.delay = usize::try_from(delay).unwrap_or(0);
        self.geometry = Some(Geometry {
            format,
            width: config.width,
            height: config.height,
        });
        self.time_base = config.time_base;
        self.time_base_ticks = config.frame_duration();
        self.gop_size = config.gop_size as u64;
        self.submitted = 0;
        self.emitted = 0;
        self.first_pts = 0;
        Ok(EngineCaps {
            frame_size: None,
            reorder_delay: self.delay,
            extra_data: None,
        })
    }

    fn decode(&mut self, unit: &RawUnit<'_>) -> Result<DecodeStep> {
        let geometry = self.geometry()?;
        if unit.data.is_empty() {
            return Ok(DecodeStep {
                consumed: 0,
                output: None,
            });
        }
        let size = geometry.format.buffer_size(geometry.width, geometry.height);
        if unit.data.len() < size {
            return Err(CodecError::DecodeFailed(format!(
                "raw picture needs {size} bytes, got {}",
                unit.data.len()
            ))
            .into());
        }
        let buffer = Buffer::from_vec(unit.data[..size].to_vec());
        let mut picture =
            Picture::from_buffer(geometry.format, geometry.width, geometry.height, buffer)?;
        picture.set_time_base(self.time_base);
        picture.set_key(unit.key);
        picture.set_complete(true, unit.pts);
        Ok(DecodeStep {
            consumed: size,
            output: Some(DecodedFrame::Picture(picture)),
        })
    }

    fn encode(&mut self, input: EncodeInput<'_>) -> Result<Option<EncodedUnit>> {
        match input {
            EncodeInput::Picture { picture, pts } => {
                self.submit(picture, pts)?;
                Ok(self.emit())
            }
            EncodeInput::Flush => {
                if self.out.is_empty() && !self.group.is_empty() {
                    self.out.extend(self.group.drain(..));
                }
                Ok(self.emit())
            }
            EncodeInput::Samples { .. } => Err(CodecError::WrongMediaType(
                "raw video cannot encode samples".into(),
            )
            .into()),
        }
    }

    fn close(&mut self) {
        self.geometry = None;
        self.group.clear();
        self.out.clear();
        self.submitted = 0;
        self.emitted = 0;
    }
}
