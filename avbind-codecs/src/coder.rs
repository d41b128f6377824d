//! Per-stream encoder/decoder.
//!
//! A [`StreamCoder`] wraps one [`CodecEngine`] and owns everything around it:
//! parameter validation, the open/closed lifecycle, audio reassembly into
//! codec-sized frames, and timestamp reconciliation between the caller, the
//! engine and the stream the coder is bound to.
//!
//! ## Timestamps
//!
//! The engine works in the coder time base. Pictures and sample blocks cross
//! the public API in whatever time base they carry (microseconds by default)
//! and packets leave in the bound stream's time base, or the coder time base
//! when unbound.
//!
//! In auto-stamp mode (the default) every encoded packet is patched so that
//! pts is strictly increasing for engines without reordering, and dts is
//! strictly increasing and never above pts for engines that reorder.

use crate::audio_fifo::{AudioChunk, AudioFifo};
use crate::options::{OptionSet, OptionValue};
use crate::registry::CodecRegistry;
use crate::reorder::{PendingPts, PtsRing};
use crate::traits::{
    CodecConfig, CodecEngine, CoderFlags, DecodedFrame, EncodeInput, EncodedUnit, EngineCaps,
    RawUnit,
};
use avbind_core::{
    AudioSamples, CodecError, CodecId, Direction, Error, MediaType, Packet, Picture,
    PixelFormat, Rational, Result, SampleFormat, TimeBase, NO_PTS,
};
use std::fmt;
use tracing::{debug, trace, warn};

/// Samples per encoded audio frame when the engine does not fix one.
pub const DEFAULT_AUDIO_FRAME_SIZE: usize = 576;

/// Lifecycle of a coder.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CoderState {
    /// Accepting parameter changes.
    Configuring,
    /// Engine is open; parameters are frozen.
    Open,
    /// Closed after use; any setter moves back to `Configuring`.
    Closed,
}

/// Stream a coder stamps its packets for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamLink {
    pub index: i32,
    pub time_base: TimeBase,
}

/// Result of one decode call.
#[derive(Debug, Clone)]
pub struct Decoded<T> {
    /// Bytes of the packet consumed, starting at the given offset.
    pub consumed: usize,
    pub frame: Option<T>,
}

#[derive(Debug, Clone)]
struct CoderParams {
    bit_rate: u64,
    bit_rate_tolerance: u64,
    global_quality: i32,
    flags: CoderFlags,
    codec_tag: u32,
    extra_data: Option<Vec<u8>>,
    width: u32,
    height: u32,
    pixel_format: Option<PixelFormat>,
    frame_rate: Option<Rational>,
    gop_size: u32,
    sample_rate: u32,
    channels: u32,
    sample_format: Option<SampleFormat>,
    time_base: Option<TimeBase>,
    default_audio_frame_size: usize,
    auto_stamp: bool,
}

impl Default for CoderParams {
    fn default() -> Self {
        Self {
            bit_rate: 0,
            bit_rate_tolerance: 0,
            global_quality: 0,
            flags: CoderFlags::empty(),
            codec_tag: 0,
            extra_data: None,
            width: 0,
            height: 0,
            pixel_format: None,
            frame_rate: None,
            gop_size: 12,
            sample_rate: 0,
            channels: 0,
            sample_format: None,
            time_base: None,
            default_audio_frame_size: DEFAULT_AUDIO_FRAME_SIZE,
            auto_stamp: true,
        }
    }
}

/// Bookkeeping that only exists while the coder is open.
#[derive(Debug)]
struct Session {
    time_base: TimeBase,
    caps: EngineCaps,
    frame_duration: i64,
    sample_rate: u32,
    next_predicted_pts: i64,
    next_input_pts: i64,
    last_pts: i64,
    last_dts: i64,
    pending: PendingPts,
    ring: PtsRing,
    fifo: Option<AudioFifo>,
    flushed: bool,
}

#[derive(Debug, Default, Clone, Copy)]
struct Patch {
    dropped: bool,
    violation: bool,
}

impl Session {
    fn samples_duration(&self, samples: usize) -> i64 {
        match TimeBase::from_sample_rate(self.sample_rate) {
            Ok(sample_tb) => sample_tb.rescale(samples as i64, self.time_base),
            Err(_) => 0,
        }
    }

    fn predicted_or_zero(&self) -> i64 {
        if self.next_predicted_pts == NO_PTS {
            0
        } else {
            self.next_predicted_pts
        }
    }

    fn note_submitted(&mut self, pts: i64) {
        if self.next_predicted_pts == NO_PTS {
            self.next_predicted_pts = pts;
        }
        if let Some(evicted) = self.pending.push(pts) {
            trace!(evicted, "reorder window full, forgetting oldest pts");
        }
    }

    /// Reconcile the timestamps an engine reported for one output unit.
    fn patch(&mut self, pts: i64, dts: i64, duration: i64) -> (i64, i64, Patch) {
        let delay = self.caps.reorder_delay;
        let mut patch = Patch::default();

        let recovered = if pts != NO_PTS {
            self.pending.take(pts);
            Some(pts)
        } else {
            let by_dts = if dts != NO_PTS { self.pending.take(dts) } else { None };
            by_dts.or_else(|| {
                if delay == 0 {
                    self.pending.take_oldest()
                } else {
                    None
                }
            })
        };
        let mut pts = match recovered {
            Some(pts) => pts,
            None => {
                patch.dropped = true;
                self.predicted_or_zero()
            }
        };

        let mut dts = if dts != NO_PTS {
            dts
        } else if delay == 0 {
            pts
        } else {
            self.ring.next_dts(pts, duration)
        };

        if delay == 0 {
            if self.last_pts != NO_PTS && pts <= self.last_pts {
                pts = self.predicted_or_zero().max(self.last_pts + 1);
                patch.violation = true;
            }
            if dts > pts || (self.last_dts != NO_PTS && dts <= self.last_dts) {
                dts = pts;
            }
        } else if self.last_dts != NO_PTS && dts <= self.last_dts {
            dts = self.last_dts + 1;
            patch.violation = true;
        }

        self.last_pts = if self.last_pts == NO_PTS {
            pts
        } else {
            self.last_pts.max(pts)
        };
        self.last_dts = dts;
        self.next_predicted_pts = if delay == 0 {
            pts.saturating_add(duration)
        } else {
            self.predicted_or_zero().saturating_add(duration)
        };
        (pts, dts, patch)
    }
}

/// Encoder or decoder for one stream.
pub struct StreamCoder {
    direction: Direction,
    media_type: MediaType,
    codec: Option<CodecId>,
    engine: Option<Box<dyn CodecEngine>>,
    state: CoderState,
    params: CoderParams,
    options: OptionSet,
    link: Option<StreamLink>,
    session: Option<Session>,
    dropped_frames: u64,
    monotonicity_violations: u64,
}

impl StreamCoder {
    /// Create a coder with no engine bound.
    pub fn new(direction: Direction, media_type: MediaType) -> Self {
        Self {
            direction,
            media_type,
            codec: None,
            engine: None,
            state: CoderState::Configuring,
            params: CoderParams::default(),
            options: OptionSet::for_media_type(media_type),
            link: None,
            session: None,
            dropped_frames: 0,
            monotonicity_violations: 0,
        }
    }

    /// Create a coder around an engine.
    pub fn with_engine(direction: Direction, engine: Box<dyn CodecEngine>) -> Self {
        let descriptor = engine.descriptor();
        let mut coder = Self::new(direction, descriptor.media_type());
        coder.codec = Some(descriptor.id);
        coder.engine = Some(engine);
        coder
    }

    /// Create a coder with the same parameters and codec as `template`.
    ///
    /// The new coder gets a fresh engine from `registry`, starts out
    /// configuring, and is not bound to any stream.
    pub fn from_template(
        template: &StreamCoder,
        direction: Direction,
        registry: &CodecRegistry,
    ) -> Result<Self> {
        let mut coder = Self::new(direction, template.media_type);
        coder.params = template.params.clone();
        coder.options = template.options.clone();
        if let Some(id) = template.codec {
            coder.engine = Some(registry.create(id)?);
            coder.codec = Some(id);
        }
        Ok(coder)
    }

    fn ensure_configurable(&mut self) -> Result<()> {
        match self.state {
            CoderState::Open => Err(Error::invalid_state("cannot reconfigure an open coder")),
            CoderState::Closed => {
                self.state = CoderState::Configuring;
                Ok(())
            }
            CoderState::Configuring => Ok(()),
        }
    }

    /// Pick the engine for `id` from `registry`.
    pub fn set_codec(&mut self, registry: &CodecRegistry, id: CodecId) -> Result<()> {
        self.ensure_configurable()?;
        let engine = registry.create(id)?;
        self.set_engine(engine)
    }

    /// Bind an engine directly.
    pub fn set_engine(&mut self, engine: Box<dyn CodecEngine>) -> Result<()> {
        self.ensure_configurable()?;
        let descriptor = engine.descriptor();
        let media_type = descriptor.media_type();
        if self.media_type != media_type {
            if self.media_type != MediaType::Unknown {
                return Err(CodecError::WrongMediaType(format!(
                    "{} is a {media_type:?} codec, coder is {:?}",
                    descriptor.name, self.media_type
                ))
                .into());
            }
            self.media_type = media_type;
            self.options = OptionSet::for_media_type(media_type);
        }
        self.codec = Some(descriptor.id);
        self.engine = Some(engine);
        Ok(())
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn media_type(&self) -> MediaType {
        self.media_type
    }

    pub fn codec_id(&self) -> Option<CodecId> {
        self.codec
    }

    pub fn state(&self) -> CoderState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.state == CoderState::Open
    }

    /// Stamp packets for `index`, rescaling them to `time_base`.
    pub fn bind_stream(&mut self, index: i32, time_base: TimeBase) {
        self.link = Some(StreamLink { index, time_base });
    }

    pub fn unbind_stream(&mut self) {
        self.link = None;
    }

    pub fn stream_link(&self) -> Option<StreamLink> {
        self.link
    }

    // Parameters

    pub fn bit_rate(&self) -> u64 {
        self.params.bit_rate
    }

    pub fn set_bit_rate(&mut self, bit_rate: u64) -> Result<()> {
        self.ensure_configurable()?;
        self.params.bit_rate = bit_rate;
        Ok(())
    }

    pub fn bit_rate_tolerance(&self) -> u64 {
        self.params.bit_rate_tolerance
    }

    pub fn set_bit_rate_tolerance(&mut self, tolerance: u64) -> Result<()> {
        self.ensure_configurable()?;
        self.params.bit_rate_tolerance = tolerance;
        Ok(())
    }

    pub fn global_quality(&self) -> i32 {
        self.params.global_quality
    }

    pub fn set_global_quality(&mut self, quality: i32) -> Result<()> {
        self.ensure_configurable()?;
        self.params.global_quality = quality;
        Ok(())
    }

    pub fn flags(&self) -> CoderFlags {
        self.params.flags
    }

    pub fn set_flags(&mut self, flags: CoderFlags) -> Result<()> {
        self.ensure_configurable()?;
        self.params.flags = flags;
        Ok(())
    }

    pub fn set_flag(&mut self, flag: CoderFlags, on: bool) -> Result<()> {
        self.ensure_configurable()?;
        self.params.flags.set(flag, on);
        Ok(())
    }

    /// Codec tag, falling back to the codec's conventional tag.
    pub fn codec_tag(&self) -> u32 {
        match (self.params.codec_tag, self.codec) {
            (0, Some(id)) => id.default_tag(),
            (tag, _) => tag,
        }
    }

    pub fn set_codec_tag(&mut self, tag: u32) -> Result<()> {
        self.ensure_configurable()?;
        self.params.codec_tag = tag;
        Ok(())
    }

    /// Codec extra data, including any the engine produced at open.
    pub fn extra_data(&self) -> Option<&[u8]> {
        self.params.extra_data.as_deref()
    }

    pub fn set_extra_data(&mut self, data: Option<Vec<u8>>) -> Result<()> {
        self.ensure_configurable()?;
        self.params.extra_data = data;
        Ok(())
    }

    pub fn width(&self) -> u32 {
        self.params.width
    }

    pub fn set_width(&mut self, width: u32) -> Result<()> {
        self.ensure_configurable()?;
        self.params.width = width;
        Ok(())
    }

    pub fn height(&self) -> u32 {
        self.params.height
    }

    pub fn set_height(&mut self, height: u32) -> Result<()> {
        self.ensure_configurable()?;
        self.params.height = height;
        Ok(())
    }

    pub fn pixel_format(&self) -> Option<PixelFormat> {
        self.params.pixel_format
    }

    pub fn set_pixel_format(&mut self, format: PixelFormat) -> Result<()> {
        self.ensure_configurable()?;
        self.params.pixel_format = Some(format);
        Ok(())
    }

    pub fn frame_rate(&self) -> Option<Rational> {
        self.params.frame_rate
    }

    pub fn set_frame_rate(&mut self, rate: Rational) -> Result<()> {
        if !rate.is_positive() {
            return Err(Error::invalid_arg(format!("frame rate {rate} must be positive")));
        }
        self.ensure_configurable()?;
        self.params.frame_rate = Some(rate);
        Ok(())
    }

    pub fn gop_size(&self) -> u32 {
        self.params.gop_size
    }

    pub fn set_gop_size(&mut self, gop_size: u32) -> Result<()> {
        self.ensure_configurable()?;
        self.params.gop_size = gop_size;
        Ok(())
    }

    pub fn sample_rate(&self) -> u32 {
        self.params.sample_rate
    }

    pub fn set_sample_rate(&mut self, rate: u32) -> Result<()> {
        self.ensure_configurable()?;
        self.params.sample_rate = rate;
        Ok(())
    }

    pub fn channels(&self) -> u32 {
        self.params.channels
    }

    pub fn set_channels(&mut self, channels: u32) -> Result<()> {
        self.ensure_configurable()?;
        self.params.channels = channels;
        Ok(())
    }

    pub fn sample_format(&self) -> Option<SampleFormat> {
        self.params.sample_format
    }

    pub fn set_sample_format(&mut self, format: SampleFormat) -> Result<()> {
        self.ensure_configurable()?;
        self.params.sample_format = Some(format);
        Ok(())
    }

    /// Coder time base: the resolved one while open, else the configured one.
    pub fn time_base(&self) -> Option<TimeBase> {
        match &self.session {
            Some(session) => Some(session.time_base),
            None => self.params.time_base,
        }
    }

    pub fn set_time_base(&mut self, time_base: TimeBase) -> Result<()> {
        self.ensure_configurable()?;
        self.params.time_base = Some(time_base);
        Ok(())
    }

    pub fn default_audio_frame_size(&self) -> usize {
        self.params.default_audio_frame_size
    }

    pub fn set_default_audio_frame_size(&mut self, samples: usize) -> Result<()> {
        if samples == 0 {
            return Err(Error::invalid_arg("audio frame size must be positive"));
        }
        self.ensure_configurable()?;
        self.params.default_audio_frame_size = samples;
        Ok(())
    }

    /// Samples per encoded audio frame: the engine's if it fixes one.
    pub fn audio_frame_size(&self) -> usize {
        self.session
            .as_ref()
            .and_then(|session| session.caps.frame_size)
            .unwrap_or(self.params.default_audio_frame_size)
    }

    pub fn automatically_stamp_packets(&self) -> bool {
        self.params.auto_stamp
    }

    /// Choose between auto-stamp (patch timestamps) and caller-stamp mode.
    pub fn set_automatically_stamp_packets(&mut self, on: bool) -> Result<()> {
        self.ensure_configurable()?;
        self.params.auto_stamp = on;
        Ok(())
    }

    pub fn options(&self) -> &OptionSet {
        &self.options
    }

    pub fn option(&self, name: &str) -> Result<OptionValue> {
        self.options.get(name)
    }

    pub fn set_option(&mut self, name: &str, value: impl Into<OptionValue>) -> Result<()> {
        self.ensure_configurable()?;
        self.options.set(name, value)
    }

    pub fn set_option_str(&mut self, name: &str, text: &str) -> Result<()> {
        self.ensure_configurable()?;
        self.options.set_str(name, text)
    }

    // Bookkeeping

    /// Predicted pts of the next unit in coder ticks, `NO_PTS` when closed.
    pub fn next_predicted_pts(&self) -> i64 {
        self.session
            .as_ref()
            .map_or(NO_PTS, |session| session.next_predicted_pts)
    }

    /// Last timestamp observed on this coder's output, in coder ticks.
    pub fn last_pts(&self) -> i64 {
        self.session.as_ref().map_or(NO_PTS, |session| session.last_pts)
    }

    /// Outputs whose pts could not be recovered and were predicted instead.
    pub fn num_dropped_frames(&self) -> u64 {
        self.dropped_frames
    }

    /// Outputs whose timestamps had to be pushed forward.
    pub fn monotonicity_violations(&self) -> u64 {
        self.monotonicity_violations
    }

    pub fn reorder_delay(&self) -> usize {
        self.session
            .as_ref()
            .map_or(0, |session| session.caps.reorder_delay)
    }

    // Lifecycle

    fn validate(&self) -> Result<()> {
        match self.media_type {
            MediaType::Video => {
                if self.params.pixel_format.is_none() {
                    return Err(Error::invalid_config("video coder needs a pixel format"));
                }
                if self.params.width == 0 || self.params.height == 0 {
                    return Err(Error::invalid_config(format!(
                        "video coder needs a size, got {}x{}",
                        self.params.width, self.params.height
                    )));
                }
                if self.direction == Direction::Outbound
                    && self.params.time_base.is_none()
                    && self.params.frame_rate.is_none()
                {
                    return Err(Error::invalid_config(
                        "video encoder needs a time base or frame rate",
                    ));
                }
            }
            MediaType::Audio => {
                if self.params.sample_rate == 0 {
                    return Err(Error::invalid_config("audio coder needs a sample rate"));
                }
                if self.params.channels == 0 {
                    return Err(Error::invalid_config("audio coder needs a channel count"));
                }
                if self.params.sample_format.is_none() {
                    return Err(Error::invalid_config("audio coder needs a sample format"));
                }
            }
            other => {
                return Err(Error::invalid_config(format!(
                    "cannot open a coder for {other:?} media"
                )));
            }
        }
        Ok(())
    }

    fn resolve_time_base(&self) -> TimeBase {
        if let Some(time_base) = self.params.time_base {
            return time_base;
        }
        let derived = match self.media_type {
            MediaType::Video => self
                .params
                .frame_rate
                .and_then(|rate| TimeBase::from_frame_rate(rate).ok()),
            MediaType::Audio => TimeBase::from_sample_rate(self.params.sample_rate).ok(),
            _ => None,
        };
        derived
            .or(self.link.map(|link| link.time_base))
            .unwrap_or(TimeBase::MICROSECONDS)
    }

    fn build_config(&self, id: CodecId, time_base: TimeBase) -> CodecConfig {
        CodecConfig {
            id,
            direction: self.direction,
            time_base,
            bit_rate: self.params.bit_rate,
            bit_rate_tolerance: self.params.bit_rate_tolerance,
            global_quality: self.params.global_quality,
            flags: self.params.flags,
            codec_tag: self.codec_tag(),
            extra_data: self.params.extra_data.clone(),
            width: self.params.width,
            height: self.params.height,
            pixel_format: self.params.pixel_format,
            frame_rate: self.params.frame_rate,
            gop_size: self.params.gop_size,
            sample_rate: self.params.sample_rate,
            channels: self.params.channels,
            sample_format: self.params.sample_format,
            options: self.options.clone(),
        }
    }

    /// Validate parameters and open the engine.
    ///
    /// On failure the coder is left as it was.
    pub fn open(&mut self) -> Result<()> {
        match self.state {
            CoderState::Open => return Err(Error::invalid_state("coder is already open")),
            CoderState::Closed => {
                return Err(Error::invalid_state(
                    "coder was closed; reconfigure before reopening",
                ))
            }
            CoderState::Configuring => {}
        }
        let descriptor = self
            .engine
            .as_ref()
            .map(|engine| engine.descriptor())
            .ok_or(CodecError::NoEngine)?;
        if !descriptor.supports(self.direction) {
            return Err(CodecError::WrongDirection(format!(
                "{} cannot be opened {:?}",
                descriptor.name, self.direction
            ))
            .into());
        }
        self.validate()?;

        let time_base = self.resolve_time_base();
        let config = self.build_config(descriptor.id, time_base);
        let caps = self
            .engine
            .as_mut()
            .ok_or(CodecError::NoEngine)?
            .open(&config)?;

        if caps.extra_data.is_some() {
            self.params.extra_data = caps.extra_data.clone();
        }
        let fifo = (self.media_type == MediaType::Audio && self.direction == Direction::Outbound)
            .then(|| {
                let bytes_per_frame = self.params.channels as usize
                    * self
                        .params
                        .sample_format
                        .map_or(1, |format| format.bytes_per_sample());
                AudioFifo::new(bytes_per_frame, self.params.sample_rate, time_base)
            });
        let delay = caps.reorder_delay;
        self.session = Some(Session {
            time_base,
            frame_duration: config.frame_duration(),
            sample_rate: self.params.sample_rate,
            next_predicted_pts: NO_PTS,
            next_input_pts: 0,
            last_pts: NO_PTS,
            last_dts: NO_PTS,
            pending: PendingPts::new(delay),
            ring: PtsRing::new(delay),
            fifo,
            flushed: false,
            caps,
        });
        self.dropped_frames = 0;
        self.monotonicity_violations = 0;
        self.state = CoderState::Open;
        debug!(
            codec = descriptor.name,
            direction = ?self.direction,
            time_base = %time_base,
            reorder_delay = delay,
            "opened stream coder"
        );
        Ok(())
    }

    /// Close the engine and drop all coding state. A no-op unless open.
    pub fn close(&mut self) -> Result<()> {
        if self.state != CoderState::Open {
            return Ok(());
        }
        if let Some(session) = &self.session {
            if session.fifo.as_ref().is_some_and(|fifo| !fifo.is_empty()) {
                warn!("closing audio encoder with unflushed samples");
            }
        }
        if let Some(engine) = self.engine.as_mut() {
            engine.close();
        }
        self.session = None;
        self.state = CoderState::Closed;
        debug!(
            dropped_frames = self.dropped_frames,
            monotonicity_violations = self.monotonicity_violations,
            "closed stream coder"
        );
        Ok(())
    }

    fn check_ready(&self, direction: Direction, media_type: MediaType) -> Result<()> {
        if self.state != CoderState::Open {
            return Err(Error::invalid_state("coder is not open"));
        }
        if self.direction != direction {
            return Err(CodecError::WrongDirection(format!(
                "coder is {:?}, operation needs {direction:?}",
                self.direction
            ))
            .into());
        }
        if self.media_type != media_type {
            return Err(CodecError::WrongMediaType(format!(
                "coder is {:?}, operation needs {media_type:?}",
                self.media_type
            ))
            .into());
        }
        Ok(())
    }

    fn parts(&mut self) -> Result<(&mut Box<dyn CodecEngine>, &mut Session)> {
        match (self.engine.as_mut(), self.session.as_mut()) {
            (Some(engine), Some(session)) => Ok((engine, session)),
            _ => Err(Error::invalid_state("coder is not open")),
        }
    }

    // Decoding

    fn decode_step(
        &mut self,
        packet: &Packet,
        offset: usize,
    ) -> Result<(usize, Option<DecodedFrame>)> {
        let data = packet.data();
        if offset > data.len() {
            return Err(Error::invalid_arg(format!(
                "offset {offset} is past the {}-byte packet",
                data.len()
            )));
        }
        let (engine, session) = self.parts()?;
        let (pts, dts) = if offset == 0 {
            let packet_tb = packet.time_base();
            (
                packet_tb.rescale(packet.pts(), session.time_base),
                packet_tb.rescale(packet.dts(), session.time_base),
            )
        } else {
            (NO_PTS, NO_PTS)
        };
        let unit = RawUnit {
            data: &data[offset..],
            pts,
            dts,
            key: packet.is_key(),
        };
        let step = engine.decode(&unit)?;
        if step.consumed > unit.data.len() {
            return Err(Error::unrecoverable(format!(
                "decoder consumed {} of {} bytes",
                step.consumed,
                unit.data.len()
            )));
        }
        let fallback = if pts != NO_PTS { pts } else { dts };
        let output = step
            .output
            .map(|frame| session.stamp_decoded(frame, fallback));
        Ok((step.consumed, output))
    }

    /// Decode from `offset` into `packet`, producing at most one picture.
    pub fn decode_video(&mut self, packet: &Packet, offset: usize) -> Result<Decoded<Picture>> {
        self.check_ready(Direction::Inbound, MediaType::Video)?;
        let (consumed, output) = self.decode_step(packet, offset)?;
        let frame = match output {
            Some(DecodedFrame::Picture(picture)) => Some(picture),
            Some(DecodedFrame::Samples(_)) => {
                return Err(CodecError::WrongMediaType("video engine produced audio".into()).into())
            }
            None => None,
        };
        Ok(Decoded { consumed, frame })
    }

    /// Decode from `offset` into `packet`, producing at most one sample block.
    pub fn decode_audio(&mut self, packet: &Packet, offset: usize) -> Result<Decoded<AudioSamples>> {
        self.check_ready(Direction::Inbound, MediaType::Audio)?;
        let (consumed, output) = self.decode_step(packet, offset)?;
        let frame = match output {
            Some(DecodedFrame::Samples(samples)) => Some(samples),
            Some(DecodedFrame::Picture(_)) => {
                return Err(CodecError::WrongMediaType("audio engine produced video".into()).into())
            }
            None => None,
        };
        Ok(Decoded { consumed, frame })
    }

    /// Decode a whole packet into pictures.
    pub fn decode_video_packet(&mut self, packet: &Packet) -> Result<Vec<Picture>> {
        let mut pictures = Vec::new();
        let mut offset = 0;
        loop {
            let decoded = self.decode_video(packet, offset)?;
            offset += decoded.consumed;
            let produced = decoded.frame.is_some();
            pictures.extend(decoded.frame);
            if offset >= packet.size() {
                break;
            }
            if decoded.consumed == 0 && !produced {
                return Err(CodecError::NoProgress { offset }.into());
            }
        }
        Ok(pictures)
    }

    /// Decode a whole packet into sample blocks.
    pub fn decode_audio_packet(&mut self, packet: &Packet) -> Result<Vec<AudioSamples>> {
        let mut blocks = Vec::new();
        let mut offset = 0;
        loop {
            let decoded = self.decode_audio(packet, offset)?;
            offset += decoded.consumed;
            let produced = decoded.frame.is_some();
            blocks.extend(decoded.frame);
            if offset >= packet.size() {
                break;
            }
            if decoded.consumed == 0 && !produced {
                return Err(CodecError::NoProgress { offset }.into());
            }
        }
        Ok(blocks)
    }

    // Encoding

    /// Encode one picture, or drain one buffered packet when `picture` is
    /// `None`.
    ///
    /// Draining returns `Ok(None)` once the engine is empty, and keeps doing
    /// so on later calls.
    pub fn encode_video(&mut self, picture: Option<&Picture>) -> Result<Option<Packet>> {
        self.check_ready(Direction::Outbound, MediaType::Video)?;
        let (width, height, format) = (
            self.params.width,
            self.params.height,
            self.params.pixel_format,
        );
        let (engine, session) = self.parts()?;
        let unit = match picture {
            Some(picture) => {
                if session.flushed {
                    return Err(Error::invalid_state("encoder has already been flushed"));
                }
                if picture.width() != width
                    || picture.height() != height
                    || Some(picture.format()) != format
                {
                    return Err(Error::invalid_arg(format!(
                        "picture is {} {}x{}, coder expects {:?} {width}x{height}",
                        picture.format(),
                        picture.width(),
                        picture.height(),
                        format
                    )));
                }
                let pts = match picture.pts() {
                    NO_PTS => session.next_input_pts,
                    pts => picture.time_base().rescale(pts, session.time_base),
                };
                session.next_input_pts = pts.saturating_add(session.frame_duration);
                session.note_submitted(pts);
                engine.encode(EncodeInput::Picture { picture, pts })?
            }
            None => {
                if session.flushed {
                    return Ok(None);
                }
                let unit = engine.encode(EncodeInput::Flush)?;
                if unit.is_none() {
                    session.flushed = true;
                    debug!("video encoder drained");
                }
                unit
            }
        };
        unit.map(|unit| self.finish_packet(unit, None)).transpose()
    }

    /// Encode a block of samples, or flush everything buffered when
    /// `samples` is `None`.
    ///
    /// Samples are reassembled into frames of [`audio_frame_size`] samples;
    /// a call may therefore produce no packets or several.
    ///
    /// [`audio_frame_size`]: StreamCoder::audio_frame_size
    pub fn encode_audio(&mut self, samples: Option<&AudioSamples>) -> Result<Vec<Packet>> {
        self.check_ready(Direction::Outbound, MediaType::Audio)?;
        let frame_samples = self.audio_frame_size();
        let mut packets = Vec::new();

        match samples {
            Some(samples) => {
                self.check_samples(samples)?;
                {
                    let (_, session) = self.parts()?;
                    if session.flushed {
                        return Err(Error::invalid_state("encoder has already been flushed"));
                    }
                    let time_base = session.time_base;
                    let next_input = session.next_input_pts;
                    let fifo = session
                        .fifo
                        .as_mut()
                        .ok_or_else(|| Error::invalid_state("audio encoder has no fifo"))?;
                    let pts = match samples.pts() {
                        NO_PTS if fifo.is_empty() => next_input,
                        pts => samples.time_base().rescale(pts, time_base),
                    };
                    fifo.push(samples.data(), pts);
                    let end = fifo.next_pts();
                    let buffered = fifo.samples_available();
                    session.next_input_pts = end.saturating_add(session.samples_duration(buffered));
                }
                loop {
                    let (engine, session) = self.parts()?;
                    let Some(chunk) = session
                        .fifo
                        .as_ref()
                        .and_then(|fifo| fifo.peek_frame(frame_samples))
                    else {
                        break;
                    };
                    session.note_submitted(chunk.pts);
                    let unit = encode_chunk(engine.as_mut(), &chunk, false)?;
                    if let Some(fifo) = session.fifo.as_mut() {
                        fifo.consume(frame_samples);
                    }
                    if let Some(unit) = unit {
                        packets.push(self.finish_packet(unit, Some(frame_samples))?);
                    }
                }
            }
            None => {
                let (engine, session) = self.parts()?;
                if session.flushed {
                    return Ok(packets);
                }
                let tail = session
                    .fifo
                    .as_mut()
                    .and_then(|fifo| fifo.take_partial(frame_samples));
                if let Some(chunk) = tail {
                    session.note_submitted(chunk.pts);
                    if let Some(unit) = encode_chunk(engine.as_mut(), &chunk, true)? {
                        packets.push(self.finish_packet(unit, Some(chunk.valid_samples))?);
                    }
                }
                loop {
                    let (engine, _) = self.parts()?;
                    match engine.encode(EncodeInput::Flush)? {
                        Some(unit) => {
                            packets.push(self.finish_packet(unit, Some(frame_samples))?)
                        }
                        None => break,
                    }
                }
                let (_, session) = self.parts()?;
                session.flushed = true;
                debug!("audio encoder drained");
            }
        }
        Ok(packets)
    }

    fn check_samples(&self, samples: &AudioSamples) -> Result<()> {
        if Some(samples.format()) != self.params.sample_format
            || samples.channels() != self.params.channels
            || samples.sample_rate() != self.params.sample_rate
        {
            return Err(Error::invalid_arg(format!(
                "samples are {} x{} @ {} Hz, coder expects {:?} x{} @ {} Hz",
                samples.format(),
                samples.channels(),
                samples.sample_rate(),
                self.params.sample_format,
                self.params.channels,
                self.params.sample_rate
            )));
        }
        Ok(())
    }

    /// Turn an engine unit into a stamped packet.
    ///
    /// `samples` is the number of signal samples the unit codes; it sets the
    /// duration of audio units whose engine reported none.
    fn finish_packet(&mut self, unit: EncodedUnit, samples: Option<usize>) -> Result<Packet> {
        let auto_stamp = self.params.auto_stamp;
        let session = self
            .session
            .as_mut()
            .ok_or_else(|| Error::invalid_state("coder is not open"))?;
        let duration = if unit.duration > 0 {
            unit.duration
        } else if self.media_type == MediaType::Audio {
            samples.map_or(0, |samples| session.samples_duration(samples))
        } else {
            session.frame_duration
        };

        let (pts, dts) = if auto_stamp {
            let (pts, dts, patch) = session.patch(unit.pts, unit.dts, duration);
            if patch.dropped {
                self.dropped_frames += 1;
                warn!(pts, "encoder output had no recoverable pts, using prediction");
            }
            if patch.violation {
                self.monotonicity_violations += 1;
                warn!(
                    reported_pts = unit.pts,
                    reported_dts = unit.dts,
                    pts,
                    dts,
                    "encoder timestamps went backwards, patched"
                );
            }
            (pts, dts)
        } else {
            if unit.pts != NO_PTS {
                session.pending.take(unit.pts);
            }
            (unit.pts, unit.dts)
        };

        let mut packet = Packet::wrap(unit.data);
        packet.set_time_base(session.time_base);
        packet.set_pts(pts);
        packet.set_dts(dts);
        packet.set_duration(duration);
        packet.set_key(unit.key);
        if let Some(link) = self.link {
            packet.rescale_to(link.time_base);
            packet.set_stream_index(link.index);
        }
        trace!(
            stream = packet.stream_index(),
            pts = packet.pts(),
            dts = packet.dts(),
            size = packet.size(),
            key = packet.is_key(),
            "encoded packet"
        );
        Ok(packet)
    }
}

impl Session {
    /// Stamp a decoded frame and convert it to the microsecond API time base.
    fn stamp_decoded(&mut self, frame: DecodedFrame, fallback: i64) -> DecodedFrame {
        let time_base = self.time_base;
        let engine_pts = |pts: i64, frame_tb: TimeBase| frame_tb.rescale(pts, time_base);
        match frame {
            DecodedFrame::Picture(mut picture) => {
                let pts = self.resolve_decoded(engine_pts(picture.pts(), picture.time_base()), fallback);
                self.next_predicted_pts = pts.saturating_add(self.frame_duration);
                picture.set_pts(time_base.rescale(pts, TimeBase::MICROSECONDS));
                picture.set_time_base(TimeBase::MICROSECONDS);
                DecodedFrame::Picture(picture)
            }
            DecodedFrame::Samples(mut samples) => {
                let pts = self.resolve_decoded(engine_pts(samples.pts(), samples.time_base()), fallback);
                self.next_predicted_pts =
                    pts.saturating_add(self.samples_duration(samples.num_samples()));
                samples.set_pts(time_base.rescale(pts, TimeBase::MICROSECONDS));
                samples.set_time_base(TimeBase::MICROSECONDS);
                DecodedFrame::Samples(samples)
            }
        }
    }

    fn resolve_decoded(&mut self, engine_pts: i64, fallback: i64) -> i64 {
        let pts = if engine_pts != NO_PTS {
            engine_pts
        } else if fallback != NO_PTS {
            fallback
        } else {
            self.predicted_or_zero()
        };
        self.last_pts = pts;
        pts
    }
}

fn encode_chunk(
    engine: &mut dyn CodecEngine,
    chunk: &AudioChunk,
    final_frame: bool,
) -> Result<Option<EncodedUnit>> {
    engine.encode(EncodeInput::Samples {
        data: &chunk.data,
        valid_samples: chunk.valid_samples,
        pts: chunk.pts,
        final_frame,
    })
}

impl fmt::Debug for StreamCoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCoder")
            .field("direction", &self.direction)
            .field("media_type", &self.media_type)
            .field("codec", &self.codec)
            .field("state", &self.state)
            .field("params", &self.params)
            .field("link", &self.link)
            .field("dropped_frames", &self.dropped_frames)
            .field("monotonicity_violations", &self.monotonicity_violations)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rawvideo::{RawVideoEngine, TimestampReport};
    use crate::traits::{CodecDescriptor, DecodeStep};
    use avbind_core::{Buffer, ErrorKind};
    use std::collections::VecDeque;

    fn video_encoder(engine: Box<dyn CodecEngine>, delay: i64) -> StreamCoder {
        let mut coder = StreamCoder::with_engine(Direction::Outbound, engine);
        coder.set_pixel_format(PixelFormat::Gray8).unwrap();
        coder.set_width(4).unwrap();
        coder.set_height(2).unwrap();
        coder.set_time_base(TimeBase::new(1, 25).unwrap()).unwrap();
        coder.set_frame_rate(Rational::from_int(25)).unwrap();
        coder.set_option("max_b_frames", delay).unwrap();
        coder
    }

    fn picture(pts: i64) -> Picture {
        let mut picture = Picture::new(PixelFormat::Gray8, 4, 2).unwrap();
        picture.set_time_base(TimeBase::new(1, 25).unwrap());
        picture.set_pts(pts);
        picture
    }

    fn encode_all(coder: &mut StreamCoder, frames: i64) -> Vec<Packet> {
        let mut packets = Vec::new();
        for pts in 0..frames {
            packets.extend(coder.encode_video(Some(&picture(pts))).unwrap());
        }
        while let Some(packet) = coder.encode_video(None).unwrap() {
            packets.push(packet);
        }
        packets
    }

    /// Engine that replays scripted (pts, dts) pairs, one per input.
    struct ScriptedEngine {
        script: VecDeque<(i64, i64)>,
        delay: usize,
    }

    impl ScriptedEngine {
        fn boxed(script: &[(i64, i64)], delay: usize) -> Box<dyn CodecEngine> {
            Box::new(Self {
                script: script.iter().copied().collect(),
                delay,
            })
        }
    }

    impl CodecEngine for ScriptedEngine {
        fn descriptor(&self) -> CodecDescriptor {
            CodecDescriptor {
                id: CodecId::H264,
                name: "scripted",
                long_name: "scripted test engine",
                can_encode: true,
                can_decode: false,
            }
        }

        fn open(&mut self, _config: &CodecConfig) -> Result<EngineCaps> {
            Ok(EngineCaps {
                frame_size: None,
                reorder_delay: self.delay,
                extra_data: Some(vec![0, 0, 1]),
            })
        }

        fn decode(&mut self, _unit: &RawUnit<'_>) -> Result<DecodeStep> {
            Err(CodecError::DecodeFailed("encode only".into()).into())
        }

        fn encode(&mut self, input: EncodeInput<'_>) -> Result<Option<EncodedUnit>> {
            if matches!(input, EncodeInput::Flush) {
                return Ok(None);
            }
            Ok(self.script.pop_front().map(|(pts, dts)| EncodedUnit {
                data: Buffer::from_vec(vec![1, 2, 3]),
                pts,
                dts,
                duration: 1,
                key: true,
            }))
        }

        fn close(&mut self) {}
    }

    #[test]
    fn test_state_transitions() {
        let mut coder = video_encoder(Box::new(RawVideoEngine::new()), 0);
        assert_eq!(coder.state(), CoderState::Configuring);
        coder.open().unwrap();
        assert!(coder.is_open());
        assert_eq!(coder.open().unwrap_err().kind(), ErrorKind::InvalidState);
        assert_eq!(coder.set_width(8).unwrap_err().kind(), ErrorKind::InvalidState);

        coder.close().unwrap();
        assert_eq!(coder.state(), CoderState::Closed);
        coder.close().unwrap();
        assert_eq!(coder.open().unwrap_err().kind(), ErrorKind::InvalidState);

        coder.set_gop_size(10).unwrap();
        assert_eq!(coder.state(), CoderState::Configuring);
        coder.open().unwrap();
    }

    #[test]
    fn test_open_validation() {
        let mut coder = StreamCoder::new(Direction::Outbound, MediaType::Video);
        let err = coder.open().unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::NoEngine)));

        let mut coder = StreamCoder::with_engine(Direction::Outbound, Box::new(RawVideoEngine::new()));
        coder.set_pixel_format(PixelFormat::Yuv420p).unwrap();
        coder.set_width(16).unwrap();
        let err = coder.open().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidConfiguration);
        assert_eq!(coder.state(), CoderState::Configuring);

        coder.set_height(16).unwrap();
        assert_eq!(coder.open().unwrap_err().kind(), ErrorKind::InvalidConfiguration);
        coder.set_frame_rate(Rational::new(30000, 1001).unwrap()).unwrap();
        coder.open().unwrap();
        assert_eq!(coder.time_base(), Some(TimeBase::new(1001, 30000).unwrap()));
    }

    #[test]
    fn test_wrong_direction() {
        let mut coder = StreamCoder::with_engine(
            Direction::Inbound,
            ScriptedEngine::boxed(&[], 0),
        );
        coder.set_pixel_format(PixelFormat::Gray8).unwrap();
        coder.set_width(4).unwrap();
        coder.set_height(2).unwrap();
        let err = coder.open().unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::WrongDirection(_))));
    }

    #[test]
    fn test_engine_extra_data_is_kept() {
        let mut coder = video_encoder(ScriptedEngine::boxed(&[], 0), 0);
        coder.open().unwrap();
        assert_eq!(coder.extra_data(), Some(&[0u8, 0, 1][..]));
    }

    #[test]
    fn test_zero_delay_passes_through() {
        let mut coder = video_encoder(Box::new(RawVideoEngine::new()), 0);
        coder.open().unwrap();
        let packets = encode_all(&mut coder, 5);
        let pts: Vec<i64> = packets.iter().map(|p| p.pts()).collect();
        assert_eq!(pts, vec![0, 1, 2, 3, 4]);
        assert!(packets.iter().all(|p| p.pts() == p.dts()));
        assert_eq!(coder.next_predicted_pts(), 5);
        assert_eq!(coder.monotonicity_violations(), 0);
    }

    #[test]
    fn test_reordered_output_gets_monotonic_dts() {
        let engine = RawVideoEngine::with_report(TimestampReport::PtsOnly);
        let mut coder = video_encoder(Box::new(engine), 1);
        coder.open().unwrap();
        assert_eq!(coder.reorder_delay(), 1);

        let packets = encode_all(&mut coder, 6);
        let pts: Vec<i64> = packets.iter().map(|p| p.pts()).collect();
        let dts: Vec<i64> = packets.iter().map(|p| p.dts()).collect();
        assert_eq!(pts, vec![0, 2, 1, 4, 3, 5]);
        assert_eq!(dts, vec![-1, 0, 1, 2, 3, 4]);
        assert!(packets.iter().all(|p| p.dts() <= p.pts()));
        assert_eq!(coder.monotonicity_violations(), 0);
        assert_eq!(coder.num_dropped_frames(), 0);
    }

    #[test]
    fn test_missing_pts_recovered_from_dts() {
        let engine = RawVideoEngine::with_report(TimestampReport::DtsOnly);
        let mut coder = video_encoder(Box::new(engine), 0);
        coder.open().unwrap();
        let packets = encode_all(&mut coder, 4);
        let pts: Vec<i64> = packets.iter().map(|p| p.pts()).collect();
        assert_eq!(pts, vec![0, 1, 2, 3]);
        assert_eq!(coder.num_dropped_frames(), 0);
    }

    #[test]
    fn test_repeated_pts_is_patched() {
        let script = [(0, 0), (1, 1), (1, 1), (3, 3)];
        let mut coder = video_encoder(ScriptedEngine::boxed(&script, 0), 0);
        coder.open().unwrap();
        let packets = encode_all(&mut coder, 4);
        let pts: Vec<i64> = packets.iter().map(|p| p.pts()).collect();
        assert_eq!(pts, vec![0, 1, 2, 3]);
        assert!(pts.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(coder.monotonicity_violations(), 1);
    }

    #[test]
    fn test_unmatched_output_counts_as_dropped() {
        let script = [(0, -1), (NO_PTS, NO_PTS), (1, 1)];
        let mut coder = video_encoder(ScriptedEngine::boxed(&script, 1), 1);
        coder.open().unwrap();
        let packets = encode_all(&mut coder, 3);
        assert_eq!(packets.len(), 3);
        assert_eq!(coder.num_dropped_frames(), 1);
        let dts: Vec<i64> = packets.iter().map(|p| p.dts()).collect();
        assert!(dts.windows(2).all(|w| w[0] < w[1]), "{dts:?}");
    }

    /// Audio engine that stamps every unit at zero with no duration.
    struct StuckClockEngine;

    impl CodecEngine for StuckClockEngine {
        fn descriptor(&self) -> CodecDescriptor {
            CodecDescriptor {
                id: CodecId::Aac,
                name: "stuck_clock",
                long_name: "audio engine with a stuck clock",
                can_encode: true,
                can_decode: false,
            }
        }

        fn open(&mut self, _config: &CodecConfig) -> Result<EngineCaps> {
            Ok(EngineCaps {
                frame_size: Some(1024),
                ..EngineCaps::default()
            })
        }

        fn decode(&mut self, _unit: &RawUnit<'_>) -> Result<DecodeStep> {
            Err(CodecError::DecodeFailed("encode only".into()).into())
        }

        fn encode(&mut self, input: EncodeInput<'_>) -> Result<Option<EncodedUnit>> {
            if matches!(input, EncodeInput::Flush) {
                return Ok(None);
            }
            Ok(Some(EncodedUnit {
                data: Buffer::from_vec(vec![0; 4]),
                pts: 0,
                dts: 0,
                duration: 0,
                key: true,
            }))
        }

        fn close(&mut self) {}
    }

    fn stuck_audio_encoder() -> StreamCoder {
        let mut coder = StreamCoder::with_engine(Direction::Outbound, Box::new(StuckClockEngine));
        coder.set_sample_rate(48_000).unwrap();
        coder.set_channels(1).unwrap();
        coder.set_sample_format(SampleFormat::S16).unwrap();
        coder.open().unwrap();
        coder
    }

    #[test]
    fn test_audio_patch_advances_by_frame_samples() {
        let mut coder = stuck_audio_encoder();
        let mut samples = AudioSamples::new(3072, 1, 48_000, SampleFormat::S16).unwrap();
        samples.set_complete(true, 3072, 0).unwrap();

        let packets = coder.encode_audio(Some(&samples)).unwrap();
        let pts: Vec<i64> = packets.iter().map(|p| p.pts()).collect();
        assert_eq!(pts, vec![0, 1024, 2048]);
        assert!(packets.iter().all(|p| p.duration() == 1024));
        assert_eq!(coder.monotonicity_violations(), 2);
        assert_eq!(coder.next_predicted_pts(), 3072);
    }

    #[test]
    fn test_audio_padded_tail_uses_valid_samples() {
        let mut coder = stuck_audio_encoder();
        let mut samples = AudioSamples::new(1500, 1, 48_000, SampleFormat::S16).unwrap();
        samples.set_complete(true, 1500, 0).unwrap();

        let mut packets = coder.encode_audio(Some(&samples)).unwrap();
        packets.extend(coder.encode_audio(None).unwrap());
        let pts: Vec<i64> = packets.iter().map(|p| p.pts()).collect();
        assert_eq!(pts, vec![0, 1024]);
        assert_eq!(packets[1].duration(), 476);
        assert_eq!(coder.next_predicted_pts(), 1500);
    }

    #[test]
    fn test_caller_stamp_mode_passes_through() {
        let script = [(5, 5), (5, 5)];
        let mut coder = video_encoder(ScriptedEngine::boxed(&script, 0), 0);
        coder.set_automatically_stamp_packets(false).unwrap();
        coder.open().unwrap();
        let packets = encode_all(&mut coder, 2);
        assert!(packets.iter().all(|p| p.pts() == 5));
        assert_eq!(coder.monotonicity_violations(), 0);
    }

    #[test]
    fn test_flush_never_reemits() {
        let mut coder = video_encoder(Box::new(RawVideoEngine::new()), 2);
        coder.open().unwrap();
        for pts in 0..4 {
            coder.encode_video(Some(&picture(pts))).unwrap();
        }
        let mut drained = 0;
        while coder.encode_video(None).unwrap().is_some() {
            drained += 1;
            assert!(drained < 10);
        }
        assert!(coder.encode_video(None).unwrap().is_none());
        let err = coder.encode_video(Some(&picture(9))).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_linked_stream_rescales_packets() {
        let mut coder = video_encoder(Box::new(RawVideoEngine::new()), 0);
        coder.bind_stream(3, TimeBase::MPEG);
        coder.open().unwrap();
        let packet = coder.encode_video(Some(&picture(2))).unwrap().unwrap();
        assert_eq!(packet.stream_index(), 3);
        assert_eq!(packet.time_base(), TimeBase::MPEG);
        assert_eq!(packet.pts(), 7200);
        assert_eq!(packet.duration(), 3600);
    }

    #[test]
    fn test_encode_rejects_wrong_geometry() {
        let mut coder = video_encoder(Box::new(RawVideoEngine::new()), 0);
        coder.open().unwrap();
        let other = Picture::new(PixelFormat::Gray8, 8, 8).unwrap();
        let err = coder.encode_video(Some(&other)).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidArgument);
        assert!(coder.is_open());
    }

    #[test]
    fn test_decode_requires_inbound() {
        let mut coder = video_encoder(Box::new(RawVideoEngine::new()), 0);
        coder.open().unwrap();
        let packet = Packet::from_slice(&[0; 8]).unwrap();
        let err = coder.decode_video(&packet, 0).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidState);
    }

    #[test]
    fn test_template_copies_parameters() {
        let registry = CodecRegistry::with_builtin();
        let mut template = StreamCoder::new(Direction::Inbound, MediaType::Audio);
        template.set_codec(&registry, CodecId::PcmS16le).unwrap();
        template.set_sample_rate(48000).unwrap();
        template.set_channels(2).unwrap();
        template.set_sample_format(SampleFormat::S16).unwrap();
        template.set_option("frame_size", 1024i64).unwrap();

        let mut copy = StreamCoder::from_template(&template, Direction::Outbound, &registry).unwrap();
        assert_eq!(copy.codec_id(), Some(CodecId::PcmS16le));
        assert_eq!(copy.sample_rate(), 48000);
        assert_eq!(copy.option("frame_size").unwrap(), OptionValue::Int(1024));
        copy.open().unwrap();
        assert_eq!(copy.audio_frame_size(), 1024);
    }

    #[test]
    fn test_set_engine_media_mismatch() {
        let registry = CodecRegistry::with_builtin();
        let mut coder = StreamCoder::new(Direction::Outbound, MediaType::Video);
        let err = coder.set_codec(&registry, CodecId::PcmS16le).unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::WrongMediaType(_))));
    }
}
