//! Stream coder round trips through the built-in engines.

use avbind_codecs::{
    CodecConfig, CodecDescriptor, CodecEngine, CodecRegistry, DecodeStep, EncodeInput,
    EncodedUnit, EngineCaps, RawUnit, StreamCoder, TimestampReport, RawVideoEngine,
};
use avbind_core::{
    AudioSamples, Buffer, CodecError, CodecId, Direction, Error, ErrorKind, MediaType, Packet,
    Picture, PixelFormat, Rational, Result, SampleFormat, TimeBase, NO_PTS,
};
use pretty_assertions::assert_eq;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

const RATE: u32 = 48_000;

fn pcm_coder(direction: Direction, frame_size: i64) -> StreamCoder {
    let registry = CodecRegistry::with_builtin();
    let mut coder = StreamCoder::new(direction, MediaType::Audio);
    coder.set_codec(&registry, CodecId::PcmS16le).unwrap();
    coder.set_sample_rate(RATE).unwrap();
    coder.set_channels(2).unwrap();
    coder.set_sample_format(SampleFormat::S16).unwrap();
    coder.set_option("frame_size", frame_size).unwrap();
    coder
}

fn stereo_block(samples: usize, first: usize, pts_us: i64) -> AudioSamples {
    let mut block = AudioSamples::new(samples, 2, RATE, SampleFormat::S16).unwrap();
    for (i, frame) in block.data_mut().unwrap().chunks_exact_mut(4).enumerate() {
        let value = ((first + i) as u16).to_le_bytes();
        frame[..2].copy_from_slice(&value);
        frame[2..].copy_from_slice(&value);
    }
    block.set_complete(true, samples, pts_us).unwrap();
    block
}

fn gray_picture(pts: i64, fill: u8) -> Picture {
    let mut picture = Picture::new(PixelFormat::Gray8, 4, 2).unwrap();
    picture.plane_mut(0).unwrap().fill(fill);
    picture.set_time_base(TimeBase::new(1, 25).unwrap());
    picture.set_pts(pts);
    picture
}

fn raw_video_coder(direction: Direction, engine: RawVideoEngine) -> StreamCoder {
    let mut coder = StreamCoder::with_engine(direction, Box::new(engine));
    coder.set_pixel_format(PixelFormat::Gray8).unwrap();
    coder.set_width(4).unwrap();
    coder.set_height(2).unwrap();
    coder.set_frame_rate(Rational::from_int(25)).unwrap();
    coder
}

// =============================================================================
// Audio
// =============================================================================

#[test]
fn test_audio_frames_are_reassembled() {
    let mut coder = pcm_coder(Direction::Outbound, 480);
    coder.open().unwrap();
    assert_eq!(coder.audio_frame_size(), 480);
    assert_eq!(coder.time_base(), Some(TimeBase::from_sample_rate(RATE).unwrap()));

    let mut packets = Vec::new();
    packets.extend(coder.encode_audio(Some(&stereo_block(300, 0, 0))).unwrap());
    assert!(packets.is_empty());
    packets.extend(coder.encode_audio(Some(&stereo_block(700, 300, NO_PTS))).unwrap());
    assert_eq!(packets.len(), 2);
    packets.extend(coder.encode_audio(None).unwrap());

    let pts: Vec<i64> = packets.iter().map(|p| p.pts()).collect();
    assert_eq!(pts, vec![0, 480, 960]);
    let sizes: Vec<usize> = packets.iter().map(|p| p.size()).collect();
    assert_eq!(sizes, vec![480 * 4, 480 * 4, 480 * 4]);

    // The tail frame holds 40 real samples followed by silence.
    let tail = packets[2].data();
    assert_eq!(&tail[..2], &960u16.to_le_bytes());
    assert!(tail[40 * 4..].iter().all(|b| *b == 0));
    assert_eq!(coder.monotonicity_violations(), 0);
}

#[test]
fn test_audio_packets_follow_stream_time_base() {
    let mut coder = pcm_coder(Direction::Outbound, 480);
    coder.bind_stream(1, TimeBase::MILLISECONDS);
    coder.open().unwrap();
    let packets = coder.encode_audio(Some(&stereo_block(1440, 0, 1_000_000))).unwrap();
    let pts: Vec<i64> = packets.iter().map(|p| p.pts()).collect();
    assert_eq!(pts, vec![1000, 1010, 1020]);
    assert!(packets.iter().all(|p| p.stream_index() == 1 && p.duration() == 10));
}

#[test]
fn test_audio_flush_is_one_shot() {
    let mut coder = pcm_coder(Direction::Outbound, 480);
    coder.open().unwrap();
    coder.encode_audio(Some(&stereo_block(100, 0, 0))).unwrap();
    assert_eq!(coder.encode_audio(None).unwrap().len(), 1);
    assert!(coder.encode_audio(None).unwrap().is_empty());
    let err = coder.encode_audio(Some(&stereo_block(10, 0, 0))).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidState);
}

#[test]
fn test_audio_layout_mismatch_is_rejected() {
    let mut coder = pcm_coder(Direction::Outbound, 480);
    coder.open().unwrap();
    let mono = AudioSamples::new(10, 1, RATE, SampleFormat::S16).unwrap();
    let err = coder.encode_audio(Some(&mono)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
}

#[test]
fn test_audio_decode_predicts_later_blocks() {
    init_tracing();
    let mut coder = pcm_coder(Direction::Inbound, 0);
    coder.open().unwrap();

    // 2048 stereo s16 samples decode as two 1024-sample blocks.
    let mut packet = Packet::from_slice(&vec![0u8; 2048 * 4]).unwrap();
    packet.set_time_base(TimeBase::from_sample_rate(RATE).unwrap());
    packet.set_pts(960);
    packet.set_dts(960);

    let blocks = coder.decode_audio_packet(&packet).unwrap();
    let pts: Vec<i64> = blocks.iter().map(|b| b.pts()).collect();
    assert_eq!(pts, vec![20_000, 41_333]);
    assert!(blocks.iter().all(|b| b.time_base() == TimeBase::MICROSECONDS));
    assert_eq!(coder.next_predicted_pts(), 960 + 2048);
}

// =============================================================================
// Video
// =============================================================================

#[test]
fn test_video_round_trip_in_decode_order() {
    init_tracing();
    let mut encoder = raw_video_coder(
        Direction::Outbound,
        RawVideoEngine::with_report(TimestampReport::PtsOnly),
    );
    encoder.set_option("max_b_frames", 1i64).unwrap();
    encoder.bind_stream(0, TimeBase::MPEG);
    encoder.open().unwrap();

    let mut packets = Vec::new();
    for pts in 0..6 {
        packets.extend(encoder.encode_video(Some(&gray_picture(pts, pts as u8))).unwrap());
    }
    while let Some(packet) = encoder.encode_video(None).unwrap() {
        packets.push(packet);
    }
    assert_eq!(packets.len(), 6);
    assert!(packets.windows(2).all(|w| w[0].dts() < w[1].dts()));
    assert!(packets.iter().all(|p| p.dts() <= p.pts()));

    let mut decoder = raw_video_coder(Direction::Inbound, RawVideoEngine::new());
    decoder.open().unwrap();
    let mut decoded: Vec<(i64, u8)> = Vec::new();
    for packet in &packets {
        for picture in decoder.decode_video_packet(packet).unwrap() {
            decoded.push((picture.pts(), picture.plane(0).unwrap()[0]));
        }
    }
    decoded.sort();
    let expected: Vec<(i64, u8)> = (0..6).map(|i| (i * 40_000, i as u8)).collect();
    assert_eq!(decoded, expected);
}

#[test]
fn test_truncated_picture_fails_but_coder_stays_open() {
    init_tracing();
    let mut decoder = raw_video_coder(Direction::Inbound, RawVideoEngine::new());
    decoder.open().unwrap();
    let size = PixelFormat::Gray8.buffer_size(4, 2);
    let packet = Packet::from_slice(&vec![7u8; size + size / 2]).unwrap();

    let first = decoder.decode_video(&packet, 0).unwrap();
    assert_eq!(first.consumed, size);
    assert!(first.frame.is_some());
    let err = decoder.decode_video(&packet, size).unwrap_err();
    assert!(matches!(err, Error::Codec(CodecError::DecodeFailed(_))));
    assert!(decoder.is_open());
}

/// Engine that never consumes input.
struct StuckEngine;

impl CodecEngine for StuckEngine {
    fn descriptor(&self) -> CodecDescriptor {
        CodecDescriptor {
            id: CodecId::H264,
            name: "stuck",
            long_name: "decoder that makes no progress",
            can_encode: false,
            can_decode: true,
        }
    }

    fn open(&mut self, _config: &CodecConfig) -> Result<EngineCaps> {
        Ok(EngineCaps::default())
    }

    fn decode(&mut self, _unit: &RawUnit<'_>) -> Result<DecodeStep> {
        Ok(DecodeStep {
            consumed: 0,
            output: None,
        })
    }

    fn encode(&mut self, _input: EncodeInput<'_>) -> Result<Option<EncodedUnit>> {
        Ok(None)
    }

    fn close(&mut self) {}
}

#[test]
fn test_decoder_without_progress_is_unrecoverable() {
    let mut decoder = StreamCoder::with_engine(Direction::Inbound, Box::new(StuckEngine));
    decoder.set_pixel_format(PixelFormat::Yuv420p).unwrap();
    decoder.set_width(16).unwrap();
    decoder.set_height(16).unwrap();
    decoder.open().unwrap();

    let packet = Packet::wrap(Buffer::from_vec(vec![0; 32]));
    let err = decoder.decode_video_packet(&packet).unwrap_err();
    assert!(matches!(err, Error::Codec(CodecError::NoProgress { offset: 0 })));
    assert_eq!(err.kind(), ErrorKind::Unrecoverable);
}
