//! Encode a video and an audio stream and mux them interleaved.
//!
//! # Usage
//!
//! ```bash
//! RUST_LOG=avbind_containers=trace cargo run --example interleave_mux
//! ```

use avbind::prelude::*;
use tracing_subscriber::EnvFilter;

const RATE: u32 = 48_000;

fn main() -> avbind::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    println!("Interleaved Mux Example");
    println!("══════════════════════════════════════════════════════════");
    println!();

    let registry = CodecRegistry::with_builtin();

    let mut video = StreamCoder::new(Direction::Outbound, MediaType::Video);
    video.set_codec(&registry, CodecId::RawVideo)?;
    video.set_pixel_format(PixelFormat::Yuv420p)?;
    video.set_width(64)?;
    video.set_height(36)?;
    video.set_frame_rate(Rational::from_int(30))?;
    video.set_option("max_b_frames", 2i64)?;

    let mut audio = StreamCoder::new(Direction::Outbound, MediaType::Audio);
    audio.set_codec(&registry, CodecId::PcmS16le)?;
    audio.set_sample_rate(RATE)?;
    audio.set_channels(2)?;
    audio.set_sample_format(SampleFormat::S16)?;

    let muxer = MemoryMuxer::new();
    let recorder = muxer.recorder();
    let mut container = Container::new();
    container.open_write(Box::new(muxer), ContainerOptions::new())?;
    for coder in [video, audio] {
        let stream = container.add_new_stream(0)?;
        stream.set_stream_coder(coder)?;
        if let Some(coder) = stream.stream_coder_mut() {
            coder.open()?;
        }
    }
    container.metadata_mut().set("title", "interleave demo");
    container.write_header()?;

    // One second of each stream, audio in 10 ms blocks.
    for frame in 0..30i64 {
        let mut picture = Picture::new(PixelFormat::Yuv420p, 64, 36)?;
        picture.plane_mut(0)?.fill(frame as u8);
        picture.set_time_base(TimeBase::new(1, 30)?);
        picture.set_pts(frame);
        let packet = match container.stream_mut(0)?.stream_coder_mut() {
            Some(coder) => coder.encode_video(Some(&picture))?,
            None => None,
        };
        if let Some(packet) = packet {
            container.write_packet(&packet, true)?;
        }
    }
    for block in 0..100i64 {
        let mut samples = AudioSamples::new(480, 2, RATE, SampleFormat::S16)?;
        samples.set_complete(true, 480, block * 10_000)?;
        let packets = match container.stream_mut(1)?.stream_coder_mut() {
            Some(coder) => coder.encode_audio(Some(&samples))?,
            None => Vec::new(),
        };
        for packet in &packets {
            container.write_packet(packet, true)?;
        }
    }

    let mut tail = Vec::new();
    if let Some(coder) = container.stream_mut(0)?.stream_coder_mut() {
        while let Some(packet) = coder.encode_video(None)? {
            tail.push(packet);
        }
    }
    if let Some(coder) = container.stream_mut(1)?.stream_coder_mut() {
        tail.extend(coder.encode_audio(None)?);
    }
    for packet in &tail {
        container.write_packet(packet, true)?;
    }
    container.close()?;

    let log = recorder.lock();
    println!("Streams:  {}", log.streams.len());
    println!("Packets:  {}", log.packets.len());
    println!();
    println!("First packets in mux order:");
    println!("────────────────────────────────────────────────────────────");
    for packet in log.packets.iter().take(12) {
        let dts = Timestamp::new(packet.dts(), packet.time_base());
        println!(
            "  stream {}  dts {:>6}  ({})  {} bytes",
            packet.stream_index(),
            packet.dts(),
            dts,
            packet.size()
        );
    }
    Ok(())
}
