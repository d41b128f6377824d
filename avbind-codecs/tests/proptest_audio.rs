//! Property-based tests for audio reassembly.

use avbind_codecs::{AudioFifo, CodecRegistry, StreamCoder};
use avbind_core::{AudioSamples, CodecId, Direction, MediaType, SampleFormat, TimeBase};
use proptest::prelude::*;

// ============================================================================
// Strategies
// ============================================================================

/// Split `total` samples into chunks of 1..=max samples.
fn partition(total: usize, max: usize) -> impl Strategy<Value = Vec<usize>> {
    prop::collection::vec(1..=max, 1..64).prop_map(move |sizes| {
        let mut left = total;
        let mut parts = Vec::new();
        for size in sizes {
            if left == 0 {
                break;
            }
            let take = size.min(left);
            parts.push(take);
            left -= take;
        }
        if left > 0 {
            parts.push(left);
        }
        parts
    })
}

fn mono_bytes(samples: usize) -> Vec<u8> {
    (0..samples)
        .flat_map(|i| (i as u16).to_le_bytes())
        .collect()
}

/// Encode `bytes` through a PCM coder in the given chunk sizes.
fn encode_in_parts(bytes: &[u8], parts: &[usize], frame: i64) -> Vec<(i64, Vec<u8>)> {
    let registry = CodecRegistry::with_builtin();
    let mut coder = StreamCoder::new(Direction::Outbound, MediaType::Audio);
    coder.set_codec(&registry, CodecId::PcmS16le).unwrap();
    coder.set_sample_rate(8000).unwrap();
    coder.set_channels(1).unwrap();
    coder.set_sample_format(SampleFormat::S16).unwrap();
    coder.set_option("frame_size", frame).unwrap();
    coder.open().unwrap();

    let mut packets = Vec::new();
    let mut offset = 0;
    for (i, &samples) in parts.iter().enumerate() {
        let mut block = AudioSamples::new(samples, 1, 8000, SampleFormat::S16).unwrap();
        block
            .data_mut()
            .unwrap()
            .copy_from_slice(&bytes[offset * 2..(offset + samples) * 2]);
        let pts = if i == 0 { 0 } else { avbind_core::NO_PTS };
        block.set_complete(true, samples, pts).unwrap();
        packets.extend(coder.encode_audio(Some(&block)).unwrap());
        offset += samples;
    }
    packets.extend(coder.encode_audio(None).unwrap());
    packets
        .into_iter()
        .map(|p| (p.pts(), p.data().to_vec()))
        .collect()
}

// ============================================================================
// Reassembly
// ============================================================================

proptest! {
    #[test]
    fn coder_output_ignores_input_partition(
        total in 1usize..3000,
        frame in 1i64..700,
        seed in partition(3000, 900),
    ) {
        // Rescale the generated partition onto `total` samples.
        let mut parts = Vec::new();
        let mut left = total;
        for size in seed {
            if left == 0 {
                break;
            }
            let take = size.min(left);
            parts.push(take);
            left -= take;
        }
        if left > 0 {
            parts.push(left);
        }

        let bytes = mono_bytes(total);
        let whole = encode_in_parts(&bytes, &[total], frame);
        let split = encode_in_parts(&bytes, &parts, frame);
        prop_assert_eq!(&whole, &split);

        let frame = frame as usize;
        prop_assert_eq!(whole.len(), total.div_ceil(frame));
        for (i, (pts, data)) in whole.iter().enumerate() {
            prop_assert_eq!(*pts, (i * frame) as i64);
            prop_assert_eq!(data.len(), frame * 2);
        }
    }

    #[test]
    fn fifo_conserves_samples(parts in partition(5000, 700), frame in 1usize..512) {
        let mut fifo = AudioFifo::new(2, 1000, TimeBase::MILLISECONDS);
        let mut pushed = 0;
        let mut popped = 0;
        for samples in parts {
            fifo.push(&mono_bytes(samples), pushed as i64);
            pushed += samples;
            while let Some(chunk) = fifo.pop_frame(frame) {
                prop_assert_eq!(chunk.pts, popped as i64);
                popped += chunk.valid_samples;
            }
        }
        if let Some(chunk) = fifo.take_partial(frame) {
            prop_assert_eq!(chunk.pts, popped as i64);
            popped += chunk.valid_samples;
        }
        prop_assert_eq!(pushed, popped);
        prop_assert!(fifo.is_empty());
    }
}
