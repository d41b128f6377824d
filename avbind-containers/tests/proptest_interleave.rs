//! Property tests for interleaving and seek index lookups.

use avbind_containers::{IndexEntry, Interleaver, SeekFlags, StreamIndex};
use avbind_core::{Packet, TimeBase};
use proptest::prelude::*;

fn sorted(mut values: Vec<i64>) -> Vec<i64> {
    values.sort_unstable();
    values
}

// =============================================================================
// Interleaver
// =============================================================================

proptest! {
    #[test]
    fn interleaved_output_is_dts_ordered(
        a in prop::collection::vec(0i64..10_000, 1..40).prop_map(sorted),
        b in prop::collection::vec(0i64..10_000, 1..40).prop_map(sorted),
    ) {
        let mut interleaver = Interleaver::default();
        let mut out = Vec::new();
        let streams = [(0, &a), (1, &b)];
        for (stream, values) in streams {
            for &dts in values.iter() {
                let mut packet = Packet::new();
                packet.set_stream_index(stream);
                packet.set_time_base(TimeBase::MILLISECONDS);
                packet.set_dts(dts);
                interleaver.push(packet).unwrap();
                while let Some(ready) = interleaver.pop_ready(2) {
                    out.push(ready.dts());
                }
            }
        }
        out.extend(interleaver.drain().iter().map(Packet::dts));

        prop_assert_eq!(out.len(), a.len() + b.len());
        prop_assert!(out.windows(2).all(|w| w[0] <= w[1]));
    }
}

// =============================================================================
// Stream index
// =============================================================================

proptest! {
    #[test]
    fn index_search_brackets_target(
        timestamps in prop::collection::btree_set(-1_000i64..1_000, 1..64),
        target in -1_200i64..1_200,
    ) {
        let mut index = StreamIndex::default();
        for &ts in &timestamps {
            index.add(IndexEntry::key(ts, ts)).unwrap();
        }

        let below = timestamps.range(..=target).next_back().copied();
        let above = timestamps.range(target..).next().copied();
        let found = |flags| index.search(target, flags).map(|p| index.get(p).unwrap().timestamp);
        prop_assert_eq!(found(SeekFlags::BACKWARDS), below);
        prop_assert_eq!(found(SeekFlags::empty()), above);
    }
}
