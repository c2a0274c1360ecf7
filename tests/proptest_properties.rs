mod common;

use std::io::Cursor;

use common::{ClassBuilder, STATIC, bytecode_roundtrip, op};
use oxipack::bytecode::insn::Insn;
use oxipack::classfile::ClassReader;
use oxipack::codec::band::BYTES;
use oxipack::codec::{
    BCI5, BRANCH5, BYTE1, BandCodec, BandReader, BandWriter, BhsdCodec, DELTA5, SIGNED5,
    UDELTA5, UNSIGNED5, escape_index, sentinel_for,
};
use oxipack::segment::{Batcher, PackOptions, Segment, SourceEntry, estimate_size};
use proptest::prelude::*;

fn roundtrip_band(codec: BhsdCodec, values: &[i32], effort: u32) -> Vec<i32> {
    let mut w = BandWriter::new(effort);
    w.encode_ints("prop", BandCodec::of(codec), values).unwrap();
    let (body, headers) = w.into_parts();
    let mut r = BandReader::new(Cursor::new(&body), &headers);
    let back = r.decode_ints("prop", BandCodec::of(codec), values.len()).unwrap();
    assert_eq!(r.headers_remaining(), 0);
    back
}

fn wide_codec() -> impl Strategy<Value = BhsdCodec> {
    prop_oneof![Just(UNSIGNED5), Just(SIGNED5), Just(DELTA5), Just(UDELTA5)]
}

proptest! {
    #[test]
    fn prop_band_roundtrip(
        values in proptest::collection::vec(any::<i32>(), 0..256),
        codec in wide_codec(),
        effort in 0u32..=9u32
    ) {
        prop_assert_eq!(roundtrip_band(codec, &values, effort), values);
    }

    #[test]
    fn prop_small_values_roundtrip(
        values in proptest::collection::vec(-300i32..1000, 0..512),
        codec in wide_codec(),
        effort in 0u32..=9u32
    ) {
        prop_assert_eq!(roundtrip_band(codec, &values, effort), values);
    }

    #[test]
    fn prop_branch_band_roundtrip(
        values in proptest::collection::vec(-10_000i32..10_000, 0..256),
        effort in 0u32..=9u32
    ) {
        prop_assert_eq!(roundtrip_band(BRANCH5, &values, effort), values);
    }

    #[test]
    fn prop_byte_band_roundtrip(
        bytes in proptest::collection::vec(any::<u8>(), 0..512),
        effort in 0u32..=9u32
    ) {
        let values: Vec<i32> = bytes.iter().map(|&b| i32::from(b)).collect();
        let mut w = BandWriter::new(effort);
        w.encode_ints("bytes", BYTES, &values).unwrap();
        let (body, headers) = w.into_parts();
        // Single-byte bands are written verbatim with no header.
        prop_assert!(headers.is_empty());
        prop_assert_eq!(&body, &bytes);
    }

    #[test]
    fn prop_2d_band_roundtrip(
        rows in proptest::collection::vec(proptest::collection::vec(any::<u8>(), 0..40), 0..20)
    ) {
        let rows: Vec<Vec<i32>> = rows
            .into_iter()
            .map(|r| r.into_iter().map(i32::from).collect())
            .collect();
        let lengths: Vec<usize> = rows.iter().map(Vec::len).collect();
        let mut w = BandWriter::new(1);
        w.encode_ints_2d("rows", BYTES, &rows).unwrap();
        let (body, headers) = w.into_parts();
        let mut r = BandReader::new(Cursor::new(&body), &headers);
        prop_assert_eq!(r.decode_ints_2d("rows", BYTES, &lengths).unwrap(), rows);
    }

    #[test]
    fn prop_sentinels_resolve_to_their_index(index in 0u32..=255) {
        for codec in [UNSIGNED5, SIGNED5, DELTA5, BRANCH5, BCI5] {
            if let Some(first) = sentinel_for(index, &codec) {
                prop_assert_eq!(escape_index(first, &codec), Some(index));
            }
        }
        prop_assert_eq!(sentinel_for(index, &BYTE1), None);
    }

    #[test]
    fn prop_escape_index_is_in_range(first in any::<i32>()) {
        for codec in [UNSIGNED5, SIGNED5, DELTA5, BYTE1] {
            if let Some(index) = escape_index(first, &codec) {
                prop_assert!(index <= 255);
                prop_assert_eq!(sentinel_for(index, &codec), Some(first));
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Batching
// ---------------------------------------------------------------------------

fn entry_strategy() -> impl Strategy<Value = (String, usize)> {
    (any::<bool>(), "[a-z]{1,12}", 0usize..400).prop_map(|(meta, name, len)| {
        let name = if meta {
            format!("META-INF/{name}")
        } else {
            format!("res/{name}.txt")
        };
        (name, len)
    })
}

proptest! {
    #[test]
    fn prop_batcher_keeps_order_and_respects_limit(
        entries in proptest::collection::vec(entry_strategy(), 0..40),
        limit in -1i64..2000
    ) {
        let mut segments: Vec<Segment> = Vec::new();
        let opts = PackOptions { segment_limit: limit, ..PackOptions::default() };
        let mut batcher = Batcher::new(&mut segments, ClassReader::new(), opts);
        let source = entries
            .iter()
            .map(|(name, len)| Ok(SourceEntry::from_bytes(name.clone(), vec![0u8; *len], 0)));
        let stats = batcher.pack(source).unwrap();
        drop(batcher);

        prop_assert_eq!(stats.segments as usize, segments.len());
        prop_assert!(segments.iter().all(|s| !s.is_empty()));

        let names: Vec<&str> = segments
            .iter()
            .flat_map(|s| s.files.iter().map(|f| f.name.as_str()))
            .collect();
        let expected: Vec<&str> = entries.iter().map(|(n, _)| n.as_str()).collect();
        prop_assert_eq!(names, expected);

        if limit < 0 {
            prop_assert!(segments.len() <= 1);
        }
        if limit > 0 {
            // The first entry of a segment may be the one that triggered the
            // flush, and one oversized entry is admitted into an empty batch.
            for s in &segments {
                let tail: Vec<u64> = s
                    .files
                    .iter()
                    .skip(1)
                    .map(|f| estimate_size(&f.name, f.bytes.len() as u64))
                    .collect();
                let largest = tail.iter().copied().max().unwrap_or(0);
                let rest = tail.iter().sum::<u64>() - largest;
                prop_assert!(rest <= limit as u64, "tail {:?} over limit {}", tail, limit);
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Bytecode
// ---------------------------------------------------------------------------

/// `(kind, argument, branch target seed)` turned into one instruction.
fn simple_insn(kind: u8, arg: i16, seed: u32, len: u32) -> Insn {
    let [hi, lo] = arg.to_be_bytes();
    match kind % 10 {
        0 => op(3 + (arg.unsigned_abs() % 6) as u8, &[]),
        1 => op(16, &[lo]),
        2 => op(17, &[hi, lo]),
        3 => op(21, &[lo]),
        4 => op(54, &[lo]),
        5 => op(132, &[lo, hi]),
        6 => op(196, &[21, hi, lo]),
        7 => Insn::Branch {
            opcode: 153 + (arg.unsigned_abs() % 14) as u8,
            target: seed % len,
        },
        8 => Insn::Branch {
            opcode: 200,
            target: seed % len,
        },
        _ => Insn::TableSwitch {
            default: seed % len,
            low: i32::from(arg),
            targets: (0..(seed % 4)).map(|i| seed.wrapping_add(i) % len).collect(),
        },
    }
}

proptest! {
    #[test]
    fn prop_simple_bytecode_roundtrip(
        raw in proptest::collection::vec((any::<u8>(), any::<i16>(), any::<u32>()), 0..60)
    ) {
        let len = raw.len() as u32 + 1;
        let mut insns: Vec<Insn> = raw
            .iter()
            .map(|&(kind, arg, seed)| simple_insn(kind, arg, seed, len))
            .collect();
        insns.push(op(0xB1, &[]));

        let mut b = ClassBuilder::new("P", "java/lang/Object");
        b.code_method(STATIC, "p", "()V", u16::MAX, &insns);
        let class = b.build();
        let (rebuilt, _) = bytecode_roundtrip(std::slice::from_ref(&class));
        prop_assert_eq!(rebuilt, vec![class]);
    }
}
