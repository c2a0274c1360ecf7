// End-to-end packing through the reference segment writer and reader.

mod common;

use common::{ClassBuilder, PUBLIC, STATIC, op};
use oxipack::PackError;
use oxipack::bytecode::UnknownOpcodePolicy;
use oxipack::bytecode::insn::Insn;
use oxipack::classfile::{
    AccessFlags, Attribute, ClassReader, CodeAttribute, ExceptionHandler, FieldInfo, LineNumber,
    LocalVariable,
};
use oxipack::codec::UNSIGNED5;
use oxipack::segment::{
    self, ModTime, PackOptions, SEGMENT_MAGIC, Segment, SegmentOptions, SourceEntry,
    UnpackedEntry,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn entry(name: &str, bytes: &[u8], modtime: i64) -> std::io::Result<SourceEntry> {
    Ok(SourceEntry::from_bytes(name, bytes.to_vec(), modtime))
}

fn pack(
    entries: Vec<std::io::Result<SourceEntry>>,
    manifest: Option<Vec<u8>>,
    opts: PackOptions,
) -> (Vec<u8>, segment::PackStats) {
    let mut packed = Vec::new();
    let stats = segment::pack_all(&mut packed, entries, manifest, opts).unwrap();
    (packed, stats)
}

fn unpack(packed: &[u8]) -> Vec<Segment> {
    segment::unpack_all(packed, UnknownOpcodePolicy::Reject).unwrap()
}

fn all_entries(segments: &[Segment]) -> Vec<UnpackedEntry> {
    segments
        .iter()
        .flat_map(|s| s.entries().unwrap())
        .collect()
}

/// A class with fields, interfaces, attributes and code metadata in every
/// table the class bands carry.
fn rich_class_bytes() -> Vec<u8> {
    let mut b = ClassBuilder::new("pkg/Rich", "java/lang/Object");
    let serializable = b.class("java/io/Serializable");
    let field_name = b.utf8("count");
    let field_desc = b.utf8("I");
    let constant_value = b.utf8("ConstantValue");
    let seven = b.integer(7);
    let lnt = b.utf8("LineNumberTable");
    let lvt = b.utf8("LocalVariableTable");
    let lvtt = b.utf8("LocalVariableTypeTable");
    let source = b.utf8("SourceFile");
    let source_name = b.utf8("Rich.java");
    let deprecated = b.utf8("Deprecated");
    let local_name = b.utf8("n");
    let local_sig = b.utf8("TT;");
    let exception = b.class("java/lang/Exception");
    let count = b.field("pkg/Rich", "count", "I");

    b.code_method(
        STATIC,
        "sum",
        "(I)I",
        2,
        &[
            /* 0 */ op(26, &[]),
            op(61, &[]),
            op(178, &count.to_be_bytes()),
            op(28, &[]),
            op(0x60, &[]),
            /* 5 */ op(0xAC, &[]),
            op(0x57, &[]),
            op(3, &[]),
            op(0xAC, &[]),
        ],
    );
    b.raw_method(
        PUBLIC | AccessFlags::ABSTRACT,
        "todo",
        "()V",
        None,
    );
    b.code_method(PUBLIC, "<init>", "()V", 1, &[op(0xB1, &[])]);

    let mut class = b.build();
    class.interfaces.push(serializable);
    class.fields.push(FieldInfo {
        access_flags: AccessFlags::PRIVATE | AccessFlags::STATIC | AccessFlags::FINAL,
        name_index: field_name,
        descriptor_index: field_desc,
        attributes: vec![Attribute {
            name_index: constant_value,
            info: seven.to_be_bytes().to_vec(),
        }],
    });
    class.attributes.push(Attribute {
        name_index: source,
        info: source_name.to_be_bytes().to_vec(),
    });
    class.methods[1].attributes.push(Attribute {
        name_index: deprecated,
        info: Vec::new(),
    });

    let code = class.methods[0].code.as_mut().unwrap();
    code.exception_table.push(ExceptionHandler {
        start_pc: 0,
        end_pc: 6,
        handler_pc: 6,
        catch_type: exception,
    });
    code.attributes = vec![
        CodeAttribute::LineNumberTable {
            name_index: lnt,
            entries: vec![
                LineNumber {
                    start_pc: 0,
                    line_number: 3,
                },
                LineNumber {
                    start_pc: 5,
                    line_number: 4,
                },
            ],
        },
        CodeAttribute::LocalVariableTable {
            name_index: lvt,
            entries: vec![LocalVariable {
                start_pc: 0,
                length: 9,
                name_index: local_name,
                descriptor_index: field_desc,
                index: 0,
            }],
        },
        CodeAttribute::LocalVariableTypeTable {
            name_index: lvtt,
            entries: vec![LocalVariable {
                start_pc: 2,
                length: 4,
                name_index: local_name,
                descriptor_index: local_sig,
                index: 1,
            }],
        },
        CodeAttribute::Other(Attribute {
            name_index: deprecated,
            info: vec![1, 2, 3],
        }),
    ];
    class.to_bytes().unwrap()
}

fn loop_class_bytes() -> Vec<u8> {
    let mut b = ClassBuilder::new("pkg/Loop", "pkg/Base");
    let total = b.field("pkg/Loop", "total", "I");
    let step = b.method("pkg/Loop", "step", "()I");
    let [th, tl] = total.to_be_bytes();
    let [sh, sl] = step.to_be_bytes();
    b.code_method(
        PUBLIC,
        "run",
        "()V",
        2,
        &[
            /* 0 */ op(3, &[]),
            op(60, &[]),
            op(42, &[]),
            op(182, &[sh, sl]),
            op(0x57, &[]),
            /* 5 */ op(132, &[1, 1]),
            op(27, &[]),
            op(16, &[10]),
            Insn::Branch {
                opcode: 161,
                target: 2,
            },
            op(42, &[]),
            /* 10 */ op(27, &[]),
            op(181, &[th, tl]),
            op(0xB1, &[]),
        ],
    );
    b.code_method(PUBLIC, "step", "()I", 1, &[op(4, &[]), op(0xAC, &[])]);
    b.build().to_bytes().unwrap()
}

// ---------------------------------------------------------------------------
// Round trips
// ---------------------------------------------------------------------------

#[test]
fn mixed_archive_roundtrips_byte_for_byte() {
    let rich = rich_class_bytes();
    let looped = loop_class_bytes();
    ClassReader::new().parse(&rich).unwrap();

    let entries = vec![
        entry("pkg/Rich.class", &rich, 1_600_000_000),
        entry("pkg/data.txt", b"some resource text\n", 1_600_000_100),
        entry("META-INF/services/pkg.Service", b"pkg.Impl\n", 1_600_000_050),
        entry("pkg/Loop.class", &looped, 1_600_000_200),
        entry("pkg/empty.bin", b"", 1_600_000_300),
    ];
    let (packed, stats) = pack(entries, Some(b"Manifest-Version: 1.0\n".to_vec()), PackOptions::default());
    assert_eq!(&packed[..4], &SEGMENT_MAGIC);
    assert_eq!(stats.segments, 1);
    assert_eq!(stats.classes, 2);
    assert_eq!(stats.files, 4);

    let segments = unpack(&packed);
    assert_eq!(segments.len(), 1);
    assert_eq!(segments[0].classes.len(), 2);
    let got = all_entries(&segments);
    let names: Vec<&str> = got.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(
        names,
        vec![
            "META-INF/MANIFEST.MF",
            "pkg/Rich.class",
            "pkg/data.txt",
            "META-INF/services/pkg.Service",
            "pkg/Loop.class",
            "pkg/empty.bin",
        ]
    );
    assert_eq!(got[0].bytes, b"Manifest-Version: 1.0\n");
    assert_eq!(got[0].modtime, 0);
    assert_eq!(got[1].bytes, rich);
    assert_eq!(got[1].modtime, 1_600_000_000);
    assert_eq!(got[2].bytes, b"some resource text\n");
    assert_eq!(got[4].bytes, looped);
    assert_eq!(got[5].bytes, b"");
    assert_eq!(got[5].modtime, 1_600_000_300);
}

#[test]
fn every_effort_level_roundtrips() {
    let looped = loop_class_bytes();
    for effort in [0, 1, 5, 9] {
        let entries = vec![
            entry("pkg/Loop.class", &looped, 10),
            entry("notes.txt", &[7u8; 300], 20),
        ];
        let opts = PackOptions {
            effort,
            ..PackOptions::default()
        };
        let (packed, _) = pack(entries, None, opts);
        let got = all_entries(&unpack(&packed));
        assert_eq!(got[0].bytes, looped, "effort {effort}");
        assert_eq!(got[1].bytes, vec![7u8; 300], "effort {effort}");
    }
}

#[test]
fn latest_modtime_applies_to_every_entry() {
    let entries = vec![
        entry("a.txt", b"a", 100),
        entry("b.txt", b"b", 300),
        entry("c.txt", b"c", 200),
    ];
    let opts = PackOptions {
        modification_time: ModTime::Latest,
        ..PackOptions::default()
    };
    let (packed, _) = pack(entries, None, opts);
    let got = all_entries(&unpack(&packed));
    assert!(got.iter().all(|e| e.modtime == 300));
}

#[test]
fn wide_and_negative_modtimes_survive() {
    let times = [-1i64, 0, 1 << 40, -(1 << 33), i64::from(i32::MAX) + 1];
    let entries = times
        .iter()
        .enumerate()
        .map(|(i, &t)| entry(&format!("f{i}"), b"x", t))
        .collect();
    let (packed, _) = pack(entries, None, PackOptions::default());
    let got = all_entries(&unpack(&packed));
    let modtimes: Vec<i64> = got.iter().map(|e| e.modtime).collect();
    assert_eq!(modtimes, times);
}

#[test]
fn latest_modtime_keeps_negative_values() {
    let entries = vec![entry("a", b"a", -5_000_000_000), entry("b", b"b", -7_000_000_000)];
    let opts = PackOptions {
        modification_time: ModTime::Latest,
        ..PackOptions::default()
    };
    let (packed, _) = pack(entries, None, opts);
    let got = all_entries(&unpack(&packed));
    assert!(got.iter().all(|e| e.modtime == -5_000_000_000));
}

#[test]
fn pass_files_are_stored_raw() {
    let not_a_class = b"definitely not a class file".to_vec();
    let entries = vec![entry("raw/Broken.class", &not_a_class, 1)];
    let opts = PackOptions {
        pass_files: vec!["raw/".to_string()],
        ..PackOptions::default()
    };
    let (packed, stats) = pack(entries, None, opts);
    assert_eq!(stats.classes, 0);
    let segments = unpack(&packed);
    assert!(segments[0].classes.is_empty());
    assert_eq!(all_entries(&segments)[0].bytes, not_a_class);
}

#[test]
fn unparsable_class_fails_without_pass_prefix() {
    let entries = vec![entry("Broken.class", b"nope", 1)];
    let mut packed = Vec::new();
    assert!(segment::pack_all(&mut packed, entries, None, PackOptions::default()).is_err());
}

// ---------------------------------------------------------------------------
// Segment limits
// ---------------------------------------------------------------------------

fn sized_entries(n: usize) -> Vec<std::io::Result<SourceEntry>> {
    (0..n)
        .map(|i| entry(&format!("f{i}.txt"), &[i as u8; 100], i as i64))
        .collect()
}

#[test]
fn unlimited_segment_holds_everything() {
    let opts = PackOptions {
        segment_limit: -1,
        ..PackOptions::default()
    };
    let (packed, stats) = pack(sized_entries(40), None, opts);
    assert_eq!(stats.segments, 1);
    assert_eq!(unpack(&packed)[0].files.len(), 40);
}

#[test]
fn zero_limit_flushes_each_costed_entry() {
    let mut entries = vec![entry("META-INF/a", b"free", 0)];
    entries.extend(sized_entries(3));
    let opts = PackOptions {
        segment_limit: 0,
        ..PackOptions::default()
    };
    let (packed, stats) = pack(entries, None, opts);
    assert_eq!(stats.segments, 3);
    let segments = unpack(&packed);
    let sizes: Vec<usize> = segments.iter().map(|s| s.files.len()).collect();
    // The zero-cost META-INF entry rides with the first costed entry.
    assert_eq!(sizes, vec![2, 1, 1]);
}

#[test]
fn positive_limit_splits_segments() {
    // Each entry costs 6 + 100 + 5 = 111.
    let opts = PackOptions {
        segment_limit: 250,
        ..PackOptions::default()
    };
    let (packed, stats) = pack(sized_entries(5), None, opts);
    assert_eq!(stats.segments, 2);
    let segments = unpack(&packed);
    let sizes: Vec<usize> = segments.iter().map(|s| s.files.len()).collect();
    assert_eq!(sizes, vec![2, 3]);

    let names: Vec<String> = all_entries(&segments).into_iter().map(|e| e.name).collect();
    assert_eq!(names, vec!["f0.txt", "f1.txt", "f2.txt", "f3.txt", "f4.txt"]);
}

#[test]
fn classes_stay_whole_across_segments() {
    let looped = loop_class_bytes();
    let entries = vec![
        entry("pkg/A.class", &looped, 1),
        entry("pkg/B.class", &looped, 2),
        entry("pkg/C.class", &looped, 3),
    ];
    let opts = PackOptions {
        segment_limit: 0,
        ..PackOptions::default()
    };
    let (packed, stats) = pack(entries, None, opts);
    assert_eq!(stats.segments, 3);
    for s in unpack(&packed) {
        assert_eq!(s.classes.len(), 1);
        assert_eq!(s.entries().unwrap()[0].bytes, looped);
    }
}

// ---------------------------------------------------------------------------
// Malformed input
// ---------------------------------------------------------------------------

#[test]
fn empty_input_has_no_segments() {
    assert!(unpack(&[]).is_empty());
}

#[test]
fn bad_magic_is_rejected() {
    let err = segment::unpack_all(&[0xCA, 0xFE, 0xBA, 0xBE, 0][..], UnknownOpcodePolicy::Warn)
        .unwrap_err();
    assert!(matches!(err, PackError::Malformed(_)));
}

#[test]
fn unknown_version_is_unsupported() {
    let mut bytes = SEGMENT_MAGIC.to_vec();
    bytes.extend_from_slice(&[2, 0]);
    let err = segment::unpack_all(&bytes[..], UnknownOpcodePolicy::Warn).unwrap_err();
    assert!(matches!(err, PackError::Unsupported(_)));
}

#[test]
fn unknown_option_bits_are_rejected() {
    let mut bytes = SEGMENT_MAGIC.to_vec();
    let bits = (SegmentOptions::all().bits() + 1) as u8;
    bytes.extend_from_slice(&[1, 0, bits]);
    assert!(segment::unpack_all(&bytes[..], UnknownOpcodePolicy::Warn).is_err());
}

#[test]
fn huge_header_counts_fail_without_allocating() {
    for slot in 0..3 {
        let mut bytes = SEGMENT_MAGIC.to_vec();
        bytes.extend_from_slice(&[1, 0, 0]);
        // string, class and file counts, then a zero header size.
        for i in 0..3 {
            let count = if i == slot { i32::MAX } else { 0 };
            assert!(UNSIGNED5.encode_value(count, 0, &mut bytes));
        }
        bytes.push(0);
        bytes.push(1);
        let err = segment::unpack_all(&bytes[..], UnknownOpcodePolicy::Warn).unwrap_err();
        assert!(matches!(err, PackError::Malformed(_)), "slot {slot}: {err}");
    }
}

#[test]
fn truncated_segments_fail() {
    let entries = vec![
        entry("pkg/Loop.class", &loop_class_bytes(), 1),
        entry("data.bin", &[1, 2, 3, 4, 5, 6, 7, 8], 2),
    ];
    let (packed, _) = pack(entries, None, PackOptions::default());
    for cut in [2, 6, packed.len() / 2, packed.len() - 1] {
        assert!(
            segment::unpack_all(&packed[..cut], UnknownOpcodePolicy::Warn).is_err(),
            "cut at {cut}"
        );
    }
}

#[test]
fn trailing_garbage_after_segment_fails() {
    let (mut packed, _) = pack(vec![entry("a", b"a", 0)], None, PackOptions::default());
    packed.push(0x42);
    assert!(segment::unpack_all(&packed[..], UnknownOpcodePolicy::Warn).is_err());
}
