#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipack::bytecode::UnknownOpcodePolicy;
use oxipack::segment::{self, ModTime, PackOptions, SourceEntry};

fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }

    // Control bytes: effort, limit and modtime handling, entry count.
    let effort = u32::from(data[0] % 10);
    let segment_limit = match data[1] % 3 {
        0 => -1,
        1 => 0,
        _ => i64::from(data[1]) * 4,
    };
    let latest = data[1] & 0x80 != 0;
    let count = 1 + usize::from(data[2] % 8);
    let payload = &data[3..];

    let chunk = payload.len() / count + 1;
    let files: Vec<(String, Vec<u8>, i64)> = payload
        .chunks(chunk)
        .enumerate()
        .map(|(i, c)| {
            let name = if i % 3 == 2 {
                format!("META-INF/f{i}")
            } else {
                format!("dir/f{i}.bin")
            };
            let modtime = i64::from(c.first().copied().unwrap_or(0)) * 1_000_003 - 50_000;
            (name, c.to_vec(), modtime)
        })
        .collect();

    let entries = files
        .iter()
        .map(|(n, b, t)| Ok(SourceEntry::from_bytes(n.clone(), b.clone(), *t)));
    let opts = PackOptions {
        effort,
        segment_limit,
        modification_time: if latest { ModTime::Latest } else { ModTime::Keep },
        ..PackOptions::default()
    };
    let mut packed = Vec::new();
    segment::pack_all(&mut packed, entries, None, opts).expect("packing plain files must succeed");

    let segments = segment::unpack_all(&packed[..], UnknownOpcodePolicy::Reject)
        .expect("packed output must unpack");
    let got: Vec<_> = segments.iter().flat_map(|s| s.entries().unwrap()).collect();
    assert_eq!(got.len(), files.len());
    for (entry, (name, bytes, modtime)) in got.iter().zip(&files) {
        assert_eq!(&entry.name, name);
        assert_eq!(&entry.bytes, bytes);
        if !latest {
            assert_eq!(entry.modtime, *modtime);
        }
    }
});
