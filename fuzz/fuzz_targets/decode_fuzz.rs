#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipack::bytecode::UnknownOpcodePolicy;
use oxipack::segment;

fuzz_target!(|data: &[u8]| {
    // The segment reader must never panic on arbitrary input, only fail.
    let _ = segment::unpack_all(data, UnknownOpcodePolicy::Warn);

    // Also behind a valid magic and version, so the band layers get exercised.
    let mut framed = segment::SEGMENT_MAGIC.to_vec();
    framed.extend_from_slice(&[1, 0]);
    framed.extend_from_slice(data);
    if let Ok(segments) = segment::unpack_all(&framed[..], UnknownOpcodePolicy::Warn) {
        for s in segments {
            let _ = s.entries();
        }
    }
});
