#![no_main]
use std::io::Cursor;

use libfuzzer_sys::fuzz_target;
use oxipack::codec::{BandCodec, BandReader, BandWriter, DELTA5, SIGNED5, UNSIGNED5};

fuzz_target!(|data: &[u8]| {
    if data.len() < 2 {
        return;
    }
    let codec = [UNSIGNED5, SIGNED5, DELTA5][usize::from(data[0] % 3)];
    let effort = u32::from(data[1] % 10);

    // Arbitrary header and body bytes must decode or fail cleanly.
    let split = data.len() / 2;
    let mut r = BandReader::new(Cursor::new(&data[split..]), &data[2..split]);
    let _ = r.decode_ints("fuzz", BandCodec::of(codec), data.len());

    // Values built from the input round-trip at any effort.
    let values: Vec<i32> = data[2..]
        .chunks(4)
        .map(|c| {
            let mut b = [0u8; 4];
            b[..c.len()].copy_from_slice(c);
            i32::from_le_bytes(b)
        })
        .collect();
    let mut w = BandWriter::new(effort);
    w.encode_ints("fuzz", BandCodec::of(codec), &values).unwrap();
    let (body, headers) = w.into_parts();
    let mut r = BandReader::new(Cursor::new(&body), &headers);
    assert_eq!(r.decode_ints("fuzz", BandCodec::of(codec), values.len()).unwrap(), values);
});
