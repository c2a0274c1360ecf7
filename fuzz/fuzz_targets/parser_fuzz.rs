#![no_main]
use libfuzzer_sys::fuzz_target;
use oxipack::bytecode::BytecodeSplitter;
use oxipack::classfile::ClassReader;

fuzz_target!(|data: &[u8]| {
    let Ok(class) = ClassReader::new().parse(data) else {
        return;
    };
    // A parsed class serializes, and splitting it never panics.
    let _ = class.to_bytes();
    let _ = BytecodeSplitter::new().split_class(&class);
});
