#![no_main]
use libfuzzer_sys::fuzz_target;
use mjo::container::Container;
use mjo::mjo::{CodecOptions, KeystreamTable, decode_all};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors, never panics.
    let _ = decode_all(data, CodecOptions::default());

    // Same for whole containers, with the signature forced in so the
    // header and body paths get exercised.
    let mut image = b"MajiroObjX1.000\0".to_vec();
    image.extend_from_slice(data);
    let _ = Container::from_bytes(image, &KeystreamTable::builtin(), CodecOptions::default());
});
