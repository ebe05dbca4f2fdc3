#![no_main]
use libfuzzer_sys::fuzz_target;
use mjo::mjo::{CodecOptions, InstructionDecoder, TextEncoding, encode_all};

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }

    // First byte selects the text encoding.
    let encoding = match data[0] % 3 {
        0 => TextEncoding::ShiftJis,
        1 => TextEncoding::Gbk,
        _ => TextEncoding::Utf8,
    };
    let options = CodecOptions {
        encoding,
        strict_text: false,
    };
    let body = &data[1..];

    // Whatever prefix decodes cleanly must re-encode to the same bytes.
    let mut decoder = InstructionDecoder::new(body, options);
    let mut insts = Vec::new();
    let mut consumed = 0;
    while let Some(Ok(inst)) = decoder.next() {
        insts.push(inst);
        consumed = decoder.position();
    }

    let encoded = encode_all(&insts, options).unwrap();
    assert_eq!(encoded, &body[..consumed]);
});
