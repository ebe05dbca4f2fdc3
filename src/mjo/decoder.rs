// Instruction stream decoder.
//
// Sequential scan over a de-obfuscated script body: read a 2-byte opcode,
// look up its grammar, read the operands, repeat while at least two bytes
// remain.  There is no resynchronization: an unknown opcode or a truncated
// operand ends decoding with an error because later operand boundaries can
// no longer be located.

use super::instruction::{Instruction, Operand, Payload};
use super::opcode::{self, Grammar};
use super::text::TextEncoding;

// ---------------------------------------------------------------------------
// Decoder error
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("unknown opcode {opcode:#06x} at offset {offset:#x}")]
    UnknownOpcode { opcode: u16, offset: usize },
    #[error(
        "opcode {opcode:#06x} at offset {offset:#x} needs {needed} operand bytes, {available} available"
    )]
    Truncated {
        opcode: u16,
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("opcode {opcode:#06x} at offset {offset:#x}: operand is not valid {encoding} text")]
    InvalidText {
        opcode: u16,
        offset: usize,
        encoding: TextEncoding,
    },
}

impl DecodeError {
    /// Offset of the opcode that failed to decode.
    pub fn offset(&self) -> usize {
        match *self {
            Self::UnknownOpcode { offset, .. }
            | Self::Truncated { offset, .. }
            | Self::InvalidText { offset, .. } => offset,
        }
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Settings shared by the decoder and encoder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CodecOptions {
    /// Encoding of text operands.
    pub encoding: TextEncoding,
    /// Reject text operands that do not round-trip instead of keeping them raw.
    pub strict_text: bool,
}

// ---------------------------------------------------------------------------
// Byte cursor
// ---------------------------------------------------------------------------

/// Forward-only cursor over a borrowed body.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take the next `n` bytes, or `None` without moving if fewer remain.
    #[inline]
    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        if n > self.remaining() {
            return None;
        }
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Some(bytes)
    }

    #[inline]
    pub fn read_u16(&mut self) -> Option<u16> {
        self.take(2).map(|b| u16::from_le_bytes([b[0], b[1]]))
    }

    /// Little-endian unsigned integer of `width` bytes (1..=4).
    #[inline]
    pub fn read_uint(&mut self, width: usize) -> Option<u32> {
        debug_assert!((1..=4).contains(&width));
        let bytes = self.take(width)?;
        Some(
            bytes
                .iter()
                .rev()
                .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)),
        )
    }
}

// ---------------------------------------------------------------------------
// InstructionDecoder
// ---------------------------------------------------------------------------

/// Lazily decodes instructions from a body.
///
/// Yields `Err` at most once; iteration stops after the first error.
pub struct InstructionDecoder<'a> {
    reader: ByteReader<'a>,
    options: CodecOptions,
    failed: bool,
}

impl<'a> InstructionDecoder<'a> {
    pub fn new(body: &'a [u8], options: CodecOptions) -> Self {
        Self {
            reader: ByteReader::new(body),
            options,
            failed: false,
        }
    }

    /// Current cursor offset within the body.
    pub fn position(&self) -> usize {
        self.reader.position()
    }

    /// Bytes left after the last decoded instruction (fewer than two once
    /// iteration has finished cleanly).
    pub fn remainder(&self) -> &'a [u8] {
        let pos = self.reader.position();
        &self.reader.data[pos..]
    }

    fn decode_instruction(
        &mut self,
        opcode: u16,
        offset: usize,
    ) -> Result<Instruction, DecodeError> {
        let grammar =
            opcode::grammar_for(opcode).ok_or(DecodeError::UnknownOpcode { opcode, offset })?;
        let operands = self.decode_operands(opcode, offset, grammar)?;
        log::trace!(
            "{offset:#07x}: opcode {opcode:#06x} with {} operand(s)",
            operands.len()
        );
        Ok(Instruction { opcode, operands })
    }

    fn decode_operands(
        &mut self,
        opcode: u16,
        offset: usize,
        grammar: Grammar,
    ) -> Result<Vec<Operand>, DecodeError> {
        let truncated = |reader: &ByteReader<'_>, needed: usize| DecodeError::Truncated {
            opcode,
            offset,
            needed,
            available: reader.remaining(),
        };

        match grammar {
            Grammar::Bare => Ok(Vec::new()),
            Grammar::Fixed(widths) => {
                let needed = grammar.min_operand_len();
                if self.reader.remaining() < needed {
                    return Err(truncated(&self.reader, needed));
                }
                widths
                    .iter()
                    .map(|&width| {
                        self.reader
                            .read_uint(width as usize)
                            .map(|value| Operand::numeric(u16::from(width), value))
                            .ok_or_else(|| truncated(&self.reader, width as usize))
                    })
                    .collect()
            }
            Grammar::Text | Grammar::RawBytes | Grammar::Table { .. } => {
                let declared = self
                    .reader
                    .read_u16()
                    .ok_or_else(|| truncated(&self.reader, 2))?;
                let len = grammar.payload_len(declared);
                let bytes = self
                    .reader
                    .take(len)
                    .ok_or_else(|| truncated(&self.reader, len))?;
                let payload = match grammar {
                    Grammar::Text => self.text_payload(opcode, offset, bytes)?,
                    _ => Payload::Raw(bytes.to_vec()),
                };
                Ok(vec![Operand {
                    declared_len: declared,
                    length_embedded: true,
                    payload,
                }])
            }
        }
    }

    fn text_payload(
        &self,
        opcode: u16,
        offset: usize,
        bytes: &[u8],
    ) -> Result<Payload, DecodeError> {
        let encoding = self.options.encoding;
        match encoding.decode_exact(bytes) {
            Some(text) => Ok(Payload::Text(text)),
            None if self.options.strict_text => Err(DecodeError::InvalidText {
                opcode,
                offset,
                encoding,
            }),
            None => {
                log::warn!(
                    "opcode {opcode:#06x} at offset {offset:#x}: {} byte operand is not \
                     lossless {encoding}, keeping raw bytes",
                    bytes.len()
                );
                Ok(Payload::Raw(bytes.to_vec()))
            }
        }
    }
}

impl Iterator for InstructionDecoder<'_> {
    type Item = Result<Instruction, DecodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let offset = self.reader.position();
        let opcode = self.reader.read_u16()?;
        let item = self.decode_instruction(opcode, offset);
        if let Err(ref e) = item {
            log::error!("instruction decoding stopped: {e}");
            self.failed = true;
        }
        Some(item)
    }
}

/// Decode a whole body.
///
/// A single trailing byte (fewer than two left) is ignored; use
/// [`InstructionDecoder::remainder`] to recover it.
pub fn decode_all(body: &[u8], options: CodecOptions) -> Result<Vec<Instruction>, DecodeError> {
    InstructionDecoder::new(body, options).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(body: &[u8]) -> Result<Vec<Instruction>, DecodeError> {
        decode_all(body, CodecOptions::default())
    }

    #[test]
    fn line_marker_has_one_u16() {
        let insts = decode(&[0x3A, 0x08, 0x2A, 0x00]).unwrap();
        assert_eq!(insts.len(), 1);
        assert_eq!(insts[0].opcode, 0x83A);
        assert_eq!(insts[0].operands, vec![Operand::numeric(2, 42)]);
    }

    #[test]
    fn switch_table_is_count_times_four() {
        let mut body = vec![0x50, 0x08, 0x03, 0x00];
        body.extend(1..=12u8);
        let insts = decode(&body).unwrap();
        assert_eq!(insts.len(), 1);
        let op = &insts[0].operands[0];
        assert_eq!(op.declared_len, 3);
        assert!(op.length_embedded);
        assert_eq!(op.as_raw().unwrap(), &(1..=12u8).collect::<Vec<_>>()[..]);
    }

    #[test]
    fn unknown_opcode_reports_offset() {
        let body = [0x2B, 0x08, 0x99, 0x09, 0x00, 0x00];
        let err = decode(&body).unwrap_err();
        match err {
            DecodeError::UnknownOpcode { opcode, offset } => {
                assert_eq!(opcode, 0x999);
                assert_eq!(offset, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn fixed_operands_little_endian() {
        // 0x802: u16, u32, u16
        let body = [
            0x02, 0x08, 0x01, 0x02, 0x78, 0x56, 0x34, 0x12, 0xFF, 0xFF,
        ];
        let insts = decode(&body).unwrap();
        let values: Vec<u32> = insts[0]
            .operands
            .iter()
            .map(|o| o.as_numeric().unwrap())
            .collect();
        assert_eq!(values, vec![0x0201, 0x1234_5678, 0xFFFF]);
        let widths: Vec<u16> = insts[0].operands.iter().map(|o| o.declared_len).collect();
        assert_eq!(widths, vec![2, 4, 2]);
    }

    #[test]
    fn text_operand_decodes_shift_jis() {
        // 0x801 "あ\0"
        let body = [0x01, 0x08, 0x03, 0x00, 0x82, 0xA0, 0x00];
        let insts = decode(&body).unwrap();
        let op = &insts[0].operands[0];
        assert_eq!(op.as_text(), Some("あ\0"));
        assert_eq!(op.declared_len, 3);
        assert!(op.length_embedded);
    }

    #[test]
    fn raw_string_opcode_keeps_bytes() {
        let body = [0x29, 0x08, 0x02, 0x00, 0x41, 0x42];
        let insts = decode(&body).unwrap();
        assert_eq!(insts[0].operands[0].as_raw(), Some(&b"AB"[..]));
    }

    #[test]
    fn invalid_text_kept_raw_unless_strict() {
        let body = [0x40, 0x08, 0x01, 0x00, 0x82];
        let insts = decode(&body).unwrap();
        assert_eq!(insts[0].operands[0].as_raw(), Some(&[0x82u8][..]));

        let strict = CodecOptions {
            strict_text: true,
            ..Default::default()
        };
        let err = decode_all(&body, strict).unwrap_err();
        assert!(matches!(err, DecodeError::InvalidText { opcode: 0x840, offset: 0, .. }));
    }

    #[test]
    fn bare_and_generic_ranges() {
        // 0x150 (bare), 0x010 (generic u16/u32/u16)
        let body = [
            0x50, 0x01, 0x10, 0x00, 0x01, 0x00, 0x02, 0x00, 0x00, 0x00, 0x03, 0x00,
        ];
        let insts = decode(&body).unwrap();
        assert_eq!(insts.len(), 2);
        assert!(insts[0].operands.is_empty());
        assert_eq!(insts[1].operands.len(), 3);
    }

    #[test]
    fn truncated_fixed_operand() {
        let err = decode(&[0x00, 0x08, 0x01, 0x02]).unwrap_err();
        match err {
            DecodeError::Truncated {
                opcode,
                offset,
                needed,
                available,
            } => {
                assert_eq!((opcode, offset, needed, available), (0x800, 0, 4, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn truncated_length_prefixed_payload() {
        let err = decode(&[0x50, 0x08, 0x02, 0x00, 0x00]).unwrap_err();
        assert!(matches!(err, DecodeError::Truncated { needed: 8, available: 1, .. }));
    }

    #[test]
    fn trailing_odd_byte_is_left_over() {
        let body = [0x2B, 0x08, 0x7F];
        let mut decoder = InstructionDecoder::new(&body, CodecOptions::default());
        let insts: Vec<_> = decoder.by_ref().collect::<Result<_, _>>().unwrap();
        assert_eq!(insts.len(), 1);
        assert_eq!(decoder.remainder(), &[0x7F]);
        assert_eq!(decoder.position(), 2);
    }

    #[test]
    fn empty_body() {
        assert!(decode(&[]).unwrap().is_empty());
        assert!(decode(&[0x01]).unwrap().is_empty());
    }

    #[test]
    fn iteration_stops_after_error() {
        let body = [0x99, 0x09, 0x2B, 0x08];
        let mut decoder = InstructionDecoder::new(&body, CodecOptions::default());
        assert!(matches!(decoder.next(), Some(Err(_))));
        assert!(decoder.next().is_none());
    }

    #[test]
    fn cursor_is_monotonic() {
        let mut body = vec![0x3A, 0x08, 0x01, 0x00]; // line 1
        body.extend([0x2B, 0x08]); // bare
        body.extend([0x01, 0x08, 0x02, 0x00, b'a', 0x00]); // text
        let mut decoder = InstructionDecoder::new(&body, CodecOptions::default());
        let mut last = decoder.position();
        while let Some(item) = decoder.next() {
            item.unwrap();
            assert!(decoder.position() > last);
            assert!(decoder.position() <= body.len());
            last = decoder.position();
        }
        assert_eq!(last, body.len());
    }
}
