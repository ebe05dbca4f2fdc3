// Instruction stream encoder.
//
// Inverse of the decoder: opcode as u16 LE, then each operand as an optional
// u16 LE length prefix followed by its payload.  Lengths are written as
// declared, so an operand whose payload was edited must be rebuilt with
// `Operand::text` (or have its `declared_len` fixed up) before encoding.

use std::io::{self, Write};

use super::decoder::CodecOptions;
use super::instruction::{Instruction, Operand, Payload};
use super::opcode;
use super::text::TextEncoding;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Why a single operand cannot be serialized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OperandError {
    #[error("numeric width {0} is not 1..=4 bytes")]
    UnsupportedWidth(u16),
    #[error("value {value} does not fit in {width} byte(s)")]
    Overflow { value: u32, width: u16 },
    #[error("text {text:?} cannot be represented in {encoding}")]
    Unencodable { text: String, encoding: TextEncoding },
    #[error("{len} byte payload exceeds the 16-bit length prefix")]
    TooLong { len: usize },
    #[error("length prefix {declared} implies {expected} payload bytes, found {actual}")]
    LengthMismatch {
        declared: u16,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("opcode {opcode:#06x} operand {index}: {reason}")]
    Operand {
        opcode: u16,
        index: usize,
        #[source]
        reason: OperandError,
    },
}

// ---------------------------------------------------------------------------
// InstructionEncoder
// ---------------------------------------------------------------------------

/// Serializes instructions to a writer, one at a time.
///
/// Each instruction is staged in full before it is written, so a failing
/// instruction never leaves a partial record behind.
pub struct InstructionEncoder<W: Write> {
    writer: W,
    options: CodecOptions,
    scratch: Vec<u8>,
    bytes_written: u64,
    instructions_written: u64,
}

impl<W: Write> InstructionEncoder<W> {
    pub fn new(writer: W, options: CodecOptions) -> Self {
        Self {
            writer,
            options,
            scratch: Vec::new(),
            bytes_written: 0,
            instructions_written: 0,
        }
    }

    /// Encode one instruction.
    pub fn encode(&mut self, instruction: &Instruction) -> Result<(), EncodeError> {
        self.scratch.clear();
        self.scratch.extend_from_slice(&instruction.opcode.to_le_bytes());
        for (index, operand) in instruction.operands.iter().enumerate() {
            encode_operand(
                &mut self.scratch,
                instruction.opcode,
                operand,
                self.options.encoding,
            )
            .map_err(|reason| EncodeError::Operand {
                opcode: instruction.opcode,
                index,
                reason,
            })?;
        }
        self.writer.write_all(&self.scratch)?;
        self.bytes_written += self.scratch.len() as u64;
        self.instructions_written += 1;
        Ok(())
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn instructions_written(&self) -> u64 {
        self.instructions_written
    }

    /// Return the underlying writer.
    pub fn finish(self) -> W {
        self.writer
    }
}

fn encode_operand(
    out: &mut Vec<u8>,
    opcode: u16,
    operand: &Operand,
    encoding: TextEncoding,
) -> Result<(), OperandError> {
    if operand.length_embedded {
        out.extend_from_slice(&operand.declared_len.to_le_bytes());
    }

    match &operand.payload {
        Payload::Numeric(value) => {
            let width = operand.declared_len;
            if !(1..=4).contains(&width) {
                return Err(OperandError::UnsupportedWidth(width));
            }
            if width < 4 && *value >> (8 * width) != 0 {
                return Err(OperandError::Overflow {
                    value: *value,
                    width,
                });
            }
            out.extend_from_slice(&value.to_le_bytes()[..width as usize]);
        }
        Payload::Text(text) => {
            let bytes = encoding
                .encode(text)
                .ok_or_else(|| OperandError::Unencodable {
                    text: text.clone(),
                    encoding,
                })?;
            check_prefix(opcode, operand, bytes.len())?;
            out.extend_from_slice(&bytes);
        }
        Payload::Raw(bytes) => {
            check_prefix(opcode, operand, bytes.len())?;
            out.extend_from_slice(bytes);
        }
    }
    Ok(())
}

/// An embedded prefix must describe the payload that follows it.
fn check_prefix(opcode: u16, operand: &Operand, actual: usize) -> Result<(), OperandError> {
    if !operand.length_embedded {
        return Ok(());
    }
    let declared = operand.declared_len;
    let expected =
        opcode::grammar_for(opcode).map_or(declared as usize, |g| g.payload_len(declared));
    if expected != actual {
        return Err(OperandError::LengthMismatch {
            declared,
            expected,
            actual,
        });
    }
    Ok(())
}

/// Encode a whole instruction list to bytes.
pub fn encode_all(
    instructions: &[Instruction],
    options: CodecOptions,
) -> Result<Vec<u8>, EncodeError> {
    let mut encoder = InstructionEncoder::new(Vec::new(), options);
    for instruction in instructions {
        encoder.encode(instruction)?;
    }
    Ok(encoder.finish())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mjo::decoder::decode_all;

    fn opts() -> CodecOptions {
        CodecOptions::default()
    }

    fn assert_roundtrip(body: &[u8]) {
        let insts = decode_all(body, opts()).unwrap();
        let encoded = encode_all(&insts, opts()).unwrap();
        assert_eq!(encoded, body);
    }

    #[test]
    fn roundtrip_mixed_body() {
        let mut body = Vec::new();
        body.extend([0x3A, 0x08, 0x07, 0x00]); // line 7
        body.extend([0x00, 0x08, 0xEF, 0xBE, 0xAD, 0xDE]); // u32
        body.extend([0x01, 0x08, 0x05, 0x00, 0x82, 0xA0, 0x82, 0xA2, 0x00]); // "あい\0"
        body.extend([0x29, 0x08, 0x02, 0x00, 0x00, 0x02]); // raw string
        body.extend([0x50, 0x08, 0x01, 0x00, 0x10, 0x00, 0x00, 0x00]); // switch
        body.extend([0x10, 0x08, 1, 0, 0, 0, 2, 0, 0, 0, 3, 0]); // u32 u32 u16
        body.extend([0x34, 0x08, 1, 2, 3, 4, 5, 6]); // u32 u16
        body.extend([0x37, 0x08, 1, 2, 3, 4, 5, 6, 7, 8]); // u32 u32
        body.extend([0x2B, 0x08]); // bare
        body.extend([0x20, 0x01]); // bare range
        body.extend([0xC0, 0x02, 9, 0, 8, 0, 0, 0, 7, 0]); // generic triple
        assert_roundtrip(&body);
    }

    #[test]
    fn roundtrip_invalid_text_kept_raw() {
        assert_roundtrip(&[0x40, 0x08, 0x02, 0x00, 0x82, 0xFF]);
    }

    #[test]
    fn numeric_widths() {
        let inst = Instruction::new(0x802, vec![
            Operand::numeric(2, 0xBEEF),
            Operand::numeric(4, 1),
            Operand::numeric(2, 0),
        ]);
        let bytes = encode_all(&[inst], opts()).unwrap();
        assert_eq!(bytes, vec![0x02, 0x08, 0xEF, 0xBE, 1, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn numeric_overflow_is_rejected() {
        let inst = Instruction::new(0x83A, vec![Operand::numeric(2, 0x1_0000)]);
        let err = encode_all(&[inst], opts()).unwrap_err();
        match err {
            EncodeError::Operand {
                opcode,
                index,
                reason,
            } => {
                assert_eq!(opcode, 0x83A);
                assert_eq!(index, 0);
                assert_eq!(
                    reason,
                    OperandError::Overflow {
                        value: 0x1_0000,
                        width: 2
                    }
                );
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn unsupported_width_is_rejected() {
        let inst = Instruction::new(0x800, vec![Operand::numeric(8, 1)]);
        let err = encode_all(&[inst], opts()).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::Operand {
                reason: OperandError::UnsupportedWidth(8),
                ..
            }
        ));
    }

    #[test]
    fn unencodable_text_is_rejected() {
        let inst = Instruction::new(0x801, vec![Operand {
            declared_len: 4,
            length_embedded: true,
            payload: Payload::Text("\u{1F600}".into()),
        }]);
        let err = encode_all(&[inst], opts()).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::Operand {
                reason: OperandError::Unencodable { .. },
                ..
            }
        ));
    }

    #[test]
    fn stale_length_prefix_is_rejected() {
        let inst = Instruction::new(0x801, vec![Operand {
            declared_len: 2,
            length_embedded: true,
            payload: Payload::Text("abc\0".into()),
        }]);
        let err = encode_all(&[inst], opts()).unwrap_err();
        assert!(matches!(
            err,
            EncodeError::Operand {
                reason: OperandError::LengthMismatch {
                    declared: 2,
                    expected: 2,
                    actual: 4
                },
                ..
            }
        ));
    }

    #[test]
    fn switch_prefix_counts_entries() {
        let inst = Instruction::new(opcode::OP_SWITCH, vec![Operand::raw(2, vec![0; 8])]);
        let bytes = encode_all(&[inst], opts()).unwrap();
        assert_eq!(&bytes[..4], &[0x50, 0x08, 0x02, 0x00]);
        assert_eq!(bytes.len(), 12);

        let bad = Instruction::new(opcode::OP_SWITCH, vec![Operand::raw(2, vec![0; 2])]);
        assert!(encode_all(&[bad], opts()).is_err());
    }

    #[test]
    fn rebuilt_text_operand_encodes() {
        let op = Operand::text("こんにちは\0", TextEncoding::ShiftJis).unwrap();
        let inst = Instruction::new(0x840, vec![op]);
        let bytes = encode_all(std::slice::from_ref(&inst), opts()).unwrap();
        assert_eq!(&bytes[2..4], &11u16.to_le_bytes());
        let back = decode_all(&bytes, opts()).unwrap();
        assert_eq!(back, vec![inst]);
    }

    #[test]
    fn failed_instruction_writes_nothing() {
        let good = Instruction::new(0x82B, Vec::new());
        let bad = Instruction::new(0x800, vec![Operand::numeric(0, 1)]);
        let mut encoder = InstructionEncoder::new(Vec::new(), opts());
        encoder.encode(&good).unwrap();
        assert!(encoder.encode(&bad).is_err());
        assert_eq!(encoder.bytes_written(), 2);
        assert_eq!(encoder.instructions_written(), 1);
        assert_eq!(encoder.finish(), vec![0x2B, 0x08]);
    }
}
