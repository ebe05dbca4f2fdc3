// Decoded instruction model.

use std::fmt;

use super::encoder::OperandError;
use super::text::TextEncoding;

/// Operand payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Little-endian integer, `declared_len` bytes wide on the wire.
    Numeric(u32),
    /// String stored in the script's text encoding.
    Text(String),
    /// Bytes emitted verbatim.
    Raw(Vec<u8>),
}

/// A single operand following an opcode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    /// Byte width for numerics; for embedded operands, the value of the
    /// 2-byte length prefix (an element count for `0x850`).
    pub declared_len: u16,
    /// Whether `declared_len` is itself written to the stream.
    pub length_embedded: bool,
    pub payload: Payload,
}

impl Operand {
    /// Fixed-width numeric operand.
    pub fn numeric(width: u16, value: u32) -> Self {
        Self {
            declared_len: width,
            length_embedded: false,
            payload: Payload::Numeric(value),
        }
    }

    /// Length-prefixed text operand; the prefix is the encoded byte count.
    pub fn text(text: &str, encoding: TextEncoding) -> Result<Self, OperandError> {
        let len = encoding
            .encode(text)
            .ok_or_else(|| OperandError::Unencodable {
                text: text.to_owned(),
                encoding,
            })?
            .len();
        let declared_len = u16::try_from(len).map_err(|_| OperandError::TooLong { len })?;
        Ok(Self {
            declared_len,
            length_embedded: true,
            payload: Payload::Text(text.to_owned()),
        })
    }

    /// Length-prefixed raw operand with an explicit prefix value.
    pub fn raw(declared_len: u16, bytes: Vec<u8>) -> Self {
        Self {
            declared_len,
            length_embedded: true,
            payload: Payload::Raw(bytes),
        }
    }

    pub fn as_numeric(&self) -> Option<u32> {
        match self.payload {
            Payload::Numeric(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_raw(&self) -> Option<&[u8]> {
        match &self.payload {
            Payload::Raw(b) => Some(b),
            _ => None,
        }
    }
}

impl fmt::Display for Payload {
    /// Disassembly rendering: decimal numbers, verbatim text, hex bytes.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
            Self::Raw(bytes) => {
                for (i, b) in bytes.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" ")?;
                    }
                    write!(f, "{b:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// One opcode with its operands, in stream order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    pub opcode: u16,
    pub operands: Vec<Operand>,
}

impl Instruction {
    pub fn new(opcode: u16, operands: Vec<Operand>) -> Self {
        Self { opcode, operands }
    }
}

// ---------------------------------------------------------------------------
// InstructionStream
// ---------------------------------------------------------------------------

/// Ordered instruction list of one script body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstructionStream {
    instructions: Vec<Instruction>,
}

impl InstructionStream {
    pub fn new(instructions: Vec<Instruction>) -> Self {
        Self { instructions }
    }

    pub fn as_slice(&self) -> &[Instruction] {
        &self.instructions
    }

    pub fn len(&self) -> usize {
        self.instructions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instructions.is_empty()
    }

    pub fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    /// Insert `instruction` before position `index` (`index == len` appends).
    ///
    /// # Panics
    /// If `index > len`.
    pub fn insert(&mut self, index: usize, instruction: Instruction) {
        self.instructions.insert(index, instruction);
    }

    /// Whether the instruction before `index` has `opcode`.
    pub fn preceded_by(&self, index: usize, opcode: u16) -> bool {
        index > 0
            && self
                .instructions
                .get(index - 1)
                .is_some_and(|prev| prev.opcode == opcode)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Instruction> {
        self.instructions.iter()
    }

    pub fn into_inner(self) -> Vec<Instruction> {
        self.instructions
    }
}

impl From<Vec<Instruction>> for InstructionStream {
    fn from(instructions: Vec<Instruction>) -> Self {
        Self::new(instructions)
    }
}

impl<'a> IntoIterator for &'a InstructionStream {
    type Item = &'a Instruction;
    type IntoIter = std::slice::Iter<'a, Instruction>;

    fn into_iter(self) -> Self::IntoIter {
        self.instructions.iter()
    }
}
