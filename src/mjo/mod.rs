// Majiro object (`.mjo`) format implementation.
//
// # Modules
//
// - `keystream`   - XOR keystream table (resource parsing, builtin key)
// - `header`      - Signature, header fields and entry table
// - `opcode`      - Opcode -> operand grammar table
// - `instruction` - Instruction / operand model
// - `text`        - Text operand encodings
// - `decoder`     - Instruction stream decoding
// - `encoder`     - Instruction stream encoding
// - `disasm`      - Text disassembly

pub mod decoder;
pub mod disasm;
pub mod encoder;
pub mod header;
pub mod instruction;
pub mod keystream;
pub mod opcode;
pub mod text;

// Re-export key types for convenience.
pub use decoder::{ByteReader, CodecOptions, DecodeError, InstructionDecoder, decode_all};
pub use disasm::Disassembly;
pub use encoder::{EncodeError, InstructionEncoder, OperandError, encode_all};
pub use header::{ContainerHeader, EntryRecord, HeaderError, SIGNATURE};
pub use instruction::{Instruction, InstructionStream, Operand, Payload};
pub use keystream::{KeystreamTable, ResourceError};
pub use opcode::{Grammar, grammar_for};
pub use text::TextEncoding;
