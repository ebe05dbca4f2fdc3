// Container: signature check, header parsing, de-obfuscation and body decode.
//
// A `Container` only exists fully decoded.  Opening runs the whole pipeline
// in one pass:
//   1. validate signature and header fields
//   2. XOR byte 9 with 0x17 and the body with the keystream
//   3. decode the body into an `InstructionStream`
// Exporting serializes the instructions behind the stored header and runs
// the same XOR routine again, which restores the obfuscated layout.

use std::path::Path;

use crate::mjo::decoder::{CodecOptions, DecodeError, InstructionDecoder};
use crate::mjo::disasm::Disassembly;
use crate::mjo::encoder::{EncodeError, InstructionEncoder};
use crate::mjo::header::{ContainerHeader, EntryRecord, HeaderError, MARKER_OFFSET, MARKER_XOR};
use crate::mjo::instruction::{Instruction, InstructionStream};
use crate::mjo::keystream::{KeystreamTable, ResourceError, read_resource};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ContainerError {
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("not a MajiroObjX1.000 container: {0}")]
    FormatMismatch(#[source] HeaderError),
    #[error("malformed container: {0}")]
    Malformed(#[source] HeaderError),
    #[error("body starting at {body_offset:#x}: {source}")]
    Decode {
        body_offset: usize,
        #[source]
        source: DecodeError,
    },
    #[error(transparent)]
    Encode(#[from] EncodeError),
}

impl From<HeaderError> for ContainerError {
    fn from(e: HeaderError) -> Self {
        match e {
            HeaderError::SignatureMismatch { .. } => Self::FormatMismatch(e),
            _ => Self::Malformed(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Obfuscation
// ---------------------------------------------------------------------------

/// Toggle the obfuscation of a whole container image in place.
///
/// XORs byte 9 with `0x17` and every byte from `header_len` on with the
/// keystream, counting from zero at `header_len`.  Self-inverse.
pub fn deobfuscate(image: &mut [u8], header_len: usize, key: &KeystreamTable) {
    if let Some(marker) = image.get_mut(MARKER_OFFSET) {
        *marker ^= MARKER_XOR;
    }
    if let Some(body) = image.get_mut(header_len..) {
        key.apply(body);
    }
}

// ---------------------------------------------------------------------------
// Container
// ---------------------------------------------------------------------------

/// A decoded `.mjo` script.
#[derive(Debug, Clone)]
pub struct Container {
    header: ContainerHeader,
    /// De-obfuscated header bytes, `[0, header_len)`.
    header_bytes: Vec<u8>,
    stream: InstructionStream,
    /// De-obfuscated bytes after the last whole instruction (at most one).
    trailer: Vec<u8>,
    options: CodecOptions,
}

impl Container {
    /// Read and decode a container file.
    pub fn open(
        path: impl AsRef<Path>,
        key: &KeystreamTable,
        options: CodecOptions,
    ) -> Result<Self, ContainerError> {
        let path = path.as_ref();
        let bytes = read_resource(path)?;
        log::debug!("opening {} ({} bytes)", path.display(), bytes.len());
        Self::from_bytes(bytes, key, options).inspect_err(|e| {
            if matches!(e, ContainerError::FormatMismatch(_)) {
                log::error!("{}: {e}", path.display());
            }
        })
    }

    /// Decode a container from an in-memory image.
    pub fn from_bytes(
        mut image: Vec<u8>,
        key: &KeystreamTable,
        options: CodecOptions,
    ) -> Result<Self, ContainerError> {
        let header = ContainerHeader::parse(&image)?;
        let header_len = header.header_len();
        log::debug!(
            "header: line_count={} entry_count={} header_len={header_len:#x} body_len={}",
            header.line_count,
            header.entry_count,
            image.len() - header_len
        );

        deobfuscate(&mut image, header_len, key);

        let body = &image[header_len..];
        let mut decoder = InstructionDecoder::new(body, options);
        let instructions = decoder
            .by_ref()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|source| ContainerError::Decode {
                body_offset: header_len,
                source,
            })?;
        let trailer = decoder.remainder().to_vec();
        if !trailer.is_empty() {
            log::debug!("{} trailing body byte(s) after last instruction", trailer.len());
        }
        log::debug!("decoded {} instructions", instructions.len());

        image.truncate(header_len);
        Ok(Self {
            header,
            header_bytes: image,
            stream: InstructionStream::new(instructions),
            trailer,
            options,
        })
    }

    pub fn header(&self) -> &ContainerHeader {
        &self.header
    }

    pub fn line_count(&self) -> u32 {
        self.header.line_count
    }

    pub fn entry_count(&self) -> u32 {
        self.header.entry_count
    }

    pub fn entries(&self) -> &[EntryRecord] {
        &self.header.entries
    }

    /// Offset of the instruction stream within the container.
    pub fn header_len(&self) -> usize {
        self.header_bytes.len()
    }

    /// Header bytes with the byte-9 corrective applied.
    pub fn header_bytes(&self) -> &[u8] {
        &self.header_bytes
    }

    pub fn options(&self) -> CodecOptions {
        self.options
    }

    pub fn instructions(&self) -> &[Instruction] {
        self.stream.as_slice()
    }

    pub fn stream(&self) -> &InstructionStream {
        &self.stream
    }

    pub fn into_stream(self) -> InstructionStream {
        self.stream
    }

    pub fn trailer(&self) -> &[u8] {
        &self.trailer
    }

    pub fn disassemble(&self) -> Disassembly<'_> {
        Disassembly::new(self.stream.as_slice())
    }

    /// Serialize `stream` as a plaintext body (trailer included).
    pub fn encode_body(&self, stream: &InstructionStream) -> Result<Vec<u8>, EncodeError> {
        let mut encoder = InstructionEncoder::new(Vec::new(), self.options);
        for instruction in stream {
            encoder.encode(instruction)?;
        }
        let mut body = encoder.finish();
        body.extend_from_slice(&self.trailer);
        Ok(body)
    }

    /// De-obfuscated image: header followed by the plaintext body.
    pub fn to_plain_bytes(&self) -> Result<Vec<u8>, ContainerError> {
        let mut image = self.header_bytes.clone();
        image.extend(self.encode_body(&self.stream)?);
        Ok(image)
    }

    /// Build a container image from this header and another instruction list.
    ///
    /// The entry table is copied as is; callers that move code around are
    /// responsible for keeping its offsets valid.
    pub fn assemble(
        &self,
        stream: &InstructionStream,
        key: &KeystreamTable,
    ) -> Result<Vec<u8>, ContainerError> {
        let mut image = self.header_bytes.clone();
        image.extend(self.encode_body(stream)?);
        deobfuscate(&mut image, self.header_len(), key);
        Ok(image)
    }

    /// Re-encode to the obfuscated on-disk layout.
    pub fn to_bytes(&self, key: &KeystreamTable) -> Result<Vec<u8>, ContainerError> {
        self.assemble(&self.stream, key)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mjo::header::{ENTRY_COUNT_OFFSET, FIXED_HEADER_LEN, LINE_COUNT_OFFSET, SIGNATURE};
    use crate::mjo::instruction::Operand;

    /// Build an obfuscated image from a plaintext body.
    fn image(entries: u32, body: &[u8], key: &KeystreamTable) -> Vec<u8> {
        let mut out = SIGNATURE.to_vec();
        out.resize(FIXED_HEADER_LEN, 0);
        out[LINE_COUNT_OFFSET..LINE_COUNT_OFFSET + 4].copy_from_slice(&9u32.to_le_bytes());
        out[ENTRY_COUNT_OFFSET..ENTRY_COUNT_OFFSET + 4].copy_from_slice(&entries.to_le_bytes());
        for i in 0..entries {
            out.extend_from_slice(&(0xA000 + i).to_le_bytes());
            out.extend_from_slice(&(i * 2).to_le_bytes());
        }
        let header_len = out.len();
        out.extend_from_slice(body);
        key.apply(&mut out[header_len..]);
        out
    }

    fn open(bytes: Vec<u8>, key: &KeystreamTable) -> Result<Container, ContainerError> {
        Container::from_bytes(bytes, key, CodecOptions::default())
    }

    #[test]
    fn empty_entry_table_line_marker() {
        let key = KeystreamTable::builtin();
        let c = open(image(0, &[0x3A, 0x08, 0x05, 0x00], &key), &key).unwrap();
        assert_eq!(c.header_len(), 0x20);
        assert_eq!(c.line_count(), 9);
        assert_eq!(c.instructions().len(), 1);
        assert_eq!(c.instructions()[0].opcode, 0x83A);
        assert_eq!(c.instructions()[0].operands, vec![Operand::numeric(2, 5)]);
    }

    #[test]
    fn marker_byte_is_corrected() {
        let key = KeystreamTable::builtin();
        let c = open(image(0, &[], &key), &key).unwrap();
        assert_eq!(c.header_bytes()[MARKER_OFFSET], b'X' ^ MARKER_XOR);
        assert!(c.instructions().is_empty());
    }

    #[test]
    fn entries_and_roundtrip() {
        let key = KeystreamTable::builtin();
        let mut body = vec![0x01, 0x08, 0x03, 0x00, 0x82, 0xA0, 0x00];
        body.extend([0x2B, 0x08]);
        let original = image(2, &body, &key);
        let c = open(original.clone(), &key).unwrap();
        assert_eq!(c.entry_count(), 2);
        assert_eq!(c.header_len(), 0x30);
        assert_eq!(c.entries()[1], EntryRecord {
            hash: 0xA001,
            offset: 2
        });
        assert_eq!(c.to_bytes(&key).unwrap(), original);
    }

    #[test]
    fn plain_bytes_are_deobfuscated() {
        let key = KeystreamTable::builtin();
        let body = [0x2B, 0x08, 0x2F, 0x08];
        let c = open(image(0, &body, &key), &key).unwrap();
        let plain = c.to_plain_bytes().unwrap();
        assert_eq!(&plain[0x20..], &body);
        assert_eq!(plain[MARKER_OFFSET], b'X' ^ MARKER_XOR);
    }

    #[test]
    fn trailing_byte_survives_roundtrip() {
        let key = KeystreamTable::builtin();
        let original = image(0, &[0x2B, 0x08, 0x55], &key);
        let c = open(original.clone(), &key).unwrap();
        assert_eq!(c.trailer(), &[0x55]);
        assert_eq!(c.to_bytes(&key).unwrap(), original);
    }

    #[test]
    fn signature_mismatch_is_fatal() {
        let key = KeystreamTable::builtin();
        let mut bytes = image(0, &[], &key);
        bytes[0] = b'm';
        let err = open(bytes, &key).unwrap_err();
        assert!(matches!(err, ContainerError::FormatMismatch(_)));
    }

    #[test]
    fn entry_table_outside_buffer_is_malformed() {
        let key = KeystreamTable::builtin();
        let mut bytes = image(0, &[], &key);
        bytes[ENTRY_COUNT_OFFSET] = 1;
        let err = open(bytes, &key).unwrap_err();
        assert!(matches!(err, ContainerError::Malformed(HeaderError::Truncated { .. })));
    }

    #[test]
    fn unknown_opcode_reports_body_offset() {
        let key = KeystreamTable::builtin();
        let err = open(image(1, &[0x2B, 0x08, 0x99, 0x09], &key), &key).unwrap_err();
        match err {
            ContainerError::Decode {
                body_offset,
                source: DecodeError::UnknownOpcode { opcode, offset },
            } => {
                assert_eq!(body_offset, 0x28);
                assert_eq!(opcode, 0x999);
                assert_eq!(offset, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn assemble_with_patched_stream() {
        let key = KeystreamTable::builtin();
        let c = open(image(0, &[0x2B, 0x08], &key), &key).unwrap();
        let mut stream = c.stream().clone();
        stream.insert(0, Instruction::new(0x83A, vec![Operand::numeric(2, 1)]));
        let patched = c.assemble(&stream, &key).unwrap();
        let reopened = open(patched, &key).unwrap();
        assert_eq!(reopened.stream(), &stream);
        // Original container is untouched.
        assert_eq!(c.instructions().len(), 1);
    }

    #[test]
    fn deobfuscate_is_self_inverse() {
        let key = KeystreamTable::builtin();
        let original: Vec<u8> = (0..2100u32).map(|i| (i % 251) as u8).collect();
        let mut data = original.clone();
        deobfuscate(&mut data, 0x28, &key);
        assert_ne!(data, original);
        deobfuscate(&mut data, 0x28, &key);
        assert_eq!(data, original);
    }

    #[test]
    fn missing_file_is_resource_error() {
        let key = KeystreamTable::builtin();
        let err = Container::open("/nonexistent/start.mjo", &key, CodecOptions::default())
            .unwrap_err();
        assert!(matches!(err, ContainerError::Resource(_)));
    }
}
