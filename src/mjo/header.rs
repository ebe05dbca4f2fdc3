// Container header layout.
//
//   0x00  signature      16 bytes  "MajiroObjX1.000\0"
//   0x14  line_count     u32 LE
//   0x18  entry_count    u32 LE
//   0x20  entry table    entry_count * 8 bytes (u32 hash, u32 offset)
//   ....  body           XOR-obfuscated instruction stream
//
// Bytes not listed above are carried through untouched.

use std::fmt;

// ---------------------------------------------------------------------------
// Layout constants
// ---------------------------------------------------------------------------

pub const SIGNATURE: [u8; 16] = *b"MajiroObjX1.000\0";
pub const SIGNATURE_LEN: usize = SIGNATURE.len();

pub const LINE_COUNT_OFFSET: usize = 0x14;
pub const ENTRY_COUNT_OFFSET: usize = 0x18;

/// Fixed part of the header, before the entry table.
pub const FIXED_HEADER_LEN: usize = 0x20;
pub const ENTRY_RECORD_LEN: usize = 8;

/// Header byte carrying an extra constant XOR, independent of the keystream.
pub const MARKER_OFFSET: usize = 9;
pub const MARKER_XOR: u8 = 0x17;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeaderError {
    #[error("signature mismatch: found {}", HexBytes(.found))]
    SignatureMismatch { found: Vec<u8> },
    #[error("header needs {needed} bytes, buffer has {len}")]
    Truncated { needed: usize, len: usize },
    #[error("entry table of {entry_count} entries overflows the address space")]
    EntryCountOverflow { entry_count: u32 },
}

struct HexBytes<'a>(&'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for b in self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Entry table
// ---------------------------------------------------------------------------

/// One record of the header's entry table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntryRecord {
    pub hash: u32,
    /// Offset into the body.
    pub offset: u32,
}

// ---------------------------------------------------------------------------
// ContainerHeader
// ---------------------------------------------------------------------------

/// Parsed header fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerHeader {
    pub line_count: u32,
    pub entry_count: u32,
    pub entries: Vec<EntryRecord>,
}

#[inline]
fn read_u32_le(bytes: &[u8], off: usize) -> u32 {
    u32::from_le_bytes([bytes[off], bytes[off + 1], bytes[off + 2], bytes[off + 3]])
}

/// Header length implied by `entry_count`, if it fits in `usize`.
pub fn header_len(entry_count: u32) -> Option<usize> {
    usize::try_from(entry_count)
        .ok()?
        .checked_mul(ENTRY_RECORD_LEN)?
        .checked_add(FIXED_HEADER_LEN)
}

/// Check the signature at the start of `bytes`.
pub fn check_signature(bytes: &[u8]) -> Result<(), HeaderError> {
    let found = &bytes[..bytes.len().min(SIGNATURE_LEN)];
    if found != SIGNATURE {
        return Err(HeaderError::SignatureMismatch {
            found: found.to_vec(),
        });
    }
    Ok(())
}

impl ContainerHeader {
    /// Parse and validate the header of an obfuscated container.
    pub fn parse(bytes: &[u8]) -> Result<Self, HeaderError> {
        check_signature(bytes)?;
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(HeaderError::Truncated {
                needed: FIXED_HEADER_LEN,
                len: bytes.len(),
            });
        }

        let line_count = read_u32_le(bytes, LINE_COUNT_OFFSET);
        let entry_count = read_u32_le(bytes, ENTRY_COUNT_OFFSET);
        let needed =
            header_len(entry_count).ok_or(HeaderError::EntryCountOverflow { entry_count })?;
        if needed > bytes.len() {
            return Err(HeaderError::Truncated {
                needed,
                len: bytes.len(),
            });
        }

        let entries = bytes[FIXED_HEADER_LEN..needed]
            .chunks_exact(ENTRY_RECORD_LEN)
            .map(|rec| EntryRecord {
                hash: read_u32_le(rec, 0),
                offset: read_u32_le(rec, 4),
            })
            .collect();

        Ok(Self {
            line_count,
            entry_count,
            entries,
        })
    }

    /// Byte offset where the instruction stream starts.
    pub fn header_len(&self) -> usize {
        FIXED_HEADER_LEN + self.entries.len() * ENTRY_RECORD_LEN
    }
}
