// XOR keystream table used to obfuscate the instruction region.
//
// The resource format is plain text: two-digit hexadecimal tokens separated
// by spaces, carriage returns or newlines, consumed in file order.  The
// engine's own key is the 1024-byte CRC-32 lookup table, available here as
// `KeystreamTable::builtin()`.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Index mask applied to the running body counter (1024-entry table).
pub const KEYSTREAM_MASK: usize = 0x3FF;

/// Expected table length.
pub const KEYSTREAM_LEN: usize = KEYSTREAM_MASK + 1;

/// CRC-32 (IEEE, reflected) polynomial the builtin table is derived from.
const CRC32_POLY: u32 = 0xEDB8_8320;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A byte source (keystream resource or container file) could not be read.
#[derive(Debug, thiserror::Error)]
#[error("cannot read {}: {source}", path.display())]
pub struct ResourceError {
    pub path: PathBuf,
    #[source]
    pub source: io::Error,
}

impl ResourceError {
    pub fn new(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self {
            path: path.into(),
            source,
        }
    }
}

/// Read a whole file, attaching the path to any failure.
pub fn read_resource(path: &Path) -> Result<Vec<u8>, ResourceError> {
    fs::read(path).map_err(|e| ResourceError::new(path, e))
}

// ---------------------------------------------------------------------------
// KeystreamTable
// ---------------------------------------------------------------------------

/// Repeating XOR keystream.
///
/// Immutable once built; share it by reference (or `Arc`) across as many
/// containers and threads as needed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeystreamTable {
    bytes: Vec<u8>,
}

impl KeystreamTable {
    /// Wrap an already materialized key.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        if bytes.len() != KEYSTREAM_LEN {
            log::warn!(
                "keystream has {} bytes, expected {KEYSTREAM_LEN}; missing slots act as 0",
                bytes.len()
            );
        }
        Self { bytes }
    }

    /// Load a keystream resource file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ResourceError> {
        let path = path.as_ref();
        let raw = read_resource(path)?;
        log::debug!("loading keystream from {}", path.display());
        Ok(Self::parse(&String::from_utf8_lossy(&raw)))
    }

    /// Parse keystream resource text.
    ///
    /// Tokens are not range checked: values above `0xFF` keep their low byte
    /// and non-hexadecimal tokens contribute `0`.
    pub fn parse(text: &str) -> Self {
        let bytes = text
            .split([' ', '\r', '\n'])
            .filter(|token| !token.is_empty())
            .map(|token| match u64::from_str_radix(token, 16) {
                Ok(value) => value as u8,
                Err(e) => {
                    log::debug!("keystream token {token:?} is not hexadecimal ({e}), using 0");
                    0
                }
            })
            .collect();
        Self::from_bytes(bytes)
    }

    /// The engine's key: the CRC-32 lookup table as little-endian words.
    pub fn builtin() -> Self {
        let mut bytes = Vec::with_capacity(KEYSTREAM_LEN);
        for n in 0..256u32 {
            let mut c = n;
            for _ in 0..8 {
                c = if c & 1 != 0 {
                    CRC32_POLY ^ (c >> 1)
                } else {
                    c >> 1
                };
            }
            bytes.extend_from_slice(&c.to_le_bytes());
        }
        Self { bytes }
    }

    /// Raw key bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Key byte for the `counter`-th body byte.
    #[inline]
    pub fn key_at(&self, counter: usize) -> u8 {
        self.bytes.get(counter & KEYSTREAM_MASK).copied().unwrap_or(0)
    }

    /// XOR `data` in place, treating `data[0]` as counter 0.
    ///
    /// Applying this twice restores the input.
    pub fn apply(&self, data: &mut [u8]) {
        for (counter, byte) in data.iter_mut().enumerate() {
            *byte ^= self.key_at(counter);
        }
    }
}

impl Default for KeystreamTable {
    fn default() -> Self {
        Self::builtin()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
