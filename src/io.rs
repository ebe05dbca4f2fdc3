// File-level helpers around `Container`.
//
// Provides `open_file()`, `write_container()`, `write_plain()` and
// `write_disassembly()` with buffered output.  Optionally computes SHA-256
// checksums of what was read and written (feature-gated behind `file-io`).

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::container::{Container, ContainerError};
use crate::mjo::decoder::CodecOptions;
use crate::mjo::keystream::{KeystreamTable, read_resource};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `open_file()`.
#[derive(Debug, Clone)]
pub struct OpenStats {
    /// Container file size in bytes.
    pub file_size: u64,
    /// Offset of the instruction stream.
    pub header_len: usize,
    /// Number of decoded instructions.
    pub instructions: usize,
    /// SHA-256 of the container file (if `file-io` feature is enabled).
    pub sha256: Option<[u8; 32]>,
}

/// Statistics returned by the `write_*` helpers.
#[derive(Debug, Clone)]
pub struct WriteStats {
    /// Bytes written.
    pub size: u64,
    /// SHA-256 of the written bytes (if `file-io` feature is enabled).
    pub sha256: Option<[u8; 32]>,
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file I/O operations.
#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error(transparent)]
    Container(#[from] ContainerError),
}

const BUF_SIZE: usize = 64 * 1024;

#[cfg(feature = "file-io")]
fn sha256(data: &[u8]) -> Option<[u8; 32]> {
    Some(sha2::Sha256::digest(data).into())
}

#[cfg(not(feature = "file-io"))]
fn sha256(_data: &[u8]) -> Option<[u8; 32]> {
    None
}

/// Lowercase hex rendering of a digest.
pub fn hex_digest(digest: &[u8; 32]) -> String {
    digest.iter().map(|b| format!("{b:02x}")).collect()
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read and decode a container file.
pub fn open_file(
    path: &Path,
    key: &KeystreamTable,
    options: CodecOptions,
) -> Result<(Container, OpenStats), IoError> {
    let bytes = read_resource(path).map_err(ContainerError::from)?;
    let file_size = bytes.len() as u64;
    let digest = sha256(&bytes);

    let container = Container::from_bytes(bytes, key, options).inspect_err(|e| {
        log::error!("{}: {e}", path.display());
    })?;
    let stats = OpenStats {
        file_size,
        header_len: container.header_len(),
        instructions: container.instructions().len(),
        sha256: digest,
    };
    Ok((container, stats))
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

fn write_bytes(path: &Path, bytes: &[u8]) -> Result<WriteStats, IoError> {
    let mut writer = BufWriter::with_capacity(BUF_SIZE, File::create(path)?);
    writer.write_all(bytes)?;
    writer.flush()?;
    Ok(WriteStats {
        size: bytes.len() as u64,
        sha256: sha256(bytes),
    })
}

/// Re-encode `container` and write the obfuscated image to `path`.
pub fn write_container(
    container: &Container,
    key: &KeystreamTable,
    path: &Path,
) -> Result<WriteStats, IoError> {
    let image = container.to_bytes(key)?;
    write_bytes(path, &image)
}

/// Write the de-obfuscated image (plain body) to `path`.
pub fn write_plain(container: &Container, path: &Path) -> Result<WriteStats, IoError> {
    let image = container.to_plain_bytes()?;
    write_bytes(path, &image)
}

/// Write the disassembly listing to `path`.
pub fn write_disassembly(container: &Container, path: &Path) -> Result<WriteStats, IoError> {
    let file = File::create(path)?;
    let mut writer = CountingWriter {
        inner: BufWriter::with_capacity(BUF_SIZE, file),
        written: 0,
        #[cfg(feature = "file-io")]
        hasher: sha2::Sha256::new(),
    };
    container.disassemble().write_to(&mut writer)?;
    writer.flush()?;

    #[cfg(feature = "file-io")]
    let sha256 = Some(writer.hasher.finalize().into());
    #[cfg(not(feature = "file-io"))]
    let sha256: Option<[u8; 32]> = None;

    Ok(WriteStats {
        size: writer.written,
        sha256,
    })
}

// ---------------------------------------------------------------------------
// Counting (and optionally hashing) writer
// ---------------------------------------------------------------------------

struct CountingWriter<W: Write> {
    inner: W,
    written: u64,
    #[cfg(feature = "file-io")]
    hasher: sha2::Sha256,
}

impl<W: Write> Write for CountingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        #[cfg(feature = "file-io")]
        self.hasher.update(&buf[..n]);
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
