//! Streamed SHA-256 checksums — fixed-size chunks, no whole-file buffering.
//!
//! Ported from the original `undo.py::file_checksum` (see `DESIGN.md`).

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::core::errors::{DmError, Result};

/// Read chunk size for streaming checksums (`SPEC_FULL.md` §9).
pub const CHUNK_SIZE: usize = 8 * 1024;

/// Compute the SHA-256 of `path`, streamed in [`CHUNK_SIZE`] chunks so memory
/// use does not scale with file size.
pub fn checksum_file(path: &Path) -> Result<String> {
    let file = File::open(path).map_err(|source| DmError::io(path, source))?;
    let mut reader = BufReader::with_capacity(CHUNK_SIZE, file);
    let mut hasher = Sha256::new();
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        let read = reader
            .read(&mut buf)
            .map_err(|source| DmError::io(path, source))?;
        if read == 0 {
            break;
        }
        hasher.update(&buf[..read]);
    }
    Ok(format!("{:x}", hasher.finalize()))
}
