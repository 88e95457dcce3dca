//! File checksum helpers
//!
//! Checksums are stored and transmitted as `"sha256:<hex>"` so the
//! algorithm travels with the digest and can be extended later.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use sha2::{Digest, Sha256};

use crate::error::{CourierError, Result};

/// Read granularity for large files
const READ_CHUNK: usize = 64 * 1024;

/// Algorithm prefix used by this build
pub const ALGORITHM: &str = "sha256";

/// Compute the checksum of a file as `"sha256:<hex>"`.
pub fn file_checksum(path: &Path) -> Result<String> {
    let mut file = File::open(path).map_err(|source| CourierError::FileRead {
        path: path.to_path_buf(),
        source,
    })?;

    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        let n = file.read(&mut buf).map_err(|source| CourierError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    Ok(format!("{}:{:x}", ALGORITHM, hasher.finalize()))
}

/// Compute the checksum of an in-memory buffer as `"sha256:<hex>"`.
pub fn bytes_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{}:{:x}", ALGORITHM, hasher.finalize())
}

/// Verify a file against an expected `"algorithm:hex"` string.
///
/// Returns the actual checksum on mismatch so callers can report both sides.
pub fn verify_file(path: &Path, expected: &str) -> Result<()> {
    let (algorithm, _) = expected
        .split_once(':')
        .ok_or_else(|| CourierError::bad_request(format!("malformed checksum '{expected}'")))?;
    if algorithm != ALGORITHM {
        return Err(CourierError::bad_request(format!(
            "unsupported checksum algorithm '{algorithm}'"
        )));
    }

    let actual = file_checksum(path)?;
    if actual != expected {
        return Err(CourierError::ChecksumMismatch {
            path: path.display().to_string(),
            expected: expected.to_string(),
            actual,
        });
    }
    Ok(())
}
