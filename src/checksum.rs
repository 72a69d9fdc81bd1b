// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Trailing whole-file checksum.
//!
//! A finished artifact may carry a CRC32 over everything before the last four
//! bytes, stored little-endian at the very end. The writer appends it after
//! the final merge; the reader verifies it before mapping anything. If the
//! digest is wrong, something got corrupted or truncated. Don't trust the
//! data.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use crc32fast::Hasher as Crc32Hasher;

use crate::error::{Error, Result};

/// Size of the trailing digest in bytes.
pub const CHECKSUM_BYTES: u64 = 4;

/// Compute the CRC32 of the first `limit` bytes of `file`, streaming.
fn crc32_prefix(file: &mut File, limit: u64) -> Result<u32> {
    let mut hasher = Crc32Hasher::new();
    let mut remaining = limit;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let want = remaining.min(buf.len() as u64) as usize;
        let n = file.read(&mut buf[..want])?;
        if n == 0 {
            return Err(Error::malformed("file truncated while checksumming"));
        }
        hasher.update(&buf[..n]);
        remaining -= n as u64;
    }
    Ok(hasher.finalize())
}

/// Append the CRC32 of the file's current contents to its end.
pub fn append_checksum(path: &Path) -> Result<()> {
    let mut file = OpenOptions::new().read(true).append(true).open(path)?;
    let len = file.metadata()?.len();
    let crc = crc32_prefix(&mut file, len)?;
    file.write_all(&crc.to_le_bytes())?;
    file.flush()?;
    Ok(())
}

/// Verify the trailing CRC32 of a checksummed artifact.
///
/// Fails with [`Error::IntegrityError`] on mismatch and
/// [`Error::MalformedData`] if the file is too short to carry a digest.
pub fn verify_checksum(path: &Path) -> Result<()> {
    let mut file = File::open(path)?;
    let len = file.metadata()?.len();
    if len < CHECKSUM_BYTES {
        return Err(Error::malformed("file too short for trailing checksum"));
    }

    let computed = crc32_prefix(&mut file, len - CHECKSUM_BYTES)?;

    let mut stored = [0u8; CHECKSUM_BYTES as usize];
    file.read_exact(&mut stored)?;
    let stored = u32::from_le_bytes(stored);

    if computed != stored {
        return Err(Error::IntegrityError(format!(
            "checksum mismatch: computed {computed:#010x}, stored {stored:#010x}"
        )));
    }
    Ok(())
}
