// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Artifact readers.
//!
//! A reader parses the header, verifies the trailing checksum when the
//! artifact carries one, memory-maps the whole file read-only, and validates
//! every recorded offset against the file length before trusting it. After
//! construction a reader is immutable: concurrent queries on one instance,
//! and concurrent readers on one file, are safe.

mod hash;
mod trie;

pub use hash::HashReader;
pub use trie::TrieReader;

use std::borrow::Cow;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::{Error, Result};
use crate::writer::{BuildType, CompressType};

/// Load-time configuration.
#[derive(Clone, Copy, Debug, Default)]
pub struct ReaderOption {
    /// Prefault the mapping instead of demand-paging it.
    pub mmap_populate: bool,
}

/// Read-only view of a finished artifact.
///
/// All observable state lives in read-only mapped pages and owned decoded
/// integers, so one reader may serve concurrent queries.
pub trait Reader: Send + Sync {
    /// Whether `key` was stored.
    fn exist(&self, key: &[u8]) -> bool;

    /// The value stored for `key`. Borrows from the mapping for raw values;
    /// Snappy and Dfa values are reconstructed into owned buffers. Returns
    /// `None` for absent keys and on set artifacts.
    fn get(&self, key: &[u8]) -> Result<Option<Cow<'_, [u8]>>>;

    /// `get` with a lossy UTF-8 conversion, for text-valued stores.
    fn get_string(&self, key: &[u8]) -> Result<Option<String>> {
        Ok(self
            .get(key)?
            .map(|v| String::from_utf8_lossy(&v).into_owned()))
    }

    /// Up to `count` stored keys starting with `prefix`, paired with their
    /// values, in index enumeration order. Trie artifacts only; the hash
    /// variant logs and returns an empty result.
    fn prefix_get(&self, prefix: &[u8], count: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>>;
}

/// Open an artifact, dispatching on its 7-byte magic.
pub fn open_reader(option: ReaderOption, path: impl AsRef<Path>) -> Result<Box<dyn Reader>> {
    let path = path.as_ref();
    let magic = read_magic(path)?;
    if &magic == crate::writer::HASH_MAGIC {
        Ok(Box::new(HashReader::open(option, path)?))
    } else if &magic == crate::writer::TRIE_MAGIC {
        Ok(Box::new(TrieReader::open(option, path)?))
    } else {
        Err(Error::UnsupportedFormat(format!(
            "unrecognized magic {:?}",
            String::from_utf8_lossy(&magic)
        )))
    }
}

fn read_magic(path: &Path) -> Result<[u8; 7]> {
    let mut file = File::open(path)?;
    let mut magic = [0u8; 7];
    read_exact(&mut file, &mut magic, "magic")?;
    Ok(magic)
}

// ── Header parsing helpers ───────────────────────────────────────────────────

pub(crate) fn read_exact<R: Read>(r: &mut R, buf: &mut [u8], what: &str) -> Result<()> {
    r.read_exact(buf).map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            Error::malformed(format!("truncated header while reading {what}"))
        } else {
            Error::Io(e)
        }
    })
}

pub(crate) fn read_u8<R: Read>(r: &mut R, what: &str) -> Result<u8> {
    let mut buf = [0u8; 1];
    read_exact(r, &mut buf, what)?;
    Ok(buf[0])
}

pub(crate) fn read_i32<R: Read>(r: &mut R, what: &str) -> Result<i32> {
    let mut buf = [0u8; 4];
    read_exact(r, &mut buf, what)?;
    Ok(i32::from_le_bytes(buf))
}

pub(crate) fn read_i64<R: Read>(r: &mut R, what: &str) -> Result<i64> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf, what)?;
    Ok(i64::from_le_bytes(buf))
}

pub(crate) fn read_f64<R: Read>(r: &mut R, what: &str) -> Result<f64> {
    let mut buf = [0u8; 8];
    read_exact(r, &mut buf, what)?;
    Ok(f64::from_le_bytes(buf))
}

/// A non-negative i32 header field, as usize.
pub(crate) fn read_count<R: Read>(r: &mut R, what: &str) -> Result<usize> {
    let v = read_i32(r, what)?;
    usize::try_from(v).map_err(|_| Error::malformed(format!("negative {what} in header")))
}

pub(crate) fn read_bool<R: Read>(r: &mut R, what: &str) -> Result<bool> {
    match read_u8(r, what)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::malformed(format!("invalid {what} byte {other}"))),
    }
}

// ── Inspection ───────────────────────────────────────────────────────────────

/// Header summary for the `inspect` CLI command.
#[derive(Debug, Clone)]
pub struct ArtifactInfo {
    pub variant: &'static str,
    pub created_at_micros: i64,
    pub compress_type: CompressType,
    pub build_type: BuildType,
    pub with_checksum: bool,
    /// Total unique keys; known from the header only in the hash variant.
    pub num_keys: Option<u64>,
    pub num_key_lengths: usize,
    pub max_key_length: usize,
    pub load_factor: Option<f64>,
    pub file_len: u64,
    /// `(name, start, end)` section spans in file order.
    pub sections: Vec<(String, u64, u64)>,
}

/// Parse an artifact header without loading the index.
pub fn inspect(path: impl AsRef<Path>) -> Result<ArtifactInfo> {
    let path = path.as_ref();
    let magic = read_magic(path)?;
    if &magic == crate::writer::HASH_MAGIC {
        hash::inspect(path)
    } else if &magic == crate::writer::TRIE_MAGIC {
        trie::inspect(path)
    } else {
        Err(Error::UnsupportedFormat(format!(
            "unrecognized magic {:?}",
            String::from_utf8_lossy(&magic)
        )))
    }
}
