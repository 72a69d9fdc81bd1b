// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Artifact writers.
//!
//! A writer is single-use: construct, `put` every entry, `close`. Values
//! stream to per-key-length temp files under the configured temp folder while
//! keys accumulate in memory; `close` builds the index, merges every segment
//! into the output file, optionally appends the checksum, and deletes the
//! temp files. `close` is idempotent, and dropping an unclosed writer
//! performs a best-effort close.

mod hash;
mod trie;

pub use hash::HashWriter;
pub use trie::TrieWriter;

pub(crate) use hash::HASH_MAGIC;
pub(crate) use trie::TRIE_MAGIC;

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// How values are stored in a map artifact.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum CompressType {
    /// Raw bytes.
    #[default]
    None = 0,
    /// Each value compressed individually with Snappy.
    Snappy = 1,
    /// Values deduplicated into a second trie; per-key ids cross-reference it.
    Dfa = 2,
}

impl CompressType {
    pub(crate) fn from_u8(v: u8) -> Result<CompressType> {
        match v {
            0 => Ok(CompressType::None),
            1 => Ok(CompressType::Snappy),
            2 => Ok(CompressType::Dfa),
            other => Err(Error::UnsupportedFormat(format!(
                "unknown compress type {other}"
            ))),
        }
    }
}

/// Whether the artifact stores values at all.
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub enum BuildType {
    #[default]
    Map = 0,
    Set = 1,
}

impl BuildType {
    pub(crate) fn from_u8(v: u8) -> Result<BuildType> {
        match v {
            0 => Ok(BuildType::Map),
            1 => Ok(BuildType::Set),
            other => Err(Error::UnsupportedFormat(format!(
                "unknown build type {other}"
            ))),
        }
    }
}

/// Build-time configuration.
#[derive(Clone, Debug)]
pub struct WriterOption {
    /// Folder for temp spools; created if missing, entries deleted at close.
    pub temp_folder: PathBuf,
    pub compress_type: CompressType,
    pub build_type: BuildType,
    /// Append a trailing checksum verified at load time.
    pub with_checksum: bool,
    /// `0.0` selects the trie variant; a value in `(0, 1)` selects the hash
    /// variant with open-addressed tables at that fill rate.
    pub load_factor: f64,
}

impl Default for WriterOption {
    fn default() -> Self {
        WriterOption {
            temp_folder: PathBuf::from("./tmp"),
            compress_type: CompressType::None,
            build_type: BuildType::Map,
            with_checksum: false,
            load_factor: 0.0,
        }
    }
}

impl WriterOption {
    /// Set artifacts carry no value region.
    pub fn is_no_data_section(&self) -> bool {
        self.build_type == BuildType::Set
    }
}

/// Streaming builder for a static artifact.
pub trait Writer {
    /// Insert a key (set mode). Empty keys are silently dropped.
    fn put(&mut self, key: &[u8]) -> Result<()>;

    /// Insert a key-value pair (map mode). Empty keys are silently dropped.
    fn put_value(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    /// Finalize the artifact. Idempotent.
    fn close(&mut self) -> Result<()>;
}

/// Pick the variant from the options: hash when a load factor is given,
/// trie otherwise.
pub fn create_writer(option: WriterOption, path: impl AsRef<Path>) -> Result<Box<dyn Writer>> {
    if option.load_factor != 0.0 {
        Ok(Box::new(HashWriter::create(option, path.as_ref())?))
    } else {
        Ok(Box::new(TrieWriter::create(option, path.as_ref())?))
    }
}
