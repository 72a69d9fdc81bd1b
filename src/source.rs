// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Byte ownership for loaded artifacts.
//!
//! A [`ByteSource`] is the single owner of an artifact's bytes: a read-only
//! memory mapping in production, or a heap buffer when tests want to avoid
//! the filesystem. [`Section`] hands out `AsRef<[u8]>` windows into a shared
//! source, which is how trie images are consumed in place without copying
//! them out of the mapping.

use std::fs::File;
use std::ops::Range;
use std::path::Path;
use std::sync::Arc;

use crate::error::Result;

/// Owner of a loaded artifact's bytes.
#[derive(Debug)]
pub enum ByteSource {
    Mmap(memmap2::Mmap),
    Heap(Vec<u8>),
}

impl ByteSource {
    /// Map `path` read-only. `populate` requests prefaulting of the mapping.
    pub fn map_file(path: &Path, populate: bool) -> Result<ByteSource> {
        let file = File::open(path)?;
        let mut options = memmap2::MmapOptions::new();
        if populate {
            options.populate();
        }
        // SAFETY: the artifact is immutable once written; nothing truncates
        // or rewrites it while a reader holds the mapping.
        let mmap = unsafe { options.map(&file)? };
        Ok(ByteSource::Mmap(mmap))
    }

    pub fn from_vec(bytes: Vec<u8>) -> ByteSource {
        ByteSource::Heap(bytes)
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        match self {
            ByteSource::Mmap(m) => &m[..],
            ByteSource::Heap(v) => &v[..],
        }
    }
}

impl AsRef<[u8]> for ByteSource {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

/// A window into a shared [`ByteSource`].
#[derive(Clone, Debug)]
pub struct Section {
    source: Arc<ByteSource>,
    range: Range<usize>,
}

impl Section {
    /// `range` must lie within the source; the caller validates offsets
    /// against the file length beforehand.
    pub fn new(source: Arc<ByteSource>, range: Range<usize>) -> Section {
        debug_assert!(range.start <= range.end && range.end <= source.len());
        Section { source, range }
    }

    pub fn len(&self) -> usize {
        self.range.len()
    }

    pub fn is_empty(&self) -> bool {
        self.range.is_empty()
    }
}

impl AsRef<[u8]> for Section {
    #[inline]
    fn as_ref(&self) -> &[u8] {
        &self.source.as_slice()[self.range.clone()]
    }
}
