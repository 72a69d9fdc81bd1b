// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Trie-variant reader (`SCDBV2.` artifacts).
//!
//! Construction parses the header, verifies the trailing checksum before
//! mapping when the artifact carries one, maps the whole file read-only, and
//! binds the value codec once so queries never re-test the mode. The key
//! trie (and the value trie in Dfa mode) is interpreted in place from the
//! mapping; only the PForDelta is decoded into owned state.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::checksum::{verify_checksum, CHECKSUM_BYTES};
use crate::error::{Error, Result};
use crate::pfor::PForDelta;
use crate::reader::{
    read_bool, read_count, read_exact, read_i64, read_u8, ArtifactInfo, Reader, ReaderOption,
};
use crate::source::{ByteSource, Section};
use crate::trie::Trie;
use crate::varint::decode_varint;
use crate::writer::{BuildType, CompressType, TRIE_MAGIC};

/// Value resolution bound at construction.
#[derive(Clone, Copy, Debug)]
enum ValueCodec {
    SetOnly,
    Raw,
    Snappy,
    Dfa,
}

struct TrieHeader {
    created_at_micros: i64,
    compress_type: CompressType,
    build_type: BuildType,
    with_checksum: bool,
    /// Value-region base per key length (map mode, raw/snappy only).
    data_bases: Vec<u64>,
    num_key_lengths: usize,
    pfd_offset: u64,
    key_trie_offset: u64,
    data_offset: u64,
}

fn parse_header(r: &mut impl std::io::Read) -> Result<TrieHeader> {
    let mut magic = [0u8; 7];
    read_exact(r, &mut magic, "magic")?;
    if &magic != TRIE_MAGIC {
        return Err(Error::malformed("not a trie artifact"));
    }

    let created_at_micros = read_i64(r, "timestamp")?;
    let compress_type = CompressType::from_u8(read_u8(r, "compress type")?)?;
    let build_type = BuildType::from_u8(read_u8(r, "build type")?)?;
    let with_checksum = read_bool(r, "checksum flag")?;

    let mut data_bases = Vec::new();
    let mut num_key_lengths = 0;
    if build_type == BuildType::Map && compress_type != CompressType::Dfa {
        num_key_lengths = read_count(r, "key length count")?;
        let max_key_length = read_count(r, "max key length")?;
        data_bases = vec![0u64; max_key_length + 1];
        for _ in 0..num_key_lengths {
            let len = read_count(r, "key length")?;
            let base = read_i64(r, "data base")?;
            if len > max_key_length || base < 0 {
                return Err(Error::malformed("per-length table entry out of range"));
            }
            data_bases[len] = base as u64;
        }
    }

    let pfd_offset = read_count(r, "pfd offset")? as u64;
    let key_trie_offset = read_count(r, "key trie offset")? as u64;
    let data_offset = read_i64(r, "data offset")?;
    if data_offset < 0 {
        return Err(Error::malformed("negative data offset"));
    }

    Ok(TrieHeader {
        created_at_micros,
        compress_type,
        build_type,
        with_checksum,
        data_bases,
        num_key_lengths,
        pfd_offset,
        key_trie_offset,
        data_offset: data_offset as u64,
    })
}

/// Memory-mapped trie store.
pub struct TrieReader {
    source: Arc<ByteSource>,
    data_bases: Vec<u64>,
    data_offset: u64,
    content_end: u64,
    pfd: Option<PForDelta>,
    key_trie: Trie<Section>,
    value_trie: Option<Trie<Section>>,
    codec: ValueCodec,
}

impl TrieReader {
    pub fn open(option: ReaderOption, path: &Path) -> Result<TrieReader> {
        let header = parse_header(&mut BufReader::new(File::open(path)?))?;

        if header.with_checksum {
            verify_checksum(path)?;
        }

        let source = Arc::new(ByteSource::map_file(path, option.mmap_populate)?);
        let file_len = source.len() as u64;
        let content_end = file_len
            .checked_sub(if header.with_checksum { CHECKSUM_BYTES } else { 0 })
            .ok_or_else(|| Error::malformed("file too short for checksum"))?;

        if header.pfd_offset > header.key_trie_offset
            || header.key_trie_offset > header.data_offset
            || header.data_offset > content_end
        {
            return Err(Error::malformed("section offsets exceed file length"));
        }

        let is_map = header.build_type == BuildType::Map;
        let is_dfa = is_map && header.compress_type == CompressType::Dfa;

        let pfd = if is_map {
            let image = &source.as_slice()[header.pfd_offset as usize..header.key_trie_offset as usize];
            let (pfd, consumed) = PForDelta::load(image)?;
            if consumed != image.len() {
                return Err(Error::malformed("trailing bytes after PForDelta image"));
            }
            Some(pfd)
        } else {
            None
        };

        let key_trie = Trie::from_bytes(Section::new(
            source.clone(),
            header.key_trie_offset as usize..header.data_offset as usize,
        ))?;

        if let Some(pfd) = &pfd {
            // every trie id must have a payload entry
            if pfd.len() != key_trie.len() as u64 {
                return Err(Error::malformed("payload vector does not cover the key trie"));
            }
        }

        let value_trie = if is_dfa {
            Some(Trie::from_bytes(Section::new(
                source.clone(),
                header.data_offset as usize..content_end as usize,
            ))?)
        } else {
            None
        };

        let codec = if !is_map {
            ValueCodec::SetOnly
        } else {
            match header.compress_type {
                CompressType::None => ValueCodec::Raw,
                CompressType::Snappy => ValueCodec::Snappy,
                CompressType::Dfa => ValueCodec::Dfa,
            }
        };

        Ok(TrieReader {
            source,
            data_bases: header.data_bases,
            data_offset: header.data_offset,
            content_end,
            pfd,
            key_trie,
            value_trie,
            codec,
        })
    }

    /// Raw varint-framed payload bytes for a key id at a given key length.
    fn raw_value(&self, id: u64, key_len: usize) -> Result<&[u8]> {
        let pfd = self
            .pfd
            .as_ref()
            .ok_or_else(|| Error::malformed("payload vector missing"))?;
        let offset = pfd.extract(id);
        let base = *self
            .data_bases
            .get(key_len)
            .ok_or_else(|| Error::malformed("key length outside the value region table"))?;

        let pos = (self.data_offset + base + offset) as usize;
        let end = self.content_end as usize;
        if pos >= end {
            return Err(Error::malformed("value offset exceeds file length"));
        }

        let (value_len, consumed) = decode_varint(&self.source.as_slice()[pos..end])?;
        let start = pos + consumed;
        let stop = start
            .checked_add(value_len as usize)
            .ok_or_else(|| Error::malformed("value length overflow"))?;
        if stop > end {
            return Err(Error::malformed("value extends past file length"));
        }
        Ok(&self.source.as_slice()[start..stop])
    }

    fn dfa_value(&self, id: u64) -> Result<Vec<u8>> {
        let pfd = self
            .pfd
            .as_ref()
            .ok_or_else(|| Error::malformed("payload vector missing"))?;
        let value_id = pfd.extract(id);
        self.value_trie
            .as_ref()
            .ok_or_else(|| Error::malformed("value trie missing"))?
            .reverse_lookup(value_id)
            .ok_or_else(|| Error::malformed("value id missing from value trie"))
    }

    fn resolve(&self, id: u64, key_len: usize) -> Result<Vec<u8>> {
        match self.codec {
            ValueCodec::SetOnly => Ok(Vec::new()),
            ValueCodec::Raw => Ok(self.raw_value(id, key_len)?.to_vec()),
            ValueCodec::Snappy => decompress(self.raw_value(id, key_len)?),
            ValueCodec::Dfa => self.dfa_value(id),
        }
    }
}

fn decompress(bytes: &[u8]) -> Result<Vec<u8>> {
    snap::raw::Decoder::new()
        .decompress_vec(bytes)
        .map_err(|e| Error::malformed(format!("snappy decompress: {e}")))
}

impl Reader for TrieReader {
    fn exist(&self, key: &[u8]) -> bool {
        self.key_trie.lookup(key).is_some()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Cow<'_, [u8]>>> {
        let id = match self.key_trie.lookup(key) {
            Some(id) => id,
            None => return Ok(None),
        };
        match self.codec {
            ValueCodec::SetOnly => {
                debug!("get on a set artifact returns no value");
                Ok(None)
            }
            ValueCodec::Raw => Ok(Some(Cow::Borrowed(self.raw_value(id, key.len())?))),
            ValueCodec::Snappy => Ok(Some(Cow::Owned(decompress(
                self.raw_value(id, key.len())?,
            )?))),
            ValueCodec::Dfa => Ok(Some(Cow::Owned(self.dfa_value(id)?))),
        }
    }

    fn prefix_get(&self, prefix: &[u8], count: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let matches = self.key_trie.predictive_search(prefix, count);
        let mut results = Vec::with_capacity(matches.len());
        for (key, id) in matches {
            let value = self.resolve(id, key.len())?;
            results.push((key, value));
        }
        Ok(results)
    }
}

/// Header-only summary for `inspect`.
pub(crate) fn inspect(path: &Path) -> Result<ArtifactInfo> {
    let header = parse_header(&mut BufReader::new(File::open(path)?))?;
    let file_len = std::fs::metadata(path)?.len();
    let content_end = file_len.saturating_sub(if header.with_checksum { CHECKSUM_BYTES } else { 0 });

    let data_name = if header.build_type == BuildType::Set {
        "(empty)"
    } else if header.compress_type == CompressType::Dfa {
        "value trie"
    } else {
        "data segments"
    };
    let mut sections = vec![
        ("header".to_string(), 0, header.pfd_offset),
        ("pfordelta".to_string(), header.pfd_offset, header.key_trie_offset),
        ("key trie".to_string(), header.key_trie_offset, header.data_offset),
        (data_name.to_string(), header.data_offset, content_end),
    ];
    if header.with_checksum {
        sections.push(("checksum".to_string(), content_end, file_len));
    }

    Ok(ArtifactInfo {
        variant: "trie (SCDBV2.)",
        created_at_micros: header.created_at_micros,
        compress_type: header.compress_type,
        build_type: header.build_type,
        with_checksum: header.with_checksum,
        num_keys: None,
        num_key_lengths: header.num_key_lengths,
        max_key_length: header.data_bases.len().saturating_sub(1),
        load_factor: None,
        file_len,
        sections,
    })
}
