// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Hash-variant reader (`SCDBV1.` artifacts).
//!
//! Queries narrow to the key's length bucket, then probe the open-addressed
//! table linearly from `hash % slots`. A slot whose embedded offset varint
//! decodes to zero is empty and terminates the probe; otherwise the slot's
//! key bytes are compared directly, so a hit is an absolute guarantee.

use std::borrow::Cow;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};
use xxhash_rust::xxh64::xxh64;

use crate::checksum::{verify_checksum, CHECKSUM_BYTES};
use crate::error::{Error, Result};
use crate::reader::{
    read_bool, read_count, read_exact, read_f64, read_i64, read_u8, ArtifactInfo, Reader,
    ReaderOption,
};
use crate::source::ByteSource;
use crate::varint::decode_varint;
use crate::writer::{BuildType, CompressType, HASH_MAGIC};

struct HashHeader {
    created_at_micros: i64,
    load_factor: f64,
    compress_type: CompressType,
    build_type: BuildType,
    with_checksum: bool,
    num_keys: u64,
    num_key_lengths: usize,
    key_counts: Vec<u64>,
    slots: Vec<u64>,
    slot_sizes: Vec<usize>,
    index_bases: Vec<u64>,
    data_bases: Vec<u64>,
    index_offset: u64,
    data_offset: u64,
}

fn parse_header(r: &mut impl std::io::Read) -> Result<HashHeader> {
    let mut magic = [0u8; 7];
    read_exact(r, &mut magic, "magic")?;
    if &magic != HASH_MAGIC {
        return Err(Error::malformed("not a hash artifact"));
    }

    let created_at_micros = read_i64(r, "timestamp")?;
    let load_factor = read_f64(r, "load factor")?;
    let compress_type = CompressType::from_u8(read_u8(r, "compress type")?)?;
    let build_type = BuildType::from_u8(read_u8(r, "build type")?)?;
    let with_checksum = read_bool(r, "checksum flag")?;

    let num_keys = read_count(r, "key count")? as u64;
    let num_key_lengths = read_count(r, "key length count")?;
    let max_key_length = read_count(r, "max key length")?;

    let is_map = build_type == BuildType::Map;
    let mut key_counts = vec![0u64; max_key_length + 1];
    let mut slots = vec![0u64; max_key_length + 1];
    let mut slot_sizes = vec![0usize; max_key_length + 1];
    let mut index_bases = vec![0u64; max_key_length + 1];
    let mut data_bases = vec![0u64; max_key_length + 1];

    for _ in 0..num_key_lengths {
        let len = read_count(r, "key length")?;
        if len > max_key_length {
            return Err(Error::malformed("per-length table entry out of range"));
        }
        key_counts[len] = read_count(r, "per-length key count")? as u64;
        slots[len] = read_count(r, "slot count")? as u64;
        slot_sizes[len] = read_count(r, "slot size")?;
        index_bases[len] = read_count(r, "index base")? as u64;
        if is_map {
            let base = read_i64(r, "data base")?;
            if base < 0 {
                return Err(Error::malformed("negative data base"));
            }
            data_bases[len] = base as u64;
        }
        if slot_sizes[len] <= len {
            return Err(Error::malformed("slot size smaller than key length"));
        }
    }

    let index_offset = read_count(r, "index offset")? as u64;
    let data_offset = read_i64(r, "data offset")?;
    if data_offset < 0 {
        return Err(Error::malformed("negative data offset"));
    }

    Ok(HashHeader {
        created_at_micros,
        load_factor,
        compress_type,
        build_type,
        with_checksum,
        num_keys,
        num_key_lengths,
        key_counts,
        slots,
        slot_sizes,
        index_bases,
        data_bases,
        index_offset,
        data_offset: data_offset as u64,
    })
}

/// Memory-mapped hash store.
pub struct HashReader {
    source: Arc<ByteSource>,
    header: HashHeader,
    content_end: u64,
    snappy: bool,
}

impl HashReader {
    pub fn open(option: ReaderOption, path: &Path) -> Result<HashReader> {
        let header = parse_header(&mut BufReader::new(File::open(path)?))?;

        if header.with_checksum {
            verify_checksum(path)?;
        }

        let source = Arc::new(ByteSource::map_file(path, option.mmap_populate)?);
        let file_len = source.len() as u64;
        let content_end = file_len
            .checked_sub(if header.with_checksum { CHECKSUM_BYTES } else { 0 })
            .ok_or_else(|| Error::malformed("file too short for checksum"))?;

        if header.index_offset > header.data_offset || header.data_offset > content_end {
            return Err(Error::malformed("section offsets exceed file length"));
        }
        for len in 0..header.key_counts.len() {
            if header.key_counts[len] == 0 {
                continue;
            }
            let table_end = header.index_offset
                + header.index_bases[len]
                + header.slots[len] * header.slot_sizes[len] as u64;
            if table_end > header.data_offset {
                return Err(Error::malformed("hash table exceeds the index region"));
            }
        }

        let snappy = header.compress_type == CompressType::Snappy;
        Ok(HashReader {
            source,
            header,
            content_end,
            snappy,
        })
    }

    /// Probe the length bucket for `key`; returns the slot's embedded offset.
    fn probe(&self, key: &[u8]) -> Option<u64> {
        let len = key.len();
        if len >= self.header.key_counts.len() || self.header.key_counts[len] == 0 {
            return None;
        }

        let slots = self.header.slots[len];
        let slot_size = self.header.slot_sizes[len];
        let table_start = (self.header.index_offset + self.header.index_bases[len]) as usize;
        let buf = self.source.as_slice();
        let hash = xxh64(key, 0);

        for probe in 0..slots {
            let slot = (hash.wrapping_add(probe) % slots) as usize;
            let pos = table_start + slot * slot_size;
            let cell = &buf[pos..pos + slot_size];
            let offset = match decode_varint(&cell[len..]) {
                Ok((offset, _)) => offset,
                Err(_) => {
                    warn!("corrupt slot varint at length {len}, slot {slot}");
                    return None;
                }
            };
            if offset == 0 {
                return None;
            }
            if &cell[..len] == key {
                return Some(offset);
            }
        }
        None
    }

    /// Raw varint-framed payload at `offset` within the length bucket.
    fn raw_value(&self, offset: u64, key_len: usize) -> Result<&[u8]> {
        let base = self.header.data_bases[key_len];
        let pos = (self.header.data_offset + base + offset) as usize;
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
}

impl Reader for HashReader {
    fn exist(&self, key: &[u8]) -> bool {
        self.probe(key).is_some()
    }

    fn get(&self, key: &[u8]) -> Result<Option<Cow<'_, [u8]>>> {
        if self.header.build_type == BuildType::Set {
            debug!("get on a set artifact returns no value");
            return Ok(None);
        }
        let offset = match self.probe(key) {
            Some(offset) => offset,
            None => return Ok(None),
        };
        let raw = self.raw_value(offset, key.len())?;
        if self.snappy {
            let decompressed = snap::raw::Decoder::new()
                .decompress_vec(raw)
                .map_err(|e| Error::malformed(format!("snappy decompress: {e}")))?;
            Ok(Some(Cow::Owned(decompressed)))
        } else {
            Ok(Some(Cow::Borrowed(raw)))
        }
    }

    fn prefix_get(&self, _prefix: &[u8], _count: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        warn!("prefix queries are not supported by the hash variant");
        Ok(Vec::new())
    }
}

/// Header-only summary for `inspect`.
pub(crate) fn inspect(path: &Path) -> Result<ArtifactInfo> {
    let header = parse_header(&mut BufReader::new(File::open(path)?))?;
    let file_len = std::fs::metadata(path)?.len();
    let content_end = file_len.saturating_sub(if header.with_checksum { CHECKSUM_BYTES } else { 0 });

    let mut sections = vec![
        ("header".to_string(), 0, header.index_offset),
        ("hash tables".to_string(), header.index_offset, header.data_offset),
        ("data segments".to_string(), header.data_offset, content_end),
    ];
    if header.with_checksum {
        sections.push(("checksum".to_string(), content_end, file_len));
    }

    Ok(ArtifactInfo {
        variant: "hash (SCDBV1.)",
        created_at_micros: header.created_at_micros,
        compress_type: header.compress_type,
        build_type: header.build_type,
        with_checksum: header.with_checksum,
        num_keys: Some(header.num_keys),
        num_key_lengths: header.num_key_lengths,
        max_key_length: header.key_counts.len().saturating_sub(1),
        load_factor: Some(header.load_factor),
        file_len,
        sections,
    })
}
