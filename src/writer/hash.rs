// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Hash-variant writer (`SCDBV1.` artifacts).
//!
//! Every key length gets its own temp index spool of `key bytes ‖
//! varint(offset)` records and, in map mode, its own value spool with the
//! same framing and adjacent-duplicate coalescing as the trie writer. In set
//! mode the offset is the constant 1: slots are zero-filled, so a nonzero
//! offset field is what marks a slot occupied.
//!
//! `close` replays each index spool into an in-memory open-addressed table
//! (linear probing, slot = key bytes ‖ varint(offset) ‖ zero padding), then
//! writes the metadata and concatenates metadata ‖ tables ‖ data segments.
//! Metadata is written after the tables so the recorded per-length key count
//! reflects unique keys; a re-inserted key is logged and its later value
//! discarded.

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, error, warn};
use xxhash_rust::xxh64::xxh64;

use crate::checksum::append_checksum;
use crate::error::{Error, Result};
use crate::varint::{decode_varint, encode_varint, read_varint};
use crate::writer::trie::now_micros;
use crate::writer::{BuildType, CompressType, Writer, WriterOption};

pub(crate) const HASH_MAGIC: &[u8; 7] = b"SCDBV1.";

/// Offset stored for every set-mode key: any nonzero value marks the slot
/// occupied.
const SET_SLOT_MARKER: u64 = 1;

struct BuiltTable {
    len: usize,
    unique: u64,
    slots: u64,
    slot_size: usize,
    bytes: Vec<u8>,
}

/// Builds per-length open-addressed tables over spooled puts.
pub struct HashWriter {
    option: WriterOption,
    path: PathBuf,
    closed: bool,

    num_puts: u64,

    index_files: Vec<Option<PathBuf>>,
    index_streams: Vec<Option<BufWriter<File>>>,
    data_files: Vec<Option<PathBuf>>,
    data_streams: Vec<Option<BufWriter<File>>>,

    data_lengths: Vec<u64>,
    key_counts: Vec<u64>,
    max_offset_lengths: Vec<u32>,
    last_values: Vec<Vec<u8>>,
    last_value_lengths: Vec<u64>,

    duplicate_keys: u64,
}

impl HashWriter {
    pub fn create(option: WriterOption, path: &Path) -> Result<HashWriter> {
        if !(option.load_factor > 0.0 && option.load_factor < 1.0) {
            return Err(Error::InvalidOperation(format!(
                "load factor must be in (0, 1), got {}",
                option.load_factor
            )));
        }
        if option.compress_type == CompressType::Dfa {
            return Err(Error::UnsupportedFormat(
                "the hash variant does not support dfa-encoded values".into(),
            ));
        }
        fs::create_dir_all(&option.temp_folder)?;
        Ok(HashWriter {
            option,
            path: path.to_path_buf(),
            closed: false,
            num_puts: 0,
            index_files: Vec::new(),
            index_streams: Vec::new(),
            data_files: Vec::new(),
            data_streams: Vec::new(),
            data_lengths: Vec::new(),
            key_counts: Vec::new(),
            max_offset_lengths: Vec::new(),
            last_values: Vec::new(),
            last_value_lengths: Vec::new(),
            duplicate_keys: 0,
        })
    }

    /// Number of duplicate keys discarded (final after `close`).
    pub fn duplicate_keys(&self) -> u64 {
        self.duplicate_keys
    }

    fn ensure_length(&mut self, len: usize) {
        if self.key_counts.len() <= len {
            self.key_counts.resize(len + 1, 0);
            self.max_offset_lengths.resize(len + 1, 0);
            self.data_lengths.resize(len + 1, 1);
            self.last_values.resize(len + 1, Vec::new());
            self.last_value_lengths.resize(len + 1, 0);
        }
    }

    fn index_stream(&mut self, len: usize) -> Result<&mut BufWriter<File>> {
        if self.index_streams.len() <= len {
            self.index_streams.resize_with(len + 1, || None);
            self.index_files.resize(len + 1, None);
        }
        if self.index_streams[len].is_none() {
            let file = self.option.temp_folder.join(format!("temp_index_{len}.dat"));
            self.index_streams[len] = Some(BufWriter::new(File::create(&file)?));
            self.index_files[len] = Some(file);
        }
        Ok(self.index_streams[len].as_mut().unwrap())
    }

    fn data_stream(&mut self, len: usize) -> Result<&mut BufWriter<File>> {
        if self.data_streams.len() <= len {
            self.data_streams.resize_with(len + 1, || None);
            self.data_files.resize(len + 1, None);
        }
        if self.data_streams[len].is_none() {
            let file = self.option.temp_folder.join(format!("data_{len}.dat"));
            let mut stream = BufWriter::new(File::create(&file)?);
            // offset 0 is reserved for "no value written"
            stream.write_all(&[0])?;
            self.data_files[len] = Some(file);
            self.data_streams[len] = Some(stream);
        }
        Ok(self.data_streams[len].as_mut().unwrap())
    }

    fn equal_last_value(&self, len: usize, value: &[u8]) -> bool {
        self.key_counts[len] > 0 && self.last_values[len] == value
    }

    fn record_put(&mut self, len: usize, offset: u64, key: &[u8]) -> Result<()> {
        let mut record = Vec::with_capacity(len + 10);
        record.extend_from_slice(key);
        let offset_len = encode_varint(offset, &mut record) as u32;
        self.index_stream(len)?.write_all(&record)?;
        self.max_offset_lengths[len] = self.max_offset_lengths[len].max(offset_len);
        self.key_counts[len] += 1;
        self.num_puts += 1;
        Ok(())
    }

    fn build_table(&mut self, len: usize) -> Result<BuiltTable> {
        let put_count = self.key_counts[len];
        let slots = ((put_count as f64 / self.option.load_factor).round() as u64)
            .max(put_count + 1);
        let slot_size = len + self.max_offset_lengths[len] as usize;
        let mut bytes = vec![0u8; (slots as usize) * slot_size];
        let mut unique = 0u64;

        let index_file = self.index_files[len]
            .as_ref()
            .ok_or_else(|| Error::malformed("missing index spool for present length"))?;
        let mut spool = BufReader::new(File::open(index_file)?);
        let mut key = vec![0u8; len];

        for _ in 0..put_count {
            spool.read_exact(&mut key)?;
            let (offset, _) = read_varint(&mut spool)?;
            let hash = xxh64(&key, 0);

            let mut inserted = false;
            for probe in 0..slots {
                let slot = (hash.wrapping_add(probe) % slots) as usize;
                let cell = &mut bytes[slot * slot_size..(slot + 1) * slot_size];
                // an empty slot decodes a zero offset; live offsets are >= 1
                let (existing, _) = decode_varint(&cell[len..])?;
                if existing == 0 {
                    cell[..len].copy_from_slice(&key);
                    let mut encoded = Vec::with_capacity(10);
                    encode_varint(offset, &mut encoded);
                    cell[len..len + encoded.len()].copy_from_slice(&encoded);
                    unique += 1;
                    inserted = true;
                    break;
                }
                if &cell[..len] == key.as_slice() {
                    warn!(
                        key = %String::from_utf8_lossy(&key),
                        "duplicate key, discarding the later value"
                    );
                    self.duplicate_keys += 1;
                    inserted = true;
                    break;
                }
            }
            if !inserted {
                return Err(Error::InvalidOperation(format!(
                    "hash table for length {len} overflowed ({slots} slots)"
                )));
            }
        }

        Ok(BuiltTable {
            len,
            unique,
            slots,
            slot_size,
            bytes,
        })
    }

    fn close_inner(&mut self) -> Result<()> {
        for stream in self.index_streams.iter_mut().flatten() {
            stream.flush()?;
        }
        self.index_streams.clear();
        for stream in self.data_streams.iter_mut().flatten() {
            stream.flush()?;
        }
        self.data_streams.clear();

        let present: Vec<usize> = (0..self.key_counts.len())
            .filter(|&l| self.key_counts[l] > 0)
            .collect();

        let mut tables = Vec::with_capacity(present.len());
        for &len in &present {
            tables.push(self.build_table(len)?);
        }

        debug!(
            puts = self.num_puts,
            duplicates = self.duplicate_keys,
            lengths = present.len(),
            "assembling hash artifact"
        );

        self.assemble(&tables)?;

        if self.option.with_checksum {
            append_checksum(&self.path)?;
        }
        self.cleanup();
        Ok(())
    }

    fn assemble(&self, tables: &[BuiltTable]) -> Result<()> {
        let is_map = self.option.build_type == BuildType::Map;

        let per_length = 4 + 4 + 4 + 4 + 4 + if is_map { 8 } else { 0 };
        let header_len = 7 + 8 + 8 + 3 + 4 + 4 + 4 + tables.len() * per_length + 4 + 8;

        let index_len: u64 = tables.iter().map(|t| t.bytes.len() as u64).sum();
        let index_offset = header_len as u64;
        let data_offset = index_offset + index_len;
        if index_offset > i32::MAX as u64 || index_len > i32::MAX as u64 {
            return Err(Error::UnsupportedFormat(
                "index region exceeds the 2 GiB offset space".into(),
            ));
        }

        let num_keys: u64 = tables.iter().map(|t| t.unique).sum();
        let max_len = tables.last().map(|t| t.len).unwrap_or(0);

        let mut out = BufWriter::new(File::create(&self.path)?);
        out.write_all(HASH_MAGIC)?;
        out.write_all(&now_micros().to_le_bytes())?;
        out.write_all(&self.option.load_factor.to_le_bytes())?;
        out.write_all(&[
            self.option.compress_type as u8,
            self.option.build_type as u8,
            self.option.with_checksum as u8,
        ])?;

        out.write_all(&(num_keys as i32).to_le_bytes())?;
        out.write_all(&(tables.len() as i32).to_le_bytes())?;
        out.write_all(&(max_len as i32).to_le_bytes())?;

        let mut index_base: u64 = 0;
        let mut data_base: u64 = 0;
        for table in tables {
            out.write_all(&(table.len as i32).to_le_bytes())?;
            out.write_all(&(table.unique as i32).to_le_bytes())?;
            out.write_all(&(table.slots as i32).to_le_bytes())?;
            out.write_all(&(table.slot_size as i32).to_le_bytes())?;
            out.write_all(&(index_base as i32).to_le_bytes())?;
            index_base += table.bytes.len() as u64;
            if is_map {
                out.write_all(&(data_base as i64).to_le_bytes())?;
                data_base += self.data_lengths[table.len];
            }
        }

        out.write_all(&(index_offset as i32).to_le_bytes())?;
        out.write_all(&(data_offset as i64).to_le_bytes())?;

        for table in tables {
            out.write_all(&table.bytes)?;
        }
        if is_map {
            for table in tables {
                let file = self.data_files[table.len]
                    .as_ref()
                    .ok_or_else(|| Error::malformed("missing data stream for present length"))?;
                io::copy(&mut File::open(file)?, &mut out)?;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn cleanup(&mut self) {
        for file in self.index_files.iter().chain(&self.data_files).flatten() {
            if let Err(e) = fs::remove_file(file) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(file = %file.display(), "failed to delete temp file: {e}");
                }
            }
        }
        self.index_files.clear();
        self.data_files.clear();
    }
}

impl Writer for HashWriter {
    fn put(&mut self, key: &[u8]) -> Result<()> {
        if self.option.build_type != BuildType::Set {
            return Err(Error::InvalidOperation(
                "put without value on a map writer".into(),
            ));
        }
        let len = key.len();
        if len == 0 {
            return Ok(());
        }
        self.ensure_length(len);
        self.record_put(len, SET_SLOT_MARKER, key)
    }

    fn put_value(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.option.build_type != BuildType::Map {
            return Err(Error::InvalidOperation(
                "put with value on a set writer".into(),
            ));
        }
        let len = key.len();
        if len == 0 {
            return Ok(());
        }
        self.ensure_length(len);

        let mut offset = self.data_lengths[len];
        if self.equal_last_value(len, value) {
            offset -= self.last_value_lengths[len];
        } else {
            let mut frame = Vec::with_capacity(value.len() + 10);
            if self.option.compress_type == CompressType::Snappy {
                let compressed = snap::raw::Encoder::new()
                    .compress_vec(value)
                    .map_err(|e| Error::malformed(format!("snappy compress: {e}")))?;
                encode_varint(compressed.len() as u64, &mut frame);
                frame.extend_from_slice(&compressed);
            } else {
                encode_varint(value.len() as u64, &mut frame);
                frame.extend_from_slice(value);
            }

            let frame_len = frame.len() as u64;
            self.data_stream(len)?.write_all(&frame)?;
            self.data_lengths[len] += frame_len;
            self.last_values[len] = value.to_vec();
            self.last_value_lengths[len] = frame_len;
        }

        self.record_put(len, offset, key)
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.close_inner()?;
        self.closed = true;
        Ok(())
    }
}

impl Drop for HashWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!("hash writer close failed in drop: {e}");
            }
        }
    }
}
