// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Trie-variant writer (`SCDBV2.` artifacts).
//!
//! Keys accumulate in memory; raw/snappy values stream into one temp file per
//! key length, each opened lazily with a single zero sentinel byte so that
//! offset 0 always means "no value". Writing a value byte-identical to the
//! previous one in the same length bucket reuses the previous offset instead
//! of re-emitting the bytes.
//!
//! `close` orders: build the key trie (ids are lexicographic ranks), build
//! the value trie in Dfa mode, build the PForDelta over the id-indexed
//! payload vector, then concatenate metadata ‖ PForDelta ‖ key trie ‖
//! (value trie | data segments in ascending length).

use std::fs::{self, File};
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::{debug, error, warn};

use crate::checksum::append_checksum;
use crate::error::{Error, Result};
use crate::pfor::PForDelta;
use crate::trie;
use crate::varint::encode_varint;
use crate::writer::{BuildType, CompressType, Writer, WriterOption};

pub(crate) const TRIE_MAGIC: &[u8; 7] = b"SCDBV2.";

pub(crate) fn now_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as i64)
        .unwrap_or(0)
}

/// Streams values per key length and assembles the trie artifact at close.
pub struct TrieWriter {
    option: WriterOption,
    path: PathBuf,
    closed: bool,

    keys: Vec<Vec<u8>>,
    /// Per-key payload offsets, parallel to `keys` (raw/snappy map mode).
    offsets: Vec<u64>,
    /// Per-key raw values, parallel to `keys` (Dfa mode).
    values: Vec<Vec<u8>>,

    data_files: Vec<Option<PathBuf>>,
    data_streams: Vec<Option<BufWriter<File>>>,
    data_lengths: Vec<u64>,
    key_counts: Vec<u64>,
    last_values: Vec<Vec<u8>>,
    last_value_lengths: Vec<u64>,

    duplicate_keys: u64,
}

impl TrieWriter {
    pub fn create(option: WriterOption, path: &Path) -> Result<TrieWriter> {
        fs::create_dir_all(&option.temp_folder)?;
        Ok(TrieWriter {
            option,
            path: path.to_path_buf(),
            closed: false,
            keys: Vec::new(),
            offsets: Vec::new(),
            values: Vec::new(),
            data_files: Vec::new(),
            data_streams: Vec::new(),
            data_lengths: Vec::new(),
            key_counts: Vec::new(),
            last_values: Vec::new(),
            last_value_lengths: Vec::new(),
            duplicate_keys: 0,
        })
    }

    /// Number of duplicate keys coalesced so far (final after `close`).
    pub fn duplicate_keys(&self) -> u64 {
        self.duplicate_keys
    }

    fn ensure_length(&mut self, len: usize) {
        if self.key_counts.len() <= len {
            self.key_counts.resize(len + 1, 0);
            self.data_lengths.resize(len + 1, 1);
            self.last_values.resize(len + 1, Vec::new());
            self.last_value_lengths.resize(len + 1, 0);
        }
    }

    fn equal_last_value(&self, len: usize, value: &[u8]) -> bool {
        self.key_counts[len] > 0 && self.last_values[len] == value
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

    fn put_raw_or_snappy(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let len = key.len();
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

        self.keys.push(key.to_vec());
        self.offsets.push(offset);
        self.key_counts[len] += 1;
        Ok(())
    }

    fn put_as_trie(&mut self, key: &[u8], value: &[u8]) {
        self.keys.push(key.to_vec());
        self.values.push(value.to_vec());
    }

    /// Sorted order with the last occurrence of each duplicate key winning.
    fn winning_order(&mut self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.keys.len()).collect();
        order.sort_unstable_by(|&a, &b| self.keys[a].cmp(&self.keys[b]).then(a.cmp(&b)));

        let mut winners: Vec<usize> = Vec::with_capacity(order.len());
        for i in order {
            if let Some(last) = winners.last_mut() {
                if self.keys[*last] == self.keys[i] {
                    warn!(
                        key = %String::from_utf8_lossy(&self.keys[i]),
                        "duplicate key, keeping the later value"
                    );
                    self.duplicate_keys += 1;
                    *last = i;
                    continue;
                }
            }
            winners.push(i);
        }
        winners
    }

    fn close_inner(&mut self) -> Result<()> {
        for stream in self.data_streams.iter_mut().flatten() {
            stream.flush()?;
        }
        self.data_streams.clear();

        let winners = self.winning_order();

        // Key trie: ids are positions in sorted unique order.
        let sorted_keys: Vec<&[u8]> = winners.iter().map(|&i| self.keys[i].as_slice()).collect();
        let key_trie = trie::build_image(&sorted_keys)?;

        let is_map = self.option.build_type == BuildType::Map;
        let is_dfa = is_map && self.option.compress_type == CompressType::Dfa;

        let mut value_trie = Vec::new();
        let pfd_image = if is_map {
            let payload: Vec<u64> = if is_dfa {
                let mut unique_values: Vec<&[u8]> =
                    winners.iter().map(|&i| self.values[i].as_slice()).collect();
                unique_values.sort_unstable();
                unique_values.dedup();
                value_trie = trie::build_image(&unique_values)?;

                winners
                    .iter()
                    .map(|&i| {
                        unique_values
                            .binary_search(&self.values[i].as_slice())
                            .expect("value inserted above") as u64
                    })
                    .collect()
            } else {
                winners.iter().map(|&i| self.offsets[i]).collect()
            };

            let pfd = PForDelta::encode(&payload);
            let mut image = Vec::new();
            pfd.write_to(&mut image);
            image
        } else {
            Vec::new()
        };

        debug!(
            keys = winners.len(),
            duplicates = self.duplicate_keys,
            pfd_bytes = pfd_image.len(),
            trie_bytes = key_trie.len(),
            "assembling trie artifact"
        );

        self.assemble(&pfd_image, &key_trie, &value_trie)?;

        if self.option.with_checksum {
            append_checksum(&self.path)?;
        }
        self.cleanup();
        Ok(())
    }

    fn assemble(&self, pfd: &[u8], key_trie: &[u8], value_trie: &[u8]) -> Result<()> {
        let is_map = self.option.build_type == BuildType::Map;
        let is_dfa = is_map && self.option.compress_type == CompressType::Dfa;

        let present: Vec<usize> = (0..self.key_counts.len())
            .filter(|&l| self.key_counts[l] > 0)
            .collect();

        let mut header_len = 7 + 8 + 3 + 4 + 4 + 8;
        if is_map && !is_dfa {
            header_len += 4 + 4 + present.len() * (4 + 8);
        }

        let pfd_offset = header_len as u64;
        let key_trie_offset = pfd_offset + pfd.len() as u64;
        let data_offset = key_trie_offset + key_trie.len() as u64;
        if key_trie_offset > i32::MAX as u64 {
            return Err(Error::UnsupportedFormat(
                "index region exceeds the 2 GiB offset space".into(),
            ));
        }

        let mut out = BufWriter::new(File::create(&self.path)?);
        out.write_all(TRIE_MAGIC)?;
        out.write_all(&now_micros().to_le_bytes())?;
        out.write_all(&[
            self.option.compress_type as u8,
            self.option.build_type as u8,
            self.option.with_checksum as u8,
        ])?;

        if is_map && !is_dfa {
            out.write_all(&(present.len() as i32).to_le_bytes())?;
            let max_len = present.last().copied().unwrap_or(0);
            out.write_all(&(max_len as i32).to_le_bytes())?;

            let mut base: i64 = 0;
            for &len in &present {
                out.write_all(&(len as i32).to_le_bytes())?;
                out.write_all(&base.to_le_bytes())?;
                base += self.data_lengths[len] as i64;
            }
        }

        out.write_all(&(pfd_offset as i32).to_le_bytes())?;
        out.write_all(&(key_trie_offset as i32).to_le_bytes())?;
        out.write_all(&(data_offset as i64).to_le_bytes())?;

        out.write_all(pfd)?;
        out.write_all(key_trie)?;

        if is_dfa {
            out.write_all(value_trie)?;
        } else if is_map {
            for &len in &present {
                let file = self.data_files[len]
                    .as_ref()
                    .ok_or_else(|| Error::malformed("missing data stream for present length"))?;
                io::copy(&mut File::open(file)?, &mut out)?;
            }
        }
        out.flush()?;
        Ok(())
    }

    fn cleanup(&mut self) {
        for file in self.data_files.iter().flatten() {
            if let Err(e) = fs::remove_file(file) {
                if e.kind() != io::ErrorKind::NotFound {
                    warn!(file = %file.display(), "failed to delete temp file: {e}");
                }
            }
        }
        self.data_files.clear();
    }
}

impl Writer for TrieWriter {
    fn put(&mut self, key: &[u8]) -> Result<()> {
        if self.option.build_type != BuildType::Set {
            return Err(Error::InvalidOperation(
                "put without value on a map writer".into(),
            ));
        }
        if key.is_empty() {
            return Ok(());
        }
        self.keys.push(key.to_vec());
        Ok(())
    }

    fn put_value(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        if self.option.build_type != BuildType::Map {
            return Err(Error::InvalidOperation(
                "put with value on a set writer".into(),
            ));
        }
        if key.is_empty() {
            return Ok(());
        }
        if self.option.compress_type == CompressType::Dfa {
            self.put_as_trie(key, value);
            Ok(())
        } else {
            self.put_raw_or_snappy(key, value)
        }
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

impl Drop for TrieWriter {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                error!("trie writer close failed in drop: {e}");
            }
        }
    }
}
