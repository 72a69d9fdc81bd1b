// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Bitmap with a compact two-level rank directory.
//!
//! `rank1(pos)` answers "how many 1-bits in `[0, pos)`" in O(1): an absolute
//! `u32` rank every 128 words plus a relative `u16` rank every 8 words, so a
//! query is two array reads and at most eight popcounts. Total directory
//! overhead is ~3.5% of the bitmap.
//!
//! The serialized image is self-describing (length-prefixed) and includes
//! the directory, so loading never rescans the words.

use crate::error::{Error, Result};

/// Words per L1 superblock (8192 bits).
const L1_WORDS: usize = 128;

/// Words per L2 block (512 bits).
const L2_WORDS: usize = 8;

/// Bitmap plus rank directory.
#[derive(Debug, Clone, Default)]
pub struct RankBitmap {
    /// Number of valid bits.
    len: u64,
    words: Vec<u64>,
    /// Absolute cumulative rank at each superblock boundary.
    l1: Vec<u32>,
    /// Rank at each block boundary, relative to its superblock.
    l2: Vec<u16>,
    ones: u64,
}

impl RankBitmap {
    /// Build from raw words. `words.len()` must cover `len` bits exactly.
    pub fn build(len: u64, words: Vec<u64>) -> Self {
        assert_eq!(words.len() as u64, len.div_ceil(64), "word count mismatch");

        let num_superblocks = words.len().div_ceil(L1_WORDS);
        let num_blocks = words.len().div_ceil(L2_WORDS);

        let mut l1 = Vec::with_capacity(num_superblocks);
        let mut l2 = Vec::with_capacity(num_blocks);
        let mut absolute: u64 = 0;

        for sb in 0..num_superblocks {
            l1.push(absolute as u32);
            let sb_start = sb * L1_WORDS;
            let sb_end = (sb_start + L1_WORDS).min(words.len());

            let mut relative: u32 = 0;
            let mut w = sb_start;
            while w < sb_end {
                l2.push(relative as u16);
                let block_end = (w + L2_WORDS).min(sb_end);
                for word in &words[w..block_end] {
                    relative += word.count_ones();
                }
                w = block_end;
            }
            absolute += relative as u64;
        }

        RankBitmap {
            len,
            words,
            l1,
            l2,
            ones: absolute,
        }
    }

    /// Bitmap length in bits.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Total number of set bits.
    pub fn ones(&self) -> u64 {
        self.ones
    }

    /// Whether bit `i` is set. `i` must be `< len`.
    #[inline]
    pub fn get(&self, i: u64) -> bool {
        debug_assert!(i < self.len);
        let word = (i >> 6) as usize;
        let bit = i & 63;
        self.words[word] >> bit & 1 == 1
    }

    /// Number of 1-bits in `[0, pos)`. `pos` may equal `len`.
    #[inline]
    pub fn rank1(&self, pos: u64) -> u64 {
        debug_assert!(pos <= self.len);
        if pos >= self.len {
            return self.ones;
        }

        let word = (pos >> 6) as usize;
        let mut rank = self.l1[word / L1_WORDS] as u64 + self.l2[word / L2_WORDS] as u64;

        let block_start = (word / L2_WORDS) * L2_WORDS;
        for w in &self.words[block_start..word] {
            rank += w.count_ones() as u64;
        }

        let partial = pos & 63;
        if partial > 0 {
            rank += (self.words[word] & ((1u64 << partial) - 1)).count_ones() as u64;
        }
        rank
    }

    /// Serialize: bit length, words, then the rank directory.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.len.to_le_bytes());
        for w in &self.words {
            out.extend_from_slice(&w.to_le_bytes());
        }
        out.extend_from_slice(&(self.l1.len() as u64).to_le_bytes());
        for v in &self.l1 {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.extend_from_slice(&(self.l2.len() as u64).to_le_bytes());
        for v in &self.l2 {
            out.extend_from_slice(&v.to_le_bytes());
        }
    }

    /// Deserialize from the front of `bytes`, returning the bitmap and the
    /// number of bytes consumed.
    pub fn read_from(bytes: &[u8]) -> Result<(Self, usize)> {
        let mut pos = 0usize;

        let len = read_u64(bytes, &mut pos)?;
        let num_words = len.div_ceil(64) as usize;
        let mut words = Vec::with_capacity(num_words);
        for _ in 0..num_words {
            words.push(read_u64(bytes, &mut pos)?);
        }

        let l1_len = read_u64(bytes, &mut pos)? as usize;
        if l1_len != num_words.div_ceil(L1_WORDS) {
            return Err(Error::malformed("rank directory L1 size mismatch"));
        }
        let mut l1 = Vec::with_capacity(l1_len);
        for _ in 0..l1_len {
            l1.push(read_u32(bytes, &mut pos)?);
        }

        let l2_len = read_u64(bytes, &mut pos)? as usize;
        if l2_len != num_words.div_ceil(L2_WORDS) {
            return Err(Error::malformed("rank directory L2 size mismatch"));
        }
        let mut l2 = Vec::with_capacity(l2_len);
        for _ in 0..l2_len {
            l2.push(read_u16(bytes, &mut pos)?);
        }

        let ones = words.iter().map(|w| w.count_ones() as u64).sum();
        Ok((
            RankBitmap {
                len,
                words,
                l1,
                l2,
                ones,
            },
            pos,
        ))
    }
}

fn read_u64(bytes: &[u8], pos: &mut usize) -> Result<u64> {
    let end = *pos + 8;
    let slice = bytes
        .get(*pos..end)
        .ok_or_else(|| Error::malformed("truncated bitmap image"))?;
    *pos = end;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u32(bytes: &[u8], pos: &mut usize) -> Result<u32> {
    let end = *pos + 4;
    let slice = bytes
        .get(*pos..end)
        .ok_or_else(|| Error::malformed("truncated bitmap image"))?;
    *pos = end;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u16(bytes: &[u8], pos: &mut usize) -> Result<u16> {
    let end = *pos + 2;
    let slice = bytes
        .get(*pos..end)
        .ok_or_else(|| Error::malformed("truncated bitmap image"))?;
    *pos = end;
    Ok(u16::from_le_bytes(slice.try_into().unwrap()))
}
