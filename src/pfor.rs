// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! PForDelta: a compressed vector of `u64` with O(1) positional access.
//!
//! Most inputs cluster in a narrow range; outliers on either side would blow
//! up the common bit width. The encoder picks a packed range `[base_p,
//! limit_p)` holding the majority, stores those values as narrow offsets from
//! `base_p`, and diverts values below into an "except-min" array (offsets
//! from the global minimum) and values above into an "except-max" array
//! (offsets from `limit_p`). A rank-capable bitmap marks which positions are
//! packed; for the middle-packed family a second bitmap tells the two
//! exception streams apart.
//!
//! The parameter search buckets values by bit length, then walks every
//! admissible range boundary for three families (packed range anchored at
//! the minimum, at the maximum, or interior) and keeps whichever costs the
//! fewest total bits. If nothing beats flat max-width storage, the encoding
//! degenerates to one packed array spanning `[min, max]`.
//!
//! `extract(i)`:
//! - `r = rank1(bitmap, i+1)`
//! - packed: `base_p + P[r-1]`
//! - otherwise `e = i+1-r` indexes the exception stream; the middle family
//!   consults the exception bitmap to route between except-min and
//!   except-max.

use crate::bits::{get_bits, set_bits, words_for, RankBitmap};
use crate::error::{Error, Result};

const TAG: &[u8; 6] = b"PFDV1.";

/// Bucket index of a value: its bit length, clamped to `[1, 64]`.
fn bucket_of(x: u64) -> usize {
    (64 - x.leading_zeros()).max(1) as usize
}

/// Bits needed to store any offset in `[0, range]`; 0 when the range is 0.
fn width_of(range: u64) -> u32 {
    64 - range.leading_zeros()
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum Family {
    /// Packed range starts at the global minimum; exceptions above only.
    Left,
    /// Packed range ends at the global maximum; exceptions below only.
    Right,
    /// Interior packed range; exceptions on both sides plus a selector bitmap.
    Middle,
    /// Single packed array over `[min, max]`.
    Degenerate,
}

#[derive(Clone, Copy, Debug)]
struct Config {
    family: Family,
    b: u32,
    base_p: u64,
    limit_p: u64,
    num_p: u64,
    num_ex_min: u64,
    num_ex_max: u64,
    bits_ex_min: u32,
    bits_ex_max: u32,
}

/// Compressed integer vector with positional `extract`.
#[derive(Debug, Clone)]
pub struct PForDelta {
    num_p: u64,
    num_ex_min: u64,
    num_ex_max: u64,
    min: u64,
    base_p: u64,
    limit_p: u64,
    min_bits: u32,
    max_bits: u32,
    bits_ex_min: u32,
    b: u32,
    bits_ex_max: u32,
    is_middle: bool,
    packed: Vec<u64>,
    ex_min: Vec<u64>,
    ex_max: Vec<u64>,
    bitmap: RankBitmap,
    ex_bitmap: Option<RankBitmap>,
}

impl PForDelta {
    /// Encode `values`. The resulting codec satisfies
    /// `extract(i) == values[i]` for every `i`.
    pub fn encode(values: &[u64]) -> Self {
        let n = values.len() as u64;
        if n == 0 {
            return PForDelta {
                num_p: 0,
                num_ex_min: 0,
                num_ex_max: 0,
                min: 0,
                base_p: 0,
                limit_p: 0,
                min_bits: 0,
                max_bits: 0,
                bits_ex_min: 0,
                b: 0,
                bits_ex_max: 0,
                is_middle: false,
                packed: Vec::new(),
                ex_min: Vec::new(),
                ex_max: Vec::new(),
                bitmap: RankBitmap::build(0, Vec::new()),
                ex_bitmap: None,
            };
        }

        // Tabulate count/min/max per bit-length bucket.
        let mut min = u64::MAX;
        let mut max = 0u64;
        let mut count_lg = [0u64; 65];
        let mut min_lg = [u64::MAX; 65];
        let mut max_lg = [0u64; 65];
        for &x in values {
            min = min.min(x);
            max = max.max(x);
            let lg = bucket_of(x);
            count_lg[lg] += 1;
            min_lg[lg] = min_lg[lg].min(x);
            max_lg[lg] = max_lg[lg].max(x);
        }
        let min_bits = bucket_of(min);
        let max_bits = bucket_of(max);

        let config = Self::search(n, min, max, min_bits, max_bits, &count_lg, &min_lg, &max_lg);

        // Fill the packed and exception arrays.
        let mut bitmap_words = vec![0u64; n.div_ceil(64) as usize];
        let mut packed = vec![0u64; words_for(config.num_p, config.b)];
        let mut ex_min = vec![0u64; words_for(config.num_ex_min, config.bits_ex_min)];
        let mut ex_max = vec![0u64; words_for(config.num_ex_max, config.bits_ex_max)];
        let num_ex = config.num_ex_min + config.num_ex_max;
        let mut ex_bitmap_words = if config.family == Family::Middle {
            vec![0u64; num_ex.div_ceil(64) as usize]
        } else {
            Vec::new()
        };

        let mut p_idx = 0u64;
        let mut min_idx = 0u64;
        let mut max_idx = 0u64;
        let mut ex_pos = 0u64;
        for (i, &x) in values.iter().enumerate() {
            let packed_here = match config.family {
                Family::Degenerate => true,
                Family::Right => x >= config.base_p,
                Family::Left | Family::Middle => config.base_p <= x && x < config.limit_p,
            };
            if packed_here {
                bitmap_words[i / 64] |= 1 << (i % 64);
                set_bits(&mut packed, p_idx * config.b as u64, config.b, x - config.base_p);
                p_idx += 1;
            } else if config.family == Family::Middle {
                if x < config.base_p {
                    ex_bitmap_words[(ex_pos / 64) as usize] |= 1 << (ex_pos % 64);
                    set_bits(
                        &mut ex_min,
                        min_idx * config.bits_ex_min as u64,
                        config.bits_ex_min,
                        x - min,
                    );
                    min_idx += 1;
                } else {
                    set_bits(
                        &mut ex_max,
                        max_idx * config.bits_ex_max as u64,
                        config.bits_ex_max,
                        x - config.limit_p,
                    );
                    max_idx += 1;
                }
                ex_pos += 1;
            } else if config.family == Family::Left {
                set_bits(
                    &mut ex_max,
                    max_idx * config.bits_ex_max as u64,
                    config.bits_ex_max,
                    x - config.limit_p,
                );
                max_idx += 1;
            } else {
                set_bits(
                    &mut ex_min,
                    min_idx * config.bits_ex_min as u64,
                    config.bits_ex_min,
                    x - min,
                );
                min_idx += 1;
            }
        }
        debug_assert_eq!(p_idx, config.num_p);
        debug_assert_eq!(min_idx, config.num_ex_min);
        debug_assert_eq!(max_idx, config.num_ex_max);

        PForDelta {
            num_p: config.num_p,
            num_ex_min: config.num_ex_min,
            num_ex_max: config.num_ex_max,
            min,
            base_p: config.base_p,
            limit_p: config.limit_p,
            min_bits: min_bits as u32,
            max_bits: max_bits as u32,
            bits_ex_min: config.bits_ex_min,
            b: config.b,
            bits_ex_max: config.bits_ex_max,
            is_middle: config.family == Family::Middle,
            packed,
            ex_min,
            ex_max,
            bitmap: RankBitmap::build(n, bitmap_words),
            ex_bitmap: if config.family == Family::Middle {
                Some(RankBitmap::build(num_ex, ex_bitmap_words))
            } else {
                None
            },
        }
    }

    /// Evaluate the three encoding families over every admissible bucket
    /// boundary; fall back to a single `[min, max]` packed array when no
    /// candidate beats flat max-width storage.
    #[allow(clippy::too_many_arguments)]
    fn search(
        n: u64,
        min: u64,
        max: u64,
        min_bits: usize,
        max_bits: usize,
        count_lg: &[u64; 65],
        min_lg: &[u64; 65],
        max_lg: &[u64; 65],
    ) -> Config {
        let mut best_bits = n as f64 * max_bits as f64;
        let mut best: Option<Config> = None;

        let next_nonempty_above =
            |i: usize| (i + 1..=max_bits).find(|&j| count_lg[j] > 0);
        let next_nonempty_below =
            |i: usize| (min_bits..i).rev().find(|&j| count_lg[j] > 0);

        // Left-packed: [min, aux_min), exceptions above only.
        let mut count = 0u64;
        for i in min_bits..max_bits {
            if count_lg[i] == 0 {
                continue;
            }
            count += count_lg[i];
            let b = width_of(max_lg[i] - min);
            let aux_min = min_lg[next_nonempty_above(i).expect("top bucket occupied")];
            let bits_ex_max = width_of(max - aux_min);
            let total = (count * b as u64 + (n - count) * bits_ex_max as u64) as f64;
            if total < best_bits {
                best_bits = total;
                best = Some(Config {
                    family: Family::Left,
                    b,
                    base_p: min,
                    limit_p: aux_min,
                    num_p: count,
                    num_ex_min: 0,
                    num_ex_max: n - count,
                    bits_ex_min: 0,
                    bits_ex_max,
                });
            }
        }

        // Right-packed: [min_lg[i], max], exceptions below only.
        let mut count = 0u64;
        for i in (min_bits + 1..=max_bits).rev() {
            if count_lg[i] == 0 {
                continue;
            }
            count += count_lg[i];
            let b = width_of(max - min_lg[i]);
            let aux_max = max_lg[next_nonempty_below(i).expect("bottom bucket occupied")];
            let bits_ex_min = width_of(aux_max - min);
            let total = (count * b as u64 + (n - count) * bits_ex_min as u64) as f64;
            if total < best_bits {
                best_bits = total;
                best = Some(Config {
                    family: Family::Right,
                    b,
                    base_p: min_lg[i],
                    // Historical images record the maximum here; decode never
                    // reads it for this family.
                    limit_p: max,
                    num_p: count,
                    num_ex_min: n - count,
                    num_ex_max: 0,
                    bits_ex_min,
                    bits_ex_max: 0,
                });
            }
        }

        // Middle-packed: interior window, exceptions on both sides. The
        // selector bitmap costs ~1.1 bits per exception.
        for i in min_bits + 1..max_bits {
            if count_lg[i] == 0 {
                continue;
            }
            let aux_max = max_lg[next_nonempty_below(i).expect("bucket below exists")];
            let bits_ex_min = width_of(aux_max - min);
            let count_below: u64 = count_lg[min_bits..i].iter().sum();
            for j in i..max_bits {
                if count_lg[j] == 0 {
                    continue;
                }
                let count_mid: u64 = count_lg[i..=j].iter().sum();
                let b = width_of(max_lg[j] - min_lg[i]);
                let aux_min = min_lg[next_nonempty_above(j).expect("bucket above exists")];
                let bits_ex_max = width_of(max - aux_min);
                let num_ex_max = n - count_mid - count_below;
                let total = count_below as f64 * bits_ex_min as f64
                    + count_mid as f64 * b as f64
                    + num_ex_max as f64 * bits_ex_max as f64
                    + (n - count_mid) as f64 * 1.1;
                if total < best_bits {
                    best_bits = total;
                    best = Some(Config {
                        family: Family::Middle,
                        b,
                        base_p: min_lg[i],
                        limit_p: aux_min,
                        num_p: count_mid,
                        num_ex_min: count_below,
                        num_ex_max,
                        bits_ex_min,
                        bits_ex_max,
                    });
                }
            }
        }

        best.unwrap_or(Config {
            family: Family::Degenerate,
            b: width_of(max - min),
            base_p: min,
            limit_p: max,
            num_p: n,
            num_ex_min: 0,
            num_ex_max: 0,
            bits_ex_min: 0,
            bits_ex_max: 0,
        })
    }

    /// Number of encoded values.
    pub fn len(&self) -> u64 {
        self.num_p + self.num_ex_min + self.num_ex_max
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value at position `i`. Calling with `i >= len()` is a programming
    /// error.
    pub fn extract(&self, i: u64) -> u64 {
        debug_assert!(i < self.len(), "extract index {i} out of range");

        let r = self.bitmap.rank1(i + 1);
        if self.bitmap.get(i) {
            return self.base_p + get_bits(&self.packed, (r - 1) * self.b as u64, self.b);
        }

        let e = i + 1 - r;
        if let Some(ex_bitmap) = &self.ex_bitmap {
            let j = ex_bitmap.rank1(e);
            if ex_bitmap.get(e - 1) {
                self.min + get_bits(&self.ex_min, (j - 1) * self.bits_ex_min as u64, self.bits_ex_min)
            } else {
                self.limit_p
                    + get_bits(
                        &self.ex_max,
                        (e - j - 1) * self.bits_ex_max as u64,
                        self.bits_ex_max,
                    )
            }
        } else if self.num_ex_min > 0 {
            self.min + get_bits(&self.ex_min, (e - 1) * self.bits_ex_min as u64, self.bits_ex_min)
        } else {
            self.limit_p + get_bits(&self.ex_max, (e - 1) * self.bits_ex_max as u64, self.bits_ex_max)
        }
    }

    /// Serialize the `PFDV1.` image.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(TAG);

        for v in [
            self.num_p,
            self.num_ex_min,
            self.num_ex_max,
            self.min,
            self.base_p,
            self.limit_p,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        for v in [
            self.min_bits,
            self.max_bits,
            self.bits_ex_min,
            self.b,
            self.bits_ex_max,
        ] {
            out.extend_from_slice(&v.to_le_bytes());
        }
        out.push(self.is_middle as u8);

        for w in self.packed.iter().chain(&self.ex_min).chain(&self.ex_max) {
            out.extend_from_slice(&w.to_le_bytes());
        }

        self.bitmap.write_to(out);
        if let Some(ex_bitmap) = &self.ex_bitmap {
            ex_bitmap.write_to(out);
        }
    }

    /// Parse a `PFDV1.` image from the front of `bytes`, returning the codec
    /// and the number of bytes consumed.
    pub fn load(bytes: &[u8]) -> Result<(Self, usize)> {
        if bytes.len() < TAG.len() || &bytes[..TAG.len()] != TAG {
            return Err(Error::malformed("invalid PForDelta tag"));
        }
        let mut pos = TAG.len();

        let read_u64 = |pos: &mut usize| -> Result<u64> {
            let end = *pos + 8;
            let s = bytes
                .get(*pos..end)
                .ok_or_else(|| Error::malformed("truncated PForDelta image"))?;
            *pos = end;
            Ok(u64::from_le_bytes(s.try_into().unwrap()))
        };
        let num_p = read_u64(&mut pos)?;
        let num_ex_min = read_u64(&mut pos)?;
        let num_ex_max = read_u64(&mut pos)?;
        let min = read_u64(&mut pos)?;
        let base_p = read_u64(&mut pos)?;
        let limit_p = read_u64(&mut pos)?;

        let read_u32 = |pos: &mut usize| -> Result<u32> {
            let end = *pos + 4;
            let s = bytes
                .get(*pos..end)
                .ok_or_else(|| Error::malformed("truncated PForDelta image"))?;
            *pos = end;
            Ok(u32::from_le_bytes(s.try_into().unwrap()))
        };
        let min_bits = read_u32(&mut pos)?;
        let max_bits = read_u32(&mut pos)?;
        let bits_ex_min = read_u32(&mut pos)?;
        let b = read_u32(&mut pos)?;
        let bits_ex_max = read_u32(&mut pos)?;

        let is_middle = match bytes.get(pos) {
            Some(0) => false,
            Some(1) => true,
            Some(_) => return Err(Error::malformed("invalid PForDelta flag byte")),
            None => return Err(Error::malformed("truncated PForDelta image")),
        };
        pos += 1;

        if b > 64 || bits_ex_min > 64 || bits_ex_max > 64 {
            return Err(Error::malformed("PForDelta bit width out of range"));
        }

        let read_words = |pos: &mut usize, count: usize| -> Result<Vec<u64>> {
            let end = *pos + count * 8;
            let slice = bytes
                .get(*pos..end)
                .ok_or_else(|| Error::malformed("truncated PForDelta array"))?;
            *pos = end;
            Ok(slice
                .chunks_exact(8)
                .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                .collect())
        };
        let packed = read_words(&mut pos, words_for(num_p, b))?;
        let ex_min = read_words(&mut pos, words_for(num_ex_min, bits_ex_min))?;
        let ex_max = read_words(&mut pos, words_for(num_ex_max, bits_ex_max))?;

        let (bitmap, used) = RankBitmap::read_from(&bytes[pos..])?;
        pos += used;
        if bitmap.len() != num_p + num_ex_min + num_ex_max {
            return Err(Error::malformed("PForDelta bitmap length mismatch"));
        }

        let ex_bitmap = if is_middle {
            let (bm, used) = RankBitmap::read_from(&bytes[pos..])?;
            pos += used;
            if bm.len() != num_ex_min + num_ex_max {
                return Err(Error::malformed("PForDelta exception bitmap length mismatch"));
            }
            Some(bm)
        } else {
            None
        };

        Ok((
            PForDelta {
                num_p,
                num_ex_min,
                num_ex_max,
                min,
                base_p,
                limit_p,
                min_bits,
                max_bits,
                bits_ex_min,
                b,
                bits_ex_max,
                is_middle,
                packed,
                ex_min,
                ex_max,
                bitmap,
                ex_bitmap,
            },
            pos,
        ))
    }

    /// Size in bytes of the serialized image.
    pub fn image_len(&self) -> usize {
        let mut out = Vec::new();
        self.write_to(&mut out);
        out.len()
    }
}
