// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Bit-level storage primitives: fixed-width packing and rank-capable bitmaps.

pub mod packed;
pub mod rank;

pub use packed::{get_bits, set_bits, words_for};
pub use rank::RankBitmap;
