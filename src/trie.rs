// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Succinct trie adapter.
//!
//! The key index is an `fst::Map` whose value for each key is the key's
//! lexicographic rank, so ids are dense in `[0, N)` and the map doubles as an
//! order-preserving minimal perfect mapping. That rank assignment is what
//! makes `reverse_lookup` possible: outputs in the automaton accumulate
//! monotonically along the sorted key space, so a greedy descent that always
//! takes the rightmost transition not exceeding the target id walks straight
//! to the owning key.
//!
//! The byte image is the exact `fst` representation; the reader maps it
//! zero-copy out of the artifact through any `AsRef<[u8]>` window.

use fst::raw::Output;
use fst::{IntoStreamer, Map, MapBuilder, Streamer};

use crate::error::{Error, Result};

fn fst_err(e: fst::Error) -> Error {
    Error::MalformedData(format!("trie: {e}"))
}

/// Build a trie image over sorted, unique keys. The key at position `i`
/// receives id `i`.
pub fn build_image<K: AsRef<[u8]>>(sorted_unique: &[K]) -> Result<Vec<u8>> {
    let mut builder = MapBuilder::memory();
    for (id, key) in sorted_unique.iter().enumerate() {
        builder.insert(key, id as u64).map_err(fst_err)?;
    }
    builder.into_inner().map_err(fst_err)
}

/// Smallest byte string greater than every string prefixed by `prefix`, or
/// `None` when no such bound exists (all bytes 0xFF).
fn prefix_successor(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut upper = prefix.to_vec();
    while let Some(&last) = upper.last() {
        if last < 0xFF {
            *upper.last_mut().unwrap() = last + 1;
            return Some(upper);
        }
        upper.pop();
    }
    None
}

/// Read-side trie over any byte container.
pub struct Trie<D: AsRef<[u8]>> {
    map: Map<D>,
}

impl<D: AsRef<[u8]>> Trie<D> {
    /// Interpret `data` as a trie image.
    pub fn from_bytes(data: D) -> Result<Self> {
        Ok(Trie {
            map: Map::new(data).map_err(fst_err)?,
        })
    }

    /// Number of keys.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Exact-match lookup returning the key's id.
    pub fn lookup(&self, key: &[u8]) -> Option<u64> {
        self.map.get(key)
    }

    /// All keys starting with `prefix`, in lexicographic order, up to
    /// `count` entries.
    pub fn predictive_search(&self, prefix: &[u8], count: usize) -> Vec<(Vec<u8>, u64)> {
        let mut results = Vec::new();
        if count == 0 {
            return results;
        }

        let builder = self.map.range().ge(prefix);
        let mut stream = match prefix_successor(prefix) {
            Some(upper) => builder.lt(upper).into_stream(),
            None => builder.into_stream(),
        };

        while let Some((key, id)) = stream.next() {
            results.push((key.to_vec(), id));
            if results.len() >= count {
                break;
            }
        }
        results
    }

    /// Key bytes for an id previously returned by this trie.
    ///
    /// Greedy output descent: at each node take the rightmost transition
    /// whose accumulated output does not exceed `id`. Returns `None` when
    /// `id` is out of range or the image is inconsistent.
    pub fn reverse_lookup(&self, id: u64) -> Option<Vec<u8>> {
        if id >= self.map.len() as u64 {
            return None;
        }

        let fst = self.map.as_fst();
        let mut node = fst.root();
        let mut acc = Output::zero();
        let mut key = Vec::new();

        // a simple path in an acyclic automaton cannot be longer than its image
        let max_depth = fst.as_bytes().len() + 1;
        while key.len() < max_depth {
            if node.is_final() && acc.cat(node.final_output()).value() == id {
                return Some(key);
            }

            let mut chosen = None;
            for t in node.transitions() {
                if acc.cat(t.out).value() <= id {
                    chosen = Some(t);
                }
            }
            let t = chosen?;
            acc = acc.cat(t.out);
            key.push(t.inp);
            node = fst.node(t.addr);
        }
        None
    }
}
