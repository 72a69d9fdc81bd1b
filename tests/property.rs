// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Property tests: codec faithfulness and store round-trips over generated
//! inputs.

mod common;

use std::collections::{BTreeMap, BTreeSet};

use common::Workspace;
use proptest::prelude::*;
use scdb::varint::{decode_varint, encode_varint};
use scdb::{create_writer, open_reader, BuildType, PForDelta, ReaderOption, WriterOption};

proptest! {
    #[test]
    fn varint_roundtrip(value in any::<u64>()) {
        let mut buf = Vec::new();
        let written = encode_varint(value, &mut buf);
        let (decoded, consumed) = decode_varint(&buf).unwrap();
        prop_assert_eq!(decoded, value);
        prop_assert_eq!(consumed, written);
        prop_assert_eq!(consumed, buf.len());
    }

    #[test]
    fn pfordelta_extract_is_faithful(values in prop::collection::vec(any::<u64>(), 0..300)) {
        let pfd = PForDelta::encode(&values);
        prop_assert_eq!(pfd.len(), values.len() as u64);
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(pfd.extract(i as u64), v);
        }
    }

    #[test]
    fn pfordelta_clustered_distribution(
        cluster in prop::collection::vec(1000u64..1064, 1..200),
        low in prop::collection::vec(0u64..8, 0..10),
        high in prop::collection::vec(1u64 << 40..(1u64 << 40) + 1000, 0..10),
    ) {
        let mut values = cluster;
        values.extend(low);
        values.extend(high);

        let pfd = PForDelta::encode(&values);
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(pfd.extract(i as u64), v);
        }

        // image round-trip preserves every extraction
        let mut image = Vec::new();
        pfd.write_to(&mut image);
        let (loaded, consumed) = PForDelta::load(&image).unwrap();
        prop_assert_eq!(consumed, image.len());
        for (i, &v) in values.iter().enumerate() {
            prop_assert_eq!(loaded.extract(i as u64), v);
        }
    }
}

fn key_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 1..12)
}

fn small_ascii_key() -> impl Strategy<Value = String> {
    "[a-d]{1,6}"
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn map_roundtrip_both_variants(
        entries in prop::collection::btree_map(key_strategy(), prop::collection::vec(any::<u8>(), 0..40), 1..60),
        load_factor in prop::sample::select(vec![0.0f64, 0.5, 0.9]),
    ) {
        let ws = Workspace::new();
        let option = WriterOption { load_factor, ..ws.option() };
        let mut writer = create_writer(option, ws.artifact()).unwrap();
        for (key, value) in &entries {
            writer.put_value(key, value).unwrap();
        }
        writer.close().unwrap();

        let reader = open_reader(ReaderOption::default(), ws.artifact()).unwrap();
        for (key, value) in &entries {
            let got = reader.get(key).unwrap();
            prop_assert_eq!(got.as_deref(), Some(value.as_slice()));
        }
    }

    #[test]
    fn set_closure_both_variants(
        members in prop::collection::btree_set(key_strategy(), 1..60),
        probes in prop::collection::vec(key_strategy(), 10),
        load_factor in prop::sample::select(vec![0.0f64, 0.75]),
    ) {
        let ws = Workspace::new();
        let option = WriterOption {
            build_type: BuildType::Set,
            load_factor,
            ..ws.option()
        };
        let mut writer = create_writer(option, ws.artifact()).unwrap();
        for key in &members {
            writer.put(key).unwrap();
        }
        writer.close().unwrap();

        let reader = open_reader(ReaderOption::default(), ws.artifact()).unwrap();
        for key in &members {
            prop_assert!(reader.exist(key));
        }
        for probe in &probes {
            prop_assert_eq!(reader.exist(probe), members.contains(probe));
        }
    }

    #[test]
    fn prefix_get_is_complete_and_exact(
        members in prop::collection::btree_set(small_ascii_key(), 1..40),
        prefix in "[a-d]{0,3}",
    ) {
        let ws = Workspace::new();
        let option = WriterOption { build_type: BuildType::Set, ..ws.option() };
        let mut writer = create_writer(option, ws.artifact()).unwrap();
        for key in &members {
            writer.put(key.as_bytes()).unwrap();
        }
        writer.close().unwrap();

        let reader = open_reader(ReaderOption::default(), ws.artifact()).unwrap();
        let matches = reader.prefix_get(prefix.as_bytes(), usize::MAX).unwrap();

        let got: BTreeSet<String> = matches
            .iter()
            .map(|(k, _)| String::from_utf8(k.clone()).unwrap())
            .collect();
        let expected: BTreeSet<String> = members
            .iter()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();

        // every stored key with the prefix, each exactly once
        prop_assert_eq!(got.len(), matches.len());
        prop_assert_eq!(got, expected);
    }

    #[test]
    fn last_duplicate_wins_in_trie_maps(
        entries in prop::collection::vec((small_ascii_key(), prop::collection::vec(any::<u8>(), 0..16)), 1..40),
    ) {
        let ws = Workspace::new();
        let mut writer = create_writer(ws.option(), ws.artifact()).unwrap();
        let mut expected: BTreeMap<String, Vec<u8>> = BTreeMap::new();
        for (key, value) in &entries {
            writer.put_value(key.as_bytes(), value).unwrap();
            expected.insert(key.clone(), value.clone());
        }
        writer.close().unwrap();

        let reader = open_reader(ReaderOption::default(), ws.artifact()).unwrap();
        for (key, value) in &expected {
            let got = reader.get(key.as_bytes()).unwrap();
            prop_assert_eq!(
                got.as_deref(),
                Some(value.as_slice())
            );
        }
    }
}
