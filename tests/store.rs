// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! End-to-end artifact tests: build with each variant and mode, re-open, and
//! query through the public API.

mod common;

use common::{build_map, build_set, Workspace};
use scdb::{
    create_writer, inspect, open_reader, BuildType, CompressType, Error, ReaderOption, WriterOption,
};

fn reader_option() -> ReaderOption {
    ReaderOption::default()
}

// ============================================================================
// TRIE VARIANT
// ============================================================================

#[test]
fn set_membership() {
    let ws = Workspace::new();
    build_set(&ws, ws.option(), &[b"a", b"ab", b"abc"]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert!(reader.exist(b"a"));
    assert!(reader.exist(b"ab"));
    assert!(reader.exist(b"abc"));
    assert!(!reader.exist(b"abcd"));
    assert!(!reader.exist(b""));

    // set artifacts return no values
    assert_eq!(reader.get(b"a").unwrap(), None);
    assert_eq!(reader.get(b"abc").unwrap(), None);
}

#[test]
fn map_roundtrip_raw_values() {
    let ws = Workspace::new();
    build_map(
        &ws,
        ws.option(),
        &[
            (b"apple", b"red"),
            (b"banana", b"yellow"),
            (b"cherry", b"red"),
        ],
    );

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(reader.get_string(b"apple").unwrap().as_deref(), Some("red"));
    assert_eq!(
        reader.get_string(b"banana").unwrap().as_deref(),
        Some("yellow")
    );
    assert_eq!(
        reader.get_string(b"cherry").unwrap().as_deref(),
        Some("red")
    );
    assert_eq!(reader.get(b"grape").unwrap(), None);
}

#[test]
fn adjacent_duplicate_values_share_storage() {
    // same-length keys with identical adjacent values: the data segment must
    // be no larger than for a single entry
    let single = Workspace::new();
    build_map(&single, single.option(), &[(b"k1", b"red")]);
    let coalesced = Workspace::new();
    build_map(
        &coalesced,
        coalesced.option(),
        &[(b"k1", b"red"), (b"k2", b"red"), (b"k3", b"red")],
    );

    let span = |path: &std::path::Path| {
        let info = inspect(path).unwrap();
        info.sections
            .iter()
            .find(|(name, _, _)| name == "data segments")
            .map(|(_, start, end)| end - start)
            .unwrap()
    };
    assert_eq!(span(single.artifact()), span(coalesced.artifact()));

    let reader = open_reader(reader_option(), coalesced.artifact()).unwrap();
    for key in [&b"k1"[..], b"k2", b"k3"] {
        assert_eq!(reader.get_string(key).unwrap().as_deref(), Some("red"));
    }
}

#[test]
fn snappy_values_compress_and_reconstruct() {
    let ws = Workspace::new();
    let big = vec![0u8; 1 << 20];
    let mut option = ws.option();
    option.compress_type = CompressType::Snappy;
    build_map(&ws, option, &[(b"k", big.as_slice())]);

    let info = inspect(ws.artifact()).unwrap();
    let data_span = info
        .sections
        .iter()
        .find(|(name, _, _)| name == "data segments")
        .map(|(_, start, end)| end - start)
        .unwrap();
    assert!(data_span < 1 << 17, "stored segment is {data_span} bytes");

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(reader.get(b"k").unwrap().as_deref(), Some(big.as_slice()));
}

#[test]
fn dfa_values_live_in_a_second_trie() {
    let ws = Workspace::new();
    let mut option = ws.option();
    option.compress_type = CompressType::Dfa;
    build_map(
        &ws,
        option,
        &[(b"en", b"hello"), (b"fr", b"bonjour"), (b"es", b"hola")],
    );

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(
        reader.get_string(b"en").unwrap().as_deref(),
        Some("hello")
    );
    assert_eq!(
        reader.get_string(b"fr").unwrap().as_deref(),
        Some("bonjour")
    );
    assert_eq!(reader.get_string(b"es").unwrap().as_deref(), Some("hola"));
    assert_eq!(reader.get(b"de").unwrap(), None);
}

#[test]
fn dfa_shares_value_ids_between_equal_values() {
    let ws = Workspace::new();
    let mut option = ws.option();
    option.compress_type = CompressType::Dfa;
    build_map(
        &ws,
        option,
        &[
            (b"one", b"odd"),
            (b"two", b"even"),
            (b"three", b"odd"),
            (b"four", b"even"),
        ],
    );

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(reader.get_string(b"one").unwrap().as_deref(), Some("odd"));
    assert_eq!(reader.get_string(b"three").unwrap().as_deref(), Some("odd"));
    assert_eq!(reader.get_string(b"four").unwrap().as_deref(), Some("even"));
}

#[test]
fn prefix_enumeration() {
    let ws = Workspace::new();
    build_set(&ws, ws.option(), &[b"car", b"cart", b"cartoon", b"dog"]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    let matches = reader.prefix_get(b"car", 10).unwrap();
    let keys: Vec<&[u8]> = matches.iter().map(|(k, _)| k.as_slice()).collect();
    assert_eq!(keys, vec![&b"car"[..], b"cart", b"cartoon"]);

    // limited
    assert_eq!(reader.prefix_get(b"car", 2).unwrap().len(), 2);
    // no matches
    assert!(reader.prefix_get(b"cat", 10).unwrap().is_empty());
}

#[test]
fn prefix_enumeration_carries_values() {
    let ws = Workspace::new();
    build_map(
        &ws,
        ws.option(),
        &[(b"car", b"1"), (b"cart", b"2"), (b"dog", b"3")],
    );

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    let matches = reader.prefix_get(b"car", 10).unwrap();
    assert_eq!(matches.len(), 2);
    assert_eq!(matches[0], (b"car".to_vec(), b"1".to_vec()));
    assert_eq!(matches[1], (b"cart".to_vec(), b"2".to_vec()));
}

#[test]
fn duplicate_keys_last_value_wins() {
    let ws = Workspace::new();
    build_map(
        &ws,
        ws.option(),
        &[(b"dup", b"first"), (b"other", b"x"), (b"dup", b"second")],
    );

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(
        reader.get_string(b"dup").unwrap().as_deref(),
        Some("second")
    );
    assert_eq!(reader.get_string(b"other").unwrap().as_deref(), Some("x"));
}

#[test]
fn empty_keys_are_dropped() {
    let ws = Workspace::new();
    build_map(&ws, ws.option(), &[(b"", b"ghost"), (b"real", b"v")]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert!(!reader.exist(b""));
    assert!(reader.exist(b"real"));
}

#[test]
fn empty_values_roundtrip() {
    let ws = Workspace::new();
    build_map(&ws, ws.option(), &[(b"nil", b""), (b"one", b"1")]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(reader.get(b"nil").unwrap().as_deref(), Some(&b""[..]));
    assert_eq!(reader.get_string(b"one").unwrap().as_deref(), Some("1"));
}

#[test]
fn binary_keys_and_values() {
    let ws = Workspace::new();
    let key = [0x00u8, 0xFF, 0x7F, 0x80];
    let value = [0xDEu8, 0xAD, 0x00, 0xBE, 0xEF];
    build_map(&ws, ws.option(), &[(&key, &value)]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(reader.get(&key).unwrap().as_deref(), Some(&value[..]));
}

#[test]
fn populate_option_is_accepted() {
    let ws = Workspace::new();
    build_map(&ws, ws.option(), &[(b"k", b"v")]);

    let reader = open_reader(
        ReaderOption {
            mmap_populate: true,
        },
        ws.artifact(),
    )
    .unwrap();
    assert!(reader.exist(b"k"));
}

// ============================================================================
// HASH VARIANT
// ============================================================================

fn hash_option(ws: &Workspace) -> WriterOption {
    WriterOption {
        load_factor: 0.75,
        ..ws.option()
    }
}

#[test]
fn hash_set_membership() {
    let ws = Workspace::new();
    build_set(&ws, hash_option(&ws), &[b"a", b"ab", b"abc"]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert!(reader.exist(b"a"));
    assert!(reader.exist(b"ab"));
    assert!(reader.exist(b"abc"));
    assert!(!reader.exist(b"abcd"));
    assert!(!reader.exist(b""));
    assert_eq!(reader.get(b"a").unwrap(), None);
}

#[test]
fn hash_map_roundtrip() {
    let ws = Workspace::new();
    build_map(
        &ws,
        hash_option(&ws),
        &[
            (b"apple", b"red"),
            (b"banana", b"yellow"),
            (b"cherry", b"red"),
        ],
    );

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(reader.get_string(b"apple").unwrap().as_deref(), Some("red"));
    assert_eq!(
        reader.get_string(b"banana").unwrap().as_deref(),
        Some("yellow")
    );
    assert_eq!(
        reader.get_string(b"cherry").unwrap().as_deref(),
        Some("red")
    );
    assert_eq!(reader.get(b"grape").unwrap(), None);
}

#[test]
fn hash_map_many_keys_per_bucket() {
    let ws = Workspace::new();
    let pairs: Vec<(Vec<u8>, Vec<u8>)> = (0..500u32)
        .map(|i| {
            (
                format!("key{i:05}").into_bytes(),
                format!("value-{i}").into_bytes(),
            )
        })
        .collect();
    let borrowed: Vec<(&[u8], &[u8])> = pairs
        .iter()
        .map(|(k, v)| (k.as_slice(), v.as_slice()))
        .collect();
    build_map(&ws, hash_option(&ws), &borrowed);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    for (key, value) in &pairs {
        assert_eq!(reader.get(key).unwrap().as_deref(), Some(value.as_slice()));
    }
    assert!(!reader.exist(b"key99999"));
}

#[test]
fn hash_snappy_values() {
    let ws = Workspace::new();
    let mut option = hash_option(&ws);
    option.compress_type = CompressType::Snappy;
    let big = vec![7u8; 200_000];
    build_map(&ws, option, &[(b"blob", big.as_slice()), (b"tiny", b"x")]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(reader.get(b"blob").unwrap().as_deref(), Some(big.as_slice()));
    assert_eq!(reader.get_string(b"tiny").unwrap().as_deref(), Some("x"));
}

#[test]
fn hash_duplicate_keys_first_value_wins() {
    let ws = Workspace::new();
    build_map(
        &ws,
        hash_option(&ws),
        &[(b"dup", b"first"), (b"dup", b"second")],
    );

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert_eq!(reader.get_string(b"dup").unwrap().as_deref(), Some("first"));
}

#[test]
fn hash_rejects_bad_load_factor() {
    for load_factor in [1.0, 1.5, -0.5] {
        let ws = Workspace::new();
        let option = WriterOption {
            load_factor,
            ..ws.option()
        };
        assert!(matches!(
            create_writer(option, ws.artifact()),
            Err(Error::InvalidOperation(_))
        ));
    }
}

#[test]
fn hash_rejects_dfa_values() {
    let ws = Workspace::new();
    let option = WriterOption {
        load_factor: 0.75,
        compress_type: CompressType::Dfa,
        ..ws.option()
    };
    assert!(matches!(
        create_writer(option, ws.artifact()),
        Err(Error::UnsupportedFormat(_))
    ));
}

#[test]
fn hash_prefix_queries_return_empty() {
    let ws = Workspace::new();
    build_set(&ws, hash_option(&ws), &[b"car", b"cart"]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert!(reader.prefix_get(b"car", 10).unwrap().is_empty());
}

// ============================================================================
// CHECKSUM, LIFECYCLE, FACTORY
// ============================================================================

#[test]
fn checksummed_artifact_verifies_and_detects_corruption() {
    for load_factor in [0.0, 0.75] {
        let ws = Workspace::new();
        let option = WriterOption {
            with_checksum: true,
            load_factor,
            ..ws.option()
        };
        build_map(
            &ws,
            option,
            &[(b"apple", b"red"), (b"banana", b"yellow")],
        );

        // clean artifact loads
        let reader = open_reader(reader_option(), ws.artifact()).unwrap();
        assert_eq!(reader.get_string(b"apple").unwrap().as_deref(), Some("red"));
        drop(reader);

        // a single flipped byte fails construction
        let mut bytes = std::fs::read(ws.artifact()).unwrap();
        assert!(bytes.len() > 100);
        bytes[100] ^= 0xFF;
        std::fs::write(ws.artifact(), &bytes).unwrap();
        assert!(matches!(
            open_reader(reader_option(), ws.artifact()).err(),
            Some(Error::IntegrityError(_))
        ));
    }
}

#[test]
fn close_is_idempotent() {
    let ws = Workspace::new();
    let mut option = ws.option();
    option.build_type = BuildType::Map;
    let mut writer = create_writer(option, ws.artifact()).unwrap();
    writer.put_value(b"k", b"v").unwrap();
    writer.close().unwrap();

    let first = std::fs::read(ws.artifact()).unwrap();
    writer.close().unwrap();
    let second = std::fs::read(ws.artifact()).unwrap();
    assert_eq!(first, second);
}

#[test]
fn temp_spools_are_deleted_at_close() {
    let ws = Workspace::new();
    build_map(&ws, ws.option(), &[(b"k1", b"v1"), (b"key2", b"v2")]);

    let spool = ws.dir.path().join("spool");
    let leftovers: Vec<_> = std::fs::read_dir(&spool)
        .map(|entries| entries.filter_map(|e| e.ok()).collect())
        .unwrap_or_default();
    assert!(leftovers.is_empty(), "leftover temp files: {leftovers:?}");
}

#[test]
fn mode_mismatched_puts_are_rejected() {
    let ws = Workspace::new();
    let mut map_writer = create_writer(ws.option(), ws.artifact()).unwrap();
    assert!(matches!(
        map_writer.put(b"k"),
        Err(Error::InvalidOperation(_))
    ));
    map_writer.put_value(b"k", b"v").unwrap();
    map_writer.close().unwrap();

    let ws = Workspace::new();
    let mut option = ws.option();
    option.build_type = BuildType::Set;
    let mut set_writer = create_writer(option, ws.artifact()).unwrap();
    assert!(matches!(
        set_writer.put_value(b"k", b"v"),
        Err(Error::InvalidOperation(_))
    ));
    set_writer.put(b"k").unwrap();
    set_writer.close().unwrap();
}

#[test]
fn factory_rejects_unknown_magic() {
    let ws = Workspace::new();
    std::fs::write(ws.artifact(), b"NOTSCDB-and-some-padding").unwrap();
    assert!(matches!(
        open_reader(reader_option(), ws.artifact()).err(),
        Some(Error::UnsupportedFormat(_))
    ));
}

#[test]
fn factory_rejects_truncated_file() {
    let ws = Workspace::new();
    std::fs::write(ws.artifact(), b"SC").unwrap();
    assert!(matches!(
        open_reader(reader_option(), ws.artifact()).err(),
        Some(Error::MalformedData(_))
    ));
}

#[test]
fn empty_map_artifact_loads() {
    let ws = Workspace::new();
    build_map(&ws, ws.option(), &[]);

    let reader = open_reader(reader_option(), ws.artifact()).unwrap();
    assert!(!reader.exist(b"anything"));
    assert_eq!(reader.get(b"anything").unwrap(), None);
    assert!(reader.prefix_get(b"", 10).unwrap().is_empty());
}

#[test]
fn inspect_reports_layout() {
    let ws = Workspace::new();
    let option = WriterOption {
        with_checksum: true,
        ..ws.option()
    };
    build_map(&ws, option, &[(b"apple", b"red"), (b"fig", b"purple")]);

    let info = inspect(ws.artifact()).unwrap();
    assert_eq!(info.variant, "trie (SCDBV2.)");
    assert!(info.with_checksum);
    assert_eq!(info.num_key_lengths, 2);
    assert_eq!(info.max_key_length, 5);

    // sections tile the file exactly
    let mut cursor = 0;
    for (_, start, end) in &info.sections {
        assert_eq!(*start, cursor);
        assert!(end >= start);
        cursor = *end;
    }
    assert_eq!(cursor, info.file_len);
}
