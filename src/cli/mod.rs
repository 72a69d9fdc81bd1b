// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! CLI definitions for the scdb command-line interface.
//!
//! Five subcommands: `build` to create artifacts from text input, `inspect`
//! to examine their structure, and `exist` / `get` / `prefix` to query them.
//! Build input is one key per line in set mode, or tab-separated
//! `key<TAB>value` lines in map mode.

use clap::{Parser, Subcommand, ValueEnum};

#[derive(Parser)]
#[command(
    name = "scdb",
    about = "Build-once, read-many static key-value store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug, ValueEnum)]
pub enum CompressArg {
    None,
    Snappy,
    Dfa,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build an artifact from line-oriented text input
    Build {
        /// Input file: one key per line (set), or key<TAB>value lines (map)
        #[arg(short, long)]
        input: String,

        /// Output artifact path
        #[arg(short, long)]
        output: String,

        /// Build a key-only set instead of a key-value map
        #[arg(long)]
        set: bool,

        /// Value encoding (map mode)
        #[arg(long, value_enum, default_value_t = CompressArg::None)]
        compress: CompressArg,

        /// Append a whole-file checksum, verified at load time
        #[arg(short = 'w', long)]
        with_checksum: bool,

        /// Use the hash variant with this open-addressing load factor
        #[arg(long)]
        load_factor: Option<f64>,

        /// Folder for temp spool files
        #[arg(short, long, default_value = "./tmp")]
        tmpdir: String,

        /// Re-open the artifact after the build and verify every key
        #[arg(short, long)]
        fulltest: bool,
    },

    /// Print an artifact's header and section layout
    Inspect {
        /// Path to the artifact
        file: String,
    },

    /// Check whether a key is stored
    Exist {
        /// Path to the artifact
        file: String,

        /// Key to look up
        key: String,
    },

    /// Print the value stored for a key
    Get {
        /// Path to the artifact
        file: String,

        /// Key to look up
        key: String,
    },

    /// Enumerate stored keys by prefix
    Prefix {
        /// Path to the artifact
        file: String,

        /// Key prefix
        prefix: String,

        /// Maximum number of results
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}
