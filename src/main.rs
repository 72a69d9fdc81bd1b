// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! scdb CLI: build, inspect, and query static key-value artifacts.
//!
//! ```bash
//! # Build a map artifact from tab-separated key/value lines
//! scdb build --input pairs.tsv --output words.scdb --with-checksum
//!
//! # Build a key-only set with the hash variant
//! scdb build --input keys.txt --output keys.scdb --set --load-factor 0.75
//!
//! # Examine the binary structure
//! scdb inspect words.scdb
//!
//! # Query
//! scdb get words.scdb apple
//! scdb prefix words.scdb app --limit 20
//! ```

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use scdb::{
    create_writer, inspect, open_reader, BuildType, CompressType, Error, ReaderOption, Result,
    WriterOption,
};

mod cli;
use cli::{Cli, Commands, CompressArg};

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::Build {
            input,
            output,
            set,
            compress,
            with_checksum,
            load_factor,
            tmpdir,
            fulltest,
        } => run_build(
            &input,
            &output,
            set,
            compress,
            with_checksum,
            load_factor,
            &tmpdir,
            fulltest,
        ),
        Commands::Inspect { file } => run_inspect(&file),
        Commands::Exist { file, key } => run_exist(&file, &key),
        Commands::Get { file, key } => run_get(&file, &key),
        Commands::Prefix {
            file,
            prefix,
            limit,
        } => run_prefix(&file, &prefix, limit),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn run_build(
    input: &str,
    output: &str,
    set: bool,
    compress: CompressArg,
    with_checksum: bool,
    load_factor: Option<f64>,
    tmpdir: &str,
    fulltest: bool,
) -> Result<ExitCode> {
    let option = WriterOption {
        temp_folder: tmpdir.into(),
        compress_type: match compress {
            CompressArg::None => CompressType::None,
            CompressArg::Snappy => CompressType::Snappy,
            CompressArg::Dfa => CompressType::Dfa,
        },
        build_type: if set { BuildType::Set } else { BuildType::Map },
        with_checksum,
        load_factor: load_factor.unwrap_or(0.0),
    };

    let started = Instant::now();
    let mut writer = create_writer(option, output)?;

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {prefix:<10} {pos} entries {msg}")
            .expect("static template"),
    );
    progress.set_prefix("Ingesting");

    let mut keys = Vec::new();
    for line in BufReader::new(File::open(input)?).lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        if set {
            writer.put(line.as_bytes())?;
            if fulltest {
                keys.push(line);
            }
        } else {
            let Some((key, value)) = line.split_once('\t') else {
                tracing::warn!(line = %line, "skipping line without a tab separator");
                continue;
            };
            writer.put_value(key.as_bytes(), value.as_bytes())?;
            if fulltest {
                keys.push(key.to_string());
            }
        }
        progress.inc(1);
    }

    progress.set_prefix("Closing");
    writer.close()?;
    progress.finish_with_message(format!("done in {:.2?}", started.elapsed()));

    if fulltest {
        let reader = open_reader(ReaderOption::default(), output)?;
        for key in &keys {
            if !reader.exist(key.as_bytes()) {
                return Err(Error::IntegrityError(format!(
                    "full test failed: key {key:?} missing from artifact"
                )));
            }
        }
        println!("full test passed: {} keys verified", keys.len());
    }
    Ok(ExitCode::SUCCESS)
}

fn run_inspect(file: &str) -> Result<ExitCode> {
    let info = inspect(file)?;

    println!("variant:         {}", info.variant);
    println!("created at:      {} µs since epoch", info.created_at_micros);
    println!("build type:      {:?}", info.build_type);
    println!("compress type:   {:?}", info.compress_type);
    println!("checksum:        {}", if info.with_checksum { "yes" } else { "no" });
    if let Some(num_keys) = info.num_keys {
        println!("keys:            {num_keys}");
    }
    if let Some(load_factor) = info.load_factor {
        println!("load factor:     {load_factor}");
    }
    println!("key lengths:     {}", info.num_key_lengths);
    println!("max key length:  {}", info.max_key_length);
    println!("file size:       {} bytes", info.file_len);
    println!();
    println!("{:<14} {:>12} {:>12} {:>12}", "section", "start", "end", "bytes");
    for (name, start, end) in &info.sections {
        println!("{name:<14} {start:>12} {end:>12} {:>12}", end - start);
    }
    Ok(ExitCode::SUCCESS)
}

fn run_exist(file: &str, key: &str) -> Result<ExitCode> {
    let reader = open_reader(ReaderOption::default(), file)?;
    if reader.exist(key.as_bytes()) {
        println!("found");
        Ok(ExitCode::SUCCESS)
    } else {
        eprintln!("not found");
        Ok(ExitCode::FAILURE)
    }
}

fn run_get(file: &str, key: &str) -> Result<ExitCode> {
    let reader = open_reader(ReaderOption::default(), file)?;
    match reader.get_string(key.as_bytes())? {
        Some(value) => {
            println!("{value}");
            Ok(ExitCode::SUCCESS)
        }
        None => {
            eprintln!("not found");
            Ok(ExitCode::FAILURE)
        }
    }
}

fn run_prefix(file: &str, prefix: &str, limit: usize) -> Result<ExitCode> {
    let reader = open_reader(ReaderOption::default(), file)?;
    let matches = reader.prefix_get(prefix.as_bytes(), limit)?;
    for (key, value) in &matches {
        if value.is_empty() {
            println!("{}", String::from_utf8_lossy(key));
        } else {
            println!(
                "{}\t{}",
                String::from_utf8_lossy(key),
                String::from_utf8_lossy(value)
            );
        }
    }
    eprintln!("{} match(es)", matches.len());
    Ok(ExitCode::SUCCESS)
}
