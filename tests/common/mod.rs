//! Shared test utilities and fixtures.

#![allow(dead_code)]

use std::path::{Path, PathBuf};

use scdb::{create_writer, BuildType, CompressType, WriterOption};
use tempfile::TempDir;

/// A scratch workspace: artifact path plus an isolated temp-spool folder.
pub struct Workspace {
    pub dir: TempDir,
    pub artifact: PathBuf,
}

impl Workspace {
    pub fn new() -> Workspace {
        let dir = tempfile::tempdir().expect("create temp dir");
        let artifact = dir.path().join("store.scdb");
        Workspace { dir, artifact }
    }

    pub fn option(&self) -> WriterOption {
        WriterOption {
            temp_folder: self.dir.path().join("spool"),
            ..WriterOption::default()
        }
    }

    pub fn artifact(&self) -> &Path {
        &self.artifact
    }
}

/// Build a map artifact from `pairs` with the given options.
pub fn build_map(ws: &Workspace, mut option: WriterOption, pairs: &[(&[u8], &[u8])]) {
    option.build_type = BuildType::Map;
    let mut writer = create_writer(option, ws.artifact()).expect("create writer");
    for (key, value) in pairs {
        writer.put_value(key, value).expect("put");
    }
    writer.close().expect("close");
}

/// Build a set artifact from `keys` with the given options.
pub fn build_set(ws: &Workspace, mut option: WriterOption, keys: &[&[u8]]) {
    option.build_type = BuildType::Set;
    option.compress_type = CompressType::None;
    let mut writer = create_writer(option, ws.artifact()).expect("create writer");
    for key in keys {
        writer.put(key).expect("put");
    }
    writer.close().expect("close");
}
