// Copyright 2025-present Harīṣh Tummalachērla
// SPDX-License-Identifier: Apache-2.0

//! Error types for store construction and queries.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// Bad magic, truncated header, varint overflow, or a codec tag mismatch.
    #[error("malformed data: {0}")]
    MalformedData(String),

    /// Trailing checksum did not match the file contents.
    #[error("integrity error: {0}")]
    IntegrityError(String),

    /// Recognized file, but an unhandled version or option combination.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// A map-only operation on a set artifact, or vice versa.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// Underlying filesystem or mapping failure.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The same key was inserted more than once during a build.
    #[error("duplicate key: {0}")]
    DuplicateKey(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::MalformedData(msg.into())
    }
}
