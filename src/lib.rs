//! Build-once, read-many static key-value store.
//!
//! A writer ingests a stream of keys (optionally with values) and emits one
//! self-describing binary artifact. A reader memory-maps that artifact and
//! answers exact-match existence, exact-match retrieval, and prefix
//! enumeration without ever mutating the file.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────┐   put(k, v)   ┌──────────────────┐    close()    ┌──────────┐
//! │  caller   │──────────────▶│ TrieWriter /     │──────────────▶│ artifact │
//! └───────────┘               │ HashWriter       │               └────┬─────┘
//!                             │ (per-length temp │                    │ mmap
//!                             │  value spools)   │               ┌────▼─────┐
//!                             └──────────────────┘               │ Trie /   │
//!                                                                │ Hash     │
//!                  exist / get / prefix_get ◀────────────────────│ Reader   │
//!                                                                └──────────┘
//! ```
//!
//! Two index variants share the value layout:
//!
//! - **Trie** (`SCDBV2.`): keys live in a succinct trie; a PForDelta vector
//!   maps each trie id to its value offset (or, in Dfa mode, to an id in a
//!   second trie holding the deduplicated values). Supports prefix queries.
//! - **Hash** (`SCDBV1.`): keys live in per-key-length open-addressed tables
//!   probed linearly. Point queries only.
//!
//! Both variants bucket keys by byte length: each observed length gets its
//! own index block and, in map mode, its own value segment of
//! `varint(len) ‖ bytes` frames with adjacent duplicates coalesced.
//!
//! # Usage
//!
//! ```no_run
//! use scdb::{create_writer, open_reader, ReaderOption, WriterOption};
//!
//! let mut writer = create_writer(WriterOption::default(), "words.scdb")?;
//! writer.put_value(b"apple", b"red")?;
//! writer.put_value(b"banana", b"yellow")?;
//! writer.close()?;
//!
//! let reader = open_reader(ReaderOption::default(), "words.scdb")?;
//! assert!(reader.exist(b"apple"));
//! assert_eq!(reader.get_string(b"banana")?.as_deref(), Some("yellow"));
//! # Ok::<(), scdb::Error>(())
//! ```

pub mod bits;
pub mod checksum;
pub mod error;
pub mod pfor;
pub mod reader;
pub mod source;
pub mod trie;
pub mod varint;
pub mod writer;

pub use error::{Error, Result};
pub use pfor::PForDelta;
pub use reader::{inspect, open_reader, ArtifactInfo, HashReader, Reader, ReaderOption, TrieReader};
pub use source::{ByteSource, Section};
pub use writer::{
    create_writer, BuildType, CompressType, HashWriter, TrieWriter, Writer, WriterOption,
};
