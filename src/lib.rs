//! Oxipack: a banded, segment-oriented transfer codec for class-file archives.
//!
//! The crate provides:
//! - A BHSD integer band codec with escape codings (`codec`)
//! - The bytecode band splitter and reassembler (`bytecode`)
//! - A minimal class-file model and reader (`classfile`)
//! - Segment batching and a reference segment writer/reader (`segment`)
//! - File-oriented helpers (`io`)
//!
//! # Quick Start
//!
//! ```no_run
//! use oxipack::bytecode::UnknownOpcodePolicy;
//! use oxipack::segment::{self, PackOptions, SourceEntry};
//!
//! let entries = vec![Ok(SourceEntry::from_bytes("hello.txt", b"hello".to_vec(), 0))];
//! let mut packed = Vec::new();
//! segment::pack_all(&mut packed, entries, None, PackOptions::default()).unwrap();
//!
//! let segments = segment::unpack_all(&packed[..], UnknownOpcodePolicy::Warn).unwrap();
//! assert_eq!(segments[0].entries().unwrap()[0].bytes, b"hello");
//! ```

pub mod bytecode;
pub mod classfile;
pub mod codec;
pub mod error;
pub mod io;
pub mod segment;

pub use error::{PackError, Result};
