// Segments: the unit of packing.
//
// A segment holds parsed classes and file records. The batcher groups
// archive entries into segments under a size budget and hands each one to a
// `SegmentEncoder`; the reference encoder (`writer`) lays a segment out as
// band headers plus bands, and `reader` turns that layout back into
// segments.
//
// # Modules
//
// - `batcher`     - Entry costing, segment flushing, pack statistics
// - `class_bands` - Class metadata and code header bands
// - `writer`      - Reference `SegmentEncoder` (`SegmentWriter`)
// - `reader`      - Segment decoding (`SegmentReader`)

pub mod batcher;
pub mod class_bands;
pub mod reader;
pub mod writer;

use std::io::{self, Read, Write};

use bitflags::bitflags;

use crate::bytecode::UnknownOpcodePolicy;
use crate::classfile::{ClassReader, ClassStructure};
use crate::error::{PackError, Result};

pub use batcher::{Batcher, BatchState, MAX_ENTRY_SIZE, PackStats, SourceEntry, estimate_size};
pub use reader::SegmentReader;
pub use writer::SegmentWriter;

/// Segment magic number.
pub const SEGMENT_MAGIC: [u8; 4] = [0xCA, 0xFE, 0xD0, 0x0D];
pub const SEGMENT_MAJOR: u32 = 1;
pub const SEGMENT_MINOR: u32 = 0;

/// Name of the synthesized manifest entry.
pub const MANIFEST_NAME: &str = "META-INF/MANIFEST.MF";

bitflags! {
    /// Segment header option bits.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct SegmentOptions: u32 {
        /// `file_size` is split into hi and lo bands.
        const FILE_SIZE_HI = 1 << 0;
        /// `file_modtime` is split into hi and lo bands.
        const FILE_MODTIME_HI = 1 << 1;
        /// One archive modtime in the header replaces `file_modtime`.
        const MODTIME_LATEST = 1 << 2;
    }
}

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// How file modification times are carried.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ModTime {
    /// Every file keeps its own modtime.
    #[default]
    Keep,
    /// Every file gets the latest modtime in its segment.
    Latest,
}

/// Configuration for packing.
#[derive(Debug, Clone)]
pub struct PackOptions {
    /// Segment size budget: `-1` unlimited, `0` one segment per costed entry.
    pub segment_limit: i64,
    /// Effort (0-9). Above 1 every band is tried against the canonical
    /// codings and the smallest encoding wins.
    pub effort: u32,
    pub modification_time: ModTime,
    /// Name prefixes stored as raw files even when they end in `.class`.
    pub pass_files: Vec<String>,
}

impl Default for PackOptions {
    fn default() -> Self {
        Self {
            segment_limit: 1_000_000,
            effort: 5,
            modification_time: ModTime::Keep,
            pass_files: Vec::new(),
        }
    }
}

impl PackOptions {
    /// True if `name` must be stored raw.
    pub fn is_pass_file(&self, name: &str) -> bool {
        self.pass_files.iter().any(|p| name.starts_with(p.as_str()))
    }
}

// ---------------------------------------------------------------------------
// Segment contents
// ---------------------------------------------------------------------------

/// One archive entry as carried in a segment. Class entries keep an empty
/// payload; their bytes come from the matching `ClassStructure`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileRecord {
    pub name: String,
    pub bytes: Vec<u8>,
    /// Seconds since the epoch.
    pub modtime: i64,
    pub is_class: bool,
}

/// A reconstructed archive entry.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnpackedEntry {
    pub name: String,
    pub bytes: Vec<u8>,
    pub modtime: i64,
}

/// Classes and files packed together. Class file records appear in the
/// same order as `classes`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Segment {
    pub classes: Vec<ClassStructure>,
    pub files: Vec<FileRecord>,
}

impl Segment {
    pub fn is_empty(&self) -> bool {
        self.classes.is_empty() && self.files.is_empty()
    }

    /// Entries in file order, class files serialized from their structures.
    pub fn entries(&self) -> Result<Vec<UnpackedEntry>> {
        let mut classes = self.classes.iter();
        self.files
            .iter()
            .map(|f| {
                let bytes = if f.is_class {
                    classes
                        .next()
                        .ok_or_else(|| {
                            PackError::malformed(format!("class entry {} has no class", f.name))
                        })?
                        .to_bytes()?
                } else {
                    f.bytes.clone()
                };
                Ok(UnpackedEntry {
                    name: f.name.clone(),
                    bytes,
                    modtime: f.modtime,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Encoding seam
// ---------------------------------------------------------------------------

/// Receives each segment as the batcher flushes it.
pub trait SegmentEncoder {
    fn encode_segment(&mut self, segment: &Segment) -> Result<()>;
}

/// Collects segments in memory.
impl SegmentEncoder for Vec<Segment> {
    fn encode_segment(&mut self, segment: &Segment) -> Result<()> {
        self.push(segment.clone());
        Ok(())
    }
}

impl<E: SegmentEncoder + ?Sized> SegmentEncoder for &mut E {
    fn encode_segment(&mut self, segment: &Segment) -> Result<()> {
        (**self).encode_segment(segment)
    }
}

// ---------------------------------------------------------------------------
// One-shot helpers
// ---------------------------------------------------------------------------

/// Pack every entry into `out` with the reference segment writer.
pub fn pack_all<W, I>(
    out: W,
    entries: I,
    manifest: Option<Vec<u8>>,
    opts: PackOptions,
) -> Result<PackStats>
where
    W: Write,
    I: IntoIterator<Item = io::Result<SourceEntry>>,
{
    let writer = SegmentWriter::new(out, opts.effort, opts.modification_time);
    let mut batcher = Batcher::new(writer, ClassReader::new(), opts);
    if let Some(manifest) = manifest {
        batcher.set_manifest(manifest);
    }
    let stats = batcher.pack(entries)?;
    batcher.into_encoder().finish()?;
    Ok(stats)
}

/// Read segments until the input is exhausted.
pub fn unpack_all<R: Read>(input: R, policy: UnknownOpcodePolicy) -> Result<Vec<Segment>> {
    SegmentReader::new(input, policy).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pass_file_prefixes() {
        let opts = PackOptions {
            pass_files: vec!["lib/raw/".to_string()],
            ..PackOptions::default()
        };
        assert!(opts.is_pass_file("lib/raw/A.class"));
        assert!(!opts.is_pass_file("lib/A.class"));
    }

    #[test]
    fn entries_require_a_class_per_class_record() {
        let segment = Segment {
            classes: Vec::new(),
            files: vec![FileRecord {
                name: "A.class".to_string(),
                bytes: Vec::new(),
                modtime: 0,
                is_class: true,
            }],
        };
        assert!(segment.entries().is_err());
    }

    #[test]
    fn vec_collects_segments() {
        let mut sink: Vec<Segment> = Vec::new();
        let segment = Segment {
            classes: Vec::new(),
            files: vec![FileRecord {
                name: "a.txt".to_string(),
                bytes: b"hi".to_vec(),
                modtime: 7,
                is_class: false,
            }],
        };
        sink.encode_segment(&segment).unwrap();
        assert_eq!(sink, vec![segment.clone()]);
        assert_eq!(
            segment.entries().unwrap(),
            vec![UnpackedEntry {
                name: "a.txt".to_string(),
                bytes: b"hi".to_vec(),
                modtime: 7
            }]
        );
    }
}
