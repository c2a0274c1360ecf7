// Segment batching.
//
// Entries are costed as they arrive and grouped into segments under
// `segment_limit`. A flush hands the pending segment to the encoder and
// starts an empty one; the entry that triggered the flush goes into the new
// segment without being charged. A class is parsed whole into one segment,
// so its methods never straddle a segment boundary.

use std::fmt;
use std::io::{self, Read};

use super::{FileRecord, MANIFEST_NAME, PackOptions, Segment, SegmentEncoder};
use crate::classfile::ClassDecoder;
use crate::error::{PackError, Result};

/// Largest entry a segment can carry.
pub const MAX_ENTRY_SIZE: u64 = i32::MAX as u64;

/// Fixed per-entry overhead in the size estimate.
const ENTRY_OVERHEAD: u64 = 5;

/// Estimated encoded cost of an entry. Anything under `META-INF` is free.
///
/// The name is counted in UTF-16 code units, not UTF-8 bytes.
pub fn estimate_size(name: &str, content_len: u64) -> u64 {
    if name.starts_with("META-INF") || name.starts_with("/META-INF") {
        0
    } else {
        name.encode_utf16().count() as u64 + content_len + ENTRY_OVERHEAD
    }
}

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// An archive entry waiting to be read.
pub struct SourceEntry {
    pub name: String,
    pub declared_size: u64,
    /// Seconds since the epoch.
    pub modtime: i64,
    pub reader: Box<dyn Read>,
}

impl SourceEntry {
    pub fn new(
        name: impl Into<String>,
        declared_size: u64,
        modtime: i64,
        reader: impl Read + 'static,
    ) -> Self {
        Self {
            name: name.into(),
            declared_size,
            modtime,
            reader: Box::new(reader),
        }
    }

    /// An in-memory entry whose declared size matches its contents.
    pub fn from_bytes(name: impl Into<String>, bytes: Vec<u8>, modtime: i64) -> Self {
        let declared_size = bytes.len() as u64;
        Self::new(name, declared_size, modtime, io::Cursor::new(bytes))
    }

    /// Read the whole payload, checking it against the declared size.
    pub fn read_all(self) -> Result<Vec<u8>> {
        if self.declared_size > MAX_ENTRY_SIZE {
            return Err(PackError::EntryTooLarge {
                name: self.name,
                size: self.declared_size,
                max: MAX_ENTRY_SIZE,
            });
        }
        let mut bytes = Vec::with_capacity(self.declared_size as usize);
        self.reader
            .take(self.declared_size + 1)
            .read_to_end(&mut bytes)?;
        if bytes.len() as u64 != self.declared_size {
            return Err(PackError::SizeMismatch {
                name: self.name,
                declared: self.declared_size,
                actual: bytes.len() as u64,
            });
        }
        Ok(bytes)
    }
}

impl fmt::Debug for SourceEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SourceEntry")
            .field("name", &self.name)
            .field("declared_size", &self.declared_size)
            .field("modtime", &self.modtime)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// State
// ---------------------------------------------------------------------------

/// Statistics returned by [`Batcher::pack`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PackStats {
    /// Segments handed to the encoder.
    pub segments: u64,
    /// Class entries parsed.
    pub classes: u64,
    /// Non-class file entries, manifest included.
    pub files: u64,
    /// Entry payload bytes read.
    pub bytes_in: u64,
}

/// The segment being filled and its running size estimate.
#[derive(Debug, Default)]
pub struct BatchState {
    pub current_size: u64,
    pub segment: Segment,
}

impl BatchState {
    fn take(&mut self) -> Segment {
        self.current_size = 0;
        std::mem::take(&mut self.segment)
    }
}

// ---------------------------------------------------------------------------
// Batcher
// ---------------------------------------------------------------------------

/// Groups entries into segments and passes each segment to `E`.
pub struct Batcher<E, D> {
    encoder: E,
    decoder: D,
    opts: PackOptions,
    state: BatchState,
    stats: PackStats,
    manifest: Option<Vec<u8>>,
}

impl<E: SegmentEncoder, D: ClassDecoder> Batcher<E, D> {
    pub fn new(encoder: E, decoder: D, opts: PackOptions) -> Self {
        Self {
            encoder,
            decoder,
            opts,
            state: BatchState::default(),
            stats: PackStats::default(),
            manifest: None,
        }
    }

    /// Manifest bytes to prepend to the first segment as
    /// `META-INF/MANIFEST.MF`.
    pub fn set_manifest(&mut self, manifest: Vec<u8>) {
        self.manifest = Some(manifest);
    }

    pub fn state(&self) -> &BatchState {
        &self.state
    }

    pub fn into_encoder(self) -> E {
        self.encoder
    }

    /// Pack every entry, flushing segments as the size budget requires, and
    /// flush the final non-empty segment.
    pub fn pack<I>(&mut self, entries: I) -> Result<PackStats>
    where
        I: IntoIterator<Item = io::Result<SourceEntry>>,
    {
        if let Some(manifest) = self.manifest.take() {
            self.stats.files += 1;
            self.stats.bytes_in += manifest.len() as u64;
            self.state.segment.files.insert(
                0,
                FileRecord {
                    name: MANIFEST_NAME.to_string(),
                    bytes: manifest,
                    modtime: 0,
                    is_class: false,
                },
            );
        }

        let limit = self.opts.segment_limit;
        for entry in entries {
            let entry = entry?;
            let name = entry.name.clone();
            let modtime = entry.modtime;
            let bytes = entry.read_all()?;
            let estimate = estimate_size(&name, bytes.len() as u64);

            let current = self.state.current_size;
            if limit > 0 && estimate + current > limit as u64 && current > 0 {
                self.flush()?;
                self.add_entry(name, bytes, modtime)?;
            } else {
                self.add_entry(name, bytes, modtime)?;
                self.state.current_size += estimate;
                if limit == 0 && estimate > 0 {
                    self.flush()?;
                }
            }
        }
        if !self.state.segment.is_empty() {
            self.flush()?;
        }

        log::info!(
            "packed {} classes and {} files ({} bytes) into {} segments",
            self.stats.classes,
            self.stats.files,
            self.stats.bytes_in,
            self.stats.segments
        );
        Ok(self.stats.clone())
    }

    /// Add one entry to the pending segment. Class files are parsed unless
    /// their name matches a pass-through prefix.
    pub fn add_entry(&mut self, name: String, bytes: Vec<u8>, modtime: i64) -> Result<()> {
        self.stats.bytes_in += bytes.len() as u64;
        let segment = &mut self.state.segment;
        if name.ends_with(".class") && !self.opts.is_pass_file(&name) {
            segment.classes.push(self.decoder.decode(&name, &bytes)?);
            segment.files.push(FileRecord {
                name,
                bytes: Vec::new(),
                modtime,
                is_class: true,
            });
            self.stats.classes += 1;
        } else {
            segment.files.push(FileRecord {
                name,
                bytes,
                modtime,
                is_class: false,
            });
            self.stats.files += 1;
        }
        Ok(())
    }

    /// Hand the pending segment to the encoder and start a new one.
    pub fn flush(&mut self) -> Result<()> {
        let estimate = self.state.current_size;
        let segment = self.state.take();
        log::debug!(
            "flushing segment {}: {} classes, {} files, estimate {estimate}",
            self.stats.segments,
            segment.classes.len(),
            segment.files.len()
        );
        self.encoder.encode_segment(&segment)?;
        self.stats.segments += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::ClassStructure;

    /// Refuses every class.
    struct NoClasses;

    impl ClassDecoder for NoClasses {
        fn decode(&self, name: &str, _bytes: &[u8]) -> Result<ClassStructure> {
            Err(PackError::malformed(format!("{name}: not expected")))
        }
    }

    fn file(name: &str, len: usize) -> io::Result<SourceEntry> {
        Ok(SourceEntry::from_bytes(name, vec![b'x'; len], 0))
    }

    fn pack(limit: i64, entries: Vec<io::Result<SourceEntry>>) -> Vec<Segment> {
        let opts = PackOptions {
            segment_limit: limit,
            ..PackOptions::default()
        };
        let mut batcher = Batcher::new(Vec::new(), NoClasses, opts);
        batcher.pack(entries).unwrap();
        batcher.into_encoder()
    }

    fn names(segment: &Segment) -> Vec<&str> {
        segment.files.iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn estimates() {
        assert_eq!(estimate_size("a.txt", 10), 20);
        assert_eq!(estimate_size("META-INF/x", 1000), 0);
        assert_eq!(estimate_size("/META-INF/x", 1000), 0);
        assert_eq!(estimate_size("meta-inf/x", 0), 15);
    }

    #[test]
    fn estimates_count_utf16_units() {
        // Two bytes, one unit.
        assert_eq!(estimate_size("é.txt", 0), 10);
        // Four bytes, a surrogate pair.
        assert_eq!(estimate_size("\u{1F600}", 0), 7);
        assert_eq!(estimate_size("日本.bin", 1), 12);
    }

    #[test]
    fn unlimited_is_one_segment() {
        let segments = pack(-1, vec![file("a", 100), file("b", 100), file("c", 100)]);
        assert_eq!(segments.len(), 1);
        assert_eq!(names(&segments[0]), vec!["a", "b", "c"]);
    }

    #[test]
    fn zero_limit_flushes_every_costed_entry() {
        let segments = pack(
            0,
            vec![
                file("META-INF/a", 3),
                file("META-INF/b", 3),
                file("c", 1),
                file("d", 1),
            ],
        );
        assert_eq!(segments.len(), 2);
        assert_eq!(names(&segments[0]), vec!["META-INF/a", "META-INF/b", "c"]);
        assert_eq!(names(&segments[1]), vec!["d"]);
    }

    #[test]
    fn flush_trigger_is_free_in_new_segment() {
        // Each entry costs 1 + 10 + 5 = 16.
        let segments = pack(
            40,
            vec![file("a", 10), file("b", 10), file("c", 10), file("d", 10), file("e", 10)],
        );
        // a+b = 32; c triggers a flush and is free; d = 16; e = 32.
        assert_eq!(segments.len(), 2);
        assert_eq!(names(&segments[0]), vec!["a", "b"]);
        assert_eq!(names(&segments[1]), vec!["c", "d", "e"]);
    }

    #[test]
    fn oversized_first_entry_does_not_flush_empty_segment() {
        let segments = pack(10, vec![file("big", 100), file("small", 0)]);
        assert_eq!(segments.len(), 2);
        assert_eq!(names(&segments[0]), vec!["big"]);
    }

    #[test]
    fn manifest_leads_first_segment() {
        let mut batcher = Batcher::new(Vec::new(), NoClasses, PackOptions::default());
        batcher.set_manifest(b"Manifest-Version: 1.0\r\n".to_vec());
        let stats = batcher.pack(vec![file("a", 1)]).unwrap();
        let segments = batcher.into_encoder();
        assert_eq!(names(&segments[0]), vec![MANIFEST_NAME, "a"]);
        assert_eq!(stats.files, 2);
        assert_eq!(stats.segments, 1);
    }

    #[test]
    fn pass_files_skip_class_parsing() {
        let opts = PackOptions {
            pass_files: vec!["raw/".to_string()],
            ..PackOptions::default()
        };
        let mut batcher = Batcher::new(Vec::new(), NoClasses, opts);
        let stats = batcher.pack(vec![file("raw/A.class", 4)]).unwrap();
        assert_eq!(stats.classes, 0);
        assert!(!batcher.into_encoder()[0].files[0].is_class);

        let mut batcher = Batcher::new(Vec::new(), NoClasses, PackOptions::default());
        assert!(batcher.pack(vec![file("A.class", 4)]).is_err());
    }

    #[test]
    fn size_checks() {
        let short = SourceEntry::new("a", 10, 0, io::Cursor::new(vec![0u8; 4]));
        assert!(matches!(
            short.read_all(),
            Err(PackError::SizeMismatch {
                declared: 10,
                actual: 4,
                ..
            })
        ));
        let long = SourceEntry::new("a", 2, 0, io::Cursor::new(vec![0u8; 4]));
        assert!(matches!(long.read_all(), Err(PackError::SizeMismatch { actual: 3, .. })));
        let huge = SourceEntry::new("a", MAX_ENTRY_SIZE + 1, 0, io::empty());
        assert!(matches!(huge.read_all(), Err(PackError::EntryTooLarge { .. })));
    }

    #[test]
    fn empty_input_writes_nothing() {
        assert!(pack(100, Vec::new()).is_empty());
    }
}
