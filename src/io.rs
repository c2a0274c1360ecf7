// File-level helpers for packing and unpacking.
//
// `DirectorySource` turns a directory tree into archive entries;
// `pack_directory()` and `unpack_file()` wrap the segment writer and reader
// with buffered I/O. Optionally computes a streaming SHA-256 of the packed
// bytes (feature-gated behind `file-io`).

use std::fs::File;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Component, Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::bytecode::UnknownOpcodePolicy;
use crate::error::{PackError, Result};
use crate::segment::{PackOptions, PackStats, Segment, SegmentReader, SourceEntry, pack_all};

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `pack_directory()`.
#[derive(Debug, Clone)]
pub struct PackFileStats {
    pub pack: PackStats,
    /// Packed output size in bytes.
    pub packed_size: u64,
    /// SHA-256 of the packed output (if `file-io` feature is enabled).
    pub packed_sha256: Option<[u8; 32]>,
}

/// Statistics returned by `unpack_to_directory()`.
#[derive(Debug, Clone, Default)]
pub struct UnpackStats {
    pub segments: u64,
    pub entries: u64,
    /// Bytes written across all entries.
    pub bytes_out: u64,
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// DirectorySource
// ---------------------------------------------------------------------------

/// Every regular file under a root directory, in sorted path order, named
/// relative to the root with `/` separators.
#[derive(Debug)]
pub struct DirectorySource {
    root: PathBuf,
    files: std::vec::IntoIter<PathBuf>,
}

impl DirectorySource {
    pub fn new(root: &Path) -> io::Result<Self> {
        let mut files = Vec::new();
        walk(root, &mut files)?;
        files.sort();
        Ok(Self {
            root: root.to_path_buf(),
            files: files.into_iter(),
        })
    }

    fn entry(&self, path: &Path) -> io::Result<SourceEntry> {
        let name = entry_name(&self.root, path)?;
        let file = File::open(path)?;
        let meta = file.metadata()?;
        let modtime = meta
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map_or(0, |d| d.as_secs() as i64);
        Ok(SourceEntry::new(
            name,
            meta.len(),
            modtime,
            BufReader::with_capacity(BUF_SIZE, file),
        ))
    }
}

impl Iterator for DirectorySource {
    type Item = io::Result<SourceEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.files.next()?;
        Some(self.entry(&path))
    }
}

fn walk(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let kind = entry.file_type()?;
        if kind.is_dir() {
            walk(&entry.path(), out)?;
        } else if kind.is_file() {
            out.push(entry.path());
        }
    }
    Ok(())
}

fn entry_name(root: &Path, path: &Path) -> io::Result<String> {
    let relative = path
        .strip_prefix(root)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
    let parts = relative
        .components()
        .map(|c| {
            c.as_os_str().to_str().ok_or_else(|| {
                io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("non UTF-8 file name under {}", root.display()),
                )
            })
        })
        .collect::<io::Result<Vec<_>>>()?;
    Ok(parts.join("/"))
}

// ---------------------------------------------------------------------------
// pack_directory
// ---------------------------------------------------------------------------

/// Pack every file under `dir` into `packed_path`.
///
/// When the `file-io` feature is enabled, a SHA-256 checksum of the packed
/// output is computed as it is written.
pub fn pack_directory(dir: &Path, packed_path: &Path, opts: PackOptions) -> Result<PackFileStats> {
    let source = DirectorySource::new(dir)?;
    let out = BufWriter::with_capacity(BUF_SIZE, File::create(packed_path)?);

    #[cfg(feature = "file-io")]
    let (pack, packed_sha256) = {
        let mut hasher = sha2::Sha256::new();
        let writer = HashingWriter {
            inner: out,
            hasher: &mut hasher,
        };
        let stats = pack_all(writer, source, None, opts)?;
        (stats, Some(hasher.finalize().into()))
    };
    #[cfg(not(feature = "file-io"))]
    let (pack, packed_sha256) = (pack_all(out, source, None, opts)?, None);

    let packed_size = std::fs::metadata(packed_path)?.len();
    Ok(PackFileStats {
        pack,
        packed_size,
        packed_sha256,
    })
}

// ---------------------------------------------------------------------------
// unpack
// ---------------------------------------------------------------------------

/// Read every segment of a packed file.
pub fn unpack_file(packed_path: &Path, policy: UnknownOpcodePolicy) -> Result<Vec<Segment>> {
    let input = BufReader::with_capacity(BUF_SIZE, File::open(packed_path)?);
    SegmentReader::new(input, policy).collect()
}

/// Unpack a packed file into `out_dir`, restoring modification times.
pub fn unpack_to_directory(
    packed_path: &Path,
    out_dir: &Path,
    policy: UnknownOpcodePolicy,
) -> Result<UnpackStats> {
    let input = BufReader::with_capacity(BUF_SIZE, File::open(packed_path)?);
    let mut stats = UnpackStats::default();
    for segment in SegmentReader::new(input, policy) {
        stats.segments += 1;
        for entry in segment?.entries()? {
            let path = out_dir.join(safe_relative(&entry.name)?);
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = BufWriter::with_capacity(BUF_SIZE, File::create(&path)?);
            file.write_all(&entry.bytes)?;
            let file = file.into_inner().map_err(|e| e.into_error())?;
            if let Ok(secs) = u64::try_from(entry.modtime) {
                file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(secs))?;
            }
            stats.entries += 1;
            stats.bytes_out += entry.bytes.len() as u64;
        }
    }
    Ok(stats)
}

/// Entry name as a path that stays inside the output directory.
fn safe_relative(name: &str) -> Result<PathBuf> {
    let path = Path::new(name.trim_start_matches('/'));
    if path
        .components()
        .all(|c| matches!(c, Component::Normal(_) | Component::CurDir))
    {
        Ok(path.to_path_buf())
    } else {
        Err(PackError::malformed(format!("entry name {name} escapes the output directory")))
    }
}

// ---------------------------------------------------------------------------
// Hashing writer (used with file-io feature)
// ---------------------------------------------------------------------------

#[cfg(feature = "file-io")]
struct HashingWriter<'a, W: Write> {
    inner: W,
    hasher: &'a mut sha2::Sha256,
}

#[cfg(feature = "file-io")]
impl<W: Write> Write for HashingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
