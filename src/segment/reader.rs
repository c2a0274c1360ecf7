// Segment decoding.

use std::io::{ErrorKind, Read};

use super::writer::{D5, FILE_IS_CLASS, U5};
use super::{
    FileRecord, SEGMENT_MAGIC, SEGMENT_MAJOR, SEGMENT_MINOR, Segment, SegmentOptions, class_bands,
};
use crate::bytecode::{BytecodeBands, UnknownOpcodePolicy};
use crate::codec::band::BYTES;
use crate::codec::{BandReader, UNSIGNED5};
use crate::error::{PackError, Result};

/// Reads segments written by [`super::SegmentWriter`] until the input ends.
pub struct SegmentReader<R> {
    input: R,
    policy: UnknownOpcodePolicy,
    segments: u64,
}

impl<R: Read> SegmentReader<R> {
    pub fn new(input: R, policy: UnknownOpcodePolicy) -> Self {
        Self {
            input,
            policy,
            segments: 0,
        }
    }

    pub fn into_inner(self) -> R {
        self.input
    }

    /// The next segment, or `None` at a clean end of input.
    pub fn next_segment(&mut self) -> Result<Option<Segment>> {
        let mut magic = [0u8; 4];
        if !self.read_magic(&mut magic)? {
            return Ok(None);
        }
        if magic != SEGMENT_MAGIC {
            return Err(PackError::malformed(format!("bad segment magic {magic:02X?}")));
        }
        let major = self.u5()?;
        let minor = self.u5()?;
        if (major, minor) != (SEGMENT_MAJOR, SEGMENT_MINOR) {
            return Err(PackError::Unsupported(format!("segment version {major}.{minor}")));
        }
        let bits = self.u5()?;
        let options = SegmentOptions::from_bits(bits)
            .ok_or_else(|| PackError::malformed(format!("unknown segment options {bits:#x}")))?;
        let latest = if options.contains(SegmentOptions::MODTIME_LATEST) {
            let hi = self.u5()?;
            let lo = self.u5()?;
            Some((i64::from(hi as i32) << 32) | i64::from(lo))
        } else {
            None
        };
        let string_count = self.u5()? as usize;
        let class_count = self.u5()? as usize;
        let file_count = self.u5()? as usize;
        let header_size = self.u5()? as usize;
        let mut headers = Vec::new();
        (&mut self.input)
            .take(header_size as u64)
            .read_to_end(&mut headers)?;
        if headers.len() != header_size {
            return Err(PackError::malformed("segment ends inside its band headers"));
        }

        let policy = self.policy;
        let mut r = BandReader::new(&mut self.input, &headers);

        let lengths = r.decode_ints("string_length", U5, string_count)?;
        let lengths = lengths
            .into_iter()
            .map(|n| {
                usize::try_from(n)
                    .map_err(|_| PackError::mismatch("string_length", format!("negative length {n}")))
            })
            .collect::<Result<Vec<_>>>()?;
        let strings = r
            .decode_ints_2d("string_bytes", BYTES, &lengths)?
            .into_iter()
            .map(|row| {
                String::from_utf8(row.into_iter().map(|b| b as u8).collect())
                    .map_err(|_| PackError::malformed("entry name is not UTF-8"))
            })
            .collect::<Result<Vec<_>>>()?;

        let (mut classes, code_headers) = class_bands::read(&mut r, class_count)?;
        let bytecode = BytecodeBands::read(&mut r, &classes, policy)?;
        bytecode.assemble(&mut classes, &code_headers)?;

        let names = r.parse_references("file_name", file_count, U5, &strings)?;
        let has_hi = options.contains(SegmentOptions::FILE_SIZE_HI);
        let sizes = r.parse_flags("file_size", file_count, U5, has_hi)?;
        let modtimes = match latest {
            Some(t) => vec![t; file_count],
            None => {
                let hi = options.contains(SegmentOptions::FILE_MODTIME_HI);
                r.parse_flags("file_modtime", file_count, D5, hi)?
            }
        };
        let file_options = r.decode_ints("file_options", U5, file_count)?;
        let sizes = sizes
            .into_iter()
            .map(|s| {
                usize::try_from(s)
                    .map_err(|_| PackError::mismatch("file_size", format!("size {s} out of range")))
            })
            .collect::<Result<Vec<_>>>()?;
        let bits = r.decode_ints_2d("file_bits", BYTES, &sizes)?;

        let files: Vec<FileRecord> = names
            .into_iter()
            .zip(bits)
            .zip(modtimes)
            .zip(file_options)
            .map(|(((name, bits), modtime), opts)| FileRecord {
                name,
                bytes: bits.into_iter().map(|b| b as u8).collect(),
                modtime,
                is_class: opts & FILE_IS_CLASS != 0,
            })
            .collect();

        if r.headers_remaining() != 0 {
            return Err(PackError::mismatch(
                "band_headers",
                format!("{} unused header bytes", r.headers_remaining()),
            ));
        }
        let class_files = files.iter().filter(|f| f.is_class).count();
        if class_files != classes.len() {
            return Err(PackError::mismatch(
                "file_options",
                format!("{class_files} class entries for {} classes", classes.len()),
            ));
        }

        log::debug!(
            "read segment {}: {} classes, {} files",
            self.segments,
            classes.len(),
            files.len()
        );
        self.segments += 1;
        Ok(Some(Segment { classes, files }))
    }

    /// Fill `magic`; `false` if the input ended before its first byte.
    fn read_magic(&mut self, magic: &mut [u8; 4]) -> Result<bool> {
        let mut filled = 0;
        while filled < magic.len() {
            match self.input.read(&mut magic[filled..]) {
                Ok(0) if filled == 0 => return Ok(false),
                Ok(0) => return Err(PackError::malformed("segment ends inside its magic")),
                Ok(n) => filled += n,
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(true)
    }

    fn u5(&mut self) -> Result<u32> {
        Ok(UNSIGNED5.decode_value(&mut self.input, 0)? as u32)
    }
}

impl<R: Read> Iterator for SegmentReader<R> {
    type Item = Result<Segment>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_segment().transpose()
    }
}
