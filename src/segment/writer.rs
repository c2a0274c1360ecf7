// Reference segment encoder.
//
// Layout of one segment:
//
//   magic            CA FE D0 0D
//   major, minor     UNSIGNED5
//   options          UNSIGNED5 (SegmentOptions)
//   archive modtime  UNSIGNED5 hi, lo (MODTIME_LATEST only)
//   counts           UNSIGNED5 strings, classes, files
//   header_size      UNSIGNED5
//   band headers     header_size bytes
//   bands            strings, class bands, bytecode bands, file bands

use std::collections::HashMap;
use std::io::Write;

use super::{
    ModTime, SEGMENT_MAGIC, SEGMENT_MAJOR, SEGMENT_MINOR, Segment, SegmentEncoder, SegmentOptions,
    class_bands,
};
use crate::bytecode::BytecodeSplitter;
use crate::codec::band::BYTES;
use crate::codec::{BandCodec, BandWriter, DELTA5, UNSIGNED5, needs_hi};
use crate::error::{PackError, Result};

pub(crate) const U5: BandCodec = BandCodec::of(UNSIGNED5);
pub(crate) const D5: BandCodec = BandCodec::of(DELTA5);

/// `file_options` bit marking a class entry.
pub(crate) const FILE_IS_CLASS: i32 = 1;

/// Writes segments to `W` in the reference layout.
pub struct SegmentWriter<W: Write> {
    out: W,
    effort: u32,
    modtime: ModTime,
    segments: u64,
    bytes_out: u64,
}

impl<W: Write> SegmentWriter<W> {
    pub fn new(out: W, effort: u32, modtime: ModTime) -> Self {
        Self {
            out,
            effort,
            modtime,
            segments: 0,
            bytes_out: 0,
        }
    }

    pub fn segments_written(&self) -> u64 {
        self.segments
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_out
    }

    /// Flush and return the sink.
    pub fn finish(mut self) -> Result<W> {
        self.out.flush()?;
        Ok(self.out)
    }

    fn encode(&mut self, segment: &Segment) -> Result<()> {
        let class_files = segment.files.iter().filter(|f| f.is_class).count();
        if class_files != segment.classes.len() {
            return Err(PackError::malformed(format!(
                "{class_files} class entries for {} classes",
                segment.classes.len()
            )));
        }

        let mut w = BandWriter::new(self.effort);
        let mut options = SegmentOptions::empty();

        // String table: file names, first occurrence order.
        let mut strings: Vec<&str> = Vec::new();
        let mut index: HashMap<&str, usize> = HashMap::new();
        let names: Vec<usize> = segment
            .files
            .iter()
            .map(|f| {
                *index.entry(f.name.as_str()).or_insert_with(|| {
                    strings.push(f.name.as_str());
                    strings.len() - 1
                })
            })
            .collect();
        let lengths = strings
            .iter()
            .map(|s| len_value("string_length", s.len()))
            .collect::<Result<Vec<_>>>()?;
        let string_bytes: Vec<Vec<i32>> = strings
            .iter()
            .map(|s| s.bytes().map(i32::from).collect())
            .collect();
        w.encode_ints("string_length", U5, &lengths)?;
        w.encode_ints_2d("string_bytes", BYTES, &string_bytes)?;

        let mut splitter = BytecodeSplitter::new();
        let headers = segment
            .classes
            .iter()
            .map(|c| splitter.split_class(c))
            .collect::<Result<Vec<_>>>()?;
        class_bands::write(&mut w, &segment.classes, &headers)?;
        splitter.write(&mut w)?;

        w.encode_references("file_name", U5, &names, strings.len())?;
        let sizes: Vec<i64> = segment.files.iter().map(|f| f.bytes.len() as i64).collect();
        let size_hi = needs_hi(&sizes);
        options.set(SegmentOptions::FILE_SIZE_HI, size_hi);
        w.encode_flags("file_size", U5, &sizes, size_hi)?;

        let modtimes: Vec<i64> = segment.files.iter().map(|f| f.modtime).collect();
        let latest = modtimes.iter().copied().max().unwrap_or(0);
        match self.modtime {
            ModTime::Latest => options.insert(SegmentOptions::MODTIME_LATEST),
            ModTime::Keep => {
                let hi = needs_hi(&modtimes);
                options.set(SegmentOptions::FILE_MODTIME_HI, hi);
                w.encode_flags("file_modtime", D5, &modtimes, hi)?;
            }
        }
        let file_options: Vec<i32> = segment
            .files
            .iter()
            .map(|f| if f.is_class { FILE_IS_CLASS } else { 0 })
            .collect();
        w.encode_ints("file_options", U5, &file_options)?;
        let bits: Vec<Vec<i32>> = segment
            .files
            .iter()
            .map(|f| f.bytes.iter().map(|&b| i32::from(b)).collect())
            .collect();
        w.encode_ints_2d("file_bits", BYTES, &bits)?;

        let (body, band_headers) = w.into_parts();
        let mut head = Vec::with_capacity(32 + band_headers.len());
        head.extend_from_slice(&SEGMENT_MAGIC);
        put_u5(&mut head, SEGMENT_MAJOR)?;
        put_u5(&mut head, SEGMENT_MINOR)?;
        put_u5(&mut head, options.bits())?;
        if options.contains(SegmentOptions::MODTIME_LATEST) {
            put_u5(&mut head, (latest >> 32) as u32)?;
            put_u5(&mut head, latest as u32)?;
        }
        for count in [strings.len(), segment.classes.len(), segment.files.len()] {
            put_u5(&mut head, u32::try_from(count).map_err(|_| too_many(count))?)?;
        }
        put_u5(
            &mut head,
            u32::try_from(band_headers.len()).map_err(|_| too_many(band_headers.len()))?,
        )?;
        head.extend_from_slice(&band_headers);

        self.out.write_all(&head)?;
        self.out.write_all(&body)?;
        let written = (head.len() + body.len()) as u64;
        self.bytes_out += written;
        log::debug!(
            "segment {}: {} strings, {} classes, {} files, {} header bytes, {written} bytes",
            self.segments,
            strings.len(),
            segment.classes.len(),
            segment.files.len(),
            band_headers.len()
        );
        self.segments += 1;
        Ok(())
    }
}

impl<W: Write> SegmentEncoder for SegmentWriter<W> {
    fn encode_segment(&mut self, segment: &Segment) -> Result<()> {
        self.encode(segment)
    }
}

/// Header integers use UNSIGNED5 without escapes.
fn put_u5(out: &mut Vec<u8>, value: u32) -> Result<()> {
    if UNSIGNED5.encode_value(value as i32, 0, out) {
        Ok(())
    } else {
        Err(PackError::Unrepresentable {
            band: "segment_header".to_string(),
            value: i64::from(value),
            coding: UNSIGNED5.to_string(),
        })
    }
}

fn len_value(band: &str, len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| PackError::Unrepresentable {
        band: band.to_string(),
        value: len as i64,
        coding: "32-bit length".to_string(),
    })
}

fn too_many(count: usize) -> PackError {
    PackError::malformed(format!("segment count {count} exceeds 32 bits"))
}
