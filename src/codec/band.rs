// Band reader and writer.
//
// Bands are read and written in one fixed order per segment. Escaped bands
// consume their coding specifier from the band-headers stream at the moment
// the band is decoded, so the writer appends header bytes in band order too.

use std::io::Read;

use super::bhsd::{BYTE1, BhsdCodec, read_byte};
use super::canonical::{self, canonical_codings};
use super::{BandCodec, Coding, escape_index, prealloc, sentinel_for};
use crate::error::{PackError, Result};

/// True if any value needs the high half of a hi/lo band pair.
pub fn needs_hi(values: &[i64]) -> bool {
    values
        .iter()
        .any(|&v| v < 0 || v > i64::from(u32::MAX))
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// Decodes bands from a segment body, resolving escapes through the band
/// headers of the same segment.
pub struct BandReader<'h, R> {
    input: R,
    headers: &'h [u8],
}

impl<'h, R: Read> BandReader<'h, R> {
    pub fn new(input: R, headers: &'h [u8]) -> Self {
        Self { input, headers }
    }

    /// Read one raw byte from the body (single-byte bands).
    pub fn read_byte(&mut self) -> Result<u8> {
        read_byte(&mut self.input)
    }

    /// Band-header bytes not yet consumed by an escape.
    pub fn headers_remaining(&self) -> usize {
        self.headers.len()
    }

    pub fn into_inner(self) -> R {
        self.input
    }

    /// Decode a band of exactly `count` values.
    pub fn decode_ints(&mut self, name: &str, codec: BandCodec, count: usize) -> Result<Vec<i32>> {
        let c = match codec {
            BandCodec::Fixed(c) => return Coding::Bhsd(c).decode_ints(count, &mut self.input),
            BandCodec::Escaping(c) => c,
        };
        if count == 0 {
            return Ok(Vec::new());
        }

        let first = c.decode_value(&mut self.input, 0)?;
        match escape_index(first, &c) {
            Some(index) => {
                let coding = canonical::read_coding(index, &mut self.headers, c)?;
                if coding != Coding::Bhsd(c) {
                    log::debug!("band {name}: {count} values with {coding} (default {c})");
                }
                coding.decode_ints(count, &mut self.input)
            }
            None => {
                let mut out = Vec::with_capacity(prealloc(count));
                out.push(first);
                c.decode_into(&mut self.input, count - 1, first, &mut out)?;
                Ok(out)
            }
        }
    }

    /// Decode `sum(counts)` values and split them into rows of the given
    /// lengths.
    pub fn decode_ints_2d(
        &mut self,
        name: &str,
        codec: BandCodec,
        counts: &[usize],
    ) -> Result<Vec<Vec<i32>>> {
        let total = counts.iter().sum();
        let flat = self.decode_ints(name, codec, total)?;
        let mut rows = Vec::with_capacity(counts.len());
        let mut rest = flat.as_slice();
        for &n in counts {
            let (row, tail) = rest.split_at(n);
            rows.push(row.to_vec());
            rest = tail;
        }
        Ok(rows)
    }

    /// Decode `count` 64-bit values: a single band of unsigned 32-bit values,
    /// or a hi band followed by a lo band.
    pub fn parse_flags(
        &mut self,
        name: &str,
        count: usize,
        codec: BandCodec,
        has_hi: bool,
    ) -> Result<Vec<i64>> {
        if !has_hi {
            let lo = self.decode_ints(name, codec, count)?;
            return Ok(lo.into_iter().map(|v| i64::from(v as u32)).collect());
        }
        let hi = self.decode_ints(&format!("{name}_hi"), codec, count)?;
        let lo = self.decode_ints(&format!("{name}_lo"), codec, count)?;
        Ok(hi
            .into_iter()
            .zip(lo)
            .map(|(h, l)| (i64::from(h) << 32) | i64::from(l as u32))
            .collect())
    }

    /// Decode `count` indices and resolve each into `reference`.
    pub fn parse_references<T: Clone>(
        &mut self,
        name: &str,
        count: usize,
        codec: BandCodec,
        reference: &[T],
    ) -> Result<Vec<T>> {
        let indices = self.decode_ints(name, codec, count)?;
        indices
            .into_iter()
            .map(|index| {
                usize::try_from(index)
                    .ok()
                    .and_then(|i| reference.get(i))
                    .cloned()
                    .ok_or_else(|| PackError::InvalidReference {
                        band: name.to_string(),
                        index: i64::from(index),
                        len: reference.len(),
                    })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Writer
// ---------------------------------------------------------------------------

struct Choice {
    index: u32,
    coding: Coding,
    bytes: Vec<u8>,
}

/// Accumulates a segment's band body and band headers.
#[derive(Debug, Default)]
pub struct BandWriter {
    body: Vec<u8>,
    headers: Vec<u8>,
    effort: u32,
}

impl BandWriter {
    /// `effort` above 1 searches the canonical codings for a smaller
    /// encoding of each escaping band.
    pub fn new(effort: u32) -> Self {
        Self {
            body: Vec::new(),
            headers: Vec::new(),
            effort,
        }
    }

    pub fn body_len(&self) -> usize {
        self.body.len()
    }

    pub fn headers(&self) -> &[u8] {
        &self.headers
    }

    /// Consume the writer, returning `(body, band_headers)`.
    pub fn into_parts(self) -> (Vec<u8>, Vec<u8>) {
        (self.body, self.headers)
    }

    /// Append raw bytes to a single-byte band.
    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.body.extend_from_slice(bytes);
    }

    /// Encode a band with `codec` as its default.
    pub fn encode_ints(&mut self, name: &str, codec: BandCodec, values: &[i32]) -> Result<()> {
        let default = codec.codec();
        let fixed = matches!(codec, BandCodec::Fixed(_));
        if fixed || values.is_empty() {
            return Coding::Bhsd(default)
                .encode_ints(values, &mut self.body)
                .map_err(|v| unrepresentable(name, v, &default));
        }

        let mut failed = None;
        let mut best = match self.plain_choice(default, values) {
            Ok(choice) => choice,
            Err(v) => {
                failed = Some(v);
                None
            }
        };

        if self.effort > 1 || best.is_none() {
            for (index, candidate) in canonical_codings() {
                if candidate == default {
                    continue;
                }
                let Some(bytes) = escaped_bytes(default, index, &Coding::Bhsd(candidate), values)
                else {
                    continue;
                };
                if best.as_ref().is_none_or(|b| bytes.len() < b.bytes.len()) {
                    best = Some(Choice {
                        index,
                        coding: Coding::Bhsd(candidate),
                        bytes,
                    });
                }
            }
        }

        let Some(choice) = best else {
            return Err(unrepresentable(name, failed.unwrap_or(values[0]), &default));
        };
        if choice.coding != Coding::Bhsd(default) {
            log::debug!(
                "band {name}: {} values with {} (default {default}, specifier {})",
                values.len(),
                choice.coding,
                choice.index
            );
        }
        log::trace!("band {name}: {} values in {} bytes", values.len(), choice.bytes.len());
        self.body.extend_from_slice(&choice.bytes);
        Ok(())
    }

    /// Encode a band with an explicit alternate coding, escaping to it from
    /// `codec`.
    pub fn encode_ints_with(
        &mut self,
        name: &str,
        codec: BandCodec,
        coding: &Coding,
        values: &[i32],
    ) -> Result<()> {
        let default = codec.codec();
        if matches!(codec, BandCodec::Fixed(_)) || values.is_empty() {
            return Err(PackError::InvalidCoding(format!(
                "band {name}: cannot escape from {default}"
            )));
        }
        let mut headers = Vec::new();
        let index = canonical::write_coding(coding, default, &mut headers)?;
        let bytes = escaped_bytes(default, index, coding, values).ok_or_else(|| {
            PackError::InvalidCoding(format!("band {name}: {coding} cannot hold the band"))
        })?;
        self.headers.extend_from_slice(&headers);
        self.body.extend_from_slice(&bytes);
        Ok(())
    }

    /// Default coding, escaping to itself when the first value would read
    /// back as a sentinel. `Err` carries the first unrepresentable value.
    fn plain_choice(
        &self,
        default: BhsdCodec,
        values: &[i32],
    ) -> std::result::Result<Option<Choice>, i32> {
        let coding = Coding::Bhsd(default);
        if escape_index(values[0], &default).is_some() {
            return Ok(escaped_bytes(default, 0, &coding, values).map(|bytes| Choice {
                index: 0,
                coding,
                bytes,
            }));
        }
        let mut bytes = Vec::new();
        coding.encode_ints(values, &mut bytes)?;
        Ok(Some(Choice {
            index: 0,
            coding,
            bytes,
        }))
    }

    /// Flatten rows into one band.
    pub fn encode_ints_2d(&mut self, name: &str, codec: BandCodec, rows: &[Vec<i32>]) -> Result<()> {
        let flat: Vec<i32> = rows.iter().flatten().copied().collect();
        self.encode_ints(name, codec, &flat)
    }

    /// Inverse of [`BandReader::parse_flags`].
    pub fn encode_flags(
        &mut self,
        name: &str,
        codec: BandCodec,
        values: &[i64],
        has_hi: bool,
    ) -> Result<()> {
        if !has_hi {
            let lo = values
                .iter()
                .map(|&v| {
                    u32::try_from(v)
                        .map(|u| u as i32)
                        .map_err(|_| PackError::Unrepresentable {
                            band: name.to_string(),
                            value: v,
                            coding: "32-bit flags".to_string(),
                        })
                })
                .collect::<Result<Vec<i32>>>()?;
            return self.encode_ints(name, codec, &lo);
        }
        let hi: Vec<i32> = values.iter().map(|&v| (v >> 32) as i32).collect();
        let lo: Vec<i32> = values.iter().map(|&v| v as i32).collect();
        self.encode_ints(&format!("{name}_hi"), codec, &hi)?;
        self.encode_ints(&format!("{name}_lo"), codec, &lo)
    }

    /// Encode indices into a reference table of `len` entries.
    pub fn encode_references(
        &mut self,
        name: &str,
        codec: BandCodec,
        indices: &[usize],
        len: usize,
    ) -> Result<()> {
        let values = indices
            .iter()
            .map(|&i| {
                if i < len {
                    i32::try_from(i).ok()
                } else {
                    None
                }
                .ok_or_else(|| PackError::InvalidReference {
                    band: name.to_string(),
                    index: i as i64,
                    len,
                })
            })
            .collect::<Result<Vec<i32>>>()?;
        self.encode_ints(name, codec, &values)
    }
}

/// Sentinel for `index` under `default`, followed by `values` in `coding`.
fn escaped_bytes(default: BhsdCodec, index: u32, coding: &Coding, values: &[i32]) -> Option<Vec<u8>> {
    let sentinel = sentinel_for(index, &default)?;
    let mut bytes = Vec::new();
    default.encode_value(sentinel, 0, &mut bytes);
    coding.encode_ints(values, &mut bytes).ok()?;
    Some(bytes)
}

fn unrepresentable(name: &str, value: i32, codec: &BhsdCodec) -> PackError {
    PackError::Unrepresentable {
        band: name.to_string(),
        value: i64::from(value),
        coding: codec.to_string(),
    }
}

/// Codec for the byte-per-value bands.
pub const BYTES: BandCodec = BandCodec::Fixed(BYTE1);
