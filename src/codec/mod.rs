// Band codec framework.
//
// Integer bands are written with BHSD codings. Every band has a default
// coding; bands whose default is wider than one byte may instead open with
// an escape sentinel naming an alternate coding described in the segment's
// band headers.
//
// # Modules
//
// - `bhsd`      - The (B, H, S, D) variable-width integer coding
// - `canonical` - Canonical coding table and header specifiers
// - `band`      - Band reader/writer with escape handling

pub mod band;
pub mod bhsd;
pub mod canonical;

use std::io::Read;

use crate::error::Result;

pub use band::{BandReader, BandWriter, needs_hi};
pub use bhsd::{
    BCI5, BRANCH5, BYTE1, BhsdCodec, CHAR3, DELTA5, MDELTA5, SIGNED5, UDELTA5, UNSIGNED5,
};

// ---------------------------------------------------------------------------
// Concrete codings
// ---------------------------------------------------------------------------

/// A coding that can be applied to a whole band.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Coding {
    Bhsd(BhsdCodec),
    /// First `k` values with `a`, the rest with `b`. Each half starts its own
    /// delta chain.
    Run {
        k: usize,
        a: Box<Coding>,
        b: Box<Coding>,
    },
}

/// Largest number of values reserved up front for a decoded band.
pub const MAX_PREALLOC: usize = 4096;

/// Initial capacity for `count` decoded values. Counts come off the wire, so
/// anything larger grows as bytes are actually read.
pub(crate) fn prealloc(count: usize) -> usize {
    count.min(MAX_PREALLOC)
}

impl Coding {
    /// Decode exactly `count` values.
    pub fn decode_ints<R: Read>(&self, count: usize, r: &mut R) -> Result<Vec<i32>> {
        let mut out = Vec::with_capacity(prealloc(count));
        self.decode_into(count, r, &mut out)?;
        Ok(out)
    }

    fn decode_into<R: Read>(&self, count: usize, r: &mut R, out: &mut Vec<i32>) -> Result<()> {
        match self {
            Coding::Bhsd(c) => c.decode_into(r, count, 0, out),
            Coding::Run { k, a, b } => {
                let head = (*k).min(count);
                a.decode_into(head, r, out)?;
                b.decode_into(count - head, r, out)
            }
        }
    }

    /// Encode `values`, or return the first value this coding cannot hold.
    pub fn encode_ints(&self, values: &[i32], out: &mut Vec<u8>) -> std::result::Result<(), i32> {
        match self {
            Coding::Bhsd(c) => {
                let mut last = 0;
                for &v in values {
                    if !c.encode_value(v, last, out) {
                        return Err(v);
                    }
                    last = v;
                }
                Ok(())
            }
            Coding::Run { k, a, b } => {
                let head = (*k).min(values.len());
                a.encode_ints(&values[..head], out)?;
                b.encode_ints(&values[head..], out)
            }
        }
    }
}

impl std::fmt::Display for Coding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Coding::Bhsd(c) => write!(f, "{c}"),
            Coding::Run { k, a, b } => write!(f, "run({k}, {a}, {b})"),
        }
    }
}

// ---------------------------------------------------------------------------
// Band defaults
// ---------------------------------------------------------------------------

/// The default coding of a band.
///
/// Single-byte defaults are `Fixed`: their bands never carry an escape.
/// Everything else is `Escaping`: the first value may be a sentinel.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BandCodec {
    Fixed(BhsdCodec),
    Escaping(BhsdCodec),
}

impl BandCodec {
    pub const fn of(codec: BhsdCodec) -> Self {
        if codec.b() == 1 {
            BandCodec::Fixed(codec)
        } else {
            BandCodec::Escaping(codec)
        }
    }

    pub fn codec(&self) -> BhsdCodec {
        match *self {
            BandCodec::Fixed(c) | BandCodec::Escaping(c) => c,
        }
    }
}

impl From<BhsdCodec> for BandCodec {
    fn from(codec: BhsdCodec) -> Self {
        BandCodec::of(codec)
    }
}

/// Specifier index signalled by a band's first value, if it is a sentinel.
///
/// Signed defaults reserve `-256..=-1` (index `-1 - first`); unsigned defaults
/// reserve `L..=L+255` (index `first - L`). Single-byte codings never escape.
pub fn escape_index(first: i32, codec: &BhsdCodec) -> Option<u32> {
    if codec.b() == 1 {
        return None;
    }
    if codec.is_signed() {
        (-256..=-1).contains(&first).then(|| (-1 - first) as u32)
    } else {
        let l = i64::from(codec.l());
        let first = i64::from(first);
        (l..=l + 255).contains(&first).then(|| (first - l) as u32)
    }
}

/// The sentinel that selects specifier `index` under `codec`.
pub fn sentinel_for(index: u32, codec: &BhsdCodec) -> Option<i32> {
    if codec.b() == 1 || index > 255 {
        return None;
    }
    let value = if codec.is_signed() {
        -1 - index as i32
    } else {
        i32::from(codec.l()) + index as i32
    };
    codec.encodes(value, 0).then_some(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PackError;
    use std::io::Cursor;

    #[test]
    fn escape_ranges() {
        assert_eq!(escape_index(-1, &DELTA5), Some(0));
        assert_eq!(escape_index(-256, &DELTA5), Some(255));
        assert_eq!(escape_index(-257, &DELTA5), None);
        assert_eq!(escape_index(0, &DELTA5), None);
        // UNSIGNED5 has L = 192.
        assert_eq!(escape_index(191, &UNSIGNED5), None);
        assert_eq!(escape_index(192, &UNSIGNED5), Some(0));
        assert_eq!(escape_index(192 + 255, &UNSIGNED5), Some(255));
        assert_eq!(escape_index(-1, &BYTE1), None);
    }

    #[test]
    fn escape_resolution_is_deterministic() {
        for first in -300..600 {
            assert_eq!(escape_index(first, &SIGNED5), escape_index(first, &SIGNED5));
            if let Some(index) = escape_index(first, &UNSIGNED5) {
                assert_eq!(sentinel_for(index, &UNSIGNED5), Some(first));
            }
        }
    }

    #[test]
    fn run_coding_splits_values() {
        let run = Coding::Run {
            k: 2,
            a: Box::new(Coding::Bhsd(BYTE1)),
            b: Box::new(Coding::Bhsd(SIGNED5)),
        };
        let values = [200, 17, -5, 3];
        let mut out = Vec::new();
        run.encode_ints(&values, &mut out).unwrap();
        assert_eq!(&out[..2], &[200, 17]);
        let back = run.decode_ints(values.len(), &mut Cursor::new(&out)).unwrap();
        assert_eq!(back, values);
    }

    #[test]
    fn huge_count_on_short_input_is_truncation() {
        let coding = Coding::Bhsd(UNSIGNED5);
        let err = coding
            .decode_ints(usize::MAX / 8, &mut Cursor::new(&[1u8, 2, 3]))
            .unwrap_err();
        assert!(matches!(err, PackError::Malformed(_)));

        let headers: [u8; 0] = [];
        let mut r = BandReader::new(Cursor::new(&[7u8]), &headers);
        let err = r
            .decode_ints("lengths", BandCodec::of(UNSIGNED5), i32::MAX as usize)
            .unwrap_err();
        assert!(matches!(err, PackError::Malformed(_)));
    }

    #[test]
    fn band_codec_classification() {
        assert_eq!(BandCodec::of(BYTE1), BandCodec::Fixed(BYTE1));
        assert_eq!(BandCodec::of(DELTA5), BandCodec::Escaping(DELTA5));
        assert_eq!(BandCodec::of(DELTA5).codec(), DELTA5);
    }
}
