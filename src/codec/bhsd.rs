// BHSD variable-width integer coding.
//
// A value occupies 1..=B bytes. Byte values below L = 256 - H terminate the
// value; bytes at or above L continue it, each contributing in radix H. The
// B-th byte always terminates. S folds the sign into the low S bits of the
// unsigned code and D codes each value as a difference from its predecessor.
//
// Bands carry 32-bit values: codes above `u32::MAX` never come out of the
// encoder, and decoded values wrap to `i32` the way the band arithmetic does.

use std::fmt;
use std::io::{self, Read};

use crate::error::{PackError, Result};

/// A `(B, H, S, D)` coding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct BhsdCodec {
    b: u8,
    h: u16,
    s: u8,
    d: bool,
}

/// Single byte, unsigned.
pub const BYTE1: BhsdCodec = BhsdCodec::new(1, 256, 0, false);
/// Three bytes, radix 128. Used for character data.
pub const CHAR3: BhsdCodec = BhsdCodec::new(3, 128, 0, false);
/// Instruction indices.
pub const BCI5: BhsdCodec = BhsdCodec::new(5, 4, 0, false);
/// Signed instruction index differences.
pub const BRANCH5: BhsdCodec = BhsdCodec::new(5, 4, 2, false);
pub const UNSIGNED5: BhsdCodec = BhsdCodec::new(5, 64, 0, false);
pub const SIGNED5: BhsdCodec = BhsdCodec::new(5, 64, 1, false);
pub const UDELTA5: BhsdCodec = BhsdCodec::new(5, 64, 0, true);
pub const DELTA5: BhsdCodec = BhsdCodec::new(5, 64, 1, true);
pub const MDELTA5: BhsdCodec = BhsdCodec::new(5, 64, 2, true);

impl BhsdCodec {
    /// Build a codec from parameters known to be valid.
    ///
    /// Panics (at compile time for `const` uses) on invalid parameters; use
    /// [`BhsdCodec::try_new`] for parameters read from input.
    pub const fn new(b: u8, h: u16, s: u8, d: bool) -> Self {
        assert!(b >= 1 && b <= 5, "B must be in 1..=5");
        assert!(h >= 1 && h <= 256, "H must be in 1..=256");
        assert!(s <= 2, "S must be in 0..=2");
        assert!(b != 1 || h == 256, "single-byte codings require H = 256");
        Self { b, h, s, d }
    }

    /// Validate parameters decoded from a band header.
    pub fn try_new(b: u8, h: u16, s: u8, d: bool) -> Result<Self> {
        if !(1..=5).contains(&b) || !(1..=256).contains(&h) || s > 2 || (b == 1 && h != 256) {
            return Err(PackError::InvalidCoding(format!(
                "BHSD parameters out of range: B={b} H={h} S={s} D={}",
                u8::from(d)
            )));
        }
        Ok(Self { b, h, s, d })
    }

    #[inline]
    pub const fn b(&self) -> u8 {
        self.b
    }

    #[inline]
    pub const fn h(&self) -> u16 {
        self.h
    }

    /// Number of terminal byte values, `256 - H`.
    #[inline]
    pub const fn l(&self) -> u16 {
        256 - self.h
    }

    #[inline]
    pub const fn s(&self) -> u8 {
        self.s
    }

    #[inline]
    pub const fn is_signed(&self) -> bool {
        self.s != 0
    }

    #[inline]
    pub const fn is_delta(&self) -> bool {
        self.d
    }

    /// Count of distinct unsigned codes representable in at most B bytes.
    pub fn cardinality(&self) -> u64 {
        let h = u64::from(self.h);
        let l = u64::from(self.l());
        let mut total = 0u64;
        let mut pow = 1u64;
        for _ in 1..self.b {
            total += l * pow;
            pow *= h;
        }
        total + 256 * pow
    }

    // -----------------------------------------------------------------------
    // Sign folding
    // -----------------------------------------------------------------------

    fn unfold(&self, u: u64) -> i64 {
        if self.s == 0 {
            return u as i64;
        }
        let mask = (1i64 << self.s) - 1;
        let u = u as i64;
        if u & mask == mask {
            !(u >> self.s)
        } else {
            u - (u >> self.s)
        }
    }

    fn fold(&self, z: i64) -> u64 {
        let mask = (1i64 << self.s) - 1;
        if z < 0 {
            (((!z) << self.s) | mask) as u64
        } else {
            (((z / mask) << self.s) | (z % mask)) as u64
        }
    }

    /// Unsigned code for `value` given the previous value, or `None` when the
    /// value falls outside this codec's range.
    fn code_for(&self, value: i32, last: i32) -> Option<u64> {
        let z = if self.d {
            value.wrapping_sub(last)
        } else {
            value
        };
        let u = match self.s {
            0 => u64::from(z as u32),
            _ => self.fold(i64::from(z)),
        };
        (u < self.cardinality()).then_some(u)
    }

    // -----------------------------------------------------------------------
    // Single values
    // -----------------------------------------------------------------------

    /// True if `value` (following `last`) can be written with this codec.
    pub fn encodes(&self, value: i32, last: i32) -> bool {
        self.code_for(value, last).is_some()
    }

    /// Encode one value, appending its bytes to `out`.
    /// Returns `false` (writing nothing) if the value is out of range.
    pub fn encode_value(&self, value: i32, last: i32, out: &mut Vec<u8>) -> bool {
        let Some(mut u) = self.code_for(value, last) else {
            return false;
        };
        let l = u64::from(self.l());
        let h = u64::from(self.h);
        for n in 1..=self.b {
            if u < l || n == self.b {
                out.push(u as u8);
                break;
            }
            out.push((l + (u - l) % h) as u8);
            u = (u - l) / h;
        }
        true
    }

    /// Encoded length of one value in bytes, if representable.
    pub fn encoded_len(&self, value: i32, last: i32) -> Option<usize> {
        let mut u = self.code_for(value, last)?;
        let l = u64::from(self.l());
        let h = u64::from(self.h);
        for n in 1..=self.b {
            if u < l || n == self.b {
                return Some(n as usize);
            }
            u = (u - l) / h;
        }
        Some(self.b as usize)
    }

    /// Decode one value from `r`. `last` is the previously decoded value of
    /// the same band (0 at band start); it only matters for delta codecs.
    pub fn decode_value<R: Read>(&self, r: &mut R, last: i32) -> Result<i32> {
        let l = u64::from(self.l());
        let h = u64::from(self.h);
        let mut u = 0u64;
        let mut pow = 1u64;
        for n in 1..=self.b {
            let x = u64::from(read_byte(r)?);
            u += x * pow;
            if x < l || n == self.b {
                break;
            }
            pow *= h;
        }
        let z = self.unfold(u);
        let value = if self.d {
            i64::from(last).wrapping_add(z)
        } else {
            z
        };
        Ok(value as i32)
    }

    /// Decode `count` values, continuing the delta chain from `last`.
    pub fn decode_into<R: Read>(
        &self,
        r: &mut R,
        count: usize,
        mut last: i32,
        out: &mut Vec<i32>,
    ) -> Result<()> {
        out.reserve(super::prealloc(count));
        for _ in 0..count {
            last = self.decode_value(r, last)?;
            out.push(last);
        }
        Ok(())
    }
}

impl fmt::Display for BhsdCodec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({},{}", self.b, self.h)?;
        if self.s != 0 || self.d {
            write!(f, ",{}", self.s)?;
        }
        if self.d {
            write!(f, ",1")?;
        }
        write!(f, ")")
    }
}

pub(crate) fn read_byte<R: Read>(r: &mut R) -> Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf).map_err(|e| {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            PackError::malformed("band data truncated")
        } else {
            PackError::Io(e)
        }
    })?;
    Ok(buf[0])
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn roundtrip(codec: BhsdCodec, values: &[i32]) {
        let mut out = Vec::new();
        let mut last = 0;
        for &v in values {
            assert!(codec.encode_value(v, last, &mut out), "{codec} rejected {v}");
            last = v;
        }
        let mut decoded = Vec::new();
        codec
            .decode_into(&mut Cursor::new(&out), values.len(), 0, &mut decoded)
            .unwrap();
        assert_eq!(decoded, values, "roundtrip failed for {codec}");
    }

    #[test]
    fn cardinalities() {
        assert_eq!(BYTE1.cardinality(), 256);
        assert_eq!(BCI5.cardinality(), 252 * 85 + 256 * 256);
        assert!(UNSIGNED5.cardinality() > u64::from(u32::MAX));
        assert_eq!(BhsdCodec::new(4, 256, 0, false).cardinality(), 1 << 32);
    }

    #[test]
    fn byte1_is_identity() {
        let mut out = Vec::new();
        for v in 0..=255 {
            assert!(BYTE1.encode_value(v, 0, &mut out));
        }
        assert_eq!(out, (0..=255u8).collect::<Vec<_>>());
        assert!(!BYTE1.encodes(256, 0));
        assert!(!BYTE1.encodes(-1, 0));
    }

    #[test]
    fn unsigned5_small_values_take_one_byte() {
        for v in 0..192 {
            assert_eq!(UNSIGNED5.encoded_len(v, 0), Some(1));
        }
        assert_eq!(UNSIGNED5.encoded_len(192, 0), Some(2));
    }

    #[test]
    fn signed_folding() {
        // S=1 interleaves: 0, -1, 1, -2, 2 ...
        let mut out = Vec::new();
        for v in [0, -1, 1, -2, 2] {
            SIGNED5.encode_value(v, 0, &mut out);
        }
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn s2_folding_reserves_every_fourth_code() {
        // With S=2 codes 3, 7, 11 ... are negative.
        let mut out = Vec::new();
        for v in [0, 1, 2, -1, 3] {
            BRANCH5.encode_value(v, 0, &mut out);
        }
        assert_eq!(out, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn roundtrips_across_codecs() {
        let values = [0, 1, -1, 127, -128, 4000, -70000, i32::MAX, i32::MIN, 5];
        roundtrip(SIGNED5, &values);
        roundtrip(DELTA5, &values);
        roundtrip(UNSIGNED5, &values);
        roundtrip(UDELTA5, &values);
        roundtrip(MDELTA5, &[10, 12, 9, -400, 70000, 69999]);
        roundtrip(BRANCH5, &[0, 1, -1, 20000, -20000]);
        roundtrip(CHAR3, &[0, 65, 0xFFFF]);
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(!BRANCH5.encodes(100_000, 0));
        assert!(!BCI5.encodes(-1, 0));
        assert!(!CHAR3.encodes(-1, 0));
    }

    #[test]
    fn try_new_validates() {
        assert!(BhsdCodec::try_new(1, 128, 0, false).is_err());
        assert!(BhsdCodec::try_new(6, 64, 0, false).is_err());
        assert!(BhsdCodec::try_new(5, 64, 3, false).is_err());
        assert_eq!(BhsdCodec::try_new(5, 64, 1, true).unwrap(), DELTA5);
    }

    #[test]
    fn display_matches_conventional_notation() {
        assert_eq!(BYTE1.to_string(), "(1,256)");
        assert_eq!(SIGNED5.to_string(), "(5,64,1)");
        assert_eq!(UDELTA5.to_string(), "(5,64,0,1)");
    }

    #[test]
    fn truncated_input_is_a_format_error() {
        let err = UNSIGNED5
            .decode_value(&mut Cursor::new(&[0xFFu8][..]), 0)
            .unwrap_err();
        assert!(!err.is_io());
    }
}
