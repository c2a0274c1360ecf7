// Canonical coding table and band-header coding specifiers.
//
// A band whose first value is an escape sentinel names its real coding by a
// specifier index. Small indices select one of the 115 canonical BHSD
// codings; larger ones read their parameters from the band-headers stream:
//
//   0          the band's default coding
//   1..=115    canonical BHSD codings
//   116        explicit BHSD: [ (B-1)<<3 | S<<1 | D ] [ H-1 ]
//   117..=140  run coding (K, A, B) with optional nested specifiers
//   141..=188  population coding (rejected)

use std::io::Read;

use super::Coding;
use super::bhsd::{BhsdCodec, read_byte};
use crate::error::{PackError, Result};

/// Specifier index of the explicit BHSD form.
pub const ARBITRARY_BHSD: u32 = 116;
/// First specifier index of the run codings.
pub const RUN_FIRST: u32 = 117;
pub const RUN_LAST: u32 = 140;
pub const POPULATION_FIRST: u32 = 141;
pub const POPULATION_LAST: u32 = 188;

/// `(B, H, S, D)` for canonical indices 1..=115 (entry `i` is index `i + 1`).
const CANONICAL: [(u8, u16, u8, u8); 115] = [
    (1, 256, 0, 0),
    (1, 256, 1, 0),
    (1, 256, 0, 1),
    (1, 256, 1, 1),
    (2, 256, 0, 0),
    (2, 256, 1, 0),
    (2, 256, 0, 1),
    (2, 256, 1, 1),
    (3, 256, 0, 0),
    (3, 256, 1, 0),
    (3, 256, 0, 1),
    (3, 256, 1, 1),
    (4, 256, 0, 0),
    (4, 256, 1, 0),
    (4, 256, 0, 1),
    (4, 256, 1, 1),
    // 17..=31: five-byte codings, S = 0, 1, 2
    (5, 4, 0, 0),
    (5, 4, 1, 0),
    (5, 4, 2, 0),
    (5, 16, 0, 0),
    (5, 16, 1, 0),
    (5, 16, 2, 0),
    (5, 32, 0, 0),
    (5, 32, 1, 0),
    (5, 32, 2, 0),
    (5, 64, 0, 0),
    (5, 64, 1, 0),
    (5, 64, 2, 0),
    (5, 128, 0, 0),
    (5, 128, 1, 0),
    (5, 128, 2, 0),
    // 32..=46: the same with D = 1
    (5, 4, 0, 1),
    (5, 4, 1, 1),
    (5, 4, 2, 1),
    (5, 16, 0, 1),
    (5, 16, 1, 1),
    (5, 16, 2, 1),
    (5, 32, 0, 1),
    (5, 32, 1, 1),
    (5, 32, 2, 1),
    (5, 64, 0, 1),
    (5, 64, 1, 1),
    (5, 64, 2, 1),
    (5, 128, 0, 1),
    (5, 128, 1, 1),
    (5, 128, 2, 1),
    // 47..=69: two bytes
    (2, 192, 0, 0),
    (2, 224, 0, 0),
    (2, 240, 0, 0),
    (2, 248, 0, 0),
    (2, 252, 0, 0),
    (2, 8, 0, 1),
    (2, 8, 1, 1),
    (2, 16, 0, 1),
    (2, 16, 1, 1),
    (2, 32, 0, 1),
    (2, 32, 1, 1),
    (2, 64, 0, 1),
    (2, 64, 1, 1),
    (2, 128, 0, 1),
    (2, 128, 1, 1),
    (2, 192, 0, 1),
    (2, 192, 1, 1),
    (2, 224, 0, 1),
    (2, 224, 1, 1),
    (2, 240, 0, 1),
    (2, 240, 1, 1),
    (2, 248, 0, 1),
    (2, 248, 1, 1),
    // 70..=92: three bytes
    (3, 192, 0, 0),
    (3, 224, 0, 0),
    (3, 240, 0, 0),
    (3, 248, 0, 0),
    (3, 252, 0, 0),
    (3, 8, 0, 1),
    (3, 8, 1, 1),
    (3, 16, 0, 1),
    (3, 16, 1, 1),
    (3, 32, 0, 1),
    (3, 32, 1, 1),
    (3, 64, 0, 1),
    (3, 64, 1, 1),
    (3, 128, 0, 1),
    (3, 128, 1, 1),
    (3, 192, 0, 1),
    (3, 192, 1, 1),
    (3, 224, 0, 1),
    (3, 224, 1, 1),
    (3, 240, 0, 1),
    (3, 240, 1, 1),
    (3, 248, 0, 1),
    (3, 248, 1, 1),
    // 93..=115: four bytes
    (4, 192, 0, 0),
    (4, 224, 0, 0),
    (4, 240, 0, 0),
    (4, 248, 0, 0),
    (4, 252, 0, 0),
    (4, 8, 0, 1),
    (4, 8, 1, 1),
    (4, 16, 0, 1),
    (4, 16, 1, 1),
    (4, 32, 0, 1),
    (4, 32, 1, 1),
    (4, 64, 0, 1),
    (4, 64, 1, 1),
    (4, 128, 0, 1),
    (4, 128, 1, 1),
    (4, 192, 0, 1),
    (4, 192, 1, 1),
    (4, 224, 0, 1),
    (4, 224, 1, 1),
    (4, 240, 0, 1),
    (4, 240, 1, 1),
    (4, 248, 0, 1),
    (4, 248, 1, 1),
];

/// Number of canonical codings.
pub const CANONICAL_COUNT: u32 = CANONICAL.len() as u32;

/// Canonical coding for `index` in 1..=115.
pub fn canonical(index: u32) -> Option<BhsdCodec> {
    let i = index.checked_sub(1)? as usize;
    CANONICAL
        .get(i)
        .map(|&(b, h, s, d)| BhsdCodec::new(b, h, s, d == 1))
}

/// Canonical index of `codec`, if it is in the table.
pub fn canonical_index(codec: &BhsdCodec) -> Option<u32> {
    CANONICAL
        .iter()
        .position(|&(b, h, s, d)| {
            b == codec.b() && h == codec.h() && s == codec.s() && (d == 1) == codec.is_delta()
        })
        .map(|i| i as u32 + 1)
}

/// Iterate all canonical codings with their indices.
pub fn canonical_codings() -> impl Iterator<Item = (u32, BhsdCodec)> {
    (1..=CANONICAL_COUNT).filter_map(|i| canonical(i).map(|c| (i, c)))
}

// ---------------------------------------------------------------------------
// Reading specifiers
// ---------------------------------------------------------------------------

/// Resolve specifier `index`, pulling any parameters from `headers`.
/// `default` is the band's default coding, used for index 0 and for the
/// defaulted halves of a run coding.
pub fn read_coding<H: Read>(index: u32, headers: &mut H, default: BhsdCodec) -> Result<Coding> {
    match index {
        0 => Ok(Coding::Bhsd(default)),
        1..=115 => canonical(index)
            .map(Coding::Bhsd)
            .ok_or_else(|| PackError::InvalidCoding(format!("canonical index {index}"))),
        ARBITRARY_BHSD => {
            let code = read_byte(headers)?;
            let h = u16::from(read_byte(headers)?) + 1;
            let d = code & 1 == 1;
            let s = (code >> 1) & 3;
            let b = ((code >> 3) & 7) + 1;
            if code >> 6 != 0 {
                return Err(PackError::InvalidCoding(format!(
                    "explicit BHSD descriptor {code:#04x} has reserved bits set"
                )));
            }
            BhsdCodec::try_new(b, h, s, d).map(Coding::Bhsd)
        }
        RUN_FIRST..=RUN_LAST => {
            let offset = index - RUN_FIRST;
            let kx = offset & 3;
            let explicit_kb = (offset >> 2) & 1 == 1;
            let a_default = (offset >> 3) & 1 == 1;
            let b_default = (offset >> 4) & 1 == 1;
            let kb = if explicit_kb {
                u32::from(read_byte(headers)?)
            } else {
                3
            };
            let k = (kb + 1) as usize * 16usize.pow(kx);
            let a = if a_default {
                Coding::Bhsd(default)
            } else {
                let nested = u32::from(read_byte(headers)?);
                read_coding(nested, headers, default)?
            };
            let b = if b_default {
                Coding::Bhsd(default)
            } else {
                let nested = u32::from(read_byte(headers)?);
                read_coding(nested, headers, default)?
            };
            Ok(Coding::Run {
                k,
                a: Box::new(a),
                b: Box::new(b),
            })
        }
        POPULATION_FIRST..=POPULATION_LAST => Err(PackError::Unsupported(format!(
            "population coding (specifier {index})"
        ))),
        _ => Err(PackError::InvalidCoding(format!(
            "specifier {index} out of range"
        ))),
    }
}

// ---------------------------------------------------------------------------
// Writing specifiers
// ---------------------------------------------------------------------------

/// Specifier index for `coding`, appending any header bytes it needs to
/// `headers`. Inverse of [`read_coding`].
pub fn write_coding(coding: &Coding, default: BhsdCodec, headers: &mut Vec<u8>) -> Result<u32> {
    match coding {
        Coding::Bhsd(c) if *c == default => Ok(0),
        Coding::Bhsd(c) => {
            if let Some(index) = canonical_index(c) {
                return Ok(index);
            }
            headers.push(((c.b() - 1) << 3) | (c.s() << 1) | u8::from(c.is_delta()));
            headers.push((c.h() - 1) as u8);
            Ok(ARBITRARY_BHSD)
        }
        Coding::Run { k, a, b } => {
            let (kx, kb) = split_run_length(*k).ok_or_else(|| {
                PackError::InvalidCoding(format!("run length {k} has no K specifier"))
            })?;
            let a_default = matches!(**a, Coding::Bhsd(c) if c == default);
            let b_default = !a_default && matches!(**b, Coding::Bhsd(c) if c == default);
            let explicit_kb = kb != 3;
            let offset = kx
                | (u32::from(explicit_kb) << 2)
                | (u32::from(a_default) << 3)
                | (u32::from(b_default) << 4);
            if explicit_kb {
                headers.push(kb as u8);
            }
            if !a_default {
                write_nested(a, default, headers)?;
            }
            if !b_default {
                write_nested(b, default, headers)?;
            }
            Ok(RUN_FIRST + offset)
        }
    }
}

fn write_nested(coding: &Coding, default: BhsdCodec, headers: &mut Vec<u8>) -> Result<()> {
    let mut extra = Vec::new();
    let index = write_coding(coding, default, &mut extra)?;
    let index = u8::try_from(index)
        .map_err(|_| PackError::InvalidCoding(format!("nested specifier {index}")))?;
    headers.push(index);
    headers.extend_from_slice(&extra);
    Ok(())
}

/// Find `(kx, kb)` with `k = (kb + 1) * 16^kx`, preferring the implicit kb = 3.
fn split_run_length(k: usize) -> Option<(u32, u32)> {
    for kx in 0..4u32 {
        let unit = 16usize.pow(kx);
        if k == 4 * unit {
            return Some((kx, 3));
        }
    }
    (0..4u32).find_map(|kx| {
        let unit = 16usize.pow(kx);
        (k % unit == 0 && (1..=256).contains(&(k / unit))).then(|| (kx, (k / unit - 1) as u32))
    })
}
