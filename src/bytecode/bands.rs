// The 24 bytecode operand bands.
//
// Bands are listed in wire order. Sizes come from one scan of the packed
// code stream (`BandSizes`); the case-value, label and escape-byte lengths
// are completed while decoding, once the bands they depend on are known.

use std::io::Read;

use super::opcodes::{PackedShape, SwitchKind, is_wide_local, packed_shape};
use super::{MethodCodes, UnknownOpcodePolicy};
use crate::codec::{BYTE1, BandCodec, BandReader, BandWriter, BRANCH5, DELTA5, UNSIGNED5};
use crate::error::{PackError, Result};

/// One bytecode operand band.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BandKind {
    CaseCount,
    CaseValue,
    Byte,
    Short,
    Local,
    Label,
    IntRef,
    FloatRef,
    LongRef,
    DoubleRef,
    StringRef,
    ClassRef,
    FieldRef,
    MethodRef,
    IMethodRef,
    ThisField,
    SuperField,
    ThisMethod,
    SuperMethod,
    InitRef,
    EscRef,
    EscRefSize,
    EscSize,
    EscByte,
}

pub const BAND_COUNT: usize = 24;

impl BandKind {
    /// Wire order.
    pub const ALL: [BandKind; BAND_COUNT] = [
        BandKind::CaseCount,
        BandKind::CaseValue,
        BandKind::Byte,
        BandKind::Short,
        BandKind::Local,
        BandKind::Label,
        BandKind::IntRef,
        BandKind::FloatRef,
        BandKind::LongRef,
        BandKind::DoubleRef,
        BandKind::StringRef,
        BandKind::ClassRef,
        BandKind::FieldRef,
        BandKind::MethodRef,
        BandKind::IMethodRef,
        BandKind::ThisField,
        BandKind::SuperField,
        BandKind::ThisMethod,
        BandKind::SuperMethod,
        BandKind::InitRef,
        BandKind::EscRef,
        BandKind::EscRefSize,
        BandKind::EscSize,
        BandKind::EscByte,
    ];

    #[inline]
    pub const fn index(self) -> usize {
        self as usize
    }

    pub const fn name(self) -> &'static str {
        match self {
            BandKind::CaseCount => "bc_case_count",
            BandKind::CaseValue => "bc_case_value",
            BandKind::Byte => "bc_byte",
            BandKind::Short => "bc_short",
            BandKind::Local => "bc_local",
            BandKind::Label => "bc_label",
            BandKind::IntRef => "bc_intref",
            BandKind::FloatRef => "bc_floatref",
            BandKind::LongRef => "bc_longref",
            BandKind::DoubleRef => "bc_doubleref",
            BandKind::StringRef => "bc_stringref",
            BandKind::ClassRef => "bc_classref",
            BandKind::FieldRef => "bc_fieldref",
            BandKind::MethodRef => "bc_methodref",
            BandKind::IMethodRef => "bc_imethodref",
            BandKind::ThisField => "bc_thisfield",
            BandKind::SuperField => "bc_superfield",
            BandKind::ThisMethod => "bc_thismethod",
            BandKind::SuperMethod => "bc_supermethod",
            BandKind::InitRef => "bc_initref",
            BandKind::EscRef => "bc_escref",
            BandKind::EscRefSize => "bc_escrefsize",
            BandKind::EscSize => "bc_escsize",
            BandKind::EscByte => "bc_escbyte",
        }
    }

    pub const fn codec(self) -> BandCodec {
        match self {
            BandKind::Byte | BandKind::EscByte => BandCodec::of(BYTE1),
            BandKind::Short
            | BandKind::IntRef
            | BandKind::FloatRef
            | BandKind::LongRef
            | BandKind::DoubleRef
            | BandKind::StringRef
            | BandKind::IMethodRef
            | BandKind::CaseValue => BandCodec::of(DELTA5),
            BandKind::Label => BandCodec::of(BRANCH5),
            BandKind::CaseCount
            | BandKind::Local
            | BandKind::ClassRef
            | BandKind::FieldRef
            | BandKind::MethodRef
            | BandKind::ThisField
            | BandKind::SuperField
            | BandKind::ThisMethod
            | BandKind::SuperMethod
            | BandKind::InitRef
            | BandKind::EscRef
            | BandKind::EscRefSize
            | BandKind::EscSize => BandCodec::of(UNSIGNED5),
        }
    }
}

// ---------------------------------------------------------------------------
// Size discovery
// ---------------------------------------------------------------------------

/// Band lengths known from the packed code stream alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BandSizes {
    counts: [usize; BAND_COUNT],
    /// Switch kinds in encounter order.
    pub switches: Vec<SwitchKind>,
    /// `wide` sub-opcodes in encounter order.
    pub wide: Vec<u8>,
}

impl BandSizes {
    pub fn get(&self, kind: BandKind) -> usize {
        self.counts[kind.index()]
    }

    fn bump(&mut self, kind: BandKind) {
        self.counts[kind.index()] += 1;
    }

    /// Scan every method's packed codes once.
    pub fn discover(codes: &MethodCodes, policy: UnknownOpcodePolicy) -> Result<Self> {
        let mut sizes = Self::default();
        let mut position = 0usize;
        for method in codes.iter() {
            let mut i = 0;
            while i < method.len() {
                let op = method[i];
                match packed_shape(op) {
                    Some(PackedShape::Bands(bands)) => {
                        for &kind in bands {
                            sizes.bump(kind);
                        }
                    }
                    Some(PackedShape::Switch(kind)) => {
                        sizes.bump(BandKind::CaseCount);
                        sizes.bump(BandKind::Label);
                        sizes.switches.push(kind);
                    }
                    Some(PackedShape::Wide) => {
                        let sub = method.get(i + 1).copied().ok_or_else(|| {
                            PackError::malformed("wide at end of method code")
                        })?;
                        i += 1;
                        if sub == super::opcodes::IINC {
                            sizes.bump(BandKind::Local);
                            sizes.bump(BandKind::Short);
                        } else if is_wide_local(sub) {
                            sizes.bump(BandKind::Local);
                        } else {
                            unknown(sub, position + i, policy)?;
                        }
                        sizes.wide.push(sub);
                    }
                    Some(PackedShape::RefEscape) => {
                        sizes.bump(BandKind::EscRef);
                        sizes.bump(BandKind::EscRefSize);
                        i += 1;
                    }
                    Some(PackedShape::ByteEscape) => sizes.bump(BandKind::EscSize),
                    None => unknown(op, position + i, policy)?,
                }
                i += 1;
            }
            position += method.len() + 1;
        }
        Ok(sizes)
    }
}

fn unknown(opcode: u8, position: usize, policy: UnknownOpcodePolicy) -> Result<()> {
    match policy {
        UnknownOpcodePolicy::Warn => {
            log::warn!("unrecognized packed opcode {opcode} at byte {position}; no operands assumed");
            Ok(())
        }
        UnknownOpcodePolicy::Reject => Err(PackError::UnknownOpcode { opcode, position }),
    }
}

// ---------------------------------------------------------------------------
// Band storage
// ---------------------------------------------------------------------------

/// Operand values for one segment, one vector per band.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OperandBands {
    bands: [Vec<i32>; BAND_COUNT],
}

impl OperandBands {
    pub fn push(&mut self, kind: BandKind, value: i32) {
        self.bands[kind.index()].push(value);
    }

    pub fn get(&self, kind: BandKind) -> &[i32] {
        &self.bands[kind.index()]
    }

    pub fn is_empty(&self) -> bool {
        self.bands.iter().all(Vec::is_empty)
    }

    /// Write all 24 bands in wire order.
    pub fn write(&self, w: &mut BandWriter) -> Result<()> {
        for kind in BandKind::ALL {
            let values = self.get(kind);
            log::trace!("{}: {} values", kind.name(), values.len());
            w.encode_ints(kind.name(), kind.codec(), values)?;
        }
        Ok(())
    }

    /// Decode all 24 bands in wire order, completing the derived lengths.
    pub fn read<R: Read>(r: &mut BandReader<'_, R>, sizes: &BandSizes) -> Result<Self> {
        let mut out = Self::default();
        let mut case_values = 0usize;
        let mut extra_labels = 0usize;
        let mut escape_rows: Vec<usize> = Vec::new();

        for kind in BandKind::ALL {
            let count = match kind {
                BandKind::CaseValue => case_values,
                BandKind::Label => sizes.get(kind) + extra_labels,
                BandKind::EscByte => escape_rows.iter().sum(),
                _ => sizes.get(kind),
            };

            let values = if kind == BandKind::EscByte {
                r.decode_ints_2d(kind.name(), kind.codec(), &escape_rows)?
                    .concat()
            } else {
                r.decode_ints(kind.name(), kind.codec(), count)?
            };
            log::trace!("{}: {} values", kind.name(), values.len());

            match kind {
                BandKind::CaseCount => {
                    for (&switch, &k) in sizes.switches.iter().zip(&values) {
                        let k = non_negative(kind, k)?;
                        extra_labels += k;
                        case_values += match switch {
                            SwitchKind::Table => 1,
                            SwitchKind::Lookup => k,
                        };
                    }
                }
                BandKind::EscSize => {
                    escape_rows = values
                        .iter()
                        .map(|&n| non_negative(kind, n))
                        .collect::<Result<_>>()?;
                }
                _ => {}
            }
            out.bands[kind.index()] = values;
        }
        Ok(out)
    }
}

fn non_negative(kind: BandKind, value: i32) -> Result<usize> {
    usize::try_from(value)
        .map_err(|_| PackError::mismatch(kind.name(), format!("negative count {value}")))
}

/// Sequential reader over decoded bands.
#[derive(Debug)]
pub struct OperandCursor {
    bands: OperandBands,
    pos: [usize; BAND_COUNT],
}

impl OperandCursor {
    pub fn new(bands: OperandBands) -> Self {
        Self {
            bands,
            pos: [0; BAND_COUNT],
        }
    }

    pub fn next(&mut self, kind: BandKind) -> Result<i32> {
        let i = kind.index();
        let value = self.bands.bands[i].get(self.pos[i]).copied().ok_or_else(|| {
            PackError::mismatch(
                kind.name(),
                format!("ran out after {} values", self.bands.bands[i].len()),
            )
        })?;
        self.pos[i] += 1;
        Ok(value)
    }

    /// Every band must be consumed exactly.
    pub fn finish(self) -> Result<()> {
        for kind in BandKind::ALL {
            let len = self.bands.get(kind).len();
            let used = self.pos[kind.index()];
            if used != len {
                return Err(PackError::mismatch(
                    kind.name(),
                    format!("{} of {len} values left over", len - used),
                ));
            }
        }
        Ok(())
    }
}
