// Bytecode band splitter.
//
// Packing turns each method's JVM bytecode into a packed opcode stream
// (`bc_codes`) plus values appended to 24 operand bands. Unpacking runs four
// passes per segment: extract the packed codes of every method, size the
// bands from one scan of those codes, decode the bands in wire order, and
// rebuild each method's `Code` from its packed codes, the bands and the
// class metadata.
//
// # Modules
//
// - `opcodes`  - JVM and packed opcode tables
// - `bands`    - Operand band identities, sizing and storage
// - `insn`     - Index-addressed instructions, parsing and layout
// - `offsets`  - Exception/line/local-variable renumbering
// - `split`    - Pack direction (`BytecodeSplitter`)
// - `assemble` - Code reconstruction from bands
// - `reader`   - Unpack passes (`BytecodeBands`)

pub mod assemble;
pub mod bands;
pub mod insn;
pub mod offsets;
pub mod opcodes;
pub mod reader;
pub mod split;

use std::io::Read;
use std::ops::Range;

use crate::classfile::{
    ClassStructure, CodeAttribute, ConstantPool, ExceptionHandler, RefKind,
};
use crate::codec::{BandReader, BandWriter};
use crate::error::{PackError, Result};

pub use bands::{BandKind, BandSizes, OperandBands};
pub use reader::BytecodeBands;
pub use split::BytecodeSplitter;

use opcodes::{END_MARKER, Owner};

/// Handling of packed opcodes with no known operand layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UnknownOpcodePolicy {
    /// Log a warning and treat the opcode as taking no operands.
    #[default]
    Warn,
    /// Fail with `PackError::UnknownOpcode`.
    Reject,
}

/// Code metadata carried outside the bytecode bands. Positions in the
/// exception table and attributes are instruction indices.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CodeHeader {
    pub max_stack: u16,
    /// `max_locals` minus the receiver and parameter slots.
    pub max_na_locals: i32,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeAttribute>,
}

// ---------------------------------------------------------------------------
// Packed code arena
// ---------------------------------------------------------------------------

/// Packed code of every coded method in a segment, addressed by
/// `(class, method)` where `method` counts coded methods only.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MethodCodes {
    bytes: Vec<u8>,
    methods: Vec<Range<usize>>,
    classes: Vec<Range<usize>>,
}

impl MethodCodes {
    /// Append one method's packed code (without end marker) to `class`.
    /// Classes are filled in order; skipped classes get no methods.
    pub fn push_method(&mut self, class: usize, code: &[u8]) {
        self.ensure_class(class);
        let start = self.bytes.len();
        self.bytes.extend_from_slice(code);
        self.methods.push(start..self.bytes.len());
        self.classes[class].end = self.methods.len();
    }

    fn ensure_class(&mut self, class: usize) {
        while self.classes.len() <= class {
            let at = self.methods.len();
            self.classes.push(at..at);
        }
    }

    pub fn get(&self, class: usize, method: usize) -> Option<&[u8]> {
        let range = self.classes.get(class)?;
        let span = self.methods.get(range.start + method)?;
        (range.start + method < range.end).then(|| &self.bytes[span.clone()])
    }

    pub fn class_len(&self, class: usize) -> usize {
        self.classes.get(class).map_or(0, |r| r.len())
    }

    /// Every method in segment order.
    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.methods.iter().map(|r| &self.bytes[r.clone()])
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Packed bytes, end markers excluded.
    pub fn total_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// `bc_codes`: every method followed by the end marker.
    pub fn write(&self, w: &mut BandWriter) {
        for method in self.iter() {
            w.write_bytes(method);
            w.write_bytes(&[END_MARKER]);
        }
    }

    /// Pass 1: read `coded[c]` methods for each class `c`.
    pub fn read<R: Read>(r: &mut BandReader<'_, R>, coded: &[usize]) -> Result<Self> {
        let mut out = Self::default();
        let mut code = Vec::new();
        for (class, &n) in coded.iter().enumerate() {
            out.ensure_class(class);
            for _ in 0..n {
                code.clear();
                loop {
                    let b = r.read_byte()?;
                    if b == END_MARKER {
                        break;
                    }
                    code.push(b);
                }
                out.push_method(class, &code);
            }
        }
        log::debug!(
            "bc_codes: {} methods, {} bytes",
            out.method_count(),
            out.total_bytes() + out.method_count()
        );
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Class reference context
// ---------------------------------------------------------------------------

/// Member references a class can name by ordinal: fields and methods owned
/// by the class itself or its super class, and `<init>` methods.
#[derive(Debug)]
pub(crate) struct ClassContext<'c> {
    pub pool: &'c ConstantPool,
    this_fields: Vec<u16>,
    this_methods: Vec<u16>,
    this_inits: Vec<u16>,
    super_fields: Vec<u16>,
    super_methods: Vec<u16>,
    super_inits: Vec<u16>,
}

impl<'c> ClassContext<'c> {
    pub fn new(class: &'c ClassStructure) -> Result<Self> {
        let pool = &class.constant_pool;
        let this = class.this_name()?;
        let owned = |owner: Option<&[u8]>, kind, init| {
            owner.map_or_else(Vec::new, |o| pool.owned_refs(kind, o, init))
        };
        let sup = class.super_name()?;
        Ok(Self {
            pool,
            this_fields: owned(Some(this), RefKind::Field, false),
            this_methods: owned(Some(this), RefKind::Method, false),
            this_inits: owned(Some(this), RefKind::Method, true),
            super_fields: owned(sup, RefKind::Field, false),
            super_methods: owned(sup, RefKind::Method, false),
            super_inits: owned(sup, RefKind::Method, true),
        })
    }

    pub fn members(&self, owner: Owner, field: bool) -> &[u16] {
        match (owner, field) {
            (Owner::This, true) => &self.this_fields,
            (Owner::This, false) => &self.this_methods,
            (Owner::Super, true) => &self.super_fields,
            (Owner::Super, false) => &self.super_methods,
        }
    }

    pub fn inits(&self, owner: Owner) -> &[u16] {
        match owner {
            Owner::This => &self.this_inits,
            Owner::Super => &self.super_inits,
        }
    }

    /// `<init>` references of the class named by the Class entry `class`.
    pub fn new_inits(&self, class: u16) -> Result<Vec<u16>> {
        let name = self.pool.class_name(class)?;
        Ok(self.pool.owned_refs(RefKind::Method, name, true))
    }
}

/// Ordinal of `index` within `list`.
pub(crate) fn ordinal(list: &[u16], index: u16) -> Option<i32> {
    list.binary_search(&index).ok().map(|i| i as i32)
}

/// Constant-pool index at `ordinal` within `list`.
pub(crate) fn by_ordinal(list: &[u16], ordinal: i32, band: BandKind) -> Result<u16> {
    usize::try_from(ordinal)
        .ok()
        .and_then(|i| list.get(i).copied())
        .ok_or_else(|| PackError::InvalidReference {
            band: band.name().to_string(),
            index: i64::from(ordinal),
            len: list.len(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn arena_addresses_methods_by_class() {
        let mut codes = MethodCodes::default();
        codes.push_method(0, &[1, 2]);
        codes.push_method(2, &[3]);
        codes.push_method(2, &[]);
        assert_eq!(codes.get(0, 0), Some(&[1u8, 2][..]));
        assert_eq!(codes.get(0, 1), None);
        assert_eq!(codes.class_len(1), 0);
        assert_eq!(codes.get(2, 0), Some(&[3u8][..]));
        assert_eq!(codes.get(2, 1), Some(&[][..]));
        assert_eq!(codes.method_count(), 3);
        assert_eq!(codes.total_bytes(), 3);
    }

    #[test]
    fn codes_roundtrip_through_bands() {
        let mut codes = MethodCodes::default();
        codes.push_method(0, &[0x10, 0xAC]);
        codes.push_method(1, &[0xB1]);
        let mut w = BandWriter::new(0);
        codes.write(&mut w);
        let (body, headers) = w.into_parts();
        assert_eq!(body, vec![0x10, 0xAC, 0xFF, 0xB1, 0xFF]);
        let mut r = BandReader::new(Cursor::new(&body), &headers);
        let back = MethodCodes::read(&mut r, &[1, 1]).unwrap();
        assert_eq!(back, codes);
    }

    #[test]
    fn ordinals() {
        let list = [3u16, 9, 14];
        assert_eq!(ordinal(&list, 9), Some(1));
        assert_eq!(ordinal(&list, 4), None);
        assert_eq!(by_ordinal(&list, 2, BandKind::ThisField).unwrap(), 14);
        assert!(by_ordinal(&list, 3, BandKind::ThisField).is_err());
        assert!(by_ordinal(&list, -1, BandKind::ThisField).is_err());
    }
}
