// Opcode tables for JVM bytecode and the packed instruction stream.
//
// The packed stream reuses JVM opcodes 0..=201 for instructions that keep
// their meaning and assigns 202..=239 and 253..=255 to packed-only forms.

use super::bands::BandKind;

// ---------------------------------------------------------------------------
// JVM opcodes
// ---------------------------------------------------------------------------

pub const ALOAD_0: u8 = 42;
pub const BIPUSH: u8 = 16;
pub const SIPUSH: u8 = 17;
pub const LDC: u8 = 18;
pub const LDC_W: u8 = 19;
pub const LDC2_W: u8 = 20;
pub const IINC: u8 = 132;
pub const GOTO: u8 = 167;
pub const JSR: u8 = 168;
pub const RET: u8 = 169;
pub const TABLESWITCH: u8 = 170;
pub const LOOKUPSWITCH: u8 = 171;
pub const GETSTATIC: u8 = 178;
pub const PUTFIELD: u8 = 181;
pub const INVOKEVIRTUAL: u8 = 182;
pub const INVOKESPECIAL: u8 = 183;
pub const INVOKESTATIC: u8 = 184;
pub const INVOKEINTERFACE: u8 = 185;
pub const INVOKEDYNAMIC: u8 = 186;
pub const NEW: u8 = 187;
pub const NEWARRAY: u8 = 188;
pub const ANEWARRAY: u8 = 189;
pub const CHECKCAST: u8 = 192;
pub const INSTANCEOF: u8 = 193;
pub const WIDE: u8 = 196;
pub const MULTIANEWARRAY: u8 = 197;
pub const IFNULL: u8 = 198;
pub const IFNONNULL: u8 = 199;
pub const GOTO_W: u8 = 200;
pub const JSR_W: u8 = 201;
pub const BREAKPOINT: u8 = 202;
pub const IMPDEP1: u8 = 254;
pub const IMPDEP2: u8 = 255;

// ---------------------------------------------------------------------------
// Packed-only opcodes
// ---------------------------------------------------------------------------

/// `getstatic_this` .. `invokestatic_this`.
pub const THIS_BASE: u8 = 202;
/// `aload_0` fused with a `_this` form.
pub const ALOAD_THIS_BASE: u8 = 209;
pub const SUPER_BASE: u8 = 216;
pub const ALOAD_SUPER_BASE: u8 = 223;
pub const INVOKESPECIAL_THIS_INIT: u8 = 230;
pub const INVOKESPECIAL_SUPER_INIT: u8 = 231;
pub const INVOKESPECIAL_NEW_INIT: u8 = 232;
pub const CLDC: u8 = 233;
pub const ILDC: u8 = 234;
pub const FLDC: u8 = 235;
pub const CLDC_W: u8 = 236;
pub const ILDC_W: u8 = 237;
pub const FLDC_W: u8 = 238;
pub const DLDC2_W: u8 = 239;
/// Followed in the code stream by the real opcode; operand is a raw
/// constant-pool index.
pub const REF_ESCAPE: u8 = 253;
/// The whole instruction is carried as raw bytes.
pub const BYTE_ESCAPE: u8 = 254;
pub const END_MARKER: u8 = 255;

// ---------------------------------------------------------------------------
// Member forms
// ---------------------------------------------------------------------------

/// Class owning the member referenced by a specialized form.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Owner {
    This,
    Super,
}

/// Decoded `_this`/`_super` packed opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberForm {
    pub owner: Owner,
    /// Preceded by an implicit `aload_0`.
    pub fused: bool,
    /// JVM opcode, `getstatic` .. `invokestatic`.
    pub jvm: u8,
}

impl MemberForm {
    pub fn decode(op: u8) -> Option<Self> {
        let (owner, fused, base) = match op {
            202..=208 => (Owner::This, false, THIS_BASE),
            209..=215 => (Owner::This, true, ALOAD_THIS_BASE),
            216..=222 => (Owner::Super, false, SUPER_BASE),
            223..=229 => (Owner::Super, true, ALOAD_SUPER_BASE),
            _ => return None,
        };
        Some(Self {
            owner,
            fused,
            jvm: GETSTATIC + (op - base),
        })
    }

    pub fn encode(self) -> u8 {
        let base = match (self.owner, self.fused) {
            (Owner::This, false) => THIS_BASE,
            (Owner::This, true) => ALOAD_THIS_BASE,
            (Owner::Super, false) => SUPER_BASE,
            (Owner::Super, true) => ALOAD_SUPER_BASE,
        };
        base + (self.jvm - GETSTATIC)
    }

    pub fn is_field(self) -> bool {
        self.jvm <= PUTFIELD
    }

    pub fn band(self) -> BandKind {
        match (self.owner, self.is_field()) {
            (Owner::This, true) => BandKind::ThisField,
            (Owner::This, false) => BandKind::ThisMethod,
            (Owner::Super, true) => BandKind::SuperField,
            (Owner::Super, false) => BandKind::SuperMethod,
        }
    }
}

// ---------------------------------------------------------------------------
// JVM instruction lengths
// ---------------------------------------------------------------------------

/// Operand byte count of a fixed-length JVM instruction. `None` for
/// switches, `wide`, and opcodes with no defined layout.
pub fn jvm_operand_len(op: u8) -> Option<usize> {
    Some(match op {
        0..=15 | 26..=53 | 59..=131 | 133..=152 | 172..=177 | 190 | 191 | 194 | 195 => 0,
        BIPUSH | LDC | 21..=25 | 54..=58 | RET | NEWARRAY => 1,
        SIPUSH | LDC_W | LDC2_W | IINC | 153..=168 | GETSTATIC..=INVOKESTATIC | NEW | ANEWARRAY
        | CHECKCAST | INSTANCEOF | IFNULL | IFNONNULL => 2,
        MULTIANEWARRAY => 3,
        INVOKEINTERFACE | INVOKEDYNAMIC | GOTO_W | JSR_W => 4,
        BREAKPOINT | IMPDEP1 | IMPDEP2 => 0,
        _ => return None,
    })
}

pub fn is_branch(op: u8) -> bool {
    matches!(op, 153..=168 | IFNULL | IFNONNULL | GOTO_W | JSR_W)
}

/// Sub-opcodes allowed after `wide`.
pub fn is_wide_local(op: u8) -> bool {
    matches!(op, 21..=25 | 54..=58 | RET)
}

// ---------------------------------------------------------------------------
// Packed operand layout
// ---------------------------------------------------------------------------

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SwitchKind {
    Table,
    Lookup,
}

/// Band contributions of a packed opcode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PackedShape {
    /// One value in each listed band.
    Bands(&'static [BandKind]),
    Switch(SwitchKind),
    /// Sub-opcode follows in the code stream.
    Wide,
    /// Escaped opcode follows in the code stream.
    RefEscape,
    ByteEscape,
}

const NONE: &[BandKind] = &[];

/// Classify a packed opcode. `None` for opcodes with no packed meaning.
pub fn packed_shape(op: u8) -> Option<PackedShape> {
    use BandKind::*;
    let bands: &'static [BandKind] = match op {
        0..=15 | 26..=53 | 59..=131 | 133..=152 | 172..=177 | 190 | 191 | 194 | 195 => NONE,
        BIPUSH | NEWARRAY => &[Byte],
        SIPUSH => &[Short],
        LDC | LDC_W => &[StringRef],
        LDC2_W => &[LongRef],
        IINC => &[Local, Byte],
        RET => &[Local],
        TABLESWITCH => return Some(PackedShape::Switch(SwitchKind::Table)),
        LOOKUPSWITCH => return Some(PackedShape::Switch(SwitchKind::Lookup)),
        GETSTATIC..=PUTFIELD => &[FieldRef],
        INVOKEVIRTUAL..=INVOKESTATIC => &[MethodRef],
        INVOKEINTERFACE => &[IMethodRef],
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF | CLDC | CLDC_W => &[ClassRef],
        MULTIANEWARRAY => &[ClassRef, Byte],
        WIDE => return Some(PackedShape::Wide),
        GOTO | JSR | GOTO_W | JSR_W => &[Label],
        202..=229 => match MemberForm::decode(op).map(MemberForm::band) {
            Some(ThisField) => &[ThisField],
            Some(ThisMethod) => &[ThisMethod],
            Some(SuperField) => &[SuperField],
            _ => &[SuperMethod],
        },
        INVOKESPECIAL_THIS_INIT..=INVOKESPECIAL_NEW_INIT => &[InitRef],
        ILDC | ILDC_W => &[IntRef],
        FLDC | FLDC_W => &[FloatRef],
        DLDC2_W => &[DoubleRef],
        REF_ESCAPE => return Some(PackedShape::RefEscape),
        BYTE_ESCAPE => return Some(PackedShape::ByteEscape),
        // Indexed loads/stores and conditional branches by range.
        21..=25 | 54..=58 => &[Local],
        153..=166 | IFNULL | IFNONNULL => &[Label],
        _ => return None,
    };
    Some(PackedShape::Bands(bands))
}
