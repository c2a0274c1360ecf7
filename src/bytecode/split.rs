// Pack direction: JVM bytecode to packed codes and operand bands.

use super::bands::{BandKind, OperandBands};
use super::insn::{Insn, parse_code};
use super::offsets::to_indices;
use super::opcodes::*;
use super::{ClassContext, CodeHeader, MethodCodes, ordinal};
use crate::classfile::{ClassStructure, Code, CpEntry, MethodInfo, RefKind, param_slots};
use crate::codec::BandWriter;
use crate::error::{PackError, Result};

/// Accumulates the bytecode bands of one segment.
#[derive(Debug, Default)]
pub struct BytecodeSplitter {
    codes: MethodCodes,
    bands: OperandBands,
    classes: usize,
}

/// How one JVM instruction is carried.
enum Packed {
    /// Opcode in `bc_codes` with values in the listed bands.
    Coded(u8, Vec<(BandKind, i32)>),
    /// `ref_escape`: real opcode, constant-pool index, index width.
    RefEscape(u8, u16, u8),
    /// `wide` and its sub-opcode, with the widened operands.
    Wide(u8, Vec<(BandKind, i32)>),
    /// `byte_escape` with the instruction's bytes.
    ByteEscape(Vec<u8>),
}

impl BytecodeSplitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn codes(&self) -> &MethodCodes {
        &self.codes
    }

    pub fn bands(&self) -> &OperandBands {
        &self.bands
    }

    /// Split every coded method of `class`, returning the code headers in
    /// coded-method order.
    pub fn split_class(&mut self, class: &ClassStructure) -> Result<Vec<CodeHeader>> {
        let ctx = ClassContext::new(class)?;
        let class_index = self.classes;
        self.classes += 1;

        let mut headers = Vec::new();
        let mut packed = Vec::new();
        for method in &class.methods {
            match (&method.code, method.has_code()) {
                (Some(code), true) => {
                    packed.clear();
                    headers.push(self.split_method(&ctx, method, code, &mut packed)?);
                    self.codes.push_method(class_index, &packed);
                }
                (None, false) => {}
                (Some(_), false) => {
                    return Err(PackError::malformed("abstract or native method has code"));
                }
                (None, true) => {
                    return Err(PackError::malformed("concrete method without Code attribute"));
                }
            }
        }
        Ok(headers)
    }

    fn split_method(
        &mut self,
        ctx: &ClassContext<'_>,
        method: &MethodInfo,
        code: &Code,
        out: &mut Vec<u8>,
    ) -> Result<CodeHeader> {
        let (insns, table) = parse_code(&code.bytecode)?;
        let mut last_new: Option<u16> = None;
        let mut i = 0;
        while i < insns.len() {
            let own = i as i64;
            let label = |target: u32| (i64::from(target) - own) as i32;
            match &insns[i] {
                Insn::Branch { opcode, target } => {
                    out.push(*opcode);
                    self.bands.push(BandKind::Label, label(*target));
                }
                Insn::TableSwitch {
                    default,
                    low,
                    targets,
                } => {
                    out.push(TABLESWITCH);
                    self.bands.push(BandKind::CaseCount, targets.len() as i32);
                    self.bands.push(BandKind::CaseValue, *low);
                    self.bands.push(BandKind::Label, label(*default));
                    for &t in targets {
                        self.bands.push(BandKind::Label, label(t));
                    }
                }
                Insn::LookupSwitch { default, pairs } => {
                    out.push(LOOKUPSWITCH);
                    self.bands.push(BandKind::CaseCount, pairs.len() as i32);
                    for &(key, _) in pairs {
                        self.bands.push(BandKind::CaseValue, key);
                    }
                    self.bands.push(BandKind::Label, label(*default));
                    for &(_, t) in pairs {
                        self.bands.push(BandKind::Label, label(t));
                    }
                }
                Insn::Fixed { opcode, operands } => {
                    let fused = match (opcode, insns.get(i + 1)) {
                        (&ALOAD_0, Some(Insn::Fixed { opcode, operands })) => {
                            fusable_member(ctx, *opcode, operands)?
                        }
                        _ => None,
                    };
                    let packed = match fused {
                        Some((mut form, n)) => {
                            i += 1;
                            form.fused = true;
                            Packed::Coded(form.encode(), vec![(form.band(), n)])
                        }
                        None => classify(ctx, *opcode, operands, &mut last_new)?,
                    };
                    self.emit(packed, out);
                }
                Insn::Raw(bytes) => self.emit(Packed::ByteEscape(bytes.clone()), out),
            }
            i += 1;
        }

        let (exception_table, attributes) =
            to_indices(&table, &code.exception_table, &code.attributes)?;
        let descriptor = ctx.pool.utf8(method.descriptor_index)?;
        let receiver = if method.is_static() { 0 } else { 1 };
        Ok(CodeHeader {
            max_stack: code.max_stack,
            max_na_locals: i32::from(code.max_locals)
                - receiver
                - i32::from(param_slots(descriptor)?),
            exception_table,
            attributes,
        })
    }

    fn emit(&mut self, packed: Packed, out: &mut Vec<u8>) {
        match packed {
            Packed::Coded(op, values) => {
                out.push(op);
                for (kind, v) in values {
                    self.bands.push(kind, v);
                }
            }
            Packed::Wide(sub, values) => {
                out.push(WIDE);
                out.push(sub);
                for (kind, v) in values {
                    self.bands.push(kind, v);
                }
            }
            Packed::RefEscape(op, index, size) => {
                out.push(REF_ESCAPE);
                out.push(op);
                self.bands.push(BandKind::EscRef, i32::from(index));
                self.bands.push(BandKind::EscRefSize, i32::from(size));
            }
            Packed::ByteEscape(bytes) => {
                out.push(BYTE_ESCAPE);
                self.bands.push(BandKind::EscSize, bytes.len() as i32);
                for b in bytes {
                    self.bands.push(BandKind::EscByte, i32::from(b));
                }
            }
        }
    }

    /// Write `bc_codes` and the 24 operand bands.
    pub fn write(&self, w: &mut BandWriter) -> Result<()> {
        log::debug!(
            "bytecode: {} methods in {} classes, {} packed bytes",
            self.codes.method_count(),
            self.classes,
            self.codes.total_bytes()
        );
        self.codes.write(w);
        self.bands.write(w)
    }
}

// ---------------------------------------------------------------------------
// Instruction classification
// ---------------------------------------------------------------------------

fn u16_at(operands: &[u8], at: usize) -> u16 {
    u16::from_be_bytes([operands[at], operands[at + 1]])
}

/// A field or method instruction naming a member of this class or its super
/// class, other than an `<init>` call: its form and ordinal.
fn fusable_member(
    ctx: &ClassContext<'_>,
    opcode: u8,
    operands: &[u8],
) -> Result<Option<(MemberForm, i32)>> {
    if !(GETSTATIC..=INVOKESTATIC).contains(&opcode) {
        return Ok(None);
    }
    let index = u16_at(operands, 0);
    let Some(m) = ctx.pool.member_ref(index)? else {
        return Ok(None);
    };
    let field = opcode <= PUTFIELD;
    let kind_ok = if field {
        m.kind == RefKind::Field
    } else {
        m.kind == RefKind::Method
    };
    if !kind_ok || m.name == b"<init>" {
        return Ok(None);
    }
    for owner in [Owner::This, Owner::Super] {
        if let Some(n) = ordinal(ctx.members(owner, field), index) {
            let form = MemberForm {
                owner,
                fused: false,
                jvm: opcode,
            };
            return Ok(Some((form, n)));
        }
    }
    Ok(None)
}

fn classify(
    ctx: &ClassContext<'_>,
    opcode: u8,
    operands: &[u8],
    last_new: &mut Option<u16>,
) -> Result<Packed> {
    use BandKind::*;
    let pool = ctx.pool;
    let raw = || {
        let mut bytes = vec![opcode];
        bytes.extend_from_slice(operands);
        Packed::ByteEscape(bytes)
    };
    let one = |kind: BandKind, v: i32| Packed::Coded(opcode, vec![(kind, v)]);

    Ok(match opcode {
        BIPUSH | NEWARRAY => one(Byte, i32::from(operands[0])),
        SIPUSH => one(Short, i32::from(u16_at(operands, 0) as i16)),
        21..=25 | 54..=58 | RET => one(Local, i32::from(operands[0])),
        IINC => Packed::Coded(
            IINC,
            vec![(Local, i32::from(operands[0])), (Byte, i32::from(operands[1]))],
        ),
        WIDE => {
            let sub = operands[0];
            let mut values = vec![(Local, i32::from(u16_at(operands, 1)))];
            if sub == IINC {
                values.push((Short, i32::from(u16_at(operands, 3) as i16)));
            }
            Packed::Wide(sub, values)
        }
        LDC | LDC_W | LDC2_W => {
            let index = if opcode == LDC {
                u16::from(operands[0])
            } else {
                u16_at(operands, 0)
            };
            let narrow = opcode == LDC;
            let (op, kind) = match (pool.get(index)?, opcode) {
                (CpEntry::String(_), LDC | LDC_W) => (opcode, StringRef),
                (CpEntry::Integer(_), _) if opcode != LDC2_W => (pick(narrow, ILDC, ILDC_W), IntRef),
                (CpEntry::Float(_), _) if opcode != LDC2_W => (pick(narrow, FLDC, FLDC_W), FloatRef),
                (CpEntry::Class(_), _) if opcode != LDC2_W => (pick(narrow, CLDC, CLDC_W), ClassRef),
                (CpEntry::Long(_), LDC2_W) => (LDC2_W, LongRef),
                (CpEntry::Double(_), LDC2_W) => (DLDC2_W, DoubleRef),
                _ => return Ok(Packed::RefEscape(opcode, index, if narrow { 1 } else { 2 })),
            };
            Packed::Coded(op, vec![(kind, i32::from(index))])
        }
        GETSTATIC..=INVOKESTATIC => {
            if let Some((form, n)) = fusable_member(ctx, opcode, operands)? {
                return Ok(Packed::Coded(form.encode(), vec![(form.band(), n)]));
            }
            let index = u16_at(operands, 0);
            let m = pool.member_ref(index)?.ok_or_else(|| {
                PackError::malformed(format!("opcode {opcode} names non-member entry {index}"))
            })?;
            let field = opcode <= PUTFIELD;
            match m.kind {
                RefKind::Field if field => one(FieldRef, i32::from(index)),
                RefKind::Method if !field => {
                    if opcode == INVOKESPECIAL && m.name == b"<init>" {
                        init_form(ctx, index, *last_new)?
                            .unwrap_or_else(|| one(MethodRef, i32::from(index)))
                    } else {
                        one(MethodRef, i32::from(index))
                    }
                }
                RefKind::InterfaceMethod if matches!(opcode, INVOKESPECIAL | INVOKESTATIC) => {
                    Packed::RefEscape(opcode, index, 2)
                }
                _ => {
                    return Err(PackError::malformed(format!(
                        "opcode {opcode} names a mismatched member entry {index}"
                    )));
                }
            }
        }
        INVOKEINTERFACE => {
            let index = u16_at(operands, 0);
            match pool.member_ref(index)? {
                Some(m)
                    if m.kind == RefKind::InterfaceMethod
                        && operands[3] == 0
                        && u32::from(operands[2])
                            == 1 + u32::from(param_slots(m.descriptor)?) =>
                {
                    one(IMethodRef, i32::from(index))
                }
                _ => raw(),
            }
        }
        NEW | ANEWARRAY | CHECKCAST | INSTANCEOF | MULTIANEWARRAY => {
            let index = u16_at(operands, 0);
            pool.class_name(index)?;
            if opcode == NEW {
                *last_new = Some(index);
            }
            let mut values = vec![(ClassRef, i32::from(index))];
            if opcode == MULTIANEWARRAY {
                values.push((Byte, i32::from(operands[2])));
            }
            Packed::Coded(opcode, values)
        }
        INVOKEDYNAMIC | BREAKPOINT | IMPDEP1 | IMPDEP2 => raw(),
        _ => Packed::Coded(opcode, Vec::new()),
    })
}

fn pick(narrow: bool, short: u8, wide: u8) -> u8 {
    if narrow { short } else { wide }
}

/// `invokespecial <init>` on this class, the super class, or the class of
/// the most recent `new`, in that order of preference.
fn init_form(ctx: &ClassContext<'_>, index: u16, last_new: Option<u16>) -> Result<Option<Packed>> {
    let coded = |op: u8, n: i32| Some(Packed::Coded(op, vec![(BandKind::InitRef, n)]));
    if let Some(n) = ordinal(ctx.inits(Owner::This), index) {
        return Ok(coded(INVOKESPECIAL_THIS_INIT, n));
    }
    if let Some(n) = ordinal(ctx.inits(Owner::Super), index) {
        return Ok(coded(INVOKESPECIAL_SUPER_INIT, n));
    }
    if let Some(class) = last_new {
        if let Some(n) = ordinal(&ctx.new_inits(class)?, index) {
            return Ok(coded(INVOKESPECIAL_NEW_INIT, n));
        }
    }
    Ok(None)
}
