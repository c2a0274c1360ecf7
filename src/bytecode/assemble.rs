// Code reconstruction from packed codes and operand bands.

use super::bands::{BandKind, OperandBands, OperandCursor};
use super::insn::{Insn, emit_code};
use super::offsets::to_offsets;
use super::opcodes::*;
use super::{ClassContext, CodeHeader, by_ordinal};
use crate::classfile::{Code, MethodInfo, param_slots};
use crate::error::{PackError, Result};

/// Operand state shared by every method of a segment: band cursors and the
/// `wide` sub-opcodes in encounter order.
#[derive(Debug)]
pub struct OperandContext {
    bands: OperandCursor,
    wide: std::vec::IntoIter<u8>,
}

impl OperandContext {
    pub fn new(bands: OperandBands, wide: Vec<u8>) -> Self {
        Self {
            bands: OperandCursor::new(bands),
            wide: wide.into_iter(),
        }
    }

    fn next(&mut self, kind: BandKind) -> Result<i32> {
        self.bands.next(kind)
    }

    fn next_wide(&mut self) -> Result<u8> {
        self.wide
            .next()
            .ok_or_else(|| PackError::mismatch("bc_codes", "more wide instructions than sizing saw"))
    }

    /// Every band value and `wide` sub-opcode must have been used.
    pub fn finish(self) -> Result<()> {
        if self.wide.len() != 0 {
            return Err(PackError::mismatch("bc_codes", "unused wide sub-opcodes"));
        }
        self.bands.finish()
    }

    fn u8(&mut self, kind: BandKind) -> Result<u8> {
        let v = self.next(kind)?;
        u8::try_from(v).map_err(|_| out_of_range(kind, v, "one byte"))
    }

    fn u16(&mut self, kind: BandKind) -> Result<u16> {
        let v = self.next(kind)?;
        u16::try_from(v).map_err(|_| out_of_range(kind, v, "two bytes"))
    }

    fn i16(&mut self, kind: BandKind) -> Result<i16> {
        let v = self.next(kind)?;
        i16::try_from(v).map_err(|_| out_of_range(kind, v, "a signed short"))
    }

    /// Instruction index `own + label`.
    fn target(&mut self, own: usize) -> Result<u32> {
        let label = self.next(BandKind::Label)?;
        u32::try_from(own as i64 + i64::from(label)).map_err(|_| {
            PackError::mismatch(
                BandKind::Label.name(),
                format!("label {label} from instruction {own} lands before the method"),
            )
        })
    }
}

fn out_of_range(kind: BandKind, v: i32, width: &str) -> PackError {
    PackError::mismatch(kind.name(), format!("value {v} does not fit {width}"))
}

/// Rebuild one method's `Code` from its packed codes.
pub(crate) fn assemble_method(
    packed: &[u8],
    header: &CodeHeader,
    method: &MethodInfo,
    ctx: &ClassContext<'_>,
    ops: &mut OperandContext,
) -> Result<Code> {
    let insns = build_insns(packed, ctx, ops)?;
    let (bytecode, table) = emit_code(&insns)?;
    if bytecode.len() > usize::from(u16::MAX) {
        return Err(PackError::malformed(format!(
            "method code of {} bytes",
            bytecode.len()
        )));
    }
    let (exception_table, attributes) =
        to_offsets(&table, &header.exception_table, &header.attributes)?;

    let descriptor = ctx.pool.utf8(method.descriptor_index)?;
    let receiver = if method.is_static() { 0 } else { 1 };
    let max_locals = header.max_na_locals + receiver + i32::from(param_slots(descriptor)?);
    let max_locals = u16::try_from(max_locals)
        .map_err(|_| PackError::malformed(format!("max_locals {max_locals} out of range")))?;

    Ok(Code {
        max_stack: header.max_stack,
        max_locals,
        bytecode,
        exception_table,
        attributes,
    })
}

fn build_insns(packed: &[u8], ctx: &ClassContext<'_>, ops: &mut OperandContext) -> Result<Vec<Insn>> {
    use BandKind::*;
    let mut insns = Vec::new();
    let mut last_new: Option<u16> = None;
    let mut i = 0;

    while i < packed.len() {
        let op = packed[i];
        i += 1;
        let own = insns.len();
        let insn = match op {
            BIPUSH | NEWARRAY => Insn::fixed(op, &[ops.u8(Byte)?]),
            SIPUSH => Insn::fixed(op, &ops.i16(Short)?.to_be_bytes()),
            21..=25 | 54..=58 | RET => Insn::fixed(op, &[ops.u8(Local)?]),
            IINC => {
                let local = ops.u8(Local)?;
                Insn::fixed(op, &[local, ops.u8(Byte)?])
            }
            WIDE => {
                let sub = ops.next_wide()?;
                if packed.get(i) != Some(&sub) {
                    return Err(PackError::mismatch("bc_codes", "wide sub-opcode changed since sizing"));
                }
                i += 1;
                let mut operands = vec![sub];
                if sub == IINC || is_wide_local(sub) {
                    operands.extend_from_slice(&ops.u16(Local)?.to_be_bytes());
                }
                if sub == IINC {
                    operands.extend_from_slice(&ops.i16(Short)?.to_be_bytes());
                }
                Insn::Fixed {
                    opcode: WIDE,
                    operands,
                }
            }
            TABLESWITCH | LOOKUPSWITCH => {
                let count = ops.next(CaseCount)?;
                let count = usize::try_from(count)
                    .map_err(|_| out_of_range(CaseCount, count, "a count"))?;
                if op == TABLESWITCH {
                    let low = ops.next(CaseValue)?;
                    let default = ops.target(own)?;
                    let targets = (0..count)
                        .map(|_| ops.target(own))
                        .collect::<Result<Vec<_>>>()?;
                    Insn::TableSwitch {
                        default,
                        low,
                        targets,
                    }
                } else {
                    let keys = (0..count)
                        .map(|_| ops.next(CaseValue))
                        .collect::<Result<Vec<_>>>()?;
                    let default = ops.target(own)?;
                    let pairs = keys
                        .into_iter()
                        .map(|k| Ok((k, ops.target(own)?)))
                        .collect::<Result<Vec<_>>>()?;
                    Insn::LookupSwitch { default, pairs }
                }
            }
            _ if is_branch(op) => Insn::Branch {
                opcode: op,
                target: ops.target(own)?,
            },
            LDC => Insn::fixed(LDC, &[narrow_index(ops, StringRef)?]),
            LDC_W => Insn::fixed(LDC_W, &ops.u16(StringRef)?.to_be_bytes()),
            LDC2_W => Insn::fixed(LDC2_W, &ops.u16(LongRef)?.to_be_bytes()),
            CLDC => Insn::fixed(LDC, &[narrow_index(ops, ClassRef)?]),
            ILDC => Insn::fixed(LDC, &[narrow_index(ops, IntRef)?]),
            FLDC => Insn::fixed(LDC, &[narrow_index(ops, FloatRef)?]),
            CLDC_W => Insn::fixed(LDC_W, &ops.u16(ClassRef)?.to_be_bytes()),
            ILDC_W => Insn::fixed(LDC_W, &ops.u16(IntRef)?.to_be_bytes()),
            FLDC_W => Insn::fixed(LDC_W, &ops.u16(FloatRef)?.to_be_bytes()),
            DLDC2_W => Insn::fixed(LDC2_W, &ops.u16(DoubleRef)?.to_be_bytes()),
            GETSTATIC..=PUTFIELD => Insn::fixed(op, &ops.u16(FieldRef)?.to_be_bytes()),
            INVOKEVIRTUAL..=INVOKESTATIC => Insn::fixed(op, &ops.u16(MethodRef)?.to_be_bytes()),
            INVOKEINTERFACE => {
                let index = ops.u16(IMethodRef)?;
                let m = ctx.pool.member_ref(index)?.ok_or_else(|| {
                    PackError::malformed(format!("invokeinterface names non-member entry {index}"))
                })?;
                let count = 1 + u32::from(param_slots(m.descriptor)?);
                let count = u8::try_from(count)
                    .map_err(|_| PackError::malformed("invokeinterface argument count overflow"))?;
                let [hi, lo] = index.to_be_bytes();
                Insn::fixed(op, &[hi, lo, count, 0])
            }
            NEW | ANEWARRAY | CHECKCAST | INSTANCEOF => {
                let index = ops.u16(ClassRef)?;
                if op == NEW {
                    last_new = Some(index);
                }
                Insn::fixed(op, &index.to_be_bytes())
            }
            MULTIANEWARRAY => {
                let [hi, lo] = ops.u16(ClassRef)?.to_be_bytes();
                Insn::fixed(op, &[hi, lo, ops.u8(Byte)?])
            }
            202..=229 => {
                let Some(form) = MemberForm::decode(op) else {
                    return Err(PackError::malformed(format!("packed opcode {op}")));
                };
                let band = form.band();
                let list = ctx.members(form.owner, form.is_field());
                let index = by_ordinal(list, ops.next(band)?, band)?;
                if form.fused {
                    insns.push(Insn::fixed(ALOAD_0, &[]));
                }
                Insn::fixed(form.jvm, &index.to_be_bytes())
            }
            INVOKESPECIAL_THIS_INIT..=INVOKESPECIAL_NEW_INIT => {
                let ordinal = ops.next(InitRef)?;
                let index = match op {
                    INVOKESPECIAL_THIS_INIT => by_ordinal(ctx.inits(Owner::This), ordinal, InitRef)?,
                    INVOKESPECIAL_SUPER_INIT => {
                        by_ordinal(ctx.inits(Owner::Super), ordinal, InitRef)?
                    }
                    _ => {
                        let class = last_new.ok_or_else(|| {
                            PackError::malformed("invokespecial_new_init before any new")
                        })?;
                        by_ordinal(&ctx.new_inits(class)?, ordinal, InitRef)?
                    }
                };
                Insn::fixed(INVOKESPECIAL, &index.to_be_bytes())
            }
            REF_ESCAPE => {
                let real = *packed.get(i).ok_or_else(|| {
                    PackError::malformed("ref_escape at end of method code")
                })?;
                i += 1;
                let index = ops.next(EscRef)?;
                match ops.next(EscRefSize)? {
                    1 => {
                        let b = u8::try_from(index)
                            .map_err(|_| out_of_range(EscRef, index, "one byte"))?;
                        Insn::fixed(real, &[b])
                    }
                    2 => {
                        let w = u16::try_from(index)
                            .map_err(|_| out_of_range(EscRef, index, "two bytes"))?;
                        Insn::fixed(real, &w.to_be_bytes())
                    }
                    n => return Err(out_of_range(EscRefSize, n, "1 or 2")),
                }
            }
            BYTE_ESCAPE => {
                let n = ops.next(EscSize)?;
                let n = usize::try_from(n).map_err(|_| out_of_range(EscSize, n, "a length"))?;
                let bytes = (0..n).map(|_| ops.u8(EscByte)).collect::<Result<Vec<_>>>()?;
                Insn::Raw(bytes)
            }
            _ => Insn::fixed(op, &[]),
        };
        insns.push(insn);
    }
    Ok(insns)
}

/// `ldc` carries a one-byte index.
fn narrow_index(ops: &mut OperandContext, kind: BandKind) -> Result<u8> {
    ops.u8(kind)
}
