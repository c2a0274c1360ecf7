// JVM instructions addressed by instruction index.
//
// `parse_code` turns bytecode into instructions whose branch targets are
// instruction indices; `emit_code` lays instructions out again, resolving
// targets to byte offsets and inserting switch padding.

use super::opcodes::{
    GOTO_W, IINC, JSR_W, LOOKUPSWITCH, TABLESWITCH, WIDE, is_branch, is_wide_local,
    jvm_operand_len,
};
use crate::error::{PackError, Result};

/// One instruction. Targets are instruction indices within the method.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Insn {
    /// Opcode followed by its operand bytes. `wide` forms keep the
    /// sub-opcode as the first operand byte.
    Fixed { opcode: u8, operands: Vec<u8> },
    Branch { opcode: u8, target: u32 },
    TableSwitch {
        default: u32,
        low: i32,
        targets: Vec<u32>,
    },
    LookupSwitch { default: u32, pairs: Vec<(i32, u32)> },
    /// A whole instruction carried verbatim.
    Raw(Vec<u8>),
}

impl Insn {
    pub fn fixed(opcode: u8, operands: &[u8]) -> Self {
        Insn::Fixed {
            opcode,
            operands: operands.to_vec(),
        }
    }

    pub fn opcode(&self) -> u8 {
        match self {
            Insn::Fixed { opcode, .. } | Insn::Branch { opcode, .. } => *opcode,
            Insn::TableSwitch { .. } => TABLESWITCH,
            Insn::LookupSwitch { .. } => LOOKUPSWITCH,
            Insn::Raw(bytes) => bytes.first().copied().unwrap_or(0),
        }
    }

    /// Encoded size when the instruction starts at byte offset `at`.
    pub fn size(&self, at: u32) -> u32 {
        match self {
            Insn::Fixed { operands, .. } => 1 + operands.len() as u32,
            Insn::Branch { opcode, .. } => {
                if matches!(*opcode, GOTO_W | JSR_W) {
                    5
                } else {
                    3
                }
            }
            Insn::TableSwitch { targets, .. } => 1 + switch_pad(at) + 12 + 4 * targets.len() as u32,
            Insn::LookupSwitch { pairs, .. } => 1 + switch_pad(at) + 8 + 8 * pairs.len() as u32,
            Insn::Raw(bytes) => bytes.len() as u32,
        }
    }
}

/// Zero bytes between a switch opcode at `at` and its 4-byte aligned operands.
pub fn switch_pad(at: u32) -> u32 {
    (4 - (at + 1) % 4) % 4
}

// ---------------------------------------------------------------------------
// Offset table
// ---------------------------------------------------------------------------

/// Byte offset of every instruction, plus the code length.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct OffsetTable {
    starts: Vec<u32>,
    end: u32,
}

impl OffsetTable {
    pub fn new(starts: Vec<u32>, end: u32) -> Self {
        Self { starts, end }
    }

    /// Number of instructions.
    pub fn len(&self) -> usize {
        self.starts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.starts.is_empty()
    }

    pub fn code_len(&self) -> u32 {
        self.end
    }

    /// Byte offset of instruction `index`; `len()` maps to the code length.
    pub fn offset(&self, index: u32) -> Result<u32> {
        let i = index as usize;
        if i == self.starts.len() {
            return Ok(self.end);
        }
        self.starts.get(i).copied().ok_or_else(|| {
            PackError::malformed(format!(
                "instruction index {index} outside 0..={}",
                self.starts.len()
            ))
        })
    }

    /// Instruction index starting at byte `offset`; the code length maps to
    /// `len()`.
    pub fn index_of(&self, offset: u32) -> Result<u32> {
        if offset == self.end {
            return Ok(self.starts.len() as u32);
        }
        self.starts
            .binary_search(&offset)
            .map(|i| i as u32)
            .map_err(|_| {
                PackError::malformed(format!("byte offset {offset} is not an instruction boundary"))
            })
    }

    /// Like [`OffsetTable::offset`] but rejects the end position.
    fn target(&self, index: u32) -> Result<u32> {
        if index as usize >= self.starts.len() {
            return Err(PackError::malformed(format!(
                "branch target {index} outside 0..{}",
                self.starts.len()
            )));
        }
        self.offset(index)
    }
}

// ---------------------------------------------------------------------------
// Parsing
// ---------------------------------------------------------------------------

struct Bytes<'a> {
    code: &'a [u8],
    pc: usize,
}

impl<'a> Bytes<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self.pc + n;
        let out = self.code.get(self.pc..end).ok_or_else(|| {
            PackError::malformed(format!("instruction at {} runs past the code end", self.pc))
        })?;
        self.pc = end;
        Ok(out)
    }

    fn i32(&mut self) -> Result<i32> {
        let b = self.take(4)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }
}

fn relative(at: u32, delta: i32) -> Result<u32> {
    u32::try_from(i64::from(at) + i64::from(delta))
        .map_err(|_| PackError::malformed(format!("branch from {at} to before the code start")))
}

/// Decode method bytecode. Branch targets come back as instruction indices.
pub fn parse_code(code: &[u8]) -> Result<(Vec<Insn>, OffsetTable)> {
    let mut insns = Vec::new();
    let mut starts = Vec::new();
    let mut b = Bytes { code, pc: 0 };

    while b.pc < code.len() {
        let at = b.pc as u32;
        starts.push(at);
        let opcode = b.take(1)?[0];
        let insn = match opcode {
            TABLESWITCH | LOOKUPSWITCH => {
                if b.take(switch_pad(at) as usize)?.iter().any(|&x| x != 0) {
                    return Err(PackError::malformed(format!(
                        "switch at {at} has nonzero padding"
                    )));
                }
                let default = relative(at, b.i32()?)?;
                if opcode == TABLESWITCH {
                    let low = b.i32()?;
                    let high = b.i32()?;
                    let n = i64::from(high) - i64::from(low) + 1;
                    if n < 0 || n as usize > code.len() / 4 {
                        return Err(PackError::malformed(format!(
                            "tableswitch at {at} with range {low}..={high}"
                        )));
                    }
                    let targets = (0..n)
                        .map(|_| relative(at, b.i32()?))
                        .collect::<Result<Vec<_>>>()?;
                    Insn::TableSwitch {
                        default,
                        low,
                        targets,
                    }
                } else {
                    let n = b.i32()?;
                    if n < 0 || n as usize > code.len() / 8 {
                        return Err(PackError::malformed(format!(
                            "lookupswitch at {at} with {n} pairs"
                        )));
                    }
                    let pairs = (0..n)
                        .map(|_| Ok((b.i32()?, relative(at, b.i32()?)?)))
                        .collect::<Result<Vec<_>>>()?;
                    Insn::LookupSwitch { default, pairs }
                }
            }
            WIDE => {
                let sub = b.take(1)?[0];
                let n = if sub == IINC {
                    4
                } else if is_wide_local(sub) {
                    2
                } else {
                    return Err(PackError::malformed(format!(
                        "wide at {at} modifies opcode {sub}"
                    )));
                };
                let mut operands = vec![sub];
                operands.extend_from_slice(b.take(n)?);
                Insn::Fixed { opcode, operands }
            }
            _ if is_branch(opcode) => {
                let delta = if matches!(opcode, GOTO_W | JSR_W) {
                    b.i32()?
                } else {
                    let x = b.take(2)?;
                    i32::from(i16::from_be_bytes([x[0], x[1]]))
                };
                Insn::Branch {
                    opcode,
                    target: relative(at, delta)?,
                }
            }
            _ => {
                let n = jvm_operand_len(opcode).ok_or_else(|| {
                    PackError::malformed(format!("undefined opcode {opcode} at {at}"))
                })?;
                Insn::fixed(opcode, b.take(n)?)
            }
        };
        insns.push(insn);
    }

    let table = OffsetTable::new(starts, code.len() as u32);
    for insn in &mut insns {
        match insn {
            Insn::Branch { target, .. } => *target = table.index_of(*target)?,
            Insn::TableSwitch {
                default, targets, ..
            } => {
                *default = table.index_of(*default)?;
                for t in targets {
                    *t = table.index_of(*t)?;
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                *default = table.index_of(*default)?;
                for (_, t) in pairs {
                    *t = table.index_of(*t)?;
                }
            }
            Insn::Fixed { .. } | Insn::Raw(_) => {}
        }
    }
    Ok((insns, table))
}

// ---------------------------------------------------------------------------
// Emission
// ---------------------------------------------------------------------------

/// Lay out instructions and encode them.
pub fn emit_code(insns: &[Insn]) -> Result<(Vec<u8>, OffsetTable)> {
    let mut starts = Vec::with_capacity(insns.len());
    let mut pc = 0u32;
    for insn in insns {
        starts.push(pc);
        pc = pc
            .checked_add(insn.size(pc))
            .ok_or_else(|| PackError::malformed("method code too long"))?;
    }
    let table = OffsetTable::new(starts, pc);

    let mut out = Vec::with_capacity(pc as usize);
    for (insn, at) in insns.iter().zip(table.starts.iter().copied()) {
        let rel = |index: u32| -> Result<i32> {
            let to = table.target(index)?;
            i32::try_from(i64::from(to) - i64::from(at))
                .map_err(|_| PackError::malformed("branch offset overflow"))
        };
        match insn {
            Insn::Fixed { opcode, operands } => {
                out.push(*opcode);
                out.extend_from_slice(operands);
            }
            Insn::Branch { opcode, target } => {
                out.push(*opcode);
                let delta = rel(*target)?;
                if matches!(*opcode, GOTO_W | JSR_W) {
                    out.extend_from_slice(&delta.to_be_bytes());
                } else {
                    let short = i16::try_from(delta).map_err(|_| {
                        PackError::malformed(format!("branch offset {delta} at {at} needs a wide form"))
                    })?;
                    out.extend_from_slice(&short.to_be_bytes());
                }
            }
            Insn::TableSwitch {
                default,
                low,
                targets,
            } => {
                out.push(TABLESWITCH);
                out.resize(out.len() + switch_pad(at) as usize, 0);
                out.extend_from_slice(&rel(*default)?.to_be_bytes());
                let high = i64::from(*low) + targets.len() as i64 - 1;
                let high = i32::try_from(high)
                    .map_err(|_| PackError::malformed("tableswitch range overflow"))?;
                out.extend_from_slice(&low.to_be_bytes());
                out.extend_from_slice(&high.to_be_bytes());
                for &t in targets {
                    out.extend_from_slice(&rel(t)?.to_be_bytes());
                }
            }
            Insn::LookupSwitch { default, pairs } => {
                out.push(LOOKUPSWITCH);
                out.resize(out.len() + switch_pad(at) as usize, 0);
                out.extend_from_slice(&rel(*default)?.to_be_bytes());
                out.extend_from_slice(&(pairs.len() as i32).to_be_bytes());
                for &(key, t) in pairs {
                    out.extend_from_slice(&key.to_be_bytes());
                    out.extend_from_slice(&rel(t)?.to_be_bytes());
                }
            }
            Insn::Raw(bytes) => out.extend_from_slice(bytes),
        }
    }
    Ok((out, table))
}
