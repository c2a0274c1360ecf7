// Renumbering of offset-bearing code metadata.
//
// In a segment, exception handlers, line numbers and local variable ranges
// refer to instruction indices. Class files use byte offsets. A local
// variable's `length` spans from its start to `start + length` in the same
// unit.

use super::insn::OffsetTable;
use crate::classfile::{CodeAttribute, ExceptionHandler, LineNumber, LocalVariable};
use crate::error::{PackError, Result};

/// Byte offsets to instruction indices.
pub fn to_indices(
    table: &OffsetTable,
    handlers: &[ExceptionHandler],
    attributes: &[CodeAttribute],
) -> Result<(Vec<ExceptionHandler>, Vec<CodeAttribute>)> {
    remap(handlers, attributes, |offset| table.index_of(offset))
}

/// Instruction indices to byte offsets.
pub fn to_offsets(
    table: &OffsetTable,
    handlers: &[ExceptionHandler],
    attributes: &[CodeAttribute],
) -> Result<(Vec<ExceptionHandler>, Vec<CodeAttribute>)> {
    remap(handlers, attributes, |index| table.offset(index))
}

fn remap(
    handlers: &[ExceptionHandler],
    attributes: &[CodeAttribute],
    map: impl Fn(u32) -> Result<u32>,
) -> Result<(Vec<ExceptionHandler>, Vec<CodeAttribute>)> {
    let at = |pos: u16| -> Result<u16> { narrow(map(u32::from(pos))?) };

    let handlers = handlers
        .iter()
        .map(|h| {
            Ok(ExceptionHandler {
                start_pc: at(h.start_pc)?,
                end_pc: at(h.end_pc)?,
                handler_pc: at(h.handler_pc)?,
                catch_type: h.catch_type,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let locals = |entries: &[LocalVariable]| -> Result<Vec<LocalVariable>> {
        entries
            .iter()
            .map(|v| {
                let start = map(u32::from(v.start_pc))?;
                let end = map(u32::from(v.start_pc) + u32::from(v.length))?;
                Ok(LocalVariable {
                    start_pc: narrow(start)?,
                    length: narrow(end.checked_sub(start).ok_or_else(|| {
                        PackError::malformed("local variable range ends before it starts")
                    })?)?,
                    ..*v
                })
            })
            .collect()
    };

    let attributes = attributes
        .iter()
        .map(|a| {
            Ok(match a {
                CodeAttribute::LineNumberTable {
                    name_index,
                    entries,
                } => CodeAttribute::LineNumberTable {
                    name_index: *name_index,
                    entries: entries
                        .iter()
                        .map(|e| {
                            Ok(LineNumber {
                                start_pc: at(e.start_pc)?,
                                line_number: e.line_number,
                            })
                        })
                        .collect::<Result<_>>()?,
                },
                CodeAttribute::LocalVariableTable {
                    name_index,
                    entries,
                } => CodeAttribute::LocalVariableTable {
                    name_index: *name_index,
                    entries: locals(entries)?,
                },
                CodeAttribute::LocalVariableTypeTable {
                    name_index,
                    entries,
                } => CodeAttribute::LocalVariableTypeTable {
                    name_index: *name_index,
                    entries: locals(entries)?,
                },
                CodeAttribute::Other(raw) => CodeAttribute::Other(raw.clone()),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok((handlers, attributes))
}

fn narrow(v: u32) -> Result<u16> {
    u16::try_from(v).map_err(|_| PackError::malformed(format!("code position {v} exceeds 65535")))
}
