// Class-file parser.
//
// Decodes the parts of a class file the bands need: the constant pool,
// members, and `Code` attributes with their offset-bearing tables. Every
// other attribute is kept as raw bytes.

use super::{
    AccessFlags, Attribute, CLASS_MAGIC, ClassDecoder, ClassStructure, Code, CodeAttribute,
    ConstantPool, ExceptionHandler, FieldInfo, LineNumber, LocalVariable, MethodInfo,
};
use crate::error::{PackError, Result};

// ---------------------------------------------------------------------------
// Byte cursor
// ---------------------------------------------------------------------------

/// Big-endian cursor over class-file bytes.
pub(crate) struct ClassBytes<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ClassBytes<'a> {
    pub(crate) fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub(crate) fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub(crate) fn bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        if self.remaining() < n {
            return Err(PackError::malformed(format!(
                "class file truncated at byte {} (need {n} more)",
                self.pos
            )));
        }
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    pub(crate) fn u8(&mut self) -> Result<u8> {
        Ok(self.bytes(1)?[0])
    }

    pub(crate) fn u16(&mut self) -> Result<u16> {
        let b = self.bytes(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    pub(crate) fn u32(&mut self) -> Result<u32> {
        let b = self.bytes(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub(crate) fn u64(&mut self) -> Result<u64> {
        let hi = u64::from(self.u32()?);
        let lo = u64::from(self.u32()?);
        Ok(hi << 32 | lo)
    }
}

// ---------------------------------------------------------------------------
// Reader
// ---------------------------------------------------------------------------

/// The built-in [`ClassDecoder`].
#[derive(Clone, Copy, Debug, Default)]
pub struct ClassReader;

impl ClassReader {
    pub fn new() -> Self {
        Self
    }

    /// Parse a complete class file.
    pub fn parse(&self, bytes: &[u8]) -> Result<ClassStructure> {
        let mut r = ClassBytes::new(bytes);
        let magic = r.u32()?;
        if magic != CLASS_MAGIC {
            return Err(PackError::malformed(format!(
                "bad class magic {magic:#010X}"
            )));
        }
        let minor_version = r.u16()?;
        let major_version = r.u16()?;
        let constant_pool = ConstantPool::parse(&mut r)?;
        let access_flags = AccessFlags::from_bits_retain(r.u16()?);
        let this_class = r.u16()?;
        let super_class = r.u16()?;

        let n = r.u16()?;
        let interfaces = (0..n).map(|_| r.u16()).collect::<Result<Vec<_>>>()?;

        let n = r.u16()?;
        let mut fields = Vec::with_capacity(n as usize);
        for _ in 0..n {
            fields.push(FieldInfo {
                access_flags: AccessFlags::from_bits_retain(r.u16()?),
                name_index: r.u16()?,
                descriptor_index: r.u16()?,
                attributes: read_attributes(&mut r)?,
            });
        }

        let n = r.u16()?;
        let mut methods = Vec::with_capacity(n as usize);
        for _ in 0..n {
            methods.push(read_method(&mut r, &constant_pool)?);
        }

        let attributes = read_attributes(&mut r)?;
        if r.remaining() != 0 {
            return Err(PackError::malformed(format!(
                "{} trailing bytes after class file",
                r.remaining()
            )));
        }

        Ok(ClassStructure {
            minor_version,
            major_version,
            constant_pool,
            access_flags,
            this_class,
            super_class,
            interfaces,
            fields,
            methods,
            attributes,
        })
    }
}

impl ClassDecoder for ClassReader {
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<ClassStructure> {
        self.parse(bytes).map_err(|e| match e {
            PackError::Malformed(msg) => PackError::Malformed(format!("{name}: {msg}")),
            other => other,
        })
    }
}

fn read_attribute(r: &mut ClassBytes<'_>) -> Result<Attribute> {
    let name_index = r.u16()?;
    let len = r.u32()? as usize;
    Ok(Attribute {
        name_index,
        info: r.bytes(len)?.to_vec(),
    })
}

fn read_attributes(r: &mut ClassBytes<'_>) -> Result<Vec<Attribute>> {
    let n = r.u16()?;
    (0..n).map(|_| read_attribute(r)).collect()
}

fn read_method(r: &mut ClassBytes<'_>, pool: &ConstantPool) -> Result<MethodInfo> {
    let access_flags = AccessFlags::from_bits_retain(r.u16()?);
    let name_index = r.u16()?;
    let descriptor_index = r.u16()?;
    let n = r.u16()?;
    let mut code = None;
    let mut attributes = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let a = read_attribute(r)?;
        if code.is_none() && pool.utf8(a.name_index)? == b"Code" {
            code = Some(read_code(&a.info, pool)?);
        } else {
            attributes.push(a);
        }
    }
    Ok(MethodInfo {
        access_flags,
        name_index,
        descriptor_index,
        code,
        attributes,
    })
}

fn read_code(info: &[u8], pool: &ConstantPool) -> Result<Code> {
    let mut r = ClassBytes::new(info);
    let max_stack = r.u16()?;
    let max_locals = r.u16()?;
    let len = r.u32()? as usize;
    let bytecode = r.bytes(len)?.to_vec();

    let n = r.u16()?;
    let mut exception_table = Vec::with_capacity(n as usize);
    for _ in 0..n {
        exception_table.push(ExceptionHandler {
            start_pc: r.u16()?,
            end_pc: r.u16()?,
            handler_pc: r.u16()?,
            catch_type: r.u16()?,
        });
    }

    let n = r.u16()?;
    let mut attributes = Vec::with_capacity(n as usize);
    for _ in 0..n {
        let raw = read_attribute(&mut r)?;
        attributes.push(read_code_attribute(raw, pool)?);
    }
    if r.remaining() != 0 {
        return Err(PackError::malformed("trailing bytes in Code attribute"));
    }

    Ok(Code {
        max_stack,
        max_locals,
        bytecode,
        exception_table,
        attributes,
    })
}

fn read_code_attribute(raw: Attribute, pool: &ConstantPool) -> Result<CodeAttribute> {
    let name_index = raw.name_index;
    let name = pool.utf8(name_index)?;
    let mut r = ClassBytes::new(&raw.info);
    let attribute = match name {
        b"LineNumberTable" => {
            let n = r.u16()?;
            let entries = (0..n)
                .map(|_| {
                    Ok(LineNumber {
                        start_pc: r.u16()?,
                        line_number: r.u16()?,
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            CodeAttribute::LineNumberTable {
                name_index,
                entries,
            }
        }
        b"LocalVariableTable" => CodeAttribute::LocalVariableTable {
            name_index,
            entries: read_local_variables(&mut r)?,
        },
        b"LocalVariableTypeTable" => CodeAttribute::LocalVariableTypeTable {
            name_index,
            entries: read_local_variables(&mut r)?,
        },
        _ => return Ok(CodeAttribute::Other(raw)),
    };
    if r.remaining() != 0 {
        return Err(PackError::malformed(format!(
            "trailing bytes in {}",
            String::from_utf8_lossy(name)
        )));
    }
    Ok(attribute)
}

fn read_local_variables(r: &mut ClassBytes<'_>) -> Result<Vec<LocalVariable>> {
    let n = r.u16()?;
    (0..n)
        .map(|_| {
            Ok(LocalVariable {
                start_pc: r.u16()?,
                length: r.u16()?,
                name_index: r.u16()?,
                descriptor_index: r.u16()?,
                index: r.u16()?,
            })
        })
        .collect()
}
