// Class-file structure consumed by the bytecode splitter and the class bands.
//
// # Modules
//
// - `constant_pool` - Constant-pool entries and lookups
// - `descriptor`    - Method descriptor slot counting
// - `reader`        - Class-file parser (`ClassReader`) and byte cursor

pub mod constant_pool;
pub mod descriptor;
pub mod reader;

use bitflags::bitflags;

use crate::error::{PackError, Result};

pub use constant_pool::{ConstantPool, CpEntry, MemberRef, RefKind};
pub use descriptor::param_slots;
pub use reader::ClassReader;

/// Class-file magic number.
pub const CLASS_MAGIC: u32 = 0xCAFE_BABE;

bitflags! {
    /// Class, field and method access flags. Unknown bits are retained.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SYNCHRONIZED = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

// ---------------------------------------------------------------------------
// Structure
// ---------------------------------------------------------------------------

/// An attribute kept as raw bytes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Attribute {
    pub name_index: u16,
    pub info: Vec<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldInfo {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub attributes: Vec<Attribute>,
}

/// A method. `code` holds the `Code` attribute, `attributes` the rest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodInfo {
    pub access_flags: AccessFlags,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub code: Option<Code>,
    pub attributes: Vec<Attribute>,
}

impl MethodInfo {
    /// Abstract and native methods carry no bytecode.
    pub fn has_code(&self) -> bool {
        !self
            .access_flags
            .intersects(AccessFlags::ABSTRACT | AccessFlags::NATIVE)
    }

    pub fn is_static(&self) -> bool {
        self.access_flags.contains(AccessFlags::STATIC)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    pub start_pc: u16,
    pub end_pc: u16,
    pub handler_pc: u16,
    pub catch_type: u16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LineNumber {
    pub start_pc: u16,
    pub line_number: u16,
}

/// Entry of a LocalVariableTable or LocalVariableTypeTable.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocalVariable {
    pub start_pc: u16,
    pub length: u16,
    pub name_index: u16,
    pub descriptor_index: u16,
    pub index: u16,
}

/// Attributes of a `Code` attribute. The tables whose entries hold bytecode
/// offsets are decoded so they can be renumbered.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CodeAttribute {
    LineNumberTable {
        name_index: u16,
        entries: Vec<LineNumber>,
    },
    LocalVariableTable {
        name_index: u16,
        entries: Vec<LocalVariable>,
    },
    LocalVariableTypeTable {
        name_index: u16,
        entries: Vec<LocalVariable>,
    },
    Other(Attribute),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Code {
    pub max_stack: u16,
    pub max_locals: u16,
    pub bytecode: Vec<u8>,
    pub exception_table: Vec<ExceptionHandler>,
    pub attributes: Vec<CodeAttribute>,
}

/// A parsed class file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassStructure {
    pub minor_version: u16,
    pub major_version: u16,
    pub constant_pool: ConstantPool,
    pub access_flags: AccessFlags,
    pub this_class: u16,
    /// 0 for `java/lang/Object` and module descriptors.
    pub super_class: u16,
    pub interfaces: Vec<u16>,
    pub fields: Vec<FieldInfo>,
    pub methods: Vec<MethodInfo>,
    pub attributes: Vec<Attribute>,
}

impl ClassStructure {
    pub fn this_name(&self) -> Result<&[u8]> {
        self.constant_pool.class_name(self.this_class)
    }

    pub fn super_name(&self) -> Result<Option<&[u8]>> {
        if self.super_class == 0 {
            return Ok(None);
        }
        self.constant_pool.class_name(self.super_class).map(Some)
    }

    /// Methods that carry bytecode, in declaration order.
    pub fn coded_methods(&self) -> impl Iterator<Item = &MethodInfo> {
        self.methods.iter().filter(|m| m.has_code())
    }

    /// Serialize to class-file bytes. The `Code` attribute is written first
    /// in each method's attribute list.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        out.extend_from_slice(&CLASS_MAGIC.to_be_bytes());
        put_u16(&mut out, self.minor_version);
        put_u16(&mut out, self.major_version);
        self.constant_pool.write_to(&mut out);
        put_u16(&mut out, self.access_flags.bits());
        put_u16(&mut out, self.this_class);
        put_u16(&mut out, self.super_class);
        put_len(&mut out, self.interfaces.len())?;
        for &i in &self.interfaces {
            put_u16(&mut out, i);
        }

        put_len(&mut out, self.fields.len())?;
        for f in &self.fields {
            put_u16(&mut out, f.access_flags.bits());
            put_u16(&mut out, f.name_index);
            put_u16(&mut out, f.descriptor_index);
            write_attributes(&mut out, &f.attributes)?;
        }

        let code_name = self.code_name_index();
        put_len(&mut out, self.methods.len())?;
        for m in &self.methods {
            put_u16(&mut out, m.access_flags.bits());
            put_u16(&mut out, m.name_index);
            put_u16(&mut out, m.descriptor_index);
            let extra = usize::from(m.code.is_some());
            put_len(&mut out, m.attributes.len() + extra)?;
            if let Some(code) = &m.code {
                let name_index = code_name.ok_or_else(|| {
                    PackError::malformed("method has code but pool lacks \"Code\"")
                })?;
                put_u16(&mut out, name_index);
                let body = code.to_bytes()?;
                put_u32(&mut out, body.len())?;
                out.extend_from_slice(&body);
            }
            for a in &m.attributes {
                write_attribute(&mut out, a)?;
            }
        }

        write_attributes(&mut out, &self.attributes)?;
        Ok(out)
    }

    fn code_name_index(&self) -> Option<u16> {
        self.constant_pool
            .entries()
            .iter()
            .position(|e| matches!(e, CpEntry::Utf8(b) if b == b"Code"))
            .and_then(|i| u16::try_from(i).ok())
    }
}

impl Code {
    /// The body of the `Code` attribute (after its name and length).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        put_u16(&mut out, self.max_stack);
        put_u16(&mut out, self.max_locals);
        put_u32(&mut out, self.bytecode.len())?;
        out.extend_from_slice(&self.bytecode);
        put_len(&mut out, self.exception_table.len())?;
        for h in &self.exception_table {
            for v in [h.start_pc, h.end_pc, h.handler_pc, h.catch_type] {
                put_u16(&mut out, v);
            }
        }
        put_len(&mut out, self.attributes.len())?;
        for a in &self.attributes {
            match a {
                CodeAttribute::LineNumberTable {
                    name_index,
                    entries,
                } => {
                    put_u16(&mut out, *name_index);
                    put_u32(&mut out, 2 + entries.len() * 4)?;
                    put_len(&mut out, entries.len())?;
                    for e in entries {
                        put_u16(&mut out, e.start_pc);
                        put_u16(&mut out, e.line_number);
                    }
                }
                CodeAttribute::LocalVariableTable {
                    name_index,
                    entries,
                }
                | CodeAttribute::LocalVariableTypeTable {
                    name_index,
                    entries,
                } => {
                    put_u16(&mut out, *name_index);
                    put_u32(&mut out, 2 + entries.len() * 10)?;
                    put_len(&mut out, entries.len())?;
                    for e in entries {
                        for v in [e.start_pc, e.length, e.name_index, e.descriptor_index, e.index] {
                            put_u16(&mut out, v);
                        }
                    }
                }
                CodeAttribute::Other(raw) => write_attribute(&mut out, raw)?,
            }
        }
        Ok(out)
    }
}

// ---------------------------------------------------------------------------
// Decoder seam
// ---------------------------------------------------------------------------

/// Turns class-file bytes into a [`ClassStructure`].
pub trait ClassDecoder {
    fn decode(&self, name: &str, bytes: &[u8]) -> Result<ClassStructure>;
}

// ---------------------------------------------------------------------------
// Writing helpers
// ---------------------------------------------------------------------------

fn put_u16(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn put_len(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let v = u16::try_from(len)
        .map_err(|_| PackError::malformed(format!("table of {len} entries")))?;
    put_u16(out, v);
    Ok(())
}

fn put_u32(out: &mut Vec<u8>, len: usize) -> Result<()> {
    let v = u32::try_from(len)
        .map_err(|_| PackError::malformed(format!("attribute of {len} bytes")))?;
    out.extend_from_slice(&v.to_be_bytes());
    Ok(())
}

fn write_attribute(out: &mut Vec<u8>, a: &Attribute) -> Result<()> {
    put_u16(out, a.name_index);
    put_u32(out, a.info.len())?;
    out.extend_from_slice(&a.info);
    Ok(())
}

fn write_attributes(out: &mut Vec<u8>, attributes: &[Attribute]) -> Result<()> {
    put_len(out, attributes.len())?;
    for a in attributes {
        write_attribute(out, a)?;
    }
    Ok(())
}
