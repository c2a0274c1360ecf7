// Class-file constant pool.
//
// Entries keep their class-file indices: slot 0 and the slot after every
// Long/Double entry hold `CpEntry::Unusable`.

use super::reader::ClassBytes;
use crate::error::{PackError, Result};

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

pub const TAG_UTF8: u8 = 1;
pub const TAG_INTEGER: u8 = 3;
pub const TAG_FLOAT: u8 = 4;
pub const TAG_LONG: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_CLASS: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_FIELDREF: u8 = 9;
pub const TAG_METHODREF: u8 = 10;
pub const TAG_INTERFACE_METHODREF: u8 = 11;
pub const TAG_NAME_AND_TYPE: u8 = 12;
pub const TAG_METHOD_HANDLE: u8 = 15;
pub const TAG_METHOD_TYPE: u8 = 16;
pub const TAG_DYNAMIC: u8 = 17;
pub const TAG_INVOKE_DYNAMIC: u8 = 18;
pub const TAG_MODULE: u8 = 19;
pub const TAG_PACKAGE: u8 = 20;

/// One constant-pool slot.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CpEntry {
    /// Slot 0 and the second slot of a Long/Double.
    Unusable,
    /// Modified UTF-8, kept as raw bytes.
    Utf8(Vec<u8>),
    Integer(i32),
    /// IEEE 754 bits.
    Float(u32),
    Long(i64),
    /// IEEE 754 bits.
    Double(u64),
    Class(u16),
    String(u16),
    Fieldref { class_index: u16, name_and_type_index: u16 },
    Methodref { class_index: u16, name_and_type_index: u16 },
    InterfaceMethodref { class_index: u16, name_and_type_index: u16 },
    NameAndType { name_index: u16, descriptor_index: u16 },
    MethodHandle { kind: u8, reference_index: u16 },
    MethodType(u16),
    Dynamic { bootstrap_index: u16, name_and_type_index: u16 },
    InvokeDynamic { bootstrap_index: u16, name_and_type_index: u16 },
    Module(u16),
    Package(u16),
}

impl CpEntry {
    pub fn tag(&self) -> u8 {
        match self {
            CpEntry::Unusable => 0,
            CpEntry::Utf8(_) => TAG_UTF8,
            CpEntry::Integer(_) => TAG_INTEGER,
            CpEntry::Float(_) => TAG_FLOAT,
            CpEntry::Long(_) => TAG_LONG,
            CpEntry::Double(_) => TAG_DOUBLE,
            CpEntry::Class(_) => TAG_CLASS,
            CpEntry::String(_) => TAG_STRING,
            CpEntry::Fieldref { .. } => TAG_FIELDREF,
            CpEntry::Methodref { .. } => TAG_METHODREF,
            CpEntry::InterfaceMethodref { .. } => TAG_INTERFACE_METHODREF,
            CpEntry::NameAndType { .. } => TAG_NAME_AND_TYPE,
            CpEntry::MethodHandle { .. } => TAG_METHOD_HANDLE,
            CpEntry::MethodType(_) => TAG_METHOD_TYPE,
            CpEntry::Dynamic { .. } => TAG_DYNAMIC,
            CpEntry::InvokeDynamic { .. } => TAG_INVOKE_DYNAMIC,
            CpEntry::Module(_) => TAG_MODULE,
            CpEntry::Package(_) => TAG_PACKAGE,
        }
    }

    /// Long and Double take two slots.
    pub fn is_wide(&self) -> bool {
        matches!(self, CpEntry::Long(_) | CpEntry::Double(_))
    }
}

/// Kind of a member reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A resolved Fieldref/Methodref/InterfaceMethodref.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub kind: RefKind,
    pub owner: &'a [u8],
    pub name: &'a [u8],
    pub descriptor: &'a [u8],
}

/// The constant pool of one class.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConstantPool {
    entries: Vec<CpEntry>,
}

impl ConstantPool {
    /// Build a pool from its entries, excluding slot 0. Wide entries must be
    /// followed by `CpEntry::Unusable`.
    pub fn from_entries(entries: impl IntoIterator<Item = CpEntry>) -> Self {
        let mut all = vec![CpEntry::Unusable];
        all.extend(entries);
        Self { entries: all }
    }

    /// Class-file `constant_pool_count`.
    pub fn count(&self) -> usize {
        self.entries.len().max(1)
    }

    pub fn entries(&self) -> &[CpEntry] {
        &self.entries
    }

    pub(crate) fn parse(r: &mut ClassBytes<'_>) -> Result<Self> {
        let count = r.u16()? as usize;
        let mut entries = Vec::with_capacity(count);
        entries.push(CpEntry::Unusable);
        while entries.len() < count {
            let tag = r.u8()?;
            let entry = match tag {
                TAG_UTF8 => {
                    let len = r.u16()? as usize;
                    CpEntry::Utf8(r.bytes(len)?.to_vec())
                }
                TAG_INTEGER => CpEntry::Integer(r.u32()? as i32),
                TAG_FLOAT => CpEntry::Float(r.u32()?),
                TAG_LONG => CpEntry::Long(r.u64()? as i64),
                TAG_DOUBLE => CpEntry::Double(r.u64()?),
                TAG_CLASS => CpEntry::Class(r.u16()?),
                TAG_STRING => CpEntry::String(r.u16()?),
                TAG_FIELDREF => CpEntry::Fieldref {
                    class_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                TAG_METHODREF => CpEntry::Methodref {
                    class_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                TAG_INTERFACE_METHODREF => CpEntry::InterfaceMethodref {
                    class_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                TAG_NAME_AND_TYPE => CpEntry::NameAndType {
                    name_index: r.u16()?,
                    descriptor_index: r.u16()?,
                },
                TAG_METHOD_HANDLE => CpEntry::MethodHandle {
                    kind: r.u8()?,
                    reference_index: r.u16()?,
                },
                TAG_METHOD_TYPE => CpEntry::MethodType(r.u16()?),
                TAG_DYNAMIC => CpEntry::Dynamic {
                    bootstrap_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                TAG_INVOKE_DYNAMIC => CpEntry::InvokeDynamic {
                    bootstrap_index: r.u16()?,
                    name_and_type_index: r.u16()?,
                },
                TAG_MODULE => CpEntry::Module(r.u16()?),
                TAG_PACKAGE => CpEntry::Package(r.u16()?),
                other => {
                    return Err(PackError::malformed(format!(
                        "constant pool entry {}: unknown tag {other}",
                        entries.len()
                    )));
                }
            };
            let wide = entry.is_wide();
            entries.push(entry);
            if wide {
                entries.push(CpEntry::Unusable);
            }
        }
        if entries.len() != count {
            return Err(PackError::malformed("wide constant overruns the pool"));
        }
        Ok(Self { entries })
    }

    /// Parse a pool written by [`ConstantPool::write_to`]. Trailing bytes are
    /// an error.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut r = ClassBytes::new(bytes);
        let pool = Self::parse(&mut r)?;
        if r.remaining() != 0 {
            return Err(PackError::malformed(format!(
                "{} bytes after the constant pool",
                r.remaining()
            )));
        }
        Ok(pool)
    }

    /// Append the class-file form, count included.
    pub fn write_to(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&(self.count() as u16).to_be_bytes());
        for entry in self.entries.iter().skip(1) {
            if matches!(entry, CpEntry::Unusable) {
                continue;
            }
            out.push(entry.tag());
            match entry {
                CpEntry::Unusable => {}
                CpEntry::Utf8(bytes) => {
                    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
                    out.extend_from_slice(bytes);
                }
                CpEntry::Integer(v) => out.extend_from_slice(&v.to_be_bytes()),
                CpEntry::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
                CpEntry::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
                CpEntry::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
                CpEntry::Class(i)
                | CpEntry::String(i)
                | CpEntry::MethodType(i)
                | CpEntry::Module(i)
                | CpEntry::Package(i) => out.extend_from_slice(&i.to_be_bytes()),
                CpEntry::Fieldref { class_index: a, name_and_type_index: b }
                | CpEntry::Methodref { class_index: a, name_and_type_index: b }
                | CpEntry::InterfaceMethodref { class_index: a, name_and_type_index: b }
                | CpEntry::NameAndType { name_index: a, descriptor_index: b }
                | CpEntry::Dynamic { bootstrap_index: a, name_and_type_index: b }
                | CpEntry::InvokeDynamic { bootstrap_index: a, name_and_type_index: b } => {
                    out.extend_from_slice(&a.to_be_bytes());
                    out.extend_from_slice(&b.to_be_bytes());
                }
                CpEntry::MethodHandle { kind, reference_index } => {
                    out.push(*kind);
                    out.extend_from_slice(&reference_index.to_be_bytes());
                }
            }
        }
    }

    // -----------------------------------------------------------------------
    // Lookups
    // -----------------------------------------------------------------------

    pub fn get(&self, index: u16) -> Result<&CpEntry> {
        match self.entries.get(index as usize) {
            Some(CpEntry::Unusable) | None => Err(PackError::InvalidReference {
                band: "constant_pool".to_string(),
                index: i64::from(index),
                len: self.entries.len(),
            }),
            Some(entry) => Ok(entry),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&[u8]> {
        match self.get(index)? {
            CpEntry::Utf8(bytes) => Ok(bytes),
            other => Err(wrong_tag(index, "Utf8", other)),
        }
    }

    /// Internal name of a Class entry.
    pub fn class_name(&self, index: u16) -> Result<&[u8]> {
        match self.get(index)? {
            CpEntry::Class(name) => self.utf8(*name),
            other => Err(wrong_tag(index, "Class", other)),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&[u8], &[u8])> {
        match self.get(index)? {
            CpEntry::NameAndType {
                name_index,
                descriptor_index,
            } => Ok((self.utf8(*name_index)?, self.utf8(*descriptor_index)?)),
            other => Err(wrong_tag(index, "NameAndType", other)),
        }
    }

    /// Resolve a member reference, or `None` if `index` names another kind of
    /// entry.
    pub fn member_ref(&self, index: u16) -> Result<Option<MemberRef<'_>>> {
        let (kind, class_index, nat) = match self.get(index)? {
            CpEntry::Fieldref {
                class_index,
                name_and_type_index,
            } => (RefKind::Field, *class_index, *name_and_type_index),
            CpEntry::Methodref {
                class_index,
                name_and_type_index,
            } => (RefKind::Method, *class_index, *name_and_type_index),
            CpEntry::InterfaceMethodref {
                class_index,
                name_and_type_index,
            } => (RefKind::InterfaceMethod, *class_index, *name_and_type_index),
            _ => return Ok(None),
        };
        let (name, descriptor) = self.name_and_type(nat)?;
        Ok(Some(MemberRef {
            kind,
            owner: self.class_name(class_index)?,
            name,
            descriptor,
        }))
    }

    /// Indices of the `kind` references owned by `owner`, in pool order.
    /// With `init_only`, only `<init>` method references are listed.
    pub fn owned_refs(&self, kind: RefKind, owner: &[u8], init_only: bool) -> Vec<u16> {
        (1..self.entries.len())
            .filter_map(|i| {
                let index = u16::try_from(i).ok()?;
                let m = self.member_ref(index).ok()??;
                (m.kind == kind && m.owner == owner && (!init_only || m.name == b"<init>"))
                    .then_some(index)
            })
            .collect()
    }
}

fn wrong_tag(index: u16, expected: &str, found: &CpEntry) -> PackError {
    PackError::malformed(format!(
        "constant pool entry {index}: expected {expected}, found tag {}",
        found.tag()
    ))
}
