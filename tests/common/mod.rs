#![allow(dead_code)]

use std::io::Cursor;

use oxipack::bytecode::insn::{Insn, emit_code};
use oxipack::bytecode::{BytecodeBands, BytecodeSplitter, CodeHeader, UnknownOpcodePolicy};
use oxipack::classfile::{AccessFlags, ClassStructure, Code, CpEntry, ConstantPool, MethodInfo};
use oxipack::codec::{BandReader, BandWriter};

/// Builds a class with a deduplicated constant pool.
pub struct ClassBuilder {
    entries: Vec<CpEntry>,
    this_class: u16,
    super_class: u16,
    methods: Vec<MethodInfo>,
}

impl ClassBuilder {
    pub fn new(this: &str, sup: &str) -> Self {
        let mut b = Self {
            entries: Vec::new(),
            this_class: 0,
            super_class: 0,
            methods: Vec::new(),
        };
        b.utf8("Code");
        b.this_class = b.class(this);
        b.super_class = b.class(sup);
        b
    }

    fn push(&mut self, entry: CpEntry) -> u16 {
        if let Some(i) = self.entries.iter().position(|e| *e == entry) {
            return (i + 1) as u16;
        }
        let wide = entry.is_wide();
        self.entries.push(entry);
        let index = self.entries.len() as u16;
        if wide {
            self.entries.push(CpEntry::Unusable);
        }
        index
    }

    pub fn utf8(&mut self, s: &str) -> u16 {
        self.push(CpEntry::Utf8(s.as_bytes().to_vec()))
    }

    pub fn class(&mut self, name: &str) -> u16 {
        let n = self.utf8(name);
        self.push(CpEntry::Class(n))
    }

    fn nat(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.push(CpEntry::NameAndType {
            name_index,
            descriptor_index,
        })
    }

    pub fn field(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_and_type_index = self.nat(name, descriptor);
        self.push(CpEntry::Fieldref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn method(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_and_type_index = self.nat(name, descriptor);
        self.push(CpEntry::Methodref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn imethod(&mut self, owner: &str, name: &str, descriptor: &str) -> u16 {
        let class_index = self.class(owner);
        let name_and_type_index = self.nat(name, descriptor);
        self.push(CpEntry::InterfaceMethodref {
            class_index,
            name_and_type_index,
        })
    }

    pub fn string(&mut self, s: &str) -> u16 {
        let n = self.utf8(s);
        self.push(CpEntry::String(n))
    }

    pub fn integer(&mut self, v: i32) -> u16 {
        self.push(CpEntry::Integer(v))
    }

    pub fn float(&mut self, v: f32) -> u16 {
        self.push(CpEntry::Float(v.to_bits()))
    }

    pub fn long(&mut self, v: i64) -> u16 {
        self.push(CpEntry::Long(v))
    }

    pub fn double(&mut self, v: f64) -> u16 {
        self.push(CpEntry::Double(v.to_bits()))
    }

    pub fn method_type(&mut self, descriptor: &str) -> u16 {
        let n = self.utf8(descriptor);
        self.push(CpEntry::MethodType(n))
    }

    pub fn method_handle(&mut self, kind: u8, reference_index: u16) -> u16 {
        self.push(CpEntry::MethodHandle {
            kind,
            reference_index,
        })
    }

    pub fn invoke_dynamic(&mut self, name: &str, descriptor: &str) -> u16 {
        let name_and_type_index = self.nat(name, descriptor);
        self.push(CpEntry::InvokeDynamic {
            bootstrap_index: 0,
            name_and_type_index,
        })
    }

    /// Add a method whose code is laid out from `insns`.
    pub fn code_method(
        &mut self,
        flags: AccessFlags,
        name: &str,
        descriptor: &str,
        max_locals: u16,
        insns: &[Insn],
    ) -> &mut Self {
        let (bytecode, _) = emit_code(insns).unwrap();
        let code = Code {
            max_stack: 4,
            max_locals,
            bytecode,
            exception_table: Vec::new(),
            attributes: Vec::new(),
        };
        self.raw_method(flags, name, descriptor, Some(code))
    }

    pub fn raw_method(
        &mut self,
        flags: AccessFlags,
        name: &str,
        descriptor: &str,
        code: Option<Code>,
    ) -> &mut Self {
        let name_index = self.utf8(name);
        let descriptor_index = self.utf8(descriptor);
        self.methods.push(MethodInfo {
            access_flags: flags,
            name_index,
            descriptor_index,
            code,
            attributes: Vec::new(),
        });
        self
    }

    pub fn build(&self) -> ClassStructure {
        ClassStructure {
            minor_version: 0,
            major_version: 52,
            constant_pool: ConstantPool::from_entries(self.entries.clone()),
            access_flags: AccessFlags::PUBLIC,
            this_class: self.this_class,
            super_class: self.super_class,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: self.methods.clone(),
            attributes: Vec::new(),
        }
    }
}

pub fn op(opcode: u8, operands: &[u8]) -> Insn {
    Insn::fixed(opcode, operands)
}

pub fn idx(index: u16) -> [u8; 2] {
    index.to_be_bytes()
}

/// Split `classes`, write the bytecode bands, read them back and reassemble.
pub fn bytecode_roundtrip(classes: &[ClassStructure]) -> (Vec<ClassStructure>, BytecodeSplitter) {
    let mut splitter = BytecodeSplitter::new();
    let headers: Vec<Vec<CodeHeader>> = classes
        .iter()
        .map(|c| splitter.split_class(c).unwrap())
        .collect();
    let mut w = BandWriter::new(1);
    splitter.write(&mut w).unwrap();
    let (body, band_headers) = w.into_parts();

    let mut stripped = strip_code(classes);
    let mut r = BandReader::new(Cursor::new(&body), &band_headers);
    let bands = BytecodeBands::read(&mut r, &stripped, UnknownOpcodePolicy::Reject).unwrap();
    bands.assemble(&mut stripped, &headers).unwrap();
    assert_eq!(r.headers_remaining(), 0);
    (stripped, splitter)
}

pub fn strip_code(classes: &[ClassStructure]) -> Vec<ClassStructure> {
    let mut stripped = classes.to_vec();
    for class in &mut stripped {
        for method in &mut class.methods {
            method.code = None;
        }
    }
    stripped
}

pub const STATIC: AccessFlags = AccessFlags::STATIC;
pub const PUBLIC: AccessFlags = AccessFlags::PUBLIC;
