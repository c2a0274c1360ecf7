// Class metadata bands.
//
// Everything about a class except its method bytecode travels here, one band
// per property, classes in segment order. Constant pools are carried in their
// class-file form; every other index is the class-file constant-pool index.
// Code headers follow for every coded method, with code positions already
// renumbered to instruction indices by the bytecode splitter.

use std::io::Read;

use crate::bytecode::CodeHeader;
use crate::classfile::{
    AccessFlags, Attribute, ClassStructure, CodeAttribute, ConstantPool, ExceptionHandler,
    FieldInfo, LineNumber, LocalVariable, MethodInfo,
};
use crate::codec::band::BYTES;
use crate::codec::{BandCodec, BandReader, BandWriter, SIGNED5, UNSIGNED5};
use crate::error::{PackError, Result};

const U5: BandCodec = BandCodec::of(UNSIGNED5);
const S5: BandCodec = BandCodec::of(SIGNED5);

const ATTR_LINE_NUMBERS: i32 = 0;
const ATTR_LOCAL_VARIABLES: i32 = 1;
const ATTR_LOCAL_VARIABLE_TYPES: i32 = 2;
const ATTR_OTHER: i32 = 3;

/// Field or method fields shared by both member kinds.
struct Member<'a> {
    flags: AccessFlags,
    name: u16,
    descriptor: u16,
    attributes: &'a [Attribute],
}

struct DecodedMember {
    flags: AccessFlags,
    name: u16,
    descriptor: u16,
    attributes: Vec<Attribute>,
}

// ---------------------------------------------------------------------------
// Writing
// ---------------------------------------------------------------------------

/// Write the class bands. `headers[c]` holds the code headers of class `c`.
pub fn write(w: &mut BandWriter, classes: &[ClassStructure], headers: &[Vec<CodeHeader>]) -> Result<()> {
    let per_class = |f: fn(&ClassStructure) -> i32| classes.iter().map(f).collect::<Vec<_>>();

    w.encode_ints("class_minor", U5, &per_class(|c| i32::from(c.minor_version)))?;
    w.encode_ints("class_major", U5, &per_class(|c| i32::from(c.major_version)))?;
    let flags: Vec<i64> = classes
        .iter()
        .map(|c| i64::from(c.access_flags.bits()))
        .collect();
    w.encode_flags("class_flags", U5, &flags, false)?;
    w.encode_ints("class_this", U5, &per_class(|c| i32::from(c.this_class)))?;
    w.encode_ints("class_super", U5, &per_class(|c| i32::from(c.super_class)))?;
    w.encode_ints(
        "class_interface_count",
        U5,
        &per_class(|c| c.interfaces.len() as i32),
    )?;
    let interfaces: Vec<i32> = classes
        .iter()
        .flat_map(|c| c.interfaces.iter().map(|&i| i32::from(i)))
        .collect();
    w.encode_ints("class_interface", U5, &interfaces)?;

    let pools: Vec<Vec<i32>> = classes
        .iter()
        .map(|c| {
            let mut bytes = Vec::new();
            c.constant_pool.write_to(&mut bytes);
            bytes.into_iter().map(i32::from).collect()
        })
        .collect();
    let sizes: Vec<i32> = pools.iter().map(|p| p.len() as i32).collect();
    w.encode_ints("cp_size", U5, &sizes)?;
    w.encode_ints_2d("cp_bytes", BYTES, &pools)?;

    let fields: Vec<Member<'_>> = classes
        .iter()
        .flat_map(|c| &c.fields)
        .map(|f| Member {
            flags: f.access_flags,
            name: f.name_index,
            descriptor: f.descriptor_index,
            attributes: &f.attributes,
        })
        .collect();
    write_members(w, "field", &per_class(|c| c.fields.len() as i32), &fields)?;

    let methods: Vec<Member<'_>> = classes
        .iter()
        .flat_map(|c| &c.methods)
        .map(|m| Member {
            flags: m.access_flags,
            name: m.name_index,
            descriptor: m.descriptor_index,
            attributes: &m.attributes,
        })
        .collect();
    write_members(w, "method", &per_class(|c| c.methods.len() as i32), &methods)?;

    let class_attrs: Vec<&[Attribute]> = classes.iter().map(|c| c.attributes.as_slice()).collect();
    write_attributes(w, "class", &class_attrs)?;

    let headers: Vec<&CodeHeader> = headers.iter().flatten().collect();
    write_code_headers(w, &headers)
}

fn write_members(w: &mut BandWriter, prefix: &str, counts: &[i32], members: &[Member<'_>]) -> Result<()> {
    let flags: Vec<i64> = members.iter().map(|m| i64::from(m.flags.bits())).collect();
    let names: Vec<i32> = members.iter().map(|m| i32::from(m.name)).collect();
    let descriptors: Vec<i32> = members.iter().map(|m| i32::from(m.descriptor)).collect();
    w.encode_ints(&format!("{prefix}_count"), U5, counts)?;
    w.encode_flags(&format!("{prefix}_flags"), U5, &flags, false)?;
    w.encode_ints(&format!("{prefix}_name"), U5, &names)?;
    w.encode_ints(&format!("{prefix}_descr"), U5, &descriptors)?;
    let attrs: Vec<&[Attribute]> = members.iter().map(|m| m.attributes).collect();
    write_attributes(w, prefix, &attrs)
}

fn write_attributes(w: &mut BandWriter, prefix: &str, lists: &[&[Attribute]]) -> Result<()> {
    let counts: Vec<i32> = lists.iter().map(|l| l.len() as i32).collect();
    let all: Vec<&Attribute> = lists.iter().flat_map(|l| l.iter()).collect();
    let names: Vec<i32> = all.iter().map(|a| i32::from(a.name_index)).collect();
    let bits: Vec<Vec<i32>> = all
        .iter()
        .map(|a| a.info.iter().map(|&b| i32::from(b)).collect())
        .collect();
    let sizes = bits
        .iter()
        .map(|b| size_value(&format!("{prefix}_attr_size"), b.len()))
        .collect::<Result<Vec<_>>>()?;
    w.encode_ints(&format!("{prefix}_attr_count"), U5, &counts)?;
    w.encode_ints(&format!("{prefix}_attr_name"), U5, &names)?;
    w.encode_ints(&format!("{prefix}_attr_size"), U5, &sizes)?;
    w.encode_ints_2d(&format!("{prefix}_attr_bits"), BYTES, &bits)
}

fn write_code_headers(w: &mut BandWriter, headers: &[&CodeHeader]) -> Result<()> {
    let stacks: Vec<i32> = headers.iter().map(|h| i32::from(h.max_stack)).collect();
    let locals: Vec<i32> = headers.iter().map(|h| h.max_na_locals).collect();
    w.encode_ints("code_max_stack", U5, &stacks)?;
    w.encode_ints("code_max_na_locals", S5, &locals)?;

    let handler_counts: Vec<i32> = headers.iter().map(|h| h.exception_table.len() as i32).collect();
    let handlers: Vec<&ExceptionHandler> = headers.iter().flat_map(|h| &h.exception_table).collect();
    w.encode_ints("code_handler_count", U5, &handler_counts)?;
    let column = |f: fn(&ExceptionHandler) -> u16| -> Vec<i32> {
        handlers.iter().map(|h| i32::from(f(h))).collect()
    };
    w.encode_ints("code_handler_start", U5, &column(|h| h.start_pc))?;
    w.encode_ints("code_handler_end", U5, &column(|h| h.end_pc))?;
    w.encode_ints("code_handler_pc", U5, &column(|h| h.handler_pc))?;
    w.encode_ints("code_handler_class", U5, &column(|h| h.catch_type))?;

    let attr_counts: Vec<i32> = headers.iter().map(|h| h.attributes.len() as i32).collect();
    let attrs: Vec<&CodeAttribute> = headers.iter().flat_map(|h| &h.attributes).collect();
    w.encode_ints("code_attr_count", U5, &attr_counts)?;

    let mut kinds = Vec::with_capacity(attrs.len());
    let mut names = Vec::with_capacity(attrs.len());
    let mut line_counts = Vec::new();
    let mut lines: Vec<&LineNumber> = Vec::new();
    let mut var_counts = Vec::new();
    let mut vars: Vec<&LocalVariable> = Vec::new();
    let mut other: Vec<Vec<i32>> = Vec::new();
    for attr in &attrs {
        let (kind, name) = match attr {
            CodeAttribute::LineNumberTable {
                name_index,
                entries,
            } => {
                line_counts.push(entries.len() as i32);
                lines.extend(entries);
                (ATTR_LINE_NUMBERS, *name_index)
            }
            CodeAttribute::LocalVariableTable {
                name_index,
                entries,
            } => {
                var_counts.push(entries.len() as i32);
                vars.extend(entries);
                (ATTR_LOCAL_VARIABLES, *name_index)
            }
            CodeAttribute::LocalVariableTypeTable {
                name_index,
                entries,
            } => {
                var_counts.push(entries.len() as i32);
                vars.extend(entries);
                (ATTR_LOCAL_VARIABLE_TYPES, *name_index)
            }
            CodeAttribute::Other(raw) => {
                other.push(raw.info.iter().map(|&b| i32::from(b)).collect());
                (ATTR_OTHER, raw.name_index)
            }
        };
        kinds.push(kind);
        names.push(i32::from(name));
    }
    w.encode_ints("code_attr_kind", U5, &kinds)?;
    w.encode_ints("code_attr_name", U5, &names)?;

    w.encode_ints("code_line_count", U5, &line_counts)?;
    let line_column = |f: fn(&LineNumber) -> u16| -> Vec<i32> {
        lines.iter().map(|l| i32::from(f(l))).collect()
    };
    w.encode_ints("code_line_start", U5, &line_column(|l| l.start_pc))?;
    w.encode_ints("code_line_number", U5, &line_column(|l| l.line_number))?;

    w.encode_ints("code_local_count", U5, &var_counts)?;
    let var_column = |f: fn(&LocalVariable) -> u16| -> Vec<i32> {
        vars.iter().map(|v| i32::from(f(v))).collect()
    };
    w.encode_ints("code_local_start", U5, &var_column(|v| v.start_pc))?;
    w.encode_ints("code_local_length", U5, &var_column(|v| v.length))?;
    w.encode_ints("code_local_name", U5, &var_column(|v| v.name_index))?;
    w.encode_ints("code_local_descr", U5, &var_column(|v| v.descriptor_index))?;
    w.encode_ints("code_local_slot", U5, &var_column(|v| v.index))?;

    let sizes = other
        .iter()
        .map(|b| size_value("code_attr_size", b.len()))
        .collect::<Result<Vec<_>>>()?;
    w.encode_ints("code_attr_size", U5, &sizes)?;
    w.encode_ints_2d("code_attr_bits", BYTES, &other)
}

fn size_value(band: &str, len: usize) -> Result<i32> {
    i32::try_from(len).map_err(|_| PackError::Unrepresentable {
        band: band.to_string(),
        value: len as i64,
        coding: "32-bit size".to_string(),
    })
}

// ---------------------------------------------------------------------------
// Reading
// ---------------------------------------------------------------------------

/// Read the class bands of `count` classes. Methods come back without code;
/// the second value holds each class's code headers in coded-method order.
pub fn read<R: Read>(
    r: &mut BandReader<'_, R>,
    count: usize,
) -> Result<(Vec<ClassStructure>, Vec<Vec<CodeHeader>>)> {
    let minor = u16s("class_minor", r.decode_ints("class_minor", U5, count)?)?;
    let major = u16s("class_major", r.decode_ints("class_major", U5, count)?)?;
    let flags = access_flags("class_flags", r.parse_flags("class_flags", count, U5, false)?)?;
    let this = u16s("class_this", r.decode_ints("class_this", U5, count)?)?;
    let sup = u16s("class_super", r.decode_ints("class_super", U5, count)?)?;
    let interface_counts = counts(
        "class_interface_count",
        r.decode_ints("class_interface_count", U5, count)?,
    )?;
    let total = interface_counts.iter().sum();
    let interfaces = u16s("class_interface", r.decode_ints("class_interface", U5, total)?)?;
    let mut interfaces = split_rows(interfaces, &interface_counts).into_iter();

    let cp_sizes = counts("cp_size", r.decode_ints("cp_size", U5, count)?)?;
    let mut pools = Vec::with_capacity(cp_sizes.len());
    for row in r.decode_ints_2d("cp_bytes", BYTES, &cp_sizes)? {
        let bytes: Vec<u8> = row.into_iter().map(|b| b as u8).collect();
        pools.push(ConstantPool::from_bytes(&bytes)?);
    }

    let mut fields = read_members(r, "field", count)?.into_iter();
    let mut methods = read_members(r, "method", count)?.into_iter();
    let mut class_attrs = read_attributes(r, "class", count)?.into_iter();

    let mut classes = Vec::with_capacity(pools.len());
    for (c, constant_pool) in pools.into_iter().enumerate() {
        let fields = fields
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|m| FieldInfo {
                access_flags: m.flags,
                name_index: m.name,
                descriptor_index: m.descriptor,
                attributes: m.attributes,
            })
            .collect();
        let methods = methods
            .next()
            .unwrap_or_default()
            .into_iter()
            .map(|m| MethodInfo {
                access_flags: m.flags,
                name_index: m.name,
                descriptor_index: m.descriptor,
                code: None,
                attributes: m.attributes,
            })
            .collect();
        classes.push(ClassStructure {
            minor_version: minor[c],
            major_version: major[c],
            constant_pool,
            access_flags: flags[c],
            this_class: this[c],
            super_class: sup[c],
            interfaces: interfaces.next().unwrap_or_default(),
            fields,
            methods,
            attributes: class_attrs.next().unwrap_or_default(),
        });
    }

    let coded: Vec<usize> = classes.iter().map(|c| c.coded_methods().count()).collect();
    let headers = read_code_headers(r, coded.iter().sum())?;
    Ok((classes, split_rows(headers, &coded)))
}

fn read_members<R: Read>(
    r: &mut BandReader<'_, R>,
    prefix: &str,
    classes: usize,
) -> Result<Vec<Vec<DecodedMember>>> {
    let count_band = format!("{prefix}_count");
    let per_class = counts(&count_band, r.decode_ints(&count_band, U5, classes)?)?;
    let n = per_class.iter().sum();
    let flags_band = format!("{prefix}_flags");
    let flags = access_flags(&flags_band, r.parse_flags(&flags_band, n, U5, false)?)?;
    let name_band = format!("{prefix}_name");
    let names = u16s(&name_band, r.decode_ints(&name_band, U5, n)?)?;
    let descr_band = format!("{prefix}_descr");
    let descriptors = u16s(&descr_band, r.decode_ints(&descr_band, U5, n)?)?;
    let attributes = read_attributes(r, prefix, n)?;

    let members: Vec<DecodedMember> = flags
        .into_iter()
        .zip(names)
        .zip(descriptors)
        .zip(attributes)
        .map(|(((flags, name), descriptor), attributes)| DecodedMember {
            flags,
            name,
            descriptor,
            attributes,
        })
        .collect();
    Ok(split_rows(members, &per_class))
}

fn read_attributes<R: Read>(
    r: &mut BandReader<'_, R>,
    prefix: &str,
    owners: usize,
) -> Result<Vec<Vec<Attribute>>> {
    let count_band = format!("{prefix}_attr_count");
    let per_owner = counts(&count_band, r.decode_ints(&count_band, U5, owners)?)?;
    let n = per_owner.iter().sum();
    let name_band = format!("{prefix}_attr_name");
    let names = u16s(&name_band, r.decode_ints(&name_band, U5, n)?)?;
    let size_band = format!("{prefix}_attr_size");
    let sizes = counts(&size_band, r.decode_ints(&size_band, U5, n)?)?;
    let bits = r.decode_ints_2d(&format!("{prefix}_attr_bits"), BYTES, &sizes)?;

    let attributes: Vec<Attribute> = names
        .into_iter()
        .zip(bits)
        .map(|(name_index, info)| Attribute {
            name_index,
            info: info.into_iter().map(|b| b as u8).collect(),
        })
        .collect();
    Ok(split_rows(attributes, &per_owner))
}

fn read_code_headers<R: Read>(r: &mut BandReader<'_, R>, n: usize) -> Result<Vec<CodeHeader>> {
    let stacks = u16s("code_max_stack", r.decode_ints("code_max_stack", U5, n)?)?;
    let locals = r.decode_ints("code_max_na_locals", S5, n)?;

    let handler_counts = counts(
        "code_handler_count",
        r.decode_ints("code_handler_count", U5, n)?,
    )?;
    let h = handler_counts.iter().sum();
    let start = u16s("code_handler_start", r.decode_ints("code_handler_start", U5, h)?)?;
    let end = u16s("code_handler_end", r.decode_ints("code_handler_end", U5, h)?)?;
    let pc = u16s("code_handler_pc", r.decode_ints("code_handler_pc", U5, h)?)?;
    let class = u16s("code_handler_class", r.decode_ints("code_handler_class", U5, h)?)?;
    let handlers: Vec<ExceptionHandler> = (0..h)
        .map(|i| ExceptionHandler {
            start_pc: start[i],
            end_pc: end[i],
            handler_pc: pc[i],
            catch_type: class[i],
        })
        .collect();

    let attr_counts = counts("code_attr_count", r.decode_ints("code_attr_count", U5, n)?)?;
    let a = attr_counts.iter().sum();
    let kinds = r.decode_ints("code_attr_kind", U5, a)?;
    let names = u16s("code_attr_name", r.decode_ints("code_attr_name", U5, a)?)?;
    let tally = |k: &[i32]| kinds.iter().filter(|x| k.contains(x)).count();

    let line_counts = counts(
        "code_line_count",
        r.decode_ints("code_line_count", U5, tally(&[ATTR_LINE_NUMBERS]))?,
    )?;
    let l = line_counts.iter().sum();
    let line_start = u16s("code_line_start", r.decode_ints("code_line_start", U5, l)?)?;
    let line_number = u16s("code_line_number", r.decode_ints("code_line_number", U5, l)?)?;
    let lines: Vec<LineNumber> = line_start
        .into_iter()
        .zip(line_number)
        .map(|(start_pc, line_number)| LineNumber {
            start_pc,
            line_number,
        })
        .collect();

    let var_counts = counts(
        "code_local_count",
        r.decode_ints(
            "code_local_count",
            U5,
            tally(&[ATTR_LOCAL_VARIABLES, ATTR_LOCAL_VARIABLE_TYPES]),
        )?,
    )?;
    let v = var_counts.iter().sum();
    let mut var_column = |band: &str| -> Result<Vec<u16>> { u16s(band, r.decode_ints(band, U5, v)?) };
    let var_start = var_column("code_local_start")?;
    let var_length = var_column("code_local_length")?;
    let var_name = var_column("code_local_name")?;
    let var_descr = var_column("code_local_descr")?;
    let var_slot = var_column("code_local_slot")?;
    let vars: Vec<LocalVariable> = (0..v)
        .map(|i| LocalVariable {
            start_pc: var_start[i],
            length: var_length[i],
            name_index: var_name[i],
            descriptor_index: var_descr[i],
            index: var_slot[i],
        })
        .collect();

    let other_sizes = counts(
        "code_attr_size",
        r.decode_ints("code_attr_size", U5, tally(&[ATTR_OTHER]))?,
    )?;
    let other = r.decode_ints_2d("code_attr_bits", BYTES, &other_sizes)?;

    let mut lines = split_rows(lines, &line_counts).into_iter();
    let mut vars = split_rows(vars, &var_counts).into_iter();
    let mut other = other.into_iter();
    let mut attributes = Vec::with_capacity(a);
    for (kind, name_index) in kinds.into_iter().zip(names) {
        let attr = match kind {
            ATTR_LINE_NUMBERS => CodeAttribute::LineNumberTable {
                name_index,
                entries: lines.next().unwrap_or_default(),
            },
            ATTR_LOCAL_VARIABLES => CodeAttribute::LocalVariableTable {
                name_index,
                entries: vars.next().unwrap_or_default(),
            },
            ATTR_LOCAL_VARIABLE_TYPES => CodeAttribute::LocalVariableTypeTable {
                name_index,
                entries: vars.next().unwrap_or_default(),
            },
            ATTR_OTHER => CodeAttribute::Other(Attribute {
                name_index,
                info: other
                    .next()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|b| b as u8)
                    .collect(),
            }),
            _ => {
                return Err(PackError::mismatch(
                    "code_attr_kind",
                    format!("unknown code attribute kind {kind}"),
                ));
            }
        };
        attributes.push(attr);
    }

    let mut handlers = split_rows(handlers, &handler_counts).into_iter();
    let mut attributes = split_rows(attributes, &attr_counts).into_iter();
    Ok((0..n)
        .map(|i| CodeHeader {
            max_stack: stacks[i],
            max_na_locals: locals[i],
            exception_table: handlers.next().unwrap_or_default(),
            attributes: attributes.next().unwrap_or_default(),
        })
        .collect())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn u16s(band: &str, values: Vec<i32>) -> Result<Vec<u16>> {
    values
        .into_iter()
        .map(|v| {
            u16::try_from(v)
                .map_err(|_| PackError::mismatch(band, format!("value {v} exceeds 16 bits")))
        })
        .collect()
}

fn counts(band: &str, values: Vec<i32>) -> Result<Vec<usize>> {
    values
        .into_iter()
        .map(|v| {
            usize::try_from(v).map_err(|_| PackError::mismatch(band, format!("negative count {v}")))
        })
        .collect()
}

fn access_flags(band: &str, values: Vec<i64>) -> Result<Vec<AccessFlags>> {
    values
        .into_iter()
        .map(|v| {
            u16::try_from(v)
                .map(AccessFlags::from_bits_retain)
                .map_err(|_| PackError::mismatch(band, format!("flags {v:#x} exceed 16 bits")))
        })
        .collect()
}

/// Partition `flat` into consecutive rows of the given lengths.
fn split_rows<T>(flat: Vec<T>, lens: &[usize]) -> Vec<Vec<T>> {
    let mut flat = flat.into_iter();
    lens.iter()
        .map(|&n| flat.by_ref().take(n).collect())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classfile::{CpEntry, ConstantPool};
    use std::io::Cursor;

    fn class() -> ClassStructure {
        let pool = ConstantPool::from_entries([
            CpEntry::Utf8(b"Foo".to_vec()),
            CpEntry::Class(1),
            CpEntry::Utf8(b"run".to_vec()),
            CpEntry::Utf8(b"()V".to_vec()),
            CpEntry::Utf8(b"Code".to_vec()),
            CpEntry::Utf8(b"LineNumberTable".to_vec()),
            CpEntry::Utf8(b"Signature".to_vec()),
        ]);
        ClassStructure {
            minor_version: 0,
            major_version: 52,
            constant_pool: pool,
            access_flags: AccessFlags::PUBLIC | AccessFlags::from_bits_retain(0x8000),
            this_class: 2,
            super_class: 0,
            interfaces: vec![2],
            fields: vec![FieldInfo {
                access_flags: AccessFlags::PRIVATE,
                name_index: 3,
                descriptor_index: 4,
                attributes: vec![Attribute {
                    name_index: 7,
                    info: vec![0, 4],
                }],
            }],
            methods: vec![
                MethodInfo {
                    access_flags: AccessFlags::PUBLIC,
                    name_index: 3,
                    descriptor_index: 4,
                    code: None,
                    attributes: Vec::new(),
                },
                MethodInfo {
                    access_flags: AccessFlags::ABSTRACT,
                    name_index: 3,
                    descriptor_index: 4,
                    code: None,
                    attributes: Vec::new(),
                },
            ],
            attributes: vec![Attribute {
                name_index: 7,
                info: vec![0, 1],
            }],
        }
    }

    fn header() -> CodeHeader {
        CodeHeader {
            max_stack: 2,
            max_na_locals: -1,
            exception_table: vec![ExceptionHandler {
                start_pc: 0,
                end_pc: 3,
                handler_pc: 3,
                catch_type: 0,
            }],
            attributes: vec![
                CodeAttribute::LineNumberTable {
                    name_index: 6,
                    entries: vec![LineNumber {
                        start_pc: 0,
                        line_number: 12,
                    }],
                },
                CodeAttribute::Other(Attribute {
                    name_index: 7,
                    info: vec![9, 9, 9],
                }),
                CodeAttribute::LocalVariableTable {
                    name_index: 7,
                    entries: vec![LocalVariable {
                        start_pc: 0,
                        length: 4,
                        name_index: 3,
                        descriptor_index: 4,
                        index: 0,
                    }],
                },
            ],
        }
    }

    #[test]
    fn classes_and_headers_roundtrip() {
        let classes = vec![class(), class()];
        let headers = vec![vec![header()], vec![CodeHeader::default()]];
        let mut w = BandWriter::new(1);
        write(&mut w, &classes, &headers).unwrap();
        let (body, band_headers) = w.into_parts();

        let mut r = BandReader::new(Cursor::new(&body), &band_headers);
        let (back, back_headers) = read(&mut r, 2).unwrap();
        assert_eq!(back, classes);
        assert_eq!(back_headers, headers);
        assert_eq!(r.headers_remaining(), 0);
    }

    #[test]
    fn rows_split_in_order() {
        let rows = split_rows(vec![1, 2, 3, 4], &[1, 0, 3]);
        assert_eq!(rows, vec![vec![1], vec![], vec![2, 3, 4]]);
    }

    #[test]
    fn oversized_values_are_mismatches() {
        assert!(u16s("x", vec![65_536]).is_err());
        assert!(counts("x", vec![-1]).is_err());
        assert!(access_flags("x", vec![0x1_0000]).is_err());
    }
}
