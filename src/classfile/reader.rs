//! Structural reader over raw class bytes.
//!
//! [`ClassReader::new`] walks and validates the file structure once: header,
//! constant pool, members and attribute framing. Method bodies are only
//! located there; their opcodes are decoded and checked when
//! [`ClassReader::events`] runs without `skip_code`, so a bad instruction
//! surfaces at search time. The reader is immutable, so one instance can
//! serve any number of concurrent `events` calls.

use std::ops::Range;
use std::sync::Arc;

use super::constpool::{ConstantPool, Literal};
use super::cursor::ByteCursor;
use super::insn::{self, Instruction};
use crate::error::ClassFormatError;

pub const MAGIC: u32 = 0xCAFE_BABE;
pub const MIN_MAJOR_VERSION: u16 = 45;
pub const MAX_MAJOR_VERSION: u16 = 70;

#[derive(Debug, Clone, PartialEq)]
pub struct Header<'a> {
    pub major: u16,
    pub minor: u16,
    pub access: u16,
    pub name: &'a str,
    pub super_name: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub interfaces: Vec<&'a str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDecl<'a> {
    pub access: u16,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub signature: Option<&'a str>,
    pub constant: Option<Literal<'a>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MethodDecl<'a> {
    pub access: u16,
    pub name: &'a str,
    pub descriptor: &'a str,
    pub signature: Option<&'a str>,
    pub exceptions: Vec<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InnerClassEntry<'a> {
    pub name: &'a str,
    pub outer_name: Option<&'a str>,
    pub inner_name: Option<&'a str>,
    pub access: u16,
}

/// One step of a class traversal. `Instruction` and `MethodEnd` events
/// belong to the most recent `Method` event.
#[derive(Debug, Clone, PartialEq)]
pub enum ClassEvent<'a> {
    Header(Header<'a>),
    InnerClass(InnerClassEntry<'a>),
    Field(FieldDecl<'a>),
    Method(MethodDecl<'a>),
    Instruction {
        offset: usize,
        insn: Instruction<'a>,
    },
    MethodEnd,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct EventOptions {
    /// Leave method bodies undecoded; no `Instruction` events are produced.
    pub skip_code: bool,
}

#[derive(Debug, Clone, Default)]
struct MemberLayout {
    access: u16,
    name: u16,
    descriptor: u16,
    signature: u16,
    constant_value: u16,
    exceptions: Vec<u16>,
    code: Option<Range<usize>>,
}

#[derive(Debug, Clone, Copy)]
struct RawInnerClass {
    inner: u16,
    outer: u16,
    inner_name: u16,
    access: u16,
}

#[derive(Debug, Clone)]
pub struct ClassReader {
    bytes: Arc<[u8]>,
    pool: ConstantPool,
    major: u16,
    minor: u16,
    access: u16,
    this_class: u16,
    super_class: u16,
    interfaces: Vec<u16>,
    signature: u16,
    fields: Vec<MemberLayout>,
    methods: Vec<MemberLayout>,
    inner_classes: Vec<RawInnerClass>,
}

impl ClassReader {
    pub fn new(bytes: Arc<[u8]>) -> Result<Self, ClassFormatError> {
        let mut cursor = ByteCursor::new(&bytes);

        let magic = cursor.u4()?;
        if magic != MAGIC {
            return Err(ClassFormatError::BadMagic(magic));
        }
        let minor = cursor.u2()?;
        let major = cursor.u2()?;
        if !(MIN_MAJOR_VERSION..=MAX_MAJOR_VERSION).contains(&major) {
            return Err(ClassFormatError::UnsupportedVersion { major, minor });
        }

        let pool = ConstantPool::parse(&mut cursor)?;
        let access = cursor.u2()?;
        let this_class = cursor.u2()?;
        let super_class = cursor.u2()?;
        let interface_count = cursor.u2()?;
        let mut interfaces = Vec::with_capacity(usize::from(interface_count));
        for _ in 0..interface_count {
            interfaces.push(cursor.u2()?);
        }

        let fields = read_members(&mut cursor, &pool)?;
        let methods = read_members(&mut cursor, &pool)?;

        let mut signature = 0;
        let mut inner_classes = Vec::new();
        let attr_count = cursor.u2()?;
        for _ in 0..attr_count {
            let (name, body, _) = read_attribute(&mut cursor, &pool)?;
            let mut attr = ByteCursor::new(body);
            match name {
                "Signature" => {
                    expect_len(name, body, 2)?;
                    signature = attr.u2()?;
                }
                "InnerClasses" => {
                    let count = attr.u2()?;
                    expect_len(name, body, 2 + 8 * usize::from(count))?;
                    for _ in 0..count {
                        inner_classes.push(RawInnerClass {
                            inner: attr.u2()?,
                            outer: attr.u2()?,
                            inner_name: attr.u2()?,
                            access: attr.u2()?,
                        });
                    }
                }
                _ => {}
            }
        }

        if cursor.remaining() > 0 {
            return Err(ClassFormatError::TrailingBytes {
                trailing: cursor.remaining(),
            });
        }

        let reader = Self {
            bytes,
            pool,
            major,
            minor,
            access,
            this_class,
            super_class,
            interfaces,
            signature,
            fields,
            methods,
            inner_classes,
        };
        reader.check_references()?;
        Ok(reader)
    }

    pub fn name(&self) -> Result<&str, ClassFormatError> {
        self.pool.class_name(self.this_class)
    }

    pub fn header(&self) -> Result<Header<'_>, ClassFormatError> {
        Ok(Header {
            major: self.major,
            minor: self.minor,
            access: self.access,
            name: self.name()?,
            super_name: self.pool.optional_class_name(self.super_class)?,
            signature: self.pool.optional_utf8(self.signature)?,
            interfaces: self
                .interfaces
                .iter()
                .map(|&i| self.pool.class_name(i))
                .collect::<Result<_, _>>()?,
        })
    }

    pub fn inner_classes(&self) -> Result<Vec<InnerClassEntry<'_>>, ClassFormatError> {
        self.inner_classes
            .iter()
            .map(|raw| {
                Ok(InnerClassEntry {
                    name: self.pool.class_name(raw.inner)?,
                    outer_name: self.pool.optional_class_name(raw.outer)?,
                    inner_name: self.pool.optional_utf8(raw.inner_name)?,
                    access: raw.access,
                })
            })
            .collect()
    }

    /// Produces the full structural event sequence for this class.
    pub fn events(&self, options: EventOptions) -> Result<Vec<ClassEvent<'_>>, ClassFormatError> {
        let mut events = Vec::with_capacity(1 + self.fields.len() + self.methods.len() * 2);
        events.push(ClassEvent::Header(self.header()?));
        events.extend(self.inner_classes()?.into_iter().map(ClassEvent::InnerClass));

        for field in &self.fields {
            events.push(ClassEvent::Field(self.field_decl(field)?));
        }

        for method in &self.methods {
            events.push(ClassEvent::Method(self.method_decl(method)?));
            if let (false, Some(range)) = (options.skip_code, method.code.as_ref()) {
                for (offset, insn) in insn::decode(&self.bytes[range.clone()], &self.pool)? {
                    events.push(ClassEvent::Instruction { offset, insn });
                }
            }
            events.push(ClassEvent::MethodEnd);
        }

        Ok(events)
    }

    fn field_decl(&self, field: &MemberLayout) -> Result<FieldDecl<'_>, ClassFormatError> {
        let constant = if field.constant_value == 0 {
            None
        } else {
            Some(self.pool.literal(field.constant_value)?)
        };
        Ok(FieldDecl {
            access: field.access,
            name: self.pool.utf8(field.name)?,
            descriptor: self.pool.utf8(field.descriptor)?,
            signature: self.pool.optional_utf8(field.signature)?,
            constant,
        })
    }

    fn method_decl(&self, method: &MemberLayout) -> Result<MethodDecl<'_>, ClassFormatError> {
        Ok(MethodDecl {
            access: method.access,
            name: self.pool.utf8(method.name)?,
            descriptor: self.pool.utf8(method.descriptor)?,
            signature: self.pool.optional_utf8(method.signature)?,
            exceptions: method
                .exceptions
                .iter()
                .map(|&i| self.pool.class_name(i))
                .collect::<Result<_, _>>()?,
        })
    }

    fn check_references(&self) -> Result<(), ClassFormatError> {
        self.header()?;
        self.inner_classes()?;
        for field in &self.fields {
            self.field_decl(field)?;
        }
        for method in &self.methods {
            self.method_decl(method)?;
        }
        Ok(())
    }
}

fn read_members(
    cursor: &mut ByteCursor<'_>,
    pool: &ConstantPool,
) -> Result<Vec<MemberLayout>, ClassFormatError> {
    let count = cursor.u2()?;
    let mut members = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let mut member = MemberLayout {
            access: cursor.u2()?,
            name: cursor.u2()?,
            descriptor: cursor.u2()?,
            ..MemberLayout::default()
        };
        let attr_count = cursor.u2()?;
        for _ in 0..attr_count {
            let (name, body, body_start) = read_attribute(cursor, pool)?;
            let mut attr = ByteCursor::new(body);
            match name {
                "Signature" => {
                    expect_len(name, body, 2)?;
                    member.signature = attr.u2()?;
                }
                "ConstantValue" => {
                    expect_len(name, body, 2)?;
                    member.constant_value = attr.u2()?;
                }
                "Exceptions" => {
                    let count = attr.u2()?;
                    expect_len(name, body, 2 + 2 * usize::from(count))?;
                    for _ in 0..count {
                        member.exceptions.push(attr.u2()?);
                    }
                }
                "Code" => {
                    let range = read_code_attribute(body, pool)?;
                    member.code = Some(body_start + range.start..body_start + range.end);
                }
                _ => {}
            }
        }
        members.push(member);
    }
    Ok(members)
}

/// Returns the attribute's name, its body, and the body's absolute offset.
fn read_attribute<'a, 'p>(
    cursor: &mut ByteCursor<'a>,
    pool: &'p ConstantPool,
) -> Result<(&'p str, &'a [u8], usize), ClassFormatError> {
    let name = pool.utf8(cursor.u2()?)?;
    let len = cursor.u4()? as usize;
    let start = cursor.position();
    let body = cursor.take(len).map_err(|_| malformed(name, "length exceeds class data"))?;
    Ok((name, body, start))
}

/// Validates a `Code` attribute body; returns the bytecode's range within it.
fn read_code_attribute(body: &[u8], pool: &ConstantPool) -> Result<Range<usize>, ClassFormatError> {
    let fail = |reason: &str| malformed("Code", reason);
    let mut cursor = ByteCursor::new(body);
    cursor.skip(4).map_err(|_| fail("missing max_stack/max_locals"))?;
    let code_len = cursor.u4().map_err(|_| fail("missing code_length"))? as usize;
    let start = cursor.position();
    cursor.skip(code_len).map_err(|_| fail("code_length exceeds attribute"))?;
    let end = cursor.position();

    let handlers = cursor.u2().map_err(|_| fail("missing exception table"))?;
    cursor
        .skip(8 * usize::from(handlers))
        .map_err(|_| fail("truncated exception table"))?;

    let attr_count = cursor.u2().map_err(|_| fail("missing attribute count"))?;
    for _ in 0..attr_count {
        read_attribute(&mut cursor, pool)?;
    }
    if cursor.remaining() > 0 {
        return Err(fail("length does not match contents"));
    }
    Ok(start..end)
}

fn expect_len(name: &str, body: &[u8], expected: usize) -> Result<(), ClassFormatError> {
    if body.len() != expected {
        return Err(malformed(
            name,
            &format!("expected {expected} bytes, found {}", body.len()),
        ));
    }
    Ok(())
}

fn malformed(name: &str, reason: &str) -> ClassFormatError {
    ClassFormatError::MalformedAttribute {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}
