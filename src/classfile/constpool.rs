//! Constant pool decoding.
//!
//! The whole pool is decoded and cross-checked once when a reader is built,
//! so later lookups only fail for indices that come from elsewhere in the
//! file (attribute or instruction operands).

use super::cursor::ByteCursor;
use crate::error::ClassFormatError;

const TAG_UTF8: u8 = 1;
const TAG_INTEGER: u8 = 3;
const TAG_FLOAT: u8 = 4;
const TAG_LONG: u8 = 5;
const TAG_DOUBLE: u8 = 6;
const TAG_CLASS: u8 = 7;
const TAG_STRING: u8 = 8;
const TAG_FIELDREF: u8 = 9;
const TAG_METHODREF: u8 = 10;
const TAG_INTERFACE_METHODREF: u8 = 11;
const TAG_NAME_AND_TYPE: u8 = 12;
const TAG_METHOD_HANDLE: u8 = 15;
const TAG_METHOD_TYPE: u8 = 16;
const TAG_DYNAMIC: u8 = 17;
const TAG_INVOKE_DYNAMIC: u8 = 18;
const TAG_MODULE: u8 = 19;
const TAG_PACKAGE: u8 = 20;

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    /// Slot 0 and the upper half of a long/double.
    Unusable,
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class { name: u16 },
    String { value: u16 },
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType { descriptor: u16 },
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module { name: u16 },
    Package { name: u16 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefKind {
    Field,
    Method,
    InterfaceMethod,
}

/// A resolved field or method reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub kind: RefKind,
    pub owner: &'a str,
    pub name: &'a str,
    pub descriptor: &'a str,
}

/// A loadable constant, as pushed by `ldc` or stored in `ConstantValue`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(&'a str),
    Class(&'a str),
    MethodType(&'a str),
    /// Method handles and dynamic constants; carried but never matched.
    Opaque,
}

#[derive(Debug, Clone, Default)]
pub struct ConstantPool {
    entries: Vec<Constant>,
}

impl ConstantPool {
    pub fn parse(cursor: &mut ByteCursor<'_>) -> Result<Self, ClassFormatError> {
        let count = cursor.u2()?;
        let mut entries = Vec::with_capacity(usize::from(count));
        entries.push(Constant::Unusable);

        let mut index: u16 = 1;
        while index < count {
            let tag = cursor.u1()?;
            let entry = match tag {
                TAG_UTF8 => {
                    let len = usize::from(cursor.u2()?);
                    let raw = cursor.take(len)?;
                    let text =
                        decode_modified_utf8(raw).ok_or(ClassFormatError::BadUtf8 { index })?;
                    Constant::Utf8(text)
                }
                TAG_INTEGER => Constant::Integer(cursor.i4()?),
                TAG_FLOAT => Constant::Float(f32::from_bits(cursor.u4()?)),
                TAG_LONG => Constant::Long(cursor.u8()? as i64),
                TAG_DOUBLE => Constant::Double(f64::from_bits(cursor.u8()?)),
                TAG_CLASS => Constant::Class { name: cursor.u2()? },
                TAG_STRING => Constant::String { value: cursor.u2()? },
                TAG_FIELDREF => Constant::FieldRef {
                    class: cursor.u2()?,
                    name_and_type: cursor.u2()?,
                },
                TAG_METHODREF => Constant::MethodRef {
                    class: cursor.u2()?,
                    name_and_type: cursor.u2()?,
                },
                TAG_INTERFACE_METHODREF => Constant::InterfaceMethodRef {
                    class: cursor.u2()?,
                    name_and_type: cursor.u2()?,
                },
                TAG_NAME_AND_TYPE => Constant::NameAndType {
                    name: cursor.u2()?,
                    descriptor: cursor.u2()?,
                },
                TAG_METHOD_HANDLE => Constant::MethodHandle {
                    kind: cursor.u1()?,
                    reference: cursor.u2()?,
                },
                TAG_METHOD_TYPE => Constant::MethodType {
                    descriptor: cursor.u2()?,
                },
                TAG_DYNAMIC => Constant::Dynamic {
                    bootstrap: cursor.u2()?,
                    name_and_type: cursor.u2()?,
                },
                TAG_INVOKE_DYNAMIC => Constant::InvokeDynamic {
                    bootstrap: cursor.u2()?,
                    name_and_type: cursor.u2()?,
                },
                TAG_MODULE => Constant::Module { name: cursor.u2()? },
                TAG_PACKAGE => Constant::Package { name: cursor.u2()? },
                other => return Err(ClassFormatError::UnknownPoolTag { index, tag: other }),
            };

            let wide = matches!(entry, Constant::Long(_) | Constant::Double(_));
            entries.push(entry);
            index += 1;
            if wide {
                if index >= count {
                    return Err(ClassFormatError::BadPoolIndex { index });
                }
                entries.push(Constant::Unusable);
                index += 1;
            }
        }

        let pool = Self { entries };
        pool.validate()?;
        Ok(pool)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.len() <= 1
    }

    pub fn get(&self, index: u16) -> Result<&Constant, ClassFormatError> {
        match self.entries.get(usize::from(index)) {
            Some(Constant::Unusable) | None => Err(ClassFormatError::BadPoolIndex { index }),
            Some(c) => Ok(c),
        }
    }

    pub fn utf8(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.get(index)? {
            Constant::Utf8(s) => Ok(s),
            _ => Err(wrong(index, "Utf8")),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, ClassFormatError> {
        match self.get(index)? {
            Constant::Class { name } => self.utf8(*name),
            _ => Err(wrong(index, "Class")),
        }
    }

    /// Like [`Self::class_name`] but treats index 0 as "absent".
    pub fn optional_class_name(&self, index: u16) -> Result<Option<&str>, ClassFormatError> {
        if index == 0 {
            return Ok(None);
        }
        self.class_name(index).map(Some)
    }

    pub fn optional_utf8(&self, index: u16) -> Result<Option<&str>, ClassFormatError> {
        if index == 0 {
            return Ok(None);
        }
        self.utf8(index).map(Some)
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassFormatError> {
        match self.get(index)? {
            Constant::NameAndType { name, descriptor } => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(wrong(index, "NameAndType")),
        }
    }

    pub fn member_ref(&self, index: u16) -> Result<MemberRef<'_>, ClassFormatError> {
        let (kind, class, nat) = match self.get(index)? {
            Constant::FieldRef {
                class,
                name_and_type,
            } => (RefKind::Field, *class, *name_and_type),
            Constant::MethodRef {
                class,
                name_and_type,
            } => (RefKind::Method, *class, *name_and_type),
            Constant::InterfaceMethodRef {
                class,
                name_and_type,
            } => (RefKind::InterfaceMethod, *class, *name_and_type),
            _ => return Err(wrong(index, "Fieldref/Methodref")),
        };
        let (name, descriptor) = self.name_and_type(nat)?;
        Ok(MemberRef {
            kind,
            owner: self.class_name(class)?,
            name,
            descriptor,
        })
    }

    /// Name and descriptor of an `invokedynamic` call site.
    pub fn invoke_dynamic(&self, index: u16) -> Result<(&str, &str), ClassFormatError> {
        match self.get(index)? {
            Constant::InvokeDynamic { name_and_type, .. } => self.name_and_type(*name_and_type),
            _ => Err(wrong(index, "InvokeDynamic")),
        }
    }

    pub fn literal(&self, index: u16) -> Result<Literal<'_>, ClassFormatError> {
        Ok(match self.get(index)? {
            Constant::Integer(v) => Literal::Int(*v),
            Constant::Long(v) => Literal::Long(*v),
            Constant::Float(v) => Literal::Float(*v),
            Constant::Double(v) => Literal::Double(*v),
            Constant::String { value } => Literal::String(self.utf8(*value)?),
            Constant::Class { name } => Literal::Class(self.utf8(*name)?),
            Constant::MethodType { descriptor } => Literal::MethodType(self.utf8(*descriptor)?),
            Constant::MethodHandle { .. } | Constant::Dynamic { .. } => Literal::Opaque,
            _ => return Err(wrong(index, "loadable constant")),
        })
    }

    fn validate(&self) -> Result<(), ClassFormatError> {
        for entry in &self.entries {
            match entry {
                Constant::Class { name } | Constant::Module { name } | Constant::Package { name } => {
                    self.utf8(*name)?;
                }
                Constant::String { value } => {
                    self.utf8(*value)?;
                }
                Constant::MethodType { descriptor } => {
                    self.utf8(*descriptor)?;
                }
                Constant::NameAndType { name, descriptor } => {
                    self.utf8(*name)?;
                    self.utf8(*descriptor)?;
                }
                Constant::FieldRef {
                    class,
                    name_and_type,
                }
                | Constant::MethodRef {
                    class,
                    name_and_type,
                }
                | Constant::InterfaceMethodRef {
                    class,
                    name_and_type,
                } => {
                    self.class_name(*class)?;
                    self.name_and_type(*name_and_type)?;
                }
                Constant::Dynamic { name_and_type, .. }
                | Constant::InvokeDynamic { name_and_type, .. } => {
                    self.name_and_type(*name_and_type)?;
                }
                Constant::MethodHandle { reference, .. } => {
                    self.get(*reference)?;
                }
                _ => {}
            }
        }
        Ok(())
    }
}

fn wrong(index: u16, expected: &'static str) -> ClassFormatError {
    ClassFormatError::WrongPoolTag { index, expected }
}

/// Decodes the JVM's modified UTF-8 (no raw NULs, surrogates encoded as
/// separate three-byte sequences).
pub fn decode_modified_utf8(raw: &[u8]) -> Option<String> {
    if raw.iter().all(|&b| b != 0 && b < 0x80) {
        return std::str::from_utf8(raw).ok().map(str::to_string);
    }

    let mut units: Vec<u16> = Vec::with_capacity(raw.len());
    let mut i = 0;
    while i < raw.len() {
        let b = raw[i];
        if b == 0 {
            return None;
        }
        if b < 0x80 {
            units.push(u16::from(b));
            i += 1;
        } else if b & 0xE0 == 0xC0 {
            let b2 = *raw.get(i + 1)?;
            if b2 & 0xC0 != 0x80 {
                return None;
            }
            units.push((u16::from(b & 0x1F) << 6) | u16::from(b2 & 0x3F));
            i += 2;
        } else if b & 0xF0 == 0xE0 {
            let b2 = *raw.get(i + 1)?;
            let b3 = *raw.get(i + 2)?;
            if b2 & 0xC0 != 0x80 || b3 & 0xC0 != 0x80 {
                return None;
            }
            units.push(
                (u16::from(b & 0x0F) << 12) | (u16::from(b2 & 0x3F) << 6) | u16::from(b3 & 0x3F),
            );
            i += 3;
        } else {
            return None;
        }
    }
    // Java permits unpaired surrogates; keep the rest of the name readable.
    Some(String::from_utf16_lossy(&units))
}
