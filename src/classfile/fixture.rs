//! Minimal class-file assembler for tests.
//!
//! Depends only on std so integration tests can pull it in with `#[path]`.

#![allow(dead_code)]

use std::collections::HashMap;

/// A bytecode instruction to assemble. Pool indices are resolved by the builder.
#[derive(Debug, Clone)]
pub enum Op<'a> {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(&'a str),
    Class(&'a str),
    /// Opcode, owner, name, descriptor.
    Invoke(u8, &'a str, &'a str, &'a str),
    Field(u8, &'a str, &'a str, &'a str),
    Type(u8, &'a str),
    Raw(Vec<u8>),
    Return,
}

/// A field `ConstantValue`.
#[derive(Debug, Clone, Copy)]
pub enum Value<'a> {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Key {
    Utf8(String),
    Class(String),
    Str(String),
    Int(i32),
    Float(u32),
    Long(i64),
    Double(u64),
    NameAndType(String, String),
    Ref(u8, String, String, String),
}

#[derive(Default)]
struct Pool {
    bytes: Vec<u8>,
    next: u16,
    index: HashMap<Key, u16>,
}

impl Pool {
    fn new() -> Self {
        Self {
            next: 1,
            ..Self::default()
        }
    }

    fn intern(&mut self, key: Key, wide: bool, encode: impl FnOnce(&mut Self) -> Vec<u8>) -> u16 {
        if let Some(&i) = self.index.get(&key) {
            return i;
        }
        let body = encode(self);
        let i = self.next;
        self.bytes.extend_from_slice(&body);
        self.next += if wide { 2 } else { 1 };
        self.index.insert(key, i);
        i
    }

    fn utf8(&mut self, s: &str) -> u16 {
        self.intern(Key::Utf8(s.to_string()), false, |_| {
            let mut b = vec![1];
            b.extend_from_slice(&(s.len() as u16).to_be_bytes());
            b.extend_from_slice(s.as_bytes());
            b
        })
    }

    fn class(&mut self, name: &str) -> u16 {
        self.intern(Key::Class(name.to_string()), false, |p| {
            let n = p.utf8(name);
            tagged(7, &[n])
        })
    }

    fn string(&mut self, s: &str) -> u16 {
        self.intern(Key::Str(s.to_string()), false, |p| {
            let n = p.utf8(s);
            tagged(8, &[n])
        })
    }

    fn int(&mut self, v: i32) -> u16 {
        self.intern(Key::Int(v), false, |_| {
            let mut b = vec![3];
            b.extend_from_slice(&v.to_be_bytes());
            b
        })
    }

    fn float(&mut self, v: f32) -> u16 {
        self.intern(Key::Float(v.to_bits()), false, |_| {
            let mut b = vec![4];
            b.extend_from_slice(&v.to_bits().to_be_bytes());
            b
        })
    }

    fn long(&mut self, v: i64) -> u16 {
        self.intern(Key::Long(v), true, |_| {
            let mut b = vec![5];
            b.extend_from_slice(&v.to_be_bytes());
            b
        })
    }

    fn double(&mut self, v: f64) -> u16 {
        self.intern(Key::Double(v.to_bits()), true, |_| {
            let mut b = vec![6];
            b.extend_from_slice(&v.to_bits().to_be_bytes());
            b
        })
    }

    fn name_and_type(&mut self, name: &str, desc: &str) -> u16 {
        self.intern(
            Key::NameAndType(name.to_string(), desc.to_string()),
            false,
            |p| {
                let n = p.utf8(name);
                let d = p.utf8(desc);
                tagged(12, &[n, d])
            },
        )
    }

    fn member(&mut self, tag: u8, owner: &str, name: &str, desc: &str) -> u16 {
        self.intern(
            Key::Ref(tag, owner.to_string(), name.to_string(), desc.to_string()),
            false,
            |p| {
                let c = p.class(owner);
                let nat = p.name_and_type(name, desc);
                tagged(tag, &[c, nat])
            },
        )
    }
}

fn tagged(tag: u8, indices: &[u16]) -> Vec<u8> {
    let mut b = vec![tag];
    for i in indices {
        b.extend_from_slice(&i.to_be_bytes());
    }
    b
}

struct Member<'a> {
    access: u16,
    name: &'a str,
    descriptor: &'a str,
    constant: Option<Value<'a>>,
    exceptions: Vec<&'a str>,
    code: Option<Vec<Op<'a>>>,
}

/// Builds a structurally valid class file.
pub struct ClassBuilder<'a> {
    name: &'a str,
    super_name: Option<&'a str>,
    access: u16,
    major: u16,
    minor: u16,
    signature: Option<&'a str>,
    interfaces: Vec<&'a str>,
    fields: Vec<Member<'a>>,
    methods: Vec<Member<'a>>,
    inner_classes: Vec<(&'a str, Option<&'a str>, Option<&'a str>, u16)>,
    raw_attributes: Vec<(&'a str, Vec<u8>)>,
}

impl<'a> ClassBuilder<'a> {
    pub fn new(name: &'a str) -> Self {
        Self {
            name,
            super_name: Some("java/lang/Object"),
            access: 0x0021,
            major: 52,
            minor: 0,
            signature: None,
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            inner_classes: Vec::new(),
            raw_attributes: Vec::new(),
        }
    }

    pub fn version(mut self, major: u16) -> Self {
        self.major = major;
        self
    }

    pub fn access(mut self, access: u16) -> Self {
        self.access = access;
        self
    }

    pub fn super_name(mut self, super_name: Option<&'a str>) -> Self {
        self.super_name = super_name;
        self
    }

    pub fn signature(mut self, signature: &'a str) -> Self {
        self.signature = Some(signature);
        self
    }

    pub fn interface(mut self, name: &'a str) -> Self {
        self.interfaces.push(name);
        self
    }

    pub fn field(self, access: u16, name: &'a str, descriptor: &'a str) -> Self {
        self.push_field(access, name, descriptor, None)
    }

    pub fn constant_field(
        self,
        access: u16,
        name: &'a str,
        descriptor: &'a str,
        value: Value<'a>,
    ) -> Self {
        self.push_field(access, name, descriptor, Some(value))
    }

    fn push_field(
        mut self,
        access: u16,
        name: &'a str,
        descriptor: &'a str,
        constant: Option<Value<'a>>,
    ) -> Self {
        self.fields.push(Member {
            access,
            name,
            descriptor,
            constant,
            exceptions: Vec::new(),
            code: None,
        });
        self
    }

    pub fn method(
        mut self,
        access: u16,
        name: &'a str,
        descriptor: &'a str,
        exceptions: &[&'a str],
        code: Option<Vec<Op<'a>>>,
    ) -> Self {
        self.methods.push(Member {
            access,
            name,
            descriptor,
            constant: None,
            exceptions: exceptions.to_vec(),
            code,
        });
        self
    }

    pub fn inner_class(
        mut self,
        name: &'a str,
        outer_name: Option<&'a str>,
        inner_name: Option<&'a str>,
        access: u16,
    ) -> Self {
        self.inner_classes.push((name, outer_name, inner_name, access));
        self
    }

    pub fn raw_attribute(mut self, name: &'a str, body: Vec<u8>) -> Self {
        self.raw_attributes.push((name, body));
        self
    }

    pub fn build(self) -> Vec<u8> {
        let mut pool = Pool::new();
        let mut tail = Vec::new();

        let this = pool.class(self.name);
        let sup = self.super_name.map(|s| pool.class(s)).unwrap_or(0);
        put_u2(&mut tail, self.access);
        put_u2(&mut tail, this);
        put_u2(&mut tail, sup);
        put_u2(&mut tail, self.interfaces.len() as u16);
        for i in &self.interfaces {
            let idx = pool.class(i);
            put_u2(&mut tail, idx);
        }

        put_u2(&mut tail, self.fields.len() as u16);
        for f in &self.fields {
            put_member_head(&mut tail, &mut pool, f);
            match f.constant {
                Some(v) => {
                    put_u2(&mut tail, 1);
                    let idx = match v {
                        Value::Int(x) => pool.int(x),
                        Value::Long(x) => pool.long(x),
                        Value::Float(x) => pool.float(x),
                        Value::Double(x) => pool.double(x),
                        Value::Str(s) => pool.string(s),
                    };
                    put_attribute(&mut tail, &mut pool, "ConstantValue", &idx.to_be_bytes());
                }
                None => put_u2(&mut tail, 0),
            }
        }

        put_u2(&mut tail, self.methods.len() as u16);
        for m in &self.methods {
            put_member_head(&mut tail, &mut pool, m);
            let attr_count = u16::from(!m.exceptions.is_empty()) + u16::from(m.code.is_some());
            put_u2(&mut tail, attr_count);
            if !m.exceptions.is_empty() {
                let mut body = Vec::new();
                put_u2(&mut body, m.exceptions.len() as u16);
                for e in &m.exceptions {
                    let idx = pool.class(e);
                    put_u2(&mut body, idx);
                }
                put_attribute(&mut tail, &mut pool, "Exceptions", &body);
            }
            if let Some(ops) = &m.code {
                let code = assemble(ops, &mut pool);
                let mut body = Vec::new();
                put_u2(&mut body, 16);
                put_u2(&mut body, 16);
                body.extend_from_slice(&(code.len() as u32).to_be_bytes());
                body.extend_from_slice(&code);
                put_u2(&mut body, 0);
                put_u2(&mut body, 0);
                put_attribute(&mut tail, &mut pool, "Code", &body);
            }
        }

        let mut attributes: Vec<(&str, Vec<u8>)> = Vec::new();
        if let Some(sig) = self.signature {
            let idx = pool.utf8(sig);
            attributes.push(("Signature", idx.to_be_bytes().to_vec()));
        }
        if !self.inner_classes.is_empty() {
            let mut body = Vec::new();
            put_u2(&mut body, self.inner_classes.len() as u16);
            for (name, outer, simple, access) in &self.inner_classes {
                let n = pool.class(name);
                let o = outer.map(|o| pool.class(o)).unwrap_or(0);
                let s = simple.map(|s| pool.utf8(s)).unwrap_or(0);
                put_u2(&mut body, n);
                put_u2(&mut body, o);
                put_u2(&mut body, s);
                put_u2(&mut body, *access);
            }
            attributes.push(("InnerClasses", body));
        }
        for (name, body) in &self.raw_attributes {
            attributes.push((*name, body.clone()));
        }
        put_u2(&mut tail, attributes.len() as u16);
        for (name, body) in &attributes {
            put_attribute(&mut tail, &mut pool, name, body);
        }

        let mut out = Vec::new();
        out.extend_from_slice(&0xCAFE_BABEu32.to_be_bytes());
        put_u2(&mut out, self.minor);
        put_u2(&mut out, self.major);
        put_u2(&mut out, pool.next);
        out.extend_from_slice(&pool.bytes);
        out.extend_from_slice(&tail);
        out
    }
}

fn put_u2(out: &mut Vec<u8>, v: u16) {
    out.extend_from_slice(&v.to_be_bytes());
}

fn ldc(code: &mut Vec<u8>, opcode: u8, index: u16) {
    code.push(opcode);
    code.extend_from_slice(&index.to_be_bytes());
}

fn put_member_head(out: &mut Vec<u8>, pool: &mut Pool, m: &Member<'_>) {
    put_u2(out, m.access);
    let n = pool.utf8(m.name);
    let d = pool.utf8(m.descriptor);
    put_u2(out, n);
    put_u2(out, d);
}

fn put_attribute(out: &mut Vec<u8>, pool: &mut Pool, name: &str, body: &[u8]) {
    let n = pool.utf8(name);
    put_u2(out, n);
    out.extend_from_slice(&(body.len() as u32).to_be_bytes());
    out.extend_from_slice(body);
}

fn assemble(ops: &[Op<'_>], pool: &mut Pool) -> Vec<u8> {
    let mut code = Vec::new();
    for op in ops {
        match op {
            Op::Int(v) if (-1..=5).contains(v) => code.push((v + 3) as u8),
            Op::Int(v) if i8::try_from(*v).is_ok() => {
                code.push(0x10);
                code.push(*v as i8 as u8);
            }
            Op::Int(v) if i16::try_from(*v).is_ok() => {
                code.push(0x11);
                code.extend_from_slice(&(*v as i16).to_be_bytes());
            }
            Op::Int(v) => ldc(&mut code, 0x13, pool.int(*v)),
            Op::Float(v) => ldc(&mut code, 0x13, pool.float(*v)),
            Op::Str(s) => ldc(&mut code, 0x13, pool.string(s)),
            Op::Class(c) => ldc(&mut code, 0x13, pool.class(c)),
            Op::Long(v) => ldc(&mut code, 0x14, pool.long(*v)),
            Op::Double(v) => ldc(&mut code, 0x14, pool.double(*v)),
            Op::Invoke(opcode, owner, name, desc) => {
                let tag = if *opcode == 0xB9 { 11 } else { 10 };
                let idx = pool.member(tag, owner, name, desc);
                code.push(*opcode);
                code.extend_from_slice(&idx.to_be_bytes());
                if *opcode == 0xB9 {
                    code.extend_from_slice(&[1, 0]);
                }
            }
            Op::Field(opcode, owner, name, desc) => {
                let idx = pool.member(9, owner, name, desc);
                code.push(*opcode);
                code.extend_from_slice(&idx.to_be_bytes());
            }
            Op::Type(opcode, name) => {
                let idx = pool.class(name);
                code.push(*opcode);
                code.extend_from_slice(&idx.to_be_bytes());
                if *opcode == 0xC5 {
                    code.push(1);
                }
            }
            Op::Raw(bytes) => code.extend_from_slice(bytes),
            Op::Return => code.push(0xB1),
        }
    }
    code
}
