//! Structural model of one compiled class.
//!
//! A [`ClassRecord`] is built once from raw bytes and never changes. Nesting
//! metadata (direct inner classes and the enclosing-class chain) is resolved
//! at parse time from the class's own `InnerClasses` attribute, so outline
//! views never have to scan the rest of the workspace.

use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, HashSet};
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

use serde::{Deserialize, Serialize};

use crate::classfile::reader::{ClassEvent, ClassReader, EventOptions, InnerClassEntry};
use crate::error::ClassFormatError;
use crate::members::{FieldRecord, InnerClassRecord, MethodRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct ClassVersion {
    pub major: u16,
    pub minor: u16,
}

/// What to do with an `InnerClasses` entry that names a class as its own outer class.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SelfEnclosurePolicy {
    /// Drop the entry and record a [`ClassAnomaly::SelfEnclosure`].
    #[default]
    Drop,
    /// Fail the parse with [`ClassFormatError::SelfEnclosure`].
    Reject,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ParseOptions {
    pub self_enclosure: SelfEnclosurePolicy,
}

/// Non-fatal irregularities found while building a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum ClassAnomaly {
    /// The outer-class links loop back on themselves; the chain stops before `at`.
    CyclicEnclosure { at: String },
    /// An inner-class entry listed `entry` as its own outer class.
    SelfEnclosure { entry: String },
}

#[derive(Debug)]
pub struct ClassRecord {
    name: String,
    super_name: Option<String>,
    signature: Option<String>,
    interfaces: Vec<String>,
    version: ClassVersion,
    access: u16,
    fields: Vec<FieldRecord>,
    methods: Vec<MethodRecord>,
    inner_classes: Vec<InnerClassRecord>,
    enclosing_chain: Vec<String>,
    anomalies: Vec<ClassAnomaly>,
    bytes: Arc<[u8]>,
    reader: OnceLock<Result<ClassReader, ClassFormatError>>,
    hash: MemoHash,
}

impl ClassRecord {
    pub fn parse(bytes: impl Into<Arc<[u8]>>) -> Result<Self, ClassFormatError> {
        Self::parse_with(bytes, &ParseOptions::default())
    }

    pub fn parse_with(
        bytes: impl Into<Arc<[u8]>>,
        options: &ParseOptions,
    ) -> Result<Self, ClassFormatError> {
        let bytes: Arc<[u8]> = bytes.into();
        let reader = ClassReader::new(Arc::clone(&bytes))?;
        let name = reader.name()?.to_string();

        let mut super_name = None;
        let mut signature = None;
        let mut interfaces = Vec::new();
        let mut version = ClassVersion { major: 0, minor: 0 };
        let mut access = 0;
        let mut fields = Vec::new();
        let mut methods = Vec::new();
        let mut entries: Vec<InnerClassEntry<'_>> = Vec::new();

        for event in reader.events(EventOptions { skip_code: true })? {
            match event {
                ClassEvent::Header(h) => {
                    super_name = h.super_name.map(str::to_string);
                    signature = h.signature.map(str::to_string);
                    interfaces = h.interfaces.iter().map(|i| i.to_string()).collect();
                    version = ClassVersion {
                        major: h.major,
                        minor: h.minor,
                    };
                    access = h.access;
                }
                ClassEvent::Field(f) => fields.push(FieldRecord::from_decl(&name, &f)),
                ClassEvent::Method(m) => methods.push(MethodRecord::from_decl(&name, &m)),
                ClassEvent::InnerClass(entry) => entries.push(entry),
                ClassEvent::Instruction { .. } | ClassEvent::MethodEnd => {}
            }
        }

        let mut anomalies = Vec::new();
        let mut kept = Vec::with_capacity(entries.len());
        for entry in entries {
            if entry.outer_name == Some(entry.name) {
                match options.self_enclosure {
                    SelfEnclosurePolicy::Reject => {
                        return Err(ClassFormatError::SelfEnclosure(entry.name.to_string()));
                    }
                    SelfEnclosurePolicy::Drop => {
                        log::debug!("{name}: dropping self-enclosing entry {}", entry.name);
                        anomalies.push(ClassAnomaly::SelfEnclosure {
                            entry: entry.name.to_string(),
                        });
                        continue;
                    }
                }
            }
            kept.push(entry);
        }

        let (enclosing_chain, cycle) = enclosing_chain(&name, &kept);
        if let Some(at) = cycle {
            log::debug!("{name}: cyclic enclosing-class data at {at}, chain truncated");
            anomalies.push(ClassAnomaly::CyclicEnclosure { at });
        }

        let inner_classes = kept
            .iter()
            .filter(|e| e.outer_name == Some(name.as_str()) && e.name != name)
            .map(|e| InnerClassRecord::from_entry(&name, e))
            .collect();

        Ok(Self {
            name,
            super_name,
            signature,
            interfaces,
            version,
            access,
            fields,
            methods,
            inner_classes,
            enclosing_chain,
            anomalies,
            bytes,
            reader: OnceLock::new(),
            hash: MemoHash::default(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn super_name(&self) -> Option<&str> {
        self.super_name.as_deref()
    }

    pub fn signature(&self) -> Option<&str> {
        self.signature.as_deref()
    }

    pub fn interfaces(&self) -> &[String] {
        &self.interfaces
    }

    pub fn version(&self) -> ClassVersion {
        self.version
    }

    pub fn access(&self) -> u16 {
        self.access
    }

    pub fn fields(&self) -> &[FieldRecord] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodRecord] {
        &self.methods
    }

    /// Classes directly enclosed by this one.
    pub fn inner_classes(&self) -> &[InnerClassRecord] {
        &self.inner_classes
    }

    /// Ancestor class names, outermost first, excluding this class.
    pub fn enclosing_chain(&self) -> &[String] {
        &self.enclosing_chain
    }

    pub fn anomalies(&self) -> &[ClassAnomaly] {
        &self.anomalies
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The structural reader for this class, built on first use and shared
    /// by every later caller. Concurrent first calls race on a single slot;
    /// exactly one construction is stored and all callers see it.
    pub fn reader(&self) -> Result<&ClassReader, ClassFormatError> {
        self.reader
            .get_or_init(|| ClassReader::new(Arc::clone(&self.bytes)))
            .as_ref()
            .map_err(Clone::clone)
    }

    /// Hash over the identity fields; computed once and memoized.
    pub fn identity_hash(&self) -> u64 {
        self.hash.get_or_compute(|| {
            let mut h = DefaultHasher::new();
            self.name.hash(&mut h);
            self.super_name.hash(&mut h);
            self.signature.hash(&mut h);
            self.interfaces.hash(&mut h);
            self.access.hash(&mut h);
            self.fields.hash(&mut h);
            self.methods.hash(&mut h);
            h.finish()
        })
    }

    pub fn outline(&self) -> ClassOutline<'_> {
        ClassOutline {
            name: &self.name,
            super_name: self.super_name(),
            signature: self.signature(),
            interfaces: &self.interfaces,
            version: self.version,
            access: self.access,
            enclosing_chain: &self.enclosing_chain,
            inner_classes: &self.inner_classes,
            fields: &self.fields,
            methods: &self.methods,
            anomalies: &self.anomalies,
        }
    }
}

/// Version, nesting metadata and raw bytes are not part of identity: two
/// builds of the same class compare equal.
impl PartialEq for ClassRecord {
    fn eq(&self, other: &Self) -> bool {
        self.access == other.access
            && self.name == other.name
            && self.super_name == other.super_name
            && self.signature == other.signature
            && self.interfaces == other.interfaces
            && self.fields == other.fields
            && self.methods == other.methods
    }
}

impl Eq for ClassRecord {}

impl Hash for ClassRecord {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u64(self.identity_hash());
    }
}

impl std::fmt::Display for ClassRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ClassRecord{{'{}'}}", self.name)
    }
}

/// Borrowed, serializable view of a record for outline output.
#[derive(Debug, Serialize)]
pub struct ClassOutline<'a> {
    pub name: &'a str,
    pub super_name: Option<&'a str>,
    pub signature: Option<&'a str>,
    pub interfaces: &'a [String],
    pub version: ClassVersion,
    pub access: u16,
    pub enclosing_chain: &'a [String],
    pub inner_classes: &'a [InnerClassRecord],
    pub fields: &'a [FieldRecord],
    pub methods: &'a [MethodRecord],
    pub anomalies: &'a [ClassAnomaly],
}

/// Walks outer-class links from `name` using every inner-class entry in the
/// attribute, not just those declared directly by this class. The first entry
/// for a given class wins. Returns the chain (outermost first) and, if the
/// links loop, the name at which the walk stopped.
fn enclosing_chain(name: &str, entries: &[InnerClassEntry<'_>]) -> (Vec<String>, Option<String>) {
    let mut outer_of: HashMap<&str, Option<&str>> = HashMap::with_capacity(entries.len());
    for entry in entries {
        outer_of.entry(entry.name).or_insert(entry.outer_name);
    }

    let mut seen: HashSet<&str> = HashSet::from([name]);
    let mut chain = Vec::new();
    let mut current = name;
    let mut cycle = None;
    while let Some(Some(outer)) = outer_of.get(current).copied() {
        if outer.is_empty() {
            break;
        }
        if !seen.insert(outer) {
            cycle = Some(outer.to_string());
            break;
        }
        chain.push(outer.to_string());
        current = outer;
    }
    chain.reverse();
    (chain, cycle)
}

/// Memoized hash slot. Zero means "not computed"; a computed hash `h` is
/// stored as `h + 1`, with `h` kept below `u64::MAX` so the sum never wraps.
#[derive(Debug, Default)]
struct MemoHash(AtomicU64);

impl MemoHash {
    fn get_or_compute(&self, compute: impl FnOnce() -> u64) -> u64 {
        let stored = self.0.load(Ordering::Acquire);
        if stored != 0 {
            return stored - 1;
        }
        let hash = compute() >> 1;
        self.0.store(hash + 1, Ordering::Release);
        hash
    }
}
