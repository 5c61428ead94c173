//! Error types shared by the class model builder and the search engine.

use serde::Serialize;

/// A class file that cannot be turned into a [`crate::class_record::ClassRecord`].
///
/// Raised before any record exists, so a failed parse never leaves a
/// partially-initialized class behind.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClassFormatError {
    #[error("bad magic 0x{0:08X}")]
    BadMagic(u32),

    #[error("unsupported class version {major}.{minor}")]
    UnsupportedVersion { major: u16, minor: u16 },

    #[error("truncated at offset {offset}: needed {needed} more bytes")]
    Truncated { offset: usize, needed: usize },

    #[error("constant pool index {index} out of range")]
    BadPoolIndex { index: u16 },

    #[error("constant pool entry {index}: expected {expected}")]
    WrongPoolTag { index: u16, expected: &'static str },

    #[error("unknown constant pool tag {tag} at index {index}")]
    UnknownPoolTag { index: u16, tag: u8 },

    #[error("invalid modified UTF-8 in constant pool entry {index}")]
    BadUtf8 { index: u16 },

    #[error("malformed {name} attribute: {reason}")]
    MalformedAttribute { name: String, reason: String },

    #[error("invalid opcode 0x{opcode:02X} at code offset {offset}")]
    InvalidOpcode { opcode: u8, offset: usize },

    #[error("{trailing} trailing bytes after class structure")]
    TrailingBytes { trailing: usize },

    #[error("class {0} declares itself as its own enclosing class")]
    SelfEnclosure(String),
}

/// Errors raised while building or running a search.
#[derive(Debug, thiserror::Error)]
pub enum SearchError {
    #[error("invalid regex pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("not a number: {0:?}")]
    InvalidNumber(String),

    #[error("failed to start worker pool: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    #[error("search ended without reporting completion")]
    Interrupted,
}

/// A single unit (class or file) whose query visitor faulted during a search.
///
/// Failures are isolated: the search still completes and reports these
/// alongside the results gathered from every other unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnitFailure {
    pub unit: String,
    pub message: String,
}

impl std::fmt::Display for UnitFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "search failed for {}: {}", self.unit, self.message)
    }
}
