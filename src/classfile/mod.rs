//! Raw class-file decoding: constant pool, attribute framing, bytecode.

pub mod constpool;
pub mod cursor;
pub mod insn;
pub mod reader;

#[cfg(test)]
pub(crate) mod fixture;

pub use constpool::{Literal, MemberRef, RefKind};
pub use insn::Instruction;
pub use reader::{ClassEvent, ClassReader, EventOptions};
