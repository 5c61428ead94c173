//! Immutable value records for the members and inner-class entries of a class.
//!
//! Every record carries the internal name of the class that declares it, so a
//! record can be rendered or compared without its owning `ClassRecord`.

use std::hash::{Hash, Hasher};

use serde::Serialize;

use crate::classfile::constpool::Literal;
use crate::classfile::reader::{FieldDecl, InnerClassEntry, MethodDecl};

/// Owned `ConstantValue` of a field. Floats compare and hash by bit pattern,
/// so a `NaN` default equals itself.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "value", rename_all = "kebab-case")]
pub enum ConstantValue {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
}

impl ConstantValue {
    /// `None` for literals a `ConstantValue` attribute cannot hold.
    pub fn from_literal(literal: &Literal<'_>) -> Option<Self> {
        Some(match literal {
            Literal::Int(v) => Self::Int(*v),
            Literal::Long(v) => Self::Long(*v),
            Literal::Float(v) => Self::Float(*v),
            Literal::Double(v) => Self::Double(*v),
            Literal::String(s) => Self::String(s.to_string()),
            Literal::Class(_) | Literal::MethodType(_) | Literal::Opaque => return None,
        })
    }
}

impl PartialEq for ConstantValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Int(a), Self::Int(b)) => a == b,
            (Self::Long(a), Self::Long(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Double(a), Self::Double(b)) => a.to_bits() == b.to_bits(),
            (Self::String(a), Self::String(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstantValue {}

impl Hash for ConstantValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Self::Int(v) => v.hash(state),
            Self::Long(v) => v.hash(state),
            Self::Float(v) => v.to_bits().hash(state),
            Self::Double(v) => v.to_bits().hash(state),
            Self::String(v) => v.hash(state),
        }
    }
}

impl std::fmt::Display for ConstantValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}L"),
            Self::Float(v) => write!(f, "{v:?}F"),
            Self::Double(v) => write!(f, "{v:?}"),
            Self::String(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FieldRecord {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub access: u16,
    /// Default from the field's `ConstantValue` attribute.
    pub value: Option<ConstantValue>,
}

impl FieldRecord {
    pub(crate) fn from_decl(owner: &str, decl: &FieldDecl<'_>) -> Self {
        Self {
            owner: owner.to_string(),
            name: decl.name.to_string(),
            descriptor: decl.descriptor.to_string(),
            signature: decl.signature.map(str::to_string),
            access: decl.access,
            value: decl.constant.as_ref().and_then(ConstantValue::from_literal),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct MethodRecord {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub access: u16,
    /// Declared exception types in declaration order; empty when none.
    pub exceptions: Vec<String>,
}

impl MethodRecord {
    pub(crate) fn from_decl(owner: &str, decl: &MethodDecl<'_>) -> Self {
        Self {
            owner: owner.to_string(),
            name: decl.name.to_string(),
            descriptor: decl.descriptor.to_string(),
            signature: decl.signature.map(str::to_string),
            access: decl.access,
            exceptions: decl.exceptions.iter().map(|e| e.to_string()).collect(),
        }
    }
}

/// One entry of a class's `InnerClasses` attribute.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct InnerClassRecord {
    /// The class whose attribute declared this entry.
    pub owner: String,
    pub name: String,
    /// Absent for local and anonymous classes.
    pub outer_name: Option<String>,
    /// Absent for anonymous classes.
    pub inner_name: Option<String>,
    pub access: u16,
}

impl InnerClassRecord {
    pub(crate) fn from_entry(owner: &str, entry: &InnerClassEntry<'_>) -> Self {
        Self {
            owner: owner.to_string(),
            name: entry.name.to_string(),
            outer_name: entry.outer_name.map(str::to_string),
            inner_name: entry.inner_name.map(str::to_string),
            access: entry.access,
        }
    }

    /// The simple name to show for this class: the declared inner name, or
    /// the part of the full name after the outer class prefix.
    pub fn simple_name(&self) -> &str {
        if let Some(inner) = self.inner_name.as_deref() {
            return inner;
        }
        self.outer_name
            .as_deref()
            .and_then(|outer| self.name.strip_prefix(outer))
            .map(|rest| rest.trim_start_matches('$'))
            .filter(|rest| !rest.is_empty())
            .unwrap_or(&self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inner(name: &str, outer: Option<&str>, simple: Option<&str>) -> InnerClassRecord {
        InnerClassRecord {
            owner: "a/A".to_string(),
            name: name.to_string(),
            outer_name: outer.map(str::to_string),
            inner_name: simple.map(str::to_string),
            access: 0,
        }
    }

    #[test]
    fn simple_name_prefers_declared_inner_name() {
        assert_eq!(inner("a/A$B", Some("a/A"), Some("B")).simple_name(), "B");
    }

    #[test]
    fn simple_name_falls_back_to_outer_prefix_then_full_name() {
        assert_eq!(inner("a/A$1", Some("a/A"), None).simple_name(), "1");
        assert_eq!(inner("x/Y", None, None).simple_name(), "x/Y");
    }

    #[test]
    fn constant_values_compare_by_bits() {
        assert_eq!(ConstantValue::Double(f64::NAN), ConstantValue::Double(f64::NAN));
        assert_ne!(ConstantValue::Float(0.0), ConstantValue::Float(-0.0));
        assert_ne!(ConstantValue::Int(1), ConstantValue::Long(1));
        assert_eq!(ConstantValue::from_literal(&Literal::Class("a/A")), None);
        assert_eq!(ConstantValue::Long(7).to_string(), "7L");
    }

    #[test]
    fn method_without_exceptions_has_empty_list() {
        let decl = MethodDecl {
            access: 1,
            name: "run",
            descriptor: "()V",
            signature: None,
            exceptions: vec![],
        };
        let m = MethodRecord::from_decl("a/A", &decl);
        assert!(m.exceptions.is_empty());
        assert_eq!(m.owner, "a/A");
    }
}
