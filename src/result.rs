use serde::Serialize;
use std::fmt;

/// Which matcher produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    Text,
    Number,
    Reference,
    Declaration,
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultKind::Text => "text",
            ResultKind::Number => "number",
            ResultKind::Reference => "reference",
            ResultKind::Declaration => "declaration",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OwnerKind {
    Class,
    File,
}

/// Where inside its owner a match was found.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Location {
    /// The class declaration: name, super class, interfaces.
    Class,
    Field {
        name: String,
        descriptor: String,
    },
    Method {
        name: String,
        descriptor: String,
    },
    /// An instruction inside a method body, by bytecode offset.
    Instruction {
        method: String,
        descriptor: String,
        offset: usize,
    },
    /// A 1-based line of a text file.
    Line { number: usize },
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Class => f.write_str("<class>"),
            Location::Field { name, descriptor } => write!(f, "{name} {descriptor}"),
            Location::Method { name, descriptor } => write!(f, "{name}{descriptor}"),
            Location::Instruction {
                method,
                descriptor,
                offset,
            } => write!(f, "{method}{descriptor} @{offset}"),
            Location::Line { number } => write!(f, "line {number}"),
        }
    }
}

/// One located match. Ordering is by owner, location, kind, then value, so a
/// `BTreeSet` of results is both deduplicated and in display order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SearchResult {
    pub owner: String,
    pub location: Location,
    pub kind: ResultKind,
    pub value: String,
    pub origin: OwnerKind,
}

impl fmt::Display for SearchResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}\t{}\t[{}]\t{}",
            self.owner, self.location, self.kind, self.value
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn result(owner: &str, location: Location, kind: ResultKind, value: &str) -> SearchResult {
        SearchResult {
            owner: owner.to_string(),
            location,
            kind,
            value: value.to_string(),
            origin: OwnerKind::Class,
        }
    }

    #[test]
    fn orders_by_owner_then_location_then_kind_then_value() {
        let method = Location::Method {
            name: "m".to_string(),
            descriptor: "()V".to_string(),
        };
        let set: BTreeSet<_> = [
            result("b/B", Location::Class, ResultKind::Text, "x"),
            result("a/A", method.clone(), ResultKind::Text, "b"),
            result("a/A", method.clone(), ResultKind::Text, "a"),
            result("a/A", Location::Class, ResultKind::Declaration, "z"),
            result("a/A", Location::Class, ResultKind::Text, "z"),
        ]
        .into_iter()
        .collect();

        let ordered: Vec<_> = set
            .iter()
            .map(|r| (r.owner.as_str(), r.kind, r.value.as_str()))
            .collect();
        assert_eq!(
            ordered,
            vec![
                ("a/A", ResultKind::Text, "z"),
                ("a/A", ResultKind::Declaration, "z"),
                ("a/A", ResultKind::Text, "a"),
                ("a/A", ResultKind::Text, "b"),
                ("b/B", ResultKind::Text, "x"),
            ]
        );
    }

    #[test]
    fn equal_results_collapse_in_a_set() {
        let mut set = BTreeSet::new();
        assert!(set.insert(result("a/A", Location::Class, ResultKind::Text, "a")));
        assert!(!set.insert(result("a/A", Location::Class, ResultKind::Text, "a")));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn display_is_tab_separated() {
        let r = result(
            "a/A",
            Location::Instruction {
                method: "run".to_string(),
                descriptor: "()V".to_string(),
                offset: 3,
            },
            ResultKind::Number,
            "42",
        );
        assert_eq!(r.to_string(), "a/A\trun()V @3\t[number]\t42");
    }
}
