//! Search criteria.
//!
//! A [`Search`] holds at most one [`Matcher`] per [`ResultKind`]. Matchers are
//! pure predicates; where they apply inside a class or file is decided by the
//! query visitor.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use clap::ValueEnum;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::classfile::Literal;
use crate::error::SearchError;
use crate::query::QueryVisitor;
use crate::result::ResultKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum TextMatchMode {
    Equals,
    #[default]
    Contains,
    StartsWith,
    EndsWith,
    /// Unanchored: the pattern may match anywhere in the text.
    Regex,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum NumberMatchMode {
    #[default]
    Equals,
    NotEquals,
    LessThan,
    LessOrEqual,
    GreaterThan,
    GreaterOrEqual,
}

/// Text comparison is on Unicode scalar values with no normalization.
/// `Insensitive` lowercases both sides with full Unicode case mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CaseSensitivity {
    #[default]
    Sensitive,
    Insensitive,
}

/// How floating-point values compare for equality. Integers always compare exactly.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FloatComparison {
    /// IEEE equality: `0.0 == -0.0`, NaN equals nothing.
    #[default]
    Exact,
    /// Values within the given absolute distance are equal.
    Tolerance(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MatchOptions {
    pub case_sensitivity: CaseSensitivity,
    pub float_comparison: FloatComparison,
}

#[derive(Debug, Clone)]
pub struct TextMatcher {
    query: String,
    folded: String,
    mode: TextMatchMode,
    case: CaseSensitivity,
    regex: Option<Regex>,
}

impl TextMatcher {
    pub fn new(
        query: impl Into<String>,
        mode: TextMatchMode,
        case: CaseSensitivity,
    ) -> Result<Self, SearchError> {
        let query = query.into();
        let regex = match mode {
            TextMatchMode::Regex => Some(
                RegexBuilder::new(&query)
                    .case_insensitive(case == CaseSensitivity::Insensitive)
                    .build()?,
            ),
            _ => None,
        };
        let folded = match case {
            CaseSensitivity::Sensitive => query.clone(),
            CaseSensitivity::Insensitive => query.to_lowercase(),
        };
        Ok(Self {
            query,
            folded,
            mode,
            case,
            regex,
        })
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn matches(&self, text: &str) -> bool {
        if let Some(regex) = &self.regex {
            return regex.is_match(text);
        }
        let lowered;
        let text = match self.case {
            CaseSensitivity::Sensitive => text,
            CaseSensitivity::Insensitive => {
                lowered = text.to_lowercase();
                lowered.as_str()
            }
        };
        let query = self.folded.as_str();
        match self.mode {
            TextMatchMode::Equals => text == query,
            TextMatchMode::Contains => text.contains(query),
            TextMatchMode::StartsWith => text.starts_with(query),
            TextMatchMode::EndsWith => text.ends_with(query),
            TextMatchMode::Regex => false,
        }
    }
}

/// A numeric value normalized from any of the JVM's int/long/float/double forms.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    /// Parses decimal or `0x` hex integers with an optional `L` suffix, and
    /// decimal floats with an optional `F`/`D` suffix.
    pub fn parse(text: &str) -> Result<Self, SearchError> {
        let invalid = || SearchError::InvalidNumber(text.to_string());
        let s: String = text.trim().chars().filter(|c| *c != '_').collect();
        if s.is_empty() {
            return Err(invalid());
        }

        let (negative, unsigned) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(&s)),
        };
        if let Some(hex) = unsigned
            .strip_prefix("0x")
            .or_else(|| unsigned.strip_prefix("0X"))
        {
            let hex = hex.trim_end_matches(['l', 'L']);
            let magnitude = u64::from_str_radix(hex, 16).map_err(|_| invalid())?;
            // Hex literals are bit patterns, as in Java source; an int
            // literal is negated in 32 bits.
            let value = if magnitude <= u64::from(u32::MAX) && !s.ends_with(['l', 'L']) {
                let bits = magnitude as u32 as i32;
                i64::from(if negative { bits.wrapping_neg() } else { bits })
            } else {
                let bits = magnitude as i64;
                if negative { bits.wrapping_neg() } else { bits }
            };
            return Ok(Number::Int(value));
        }

        if let Some(int) = s.strip_suffix(['l', 'L']) {
            return int.parse::<i64>().map(Number::Int).map_err(|_| invalid());
        }
        if let Some(float) = s.strip_suffix(['f', 'F', 'd', 'D']) {
            return float.parse::<f64>().map(Number::Float).map_err(|_| invalid());
        }
        if let Ok(v) = s.parse::<i64>() {
            return Ok(Number::Int(v));
        }
        s.parse::<f64>().map(Number::Float).map_err(|_| invalid())
    }

    pub fn from_literal(literal: &Literal<'_>) -> Option<Self> {
        match *literal {
            Literal::Int(v) => Some(Number::Int(i64::from(v))),
            Literal::Long(v) => Some(Number::Int(v)),
            Literal::Float(v) => Some(Number::Float(f64::from(v))),
            Literal::Double(v) => Some(Number::Float(v)),
            _ => None,
        }
    }

    fn as_f64(self) -> f64 {
        match self {
            Number::Int(v) => v as f64,
            Number::Float(v) => v,
        }
    }

    /// `None` when either side is NaN.
    pub fn compare(self, other: Number, float: FloatComparison) -> Option<Ordering> {
        if let (Number::Int(a), Number::Int(b)) = (self, other) {
            return Some(a.cmp(&b));
        }
        let (a, b) = (self.as_f64(), other.as_f64());
        if let FloatComparison::Tolerance(eps) = float
            && (a - b).abs() <= eps
        {
            return Some(Ordering::Equal);
        }
        a.partial_cmp(&b)
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Number::Int(v) => write!(f, "{v}"),
            Number::Float(v) => write!(f, "{v:?}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct NumberMatcher {
    value: Number,
    mode: NumberMatchMode,
    float: FloatComparison,
}

impl NumberMatcher {
    pub fn new(value: Number, mode: NumberMatchMode, float: FloatComparison) -> Self {
        Self { value, mode, float }
    }

    pub fn value(&self) -> Number {
        self.value
    }

    /// Tests `candidate <mode> query`, e.g. `42 > 10` for `GreaterThan 10`.
    pub fn matches(&self, candidate: Number) -> bool {
        let Some(ord) = candidate.compare(self.value, self.float) else {
            return self.mode == NumberMatchMode::NotEquals;
        };
        match self.mode {
            NumberMatchMode::Equals => ord == Ordering::Equal,
            NumberMatchMode::NotEquals => ord != Ordering::Equal,
            NumberMatchMode::LessThan => ord == Ordering::Less,
            NumberMatchMode::LessOrEqual => ord != Ordering::Greater,
            NumberMatchMode::GreaterThan => ord == Ordering::Greater,
            NumberMatchMode::GreaterOrEqual => ord != Ordering::Less,
        }
    }
}

/// Owner/name/descriptor matcher used for both references and declarations.
/// An empty query part is a wildcard.
#[derive(Debug, Clone)]
pub struct MemberMatcher {
    owner: Option<TextMatcher>,
    name: Option<TextMatcher>,
    descriptor: Option<TextMatcher>,
}

impl MemberMatcher {
    pub fn new(
        owner: Option<&str>,
        name: Option<&str>,
        descriptor: Option<&str>,
        mode: TextMatchMode,
        case: CaseSensitivity,
    ) -> Result<Self, SearchError> {
        let part = |q: Option<&str>| -> Result<Option<TextMatcher>, SearchError> {
            match q.filter(|q| !q.is_empty()) {
                Some(q) => TextMatcher::new(q, mode, case).map(Some),
                None => Ok(None),
            }
        };
        Ok(Self {
            owner: part(owner)?,
            name: part(name)?,
            descriptor: part(descriptor)?,
        })
    }

    /// A site missing a part (e.g. a type reference has no name) only
    /// matches when that part of the query is a wildcard.
    pub fn matches(&self, owner: &str, name: Option<&str>, descriptor: Option<&str>) -> bool {
        fn part(matcher: &Option<TextMatcher>, value: Option<&str>) -> bool {
            match matcher {
                None => true,
                Some(m) => value.is_some_and(|v| m.matches(v)),
            }
        }
        part(&self.owner, Some(owner)) && part(&self.name, name) && part(&self.descriptor, descriptor)
    }
}

#[derive(Debug, Clone)]
pub enum Matcher {
    Text(TextMatcher),
    Number(NumberMatcher),
    Reference(MemberMatcher),
    Declaration(MemberMatcher),
}

impl Matcher {
    pub fn kind(&self) -> ResultKind {
        match self {
            Matcher::Text(_) => ResultKind::Text,
            Matcher::Number(_) => ResultKind::Number,
            Matcher::Reference(_) => ResultKind::Reference,
            Matcher::Declaration(_) => ResultKind::Declaration,
        }
    }
}

/// What a query visitor is about to be bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitKind {
    Class,
    File,
}

#[derive(Debug, Clone, Default)]
pub struct Search {
    matchers: BTreeMap<ResultKind, Matcher>,
    options: MatchOptions,
}

impl Search {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: MatchOptions) -> Self {
        Self {
            matchers: BTreeMap::new(),
            options,
        }
    }

    pub fn options(&self) -> MatchOptions {
        self.options
    }

    /// Installs `matcher`, replacing any previous matcher of the same kind.
    pub fn with_matcher(mut self, matcher: Matcher) -> Self {
        self.matchers.insert(matcher.kind(), matcher);
        self
    }

    pub fn text(self, query: &str, mode: TextMatchMode) -> Result<Self, SearchError> {
        let matcher = TextMatcher::new(query, mode, self.options.case_sensitivity)?;
        Ok(self.with_matcher(Matcher::Text(matcher)))
    }

    pub fn number(self, value: Number, mode: NumberMatchMode) -> Self {
        let matcher = NumberMatcher::new(value, mode, self.options.float_comparison);
        self.with_matcher(Matcher::Number(matcher))
    }

    pub fn reference(
        self,
        owner: Option<&str>,
        name: Option<&str>,
        descriptor: Option<&str>,
        mode: TextMatchMode,
    ) -> Result<Self, SearchError> {
        let matcher =
            MemberMatcher::new(owner, name, descriptor, mode, self.options.case_sensitivity)?;
        Ok(self.with_matcher(Matcher::Reference(matcher)))
    }

    pub fn declaration(
        self,
        owner: Option<&str>,
        name: Option<&str>,
        descriptor: Option<&str>,
        mode: TextMatchMode,
    ) -> Result<Self, SearchError> {
        let matcher =
            MemberMatcher::new(owner, name, descriptor, mode, self.options.case_sensitivity)?;
        Ok(self.with_matcher(Matcher::Declaration(matcher)))
    }

    pub fn is_empty(&self) -> bool {
        self.matchers.is_empty()
    }

    pub fn matchers(&self) -> impl Iterator<Item = &Matcher> {
        self.matchers.values()
    }

    pub fn text_matcher(&self) -> Option<&TextMatcher> {
        match self.matchers.get(&ResultKind::Text) {
            Some(Matcher::Text(m)) => Some(m),
            _ => None,
        }
    }

    pub fn number_matcher(&self) -> Option<&NumberMatcher> {
        match self.matchers.get(&ResultKind::Number) {
            Some(Matcher::Number(m)) => Some(m),
            _ => None,
        }
    }

    pub fn reference_matcher(&self) -> Option<&MemberMatcher> {
        match self.matchers.get(&ResultKind::Reference) {
            Some(Matcher::Reference(m)) => Some(m),
            _ => None,
        }
    }

    pub fn declaration_matcher(&self) -> Option<&MemberMatcher> {
        match self.matchers.get(&ResultKind::Declaration) {
            Some(Matcher::Declaration(m)) => Some(m),
            _ => None,
        }
    }

    /// A fresh visitor for one unit, or `None` when nothing in this search
    /// can match that kind of unit and it should be skipped.
    pub fn create_query_visitor(&self, unit: UnitKind) -> Option<QueryVisitor<'_>> {
        let applicable = match unit {
            UnitKind::Class => !self.is_empty(),
            UnitKind::File => self.text_matcher().is_some(),
        };
        applicable.then(|| QueryVisitor::new(self))
    }
}
