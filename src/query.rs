//! One-shot query visitors.
//!
//! A [`QueryVisitor`] is bound to one [`Search`] and consumes itself on a
//! single class or file. The class walk is a fold over the reader's event
//! sequence; the reader is shared and never mutated here.

use crate::class_record::ClassRecord;
use crate::classfile::reader::{FieldDecl, Header, MethodDecl};
use crate::classfile::{ClassEvent, EventOptions, Instruction, Literal, MemberRef};
use crate::error::ClassFormatError;
use crate::matcher::{Number, Search};
use crate::result::{Location, OwnerKind, ResultKind, SearchResult};
use crate::workspace::FileRecord;

pub struct QueryVisitor<'s> {
    search: &'s Search,
    owner: String,
    origin: OwnerKind,
    results: Vec<SearchResult>,
}

impl<'s> QueryVisitor<'s> {
    pub(crate) fn new(search: &'s Search) -> Self {
        Self {
            search,
            owner: String::new(),
            origin: OwnerKind::Class,
            results: Vec::new(),
        }
    }

    /// Method bodies only matter to matchers that look at instructions.
    fn needs_code(&self) -> bool {
        self.search.text_matcher().is_some()
            || self.search.number_matcher().is_some()
            || self.search.reference_matcher().is_some()
    }

    pub fn visit_class(mut self, class: &ClassRecord) -> Result<Vec<SearchResult>, ClassFormatError> {
        let reader = class.reader()?;
        let options = EventOptions {
            skip_code: !self.needs_code(),
        };
        self.owner = class.name().to_string();
        self.origin = OwnerKind::Class;

        let mut current: Option<(&str, &str)> = None;
        for event in reader.events(options)? {
            match event {
                ClassEvent::Header(header) => self.visit_header(&header),
                ClassEvent::InnerClass(_) => {}
                ClassEvent::Field(field) => self.visit_field(&field),
                ClassEvent::Method(method) => {
                    self.visit_method(&method);
                    current = Some((method.name, method.descriptor));
                }
                ClassEvent::Instruction { offset, insn } => {
                    if let Some((method, descriptor)) = current {
                        let location = Location::Instruction {
                            method: method.to_string(),
                            descriptor: descriptor.to_string(),
                            offset,
                        };
                        self.visit_instruction(&insn, location);
                    }
                }
                ClassEvent::MethodEnd => current = None,
            }
        }
        Ok(self.results)
    }

    /// Text matching per line. Undecodable content yields nothing.
    pub fn visit_file(mut self, file: &FileRecord) -> Vec<SearchResult> {
        self.owner = file.path().to_string();
        self.origin = OwnerKind::File;
        let (Some(matcher), Some(text)) = (self.search.text_matcher(), file.text()) else {
            return self.results;
        };
        for (i, line) in text.lines().enumerate() {
            if matcher.matches(line) {
                self.emit(ResultKind::Text, Location::Line { number: i + 1 }, line);
            }
        }
        self.results
    }

    fn visit_header(&mut self, header: &Header<'_>) {
        self.text_site(Location::Class, header.name);
        if let Some(m) = self.search.declaration_matcher()
            && m.matches(header.name, None, None)
        {
            self.emit(ResultKind::Declaration, Location::Class, header.name);
        }
        let supertypes = header.super_name.into_iter().chain(header.interfaces.iter().copied());
        for supertype in supertypes {
            self.type_reference(Location::Class, supertype);
        }
    }

    fn visit_field(&mut self, field: &FieldDecl<'_>) {
        let location = Location::Field {
            name: field.name.to_string(),
            descriptor: field.descriptor.to_string(),
        };
        self.text_site(location.clone(), field.name);
        self.text_site(location.clone(), field.descriptor);
        self.declaration_site(location.clone(), field.name, field.descriptor);
        if let Some(constant) = &field.constant {
            self.literal_site(location, constant);
        }
    }

    fn visit_method(&mut self, method: &MethodDecl<'_>) {
        let location = Location::Method {
            name: method.name.to_string(),
            descriptor: method.descriptor.to_string(),
        };
        self.text_site(location.clone(), method.name);
        self.text_site(location.clone(), method.descriptor);
        self.declaration_site(location.clone(), method.name, method.descriptor);
        for exception in &method.exceptions {
            self.type_reference(location.clone(), exception);
        }
    }

    fn visit_instruction(&mut self, insn: &Instruction<'_>, location: Location) {
        match insn {
            Instruction::Member { reference, .. } => self.member_reference(location, reference),
            Instruction::Type { type_name, .. } => self.type_reference(location, type_name),
            Instruction::Constant { value, .. } => self.literal_site(location, value),
            Instruction::Dynamic { name, descriptor } => {
                if let Some(m) = self.search.reference_matcher()
                    && m.matches("", Some(*name), Some(*descriptor))
                {
                    let value = format!("{name}{descriptor}");
                    self.emit(ResultKind::Reference, location, &value);
                }
            }
        }
    }

    fn literal_site(&mut self, location: Location, literal: &Literal<'_>) {
        match literal {
            Literal::String(s) => self.text_site(location, s),
            Literal::Class(name) => self.type_reference(location, name),
            Literal::MethodType(descriptor) => self.text_site(location, descriptor),
            Literal::Opaque => {}
            _ => {
                if let (Some(m), Some(n)) =
                    (self.search.number_matcher(), Number::from_literal(literal))
                    && m.matches(n)
                {
                    self.emit(ResultKind::Number, location, &n.to_string());
                }
            }
        }
    }

    fn text_site(&mut self, location: Location, text: &str) {
        if let Some(m) = self.search.text_matcher()
            && m.matches(text)
        {
            self.emit(ResultKind::Text, location, text);
        }
    }

    fn declaration_site(&mut self, location: Location, name: &str, descriptor: &str) {
        if let Some(m) = self.search.declaration_matcher()
            && m.matches(&self.owner, Some(name), Some(descriptor))
        {
            let value = format!("{}.{name} {descriptor}", self.owner);
            self.emit(ResultKind::Declaration, location, &value);
        }
    }

    fn member_reference(&mut self, location: Location, reference: &MemberRef<'_>) {
        if let Some(m) = self.search.reference_matcher()
            && m.matches(reference.owner, Some(reference.name), Some(reference.descriptor))
        {
            let value = format!(
                "{}.{} {}",
                reference.owner, reference.name, reference.descriptor
            );
            self.emit(ResultKind::Reference, location, &value);
        }
    }

    fn type_reference(&mut self, location: Location, type_name: &str) {
        if let Some(m) = self.search.reference_matcher()
            && m.matches(type_name, None, None)
        {
            self.emit(ResultKind::Reference, location, type_name);
        }
    }

    fn emit(&mut self, kind: ResultKind, location: Location, value: &str) {
        self.results.push(SearchResult {
            owner: self.owner.clone(),
            location,
            kind,
            value: value.to_string(),
            origin: self.origin,
        });
    }
}
