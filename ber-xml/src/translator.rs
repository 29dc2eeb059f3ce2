//! Grammar-derived maps (§3.6, C12): element names, application-tag
//! dereferencing and content typing. All three are keyed per tag class,
//! the way an ASN.1 grammar would bucket its definitions.

use std::collections::HashMap;

use ber_core::tag::{Class, Shape};

const CLASS_COUNT: usize = 4;

fn class_index(class: Class) -> usize {
    class as usize
}

/// The decoding type a typifier assigns to a tag, used by the XML writer
/// to choose content representation and by the XML reader to parse
/// element text back into wire bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ContentType {
    #[default]
    OctetString,
    StringT,
    Int64,
    Bcd,
}

/// Bidirectional `(class, tag) <-> name` map. Forward lookups name an
/// element; reverse lookups resolve an XML element name back to
/// `(shape, class, tag)` for XML→BER writing.
#[derive(Debug, Default)]
pub struct NameTranslator {
    forward: [HashMap<u32, String>; CLASS_COUNT],
    reverse: HashMap<String, (Shape, Class, u32)>,
}

impl NameTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, class: Class, shape: Shape, tag: u32, name: impl Into<String>) {
        let name = name.into();
        self.forward[class_index(class)].insert(tag, name.clone());
        self.reverse.insert(name, (shape, class, tag));
    }

    pub fn name_for(&self, class: Class, tag: u32) -> Option<&str> {
        self.forward[class_index(class)].get(&tag).map(String::as_str)
    }

    pub fn resolve(&self, name: &str) -> Option<(Shape, Class, u32)> {
        self.reverse.get(name).copied()
    }

    /// A small built-in table of the UNIVERSAL class's common tags, useful
    /// without an external grammar file.
    pub fn with_universal_defaults() -> Self {
        let mut t = Self::new();
        let universal = [
            (1u32, "BOOLEAN", Shape::Primitive),
            (2, "INTEGER", Shape::Primitive),
            (3, "BIT_STRING", Shape::Primitive),
            (4, "OCTET_STRING", Shape::Primitive),
            (5, "NULL", Shape::Primitive),
            (6, "OBJECT_IDENTIFIER", Shape::Primitive),
            (10, "ENUMERATED", Shape::Primitive),
            (12, "UTF8_STRING", Shape::Primitive),
            (16, "SEQUENCE", Shape::Constructed),
            (17, "SET", Shape::Constructed),
            (19, "PRINTABLE_STRING", Shape::Primitive),
            (23, "UTC_TIME", Shape::Primitive),
            (24, "GENERALIZED_TIME", Shape::Primitive),
        ];
        for (tag, name, shape) in universal {
            t.insert(Class::Universal, shape, tag, name);
        }
        t
    }
}

/// A single tag-set test for a dereferencer rule.
#[derive(Debug, Clone, Copy)]
pub enum TagMatch {
    Exact(u32),
    Range(u32, u32),
}

impl TagMatch {
    pub fn matches(&self, tag: u32) -> bool {
        match self {
            TagMatch::Exact(n) => *n == tag,
            TagMatch::Range(lo, hi) => (*lo..=*hi).contains(&tag),
        }
    }
}

/// Ordered per-class list of `tag_set -> (target_class, target_tag)`
/// rules, used to collapse an application tag to the universal tag it
/// actually carries (§3.6 Dereferencer). First matching rule wins;
/// unmatched tags dereference to themselves.
#[derive(Debug, Default)]
pub struct Dereferencer {
    rules: [Vec<(TagMatch, Class, u32)>; CLASS_COUNT],
}

impl Dereferencer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, class: Class, matcher: TagMatch, target_class: Class, target_tag: u32) {
        self.rules[class_index(class)].push((matcher, target_class, target_tag));
    }

    pub fn resolve(&self, class: Class, tag: u32) -> (Class, u32) {
        for (matcher, target_class, target_tag) in &self.rules[class_index(class)] {
            if matcher.matches(tag) {
                return (*target_class, *target_tag);
            }
        }
        (class, tag)
    }
}

/// Per-class `tag -> ContentType` table, defaulting to `OctetString`
/// (§3.6 Typifier).
#[derive(Debug, Default)]
pub struct Typifier {
    tables: [HashMap<u32, ContentType>; CLASS_COUNT],
}

impl Typifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, class: Class, tag: u32, ty: ContentType) {
        self.tables[class_index(class)].insert(tag, ty);
    }

    pub fn type_of(&self, class: Class, tag: u32) -> ContentType {
        self.tables[class_index(class)].get(&tag).copied().unwrap_or_default()
    }

    /// A small built-in table matching the UNIVERSAL class's common
    /// primitive interpretations.
    pub fn with_universal_defaults() -> Self {
        let mut t = Self::new();
        t.set(Class::Universal, 1, ContentType::Int64); // BOOLEAN, read as 0/1
        t.set(Class::Universal, 2, ContentType::Int64); // INTEGER
        t.set(Class::Universal, 10, ContentType::Int64); // ENUMERATED
        t.set(Class::Universal, 12, ContentType::StringT); // UTF8String
        t.set(Class::Universal, 19, ContentType::StringT); // PrintableString
        t
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_translator_round_trips() {
        let mut t = NameTranslator::new();
        t.insert(Class::Application, Shape::Constructed, 1, "TransferBatch");
        assert_eq!(t.name_for(Class::Application, 1), Some("TransferBatch"));
        assert_eq!(
            t.resolve("TransferBatch"),
            Some((Shape::Constructed, Class::Application, 1))
        );
        assert_eq!(t.name_for(Class::Application, 2), None);
    }

    #[test]
    fn dereferencer_first_match_wins() {
        let mut d = Dereferencer::new();
        d.add(Class::Application, TagMatch::Exact(1), Class::Universal, 16);
        d.add(Class::Application, TagMatch::Range(0, 10), Class::Universal, 4);
        assert_eq!(d.resolve(Class::Application, 1), (Class::Universal, 16));
        assert_eq!(d.resolve(Class::Application, 5), (Class::Universal, 4));
        assert_eq!(d.resolve(Class::Application, 99), (Class::Application, 99));
    }

    #[test]
    fn typifier_defaults_to_octet_string() {
        let t = Typifier::new();
        assert_eq!(t.type_of(Class::ContextSpecific, 3), ContentType::OctetString);
    }
}
