//! BER/XML projection (§6): streaming BER→XML and XML→BER writers, an
//! XML tokenizer, an in-memory tree model for structural edits, and the
//! name/type translation and XPath-lite path matching that drive all of
//! the above.
//!
//! Layered on `ber-core` for wire primitives and `ber-io` for streaming
//! and buffering; this crate owns no notion of a CLI or file-format
//! auto-detection — that lives in `ber-cli`.

pub mod ber_writer;
pub mod error;
pub mod path;
pub mod translator;
pub mod tree;
pub mod xml_reader;
pub mod xml_writer;

pub use ber_writer::BerWriter;
pub use error::{XmlError, XmlResult};
pub use path::{Matcher, Path, RangeList, Step};
pub use translator::{ContentType, Dereferencer, NameTranslator, TagMatch, Typifier};
pub use xml_reader::{Token, TokenKind, XmlReader};
pub use xml_writer::{Attributes, PrettyPrintHook, WriteOptions, XmlWriter};
