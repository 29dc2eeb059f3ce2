//! Minimal ASN.1-adjacent grammar loader (§2 "Tag name table bootstrap").
//!
//! The core crates deliberately stop at "a closed sum of tables a grammar
//! would populate" (spec.md Non-goal: "a general-purpose ASN.1 compiler");
//! this module is the thin external collaborator that actually populates
//! them from a file, so the tool is useful without one.
//!
//! Grammar file syntax: one declaration per line, `name class shape tag`,
//! e.g. `TransferBatch APPLICATION CONSTRUCTED 1`. Blank lines and lines
//! starting with `#` are ignored. Later declarations for the same
//! `(class, tag)` override earlier ones, so `--asn-path DIR` files are
//! applied in sorted directory order before the single `--asn FILE`.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ber_core::tag::{Class, Shape};
use ber_xml::{NameTranslator, Typifier};

/// The two grammar-derived tables a command needs: names for the XML
/// writer/reader, and content typing for both directions.
pub struct Grammar {
    pub translator: NameTranslator,
    pub typifier: Typifier,
}

impl Grammar {
    /// Start from the built-in UNIVERSAL class bootstrap (§2), before any
    /// `--asn`/`--asn-path` file is applied.
    pub fn with_builtin_defaults() -> Self {
        Self {
            translator: NameTranslator::with_universal_defaults(),
            typifier: Typifier::with_universal_defaults(),
        }
    }

    fn parse_line(&mut self, path: &Path, lineno: usize, line: &str) -> Result<()> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let [name, class, shape, tag] = parts.as_slice() else {
            bail!("{}:{}: expected 'name class shape tag', got '{line}'", path.display(), lineno + 1);
        };
        let class = Class::from_name(class)
            .with_context(|| format!("{}:{}: bad class '{class}'", path.display(), lineno + 1))?;
        let shape = Shape::from_name(shape)
            .with_context(|| format!("{}:{}: bad shape '{shape}'", path.display(), lineno + 1))?;
        let tag: u32 = tag
            .parse()
            .with_context(|| format!("{}:{}: bad tag '{tag}'", path.display(), lineno + 1))?;
        self.translator.insert(class, shape, tag, *name);
        Ok(())
    }

    /// Merge one grammar file's declarations on top of the current tables.
    pub fn load_file(&mut self, path: &Path) -> Result<()> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading ASN.1 grammar file {}", path.display()))?;
        for (lineno, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            self.parse_line(path, lineno, line)?;
        }
        Ok(())
    }

    /// Load every `*.asn` file under `dir`, in sorted name order
    /// (`--asn-path DIR`).
    pub fn load_dir(&mut self, dir: &Path) -> Result<()> {
        let mut entries: Vec<_> = fs::read_dir(dir)
            .with_context(|| format!("reading ASN.1 grammar directory {}", dir.display()))?
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "asn"))
            .collect();
        entries.sort();
        for path in entries {
            self.load_file(&path)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ber_core::tag::Shape as BerShape;

    #[test]
    fn parses_a_well_formed_declaration_line() {
        let mut g = Grammar::with_builtin_defaults();
        g.parse_line(Path::new("<test>"), 0, "TransferBatch APPLICATION CONSTRUCTED 1").unwrap();
        assert_eq!(g.translator.name_for(Class::Application, 1), Some("TransferBatch"));
        assert_eq!(g.translator.resolve("TransferBatch"), Some((BerShape::Constructed, Class::Application, 1)));
    }

    #[test]
    fn rejects_a_malformed_line() {
        let mut g = Grammar::with_builtin_defaults();
        let err = g.parse_line(Path::new("<test>"), 0, "TransferBatch APPLICATION CONSTRUCTED").unwrap_err();
        assert!(err.to_string().contains("expected 'name class shape tag'"));
    }

    #[test]
    fn builtin_defaults_already_know_integer() {
        let g = Grammar::with_builtin_defaults();
        assert_eq!(g.translator.name_for(Class::Universal, 2), Some("INTEGER"));
    }
}
