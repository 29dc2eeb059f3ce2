//! Auto-detection (§6.4): a JSON configuration declares a sequence of
//! candidate formats, tried in document order. Each candidate names an
//! initial grammar (used only to resolve its own extraction XPaths),
//! extraction XPaths that bind template variables from the decoded
//! input, and a resulting grammar file path templated on those
//! variables. Detection reads only the first [`DETECTION_UNIT_BUDGET`]
//! units of the input, through the same tree pipeline `search`/`edit`
//! use, so a malformed trailing region never blocks format sniffing.

use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use ber_core::node::Node;
use ber_core::tag::Shape;
use ber_io::scratchpad::{MemorySource, Source};
use ber_io::VerticalReader;
use ber_xml::{NameTranslator, Path as XPath};
use serde::Deserialize;

use crate::grammar::Grammar;

/// Detection only ever inspects this many leading units (§6.4 "the first
/// ~18 units"); a file whose format-identifying header lives further in
/// does not get auto-detected, and must be driven with an explicit
/// `--asn`/`--no-detect` instead.
pub const DETECTION_UNIT_BUDGET: usize = 18;

#[derive(Debug, Deserialize)]
pub struct DetectionConfig {
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
pub struct Candidate {
    pub name: String,
    /// Grammar file(s) loaded just to resolve `extract`'s XPaths; empty
    /// means the built-in UNIVERSAL bootstrap is enough.
    #[serde(default)]
    pub initial_grammar: Vec<PathBuf>,
    /// Template variable name -> XPath whose first structural match's
    /// rendered text becomes that variable's value.
    pub extract: BTreeMap<String, String>,
    /// Grammar file path, with `{var}` placeholders substituted from
    /// `extract`'s bindings, to load on a successful match.
    pub grammar_template: String,
}

/// Disallow anything a path-interpolated filename part shouldn't carry:
/// only ASCII alphanumerics, `-`, `_`, `.` survive (§6.4 "a conservative
/// character filter").
fn sanitize_part(raw: &str) -> Result<String> {
    if raw.is_empty() {
        bail!("extracted template variable is empty");
    }
    if !raw.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.') {
        bail!("extracted template variable '{raw}' contains characters not allowed in a path");
    }
    Ok(raw.to_string())
}

fn interpolate(template: &str, vars: &BTreeMap<String, String>) -> Result<PathBuf> {
    let mut out = template.to_string();
    for (name, value) in vars {
        out = out.replace(&format!("{{{name}}}"), value);
    }
    if out.contains('{') {
        bail!("grammar template '{template}' has unresolved placeholders: '{out}'");
    }
    Ok(PathBuf::from(out))
}

/// Parse only the first `budget` top-level TL units of `data` into a
/// forest of [`Node`]s, mirroring [`ber_io::transform::read_tree`] but
/// capped for detection's cheap-sniff contract.
fn read_capped_tree(data: &[u8], budget: usize) -> Result<Vec<Node>> {
    struct Open {
        class: ber_core::tag::Class,
        tag: u32,
        children: Vec<Node>,
    }

    let mut reader = VerticalReader::new(MemorySource::new(data));
    let mut stack: Vec<Open> = Vec::new();
    let mut roots: Vec<Node> = Vec::new();
    let mut seen = 0usize;

    fn attach(stack: &mut [Open], roots: &mut Vec<Node>, node: Node) {
        match stack.last_mut() {
            Some(open) => open.children.push(node),
            None => roots.push(node),
        }
    }

    while seen < budget {
        let Some(event) = reader.advance()? else { break };
        seen += 1;

        if event.unit.is_eoc() {
            let open = stack.pop().context("unexpected EOC during detection sniff")?;
            let mut node = Node::constructed(open.class, open.tag, true);
            for child in open.children {
                node.push_child(child);
            }
            attach(&mut stack, &mut roots, node);
            continue;
        }

        if event.unit.shape == Shape::Constructed && (event.unit.is_indefinite || event.unit.length > 0) {
            stack.push(Open { class: event.unit.class, tag: event.unit.tag, children: Vec::new() });
        } else {
            let content = reader.content()?.to_vec();
            let node = Node::leaf(event.unit.class, event.unit.shape, event.unit.tag, content);
            attach(&mut stack, &mut roots, node);
        }

        while reader.height() < stack.len() {
            let open = stack.pop().unwrap();
            let mut node = Node::constructed(open.class, open.tag, false);
            for child in open.children {
                node.push_child(child);
            }
            attach(&mut stack, &mut roots, node);
        }
    }

    Ok(roots)
}

fn extract_variable(roots: &[Node], xpath: &str, translator: &NameTranslator) -> Option<String> {
    let path = XPath::parse(xpath).ok()?;
    let addrs = ber_xml::tree::collect_addresses(roots, &path, translator);
    let addr = addrs.first()?;
    let mut node = roots.get(*addr.first()?)?;
    for &i in &addr[1..] {
        node = node.children()?.get(i)?;
    }
    let bytes = node.leaf_bytes()?;
    Some(String::from_utf8_lossy(bytes).trim_matches(char::from(0)).to_string())
}

/// Try each candidate in order against `data`'s leading units; the first
/// whose every `extract` XPath resolves wins, and its interpolated
/// grammar file is returned loaded on top of the built-in bootstrap.
pub fn detect(config: &DetectionConfig, data: &[u8]) -> Result<Grammar> {
    let roots = read_capped_tree(data, DETECTION_UNIT_BUDGET)?;

    'candidates: for candidate in &config.candidates {
        let mut probe = Grammar::with_builtin_defaults();
        for path in &candidate.initial_grammar {
            probe.load_file(path)?;
        }

        let mut vars = BTreeMap::new();
        for (name, xpath) in &candidate.extract {
            let Some(value) = extract_variable(&roots, xpath, &probe.translator) else {
                log::debug!("candidate '{}': xpath '{xpath}' did not match, skipping", candidate.name);
                continue 'candidates;
            };
            vars.insert(name.clone(), sanitize_part(&value)?);
        }

        let grammar_path = interpolate(&candidate.grammar_template, &vars)?;
        log::info!("auto-detected format '{}', loading grammar {}", candidate.name, grammar_path.display());
        let mut grammar = Grammar::with_builtin_defaults();
        grammar.load_file(&grammar_path)?;
        return Ok(grammar);
    }

    bail!("no detection candidate matched the input")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_path_traversal() {
        assert!(sanitize_part("../etc/passwd").is_err());
        assert!(sanitize_part("v1.2").is_ok());
    }

    #[test]
    fn interpolate_substitutes_all_known_variables() {
        let mut vars = BTreeMap::new();
        vars.insert("major".to_string(), "1".to_string());
        vars.insert("minor".to_string(), "2".to_string());
        let path = interpolate("grammars/{major}.{minor}.asn", &vars).unwrap();
        assert_eq!(path, PathBuf::from("grammars/1.2.asn"));
    }

    #[test]
    fn interpolate_fails_on_unresolved_placeholder() {
        let vars = BTreeMap::new();
        assert!(interpolate("grammars/{major}.asn", &vars).is_err());
    }

    #[test]
    fn read_capped_tree_stops_at_the_unit_budget() {
        let mut data = Vec::new();
        for b in 0u8..25 {
            data.extend([0x02, 0x01, b]);
        }
        let roots = read_capped_tree(&data, 18).unwrap();
        assert_eq!(roots.len(), 18);
    }
}
