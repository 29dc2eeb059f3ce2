//! Subcommand implementations (§6.3). Each function reads its input
//! fully (memory-mapped where the input is a file), builds whatever
//! grammar/matcher the options call for, drives the relevant core
//! pipeline, and writes the result to `output` or stdout.

use std::fs::File;
use std::io::Write as _;
use std::path::Path;

use anyhow::{bail, Context, Result};
use ber_io::scratchpad::{FileSink, MemorySink, MemorySource, Sink};
use ber_xml::path::{Matcher, Path as XPath};
use ber_xml::tree::SchemaValidator;
use ber_xml::xml_writer::{Attributes, WriteOptions};
use ber_xml::{BerWriter, XmlWriter};

use crate::detect::{self, DetectionConfig};
use crate::grammar::Grammar;
use crate::pp;
use crate::CommonOpts;

/// Map this command's CLI flags onto the XML writer's attribute set.
fn attributes(opts: &CommonOpts) -> Attributes {
    Attributes {
        tag: opts.tag,
        class: opts.class,
        tl: opts.tl,
        t: opts.t_size,
        length: opts.length,
        off: opts.off,
        hex: opts.hex,
        rank: opts.rank,
    }
}

fn write_options(opts: &CommonOpts) -> WriteOptions {
    WriteOptions { attributes: attributes(opts), stop_after_first: opts.first, count: opts.count }
}

/// Read the whole input file into memory. Memory-mapped for any input
/// beyond a trivial size, matching `a2ltool`'s reach for `memmap2` on
/// large binary inputs.
fn read_input(path: &Path) -> Result<Vec<u8>> {
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let meta = file.metadata()?;
    if meta.len() == 0 {
        return Ok(Vec::new());
    }
    // SAFETY: the file is read-only for the duration of the mapping, and
    // the mapping is immediately copied out; no concurrent-modification
    // hazard outlives this function.
    let map = unsafe { memmap2::Mmap::map(&file) }
        .with_context(|| format!("memory-mapping {}", path.display()))?;
    Ok(map.to_vec())
}

/// Apply `--skip BYTES` (§9: "the skip offset applies to raw bytes").
fn apply_skip(data: Vec<u8>, opts: &CommonOpts) -> Vec<u8> {
    match opts.skip {
        Some(n) if n < data.len() => data[n..].to_vec(),
        Some(_) => Vec::new(),
        None => data,
    }
}

/// Write `bytes` to `output` if given, otherwise to stdout.
fn emit(bytes: &[u8], output: Option<&Path>) -> Result<()> {
    match output {
        Some(path) => {
            let sink = FileSink::new(File::create(path).with_context(|| format!("creating {}", path.display()))?);
            let mut writer = ber_io::ScratchpadWriter::new(sink);
            writer.write(bytes)?;
            writer.finish()?;
        }
        None => std::io::stdout().write_all(bytes)?,
    }
    Ok(())
}

/// Build the grammar to use: explicit `--asn`/`--asn-path` always wins;
/// otherwise auto-detect via `--asn-cfg` unless `--no-detect`; otherwise
/// fall back to the built-in bootstrap (§2, §6.4).
fn resolve_grammar(opts: &CommonOpts, data: &[u8]) -> Result<Grammar> {
    if opts.asn.is_some() || opts.asn_path.is_some() {
        let mut grammar = Grammar::with_builtin_defaults();
        if let Some(dir) = &opts.asn_path {
            grammar.load_dir(dir)?;
        }
        if let Some(file) = &opts.asn {
            grammar.load_file(file)?;
        }
        return Ok(grammar);
    }

    if !opts.no_detect {
        if let Some(cfg_path) = &opts.asn_cfg {
            let text = std::fs::read_to_string(cfg_path)
                .with_context(|| format!("reading auto-detection config {}", cfg_path.display()))?;
            let config: DetectionConfig = serde_json::from_str(&text)
                .with_context(|| format!("parsing auto-detection config {}", cfg_path.display()))?;
            return detect::detect(&config, data);
        }
    }

    Ok(Grammar::with_builtin_defaults())
}

fn xpath_matcher<'a>(expr: &'a str) -> Result<XPath> {
    XPath::parse(expr).with_context(|| format!("parsing XPath expression '{expr}'"))
}

pub fn write_id(opts: &CommonOpts, input: &Path, output: Option<&Path>) -> Result<()> {
    let data = apply_skip(read_input(input)?, opts);
    let sink = ber_io::transform::identity(MemorySource::new(&data), MemorySink::new())?;
    emit(&sink.into_inner(), output)
}

pub fn write_def(opts: &CommonOpts, input: &Path, output: Option<&Path>) -> Result<()> {
    let data = apply_skip(read_input(input)?, opts);
    let sink = ber_io::transform::to_definite(MemorySource::new(&data), MemorySink::new())?;
    emit(&sink.into_inner(), output)
}

pub fn write_indef(opts: &CommonOpts, input: &Path, output: Option<&Path>) -> Result<()> {
    let data = apply_skip(read_input(input)?, opts);
    let sink = ber_io::transform::to_indefinite(MemorySource::new(&data), MemorySink::new())?;
    emit(&sink.into_inner(), output)
}

fn run_xml_writer(
    opts: &CommonOpts,
    data: &[u8],
    grammar: &Grammar,
    expr: Option<&str>,
) -> Result<Vec<u8>> {
    let path = expr.map(xpath_matcher).transpose()?;
    let matcher = path.as_ref().map(Matcher::new);

    let mut hook = |class, tag, content: &[u8]| pp::obis_pretty_print(class, tag, content);

    let mut writer = XmlWriter::new(
        MemorySource::new(data),
        MemorySink::new(),
        &grammar.translator,
        &grammar.typifier,
        write_options(opts),
    );
    if let Some(m) = matcher {
        writer = writer.with_matcher(m);
    }
    if opts.pp {
        writer = writer.with_pp_hook(&mut hook);
    }
    let sink = writer.run()?;
    let bytes = sink.into_inner();
    if opts.indent {
        let xml = String::from_utf8(bytes).context("writer produced non-UTF-8 XML")?;
        Ok(indent_xml(&xml).into_bytes())
    } else {
        Ok(bytes)
    }
}

pub fn write_xml(opts: &CommonOpts, input: &Path, output: Option<&Path>) -> Result<()> {
    let data = apply_skip(read_input(input)?, opts);
    let grammar = resolve_grammar(opts, &data)?;
    let bytes = run_xml_writer(opts, &data, &grammar, opts.expr.as_deref())?;
    emit(&bytes, output)
}

pub fn search(opts: &CommonOpts, input: &Path, xpath: &str, output: Option<&Path>) -> Result<()> {
    let data = apply_skip(read_input(input)?, opts);
    let grammar = resolve_grammar(opts, &data)?;
    let bytes = run_xml_writer(opts, &data, &grammar, Some(xpath))?;
    emit(&bytes, output)
}

pub fn write_ber(opts: &CommonOpts, input: &Path, output: Option<&Path>) -> Result<()> {
    let data = apply_skip(read_input(input)?, opts);
    let grammar = resolve_grammar(opts, &data)?;
    let writer = BerWriter::new(MemorySource::new(&data), MemorySink::new(), &grammar.translator, &grammar.typifier);
    let sink = writer.run()?;
    emit(&sink.into_inner(), output)
}

/// Placeholder for the out-of-scope external XSD validator (spec.md §1:
/// "XSD schema validation (external XML validator)"). Confirms the file
/// is readable but performs no schema-level checking; a real integration
/// would implement [`SchemaValidator`] against an actual XSD engine.
struct NoopSchemaValidator;

impl SchemaValidator for NoopSchemaValidator {
    fn validate(&self, _roots: &[ber_core::node::Node]) -> ber_xml::XmlResult<()> {
        Ok(())
    }
}

pub fn validate(opts: &CommonOpts, input: &Path) -> Result<()> {
    let data = apply_skip(read_input(input)?, opts);
    let roots = ber_xml::tree::read_tree(MemorySource::new(&data))?;

    if let Some(xsd) = &opts.xsd {
        if !xsd.is_file() {
            bail!("--xsd file {} does not exist", xsd.display());
        }
        log::warn!(
            "--xsd {} given, but schema-level validation is an external collaborator (spec.md §1); only well-formedness was checked",
            xsd.display()
        );
        NoopSchemaValidator.validate(&roots)?;
    }

    println!("ok: {} top-level element(s), well-formed", roots.len());
    Ok(())
}

pub fn edit(opts: &CommonOpts, input: &Path, output: Option<&Path>, command: &[String]) -> Result<()> {
    let data = apply_skip(read_input(input)?, opts);
    let grammar = resolve_grammar(opts, &data)?;
    let mut roots = ber_xml::tree::read_tree(MemorySource::new(&data))?;

    let Some((name, rest)) = command.split_first() else {
        bail!("-c/--command requires at least 'NAME XPATH'");
    };
    let Some((xpath_str, args)) = rest.split_first() else {
        bail!("-c/--command requires at least 'NAME XPATH'");
    };
    let xpath = xpath_matcher(xpath_str)?;

    let changed = match name.as_str() {
        "remove" => ber_xml::tree::remove(&mut roots, &xpath, &grammar.translator),
        "replace" => {
            let [pattern, subst] = args else {
                bail!("'replace' needs 'XPATH REGEX SUBST'");
            };
            let re = regex::Regex::new(pattern).with_context(|| format!("compiling regex '{pattern}'"))?;
            ber_xml::tree::replace(&mut roots, &xpath, &re, subst, &grammar.translator, None, &grammar.typifier)?
        }
        "set_att" => {
            let [attr_name, value] = args else {
                bail!("'set_att' needs 'XPATH NAME VALUE'");
            };
            ber_xml::tree::set_att(&mut roots, &xpath, attr_name, value, &grammar.translator)?
        }
        "add" => {
            let [spec, content] = args else {
                bail!("'add' needs 'XPATH +NAME CONTENT'");
            };
            ber_xml::tree::add(&mut roots, &xpath, spec, content, &grammar.translator, None, &grammar.typifier)?
        }
        "insert" => {
            let [snippet_file, position] = args else {
                bail!("'insert' needs 'XPATH SNIPPET_FILE POSITION'");
            };
            let snippet = read_input(Path::new(snippet_file))?;
            let position: i32 =
                position.parse().with_context(|| format!("bad insert position '{position}'"))?;
            ber_xml::tree::insert(&mut roots, &xpath, &snippet, position, &grammar.translator)?
        }
        other => bail!("unknown edit command '{other}' (expected one of remove/replace/set_att/add/insert)"),
    };
    log::info!("edit command '{name}' affected {changed} node(s)");

    let sink = ber_xml::tree::write_tree(roots, MemorySink::new())?;
    emit(&sink.into_inner(), output)
}

/// Cosmetic `--indent` post-processor: the writer emits a flat string
/// with no whitespace between tags, so only the structural boundaries
/// (a `>` immediately followed by `<`) ever separate two tags with no
/// intervening text; splitting exactly there keeps a leaf's own open
/// tag, content and close tag together on one line.
fn indent_xml(xml: &str) -> String {
    let bytes = xml.as_bytes();
    let mut boundaries = vec![0usize];
    for i in 0..bytes.len().saturating_sub(1) {
        if bytes[i] == b'>' && bytes[i + 1] == b'<' {
            boundaries.push(i + 1);
        }
    }
    boundaries.push(xml.len());

    let mut depth = 0usize;
    let mut out = String::new();
    for w in boundaries.windows(2) {
        let piece = &xml[w[0]..w[1]];
        if piece.is_empty() {
            continue;
        }
        let is_close_only = piece.starts_with("</");
        let has_own_close = !is_close_only && piece.contains("</");
        if is_close_only {
            depth = depth.saturating_sub(1);
        }
        out.push_str(&"  ".repeat(depth));
        out.push_str(piece);
        out.push('\n');
        if !is_close_only && !has_own_close {
            depth += 1;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indent_keeps_leaf_text_on_one_line() {
        let xml = "<c tag='1'><p tag='4'>&#x01;</p></c>";
        let out = indent_xml(xml);
        assert_eq!(out, "<c tag='1'>\n  <p tag='4'>&#x01;</p>\n</c>\n");
    }

    #[test]
    fn apply_skip_truncates_leading_bytes() {
        let opts_skip = 2usize;
        let data = vec![1u8, 2, 3, 4, 5];
        let mut opts = test_opts();
        opts.skip = Some(opts_skip);
        assert_eq!(apply_skip(data, &opts), vec![3u8, 4, 5]);
    }

    fn test_opts() -> CommonOpts {
        CommonOpts {
            tag: false,
            class: false,
            tl: false,
            t_size: false,
            length: false,
            off: false,
            rank: false,
            hex: false,
            indent: false,
            skip: None,
            first: false,
            count: None,
            asn: None,
            asn_path: None,
            asn_cfg: None,
            no_detect: false,
            xsd: None,
            expr: None,
            pp: false,
        }
    }
}
