//! Command-line front end for the BER/XML codec (§6.3): write, search,
//! validate and edit BER documents. Parses and dispatches to [`commands`];
//! all actual decoding/encoding lives in `ber-core`/`ber-io`/`ber-xml`.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;
mod detect;
mod grammar;
mod pp;

/// Read, write, search, edit and validate X.690 BER documents and their
/// XML projection.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(flatten)]
    common: CommonOpts,

    #[command(subcommand)]
    command: Command,
}

/// Options shared across subcommands (§6.3's flat option list).
#[derive(clap::Args, Debug)]
pub(crate) struct CommonOpts {
    /// Decorate elements with their numeric tag (`tag` attribute).
    #[arg(long)]
    pub(crate) tag: bool,
    /// Decorate elements with their tag class.
    #[arg(long)]
    pub(crate) class: bool,
    /// Decorate elements with their TL header size.
    #[arg(long)]
    pub(crate) tl: bool,
    /// Decorate elements with their identifier-octet size.
    #[arg(long = "t_size")]
    pub(crate) t_size: bool,
    /// Decorate elements with their declared content length.
    #[arg(long)]
    pub(crate) length: bool,
    /// Decorate elements with their byte offset in the input.
    #[arg(long)]
    pub(crate) off: bool,
    /// Decorate elements with their 1-based sibling rank.
    #[arg(long)]
    pub(crate) rank: bool,
    /// Append a hex dump comment after primitive content.
    #[arg(long)]
    pub(crate) hex: bool,
    /// Pretty-indent the emitted XML (cosmetic only; not a core concern).
    #[arg(long)]
    pub(crate) indent: bool,
    /// Skip this many raw bytes at the start of the input before parsing.
    #[arg(long)]
    pub(crate) skip: Option<usize>,
    /// Stop after the first matching/top-level element.
    #[arg(long)]
    pub(crate) first: bool,
    /// Stop after this many top-level elements.
    #[arg(long)]
    pub(crate) count: Option<usize>,
    /// Load a single ASN.1-adjacent grammar file (`name class shape tag` lines).
    #[arg(long)]
    pub(crate) asn: Option<PathBuf>,
    /// Load every `*.asn` grammar file in this directory.
    #[arg(long = "asn-path")]
    pub(crate) asn_path: Option<PathBuf>,
    /// JSON auto-detection configuration (§6.4).
    #[arg(long = "asn-cfg")]
    pub(crate) asn_cfg: Option<PathBuf>,
    /// Disable format auto-detection even if `--asn-cfg` is given.
    #[arg(long = "no-detect")]
    pub(crate) no_detect: bool,
    /// External XSD schema file; checked for existence only (§6.3's XSD
    /// validator is an out-of-scope external collaborator).
    #[arg(long)]
    pub(crate) xsd: Option<PathBuf>,
    /// Filter emitted elements to this XPath-lite expression.
    #[arg(short = 'e', long)]
    pub(crate) expr: Option<String>,
    /// Register the sample OBIS-style pretty-print hook on 6-byte BCD content.
    #[arg(long)]
    pub(crate) pp: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Identity BER→BER rewrite (validates parser/writer symmetry).
    WriteId {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rewrite every indefinite constructed frame to minimal definite form.
    WriteDef {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rewrite every definite constructed frame to indefinite form.
    WriteIndef {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Project a BER document to its XML representation.
    WriteXml {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Serialize an XML projection back to BER.
    WriteBer {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Emit only the elements matching an XPath-lite expression.
    Search {
        input: PathBuf,
        xpath: String,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Parse the document and report whether it is well-formed.
    Validate { input: PathBuf },
    /// Apply one structural edit command to the document (§4.10).
    Edit {
        input: PathBuf,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// `NAME XPATH ARGS...`, e.g. `remove /Foo/Bar` or
        /// `replace /Foo '[0-9]+' N` or `set_att /Foo tag 5`.
        #[arg(short = 'c', long = "command", num_args = 2.., value_names = ["NAME", "XPATH"])]
        edit_command: Vec<String>,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
    Ok(())
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::WriteId { input, output } => commands::write_id(&cli.common, input, output.as_deref()),
        Command::WriteDef { input, output } => commands::write_def(&cli.common, input, output.as_deref()),
        Command::WriteIndef { input, output } => commands::write_indef(&cli.common, input, output.as_deref()),
        Command::WriteXml { input, output } => commands::write_xml(&cli.common, input, output.as_deref()),
        Command::WriteBer { input, output } => commands::write_ber(&cli.common, input, output.as_deref()),
        Command::Search { input, xpath, output } => {
            commands::search(&cli.common, input, xpath, output.as_deref())
        }
        Command::Validate { input } => commands::validate(&cli.common, input),
        Command::Edit { input, output, edit_command } => {
            commands::edit(&cli.common, input, output.as_deref(), edit_command)
        }
    }
}
