//! jsondb-import: Decompose a JSON document into a row store
//!
//! Usage:
//!   # Read from file into a row file
//!   jsondb-import file:///tmp/doc.jsonl data.json
//!
//!   # Read from stdin, keep an existing document's link key convention
//!   cat data.json | jsondb-import --link-key '$ref' file:///tmp/doc.jsonl
//!
//!   # Merge into a document that already exists
//!   jsondb-import --merge file:///tmp/doc.jsonl more.json

// Use MiMalloc allocator for better performance (recommended by simd-json)
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use jsondb::{import, Document, DocumentConfig};
use std::fs::File;
use std::io::{BufReader, Read};
use tracing::{info, Level};

#[derive(Parser, Debug)]
#[command(name = "jsondb-import")]
#[command(about = "Store a JSON document as rows", long_about = None)]
struct Args {
    /// Store address, e.g. file:///tmp/doc.jsonl
    #[arg(value_name = "ADDRESS")]
    address: String,

    /// Input file (use stdin if omitted)
    #[arg(value_name = "FILE")]
    input: Option<String>,

    /// Feed into the existing document instead of replacing it
    #[arg(long)]
    merge: bool,

    /// Property name stored as a row link instead of a child
    #[arg(long)]
    link_key: Option<String>,

    /// Maximum nesting depth accepted (default: 128)
    #[arg(long)]
    max_depth: Option<usize>,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = DocumentConfig::default();
    if let Some(link_key) = &args.link_key {
        config = config.link_key(link_key.as_str());
    }
    if let Some(depth) = args.max_depth {
        config = config.max_depth(depth);
    }

    let reader = if let Some(file_path) = &args.input {
        let file = File::open(file_path).with_context(|| format!("Failed to open {}", file_path))?;
        Box::new(BufReader::new(file)) as Box<dyn Read>
    } else {
        Box::new(std::io::stdin()) as Box<dyn Read>
    };

    let doc = if args.merge {
        let doc = Document::load_with(&args.address, config)
            .with_context(|| format!("Failed to open {}", args.address))?;
        let value = import::read_value(reader).context("Failed to parse JSON")?;
        let created = doc
            .atomically(|doc| doc.feed(&value))
            .context("Failed to merge document")?;
        info!(rows = created.len(), "merged");
        doc
    } else {
        Document::import(&args.address, reader, config)
            .with_context(|| format!("Failed to import into {}", args.address))?
    };

    let rows = doc.dump_rows()?.len();
    let mismatched = doc.check_counts()?;
    if !mismatched.is_empty() {
        bail!("stored counts disagree with children for rows {:?}", mismatched);
    }
    eprintln!("✓ {} rows stored at {}", rows, doc.path()?);

    doc.close()?;
    Ok(())
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}
