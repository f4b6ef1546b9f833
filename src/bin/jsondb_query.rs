//! jsondb-query: Evaluate a path expression against a stored document
//!
//! Matches are written to stdout as newline-delimited JSON.
//!
//! Usage:
//!   jsondb-query file:///tmp/doc.jsonl '$.posts[*].title'
//!   jsondb-query --first file:///tmp/doc.jsonl '$..id'
//!   jsondb-query --rows file:///tmp/doc.jsonl

use anyhow::{Context, Result};
use clap::Parser;
use jsondb::Document;
use std::io::{BufWriter, Write};
use tracing::Level;

#[derive(Parser, Debug)]
#[command(name = "jsondb-query")]
#[command(about = "Query a stored JSON document", long_about = None)]
struct Args {
    /// Store address, e.g. file:///tmp/doc.jsonl
    #[arg(value_name = "ADDRESS")]
    address: String,

    /// Path expression (default: the whole document)
    #[arg(value_name = "PATH", default_value = "$")]
    path: String,

    /// Stop after the first match
    #[arg(long)]
    first: bool,

    /// Print the stored rows instead of evaluating a path
    #[arg(long, conflicts_with = "first")]
    rows: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let level = match args.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();

    let doc = Document::load(&args.address).with_context(|| format!("Failed to open {}", args.address))?;
    let stdout = std::io::stdout();
    let mut out = BufWriter::new(stdout.lock());

    if args.rows {
        for row in doc.dump_rows()? {
            writeln!(out, "{}", serde_json::to_string(&row)?)?;
        }
    } else if args.first {
        if let Some(node) = doc.query_first(&args.path).context("Failed to evaluate path")? {
            writeln!(out, "{}", serde_json::to_string(&node.value()?)?)?;
        }
    } else {
        for value in doc.query(&args.path).context("Failed to evaluate path")?.into_values() {
            writeln!(out, "{}", serde_json::to_string(&value?)?)?;
        }
    }

    out.flush()?;
    Ok(())
}
