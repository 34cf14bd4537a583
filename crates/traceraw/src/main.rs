//! traceraw: convert execution traces between the binary and text forms
//!
//! Reads a trace from stdin and writes the result to stdout.

use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use exectrace_traceparser::raw::{self, Decoder, TextReader, TextWriter, Writer};
use exectrace_traceparser::{ReaderConfig, TraceReader};

#[derive(Parser)]
#[command(name = "traceraw")]
#[command(about = "Convert execution traces between binary and text forms")]
#[command(version)]
struct Cli {
    /// What to do with the input
    #[arg(value_enum)]
    mode: Mode,

    /// JSON file with reader limits, used by validate
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
enum Mode {
    /// Text form to binary
    #[value(name = "text2bytes")]
    Text2bytes,
    /// Binary to text form
    #[value(name = "bytes2text")]
    Bytes2text,
    /// Text form to canonical text form, dropping comments
    Strip,
    /// Read and validate a binary trace, printing a summary
    Validate,
}

fn load_config(path: Option<&Path>) -> Result<ReaderConfig> {
    let Some(path) = path else {
        return Ok(ReaderConfig::default());
    };
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    serde_json::from_str(&data)
        .with_context(|| format!("failed to parse config {}", path.display()))
}

fn text2bytes(out: impl Write) -> Result<u64> {
    let mut src = TextReader::new(io::stdin().lock()).context("failed to read text header")?;
    let mut dst = Writer::new(out, src.version()).context("failed to write header")?;
    raw::copy(&mut src, &mut dst).context("failed to convert events")
}

fn bytes2text(out: impl Write) -> Result<u64> {
    let mut src = Decoder::detect(io::stdin().lock()).context("failed to read trace header")?;
    let mut dst = TextWriter::new(out, src.version()).context("failed to write header")?;
    raw::copy(&mut src, &mut dst).context("failed to convert events")
}

fn strip(out: impl Write) -> Result<u64> {
    let mut src = TextReader::new(io::stdin().lock()).context("failed to read text header")?;
    let mut dst = TextWriter::new(out, src.version()).context("failed to write header")?;
    raw::copy(&mut src, &mut dst).context("failed to copy events")
}

fn validate(mut out: impl Write, cfg: ReaderConfig) -> Result<u64> {
    let mut reader =
        TraceReader::with_config(io::stdin().lock(), cfg).context("failed to open trace")?;
    let mut n = 0;
    for ev in reader.by_ref() {
        ev.with_context(|| format!("invalid trace after {n} events"))?;
        n += 1;
    }
    writeln!(out, "generations: {}", reader.generations())?;
    writeln!(out, "events: {n}")?;
    Ok(n)
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_deref())?;

    let mut out = BufWriter::new(io::stdout().lock());
    let n = match cli.mode {
        Mode::Text2bytes => text2bytes(&mut out)?,
        Mode::Bytes2text => bytes2text(&mut out)?,
        Mode::Strip => strip(&mut out)?,
        Mode::Validate => validate(&mut out, cfg)?,
    };
    out.flush().context("failed to flush output")?;
    log::info!("processed {n} events");
    Ok(())
}
