use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use flate2::read::GzDecoder;

use daq_trace::ingest::split::{split_runs, write_runs, SplitOptions};

/// Split a raw logger dump into one CSV per run
#[derive(Parser, Debug)]
struct Args {
    /// Raw log (.csv or .csv.gz)
    input: PathBuf,

    /// Directory for output_{n}.csv files
    #[arg(long, default_value = ".")]
    out_dir: PathBuf,

    /// Name of the time column in the raw header
    #[arg(long, default_value = "time")]
    time_column: String,

    /// Runs shorter than this are dropped (seconds)
    #[arg(long, default_value = "300")]
    min_duration: f64,

    /// Keep the raw headers instead of the 27-field firmware schema
    #[arg(long, default_value_t = false)]
    keep_headers: bool,
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let file = File::open(&args.input)
        .with_context(|| format!("opening {}", args.input.display()))?;
    let reader: Box<dyn Read> = if args.input.extension().map(|e| e == "gz").unwrap_or(false) {
        Box::new(BufReader::new(GzDecoder::new(file)))
    } else {
        Box::new(BufReader::new(file))
    };

    let options = SplitOptions {
        time_column: args.time_column,
        min_duration_ms: (args.min_duration * 1000.0) as i64,
        relabel: !args.keep_headers,
    };

    let runs = split_runs(reader, &options)
        .with_context(|| format!("splitting {}", args.input.display()))?;
    let paths = write_runs(&runs, &args.out_dir)?;
    println!("Wrote {} runs to {}", paths.len(), args.out_dir.display());
    Ok(())
}
