use std::error::Error;
use std::io::{self, Write};
use std::thread;
use std::time::Duration;

use clap::Parser;
use log::info;

use shmem::reader::{ReaderConfig, SeriesReader};
use shmem::Sample;

/// Prints the header and published samples of a shared memory series.
#[derive(Parser)]
#[clap()]
struct Opts {
    /// TOML file with a `[shmem]` table; only `name` is used.
    #[clap(short = 'c', long = "config")]
    config: Option<String>,
    #[clap(long)]
    name: Option<String>,
    /// Keep printing samples as they are published.
    #[clap(short = 'f', long)]
    follow: bool,
    #[clap(long = "poll-ms", default_value = "100")]
    poll_ms: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let opts = Opts::parse();
    let mut cfg: ReaderConfig = match &opts.config {
        Some(path) => confy::load_path(path)?,
        None => ReaderConfig::default(),
    };
    if let Some(name) = &opts.name {
        cfg.shmem.name = name.clone();
    }

    let reader = SeriesReader::<Sample>::new(&cfg)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    print_header(&reader, &mut out)?;
    let mut printed = print_since(&reader, 0, &mut out)?;

    if opts.follow {
        let poll = Duration::from_millis(opts.poll_ms);
        while !reader.is_full() {
            thread::sleep(poll);
            printed = print_since(&reader, printed, &mut out)?;
        }
        printed = print_since(&reader, printed, &mut out)?;
        info!("{} is full after {} samples", reader.name(), printed);
    }
    Ok(())
}

fn print_header<W: Write>(reader: &SeriesReader<Sample>, out: &mut W) -> io::Result<()> {
    writeln!(
        out,
        "Header - n: {}, start_ts: {}, interval: {}, limit: {}",
        reader.len(),
        reader.start_ts(),
        reader.interval(),
        reader.capacity()
    )
}

/// Prints samples from `from` up to the current count; returns the new count.
fn print_since<W: Write>(reader: &SeriesReader<Sample>, from: usize, out: &mut W) -> io::Result<usize> {
    let samples = reader.since(from);
    for (i, sample) in samples.iter().enumerate() {
        writeln!(out, "Index {}: {{ts: {}, v: {}}}", from + i, sample.ts, sample.v)?;
    }
    out.flush()?;
    Ok(from + samples.len())
}
