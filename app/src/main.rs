use std::{
    fs::{self, File},
    io::{self, BufRead as _, BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use chrono::Local;
use clap::{Parser, ValueEnum};
use env_logger::Builder;
use log::LevelFilter;

use ipd_core::{format_address, record::RecordBatchReader, DedupError, Result};
use ipd_dedup::{DedupReport, DeduplicatorBuilder};

/// Inputs needing more chunks than this get a smaller-budget suggestion.
const MAX_CHUNKS_BEFORE_SUGGESTION: u64 = 150;
const SUGGESTED_CHUNKS: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// 4-byte little-endian records, as produced by the merge
    Binary,
    /// One dotted-decimal address per line
    Text,
}

#[derive(Parser, Debug)]
#[command(
    name = "ipdedup",
    about = "Counts the unique IPv4 addresses in a large text file with an external sort-merge",
    version
)]
struct Cli {
    #[arg(short, long, default_value = "ip_addresses", value_name = "FILE")]
    file: PathBuf,

    /// Chunk budget in bytes of input text
    #[arg(short, long, default_value_t = 1 << 30, value_name = "BYTES")]
    size: u64,

    #[arg(short, long, default_value_t = num_cpus::get())]
    workers: usize,

    /// Parent directory for the run's scratch directory
    #[arg(long, default_value = ".", value_name = "DIR")]
    temp_dir: PathBuf,

    /// Keep the deduplicated set after the run
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Binary)]
    output_format: OutputFormat,

    /// Accept a suggested chunk size without asking
    #[arg(short, long)]
    yes: bool,

    #[arg(short, long)]
    verbose: bool,
}

fn round_to_nearest_1024(n: u64) -> u64 {
    (n + 512) / 1024 * 1024
}

/// Returns a smaller budget when `budget` would cut the input into too many chunks.
fn suggest_chunk_size(file_size: u64, budget: u64) -> Option<u64> {
    if budget == 0 || file_size / budget <= MAX_CHUNKS_BEFORE_SUGGESTION {
        return None;
    }
    Some(round_to_nearest_1024(file_size / SUGGESTED_CHUNKS))
}

fn confirm(prompt: &str) -> bool {
    print!("{} [y/N] ", prompt);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    match io::stdin().lock().read_line(&mut answer) {
        Ok(_) => answer.trim().eq_ignore_ascii_case("y"),
        Err(_) => false,
    }
}

fn resolve_chunk_size(args: &Cli) -> Result<u64> {
    let file_size = fs::metadata(&args.file)
        .map_err(|e| {
            DedupError::Configuration(format!("cannot stat {}: {}", args.file.display(), e))
        })?
        .len();

    let suggestion = match suggest_chunk_size(file_size, args.size) {
        Some(size) if size > 0 => size,
        _ => return Ok(args.size),
    };
    log::warn!(
        "a {} byte budget splits {} bytes into more than {} chunks; {} bytes is suggested",
        args.size,
        file_size,
        MAX_CHUNKS_BEFORE_SUGGESTION,
        suggestion
    );
    if args.yes || confirm(&format!("Use a chunk size of {} bytes?", suggestion)) {
        log::info!("chunk size set to {} bytes", suggestion);
        Ok(suggestion)
    } else {
        Ok(args.size)
    }
}

fn export(final_file: &Path, output: &Path, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Binary => {
            fs::copy(final_file, output).map_err(|e| DedupError::io(output, e))?;
        }
        OutputFormat::Text => {
            let file = File::create(output).map_err(|e| DedupError::io(output, e))?;
            let mut writer = BufWriter::new(file);
            let mut reader = RecordBatchReader::open(final_file)?;
            while let Some(value) = reader.peek() {
                writeln!(writer, "{}", format_address(value))
                    .map_err(|e| DedupError::io(output, e))?;
                reader.advance()?;
            }
            writer.flush().map_err(|e| DedupError::io(output, e))?;
        }
    }
    log::info!("wrote unique addresses to {}", output.display());
    Ok(())
}

fn report(report: &DedupReport) {
    let counters = &report.counters;
    log::info!(
        "duplicates removed: {} within chunks, {} while merging",
        counters.deduped_in_chunk,
        counters.deduped_in_merge
    );
    log::info!(
        "{} chunk(s), {} merge round(s), {} merge job(s)",
        report.chunk_count,
        report.merge_rounds,
        report.merge_jobs
    );

    println!("Total lines:    {}", counters.total_lines);
    println!("Unique:         {}", report.unique_count());
    println!("Elapsed:        {:?}", report.elapsed);
}

fn run(args: Cli) -> Result<()> {
    log::info!("input file: {}", args.file.display());
    log::info!("CPUs detected: {}", num_cpus::get());
    log::info!("workers: {}", args.workers);

    let chunk_size = resolve_chunk_size(&args)?;

    let work_dir = tempfile::Builder::new()
        .prefix("ipdedup-")
        .tempdir_in(&args.temp_dir)
        .map_err(|e| DedupError::io(&args.temp_dir, e))?;
    log::debug!("working directory: {}", work_dir.path().display());

    let result = DeduplicatorBuilder::new(work_dir.path())
        .chunk_size(chunk_size)
        .workers(args.workers)
        .build()?
        .run(&args.file)?;

    if let Some(output) = &args.output {
        export(&result.final_file.path, output, args.output_format)?;
    }
    report(&result);
    Ok(())
}

fn main() -> ExitCode {
    let args = Cli::parse();

    let level = if args.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    Builder::new()
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] - {}",
                Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.args()
            )
        })
        .filter(None, level)
        .init();

    let start = std::time::Instant::now();
    match run(args) {
        Ok(()) => {
            log::info!("finished in {:?}", start.elapsed());
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
