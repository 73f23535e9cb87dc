use std::{
    fs::File,
    io::{BufWriter, Write},
    path::{Path, PathBuf},
    process::ExitCode,
};

use chrono::Local;
use clap::Parser;
use env_logger::Builder;
use log::LevelFilter;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};

use ipd_core::{format_address, DedupError, Result};

#[derive(Parser, Debug)]
#[command(
    name = "ipgen",
    about = "Writes a shuffled file of random IPv4 addresses, each appearing twice",
    version
)]
struct Cli {
    /// Number of lines to write; odd counts are rounded down
    #[arg(short, long, value_name = "COUNT")]
    amount: u64,

    #[arg(short, long, default_value = "ip_addresses.txt", value_name = "FILE")]
    output: PathBuf,

    /// Fixes the random sequence for reproducible files
    #[arg(long)]
    seed: Option<u64>,
}

fn generate<R: Rng>(rng: &mut R, amount: u64) -> Vec<u32> {
    let mut values: Vec<u32> = (0..amount / 2).map(|_| rng.gen()).collect();
    values.extend_from_within(..);
    values.shuffle(rng);
    values
}

fn write_addresses(path: &Path, values: &[u32]) -> Result<()> {
    let file = File::create(path).map_err(|e| DedupError::io(path, e))?;
    let mut writer = BufWriter::new(file);
    for value in values {
        writeln!(writer, "{}", format_address(*value)).map_err(|e| DedupError::io(path, e))?;
    }
    writer.flush().map_err(|e| DedupError::io(path, e))
}

fn main() -> ExitCode {
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
        .filter(None, LevelFilter::Info)
        .init();

    let args = Cli::parse();
    let start = std::time::Instant::now();

    let mut rng = match args.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    let values = generate(&mut rng, args.amount);

    match write_addresses(&args.output, &values) {
        Ok(()) => {
            log::info!(
                "wrote {} addresses to {} in {:?}",
                values.len(),
                args.output.display(),
                start.elapsed()
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
