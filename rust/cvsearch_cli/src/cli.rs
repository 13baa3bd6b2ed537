use clap::{
    Args,
    Parser,
    Subcommand,
};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Search an encoded JSON input and write the ranked candidates as JSON
    Search(SearchArgs),
    /// Run every method on the same synthetic data and check they agree
    Compare(SyntheticArgs),
    /// Check every method against the small hand-computed example
    Deterministic(ConfigArgs),
    /// Time one method over repeated runs
    Bench(BenchArgs),
}

/// Options shared by every subcommand, layered over the config file.
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigArgs {
    /// Path to a JSON configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Method label, e.g. f32CPU_SV, i32CPU_DM or f32GPU_SM (will over-write the config file)
    #[arg(short, long)]
    pub method: Option<String>,

    /// Number of candidates reported per spectrum
    #[arg(long)]
    pub top_n: Option<i32>,

    /// Matching tolerance in daltons
    #[arg(long)]
    pub tolerance: Option<f32>,

    /// Worker threads, 0 uses every core
    #[arg(long)]
    pub cores: Option<i32>,

    /// Spectra per batch for the batched methods
    #[arg(long)]
    pub batch_size: Option<i32>,

    /// Log progress every N spectra
    #[arg(long)]
    pub verbose: Option<i32>,

    /// Report raw sums instead of dividing by the candidate length
    #[arg(long)]
    pub no_normalize: bool,

    /// Use a binary match kernel instead of the Gaussian one
    #[arg(long)]
    pub no_gaussian: bool,
}

#[derive(Args, Debug)]
pub struct SearchArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    /// Encoded input (candidate_values, candidate_offsets, spectrum_values, spectrum_offsets)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output file, stdout when missing
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct SyntheticArgs {
    #[command(flatten)]
    pub config: ConfigArgs,

    #[arg(long, default_value_t = 2000)]
    pub num_candidates: usize,

    #[arg(long, default_value_t = 200)]
    pub num_spectra: usize,

    #[arg(long, default_value_t = 100)]
    pub candidate_peaks: usize,

    #[arg(long, default_value_t = 500)]
    pub spectrum_peaks: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,
}

#[derive(Args, Debug)]
pub struct BenchArgs {
    #[command(flatten)]
    pub data: SyntheticArgs,

    /// Number of timed runs
    #[arg(short, long, default_value_t = 5)]
    pub repeats: usize,
}
