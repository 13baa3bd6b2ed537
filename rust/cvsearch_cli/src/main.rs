mod cli;
mod config;
mod errors;
mod processing;

use std::io::Write;

use clap::Parser;
use serde::Serialize;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use cli::{
    Cli,
    Command,
    SyntheticArgs,
};
use config::{
    Config,
    Method,
};
use errors::CliError;

#[cfg(target_os = "windows")]
use mimalloc::MiMalloc;

#[cfg(target_os = "windows")]
#[global_allocator]
static GLOBAL: MiMalloc = MiMalloc;

#[derive(Debug, Serialize)]
struct SearchOutput<'a> {
    method: String,
    top_n: usize,
    num_spectra: usize,
    results: Vec<&'a [i32]>,
}

fn read_input(path: &std::path::Path) -> Result<cvsearch::EncodedInput, CliError> {
    let file = std::fs::File::open(path).map_err(|e| CliError::io(e, path))?;
    serde_json::from_reader(std::io::BufReader::new(file))
        .map_err(|e| CliError::ParseError { msg: e.to_string() })
}

fn synthetic(args: &SyntheticArgs, config: &Config) -> cvsearch::EncodedInput {
    processing::synthetic_input(
        args.seed,
        args.num_candidates,
        args.num_spectra,
        args.candidate_peaks,
        args.spectrum_peaks,
        &config.search.encoding,
    )
}

fn main() -> std::result::Result<(), CliError> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        ) // This uses RUST_LOG environment variable
        .init();

    let args = Cli::parse();

    match args.command {
        Command::Search(args) => {
            let config = Config::from_args(&args.config)?;
            let input = read_input(&args.input)?;
            let method = Method::of(&config);
            let (res, elapsed) = processing::run_method(method, &input, &config.search)?;
            info!(
                "Searched {} spectra with {} in {:?}",
                res.num_spectra(),
                method,
                elapsed
            );

            let out = SearchOutput {
                method: method.to_string(),
                top_n: res.top_n(),
                num_spectra: res.num_spectra(),
                results: res.rows().collect(),
            };
            let text = serde_json::to_string_pretty(&out)
                .map_err(|e| CliError::ParseError { msg: e.to_string() })?;
            match &args.output {
                Some(path) => std::fs::write(path, text).map_err(|e| CliError::io(e, path))?,
                None => {
                    let mut stdout = std::io::stdout().lock();
                    writeln!(stdout, "{}", text).map_err(|e| CliError::Io {
                        source: e.to_string(),
                        path: None,
                    })?;
                }
            }
        }
        Command::Compare(args) => {
            let config = Config::from_args(&args.config)?;
            let input = synthetic(&args, &config);
            let reports = processing::compare(&input, &config.search)?;
            println!("{:<10} {:>14} {:>10}", "method", "time", "agreement");
            for r in &reports {
                println!(
                    "{:<10} {:>14.3?} {:>10.3}",
                    r.method.to_string(),
                    r.elapsed,
                    r.agreement
                );
            }
            if let Some(bad) = reports.iter().find(|r| {
                matches!(r.method, Method::Cpu(_)) && r.agreement < 1.0
            }) {
                return Err(CliError::Mismatch {
                    method: bad.method.to_string(),
                    detail: format!("only {:.3} of the spectra agree", bad.agreement),
                });
            }
        }
        Command::Deterministic(args) => {
            let config = Config::from_args(&args)?;
            let passed = processing::deterministic(&config)?;
            println!("{} methods rank the worked example correctly", passed.len());
        }
        Command::Bench(args) => {
            let config = Config::from_args(&args.data.config)?;
            let input = synthetic(&args.data, &config);
            let method = Method::of(&config);
            let report = processing::bench(method, &input, &config.search, args.repeats)?;
            println!(
                "{}: {} runs, mean {:?}, min {:?}",
                report.method, report.runs, report.mean, report.min
            );
        }
    }
    Ok(())
}
