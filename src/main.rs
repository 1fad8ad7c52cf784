//! binsplit command line.
//!
//! Usage:
//!   binsplit split big.csv 8 parts/big_
//!   binsplit inspect big.csv

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use binsplit::commands;
use binsplit::config::{SplitOptions, DEFAULT_EXTENSION, DEFAULT_QUEUE_CAPACITY, DEFAULT_WEIGHT_COLUMN};
use binsplit::error::SplitError;

#[derive(Parser, Debug)]
#[command(name = "binsplit")]
#[command(about = "Split a large CSV file into parts balanced by a per-record size column")]
#[command(version)]
struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split the input into weight-balanced files named <OUTPUT_PREFIX><N>.<EXT>
    Split {
        /// Input file; the first record is the header
        input: PathBuf,

        /// Number of output files
        #[arg(allow_negative_numbers = true)]
        buckets: i64,

        /// Prefix of the output file names, may include a directory
        output_prefix: String,

        /// Capacity of each per-output queue
        #[arg(long, default_value_t = DEFAULT_QUEUE_CAPACITY)]
        queue_capacity: usize,

        /// Extension of the output files
        #[arg(long, default_value = DEFAULT_EXTENSION)]
        extension: String,

        #[command(flatten)]
        format: FormatArgs,
    },

    /// Print the number of records and the total weight of the input
    Inspect {
        /// Input file; the first record is the header
        input: PathBuf,

        #[command(flatten)]
        format: FormatArgs,
    },
}

#[derive(Args, Debug)]
struct FormatArgs {
    /// Zero-based column holding the record weight
    #[arg(long, default_value_t = DEFAULT_WEIGHT_COLUMN)]
    weight_column: usize,

    /// Field delimiter (a single ASCII character)
    #[arg(short, long, default_value = ",", value_parser = parse_delimiter)]
    delimiter: u8,

    /// Print the summary as JSON
    #[arg(long)]
    json: bool,
}

impl FormatArgs {
    fn options(&self) -> SplitOptions {
        SplitOptions::default()
            .weight_column(self.weight_column)
            .delimiter(self.delimiter)
    }
}

fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "\\t" | "tab" => Ok(b'\t'),
        _ => match value.as_bytes() {
            [byte] if byte.is_ascii() => Ok(*byte),
            _ => Err(format!("expected a single ASCII character, got {:?}", value)),
        },
    }
}

fn init_tracing(verbose: u8, quiet: bool) {
    let level = if quiet {
        "warn"
    } else {
        match verbose {
            0 => "info",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("binsplit={}", level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

async fn run(command: Command) -> Result<(), SplitError> {
    match command {
        Command::Split {
            input,
            buckets,
            output_prefix,
            queue_capacity,
            extension,
            format,
        } => {
            let options = format
                .options()
                .queue_capacity(queue_capacity)
                .extension(extension);
            let summary = commands::split(&input, buckets, &output_prefix, &options).await?;
            if format.json {
                println!("{}", summary.to_json().map_err(|e| SplitError::Internal(e.to_string()))?);
            } else {
                print!("{}", summary);
            }
        }
        Command::Inspect { input, format } => {
            let summary = commands::inspect(&input, &format.options()).await?;
            if format.json {
                println!("{}", summary.to_json().map_err(|e| SplitError::Internal(e.to_string()))?);
            } else {
                print!("{}", summary);
            }
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet);

    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let presentation = e.to_presentation();
            eprintln!("Error: {}", presentation.title);
            eprintln!("  {}", presentation.message);
            if let Some(action) = presentation.action {
                eprintln!("  {}", action);
            }
            ExitCode::from(e.exit_code() as u8)
        }
    }
}
