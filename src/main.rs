use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use codefix::orchestrator::{self, AnalyzeOptions};
use codefix::report::OutputFormat;
use codefix::sandbox::DEFAULT_TIMEOUT_SECONDS;
use codefix::static_analyzer::DEFAULT_COMPLEXITY_THRESHOLD;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "codefix")]
#[command(about = "codefix - Static scan and sandboxed run of Python code", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliFormat {
    /// Human-readable report
    Text,
    /// JSON result shapes (the model payload for `analyze`)
    Json,
}

impl From<CliFormat> for OutputFormat {
    fn from(format: CliFormat) -> Self {
        match format {
            CliFormat::Text => OutputFormat::Text,
            CliFormat::Json => OutputFormat::Json,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a program and run it, then report both
    Analyze {
        /// Python file, or `-` for stdin
        input: PathBuf,

        /// Wall-clock limit for the run in seconds
        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
        timeout: f64,

        /// Complexity score at which a function is reported
        #[arg(long, default_value_t = DEFAULT_COMPLEXITY_THRESHOLD)]
        complexity_threshold: u32,

        /// Python interpreter (detected on PATH if not specified)
        #[arg(long, env = "CODEFIX_PYTHON")]
        python: Option<PathBuf>,

        #[arg(short, long, default_value = "text")]
        format: CliFormat,

        /// Enable verbose logging
        #[arg(short, long)]
        verbose: bool,
    },

    /// Static scan only
    Scan {
        /// Python file, or `-` for stdin
        input: PathBuf,

        #[arg(long, default_value_t = DEFAULT_COMPLEXITY_THRESHOLD)]
        complexity_threshold: u32,

        #[arg(short, long, default_value = "text")]
        format: CliFormat,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Sandboxed run only
    Run {
        /// Python file, or `-` for stdin
        input: PathBuf,

        #[arg(long, default_value_t = DEFAULT_TIMEOUT_SECONDS)]
        timeout: f64,

        #[arg(long, env = "CODEFIX_PYTHON")]
        python: Option<PathBuf>,

        #[arg(short, long, default_value = "text")]
        format: CliFormat,

        #[arg(short, long)]
        verbose: bool,
    },

    /// Pull a unified diff or a code block out of a model reply
    Extract {
        /// Reply text file, or `-` for stdin
        input: PathBuf,

        /// Extract the first fenced code block instead of a diff
        #[arg(long)]
        code: bool,
    },

    /// Show which Python interpreter runs would use
    Doctor {
        #[arg(long, env = "CODEFIX_PYTHON")]
        python: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            input,
            timeout,
            complexity_threshold,
            python,
            format,
            verbose,
        } => {
            let options = AnalyzeOptions {
                timeout,
                complexity_threshold,
                python,
                format: format.into(),
            };
            orchestrator::analyze_input(&input, options, verbose).await?;
        }
        Commands::Scan {
            input,
            complexity_threshold,
            format,
            verbose,
        } => {
            orchestrator::scan_input(&input, complexity_threshold, format.into(), verbose).await?;
        }
        Commands::Run {
            input,
            timeout,
            python,
            format,
            verbose,
        } => {
            orchestrator::run_input(&input, timeout, python, format.into(), verbose).await?;
        }
        Commands::Extract { input, code } => {
            orchestrator::extract_reply(&input, code).await?;
        }
        Commands::Doctor { python } => {
            orchestrator::doctor(python).await?;
        }
    }

    Ok(())
}
