use anyhow::{Context, Result};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::patcher;
use crate::protocol::{AnalysisResult, ExecutionResult, LlmPayload};
use crate::report::{self, OutputFormat};
use crate::sandbox::{interpreter, CodeRunner, Interpreter, Sandbox, SandboxConfig};
use crate::static_analyzer::{self, AnalyzerConfig};

/// Path argument meaning "read from standard input"
const STDIN_MARKER: &str = "-";

/// Both findings for one source text. Neither result is altered after it
/// comes back from its track.
#[derive(Debug, Clone)]
pub struct Session {
    /// Where the source came from, when it came from a file
    pub file: Option<String>,
    pub source: String,
    pub analysis: AnalysisResult,
    pub execution: ExecutionResult,
}

impl Session {
    pub fn payload(&self) -> LlmPayload<'_> {
        LlmPayload::new(
            self.file.as_deref(),
            &self.source,
            &self.analysis,
            &self.execution,
        )
    }
}

/// Settings for the `analyze` command
#[derive(Debug, Clone)]
pub struct AnalyzeOptions {
    pub timeout: f64,
    pub complexity_threshold: u32,
    pub python: Option<PathBuf>,
    pub format: OutputFormat,
}

/// Run the static scan and the sandboxed execution over the same text at
/// the same time. The scan is CPU-bound, so it goes to the blocking pool.
pub async fn analyze_source<R>(
    source: String,
    file: Option<String>,
    config: AnalyzerConfig,
    runner: &R,
) -> Result<Session>
where
    R: CodeRunner + ?Sized,
{
    let scan_source = source.clone();
    let scan = tokio::task::spawn_blocking(move || {
        static_analyzer::analyze_with(&scan_source, &config)
    });

    let (analysis, execution) = tokio::join!(scan, runner.execute(&source));
    let analysis = analysis.context("Static analysis task did not complete")?;

    info!(
        parsed = analysis.is_ok(),
        issues = analysis.issues().len(),
        completed = execution.is_ok(),
        timed_out = execution.timed_out(),
        elapsed = ?execution.elapsed_seconds(),
        "Both tracks finished"
    );

    Ok(Session {
        file,
        source,
        analysis,
        execution,
    })
}

pub async fn analyze_input(input: &Path, options: AnalyzeOptions, verbose: bool) -> Result<()> {
    init_logging(verbose);

    let (source, file) = read_input(input).await?;
    info!("Analyzing {}", file.as_deref().unwrap_or("<stdin>"));

    let sandbox = Sandbox::new(sandbox_config(options.timeout, options.python).await);
    debug!(
        interpreter = %sandbox.config().interpreter.display(),
        timeout = sandbox.config().timeout_seconds,
        "Sandbox ready"
    );
    let config = AnalyzerConfig {
        complexity_threshold: options.complexity_threshold,
    };
    let session = analyze_source(source, file, config, &sandbox).await?;

    match options.format {
        OutputFormat::Text => println!("{}", report::render_text(&session)),
        OutputFormat::Json => println!("{}", report::render_json(&session.payload())?),
    }

    Ok(())
}

pub async fn scan_input(
    input: &Path,
    complexity_threshold: u32,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    init_logging(verbose);

    let (source, file) = read_input(input).await?;
    info!("Scanning {}", file.as_deref().unwrap_or("<stdin>"));

    let analysis = static_analyzer::analyze_with(
        &source,
        &AnalyzerConfig {
            complexity_threshold,
        },
    );

    match format {
        OutputFormat::Text => println!("{}", report::render_analysis(&analysis)),
        OutputFormat::Json => println!("{}", report::render_json(&analysis)?),
    }

    Ok(())
}

pub async fn run_input(
    input: &Path,
    timeout: f64,
    python: Option<PathBuf>,
    format: OutputFormat,
    verbose: bool,
) -> Result<()> {
    init_logging(verbose);

    let (source, file) = read_input(input).await?;
    info!("Running {}", file.as_deref().unwrap_or("<stdin>"));

    let sandbox = Sandbox::new(sandbox_config(timeout, python).await);
    debug!(
        interpreter = %sandbox.config().interpreter.display(),
        timeout = sandbox.config().timeout_seconds,
        "Sandbox ready"
    );
    let execution = sandbox.run(&source).await;

    match format {
        OutputFormat::Text => println!("{}", report::render_execution(&execution)),
        OutputFormat::Json => println!("{}", report::render_json(&execution)?),
    }

    Ok(())
}

pub async fn extract_reply(input: &Path, code: bool) -> Result<()> {
    init_logging(false);

    let (reply, _) = read_input(input).await?;
    let extracted = if code {
        patcher::extract_code_block(&reply)
    } else {
        patcher::extract_unified_diff(&reply)
    };

    if extracted.is_empty() {
        warn!("Nothing to extract from the reply");
    } else {
        println!("{}", extracted);
    }

    Ok(())
}

/// Report which interpreter runs would use
pub async fn doctor(python: Option<PathBuf>) -> Result<()> {
    init_logging(false);

    let found = match python {
        Some(program) => Interpreter::probe(&program).await?,
        None => Interpreter::detect().await?,
    };

    println!("\n╔════════════════════════════════════════════╗");
    println!("║            codefix environment             ║");
    println!("╚════════════════════════════════════════════╝\n");
    println!("🔹 Interpreter: {}", found.program.display());
    println!("   Version: {}", found.version);
    println!("   Scratch dir: {}", std::env::temp_dir().display());

    Ok(())
}

/// Read the program text from `input`, or from stdin for `-`. The returned
/// label is the path as given, absent for stdin.
pub async fn read_input(input: &Path) -> Result<(String, Option<String>)> {
    if input.as_os_str() == STDIN_MARKER {
        let source = tokio::task::spawn_blocking(|| {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .map(|_| buffer)
        })
        .await
        .context("Stdin reader did not complete")?
        .context("Failed to read source from stdin")?;
        return Ok((source, None));
    }

    let source = tokio::fs::read_to_string(input)
        .await
        .with_context(|| format!("Failed to read {}", input.display()))?;
    Ok((source, Some(input.display().to_string())))
}

/// Sandbox settings for a CLI run. Without an explicit interpreter the first
/// one found on PATH is used, falling back to the platform default name.
async fn sandbox_config(timeout: f64, python: Option<PathBuf>) -> SandboxConfig {
    let interpreter = match python {
        Some(program) => program,
        None => match Interpreter::detect().await {
            Ok(found) => {
                debug!("Using {} ({})", found.program.display(), found.version);
                found.program
            }
            Err(e) => {
                warn!("{}; launching the default interpreter anyway", e);
                interpreter::default_program()
            }
        },
    };

    SandboxConfig {
        interpreter,
        timeout_seconds: timeout,
        ..SandboxConfig::default()
    }
}

pub fn init_logging(verbose: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        "codefix=debug"
    } else {
        "codefix=info"
    };

    // Reports go to stdout; keep logs out of the way
    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}
