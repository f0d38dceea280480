use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Names tried in order when no interpreter is configured
const CANDIDATES: &[&str] = &["python3", "python", "py"];

/// Interpreter used when nothing is configured and nothing was probed
pub fn default_program() -> PathBuf {
    if cfg!(windows) {
        PathBuf::from("python")
    } else {
        PathBuf::from("python3")
    }
}

/// A Python interpreter that answered `--version`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interpreter {
    pub program: PathBuf,
    pub version: String,
}

impl Interpreter {
    /// First working candidate on PATH
    pub async fn detect() -> Result<Self> {
        for name in CANDIDATES {
            if let Ok(interpreter) = Self::probe(name).await {
                return Ok(interpreter);
            }
        }
        anyhow::bail!("Python not found in PATH (tried {})", CANDIDATES.join(", "))
    }

    pub async fn probe(program: impl AsRef<Path>) -> Result<Self> {
        let program = program.as_ref();
        let output = Command::new(program)
            .arg("--version")
            .output()
            .await
            .with_context(|| format!("Failed to run {} --version", program.display()))?;

        if !output.status.success() {
            anyhow::bail!("{} --version exited with {}", program.display(), output.status);
        }

        // Old interpreters print the version on stderr
        let raw = if output.stdout.is_empty() {
            output.stderr
        } else {
            output.stdout
        };

        Ok(Self {
            program: program.to_path_buf(),
            version: String::from_utf8_lossy(&raw).trim().to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_program_is_an_error() {
        let err = Interpreter::probe("codefix-no-such-python").await.unwrap_err();
        assert!(err.to_string().contains("codefix-no-such-python"));
    }

    #[tokio::test]
    async fn detected_interpreter_reports_python() {
        if let Ok(interpreter) = Interpreter::detect().await {
            assert!(interpreter.version.starts_with("Python"), "{}", interpreter.version);
        }
    }
}
