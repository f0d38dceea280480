use anyhow::{Context, Result};
use serde::Serialize;
use std::fmt::Write;

use crate::orchestrator::Session;
use crate::protocol::{AnalysisResult, ComplexityScores, ExecutionResult};

/// Bars stop growing past this score
const MAX_BAR: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Full human-readable report for one session
pub fn render_text(session: &Session) -> String {
    let mut out = String::from("=== CODE ANALYSIS ===\n");
    if let Some(file) = &session.file {
        let _ = writeln!(out, "File: {}", file);
    }
    out.push('\n');
    out.push_str(&render_analysis(&session.analysis));
    out.push('\n');
    out.push_str(&render_execution(&session.execution));
    out
}

/// Issues then, when any function was measured, the complexity chart
pub fn render_analysis(analysis: &AnalysisResult) -> String {
    let mut out = String::from("▸ AST ANALYSIS\n");

    match analysis {
        AnalysisResult::SyntaxError { message, line } => {
            let _ = writeln!(out, "  ✗ Syntax Error: {} (line {})", message, line_label(*line));
        }
        AnalysisResult::Scanned { issues, complexity } => {
            if issues.is_empty() {
                out.push_str("  ✓ No issues found\n");
            }
            for issue in issues {
                let _ = writeln!(
                    out,
                    "  ⚠ [{}] {}  (line {})",
                    issue.kind,
                    issue.message,
                    line_label(issue.line)
                );
            }

            if !complexity.is_empty() {
                out.push('\n');
                out.push_str(&render_complexity(complexity));
            }
        }
    }

    out
}

fn render_complexity(scores: &ComplexityScores) -> String {
    let mut out = String::from("▸ COMPLEXITY\n");
    let width = scores.keys().map(|name| name.len()).max().unwrap_or(0) + 2;

    for (name, score) in scores {
        let label = format!("{}()", name);
        let bar = "█".repeat((*score).min(MAX_BAR) as usize);
        let _ = writeln!(
            out,
            "  {:<width$} {} {} ({})",
            label,
            bar,
            score,
            rating(*score),
            width = width
        );
    }

    out
}

fn rating(score: u32) -> &'static str {
    match score {
        0..=4 => "low",
        5..=9 => "moderate",
        _ => "high",
    }
}

pub fn render_execution(execution: &ExecutionResult) -> String {
    let mut out = String::from("▸ RUNTIME ANALYSIS\n");

    match execution {
        ExecutionResult::Completed {
            stdout,
            stderr,
            exit_code,
            elapsed_seconds,
        } => {
            let mark = if *exit_code == 0 { '✓' } else { '✗' };
            let _ = writeln!(
                out,
                "  {} Return code: {}  ⏱ {}s",
                mark, exit_code, elapsed_seconds
            );
            if !stdout.trim().is_empty() {
                let _ = writeln!(out, "  stdout:\n{}", stdout.trim_end());
            }
            if !stderr.trim().is_empty() {
                let _ = writeln!(out, "  stderr:\n{}", stderr.trim_end());
            }
        }
        ExecutionResult::TimedOut { elapsed_seconds } => {
            let _ = writeln!(
                out,
                "  ✗ Timeout during execution (killed after {}s)",
                elapsed_seconds
            );
        }
        ExecutionResult::Failed { error } => {
            let _ = writeln!(out, "  ✗ {}", error);
        }
    }

    out
}

/// Pretty JSON for any result shape or the model payload
pub fn render_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    serde_json::to_string_pretty(value).context("Failed to serialize report")
}

fn line_label(line: Option<usize>) -> String {
    line.map_or_else(|| "?".to_string(), |line| line.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Issue, IssueKind};

    fn session(analysis: AnalysisResult, execution: ExecutionResult) -> Session {
        Session {
            file: Some("demo.py".into()),
            source: "x = 1\n".into(),
            analysis,
            execution,
        }
    }

    #[test]
    fn issues_and_bars_are_listed() {
        let mut complexity = ComplexityScores::new();
        complexity.insert("small".into(), 1);
        complexity.insert("huge".into(), 27);
        let analysis = AnalysisResult::Scanned {
            issues: vec![Issue::new(
                IssueKind::BareExcept,
                "Bare 'except:' catches all exceptions",
                Some(4),
            )],
            complexity,
        };

        let text = render_analysis(&analysis);
        assert!(text.contains("⚠ [bare_except] Bare 'except:' catches all exceptions  (line 4)"));
        assert!(text.contains("▸ COMPLEXITY"));

        let huge = text.lines().find(|l| l.contains("huge()")).unwrap();
        assert_eq!(huge.matches('█').count(), 20);
        assert!(huge.ends_with("27 (high)"));

        let small = text.lines().find(|l| l.contains("small()")).unwrap();
        assert_eq!(small.matches('█').count(), 1);
        assert!(small.ends_with("1 (low)"));
    }

    #[test]
    fn clean_scan_says_so() {
        let analysis = AnalysisResult::Scanned {
            issues: vec![],
            complexity: ComplexityScores::new(),
        };
        let text = render_analysis(&analysis);
        assert!(text.contains("✓ No issues found"));
        assert!(!text.contains("COMPLEXITY"));
    }

    #[test]
    fn syntax_error_shows_line_or_placeholder() {
        let text = render_analysis(&AnalysisResult::SyntaxError {
            message: "invalid syntax".into(),
            line: Some(3),
        });
        assert!(text.contains("✗ Syntax Error: invalid syntax (line 3)"));

        let text = render_analysis(&AnalysisResult::SyntaxError {
            message: "no tree".into(),
            line: None,
        });
        assert!(text.contains("(line ?)"));
    }

    #[test]
    fn each_runtime_outcome_reads_differently() {
        let done = render_execution(&ExecutionResult::Completed {
            stdout: "hello\n".into(),
            stderr: String::new(),
            exit_code: 0,
            elapsed_seconds: 0.0421,
        });
        assert!(done.contains("✓ Return code: 0  ⏱ 0.0421s"));
        assert!(done.contains("stdout:\nhello"));
        assert!(!done.contains("stderr:"));

        let crashed = render_execution(&ExecutionResult::Completed {
            stdout: String::new(),
            stderr: "Traceback\nZeroDivisionError\n".into(),
            exit_code: 1,
            elapsed_seconds: 0.05,
        });
        assert!(crashed.contains("✗ Return code: 1"));
        assert!(crashed.contains("stderr:\nTraceback\nZeroDivisionError"));

        let slow = render_execution(&ExecutionResult::TimedOut {
            elapsed_seconds: 5.0,
        });
        assert!(slow.contains("✗ Timeout during execution (killed after 5s)"));

        let broken = render_execution(&ExecutionResult::failed("failed to launch 'python9'"));
        assert!(broken.contains("✗ failed to launch 'python9'"));
    }

    #[test]
    fn full_report_has_both_sections() {
        let text = render_text(&session(
            AnalysisResult::Scanned {
                issues: vec![],
                complexity: ComplexityScores::new(),
            },
            ExecutionResult::failed("nope"),
        ));
        assert!(text.starts_with("=== CODE ANALYSIS ===\nFile: demo.py\n"));
        let ast = text.find("▸ AST ANALYSIS").unwrap();
        let runtime = text.find("▸ RUNTIME ANALYSIS").unwrap();
        assert!(ast < runtime);
    }

    #[test]
    fn payload_json_has_model_fields() {
        let s = session(
            AnalysisResult::SyntaxError {
                message: "invalid syntax".into(),
                line: Some(1),
            },
            ExecutionResult::TimedOut {
                elapsed_seconds: 1.0,
            },
        );
        let json: serde_json::Value =
            serde_json::from_str(&render_json(&s.payload()).unwrap()).unwrap();

        assert_eq!(json["file"], "demo.py");
        assert_eq!(json["source"], "x = 1\n");
        assert_eq!(json["ast_result"]["ok"], false);
        assert_eq!(json["runtime_result"]["timed_out"], true);
        assert!(json["session_id"].is_string());
        assert!(json["generated_at"].is_string());
    }
}
