use codefix::sandbox::{Interpreter, Sandbox, SandboxConfig};
use codefix::{run_in_sandbox, ExecutionResult};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tempfile::TempDir;

/// Interpreter to run with, or `None` (and a note) when the machine has none
async fn python() -> Option<PathBuf> {
    match Interpreter::detect().await {
        Ok(found) => Some(found.program),
        Err(e) => {
            eprintln!("skipping sandbox test: {}", e);
            None
        }
    }
}

fn sandbox(python: PathBuf, timeout_seconds: f64, scratch: &TempDir) -> Sandbox {
    Sandbox::new(SandboxConfig {
        interpreter: python,
        timeout_seconds,
        scratch_dir: Some(scratch.path().to_path_buf()),
        ..SandboxConfig::default()
    })
}

fn assert_no_leftovers(scratch: &TempDir) {
    let left: Vec<_> = std::fs::read_dir(scratch.path())
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .collect();
    assert!(left.is_empty(), "script files left behind: {:?}", left);
}

fn fixture(name: &str) -> String {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name);
    std::fs::read_to_string(path).unwrap()
}

#[tokio::test]
async fn clean_exit_captures_stdout() {
    let Some(python) = python().await else { return };
    let scratch = tempfile::tempdir().unwrap();

    let result = sandbox(python, 5.0, &scratch)
        .run("print('hello from the sandbox')\n")
        .await;

    match result {
        ExecutionResult::Completed {
            stdout,
            stderr,
            exit_code,
            elapsed_seconds,
        } => {
            assert_eq!(stdout.trim_end(), "hello from the sandbox");
            assert!(stderr.is_empty(), "{}", stderr);
            assert_eq!(exit_code, 0);
            assert!(elapsed_seconds >= 0.0 && elapsed_seconds < 5.0);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_no_leftovers(&scratch);
}

#[tokio::test]
async fn non_zero_exit_is_still_completed() {
    let Some(python) = python().await else { return };
    let scratch = tempfile::tempdir().unwrap();
    let runner = sandbox(python, 5.0, &scratch);

    let result = runner
        .run("import sys\nsys.stderr.write('bad input\\n')\nsys.exit(3)\n")
        .await;
    match result {
        ExecutionResult::Completed {
            stderr, exit_code, ..
        } => {
            assert_eq!(exit_code, 3);
            assert_eq!(stderr.trim_end(), "bad input");
        }
        other => panic!("expected completion, got {:?}", other),
    }

    let result = runner.run("print(1 / 0)\n").await;
    match result {
        ExecutionResult::Completed {
            stderr, exit_code, ..
        } => {
            assert_eq!(exit_code, 1);
            assert!(stderr.contains("ZeroDivisionError"), "{}", stderr);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_no_leftovers(&scratch);
}

#[tokio::test]
async fn syntax_errors_surface_as_interpreter_output() {
    let Some(python) = python().await else { return };
    let scratch = tempfile::tempdir().unwrap();

    let result = sandbox(python, 5.0, &scratch)
        .run(&fixture("broken.py"))
        .await;
    match result {
        ExecutionResult::Completed {
            stderr, exit_code, ..
        } => {
            assert_ne!(exit_code, 0);
            assert!(stderr.contains("SyntaxError"), "{}", stderr);
        }
        other => panic!("expected completion, got {:?}", other),
    }
    assert_no_leftovers(&scratch);
}

#[tokio::test]
async fn infinite_loop_times_out_promptly() {
    let Some(python) = python().await else { return };
    let scratch = tempfile::tempdir().unwrap();

    let started = Instant::now();
    let result = sandbox(python, 1.0, &scratch).run(&fixture("spin.py")).await;
    let took = started.elapsed();

    assert_eq!(
        result,
        ExecutionResult::TimedOut {
            elapsed_seconds: 1.0
        }
    );
    assert!(took >= Duration::from_secs(1));
    assert!(took < Duration::from_secs(4), "took {:?}", took);
    assert_no_leftovers(&scratch);
}

/// Source for a program that starts a grandchild which writes `sentinel`
/// after a delay, then either exits or spins
#[cfg(unix)]
fn spawner(sentinel: &Path, then_spin: bool) -> String {
    let mut source = format!(
        "import subprocess, sys\n\
         subprocess.Popen([sys.executable, '-c', \
         'import sys, time; time.sleep(1.5); open(sys.argv[1], \"w\").write(\"alive\")', {:?}])\n",
        sentinel.display().to_string()
    );
    if then_spin {
        source.push_str("while True:\n    pass\n");
    }
    source
}

#[cfg(unix)]
#[tokio::test]
async fn timeout_kills_the_whole_group() {
    let Some(python) = python().await else { return };
    let scratch = tempfile::tempdir().unwrap();
    let markers = tempfile::tempdir().unwrap();
    let sentinel = markers.path().join("grandchild-survived");

    let result = sandbox(python, 1.0, &scratch)
        .run(&spawner(&sentinel, true))
        .await;
    assert!(result.timed_out(), "{:?}", result);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!sentinel.exists(), "grandchild outlived the deadline");
    assert_no_leftovers(&scratch);
}

#[cfg(unix)]
#[tokio::test]
async fn descendants_are_swept_after_normal_exit() {
    let Some(python) = python().await else { return };
    let scratch = tempfile::tempdir().unwrap();
    let markers = tempfile::tempdir().unwrap();
    let sentinel = markers.path().join("orphan-survived");

    let result = sandbox(python, 5.0, &scratch)
        .run(&spawner(&sentinel, false))
        .await;
    assert!(result.is_ok(), "{:?}", result);

    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(!sentinel.exists(), "orphaned grandchild kept running");
    assert_no_leftovers(&scratch);
}

#[tokio::test]
async fn missing_interpreter_fails_and_cleans_up() {
    let scratch = tempfile::tempdir().unwrap();

    let result = sandbox(PathBuf::from("/nonexistent/python3"), 5.0, &scratch)
        .run("print('unreachable')\n")
        .await;
    match result {
        ExecutionResult::Failed { error } => assert!(error.contains("failed to launch"), "{}", error),
        other => panic!("expected failure, got {:?}", other),
    }
    assert_no_leftovers(&scratch);
}

#[tokio::test]
async fn concurrent_runs_do_not_interfere() {
    let Some(python) = python().await else { return };
    let scratch = tempfile::tempdir().unwrap();
    let runner = sandbox(python, 10.0, &scratch);

    let handles: Vec<_> = (0..6)
        .map(|id| {
            let runner = runner.clone();
            tokio::spawn(async move {
                let source = format!("import sys\nprint({})\nsys.exit({})\n", id, id);
                (id, runner.run(&source).await)
            })
        })
        .collect();

    for handle in handles {
        let (id, result) = handle.await.unwrap();
        match result {
            ExecutionResult::Completed {
                stdout, exit_code, ..
            } => {
                assert_eq!(stdout.trim_end(), id.to_string());
                assert_eq!(exit_code, id);
            }
            other => panic!("run {} did not complete: {:?}", id, other),
        }
    }
    assert_no_leftovers(&scratch);
}

#[tokio::test]
async fn convenience_entry_point_uses_defaults() {
    if Interpreter::probe(codefix::sandbox::interpreter::default_program())
        .await
        .is_err()
    {
        eprintln!("skipping: default interpreter name is not on PATH");
        return;
    }

    let result = run_in_sandbox("print('ok')\n", 5.0).await;
    assert!(result.is_ok(), "{:?}", result);

    let result = run_in_sandbox("print('ok')\n", 0.0).await;
    assert!(matches!(result, ExecutionResult::Failed { .. }));
}
