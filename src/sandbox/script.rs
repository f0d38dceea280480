//! Temporary program file whose removal is tied to a guard value

use crate::error::{SandboxError, SandboxResult};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

const SCRIPT_PREFIX: &str = "codefix-";
const SCRIPT_SUFFIX: &str = ".py";

/// A uniquely named `.py` file holding the code under test.
///
/// The file is deleted exactly once: by [`ScriptFile::release`] on the normal
/// path, or by `Drop` when the run is abandoned (panic, cancelled future).
/// Deletion failures are logged and otherwise ignored.
pub struct ScriptFile {
    file: Option<NamedTempFile>,
    path: PathBuf,
}

impl ScriptFile {
    /// Atomically create a fresh file in `dir` (system temp dir when `None`)
    /// and write `source` into it
    pub fn create(source: &str, dir: Option<&Path>) -> SandboxResult<Self> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRIPT_PREFIX).suffix(SCRIPT_SUFFIX);

        let mut file = match dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(SandboxError::ScriptFile)?;

        file.write_all(source.as_bytes())
            .and_then(|_| file.flush())
            .map_err(SandboxError::ScriptFile)?;

        let path = file.path().to_path_buf();
        debug!(path = %path.display(), bytes = source.len(), "script file created");

        Ok(Self {
            file: Some(file),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the file now. Later calls and the eventual drop are no-ops.
    pub fn release(&mut self) {
        let Some(file) = self.file.take() else {
            return;
        };
        match file.close() {
            Ok(()) => debug!(path = %self.path.display(), "script file removed"),
            Err(e) => warn!(
                path = %self.path.display(),
                "could not remove script file: {}", e
            ),
        }
    }
}

impl Drop for ScriptFile {
    fn drop(&mut self) {
        self.release();
    }
}
