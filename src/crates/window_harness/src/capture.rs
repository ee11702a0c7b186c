use std::fs::{self, File};
use std::path::Path;

use tempfile::{Builder, NamedTempFile};

use crate::error::HarnessResult;

const LOG_PREFIX: &str = "no_answer_log";
const LOG_SUFFIX: &str = ".tmp";

/// File that the silent receiver's stderr is redirected into.
///
/// The file is created empty and is removed when the capture is finished or
/// dropped, so nothing outlives a single run.
pub struct LogCapture {
    file: NamedTempFile,
}

impl LogCapture {
    /// Create a fresh, empty log file inside `dir`.
    pub fn create_in(dir: impl AsRef<Path>) -> HarnessResult<Self> {
        let file = Builder::new()
            .prefix(LOG_PREFIX)
            .suffix(LOG_SUFFIX)
            .tempfile_in(dir)?;
        Ok(Self { file })
    }

    /// Location of the log file.
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    /// A new write handle suitable for a child's stderr.
    pub fn writer(&self) -> HarnessResult<File> {
        Ok(self.file.as_file().try_clone()?)
    }

    /// Read everything written so far.
    pub fn read_to_string(&self) -> HarnessResult<String> {
        let bytes = fs::read(self.file.path())?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Delete the log file.
    pub fn remove(self) -> HarnessResult<()> {
        self.file.close()?;
        Ok(())
    }
}
