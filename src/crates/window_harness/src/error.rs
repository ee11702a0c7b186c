use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::config::PeerRole;

/// Result alias for harness operations.
pub type HarnessResult<T> = Result<T, HarnessError>;

/// Errors that can occur while launching peers or verifying their output.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("failed to start {role} peer {}: {source}", executable.display())]
    PeerStart {
        role: PeerRole,
        executable: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed sequence number on log line {line_number} ({reason}): {line:?}")]
    LogParse {
        line_number: usize,
        line: String,
        reason: String,
    },
    #[error("invalid scenario configuration: {0}")]
    InvalidConfig(String),
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl HarnessError {
    pub(crate) fn peer_start(
        role: PeerRole,
        executable: impl Into<PathBuf>,
        source: io::Error,
    ) -> Self {
        HarnessError::PeerStart {
            role,
            executable: executable.into(),
            source,
        }
    }

    pub(crate) fn invalid_config(message: impl Into<String>) -> Self {
        HarnessError::InvalidConfig(message.into())
    }

    /// True when the error came from starting a peer process.
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, HarnessError::PeerStart { .. })
    }
}
