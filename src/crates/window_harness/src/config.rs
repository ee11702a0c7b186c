use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{HarnessError, HarnessResult};

/// Default port the silent receiver binds to.
pub const DEFAULT_RECEIVER_PORT: u16 = 10000;
/// Default port the sender under test binds to.
pub const DEFAULT_SENDER_PORT: u16 = 20000;
/// Default delay between starting the receiver and starting the sender.
pub const DEFAULT_STARTUP_STAGGER: Duration = Duration::from_secs(2);
/// Default time both peers run together before forced termination.
pub const DEFAULT_OBSERVATION: Duration = Duration::from_secs(3);
/// Default time a peer gets to exit after SIGTERM before it is killed.
pub const DEFAULT_TERMINATION_GRACE: Duration = Duration::from_millis(200);
/// Payload bytes per packet the sender is expected to segment its input into.
pub const PACKET_PAYLOAD_BYTES: usize = 512;

/// Role a launched peer plays in the scenario.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// Accepts and logs packets, never acknowledges.
    SilentReceiver,
    /// Implementation being validated; fed the filler payload on stdin.
    SenderUnderTest,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PeerRole::SilentReceiver => f.write_str("silent receiver"),
            PeerRole::SenderUnderTest => f.write_str("sender under test"),
        }
    }
}

/// Everything a single scenario run needs. Built once, never mutated by the run.
#[derive(Debug, Clone)]
pub struct ScenarioConfig {
    /// Packets the sender must emit before it needs any acknowledgment.
    pub window_size: u32,
    /// Executable implementing the sender under test.
    pub sender: PathBuf,
    /// Executable implementing the silent receiver.
    pub receiver: PathBuf,
    /// Host both peers use to address each other.
    pub host: String,
    /// Local port of the silent receiver.
    pub receiver_port: u16,
    /// Local port of the sender under test.
    pub sender_port: u16,
    /// Delay between launching the receiver and launching the sender.
    pub startup_stagger: Duration,
    /// How long both peers run before they are terminated.
    pub observation: Duration,
    /// How long a peer may take to exit after SIGTERM before it is killed.
    pub termination_grace: Duration,
    /// Directory the captured log is created in.
    pub working_directory: PathBuf,
    /// Extra environment variables applied to both peers.
    pub env: BTreeMap<String, String>,
    /// Kill every process named like either executable once the peers are stopped.
    ///
    /// This can terminate unrelated processes that share a name with a peer.
    pub sweep_by_name: bool,
}

impl ScenarioConfig {
    /// Create a config with the default ports and timings.
    pub fn new(
        window_size: u32,
        sender: impl Into<PathBuf>,
        receiver: impl Into<PathBuf>,
    ) -> Self {
        Self {
            window_size,
            sender: sender.into(),
            receiver: receiver.into(),
            host: "localhost".to_string(),
            receiver_port: DEFAULT_RECEIVER_PORT,
            sender_port: DEFAULT_SENDER_PORT,
            startup_stagger: DEFAULT_STARTUP_STAGGER,
            observation: DEFAULT_OBSERVATION,
            termination_grace: DEFAULT_TERMINATION_GRACE,
            working_directory: PathBuf::from("."),
            env: BTreeMap::new(),
            sweep_by_name: true,
        }
    }

    /// Override the host peers use to reach each other.
    pub fn with_host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Override the receiver and sender ports.
    pub fn with_ports(mut self, receiver_port: u16, sender_port: u16) -> Self {
        self.receiver_port = receiver_port;
        self.sender_port = sender_port;
        self
    }

    /// Override the receiver-to-sender startup delay.
    pub fn with_startup_stagger(mut self, stagger: Duration) -> Self {
        self.startup_stagger = stagger;
        self
    }

    /// Override the observation window.
    pub fn with_observation(mut self, observation: Duration) -> Self {
        self.observation = observation;
        self
    }

    /// Override the SIGTERM grace period.
    pub fn with_termination_grace(mut self, grace: Duration) -> Self {
        self.termination_grace = grace;
        self
    }

    /// Create the captured log in `dir` instead of the current directory.
    pub fn with_working_directory(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_directory = dir.into();
        self
    }

    /// Add an environment variable override for both peers.
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Enable or disable the name-based process sweep.
    pub fn with_sweep_by_name(mut self, enabled: bool) -> Self {
        self.sweep_by_name = enabled;
        self
    }

    /// Executable for a role.
    pub fn executable(&self, role: PeerRole) -> &Path {
        match role {
            PeerRole::SilentReceiver => &self.receiver,
            PeerRole::SenderUnderTest => &self.sender,
        }
    }

    /// `(local, remote)` ports for a role.
    pub fn ports(&self, role: PeerRole) -> (u16, u16) {
        match role {
            PeerRole::SilentReceiver => (self.receiver_port, self.sender_port),
            PeerRole::SenderUnderTest => (self.sender_port, self.receiver_port),
        }
    }

    /// Number of filler bytes fed to the sender: exactly one window of packets.
    pub fn payload_len(&self) -> usize {
        PACKET_PAYLOAD_BYTES * self.window_size as usize
    }

    pub(crate) fn validate(&self) -> HarnessResult<()> {
        if self.window_size == 0 {
            return Err(HarnessError::invalid_config("window size must be positive"));
        }
        if self.receiver_port == self.sender_port {
            return Err(HarnessError::invalid_config(format!(
                "receiver and sender cannot share port {}",
                self.receiver_port
            )));
        }
        if self.host.is_empty() {
            return Err(HarnessError::invalid_config("host must not be empty"));
        }
        Ok(())
    }
}
