use std::thread;

use crate::capture::LogCapture;
use crate::config::{PeerRole, ScenarioConfig};
use crate::error::HarnessResult;
use crate::launcher::{PeerLauncher, PeerOutput, PeerProcess};
use crate::sweep;
use crate::verify::{self, Verdict};

/// Runs the silent-receiver scenario once.
///
/// Sequencing is purely time based: the harness has no view into protocol
/// state, so it starts the receiver, waits the startup stagger, starts the
/// sender, waits the observation window and then stops everything.
pub struct Scenario {
    config: ScenarioConfig,
}

impl Scenario {
    pub fn new(config: ScenarioConfig) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Run the scenario and verify the receiver's log.
    ///
    /// Peers are always terminated and the captured log is always removed,
    /// whether launching, parsing or verification succeeded or not.
    pub fn run(&self) -> HarnessResult<Verdict> {
        let capture = LogCapture::create_in(&self.config.working_directory)?;
        tracing::debug!(path = %capture.path().display(), "captured log created");

        let mut peers = Vec::with_capacity(2);
        let launched = self.launch_and_observe(&capture, &mut peers);
        self.stop_peers(&mut peers);
        self.sweep();

        let result = launched
            .and_then(|()| capture.read_to_string())
            .and_then(|log| verify::verify(&log, self.config.window_size));

        let removed = capture.remove();
        let verdict = result?;
        removed?;
        Ok(verdict)
    }

    fn launch_and_observe(
        &self,
        capture: &LogCapture,
        peers: &mut Vec<PeerProcess>,
    ) -> HarnessResult<()> {
        let launcher = PeerLauncher::new(&self.config);

        let receiver = launcher.launch(
            PeerRole::SilentReceiver,
            PeerOutput::Capture(capture.writer()?),
        )?;
        peers.push(receiver);

        thread::sleep(self.config.startup_stagger);

        let sender = launcher.launch(PeerRole::SenderUnderTest, PeerOutput::Discard)?;
        peers.push(sender);

        tracing::info!(
            window_size = self.config.window_size,
            observation_ms = self.config.observation.as_millis() as u64,
            "observing peers"
        );
        thread::sleep(self.config.observation);
        Ok(())
    }

    fn stop_peers(&self, peers: &mut Vec<PeerProcess>) {
        for mut peer in peers.drain(..) {
            let exited_early = match peer.has_exited() {
                Ok(exited) => exited,
                Err(err) => {
                    tracing::warn!(role = %peer.role(), error = %err, "failed to poll peer");
                    false
                }
            };

            match peer.terminate(self.config.termination_grace) {
                Ok(status) if exited_early => tracing::warn!(
                    role = %peer.role(),
                    %status,
                    "peer exited before the observation window closed"
                ),
                Ok(status) => tracing::debug!(role = %peer.role(), %status, "peer stopped"),
                Err(err) => tracing::warn!(role = %peer.role(), error = %err, "failed to stop peer"),
            }
        }
    }

    fn sweep(&self) {
        if !self.config.sweep_by_name {
            return;
        }
        let executables = [self.config.sender.as_path(), self.config.receiver.as_path()];
        let killed = sweep::sweep(&executables);
        if !killed.is_empty() {
            tracing::info!(count = killed.len(), "name sweep killed stray processes");
        }
    }
}
