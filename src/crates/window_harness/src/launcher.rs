use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::config::{PeerRole, ScenarioConfig};
use crate::error::{HarnessError, HarnessResult};

/// Filler byte fed to the sender under test.
pub const FILLER_BYTE: u8 = b'x';

/// Where a peer's stderr goes.
#[derive(Debug)]
pub enum PeerOutput {
    /// Redirect into the captured log.
    Capture(File),
    Discard,
}

impl PeerOutput {
    fn into_stdio(self) -> Stdio {
        match self {
            PeerOutput::Capture(file) => Stdio::from(file),
            PeerOutput::Discard => Stdio::null(),
        }
    }

    fn describe(&self) -> &'static str {
        match self {
            PeerOutput::Capture(_) => "captured log",
            PeerOutput::Discard => "discarded",
        }
    }
}

/// Build the peer argument list: `-w <window> <local_port> <host>:<remote_port>`.
pub fn peer_args(window_size: u32, local_port: u16, host: &str, remote_port: u16) -> Vec<String> {
    vec![
        "-w".to_string(),
        window_size.to_string(),
        local_port.to_string(),
        format!("{host}:{remote_port}"),
    ]
}

/// Starts peer executables for the roles described by a [`ScenarioConfig`].
pub struct PeerLauncher<'a> {
    config: &'a ScenarioConfig,
}

impl<'a> PeerLauncher<'a> {
    pub fn new(config: &'a ScenarioConfig) -> Self {
        Self { config }
    }

    /// Start the peer for `role` and return without waiting for it.
    ///
    /// The sender under test gets one window of filler bytes on stdin, fed
    /// from a background thread so a peer that stops reading cannot stall the
    /// caller.
    pub fn launch(&self, role: PeerRole, output: PeerOutput) -> HarnessResult<PeerProcess> {
        let config = self.config;
        let executable = config.executable(role).to_path_buf();
        let (local_port, remote_port) = config.ports(role);

        let mut cmd = Command::new(&executable);
        cmd.args(peer_args(
            config.window_size,
            local_port,
            &config.host,
            remote_port,
        ));
        cmd.envs(&config.env);
        cmd.stdout(Stdio::null());
        cmd.stdin(match role {
            PeerRole::SenderUnderTest => Stdio::piped(),
            PeerRole::SilentReceiver => Stdio::null(),
        });
        let destination = output.describe();
        cmd.stderr(output.into_stdio());
        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            // Own process group, so termination also reaches anything the peer spawns.
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .map_err(|err| HarnessError::peer_start(role, &executable, err))?;

        tracing::info!(
            %role,
            pid = child.id(),
            executable = %executable.display(),
            local_port,
            remote_port,
            stderr = destination,
            "peer started"
        );

        let stdin = child.stdin.take();
        let mut peer = PeerProcess {
            role,
            executable,
            local_port,
            remote_port,
            output: destination,
            child,
            feeder: None,
            status: None,
        };
        // On error the handle is dropped, which kills the peer.
        if let Some(stdin) = stdin {
            peer.feeder = Some(spawn_payload_feeder(stdin, config.payload_len())?);
        }
        Ok(peer)
    }
}

fn spawn_payload_feeder(
    mut stdin: ChildStdin,
    len: usize,
) -> HarnessResult<thread::JoinHandle<()>> {
    let handle = thread::Builder::new()
        .name("payload-feeder".to_string())
        .spawn(move || {
            let payload = vec![FILLER_BYTE; len];
            match stdin.write_all(&payload).and_then(|()| stdin.flush()) {
                Ok(()) => tracing::debug!(bytes = len, "payload delivered"),
                Err(err) if err.kind() == io::ErrorKind::BrokenPipe => {
                    tracing::debug!("sender closed stdin before reading the whole payload")
                }
                Err(err) => tracing::warn!(error = %err, "failed to feed payload"),
            }
            // Dropping stdin signals EOF.
        })?;
    Ok(handle)
}

/// A launched peer. Terminate it with [`PeerProcess::terminate`]; dropping an
/// unterminated handle kills it.
///
/// The peer is only ever reaped after its process group has been sent
/// SIGKILL, so the group id cannot be recycled before the group is signalled.
pub struct PeerProcess {
    role: PeerRole,
    executable: PathBuf,
    local_port: u16,
    remote_port: u16,
    output: &'static str,
    child: Child,
    feeder: Option<thread::JoinHandle<()>>,
    status: Option<ExitStatus>,
}

impl PeerProcess {
    pub fn role(&self) -> PeerRole {
        self.role
    }

    pub fn executable(&self) -> &Path {
        &self.executable
    }

    pub fn id(&self) -> u32 {
        self.child.id()
    }

    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    pub fn remote_port(&self) -> u16 {
        self.remote_port
    }

    /// Where this peer's stderr was sent.
    pub fn output(&self) -> &'static str {
        self.output
    }

    /// True once the peer has exited, without reaping it.
    pub fn has_exited(&mut self) -> HarnessResult<bool> {
        if self.status.is_some() {
            return Ok(true);
        }
        Ok(exited_unreaped(&mut self.child)?)
    }

    /// Exit status if the peer has exited. Reaping also kills whatever is
    /// left in its process group.
    pub fn try_status(&mut self) -> HarnessResult<Option<ExitStatus>> {
        if self.has_exited()? {
            return Ok(Some(self.reap_group()?));
        }
        Ok(None)
    }

    /// Stop the peer and everything in its process group.
    ///
    /// SIGTERM first, SIGKILL after `grace`. Always reaps the child.
    pub fn terminate(&mut self, grace: Duration) -> HarnessResult<ExitStatus> {
        if !self.has_exited()? {
            signal_group(self.child.id(), Signal::Term);
            let start = Instant::now();
            while start.elapsed() < grace {
                if self.has_exited()? {
                    tracing::debug!(role = %self.role, "peer exited after SIGTERM");
                    break;
                }
                thread::sleep(Duration::from_millis(10));
            }
        }
        self.reap_group()
    }

    fn reap_group(&mut self) -> HarnessResult<ExitStatus> {
        if let Some(status) = self.status {
            return Ok(status);
        }
        // Descendants may outlive the leader.
        signal_group(self.child.id(), Signal::Kill);
        let _ = self.child.kill();
        let status = self.child.wait()?;
        self.status = Some(status);
        self.join_feeder();
        Ok(status)
    }

    fn join_feeder(&mut self) {
        if let Some(handle) = self.feeder.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for PeerProcess {
    fn drop(&mut self) {
        let _ = self.reap_group();
        self.join_feeder();
    }
}

/// Poll for exit while leaving the child waitable.
#[cfg(target_os = "linux")]
fn exited_unreaped(child: &mut Child) -> io::Result<bool> {
    // SAFETY: siginfo_t is plain data and zero is a valid bit pattern.
    let mut info: libc::siginfo_t = unsafe { std::mem::zeroed() };
    // SAFETY: WNOWAIT leaves the child's state untouched, so the later
    // `Child::wait` still reaps it.
    let rc = unsafe {
        libc::waitid(
            libc::P_PID,
            child.id() as libc::id_t,
            &mut info,
            libc::WEXITED | libc::WNOHANG | libc::WNOWAIT,
        )
    };
    if rc == -1 {
        return Err(io::Error::last_os_error());
    }
    // SAFETY: waitid filled `info`; si_pid stays 0 when nothing has exited.
    Ok(unsafe { info.si_pid() } != 0)
}

/// Without `waitid` the child is reaped here; the group signal that follows
/// is best effort.
#[cfg(not(target_os = "linux"))]
fn exited_unreaped(child: &mut Child) -> io::Result<bool> {
    Ok(child.try_wait()?.is_some())
}

#[derive(Debug, Clone, Copy)]
enum Signal {
    Term,
    Kill,
}

#[cfg(unix)]
fn signal_group(pgid: u32, signal: Signal) {
    let signo = match signal {
        Signal::Term => libc::SIGTERM,
        Signal::Kill => libc::SIGKILL,
    };
    // SAFETY: a negative pid addresses the process group created for this
    // child at spawn time; if the group is gone kill returns ESRCH.
    unsafe {
        libc::kill(-(pgid as libc::pid_t), signo);
    }
}

#[cfg(not(unix))]
fn signal_group(_pgid: u32, _signal: Signal) {}
