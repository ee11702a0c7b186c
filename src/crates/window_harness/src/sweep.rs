//! Best-effort cleanup of stray peer processes by executable name.
//!
//! Process-group termination in [`crate::launcher`] reaches everything a peer
//! spawned while it stayed in its group. The sweep catches whatever escaped
//! (re-grouped descendants, leftovers from earlier runs). It matches on
//! executable name alone, so it also kills unrelated processes that happen to
//! share a name with a peer.

use std::collections::BTreeSet;
use std::ffi::OsStr;
use std::path::Path;

use sysinfo::{
    Pid, Process, ProcessRefreshKind, ProcessStatus, ProcessesToUpdate, Signal, System,
};

/// Name a process would be matched by: the final path component.
pub fn process_name(executable: &Path) -> Option<&OsStr> {
    executable.file_name()
}

fn process_table() -> System {
    let mut sys = System::new();
    sys.refresh_processes_specifics(
        ProcessesToUpdate::All,
        true,
        ProcessRefreshKind::everything(),
    );
    sys
}

/// Live processes only; threads are listed alongside processes on Linux.
fn is_live_process(process: &Process) -> bool {
    process.thread_kind().is_none()
        && !matches!(process.status(), ProcessStatus::Zombie | ProcessStatus::Dead)
}

/// The kernel truncates process names (15 bytes on Linux), so long names are
/// also compared against the executable and `argv[0]`.
fn named_by_path(process: &Process, name: &OsStr) -> bool {
    process.exe().and_then(Path::file_name) == Some(name)
        || process
            .cmd()
            .first()
            .and_then(|arg0| Path::new(arg0).file_name())
            == Some(name)
}

fn matching_pids(sys: &System, name: &OsStr) -> BTreeSet<Pid> {
    let own = Pid::from_u32(std::process::id());
    sys.processes_by_exact_name(name)
        .chain(
            sys.processes()
                .values()
                .filter(|process| named_by_path(process, name)),
        )
        .filter(|process| process.pid() != own && is_live_process(process))
        .map(Process::pid)
        .collect()
}

/// Pids of live processes named `name`, excluding the current process.
pub fn matching_processes(name: &OsStr) -> Vec<u32> {
    let sys = process_table();
    matching_pids(&sys, name)
        .into_iter()
        .map(Pid::as_u32)
        .collect()
}

/// Forcefully kill every process named after one of `executables`.
///
/// Returns the pids that were signalled.
pub fn sweep(executables: &[&Path]) -> Vec<u32> {
    let sys = process_table();
    let mut killed = Vec::new();
    for name in executables.iter().filter_map(|path| process_name(path)) {
        for pid in matching_pids(&sys, name) {
            let Some(process) = sys.process(pid) else {
                continue;
            };
            if process.kill_with(Signal::Kill) == Some(true) {
                tracing::warn!(
                    pid = pid.as_u32(),
                    name = %name.to_string_lossy(),
                    "swept stray peer process"
                );
                killed.push(pid.as_u32());
            }
        }
    }
    killed
}
