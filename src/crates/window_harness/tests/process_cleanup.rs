#![cfg(unix)]

use std::ffi::OsStr;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use serial_test::serial;
use sysinfo::{Pid, ProcessStatus, ProcessesToUpdate, System};
use tempfile::tempdir;
use window_harness::{sweep, PeerLauncher, PeerOutput, PeerRole, ScenarioConfig};

const PID_FILE_ENV: &str = "GRANDCHILD_PID_FILE";

fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).expect("write script");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod script");
    path
}

fn is_running(pid: u32) -> bool {
    let pid = Pid::from_u32(pid);
    let mut sys = System::new();
    sys.refresh_processes(ProcessesToUpdate::Some(&[pid]), true);
    sys.process(pid).is_some_and(|process| {
        !matches!(
            process.status(),
            ProcessStatus::Zombie | ProcessStatus::Dead
        )
    })
}

fn wait_until_gone(pid: u32) -> bool {
    let deadline = Instant::now() + Duration::from_secs(3);
    while Instant::now() < deadline {
        if !is_running(pid) {
            return true;
        }
        thread::sleep(Duration::from_millis(20));
    }
    false
}

fn read_pid_file(path: &Path) -> u32 {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        if let Some(pid) = fs::read_to_string(path)
            .ok()
            .and_then(|text| text.trim().parse().ok())
        {
            return pid;
        }
        assert!(Instant::now() < deadline, "peer never wrote {}", path.display());
        thread::sleep(Duration::from_millis(20));
    }
}

/// A peer that backgrounds a long-lived child and exits straight away.
fn orphaning_peer(dir: &Path) -> (ScenarioConfig, PathBuf) {
    let script = write_script(
        dir,
        "orphaning_peer.sh",
        &format!("sleep 30 &\necho $! > \"${PID_FILE_ENV}\""),
    );
    let pid_file = dir.join("grandchild.pid");
    let config = ScenarioConfig::new(1, "unused_sender", script)
        .with_env(PID_FILE_ENV, pid_file.display().to_string());
    (config, pid_file)
}

#[test]
#[serial]
fn sweep_kills_stray_script_peer() {
    let dir = tempdir().expect("tempdir");
    let script = write_script(dir.path(), "stray_peer.sh", "read _line");

    let mut stray = Command::new(&script)
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .spawn()
        .expect("spawn stray peer");
    assert!(sweep::matching_processes(OsStr::new("stray_peer.sh")).contains(&stray.id()));

    let killed = sweep::sweep(&[script.as_path()]);

    assert!(killed.contains(&stray.id()), "sweep missed the script: {killed:?}");
    let status = stray.wait().expect("reap stray peer");
    assert!(!status.success());
    assert!(sweep::matching_processes(OsStr::new("stray_peer.sh")).is_empty());
}

#[test]
#[serial]
fn sweep_never_targets_the_harness_itself() {
    let own = std::env::current_exe().expect("current exe");
    let name = own.file_name().expect("exe name");
    assert!(!sweep::matching_processes(name).contains(&std::process::id()));
}

#[test]
#[serial]
fn terminate_reaches_descendants_of_an_exited_peer() {
    let dir = tempdir().expect("tempdir");
    let (config, pid_file) = orphaning_peer(dir.path());

    let mut peer = PeerLauncher::new(&config)
        .launch(PeerRole::SilentReceiver, PeerOutput::Discard)
        .expect("peer should launch");
    let grandchild = read_pid_file(&pid_file);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !peer.has_exited().expect("poll peer") {
        assert!(Instant::now() < deadline, "peer script never exited");
        thread::sleep(Duration::from_millis(20));
    }
    assert!(is_running(grandchild));

    let status = peer
        .terminate(Duration::from_millis(100))
        .expect("terminate peer");
    assert!(status.success());
    assert!(wait_until_gone(grandchild), "grandchild {grandchild} survived");
}

#[test]
#[serial]
fn dropping_an_exited_peer_still_kills_its_group() {
    let dir = tempdir().expect("tempdir");
    let (config, pid_file) = orphaning_peer(dir.path());

    let mut peer = PeerLauncher::new(&config)
        .launch(PeerRole::SilentReceiver, PeerOutput::Discard)
        .expect("peer should launch");
    let grandchild = read_pid_file(&pid_file);

    let deadline = Instant::now() + Duration::from_secs(5);
    while !peer.has_exited().expect("poll peer") {
        assert!(Instant::now() < deadline, "peer script never exited");
        thread::sleep(Duration::from_millis(20));
    }

    drop(peer);
    assert!(wait_until_gone(grandchild), "grandchild {grandchild} survived");
}
