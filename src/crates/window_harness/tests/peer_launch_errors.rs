use std::io;
use std::path::Path;

use tempfile::tempdir;
use window_harness::{
    peer_args, HarnessError, LogCapture, PeerLauncher, PeerOutput, PeerRole, Scenario,
    ScenarioConfig,
};

#[test]
fn peer_arguments_follow_fixed_order() {
    assert_eq!(
        peer_args(5, 10000, "localhost", 20000),
        vec!["-w", "5", "10000", "localhost:20000"]
    );
}

#[test]
fn roles_get_mirrored_ports() {
    let config = ScenarioConfig::new(3, "reliable", "reliable_no_answer");
    assert_eq!(config.ports(PeerRole::SilentReceiver), (10000, 20000));
    assert_eq!(config.ports(PeerRole::SenderUnderTest), (20000, 10000));
    assert_eq!(config.executable(PeerRole::SenderUnderTest), Path::new("reliable"));
    assert_eq!(config.payload_len(), 3 * 512);
}

#[test]
fn missing_executable_is_a_distinct_launch_error() {
    let config = ScenarioConfig::new(3, "/nonexistent/reliable", "/nonexistent/no_answer");
    let err = PeerLauncher::new(&config)
        .launch(PeerRole::SenderUnderTest, PeerOutput::Discard)
        .err()
        .expect("launch must fail");

    assert!(err.is_launch_failure());
    match &err {
        HarnessError::PeerStart {
            role,
            executable,
            source,
        } => {
            assert_eq!(*role, PeerRole::SenderUnderTest);
            assert_eq!(executable, Path::new("/nonexistent/reliable"));
            assert_eq!(source.kind(), io::ErrorKind::NotFound);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(err.to_string().contains("sender under test"));
}

#[test]
fn invalid_configs_are_rejected_before_running() {
    let zero = ScenarioConfig::new(0, "reliable", "reliable_no_answer");
    assert!(matches!(
        Scenario::new(zero),
        Err(HarnessError::InvalidConfig(_))
    ));

    let shared = ScenarioConfig::new(3, "reliable", "reliable_no_answer").with_ports(9000, 9000);
    assert!(matches!(
        Scenario::new(shared),
        Err(HarnessError::InvalidConfig(_))
    ));
}

#[test]
fn capture_is_fresh_and_removed() {
    use std::io::Write;

    let dir = tempdir().expect("tempdir");
    let capture = LogCapture::create_in(dir.path()).expect("capture");
    let path = capture.path().to_path_buf();
    assert!(path.starts_with(dir.path()));
    assert_eq!(capture.read_to_string().expect("read"), "");

    let mut writer = capture.writer().expect("writer");
    writeln!(writer, "recv data: len = 524, ack = 1, seq = 1").expect("write");
    drop(writer);
    assert!(capture.read_to_string().expect("read").contains("seq = 1"));

    capture.remove().expect("remove");
    assert!(!path.exists());
}

#[test]
fn dropped_capture_leaves_nothing_behind() {
    let dir = tempdir().expect("tempdir");
    let path = {
        let capture = LogCapture::create_in(dir.path()).expect("capture");
        capture.path().to_path_buf()
    };
    assert!(!path.exists());
}
