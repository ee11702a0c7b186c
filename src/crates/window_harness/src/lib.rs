//! Conformance harness for sliding-window senders facing a receiver that never
//! acknowledges anything.
//!
//! A silent receiver is started first, the sender under test a little later
//! with exactly one window of payload on stdin. After a fixed observation
//! window both are killed and the receiver's stderr log is checked for every
//! sequence number in `1..=window_size`.
//!
//! Typical usage:
//! ```no_run
//! use std::time::Duration;
//! use window_harness::{Scenario, ScenarioConfig};
//!
//! let config = ScenarioConfig::new(5, "./reliable", "./reliable_no_answer")
//!     .with_observation(Duration::from_secs(3));
//! let verdict = Scenario::new(config)
//!     .and_then(|scenario| scenario.run())
//!     .expect("scenario should run");
//! println!("{verdict}");
//! ```

mod capture;
mod config;
mod error;
mod launcher;
mod scenario;
pub mod sweep;
pub mod verify;

pub use capture::LogCapture;
pub use config::{
    PeerRole, ScenarioConfig, DEFAULT_OBSERVATION, DEFAULT_RECEIVER_PORT, DEFAULT_SENDER_PORT,
    DEFAULT_STARTUP_STAGGER, DEFAULT_TERMINATION_GRACE, PACKET_PAYLOAD_BYTES,
};
pub use error::{HarnessError, HarnessResult};
pub use launcher::{peer_args, PeerLauncher, PeerOutput, PeerProcess, FILLER_BYTE};
pub use scenario::Scenario;
pub use verify::{outcome_line, CountMismatch, Verdict};
