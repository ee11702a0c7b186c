//! Turns the silent receiver's log into a [`Verdict`].
//!
//! A log line discloses a sequence number when it contains the word
//! [`SEQUENCE_FIELD`] followed by `=`; the token after the `=` is read as
//! hexadecimal. Lines without the word are ignored. A `seq` word that is not
//! followed by a parseable value is an error, never a skipped line.

use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

use crate::error::{HarnessError, HarnessResult};

/// Field name that introduces a sequence number in a receiver log line.
pub const SEQUENCE_FIELD: &str = "seq";

const TOKEN_DELIMITERS: &[char] = &[',', ';', ')', ']', '}'];

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Text following the first standalone `seq` word, so `sequence` or `ackseq`
/// do not count.
fn after_field(line: &str) -> Option<&str> {
    line.match_indices(SEQUENCE_FIELD).find_map(|(idx, field)| {
        let before = line[..idx].chars().next_back();
        let rest = &line[idx + field.len()..];
        let standalone = !before.is_some_and(is_word_char)
            && !rest.chars().next().is_some_and(is_word_char);
        standalone.then_some(rest)
    })
}

/// Extract the sequence number disclosed on a single line, if any.
///
/// Accepts `seq = 1f`, `seq=1f` and any whitespace around the `=`. Returns
/// `Err` with a reason when the line has a `seq` field whose value is missing
/// or not a hexadecimal `u32`.
pub fn parse_line(line: &str) -> Result<Option<u32>, String> {
    let Some(rest) = after_field(line) else {
        return Ok(None);
    };
    let Some(rest) = rest.trim_start().strip_prefix('=') else {
        return Err(format!("{SEQUENCE_FIELD} field without '='"));
    };
    let rest = rest.trim_start();
    let end = rest
        .find(|c: char| c.is_whitespace() || TOKEN_DELIMITERS.contains(&c))
        .unwrap_or(rest.len());
    let token = &rest[..end];
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);

    if digits.is_empty() {
        return Err(format!("no digits after {SEQUENCE_FIELD} ="));
    }
    // from_str_radix accepts a leading sign, which a sequence number never has.
    if !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(format!("{token:?} is not hexadecimal"));
    }
    u32::from_str_radix(digits, 16)
        .map(Some)
        .map_err(|err| format!("{token:?}: {err}"))
}

/// Collect every disclosed sequence number in `log`, collapsing duplicates.
///
/// The first malformed disclosure aborts the scan.
pub fn parse_sequence_numbers(log: &str) -> HarnessResult<BTreeSet<u32>> {
    let mut observed = BTreeSet::new();
    for (idx, line) in log.lines().enumerate() {
        match parse_line(line) {
            Ok(Some(seq)) => {
                observed.insert(seq);
            }
            Ok(None) => {}
            Err(reason) => {
                return Err(HarnessError::LogParse {
                    line_number: idx + 1,
                    line: line.to_string(),
                    reason,
                })
            }
        }
    }
    Ok(observed)
}

/// Parse `log` and compare it against `1..=window_size`.
pub fn verify(log: &str, window_size: u32) -> HarnessResult<Verdict> {
    let observed = parse_sequence_numbers(log)?;
    Ok(Verdict::new(observed, window_size))
}

/// Observed versus expected sequence-number count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CountMismatch {
    pub observed: usize,
    pub expected: usize,
}

/// Outcome of comparing the observed sequence numbers with the expected window.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Verdict {
    window_size: u32,
    observed: BTreeSet<u32>,
    missing: Vec<u32>,
    unexpected: Vec<u32>,
    count_mismatch: Option<CountMismatch>,
}

impl Verdict {
    /// Build a verdict from an already-parsed observed set.
    pub fn new(observed: BTreeSet<u32>, window_size: u32) -> Self {
        let missing = (1..=window_size)
            .filter(|seq| !observed.contains(seq))
            .collect();
        let unexpected = observed
            .iter()
            .copied()
            .filter(|seq| *seq == 0 || *seq > window_size)
            .collect();
        let expected = window_size as usize;
        let count_mismatch = (observed.len() != expected).then_some(CountMismatch {
            observed: observed.len(),
            expected,
        });
        Self {
            window_size,
            observed,
            missing,
            unexpected,
            count_mismatch,
        }
    }

    /// True only if the observed set is exactly `1..=window_size`.
    pub fn passed(&self) -> bool {
        self.missing.is_empty() && self.count_mismatch().is_none()
    }

    pub fn window_size(&self) -> u32 {
        self.window_size
    }

    pub fn observed(&self) -> &BTreeSet<u32> {
        &self.observed
    }

    /// Expected sequence numbers that never showed up in the log, ascending.
    pub fn missing(&self) -> &[u32] {
        &self.missing
    }

    /// Observed sequence numbers outside `1..=window_size`, ascending.
    pub fn unexpected(&self) -> &[u32] {
        &self.unexpected
    }

    pub fn count_mismatch(&self) -> Option<CountMismatch> {
        self.count_mismatch
    }
}

/// Final line of every report.
pub fn outcome_line(passed: bool) -> &'static str {
    if passed {
        "Window test outcome: passed"
    } else {
        "Window test outcome: failure"
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let found: Vec<String> = self.observed.iter().map(u32::to_string).collect();
        writeln!(f, "Sequence numbers found: {{{}}}", found.join(", "))?;
        for seq in &self.missing {
            writeln!(f, "Missing sequence number: {seq}")?;
        }
        for seq in &self.unexpected {
            writeln!(f, "Unexpected sequence number: {seq}")?;
        }
        if let Some(CountMismatch { observed, expected }) = self.count_mismatch() {
            writeln!(
                f,
                "Insufficient or too many sequence numbers ({observed} (observed) vs. {expected} (expected))"
            )?;
        } else if self.passed() {
            writeln!(f, "All sequence numbers are correct.")?;
        }
        write!(f, "{}", outcome_line(self.passed()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn token_stops_at_delimiters() {
        assert_eq!(parse_line("pkt (len = 524, seq = 1f)"), Ok(Some(0x1f)));
        assert_eq!(parse_line("seq = a, ack = 1"), Ok(Some(0xa)));
        assert_eq!(parse_line("seq =3"), Ok(Some(3)));
        assert_eq!(parse_line("seq = 0x10\r"), Ok(Some(16)));
        assert_eq!(parse_line("[seq=7]"), Ok(Some(7)));
        assert_eq!(parse_line("seq\t=\t2"), Ok(Some(2)));
    }

    #[test]
    fn lines_without_marker_are_ignored() {
        assert_eq!(parse_line("listening on port 10000"), Ok(None));
        assert_eq!(parse_line("sequence: 4"), Ok(None));
        assert_eq!(parse_line("ackseq = 4"), Ok(None));
    }

    #[test]
    fn seq_word_without_value_is_an_error() {
        assert!(parse_line("seq 3").is_err());
        assert!(parse_line("dropped seq").is_err());
        assert!(parse_line("seq: 3").is_err());
    }

    #[test]
    fn rejects_signs_and_overflow() {
        assert!(parse_line("seq = +1").is_err());
        assert!(parse_line("seq = 100000000").is_err());
        assert!(parse_line("seq = ").is_err());
    }
}
