//! The state of a running test case.
//!
//! A [`TestContext`] is handed to every component that can detect a test
//! defect. It collects these defects, remembers the message of the first
//! one as the reason the case failed, and writes the case log. Defects
//! never abort a scenario; fatal conditions are returned as errors instead.

use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// The separator written between log sections.
pub const SEP: &str = "------------------------------------";

//------------ DefectKind ----------------------------------------------------

/// The kind of a test defect.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub enum DefectKind {
    /// An external verification tool rejected a zone file.
    VerificationFailure,

    /// Primary and secondary serve different record sets.
    ReplicationMismatch,

    /// A zone file contains an unexpected number of records of a type.
    RecordCount,

    /// Some value differs from what was expected.
    Compare,
}

impl fmt::Display for DefectKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(match self {
            DefectKind::VerificationFailure => "verification failure",
            DefectKind::ReplicationMismatch => "replication mismatch",
            DefectKind::RecordCount => "record count",
            DefectKind::Compare => "comparison",
        })
    }
}

//------------ Defect --------------------------------------------------------

/// A recorded test defect.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Defect {
    pub kind: DefectKind,
    pub message: String,
}

impl fmt::Display for Defect {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

//------------ TestContext ---------------------------------------------------

/// Accumulates the outcome of a test case.
#[derive(Debug)]
pub struct TestContext {
    /// The name of the test case.
    case: String,

    /// The message of the first defect.
    err_msg: Option<String>,

    /// All defects in the order they were recorded.
    defects: Vec<Defect>,

    /// The case log, if one is kept.
    case_log: Option<File>,
}

impl TestContext {
    /// Creates a context that only logs through `tracing`.
    pub fn new(case: impl Into<String>) -> Self {
        TestContext {
            case: case.into(),
            err_msg: None,
            defects: Vec::new(),
            case_log: None,
        }
    }

    /// Creates a context that also appends to a case log file.
    pub fn with_log_file(
        case: impl Into<String>,
        path: impl AsRef<Path>,
    ) -> Result<Self, io::Error> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        let mut res = Self::new(case);
        res.case_log = Some(file);
        Ok(res)
    }

    /// Returns the name of the test case.
    pub fn case(&self) -> &str {
        &self.case
    }

    /// Marks the case as failed.
    ///
    /// Only the first message is kept as the reason.
    pub fn set_err(&mut self, msg: &str) {
        if self.err_msg.is_none() {
            self.err_msg = Some(msg.into());
        }
    }

    /// Records a defect and marks the case as failed.
    pub fn record_defect(&mut self, kind: DefectKind, msg: &str) {
        self.set_err(msg);
        self.defects.push(Defect {
            kind,
            message: msg.into(),
        });
    }

    /// Returns whether the case has failed.
    pub fn has_error(&self) -> bool {
        self.err_msg.is_some()
    }

    /// Returns the reason the case failed.
    pub fn error_message(&self) -> Option<&str> {
        self.err_msg.as_deref()
    }

    /// Returns all defects recorded so far.
    pub fn defects(&self) -> &[Defect] {
        &self.defects
    }

    /// Takes the recorded defects out of the context.
    pub fn take_defects(&mut self) -> Vec<Defect> {
        std::mem::take(&mut self.defects)
    }

    /// Logs a message header.
    pub fn check_log(&mut self, text: &str) {
        info!(case = %self.case, "{}", text);
        let now = OffsetDateTime::now_utc();
        let line = format!(
            "({:02}:{:02}:{:02}) {} ({})\n",
            now.hour(),
            now.minute(),
            now.second(),
            text,
            self.case
        );
        self.write_log(&line);
    }

    /// Logs a message body.
    pub fn detail_log(&mut self, text: &str) {
        debug!(case = %self.case, "{}", text);
        self.write_log(&format!("{}\n", text));
    }

    /// Compares a value against the expected one.
    ///
    /// Returns whether they differ.
    pub fn compare<T: PartialEq + fmt::Debug>(
        &mut self,
        value: &T,
        expected: &T,
        name: &str,
    ) -> bool {
        if value == expected {
            return false;
        }
        let msg = format!("COMPARE '{}'", name);
        self.record_defect(DefectKind::Compare, &msg);
        self.check_log(&format!("ERROR: {}", msg));
        self.detail_log(&format!(
            "  ({:?}) != expected ({:?})",
            value, expected
        ));
        self.detail_log(SEP);
        true
    }

    /// Compares two sections, reporting the items missing on either side.
    ///
    /// Returns whether they differ. The defect is recorded only once, but
    /// every extra item is logged.
    pub fn compare_sections<T: PartialEq + fmt::Display>(
        &mut self,
        first: &[T],
        first_name: &str,
        second: &[T],
        second_name: &str,
        name: &str,
    ) -> bool {
        let mut different = false;
        for (items, others, who) in [
            (first, second, first_name),
            (second, first, second_name),
        ] {
            for item in items {
                if others.contains(item) {
                    continue;
                }
                if !different {
                    different = true;
                    let msg = format!("COMPARE SECTION {}", name);
                    self.record_defect(DefectKind::ReplicationMismatch, &msg);
                    self.check_log(&format!("ERROR: {}", msg));
                }
                self.detail_log(&format!("!Extra rrset {}:", who));
                self.detail_log(&format!("  {}", item));
            }
        }
        if different {
            self.detail_log(SEP);
        }
        different
    }

    fn write_log(&mut self, text: &str) {
        if let Some(file) = self.case_log.as_mut() {
            let res = file
                .write_all(text.as_bytes())
                .and_then(|_| file.flush());
            if let Err(err) = res {
                warn!("failed to write case log: {}", err);
            }
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn first_error_wins() {
        let mut ctx = TestContext::new("case");
        assert!(!ctx.has_error());
        ctx.record_defect(DefectKind::VerificationFailure, "DNSSEC VERIFY");
        ctx.record_defect(DefectKind::VerificationFailure, "LDNS VERIFY");
        assert_eq!(ctx.error_message(), Some("DNSSEC VERIFY"));
        assert_eq!(ctx.defects().len(), 2);
        assert_eq!(ctx.defects()[1].message, "LDNS VERIFY");
    }

    #[test]
    fn compare_values() {
        let mut ctx = TestContext::new("case");
        assert!(!ctx.compare(&1, &1, "one"));
        assert!(!ctx.has_error());
        assert!(ctx.compare(&1, &2, "two"));
        assert_eq!(ctx.error_message(), Some("COMPARE 'two'"));
        assert_eq!(ctx.defects()[0].kind, DefectKind::Compare);
    }

    #[test]
    fn compare_sections_records_once() {
        let mut ctx = TestContext::new("case");
        let first = ["a", "b", "c"];
        let second = ["b", "d"];
        assert!(ctx.compare_sections(&first, "p", &second, "s", "AXFR"));
        assert_eq!(ctx.defects().len(), 1);
        assert_eq!(ctx.error_message(), Some("COMPARE SECTION AXFR"));

        let mut ctx = TestContext::new("case");
        assert!(!ctx.compare_sections(&first, "p", &first, "s", "AXFR"));
        assert!(ctx.defects().is_empty());
    }

    #[test]
    fn case_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("case.log");
        let mut ctx = TestContext::with_log_file("zones", &path).unwrap();
        ctx.check_log("DNSSEC VERIFY for example.com.");
        ctx.detail_log(SEP);
        let text = std::fs::read_to_string(&path).unwrap();
        let mut lines = text.lines();
        let header = lines.next().unwrap();
        assert!(header.starts_with('('));
        assert!(header.ends_with(") DNSSEC VERIFY for example.com. (zones)"));
        assert_eq!(lines.next(), Some(SEP));
    }
}
