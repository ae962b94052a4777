//! Verifying zone files with external tools.
//!
//! A [`Check`] describes how to run one external verification program
//! against a zone file. A [`Verifier`] runs a list of checks and reports a
//! [`CheckResult`] for each of them.
//!
//! A failing check never aborts anything. It is recorded as a
//! [`DefectKind::VerificationFailure`] in the test context and a snapshot
//! of the failing zone file is kept next to it for later inspection.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::process::Command;
use tracing::{debug, warn};

use crate::context::{DefectKind, TestContext, SEP};
use crate::zonefile::ZoneFile;

//------------ CheckKind -----------------------------------------------------

/// How a verification program is invoked.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CheckKind {
    /// BIND’s `dnssec-verify -z -o <origin> <file>`.
    DnssecVerify,

    /// `ldns-verify-zone <file>`.
    LdnsVerifyZone,

    /// Any program called as `<program> <args...> <origin> <file>`.
    Custom(Vec<String>),
}

//------------ Check ---------------------------------------------------------

/// A verification program and how to run it.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Check {
    /// The message recorded when the check fails.
    label: String,

    /// The program to run.
    program: PathBuf,

    /// How to run it.
    kind: CheckKind,
}

impl Check {
    /// Creates a check using `dnssec-verify`.
    pub fn dnssec_verify(program: impl Into<PathBuf>) -> Self {
        Check {
            label: "DNSSEC VERIFY".into(),
            program: program.into(),
            kind: CheckKind::DnssecVerify,
        }
    }

    /// Creates a check using `ldns-verify-zone`.
    pub fn ldns_verify_zone(program: impl Into<PathBuf>) -> Self {
        Check {
            label: "LDNS VERIFY".into(),
            program: program.into(),
            kind: CheckKind::LdnsVerifyZone,
        }
    }

    /// Creates a check running an arbitrary program.
    pub fn custom(
        label: impl Into<String>,
        program: impl Into<PathBuf>,
        args: Vec<String>,
    ) -> Self {
        Check {
            label: label.into(),
            program: program.into(),
            kind: CheckKind::Custom(args),
        }
    }

    /// Returns the label of the check.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Returns the program.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Returns how the program is invoked.
    pub fn kind(&self) -> &CheckKind {
        &self.kind
    }

    /// Returns the name the program is logged under.
    fn tool(&self) -> String {
        self.program
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.program.display().to_string())
    }

    fn command(&self, origin: &str, path: &Path) -> Command {
        let mut cmd = Command::new(&self.program);
        match self.kind {
            CheckKind::DnssecVerify => {
                // dnssec-verify insists on a lower case origin.
                cmd.arg("-z")
                    .arg("-o")
                    .arg(origin.to_ascii_lowercase())
                    .arg(path);
            }
            CheckKind::LdnsVerifyZone => {
                cmd.arg(path);
            }
            CheckKind::Custom(ref args) => {
                cmd.args(args).arg(origin).arg(path);
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    /// Picks the diagnostic text from the program output.
    fn diagnostics(&self, passed: bool, stdout: &str, stderr: &str) -> String {
        let text = match self.kind {
            CheckKind::DnssecVerify => stderr.to_string(),
            CheckKind::LdnsVerifyZone if passed => stdout.to_string(),
            CheckKind::LdnsVerifyZone => stderr.to_string(),
            CheckKind::Custom(_) => format!("{}{}", stdout, stderr),
        };
        text.trim().to_string()
    }
}

//------------ CheckResult ---------------------------------------------------

/// The outcome of running one check.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct CheckResult {
    /// The label of the check.
    pub label: String,

    /// Whether the zone passed.
    pub passed: bool,

    /// The exit code, if the program ran and exited normally.
    pub status: Option<i32>,

    /// The diagnostic output.
    pub diagnostics: String,

    /// The snapshot of the zone file kept after a failure.
    pub backup: Option<PathBuf>,
}

//------------ Verifier ------------------------------------------------------

/// Runs a list of checks against zone files.
#[derive(Clone, Debug, Default)]
pub struct Verifier {
    checks: Vec<Check>,
}

impl Verifier {
    /// Creates a verifier for the given checks.
    pub fn new(checks: Vec<Check>) -> Self {
        Verifier { checks }
    }

    /// Returns the checks.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Runs all checks against the zone’s file.
    ///
    /// Failures are recorded in `ctx`; the first one sets the case’s error
    /// message. Each failure also makes a backup copy of the zone file.
    pub async fn verify(
        &self,
        zone: &mut ZoneFile,
        ctx: &mut TestContext,
    ) -> Vec<CheckResult> {
        let path = zone.path();
        ctx.check_log(&format!(
            "DNSSEC VERIFY for {} ({})",
            zone.name(),
            path.display()
        ));

        let mut res = Vec::with_capacity(self.checks.len());
        for check in &self.checks {
            let mut result = run_check(check, zone.name(), &path).await;
            ctx.detail_log(&format!(
                " <{}>\n{}",
                check.tool(),
                result.diagnostics
            ));
            if !result.passed {
                ctx.record_defect(
                    DefectKind::VerificationFailure,
                    &check.label,
                );
                match zone.backup() {
                    Ok(backup) => result.backup = Some(backup),
                    Err(err) => warn!("{}", err),
                }
            }
            res.push(result);
        }
        ctx.detail_log(SEP);
        res
    }
}

async fn run_check(check: &Check, origin: &str, path: &Path) -> CheckResult {
    debug!("running {} on {}", check.program.display(), path.display());
    match check.command(origin, path).output().await {
        Ok(output) => {
            let passed = output.status.success();
            let stdout = String::from_utf8_lossy(&output.stdout);
            let stderr = String::from_utf8_lossy(&output.stderr);
            CheckResult {
                label: check.label.clone(),
                passed,
                status: output.status.code(),
                diagnostics: check.diagnostics(passed, &stdout, &stderr),
                backup: None,
            }
        }
        Err(err) => CheckResult {
            label: check.label.clone(),
            passed: false,
            status: None,
            diagnostics: format!(
                "failed to run {}: {}",
                check.program.display(),
                err
            ),
            backup: None,
        },
    }
}

//============ Testing =======================================================
