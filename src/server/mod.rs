//! Controlling name servers.
//!
//! The scenarios never talk DNS themselves. Instead, they drive name
//! servers through the [`ServerControl`] trait which covers the few things
//! needed: asking for the served serial of a zone, having a zone written
//! back to disk, sending a dynamic update, and fetching the zone content
//! via zone transfer.
//!
//! There are implementations for [Knot DNS][knot::Knot] and
//! [BIND][bind::Bind] that use the command line tools shipped with these
//! servers. Both of them also know how to write a configuration file for
//! their server, which is how zones get [linked][link] between a primary and
//! a secondary. Starting and stopping the daemons is left to the caller.

pub use self::bind::Bind;
pub use self::knot::Knot;

pub mod bind;
pub mod knot;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::{error, fmt, io};

use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::{debug, trace};

use crate::base::Serial;
use crate::config::ConfigError;
use crate::update::Update;
use crate::zonefile::{FormatError, RecordSet, ZoneFile};

//------------ ServerControl -------------------------------------------------

/// Control over a running name server.
#[allow(async_fn_in_trait)]
pub trait ServerControl {
    /// Returns a name for the server used in logging.
    fn name(&self) -> &str;

    /// Returns the address the server answers queries on.
    fn addr(&self) -> SocketAddr;

    /// Returns the directory the server keeps its zone files in.
    fn zone_dir(&self) -> &Path;

    /// Adds a zone to the server’s configuration.
    ///
    /// This only affects configuration written afterwards.
    fn add_zone(&mut self, zone: ZoneFile, role: ZoneRole);

    /// Returns the handle for a zone’s file.
    fn zone_file(&mut self, zone: &str) -> Option<&mut ZoneFile>;

    /// Returns the serial the server currently serves for a zone.
    ///
    /// Returns `Ok(None)` if the server doesn’t answer authoritatively for
    /// the zone yet.
    async fn zone_serial(
        &self,
        zone: &str,
    ) -> Result<Option<Serial>, ServerError>;

    /// Writes a zone or all zones to disk.
    ///
    /// If `wait` is true, only returns once the files have been written.
    async fn flush(
        &self,
        zone: Option<&str>,
        wait: bool,
    ) -> Result<(), ServerError>;

    /// Sends a dynamic update.
    async fn update(&self, update: &Update) -> Result<(), ServerError>;

    /// Fetches the complete content of a zone via AXFR.
    async fn transfer(&self, zone: &str) -> Result<RecordSet, ServerError>;
}

//------------ ZoneRole ------------------------------------------------------

/// The part a server plays for a zone.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ZoneRole {
    /// The server loads the zone from its file.
    Primary {
        /// Servers to notify of changes.
        notify: Vec<SocketAddr>,

        /// Whether dynamic updates are accepted.
        ddns: bool,

        /// Whether incremental transfers are provided.
        ixfr: bool,

        /// Whether the server signs the zone.
        dnssec: bool,
    },

    /// The server transfers the zone from a primary.
    Secondary {
        /// The server to transfer from.
        primary: SocketAddr,

        /// Whether incremental transfers are requested.
        ixfr: bool,
    },
}

impl ZoneRole {
    /// Returns whether this is the primary role.
    pub fn is_primary(&self) -> bool {
        matches!(self, ZoneRole::Primary { .. })
    }
}

//------------ link ----------------------------------------------------------

/// Options for linking zones between two servers.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LinkOptions {
    /// Whether the primary accepts dynamic updates.
    pub ddns: bool,

    /// Whether incremental transfer is used.
    pub ixfr: bool,

    /// Whether the primary signs the zones.
    pub dnssec: bool,
}

/// Sets up zones as primary on one server and secondary on another.
///
/// The zone files are copied into the primary’s zone directory. The
/// secondary only learns the file names and gets the content by transfer.
pub fn link<P, S>(
    zones: &[ZoneFile],
    primary: &mut P,
    secondary: &mut S,
    options: LinkOptions,
) -> Result<(), FormatError>
where
    P: ServerControl + ?Sized,
    S: ServerControl + ?Sized,
{
    for zone in zones {
        let primary_zone = zone.clone_to(primary.zone_dir(), true)?;
        let secondary_zone = zone.clone_to(secondary.zone_dir(), false)?;
        debug!(
            "linking zone {}: {} -> {}",
            zone.name(),
            primary.name(),
            secondary.name()
        );
        primary.add_zone(
            primary_zone,
            ZoneRole::Primary {
                notify: vec![secondary.addr()],
                ddns: options.ddns,
                ixfr: options.ixfr,
                dnssec: options.dnssec,
            },
        );
        secondary.add_zone(
            secondary_zone,
            ZoneRole::Secondary {
                primary: primary.addr(),
                ixfr: options.ixfr,
            },
        );
    }
    Ok(())
}

//------------ Helpers for implementations -----------------------------------

/// Runs a command, optionally feeding it input, and returns its stdout.
///
/// A non-zero exit status is an error.
pub(crate) async fn run(
    mut cmd: Command,
    input: Option<&str>,
) -> Result<String, ServerError> {
    let command = format!("{:?}", cmd.as_std());
    trace!("running {}", command);
    cmd.stdin(if input.is_some() {
        Stdio::piped()
    } else {
        Stdio::null()
    })
    .stdout(Stdio::piped())
    .stderr(Stdio::piped())
    .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| ServerError::spawn(&command, err))?;
    if let Some(input) = input {
        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(input.as_bytes())
                .await
                .map_err(|err| ServerError::spawn(&command, err))?;
        }
    }
    let output = child
        .wait_with_output()
        .await
        .map_err(|err| ServerError::spawn(&command, err))?;
    if !output.status.success() {
        return Err(ServerError::Failed {
            command,
            status: output.status.code(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().into(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Returns the path of a tool a server needs.
pub(crate) fn required(
    path: &Option<PathBuf>,
    name: &'static str,
) -> Result<PathBuf, ConfigError> {
    path.clone().ok_or(ConfigError::Disabled(name))
}

/// Extracts the serial from the short form output of a SOA query.
///
/// The output is expected to be empty or a single SOA record data line.
pub(crate) fn parse_soa_serial(
    output: &str,
) -> Result<Option<Serial>, ServerError> {
    let line = match output.lines().map(str::trim).find(|l| !l.is_empty()) {
        Some(line) => line,
        None => return Ok(None),
    };
    // Errors like timeouts are reported as comments.
    if line.starts_with(';') {
        return Ok(None);
    }
    line.split_whitespace()
        .nth(2)
        .and_then(|serial| serial.parse().ok())
        .map(Some)
        .ok_or_else(|| {
            ServerError::UnexpectedOutput(format!("bad SOA answer '{}'", line))
        })
}

/// Builds a record set from the output of a zone transfer.
///
/// A failed transfer shows up as comment lines only.
pub(crate) fn parse_transfer(
    zone: &str,
    output: &str,
) -> Result<RecordSet, ServerError> {
    let set = RecordSet::from(output);
    if set.records().next().is_none() {
        let reason = output
            .lines()
            .find(|line| line.starts_with(';'))
            .unwrap_or("no records")
            .trim_start_matches(';')
            .trim();
        return Err(ServerError::UnexpectedOutput(format!(
            "transfer of {} failed: {}",
            zone, reason
        )));
    }
    Ok(set)
}

//------------ ServerError ---------------------------------------------------

/// Controlling a server failed.
#[derive(Clone, Debug)]
pub enum ServerError {
    /// A control program could not be run.
    Spawn {
        command: String,
        error: Arc<io::Error>,
    },

    /// A control program reported an error.
    Failed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },

    /// A control program produced output that could not be understood.
    UnexpectedOutput(String),

    /// The server doesn’t know the zone.
    UnknownZone(String),

    /// Writing the server configuration failed.
    Config(Arc<io::Error>),
}

impl ServerError {
    fn spawn(command: &str, err: io::Error) -> Self {
        ServerError::Spawn {
            command: command.into(),
            error: Arc::new(err),
        }
    }
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ServerError::Spawn { command, error } => {
                write!(f, "failed to run {}: {}", command, error)
            }
            ServerError::Failed {
                command,
                status,
                stderr,
            } => {
                write!(f, "{} failed", command)?;
                if let Some(status) = status {
                    write!(f, " with status {}", status)?;
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            ServerError::UnexpectedOutput(msg) => {
                write!(f, "unexpected output: {}", msg)
            }
            ServerError::UnknownZone(zone) => {
                write!(f, "unknown zone {}", zone)
            }
            ServerError::Config(err) => {
                write!(f, "failed to write configuration: {}", err)
            }
        }
    }
}

impl error::Error for ServerError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            ServerError::Spawn { error, .. } => Some(error.as_ref()),
            ServerError::Config(err) => Some(err.as_ref()),
            _ => None,
        }
    }
}

impl From<io::Error> for ServerError {
    fn from(err: io::Error) -> Self {
        ServerError::Config(Arc::new(err))
    }
}

//============ Testing =======================================================
