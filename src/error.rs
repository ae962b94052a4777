//! High-level error type
//!
//! Everything that aborts a scenario ends up as an [`Error`]. Conditions
//! that are merely reported as test defects are kept in the
//! [`TestContext`][crate::context::TestContext] instead.

use std::{error, fmt};

use crate::base::Serial;
use crate::config::ConfigError;
use crate::server::ServerError;
use crate::update::UpdateError;
use crate::zonefile::generate::GenerateError;
use crate::zonefile::FormatError;

//------------ Error ---------------------------------------------------------

#[derive(Debug)]
pub enum Error {
    /// A zone file lacks required structure or can’t be accessed.
    Format(FormatError),

    /// Controlling a name server failed.
    Server(ServerError),

    /// The configuration is unusable.
    Config(ConfigError),

    /// The external zone generator failed.
    Generator(GenerateError),

    /// A zone name can’t be used for dynamic updates.
    Update(UpdateError),

    /// A server did not reach the expected serial in time.
    ConvergenceTimeout {
        /// The server that was polled.
        server: String,

        /// The zone that was polled.
        zone: String,

        /// The serial of the previous round.
        previous: Option<Serial>,

        /// The serial the primary reached, if it got that far.
        primary: Option<Serial>,

        /// The serial last reported by the polled server.
        observed: Option<Serial>,
    },

    /// No update with any changes could be generated for a zone.
    EmptyMutation {
        zone: String,
        attempts: usize,
    },
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Format(err) => Some(err),
            Error::Server(err) => Some(err),
            Error::Config(err) => Some(err),
            Error::Generator(err) => Some(err),
            Error::Update(err) => Some(err),
            Error::ConvergenceTimeout { .. } | Error::EmptyMutation { .. } => {
                None
            }
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Format(err) => err.fmt(f),
            Error::Server(err) => err.fmt(f),
            Error::Config(err) => err.fmt(f),
            Error::Generator(err) => err.fmt(f),
            Error::Update(err) => err.fmt(f),
            Error::ConvergenceTimeout {
                server,
                zone,
                previous,
                primary,
                observed,
            } => {
                write!(f, "{}: zone {} did not converge (", server, zone)?;
                write_serial(f, "previous", *previous)?;
                f.write_str(", ")?;
                write_serial(f, "primary", *primary)?;
                f.write_str(", ")?;
                write_serial(f, "observed", *observed)?;
                f.write_str(")")
            }
            Error::EmptyMutation { zone, attempts } => write!(
                f,
                "zone {}: no changes generated in {} attempts",
                zone, attempts
            ),
        }
    }
}

fn write_serial(
    f: &mut fmt::Formatter,
    label: &str,
    serial: Option<Serial>,
) -> fmt::Result {
    match serial {
        Some(serial) => write!(f, "{} {}", label, serial),
        None => write!(f, "{} none", label),
    }
}

impl From<FormatError> for Error {
    fn from(err: FormatError) -> Error {
        Error::Format(err)
    }
}

impl From<ServerError> for Error {
    fn from(err: ServerError) -> Error {
        Error::Server(err)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Error {
        Error::Config(err)
    }
}

impl From<GenerateError> for Error {
    fn from(err: GenerateError) -> Error {
        Error::Generator(err)
    }
}

impl From<UpdateError> for Error {
    fn from(err: UpdateError) -> Error {
        Error::Update(err)
    }
}
