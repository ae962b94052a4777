//! Zone file errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::{error, fmt, io};

//------------ FormatError ---------------------------------------------------

/// A zone file lacks the structure required for an operation.
///
/// This covers both files that can’t be accessed at all and files that
/// can be read but don’t contain what the operation needs, such as a SOA
/// record. The error is fatal to the operation that raised it.
#[derive(Clone, Debug)]
pub enum FormatError {
    /// The file could not be opened, read, or written.
    Io {
        /// The file in question.
        path: PathBuf,

        /// The underlying error.
        error: Arc<io::Error>,
    },

    /// The file does not contain a SOA record.
    MissingSoa {
        /// The file in question.
        path: PathBuf,
    },

    /// The first SOA record doesn’t end in five numeric fields.
    MalformedSoa {
        /// The file in question.
        path: PathBuf,

        /// The line number of the SOA record, starting at 1.
        line: usize,
    },
}

impl FormatError {
    pub(crate) fn io(path: impl AsRef<Path>, error: io::Error) -> Self {
        FormatError::Io {
            path: path.as_ref().into(),
            error: Arc::new(error),
        }
    }

    /// Returns the path of the file the error refers to.
    pub fn path(&self) -> &Path {
        match self {
            FormatError::Io { path, .. } => path,
            FormatError::MissingSoa { path } => path,
            FormatError::MalformedSoa { path, .. } => path,
        }
    }
}

impl fmt::Display for FormatError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FormatError::Io { path, error } => {
                write!(
                    f,
                    "can't use zone file '{}': {}",
                    path.display(),
                    error
                )
            }
            FormatError::MissingSoa { path } => {
                write!(f, "no SOA record in zone file '{}'", path.display())
            }
            FormatError::MalformedSoa { path, line } => write!(
                f,
                "malformed SOA record in zone file '{}', line {}",
                path.display(),
                line
            ),
        }
    }
}

impl error::Error for FormatError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            FormatError::Io { error, .. } => Some(error.as_ref()),
            _ => None,
        }
    }
}
