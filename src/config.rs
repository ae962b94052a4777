//! Configuration of scenarios and external tools.

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{cmp, env, error, fmt};

use crate::verify::Check;

//------------ DefMinMax -----------------------------------------------------

/// The default, minimum, and maximum values for a config variable.
#[derive(Clone, Copy)]
pub struct DefMinMax<T> {
    def: T,
    min: T,
    max: T,
}

impl<T> DefMinMax<T> {
    /// Creates a new value.
    pub const fn new(def: T, min: T, max: T) -> Self {
        Self { def, min, max }
    }

    /// Returns the default value.
    pub fn default(self) -> T {
        self.def
    }

    /// Trims the given value to fit into the minimum/maximum range.
    pub fn limit(self, value: T) -> T
    where
        T: Ord,
    {
        cmp::max(self.min, cmp::min(self.max, value))
    }
}

//------------ Configuration Constants ---------------------------------------

/// Limits for the number of mutation rounds.
const ROUNDS: DefMinMax<usize> = DefMinMax::new(4, 1, 1000);

/// Limits for the interval between two serial polls.
const POLL_INTERVAL: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_millis(500),
    Duration::from_millis(10),
    Duration::from_secs(10),
);

/// Limits for waiting on a zone to converge.
const TIMEOUT: DefMinMax<Duration> = DefMinMax::new(
    Duration::from_secs(60),
    Duration::from_secs(1),
    Duration::from_secs(3600),
);

/// Limits for the number of tries to generate a non-empty update.
const MUTATION_ATTEMPTS: DefMinMax<usize> = DefMinMax::new(10, 1, 100);

//------------ ScenarioConfig ------------------------------------------------

/// Configuration of a convergence scenario.
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    /// Number of mutate/converge/verify rounds.
    rounds: usize,

    /// Time between two serial polls.
    poll_interval: Duration,

    /// Maximum time to wait for a zone to converge.
    timeout: Duration,

    /// How often to retry generating an update that turned out empty.
    mutation_attempts: usize,

    /// Whether a round may produce no changes.
    allow_empty: bool,

    /// Whether NS records may be mutated.
    allow_ns: bool,

    /// Seed for the random number generator.
    seed: Option<u64>,

    /// Verification checks run on the secondary’s zone files.
    checks: Vec<Check>,
}

impl ScenarioConfig {
    /// Creates a config with default values.
    pub fn new() -> Self {
        Default::default()
    }

    /// Returns the number of rounds.
    pub fn rounds(&self) -> usize {
        self.rounds
    }

    /// Sets the number of rounds.
    ///
    /// If this value is too small or too large, it will be caped.
    pub fn set_rounds(&mut self, value: usize) {
        self.rounds = ROUNDS.limit(value)
    }

    /// Returns the poll interval.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Sets the poll interval.
    ///
    /// If this value is too small or too large, it will be caped.
    pub fn set_poll_interval(&mut self, value: Duration) {
        self.poll_interval = POLL_INTERVAL.limit(value)
    }

    /// Returns the convergence timeout.
    ///
    /// This is the maximum time to wait for a single zone on a single
    /// server to reach the expected serial.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Sets the convergence timeout.
    ///
    /// If this value is too small or too large, it will be caped.
    pub fn set_timeout(&mut self, value: Duration) {
        self.timeout = TIMEOUT.limit(value)
    }

    /// Returns the number of attempts at a non-empty update.
    pub fn mutation_attempts(&self) -> usize {
        self.mutation_attempts
    }

    /// Sets the number of attempts at a non-empty update.
    ///
    /// If this value is too small or too large, it will be caped.
    pub fn set_mutation_attempts(&mut self, value: usize) {
        self.mutation_attempts = MUTATION_ATTEMPTS.limit(value)
    }

    /// Returns whether an update without changes is acceptable.
    pub fn allow_empty(&self) -> bool {
        self.allow_empty
    }

    /// Sets whether an update without changes is acceptable.
    pub fn set_allow_empty(&mut self, value: bool) {
        self.allow_empty = value
    }

    /// Returns whether NS records may be mutated.
    pub fn allow_ns(&self) -> bool {
        self.allow_ns
    }

    /// Sets whether NS records may be mutated.
    pub fn set_allow_ns(&mut self, value: bool) {
        self.allow_ns = value
    }

    /// Returns the random seed, if one was set.
    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    /// Sets the random seed.
    ///
    /// Without a seed every run uses different random choices.
    pub fn set_seed(&mut self, value: Option<u64>) {
        self.seed = value
    }

    /// Returns the verification checks.
    pub fn checks(&self) -> &[Check] {
        &self.checks
    }

    /// Sets the verification checks.
    pub fn set_checks(&mut self, checks: Vec<Check>) {
        self.checks = checks
    }
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        Self {
            rounds: ROUNDS.default(),
            poll_interval: POLL_INTERVAL.default(),
            timeout: TIMEOUT.default(),
            mutation_attempts: MUTATION_ATTEMPTS.default(),
            allow_empty: false,
            allow_ns: false,
            seed: None,
            checks: Vec::new(),
        }
    }
}

//------------ Binaries ------------------------------------------------------

/// Locations of the external programs.
///
/// A `None` value means the tool is disabled.
#[derive(Clone, Debug, Default)]
pub struct Binaries {
    pub knotc: Option<PathBuf>,
    pub kdig: Option<PathBuf>,
    pub knsupdate: Option<PathBuf>,
    pub rndc: Option<PathBuf>,
    pub dig: Option<PathBuf>,
    pub nsupdate: Option<PathBuf>,
    pub dnssec_verify: Option<PathBuf>,
    pub ldns_verify_zone: Option<PathBuf>,
    pub zone_generate: Option<PathBuf>,
}

impl Binaries {
    /// Determines the binaries from the environment.
    ///
    /// Each tool has an environment variable. If it is unset, the default
    /// program name is looked up in `PATH` and the tool is disabled if it
    /// can’t be found. If it is set to an empty string, the tool is
    /// disabled. Otherwise the value is looked up and must exist.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Determines the binaries using the given variable lookup.
    pub fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let get = |var: &'static str, default: &str| {
            get_binary(var, lookup(var).as_deref(), default)
        };
        Ok(Binaries {
            knotc: get("ZONESTRESS_KNOTC", "knotc")?,
            kdig: get("ZONESTRESS_KDIG", "kdig")?,
            knsupdate: get("ZONESTRESS_KNSUPDATE", "knsupdate")?,
            rndc: get("ZONESTRESS_RNDC", "rndc")?,
            dig: get("ZONESTRESS_DIG", "dig")?,
            nsupdate: get("ZONESTRESS_NSUPDATE", "nsupdate")?,
            dnssec_verify: get("ZONESTRESS_DNSSEC_VERIFY", "dnssec-verify")?,
            ldns_verify_zone: get(
                "ZONESTRESS_LDNS_VERIFY_ZONE",
                "ldns-verify-zone",
            )?,
            zone_generate: get("ZONESTRESS_ZONE_GENERATE", "zone_generate")?,
        })
    }

    /// Returns the default verification checks for the available tools.
    pub fn checks(&self) -> Vec<Check> {
        let mut res = Vec::new();
        if let Some(path) = self.dnssec_verify.as_ref() {
            res.push(Check::dnssec_verify(path));
        }
        if let Some(path) = self.ldns_verify_zone.as_ref() {
            res.push(Check::ldns_verify_zone(path));
        }
        res
    }
}

fn get_binary(
    var: &'static str,
    value: Option<&str>,
    default: &str,
) -> Result<Option<PathBuf>, ConfigError> {
    match value {
        Some("") => Ok(None),
        Some(name) => match which(name) {
            Some(path) => Ok(Some(path)),
            None => Err(ConfigError::BinaryNotFound {
                var,
                name: name.into(),
            }),
        },
        None => Ok(which(default)),
    }
}

/// Looks up a program like a shell would.
fn which(name: &str) -> Option<PathBuf> {
    let path = Path::new(name);
    if path.components().count() > 1 {
        return is_executable(path).then(|| path.into());
    }
    let search = env::var_os("PATH")?;
    env::split_paths(&search)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

/// Returns whether `path` is a regular file someone may execute.
#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;

    match path.metadata() {
        Ok(meta) => meta.is_file() && meta.permissions().mode() & 0o111 != 0,
        Err(_) => false,
    }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

//------------ ConfigError ---------------------------------------------------

/// The configuration is not usable.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfigError {
    /// A binary given through an environment variable doesn’t exist.
    BinaryNotFound { var: &'static str, name: String },

    /// A tool required by a server is disabled.
    Disabled(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            ConfigError::BinaryNotFound { var, name } => {
                write!(f, "binary '{}' from {} not found", name, var)
            }
            ConfigError::Disabled(name) => {
                write!(f, "required tool {} is disabled", name)
            }
        }
    }
}

impl error::Error for ConfigError {}

//============ Testing =======================================================
