//! Controlling BIND.

use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use domain::utils::base64;
use rand::Rng;
use tokio::process::Command;
use tracing::debug;

use super::{
    parse_soa_serial, parse_transfer, required, run, ServerControl,
    ServerError, ZoneRole,
};
use crate::base::Serial;
use crate::config::{Binaries, ConfigError};
use crate::update::{Update, UpdateSink};
use crate::zonefile::{RecordSet, ZoneFile};

/// The name of the key used by `rndc`.
const RNDC_KEY: &str = "rndc-key";

//------------ Bind ----------------------------------------------------------

/// A running BIND instance.
///
/// Queries and transfers use `dig`, dynamic updates `nsupdate` and all
/// other control `rndc` with a key stored in the server’s directory.
#[derive(Clone, Debug)]
pub struct Bind {
    name: String,
    dir: PathBuf,
    addr: SocketAddr,
    control: SocketAddr,
    secret: String,
    rndc: PathBuf,
    dig: PathBuf,
    nsupdate: PathBuf,
    zones: Vec<(ZoneFile, ZoneRole)>,
}

impl Bind {
    /// Creates a new BIND server with all its data in `dir`.
    ///
    /// The control channel listens on `control` and uses a random key.
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        addr: SocketAddr,
        control: SocketAddr,
        binaries: &Binaries,
    ) -> Result<Self, ConfigError> {
        let secret: [u8; 32] = rand::thread_rng().gen();
        Ok(Bind {
            name: name.into(),
            dir: dir.into(),
            addr,
            control,
            secret: base64::encode_string(&secret),
            rndc: required(&binaries.rndc, "rndc")?,
            dig: required(&binaries.dig, "dig")?,
            nsupdate: required(&binaries.nsupdate, "nsupdate")?,
            zones: Vec::new(),
        })
    }

    /// Returns the path of the configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join("named.conf")
    }

    /// Returns the path of the key file for `rndc`.
    pub fn key_path(&self) -> PathBuf {
        self.dir.join("rndc.key")
    }

    /// Returns the configuration for the server’s current zones.
    pub fn config(&self) -> Config {
        let mut config = Config::all_in(&self.dir);
        config.listen = Some(self.addr);
        config.control = Some(self.control);
        config.key_file = Some(self.key_path());
        for (zone, role) in &self.zones {
            config.zones.push(ZoneConfig {
                name: zone.name().into(),
                file: zone.path(),
                role: role.clone(),
            });
        }
        config
    }

    /// Writes the configuration and key files.
    ///
    /// Returns the path of the configuration file.
    pub fn write_config(&self) -> Result<PathBuf, io::Error> {
        let mut key = File::create(self.key_path())?;
        write_key(&mut key, &self.secret)?;
        let path = self.config_path();
        self.config().save(&path)?;
        debug!("{}: wrote {}", self.name, path.display());
        Ok(path)
    }

    fn rndc(&self) -> Command {
        let mut cmd = Command::new(&self.rndc);
        cmd.arg("-s")
            .arg(self.control.ip().to_string())
            .arg("-p")
            .arg(self.control.port().to_string())
            .arg("-k")
            .arg(self.key_path());
        cmd
    }

    fn dig(&self) -> Command {
        let mut cmd = Command::new(&self.dig);
        cmd.arg(format!("@{}", self.addr.ip()))
            .arg("-p")
            .arg(self.addr.port().to_string())
            .arg("+time=1")
            .arg("+tries=1");
        cmd
    }
}

impl ServerControl for Bind {
    fn name(&self) -> &str {
        &self.name
    }

    fn addr(&self) -> SocketAddr {
        self.addr
    }

    fn zone_dir(&self) -> &Path {
        &self.dir
    }

    fn add_zone(&mut self, zone: ZoneFile, role: ZoneRole) {
        self.zones.push((zone, role))
    }

    fn zone_file(&mut self, zone: &str) -> Option<&mut ZoneFile> {
        self.zones
            .iter_mut()
            .map(|(file, _)| file)
            .find(|file| file.name().eq_ignore_ascii_case(zone))
    }

    async fn zone_serial(
        &self,
        zone: &str,
    ) -> Result<Option<Serial>, ServerError> {
        let mut cmd = self.dig();
        cmd.arg("+short").arg(zone).arg("SOA");
        match run(cmd, None).await {
            Ok(output) => parse_soa_serial(&output),
            Err(ServerError::Failed { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    /// Writes zones to disk with `rndc sync`.
    ///
    /// The command itself only returns once the files are written. With
    /// `wait`, `-clean` is added so the journal is merged and removed, too,
    /// leaving the zone file as the only copy of the zone content.
    async fn flush(
        &self,
        zone: Option<&str>,
        wait: bool,
    ) -> Result<(), ServerError> {
        let mut cmd = self.rndc();
        cmd.arg("sync");
        if wait {
            cmd.arg("-clean");
        }
        if let Some(zone) = zone {
            cmd.arg(zone);
        }
        run(cmd, None).await.map(|_| ())
    }

    async fn update(&self, update: &Update) -> Result<(), ServerError> {
        debug!(
            "{}: sending update with {} changes for {}",
            self.name,
            update.len(),
            update.origin()
        );
        let cmd = Command::new(&self.nsupdate);
        run(cmd, Some(&update.script(self.addr))).await.map(|_| ())
    }

    async fn transfer(&self, zone: &str) -> Result<RecordSet, ServerError> {
        let mut cmd = self.dig();
        cmd.arg("+noall").arg("+answer").arg(zone).arg("AXFR");
        let output = run(cmd, None).await?;
        parse_transfer(zone, &output)
    }
}

fn write_key<W: io::Write>(
    target: &mut W,
    secret: &str,
) -> Result<(), io::Error> {
    writeln!(target, "key \"{}\" {{", RNDC_KEY)?;
    writeln!(target, "    algorithm hmac-sha256;")?;
    writeln!(target, "    secret \"{}\";", secret)?;
    writeln!(target, "}};")
}

//------------ Config --------------------------------------------------------

/// BIND configuration.
///
/// This contains only the subset of options the scenarios need. Use the
/// `save` method to write out a `named.conf`.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub directory: Option<PathBuf>,
    pub pid_file: Option<PathBuf>,
    pub listen: Option<SocketAddr>,
    pub control: Option<SocketAddr>,
    pub key_file: Option<PathBuf>,

    pub zones: Vec<ZoneConfig>,
}

impl Config {
    /// Creates a configuration that keeps all BIND data in a directory.
    pub fn all_in<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Config {
            directory: Some(path.into()),
            pid_file: Some(path.join("named.pid")),
            ..Default::default()
        }
    }

    /// Writes the configuration to a file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), io::Error> {
        let mut file = File::create(path)?;
        self.write(&mut file)
    }

    /// Writes the configuration to something writable.
    pub fn write<W: io::Write>(
        &self,
        target: &mut W,
    ) -> Result<(), io::Error> {
        writeln!(target, "options {{")?;
        if let Some(path) = self.directory.as_ref() {
            writeln!(target, "    directory \"{}\";", path.display())?;
        }
        if let Some(path) = self.pid_file.as_ref() {
            writeln!(target, "    pid-file \"{}\";", path.display())?;
        }
        if let Some(addr) = self.listen {
            let (v4, v6) = match addr {
                SocketAddr::V4(_) => ("listen-on", "listen-on-v6"),
                SocketAddr::V6(_) => ("listen-on-v6", "listen-on"),
            };
            writeln!(
                target,
                "    {} port {} {{ {}; }};",
                v4,
                addr.port(),
                addr.ip()
            )?;
            writeln!(target, "    {} {{ none; }};", v6)?;
        }
        writeln!(target, "    recursion no;")?;
        writeln!(target, "    notify explicit;")?;
        writeln!(target, "    masterfile-format text;")?;
        writeln!(target, "}};")?;

        if let Some(path) = self.key_file.as_ref() {
            writeln!(target, "include \"{}\";", path.display())?;
        }
        if let Some(addr) = self.control {
            writeln!(
                target,
                "controls {{ inet {} port {} allow {{ any; }} \
                 keys {{ {}; }}; }};",
                addr.ip(),
                addr.port(),
                RNDC_KEY
            )?;
        }

        for zone in &self.zones {
            zone.write(target)?;
        }
        Ok(())
    }
}

//------------ ZoneConfig ----------------------------------------------------

/// A single `zone` statement.
#[derive(Clone, Debug)]
pub struct ZoneConfig {
    pub name: String,
    pub file: PathBuf,
    pub role: ZoneRole,
}

impl ZoneConfig {
    pub fn write<W: io::Write>(
        &self,
        target: &mut W,
    ) -> Result<(), io::Error> {
        writeln!(target, "zone \"{}\" {{", self.name)?;
        writeln!(target, "    file \"{}\";", self.file.display())?;
        match self.role {
            ZoneRole::Primary {
                ref notify,
                ddns,
                ixfr,
                dnssec,
            } => {
                writeln!(target, "    type primary;")?;
                if !notify.is_empty() {
                    write!(target, "    also-notify {{")?;
                    for addr in notify {
                        let (ip, port) = (addr.ip(), addr.port());
                        write!(target, " {} port {};", ip, port)?;
                    }
                    writeln!(target, " }};")?;
                }
                writeln!(target, "    allow-transfer {{ any; }};")?;
                if ddns {
                    writeln!(target, "    allow-update {{ any; }};")?;
                }
                if ixfr {
                    writeln!(target, "    ixfr-from-differences yes;")?;
                }
                if dnssec {
                    writeln!(target, "    dnssec-policy default;")?;
                    writeln!(target, "    inline-signing yes;")?;
                }
            }
            ZoneRole::Secondary { primary, ixfr } => {
                writeln!(target, "    type secondary;")?;
                writeln!(
                    target,
                    "    primaries {{ {} port {}; }};",
                    primary.ip(),
                    primary.port()
                )?;
                writeln!(target, "    allow-notify {{ any; }};")?;
                writeln!(
                    target,
                    "    request-ixfr {};",
                    if ixfr { "yes" } else { "no" }
                )?;
            }
        }
        writeln!(target, "}};")
    }
}

//============ Testing =======================================================
