//! Controlling Knot DNS.

use std::fs::File;
use std::io;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

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

//------------ Knot ----------------------------------------------------------

/// A running Knot DNS instance.
///
/// Queries and transfers use `kdig`, dynamic updates `knsupdate` and all
/// other control `knotc` via the control socket in the server’s directory.
#[derive(Clone, Debug)]
pub struct Knot {
    name: String,
    dir: PathBuf,
    addr: SocketAddr,
    knotc: PathBuf,
    kdig: PathBuf,
    knsupdate: PathBuf,
    zones: Vec<(ZoneFile, ZoneRole)>,
}

impl Knot {
    /// Creates a new Knot server with all its data in `dir`.
    pub fn new(
        name: impl Into<String>,
        dir: impl Into<PathBuf>,
        addr: SocketAddr,
        binaries: &Binaries,
    ) -> Result<Self, ConfigError> {
        Ok(Knot {
            name: name.into(),
            dir: dir.into(),
            addr,
            knotc: required(&binaries.knotc, "knotc")?,
            kdig: required(&binaries.kdig, "kdig")?,
            knsupdate: required(&binaries.knsupdate, "knsupdate")?,
            zones: Vec::new(),
        })
    }

    /// Returns the path of the control socket.
    pub fn socket(&self) -> PathBuf {
        self.dir.join("knot.sock")
    }

    /// Returns the path of the configuration file.
    pub fn config_path(&self) -> PathBuf {
        self.dir.join("knot.conf")
    }

    /// Returns the configuration for the server’s current zones.
    pub fn config(&self) -> Config {
        let mut config = Config::all_in(&self.dir);
        config.listen.push(self.addr);
        config.control = Some(self.socket());
        for (zone, role) in &self.zones {
            let mut zone_config = ZoneConfig::new(zone.name(), zone.path());
            match role {
                ZoneRole::Primary {
                    notify,
                    ddns,
                    ixfr,
                    dnssec,
                } => {
                    zone_config.notify = notify
                        .iter()
                        .map(|addr| config.remote(*addr))
                        .collect();
                    zone_config.acl.push(ACL_TRANSFER.into());
                    if *ddns {
                        zone_config.acl.push(ACL_UPDATE.into());
                    }
                    zone_config.journal = *ixfr;
                    zone_config.dnssec_signing = *dnssec;
                }
                ZoneRole::Secondary { primary, ixfr } => {
                    zone_config.master = Some(config.remote(*primary));
                    zone_config.acl.push(ACL_NOTIFY.into());
                    zone_config.journal = *ixfr;
                }
            }
            config.zones.push(zone_config);
        }
        config
    }

    /// Writes the configuration file and returns its path.
    pub fn write_config(&self) -> Result<PathBuf, io::Error> {
        let path = self.config_path();
        self.config().save(&path)?;
        debug!("{}: wrote {}", self.name, path.display());
        Ok(path)
    }

    fn knotc(&self) -> Command {
        let mut cmd = Command::new(&self.knotc);
        cmd.arg("-s").arg(self.socket());
        cmd
    }

    fn kdig(&self) -> Command {
        let mut cmd = Command::new(&self.kdig);
        cmd.arg(format!("@{}", self.addr.ip()))
            .arg("-p")
            .arg(self.addr.port().to_string())
            .arg("+time=1")
            .arg("+retry=0");
        cmd
    }
}

impl ServerControl for Knot {
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
        let mut cmd = self.kdig();
        cmd.arg("+short").arg(zone).arg("SOA");
        match run(cmd, None).await {
            Ok(output) => parse_soa_serial(&output),
            Err(ServerError::Failed { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn flush(
        &self,
        zone: Option<&str>,
        wait: bool,
    ) -> Result<(), ServerError> {
        let mut cmd = self.knotc();
        if wait {
            cmd.arg("-b");
        }
        cmd.arg("zone-flush");
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
        let cmd = Command::new(&self.knsupdate);
        run(cmd, Some(&update.script(self.addr))).await.map(|_| ())
    }

    async fn transfer(&self, zone: &str) -> Result<RecordSet, ServerError> {
        let mut cmd = self.kdig();
        cmd.arg(zone).arg("AXFR");
        let output = run(cmd, None).await?;
        parse_transfer(zone, &output)
    }
}

//------------ Config --------------------------------------------------------

const ACL_TRANSFER: &str = "transfer";
const ACL_NOTIFY: &str = "notify";
const ACL_UPDATE: &str = "update";

/// Knot configuration.
///
/// This contains only the subset of options the scenarios need. The
/// configuration is written in Knot’s YAML dialect by the `write` method.
#[derive(Clone, Debug, Default)]
pub struct Config {
    pub listen: Vec<SocketAddr>,
    pub rundir: Option<PathBuf>,
    pub storage: Option<PathBuf>,
    pub control: Option<PathBuf>,
    pub log_level: Option<String>,

    pub remotes: Vec<RemoteConfig>,
    pub zones: Vec<ZoneConfig>,
}

impl Config {
    /// Creates a configuration that keeps all Knot data in a directory.
    pub fn all_in<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        Config {
            rundir: Some(path.into()),
            storage: Some(path.into()),
            log_level: Some("info".into()),
            ..Default::default()
        }
    }

    /// Returns the id of the remote for an address, adding it if needed.
    pub fn remote(&mut self, addr: SocketAddr) -> String {
        if let Some(remote) = self.remotes.iter().find(|r| r.address == addr)
        {
            return remote.id.clone();
        }
        let id = format!("remote{}", self.remotes.len() + 1);
        self.remotes.push(RemoteConfig {
            id: id.clone(),
            address: addr,
        });
        id
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
        writeln!(target, "server:")?;
        if let Some(path) = self.rundir.as_ref() {
            writeln!(target, "    rundir: \"{}\"", path.display())?;
        }
        for addr in &self.listen {
            writeln!(target, "    listen: {}@{}", addr.ip(), addr.port())?;
        }

        if let Some(path) = self.control.as_ref() {
            writeln!(target, "\ncontrol:")?;
            writeln!(target, "    listen: \"{}\"", path.display())?;
        }

        if let Some(level) = self.log_level.as_ref() {
            writeln!(target, "\nlog:")?;
            writeln!(target, "  - target: stdout")?;
            writeln!(target, "    any: {}", level)?;
        }

        if !self.remotes.is_empty() {
            writeln!(target, "\nremote:")?;
            for remote in &self.remotes {
                remote.write(target)?;
            }
        }

        writeln!(target, "\nacl:")?;
        for (id, action) in [
            (ACL_TRANSFER, "transfer"),
            (ACL_NOTIFY, "notify"),
            (ACL_UPDATE, "update"),
        ] {
            writeln!(target, "  - id: {}", id)?;
            writeln!(target, "    address: [0.0.0.0/0, ::/0]")?;
            writeln!(target, "    action: {}", action)?;
        }

        writeln!(target, "\ntemplate:")?;
        writeln!(target, "  - id: default")?;
        if let Some(path) = self.storage.as_ref() {
            writeln!(target, "    storage: \"{}\"", path.display())?;
        }
        // Zones are only written on request.
        writeln!(target, "    zonefile-sync: -1")?;
        writeln!(target, "    semantic-checks: on")?;

        if !self.zones.is_empty() {
            writeln!(target, "\nzone:")?;
            for zone in &self.zones {
                zone.write(target)?;
            }
        }
        Ok(())
    }
}

//------------ RemoteConfig --------------------------------------------------

/// A single entry of the `remote:` section.
#[derive(Clone, Debug)]
pub struct RemoteConfig {
    pub id: String,
    pub address: SocketAddr,
}

impl RemoteConfig {
    pub fn write<W: io::Write>(
        &self,
        target: &mut W,
    ) -> Result<(), io::Error> {
        writeln!(target, "  - id: {}", self.id)?;
        writeln!(
            target,
            "    address: {}@{}",
            self.address.ip(),
            self.address.port()
        )
    }
}

//------------ ZoneConfig ----------------------------------------------------

/// A single entry of the `zone:` section.
#[derive(Clone, Debug, Default)]
pub struct ZoneConfig {
    pub domain: String,
    pub file: PathBuf,
    pub master: Option<String>,
    pub notify: Vec<String>,
    pub acl: Vec<String>,

    /// Whether changes are kept in the journal for IXFR.
    pub journal: bool,

    pub dnssec_signing: bool,
}

impl ZoneConfig {
    pub fn new<S: Into<String>, P: Into<PathBuf>>(domain: S, file: P) -> Self {
        ZoneConfig {
            domain: domain.into(),
            file: file.into(),
            ..Default::default()
        }
    }

    pub fn write<W: io::Write>(
        &self,
        target: &mut W,
    ) -> Result<(), io::Error> {
        writeln!(target, "  - domain: {}", self.domain)?;
        writeln!(target, "    file: \"{}\"", self.file.display())?;
        if let Some(master) = self.master.as_ref() {
            writeln!(target, "    master: {}", master)?;
        }
        if !self.notify.is_empty() {
            writeln!(target, "    notify: [{}]", self.notify.join(", "))?;
        }
        if !self.acl.is_empty() {
            writeln!(target, "    acl: [{}]", self.acl.join(", "))?;
        }
        if self.journal {
            writeln!(target, "    journal-content: changes")?;
            writeln!(target, "    zonefile-load: difference")?;
        } else {
            writeln!(target, "    journal-content: none")?;
        }
        if self.dnssec_signing {
            writeln!(target, "    dnssec-signing: on")?;
        }
        Ok(())
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;
    use crate::server::{link, LinkOptions};

    fn binaries() -> Binaries {
        Binaries {
            knotc: Some("knotc".into()),
            kdig: Some("kdig".into()),
            knsupdate: Some("knsupdate".into()),
            ..Default::default()
        }
    }

    #[test]
    fn missing_binary() {
        let err = Knot::new(
            "knot",
            "/tmp",
            "127.0.0.1:5300".parse().unwrap(),
            &Binaries::default(),
        )
        .unwrap_err();
        assert_eq!(err, ConfigError::Disabled("knotc"));
    }

    #[test]
    fn linked_config() {
        let dir = tempfile::tempdir().unwrap();
        let storage = dir.path().join("storage");
        std::fs::create_dir_all(&storage).unwrap();
        std::fs::write(
            storage.join("example.com.zone"),
            "example.com. 60 IN SOA ns. admin. 1 2 3 4 5\n",
        )
        .unwrap();
        let mut zone = ZoneFile::new(dir.path().join("base")).unwrap();
        zone.set_name("example.com.");
        zone.set_file(None, Some(&storage), None, true).unwrap();

        let mut primary = Knot::new(
            "primary",
            dir.path().join("primary"),
            "127.0.0.1:5300".parse().unwrap(),
            &binaries(),
        )
        .unwrap();
        let mut secondary = Knot::new(
            "secondary",
            dir.path().join("secondary"),
            "127.0.0.1:5301".parse().unwrap(),
            &binaries(),
        )
        .unwrap();
        std::fs::create_dir_all(dir.path().join("primary")).unwrap();
        std::fs::create_dir_all(dir.path().join("secondary")).unwrap();
        link(
            &[zone],
            &mut primary,
            &mut secondary,
            LinkOptions {
                ddns: true,
                ixfr: true,
                dnssec: false,
            },
        )
        .unwrap();

        assert!(primary.zone_file("example.com.").unwrap().path().exists());
        assert!(!secondary
            .zone_file("example.com.")
            .unwrap()
            .path()
            .exists());

        let mut primary_conf = Vec::new();
        primary.config().write(&mut primary_conf).unwrap();
        let primary_conf = String::from_utf8(primary_conf).unwrap();
        assert!(primary_conf.contains("    listen: 127.0.0.1@5300\n"));
        assert!(primary_conf
            .contains("  - id: remote1\n    address: 127.0.0.1@5301\n"));
        assert!(primary_conf.contains("    notify: [remote1]\n"));
        assert!(primary_conf.contains("    acl: [transfer, update]\n"));
        assert!(primary_conf.contains("    zonefile-load: difference\n"));

        let mut secondary_conf = Vec::new();
        secondary.config().write(&mut secondary_conf).unwrap();
        let secondary_conf = String::from_utf8(secondary_conf).unwrap();
        assert!(secondary_conf.contains("    master: remote1\n"));
        assert!(secondary_conf.contains("    acl: [notify]\n"));
        assert!(!secondary_conf.contains("dnssec-signing"));
    }
}
