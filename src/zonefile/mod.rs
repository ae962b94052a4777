//! Zone files and the operations the test scenarios perform on them.
//!
//! A zone is represented by a [`ZoneFile`]: the zone’s name plus a file in
//! a directory owned by the handle. The file content is handled as a
//! [`RecordSet`], a line-oriented model that can be written back without
//! disturbing lines that weren’t changed. The [`soa`] module adds reading
//! and rewriting of the SOA record’s serial and timers on top of it.
//!
//! All rewrites go through a temporary file that is renamed over the zone
//! file. Coordinating with a name server that writes the same file is up to
//! the caller: ask the server to flush before reading the file and don’t
//! edit a file while the server may be writing it.

pub use self::error::FormatError;
pub use self::line::{Line, LineKind, Record};
pub use self::set::RecordSet;
pub use self::soa::{SoaFields, SoaUpdate};

pub mod error;
pub mod generate;
pub mod line;
pub mod set;
pub mod soa;

use std::fs;
use std::path::{Path, PathBuf};

use rand::distributions::Alphanumeric;
use rand::Rng;
use tracing::{debug, info};

use crate::base::Serial;
use crate::context::{DefectKind, TestContext, SEP};
use crate::error::Error;

use self::generate::{GenerateParams, Nsec3Mode, ZoneGenerator};
use self::soa::SoaError;

//------------ ZoneFile ------------------------------------------------------

/// A zone and the file holding its content.
#[derive(Clone, Debug)]
pub struct ZoneFile {
    /// The directory the zone file lives in.
    file_dir: PathBuf,

    /// The directory for key material of signed zones.
    key_dir: PathBuf,

    /// The file name within `file_dir`.
    file_name: String,

    /// The absolute zone name, ending in a dot.
    name: String,

    /// The directory zone files are copied from.
    storage: Option<PathBuf>,

    /// The suffix number of the next backup copy.
    backup_num: u32,
}

impl ZoneFile {
    /// Creates a new handle with its files in `file_dir`.
    ///
    /// The directory is created if necessary. The handle has neither a
    /// name nor a file yet.
    pub fn new(file_dir: impl Into<PathBuf>) -> Result<Self, FormatError> {
        let file_dir = file_dir.into();
        fs::create_dir_all(&file_dir)
            .map_err(|err| FormatError::io(&file_dir, err))?;
        Ok(ZoneFile {
            key_dir: file_dir.join("keys"),
            file_dir,
            file_name: String::new(),
            name: String::new(),
            storage: None,
            backup_num: 1,
        })
    }

    /// Returns the zone name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sets the zone name.
    ///
    /// A trailing dot is added if missing.
    pub fn set_name(&mut self, name: &str) {
        self.name = name.into();
        if !self.name.ends_with('.') {
            self.name.push('.');
        }
    }

    /// Returns the path of the zone file.
    pub fn path(&self) -> PathBuf {
        self.file_dir.join(&self.file_name)
    }

    /// Returns the directory of the zone file.
    pub fn file_dir(&self) -> &Path {
        &self.file_dir
    }

    /// Returns the key directory.
    pub fn key_dir(&self) -> &Path {
        &self.key_dir
    }

    /// Returns the directory for legacy BIND key files.
    pub fn key_dir_bind(&self) -> PathBuf {
        self.key_dir.join("bind")
    }

    /// Makes a copy of an existing zone file.
    ///
    /// Without a file name, the name is `<zone>zone`. A relative file name
    /// is looked up in `storage`, which is remembered by the first call;
    /// without storage the directory of `file_name` is used. With a
    /// version the source file is `<file>.<version>`. If `exists` is false,
    /// only the file name is recorded and nothing is copied.
    pub fn set_file(
        &mut self,
        file_name: Option<&Path>,
        storage: Option<&Path>,
        version: Option<&str>,
        exists: bool,
    ) -> Result<(), FormatError> {
        let file_name = match file_name {
            Some(name) => name.to_path_buf(),
            None => PathBuf::from(format!("{}zone", self.name)),
        };
        self.file_name = file_name
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        if self.storage.is_none() {
            self.storage = Some(match storage {
                Some(storage) => storage.into(),
                None => file_name
                    .parent()
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            });
        }

        if !exists {
            return Ok(());
        }

        let mut src = if file_name.is_absolute() {
            file_name.clone()
        } else {
            self.storage
                .as_deref()
                .unwrap_or_else(|| Path::new(""))
                .join(&self.file_name)
        };
        if let Some(version) = version {
            let mut with_version = src.into_os_string();
            with_version.push(".");
            with_version.push(version);
            src = with_version.into();
        }

        fs::copy(&src, self.path()).map_err(|err| FormatError::io(&src, err))?;
        Ok(())
    }

    /// Replaces the zone file with a different one.
    pub fn upd_file(
        &mut self,
        file_name: Option<&Path>,
        storage: Option<&Path>,
        version: Option<&str>,
    ) -> Result<(), FormatError> {
        self.set_file(file_name, storage, version, true)
    }

    /// Generates a random zone file with the external generator.
    ///
    /// The file is called `<zone>rndzone`.
    pub async fn gen_file<R: Rng>(
        &mut self,
        generator: &ZoneGenerator,
        params: GenerateParams,
        rng: &mut R,
    ) -> Result<(), Error> {
        self.file_name = format!("{}rndzone", self.name);
        generator
            .generate(
                &self.name,
                &self.path(),
                &self.key_dir_bind(),
                params,
                rng,
            )
            .await?;
        debug!("zone {}: generated {}", self.name, self.path().display());
        Ok(())
    }

    /// Bumps the serial and has the generator add random records.
    ///
    /// A zone that contains signatures is re-signed, keeping NSEC3 if the
    /// zone has an NSEC3PARAM record. The previous content is kept as
    /// `<file>.old` while the generator runs and put back if it fails.
    pub async fn update_rnd(
        &mut self,
        generator: &ZoneGenerator,
    ) -> Result<(), Error> {
        self.update_soa(SoaUpdate::new())?;

        let path = self.path();
        let set = self.load()?;
        let dnssec = set.lines().iter().any(|line| line.contains("RRSIG"));
        let nsec3 = set.lines().iter().any(|line| line.contains("NSEC3PARAM"));

        let mut old_name = path.clone().into_os_string();
        old_name.push(".old");
        let old_path = PathBuf::from(old_name);
        fs::rename(&path, &old_path)
            .map_err(|err| FormatError::io(&path, err))?;

        let key_dir = self.key_dir_bind();
        let mode = if nsec3 { Nsec3Mode::Nsec3 } else { Nsec3Mode::Nsec };
        let res = generator
            .update(
                &self.name,
                &old_path,
                &path,
                dnssec.then_some((mode, key_dir.as_path())),
            )
            .await;
        match res {
            Ok(()) => {
                let _ = fs::remove_file(&old_path);
                Ok(())
            }
            Err(err) => {
                fs::rename(&old_path, &path)
                    .map_err(|err| FormatError::io(&old_path, err))?;
                Err(err.into())
            }
        }
    }

    /// Returns a handle for the same zone in a different directory.
    ///
    /// The zone file is copied if `exists` is true and the file exists.
    pub fn clone_to(
        &self,
        file_dir: impl Into<PathBuf>,
        exists: bool,
    ) -> Result<Self, FormatError> {
        let mut new = ZoneFile::new(file_dir)?;
        new.set_name(&self.name);
        let path = self.path();
        new.set_file(
            Some(&path),
            self.storage.as_deref(),
            None,
            exists && path.is_file(),
        )?;
        Ok(new)
    }

    /// Loads the current content of the zone file.
    pub fn load(&self) -> Result<RecordSet, FormatError> {
        RecordSet::load(self.path())
    }

    /// Saves new content into the zone file.
    pub fn save(&self, set: &RecordSet) -> Result<(), FormatError> {
        set.save(self.path())
    }

    /// Returns the number of records of the given type.
    ///
    /// This is only meaningful for a file freshly flushed by the server.
    pub fn count(&self, rtype: &str) -> Result<usize, FormatError> {
        Ok(self.load()?.count(rtype))
    }

    /// Checks that the zone has the expected number of records of a type.
    ///
    /// A mismatch is recorded as a defect in `ctx`.
    pub fn check_count(
        &self,
        ctx: &mut TestContext,
        expected: usize,
        rtype: &str,
    ) -> Result<bool, FormatError> {
        let found = self.count(rtype)?;
        if found == expected {
            return Ok(true);
        }
        ctx.record_defect(DefectKind::RecordCount, "ZONEFILE RR COUNT");
        ctx.check_log("ERROR: ZONEFILE RR COUNT");
        ctx.detail_log(&format!(
            "!Invalid RR count type={} zonefile={} {}!={}",
            rtype, self.name, found, expected
        ));
        ctx.detail_log(SEP);
        Ok(false)
    }

    /// Appends a record line to the zone file.
    pub fn append_record(
        &self,
        owner: &str,
        rtype: &str,
        rdata: &str,
    ) -> Result<(), FormatError> {
        let mut set = self.load()?;
        set.append_record(owner, rtype, rdata);
        self.save(&set)
    }

    /// Appends an AAAA record with a random address.
    pub fn append_rnd_aaaa<R: Rng>(
        &self,
        owner: &str,
        rng: &mut R,
    ) -> Result<(), FormatError> {
        let rdata = format!(
            "dead:beef:dead:beef:dead:beef:{:04x}:{:04x}",
            rng.gen_range(1..=65000u32),
            rng.gen_range(1..=65000u32)
        );
        self.append_record(owner, "AAAA", &rdata)
    }

    /// Appends a TXT record.
    ///
    /// Without `rdata` random upper case letters and digits are used, of
    /// length `rdlen` or of random length if that isn’t given either.
    pub fn append_rnd_txt<R: Rng>(
        &self,
        owner: &str,
        rdata: Option<&str>,
        rdlen: Option<usize>,
        rng: &mut R,
    ) -> Result<(), FormatError> {
        let rdata = match rdata {
            Some(rdata) => rdata.into(),
            None => {
                let len = rdlen.unwrap_or_else(|| rng.gen_range(1..=255));
                random_txt(rng, len)
            }
        };
        self.append_record(owner, "TXT", &rdata)
    }

    /// Returns the serial of the first SOA record.
    ///
    /// The file is re-read on every call.
    pub fn soa_serial(&self) -> Result<Serial, FormatError> {
        let set = self.load()?;
        let soa = set.soa().map_err(|err| self.soa_error(err))?;
        Ok(soa.serial)
    }

    /// Rewrites the SOA record.
    ///
    /// The serial is always rewritten: it is incremented by one unless
    /// `update` contains an explicit value. Other fields only change if
    /// given. Returns the new fields.
    pub fn update_soa(
        &self,
        update: SoaUpdate,
    ) -> Result<SoaFields, FormatError> {
        let mut set = self.load()?;
        let fields =
            set.update_soa(&update).map_err(|err| self.soa_error(err))?;
        self.save(&set)?;
        debug!("zone {}: SOA serial now {}", self.name, fields.serial);
        Ok(fields)
    }

    /// Inserts an NSEC3PARAM record and bumps the serial.
    pub fn enable_nsec3(
        &self,
        salt: &str,
        iterations: u16,
    ) -> Result<SoaFields, FormatError> {
        self.edit_with_soa(|set| {
            set.append_line(format!(
                "@ 0 NSEC3PARAM 1 0 {} {}",
                iterations, salt
            ))
        })
    }

    /// Removes any NSEC3PARAM record and bumps the serial.
    pub fn disable_nsec3(&self) -> Result<SoaFields, FormatError> {
        self.edit_with_soa(|set| {
            set.retain(|line| !line.contains("NSEC3PARAM"))
        })
    }

    /// Applies `op` and a serial bump to the file in a single save.
    fn edit_with_soa(
        &self,
        op: impl FnOnce(&mut RecordSet),
    ) -> Result<SoaFields, FormatError> {
        let mut set = self.load()?;
        op(&mut set);
        let fields = set
            .update_soa(&SoaUpdate::new())
            .map_err(|err| self.soa_error(err))?;
        self.save(&set)?;
        debug!("zone {}: SOA serial now {}", self.name, fields.serial);
        Ok(fields)
    }

    /// Makes a backup copy of the current zone file.
    ///
    /// Copies are called `<file>.back1`, `<file>.back2` and so on.
    pub fn backup(&mut self) -> Result<PathBuf, FormatError> {
        let path = self.path();
        let mut target = path.clone().into_os_string();
        target.push(format!(".back{}", self.backup_num));
        let target = PathBuf::from(target);
        fs::copy(&path, &target).map_err(|err| FormatError::io(&path, err))?;
        self.backup_num += 1;
        info!("zone {}: backup saved as {}", self.name, target.display());
        Ok(target)
    }

    /// Removes the zone file, ignoring errors.
    pub fn remove(&self) {
        let _ = fs::remove_file(self.path());
    }

    fn soa_error(&self, err: SoaError) -> FormatError {
        match err {
            SoaError::Missing => FormatError::MissingSoa { path: self.path() },
            SoaError::Malformed(idx) => FormatError::MalformedSoa {
                path: self.path(),
                line: idx + 1,
            },
        }
    }
}

/// Salt used by [`ZoneFile::enable_nsec3`] callers that don’t care.
pub const DEFAULT_NSEC3_SALT: &str = "abcdef";

/// Iterations used by [`ZoneFile::enable_nsec3`] callers that don’t care.
pub const DEFAULT_NSEC3_ITERATIONS: u16 = 2;

fn random_txt<R: Rng>(rng: &mut R, len: usize) -> String {
    rng.sample_iter(&Alphanumeric)
        .map(|ch| char::from(ch).to_ascii_uppercase())
        .take(len)
        .collect()
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::generate::test::{recorded_args, stub_generator};
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const ZONE: &str = "\
example.com. 3600 IN SOA ns.example.com. admin.example.com. 100 7200 900 86400 300
example.com. 3600 IN NS ns.example.com.
ns.example.com. 3600 IN A 192.0.2.53
";

    fn zone_in(dir: &Path) -> ZoneFile {
        fs::write(dir.join("example.com.zone"), ZONE).unwrap();
        let mut zone = ZoneFile::new(dir.join("work")).unwrap();
        zone.set_name("example.com");
        zone.set_file(None, Some(dir), None, true).unwrap();
        zone
    }

    #[test]
    fn set_file_copies_from_storage() {
        let dir = tempfile::tempdir().unwrap();
        let zone = zone_in(dir.path());
        assert_eq!(zone.name(), "example.com.");
        assert_eq!(zone.path(), dir.path().join("work/example.com.zone"));
        assert_eq!(fs::read_to_string(zone.path()).unwrap(), ZONE);
    }

    #[test]
    fn set_file_with_version() {
        let dir = tempfile::tempdir().unwrap();
        let mut zone = zone_in(dir.path());
        fs::write(dir.path().join("example.com.zone.2"), "; v2\n").unwrap();
        zone.upd_file(None, None, Some("2")).unwrap();
        assert_eq!(fs::read_to_string(zone.path()).unwrap(), "; v2\n");

        let err = zone.upd_file(None, None, Some("3")).unwrap_err();
        assert!(matches!(err, FormatError::Io { .. }));
    }

    #[test]
    fn update_soa_increments_by_one() {
        let dir = tempfile::tempdir().unwrap();
        let zone = zone_in(dir.path());
        let before = zone.load().unwrap().soa().unwrap();
        let after = zone.update_soa(SoaUpdate::new()).unwrap();
        assert_eq!(after.serial, Serial(101));
        assert_eq!(zone.soa_serial().unwrap(), Serial(101));
        assert_eq!(
            (after.refresh, after.retry, after.expire, after.minimum),
            (before.refresh, before.retry, before.expire, before.minimum)
        );

        let explicit = zone.update_soa(SoaUpdate::new().serial(Serial(7)));
        assert_eq!(explicit.unwrap().serial, Serial(7));
    }

    #[test]
    fn update_soa_without_soa() {
        let dir = tempfile::tempdir().unwrap();
        let zone = zone_in(dir.path());
        fs::write(zone.path(), "a.example.com. A 192.0.2.1\n").unwrap();
        assert!(matches!(
            zone.update_soa(SoaUpdate::new()),
            Err(FormatError::MissingSoa { .. })
        ));
        assert!(matches!(
            zone.soa_serial(),
            Err(FormatError::MissingSoa { .. })
        ));
    }

    #[test]
    fn nsec3_toggle() {
        let dir = tempfile::tempdir().unwrap();
        let zone = zone_in(dir.path());
        let before = zone.soa_serial().unwrap();

        let fields = zone
            .enable_nsec3(DEFAULT_NSEC3_SALT, DEFAULT_NSEC3_ITERATIONS)
            .unwrap();
        assert_eq!(fields.serial, before.add(1));
        let text = fs::read_to_string(zone.path()).unwrap();
        assert!(text.contains("@ 0 NSEC3PARAM 1 0 2 abcdef\n"));

        zone.disable_nsec3().unwrap();
        let text = fs::read_to_string(zone.path()).unwrap();
        assert!(!text.contains("NSEC3PARAM"));
        assert_eq!(zone.soa_serial().unwrap(), before.add(2));
    }

    #[test]
    fn nsec3_toggle_without_soa_leaves_file_alone() {
        let dir = tempfile::tempdir().unwrap();
        let zone = zone_in(dir.path());
        let text = "example.com. 3600 IN NS ns.example.com.\n";
        fs::write(zone.path(), text).unwrap();

        assert!(zone.enable_nsec3("ab", 1).is_err());
        assert_eq!(fs::read_to_string(zone.path()).unwrap(), text);
    }

    #[test]
    fn backups_are_numbered() {
        let dir = tempfile::tempdir().unwrap();
        let mut zone = zone_in(dir.path());
        let first = zone.backup().unwrap();
        let second = zone.backup().unwrap();
        assert!(first.ends_with("example.com.zone.back1"));
        assert!(second.ends_with("example.com.zone.back2"));
        assert_eq!(fs::read_to_string(second).unwrap(), ZONE);
    }

    #[test]
    fn append_random_records() {
        let dir = tempfile::tempdir().unwrap();
        let zone = zone_in(dir.path());
        let mut rng = StdRng::seed_from_u64(7);
        zone.append_rnd_aaaa("host.example.com.", &mut rng).unwrap();
        zone.append_rnd_txt("txt.example.com.", None, Some(16), &mut rng)
            .unwrap();
        zone.append_rnd_txt("fix.example.com.", Some("hello"), None, &mut rng)
            .unwrap();

        let set = zone.load().unwrap();
        assert_eq!(set.count("AAAA"), 1);
        assert_eq!(set.count("TXT"), 2);
        let txt = set
            .records()
            .find(|rec| rec.owner() == "txt.example.com.")
            .unwrap();
        assert_eq!(txt.rdata().len(), 16);
        assert!(txt
            .rdata()
            .chars()
            .all(|ch| ch.is_ascii_uppercase() || ch.is_ascii_digit()));
    }

    #[test]
    fn check_count_records_defect() {
        let dir = tempfile::tempdir().unwrap();
        let zone = zone_in(dir.path());
        let mut ctx = TestContext::new("count");
        assert!(zone.check_count(&mut ctx, 1, "A").unwrap());
        assert!(!ctx.has_error());
        assert!(!zone.check_count(&mut ctx, 2, "A").unwrap());
        assert_eq!(ctx.error_message(), Some("ZONEFILE RR COUNT"));
    }

    #[test]
    fn clone_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let zone = zone_in(dir.path());
        let copy = zone.clone_to(dir.path().join("other"), true).unwrap();
        assert_eq!(copy.name(), zone.name());
        assert_eq!(fs::read_to_string(copy.path()).unwrap(), ZONE);
        copy.remove();
        assert!(!copy.path().exists());
        assert!(zone.path().exists());
    }

    fn old_file(zone: &ZoneFile) -> PathBuf {
        let mut path = zone.path().into_os_string();
        path.push(".old");
        path.into()
    }

    async fn generated_zone(dir: &Path) -> (ZoneFile, ZoneGenerator, PathBuf) {
        let (gen, argv) = stub_generator(dir);
        let mut zone = ZoneFile::new(dir.join("work")).unwrap();
        zone.set_name("example.com");
        let params = GenerateParams {
            dnssec: Some(false),
            records: Some(5),
            serial: Some(Serial(10)),
            ..Default::default()
        };
        zone.gen_file(&gen, params, &mut StdRng::seed_from_u64(5))
            .await
            .unwrap();
        (zone, gen, argv)
    }

    #[tokio::test]
    async fn gen_file_with_generator() {
        let dir = tempfile::tempdir().unwrap();
        let (zone, _, argv) = generated_zone(dir.path()).await;

        assert_eq!(zone.path(), dir.path().join("work/example.com.rndzone"));
        let path = zone.path().display().to_string();
        assert_eq!(
            recorded_args(&argv),
            ["-i", "10", "-o", path.as_str(), "-c", "5", "example.com."]
        );
        assert_eq!(zone.count("A").unwrap(), 5);
        assert_eq!(zone.soa_serial().unwrap(), Serial(10));
    }

    #[tokio::test]
    async fn update_rnd_with_generator() {
        let dir = tempfile::tempdir().unwrap();
        let (mut zone, gen, argv) = generated_zone(dir.path()).await;

        zone.update_rnd(&gen).await.unwrap();
        let old = old_file(&zone);
        let old_arg = old.display().to_string();
        let path = zone.path().display().to_string();
        assert_eq!(
            recorded_args(&argv),
            [
                "-u",
                old_arg.as_str(),
                "-o",
                path.as_str(),
                "example.com."
            ]
        );
        assert!(!old.exists());
        assert_eq!(zone.count("A").unwrap(), 6);
        assert_eq!(zone.soa_serial().unwrap(), Serial(11));
    }

    #[tokio::test]
    async fn update_rnd_resigns_signed_zone() {
        let dir = tempfile::tempdir().unwrap();
        let (mut zone, gen, argv) = generated_zone(dir.path()).await;
        zone.enable_nsec3(DEFAULT_NSEC3_SALT, DEFAULT_NSEC3_ITERATIONS)
            .unwrap();
        zone.append_record(
            "example.com.",
            "RRSIG",
            "SOA 8 2 3600 20300101000000 20240101000000 1 example.com. AA==",
        )
        .unwrap();

        zone.update_rnd(&gen).await.unwrap();
        let args = recorded_args(&argv);
        let key_dir = zone.key_dir_bind().display().to_string();
        assert_eq!(args[..5], ["-s", "-3", "y", "-k", key_dir.as_str()]);
        assert!(zone.key_dir_bind().is_dir());
    }

    #[tokio::test]
    async fn failed_update_rnd_restores_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut zone, _, _) = generated_zone(dir.path()).await;

        let failing = ZoneGenerator::new("false");
        assert!(matches!(
            zone.update_rnd(&failing).await,
            Err(Error::Generator(generate::GenerateError::Failed { .. }))
        ));
        assert!(!old_file(&zone).exists());
        assert_eq!(zone.count("A").unwrap(), 5);
        assert_eq!(zone.soa_serial().unwrap(), Serial(11));
    }
}
