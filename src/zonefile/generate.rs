//! Driving the external random zone generator.
//!
//! The generator is a separate program that writes a random but
//! syntactically valid zone file, optionally DNSSEC-signed, or adds random
//! records to an existing one. It is expected to understand the option set
//! of the `zone_generate` tool:
//!
//! * `-n <count>` prints `count` random zone names,
//! * `-i <serial> -o <output> -c <records> <zone>` generates a zone,
//! * `-u <input> -o <output> <zone>` adds records to an existing zone,
//! * `-s -3 <y|n|0> -k <keydir>` signs the result, with NSEC3, NSEC, or
//!   NSEC3 with zero iterations,
//! * `-t <ttl>` uses a fixed TTL.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::{error, fmt, io};

use rand::Rng;
use tokio::process::Command;
use tracing::debug;

use crate::base::Serial;

//------------ Nsec3Mode -----------------------------------------------------

/// How a signed zone denies existence.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Nsec3Mode {
    /// Use NSEC records.
    Nsec,

    /// Use NSEC3 records.
    Nsec3,

    /// Use NSEC3 records with zero iterations and no salt.
    Nsec3Zero,
}

impl Nsec3Mode {
    fn as_arg(self) -> &'static str {
        match self {
            Nsec3Mode::Nsec => "n",
            Nsec3Mode::Nsec3 => "y",
            Nsec3Mode::Nsec3Zero => "0",
        }
    }
}

//------------ GenerateParams ------------------------------------------------

/// Parameters for generating a zone.
///
/// Everything left as `None` is chosen at random.
#[derive(Clone, Copy, Debug, Default)]
pub struct GenerateParams {
    pub dnssec: Option<bool>,
    pub nsec3: Option<Nsec3Mode>,
    pub records: Option<u32>,
    pub serial: Option<Serial>,
    pub ttl: Option<u32>,
}

//------------ ZoneGenerator -------------------------------------------------

/// The external zone generator.
#[derive(Clone, Debug)]
pub struct ZoneGenerator {
    program: PathBuf,
}

impl ZoneGenerator {
    /// Creates a generator running the given program.
    pub fn new(program: impl Into<PathBuf>) -> Self {
        ZoneGenerator {
            program: program.into(),
        }
    }

    /// Returns a random zone name.
    pub async fn zone_name(&self) -> Result<String, GenerateError> {
        let output = self.run(&["-n".into(), "1".into()]).await?;
        let name = output.trim();
        if name.is_empty() {
            return Err(GenerateError::EmptyOutput);
        }
        Ok(name.into())
    }

    /// Generates a fresh zone file at `output`.
    pub async fn generate<R: Rng>(
        &self,
        zone: &str,
        output: &Path,
        key_dir: &Path,
        params: GenerateParams,
        rng: &mut R,
    ) -> Result<(), GenerateError> {
        let dnssec = params.dnssec.unwrap_or_else(|| rng.gen());
        let nsec3 = params.nsec3.unwrap_or_else(|| {
            match rng.gen_range(0..3) {
                0 => Nsec3Mode::Nsec,
                1 => Nsec3Mode::Nsec3,
                _ => Nsec3Mode::Nsec3Zero,
            }
        });
        let records = params.records.unwrap_or_else(|| rng.gen_range(1..=200));
        let serial = params
            .serial
            .unwrap_or_else(|| Serial(rng.gen_range(1..=u32::MAX)));

        let mut args: Vec<String> = Vec::new();
        if let Some(ttl) = params.ttl {
            args.extend(["-t".into(), ttl.to_string()]);
        }
        if dnssec {
            Self::prepare_key_dir(key_dir)?;
            args.extend(Self::sign_args(nsec3, key_dir));
        }
        args.extend([
            "-i".into(),
            serial.to_string(),
            "-o".into(),
            output.display().to_string(),
            "-c".into(),
            records.to_string(),
            zone.into(),
        ]);
        self.run(&args).await.map(|_| ())
    }

    /// Adds random records from `input` into a new file at `output`.
    ///
    /// If `dnssec` is given, the result is re-signed with the keys in
    /// `key_dir`.
    pub async fn update(
        &self,
        zone: &str,
        input: &Path,
        output: &Path,
        dnssec: Option<(Nsec3Mode, &Path)>,
    ) -> Result<(), GenerateError> {
        let mut args: Vec<String> = Vec::new();
        if let Some((nsec3, key_dir)) = dnssec {
            Self::prepare_key_dir(key_dir)?;
            args.extend(Self::sign_args(nsec3, key_dir));
        }
        args.extend([
            "-u".into(),
            input.display().to_string(),
            "-o".into(),
            output.display().to_string(),
            zone.into(),
        ]);
        self.run(&args).await.map(|_| ())
    }

    fn sign_args(nsec3: Nsec3Mode, key_dir: &Path) -> [String; 5] {
        [
            "-s".into(),
            "-3".into(),
            nsec3.as_arg().into(),
            "-k".into(),
            key_dir.display().to_string(),
        ]
    }

    fn prepare_key_dir(key_dir: &Path) -> Result<(), GenerateError> {
        std::fs::create_dir_all(key_dir).map_err(GenerateError::Io)
    }

    async fn run(&self, args: &[String]) -> Result<String, GenerateError> {
        debug!("running {} {}", self.program.display(), args.join(" "));
        let output = Command::new(&self.program)
            .args(args)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(GenerateError::Io)?;
        if !output.status.success() {
            return Err(GenerateError::Failed {
                status: output.status.code(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().into(),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

//------------ GenerateError -------------------------------------------------

/// Running the zone generator failed.
#[derive(Debug)]
pub enum GenerateError {
    /// The generator could not be run or its key directory not created.
    Io(io::Error),

    /// The generator exited unsuccessfully.
    Failed {
        status: Option<i32>,
        stderr: String,
    },

    /// The generator didn’t print anything when asked for a name.
    EmptyOutput,
}

impl fmt::Display for GenerateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            GenerateError::Io(err) => {
                write!(f, "can't run zone generator: {}", err)
            }
            GenerateError::Failed { status, stderr } => {
                match status {
                    Some(code) => {
                        write!(f, "zone generator exited with {}", code)?
                    }
                    None => write!(f, "zone generator was killed")?,
                }
                if !stderr.is_empty() {
                    write!(f, ": {}", stderr)?;
                }
                Ok(())
            }
            GenerateError::EmptyOutput => {
                write!(f, "zone generator returned no output")
            }
        }
    }
}

impl error::Error for GenerateError {}

//============ Testing =======================================================

#[cfg(test)]
pub(crate) mod test {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;

    /// A generator understanding the options well enough for tests.
    ///
    /// Each run leaves its arguments, one per line, in the returned file.
    /// Generated zones have an A record per requested record, updates add
    /// one A record to the input.
    const SCRIPT: &str = r#"#!/bin/sh
printf '%s\n' "$@" > "$ARGV"
out= in= serial=1 count=0 zone=
while [ $# -gt 0 ]; do
    case "$1" in
        -n) echo stub.example.com.; exit 0 ;;
        -o) out=$2; shift ;;
        -u) in=$2; shift ;;
        -i) serial=$2; shift ;;
        -c) count=$2; shift ;;
        -3|-k|-t) shift ;;
        -s) ;;
        *) zone=$1 ;;
    esac
    shift
done
if [ -n "$in" ]; then
    cp "$in" "$out" || exit 1
    echo "added.$zone 60 IN A 192.0.2.200" >> "$out"
else
    echo "$zone 3600 IN SOA ns.$zone admin.$zone $serial 7200 900 86400 300" \
        > "$out"
    i=0
    while [ $i -lt $count ]; do
        i=$((i + 1))
        echo "h$i.$zone 60 IN A 192.0.2.$i" >> "$out"
    done
fi
"#;

    pub(crate) fn stub_generator(dir: &Path) -> (ZoneGenerator, PathBuf) {
        let argv = dir.join("generator.argv");
        let program = dir.join("zone_generate");
        let script = SCRIPT.replace("$ARGV", &argv.display().to_string());
        fs::write(&program, script).unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755))
            .unwrap();
        (ZoneGenerator::new(program), argv)
    }

    pub(crate) fn recorded_args(argv: &Path) -> Vec<String> {
        fs::read_to_string(argv)
            .unwrap()
            .lines()
            .map(Into::into)
            .collect()
    }

    fn strings(args: &[&str]) -> Vec<String> {
        args.iter().map(|arg| arg.to_string()).collect()
    }

    #[tokio::test]
    async fn missing_program() {
        let gen = ZoneGenerator::new("/nonexistent/zone_generate");
        assert!(matches!(
            gen.zone_name().await,
            Err(GenerateError::Io(_))
        ));
    }

    #[tokio::test]
    async fn failing_program() {
        let dir = tempfile::tempdir().unwrap();
        let gen = ZoneGenerator::new("false");
        let err = gen
            .generate(
                "example.com.",
                &dir.path().join("example.com.rndzone"),
                &dir.path().join("keys"),
                GenerateParams {
                    dnssec: Some(false),
                    ..Default::default()
                },
                &mut StdRng::seed_from_u64(1),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, GenerateError::Failed { status: Some(1), .. }));
    }

    #[tokio::test]
    async fn zone_name() {
        let dir = tempfile::tempdir().unwrap();
        let (gen, argv) = stub_generator(dir.path());
        assert_eq!(gen.zone_name().await.unwrap(), "stub.example.com.");
        assert_eq!(recorded_args(&argv), strings(&["-n", "1"]));
    }

    #[tokio::test]
    async fn generate_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let (gen, argv) = stub_generator(dir.path());
        let output = dir.path().join("example.com.rndzone");
        let key_dir = dir.path().join("keys/bind");
        gen.generate(
            "example.com.",
            &output,
            &key_dir,
            GenerateParams {
                dnssec: Some(true),
                nsec3: Some(Nsec3Mode::Nsec3Zero),
                records: Some(3),
                serial: Some(Serial(42)),
                ttl: Some(60),
            },
            &mut StdRng::seed_from_u64(1),
        )
        .await
        .unwrap();

        let key_arg = key_dir.display().to_string();
        let out_arg = output.display().to_string();
        assert_eq!(
            recorded_args(&argv),
            strings(&[
                "-t",
                "60",
                "-s",
                "-3",
                "0",
                "-k",
                key_arg.as_str(),
                "-i",
                "42",
                "-o",
                out_arg.as_str(),
                "-c",
                "3",
                "example.com.",
            ])
        );
        assert!(key_dir.is_dir());
        let text = fs::read_to_string(&output).unwrap();
        assert_eq!(text.lines().count(), 4);
    }

    #[tokio::test]
    async fn unsigned_generate_has_no_key_dir() {
        let dir = tempfile::tempdir().unwrap();
        let (gen, argv) = stub_generator(dir.path());
        let key_dir = dir.path().join("keys");
        gen.generate(
            "example.com.",
            &dir.path().join("out"),
            &key_dir,
            GenerateParams {
                dnssec: Some(false),
                ..Default::default()
            },
            &mut StdRng::seed_from_u64(3),
        )
        .await
        .unwrap();
        let args = recorded_args(&argv);
        assert!(!args.iter().any(|arg| arg == "-s" || arg == "-k"));
        assert_eq!(args[0], "-i");
        assert!(!key_dir.exists());
    }

    #[tokio::test]
    async fn update_arguments() {
        let dir = tempfile::tempdir().unwrap();
        let (gen, argv) = stub_generator(dir.path());
        let input = dir.path().join("in");
        let output = dir.path().join("out");
        let key_dir = dir.path().join("keys");
        fs::write(&input, "").unwrap();
        gen.update(
            "example.com.",
            &input,
            &output,
            Some((Nsec3Mode::Nsec3, &key_dir)),
        )
        .await
        .unwrap();

        let key_arg = key_dir.display().to_string();
        let in_arg = input.display().to_string();
        let out_arg = output.display().to_string();
        assert_eq!(
            recorded_args(&argv),
            strings(&[
                "-s",
                "-3",
                "y",
                "-k",
                key_arg.as_str(),
                "-u",
                in_arg.as_str(),
                "-o",
                out_arg.as_str(),
                "example.com.",
            ])
        );
        assert_eq!(
            fs::read_to_string(&output).unwrap(),
            "added.example.com. 60 IN A 192.0.2.200\n"
        );
    }
}
