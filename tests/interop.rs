//! Runs a scenario against real name servers.
//!
//! A signing Knot DNS primary feeds a BIND secondary. The daemons
//! `knotd` and `named` are taken from `ZONESTRESS_KNOTD` and
//! `ZONESTRESS_NAMED` or looked up in `PATH`. The control tools come from
//! the usual [`Binaries`] variables.
//!
//! The test is ignored by default. Run it with
//! `cargo test --features interop -- --ignored`.

use std::net::SocketAddr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use std::{env, fs};

use tokio::process::{Child, Command};
use tokio::time::sleep;
use zonestress::config::{Binaries, ScenarioConfig};
use zonestress::context::TestContext;
use zonestress::logging::init_logging;
use zonestress::scenario::Scenario;
use zonestress::server::{link, Bind, Knot, LinkOptions};
use zonestress::zonefile::ZoneFile;

const ZONE: &str = "\
$ORIGIN example.com.
$TTL 3600
@       IN SOA  ns1 hostmaster 1 7200 900 86400 300
@       IN NS   ns1
@       IN MX   10 mail
ns1     IN A    127.0.0.1
mail    IN A    192.0.2.25
www     IN A    192.0.2.80
www     IN AAAA 2001:db8::80
ftp     IN A    192.0.2.21
info    IN TXT  \"zone under test\"
";

fn daemon(var: &str, default: &str, args: &[&str]) -> Child {
    let program = env::var(var).unwrap_or_else(|_| default.into());
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .kill_on_drop(true)
        .spawn()
        .unwrap()
}

fn source_zone(dir: &Path) -> ZoneFile {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("example.com.zone"), ZONE).unwrap();
    let mut zone = ZoneFile::new(dir).unwrap();
    zone.set_name("example.com.");
    zone.set_file(None, Some(dir), None, false).unwrap();
    zone
}

#[tokio::test]
#[ignore]
async fn knot_to_bind() {
    init_logging();
    let binaries = Binaries::from_env().unwrap();
    let dir = tempfile::tempdir().unwrap();
    let primary_addr: SocketAddr = "127.0.0.1:54331".parse().unwrap();
    let secondary_addr: SocketAddr = "127.0.0.1:54332".parse().unwrap();

    let mut primary = Knot::new(
        "knot",
        dir.path().join("knot"),
        primary_addr,
        &binaries,
    )
    .unwrap();
    let mut secondary = Bind::new(
        "bind",
        dir.path().join("bind"),
        secondary_addr,
        "127.0.0.1:54333".parse().unwrap(),
        &binaries,
    )
    .unwrap();
    let zones = vec![source_zone(&dir.path().join("source"))];
    link(
        &zones,
        &mut primary,
        &mut secondary,
        LinkOptions {
            ddns: true,
            ixfr: true,
            dnssec: true,
        },
    )
    .unwrap();

    let knot_conf = primary.write_config().unwrap();
    let bind_conf = secondary.write_config().unwrap();
    let mut knotd = daemon(
        "ZONESTRESS_KNOTD",
        "knotd",
        &["-c", &knot_conf.to_string_lossy()],
    );
    let mut named = daemon(
        "ZONESTRESS_NAMED",
        "named",
        &["-g", "-c", &bind_conf.to_string_lossy()],
    );
    sleep(Duration::from_secs(1)).await;
    assert!(knotd.try_wait().unwrap().is_none(), "knotd didn't start");
    assert!(named.try_wait().unwrap().is_none(), "named didn't start");

    let mut config = ScenarioConfig::new();
    config.set_rounds(3);
    config.set_timeout(Duration::from_secs(30));
    config.set_checks(binaries.checks());
    let mut scenario = Scenario::new(
        primary,
        secondary,
        vec!["example.com.".into()],
        config,
        TestContext::new("interop/knot_to_bind"),
    );
    let report = scenario.run().await.unwrap();
    assert!(report.is_ok(), "{:?}", report.defects);
    assert_eq!(report.rounds.len(), 3);
}
