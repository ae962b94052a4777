//! Driving a primary and a secondary through rounds of changes.
//!
//! A [`Scenario`] takes two servers with a set of linked zones and runs
//! the following sequence:
//!
//! 1. Wait until both servers serve the same serial for every zone. This
//!    is the baseline.
//! 2. For a configured number of rounds:
//!    * send a random dynamic update for every zone to the primary,
//!    * wait until the primary serves a newer serial and the secondary has
//!      caught up with it, then have the primary write its zone files,
//!    * compare the zone content of both servers via AXFR,
//!    * have the secondary write its zone files and verify them.
//!
//! Servers that don’t converge within the timeout end the scenario with an
//! error. Differing zone content and failed verification are recorded as
//! defects in the scenario’s [`TestContext`] and the remaining rounds still
//! run. The outcome is summarized in a [`Report`].

use std::fmt;
use std::time::Duration;

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::time::{sleep, Instant};
use tracing::{debug, info};

use crate::base::Serial;
use crate::config::ScenarioConfig;
use crate::context::{Defect, TestContext};
use crate::error::Error;
use crate::server::{ServerControl, ServerError};
use crate::update::Update;
use crate::verify::{CheckResult, Verifier};
use crate::zonefile::Record;

//------------ Phase ---------------------------------------------------------

/// The phase a scenario is in.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    Init,
    AwaitInitialConvergence,
    Mutate { round: usize },
    AwaitRoundConvergence { round: usize },
    DiffCompare { round: usize },
    FlushAndVerify { round: usize },
    Done,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Phase::Init => f.write_str("init"),
            Phase::AwaitInitialConvergence => {
                f.write_str("awaiting initial convergence")
            }
            Phase::Mutate { round } => write!(f, "round {}: mutate", round),
            Phase::AwaitRoundConvergence { round } => {
                write!(f, "round {}: awaiting convergence", round)
            }
            Phase::DiffCompare { round } => {
                write!(f, "round {}: comparing", round)
            }
            Phase::FlushAndVerify { round } => {
                write!(f, "round {}: verifying", round)
            }
            Phase::Done => f.write_str("done"),
        }
    }
}

//------------ ConvergenceState ----------------------------------------------

/// The serials of a zone observed while waiting for convergence.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ConvergenceState {
    /// The serial the primary must advance beyond.
    ///
    /// This is `None` if the serial doesn’t need to change, i.e., during
    /// initial convergence or if no change was sent in this round.
    pub previous: Option<Serial>,

    /// The serial last reported by the primary.
    pub primary: Option<Serial>,

    /// The serial last reported by the secondary.
    pub secondary: Option<Serial>,
}

impl ConvergenceState {
    /// Creates a state for a zone that has to advance beyond `previous`.
    pub fn new(previous: Option<Serial>) -> Self {
        ConvergenceState {
            previous,
            primary: None,
            secondary: None,
        }
    }

    /// Returns whether the primary has advanced far enough.
    pub fn primary_advanced(&self) -> bool {
        match (self.primary, self.previous) {
            (Some(primary), Some(previous)) => primary > previous,
            (Some(_), None) => true,
            (None, _) => false,
        }
    }

    /// Returns whether the zone has converged.
    ///
    /// This is the case when both servers report the same serial and that
    /// serial is newer than the previous one.
    pub fn is_converged(&self) -> bool {
        self.primary_advanced() && self.secondary == self.primary
    }
}

//------------ Report --------------------------------------------------------

/// What happened to one zone in one round.
#[derive(Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct ZoneRound {
    pub zone: String,

    /// The number of counted changes sent to the primary.
    pub changes: usize,

    pub convergence: ConvergenceState,
    pub checks: Vec<CheckResult>,
}

/// What happened in one round.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct RoundReport {
    pub round: usize,
    pub zones: Vec<ZoneRound>,
}

/// The outcome of a scenario that ran to completion.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct Report {
    /// The name of the test case.
    pub case: String,

    /// The serials both servers agreed on before the first round.
    pub baseline: Vec<ConvergenceState>,

    pub rounds: Vec<RoundReport>,

    /// All defects in the order they were found.
    pub defects: Vec<Defect>,

    /// The message of the first defect.
    pub error: Option<String>,
}

impl Report {
    /// Returns whether no defect was found.
    pub fn is_ok(&self) -> bool {
        self.defects.is_empty() && self.error.is_none()
    }
}

//------------ Scenario ------------------------------------------------------

/// A convergence scenario for a primary and a secondary server.
pub struct Scenario<P, S> {
    primary: P,
    secondary: S,

    /// The names of the zones linked between the servers.
    zones: Vec<String>,

    config: ScenarioConfig,
    verifier: Verifier,
    rng: StdRng,
    ctx: TestContext,
    phase: Phase,
}

impl<P: ServerControl, S: ServerControl> Scenario<P, S> {
    /// Creates a new scenario.
    ///
    /// The zones must already be linked between the two servers and the
    /// servers must be running.
    pub fn new(
        primary: P,
        secondary: S,
        zones: Vec<String>,
        config: ScenarioConfig,
        ctx: TestContext,
    ) -> Self {
        let rng = match config.seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Scenario {
            primary,
            secondary,
            zones,
            verifier: Verifier::new(config.checks().to_vec()),
            config,
            rng,
            ctx,
            phase: Phase::Init,
        }
    }

    /// Returns the current phase.
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Returns the test context.
    pub fn context(&self) -> &TestContext {
        &self.ctx
    }

    /// Returns the primary server.
    pub fn primary(&self) -> &P {
        &self.primary
    }

    /// Returns the secondary server.
    pub fn secondary(&self) -> &S {
        &self.secondary
    }

    /// Runs all rounds of the scenario.
    pub async fn run(&mut self) -> Result<Report, Error> {
        let mut report = Report {
            case: self.ctx.case().into(),
            ..Default::default()
        };

        self.enter(Phase::AwaitInitialConvergence);
        let none = vec![None; self.zones.len()];
        report.baseline = self.zones_wait(&none).await?;
        let mut serials: Vec<_> =
            report.baseline.iter().map(|state| state.primary).collect();

        for round in 1..=self.config.rounds() {
            self.enter(Phase::Mutate { round });
            let changes = self.random_ddns().await?;

            self.enter(Phase::AwaitRoundConvergence { round });
            let previous: Vec<_> = serials
                .iter()
                .zip(&changes)
                .map(|(serial, changes)| serial.filter(|_| *changes > 0))
                .collect();
            let states = self.zones_wait(&previous).await?;
            self.primary.flush(None, true).await?;
            serials = states.iter().map(|state| state.primary).collect();

            self.enter(Phase::DiffCompare { round });
            self.xfr_diff().await?;

            self.enter(Phase::FlushAndVerify { round });
            self.secondary.flush(None, true).await?;
            let checks = self.zone_verify().await?;

            report.rounds.push(RoundReport {
                round,
                zones: self
                    .zones
                    .iter()
                    .zip(changes)
                    .zip(states)
                    .zip(checks)
                    .map(|(((zone, changes), convergence), checks)| {
                        ZoneRound {
                            zone: zone.clone(),
                            changes,
                            convergence,
                            checks,
                        }
                    })
                    .collect(),
            });
        }

        self.enter(Phase::Done);
        report.defects = self.ctx.take_defects();
        report.error = self.ctx.error_message().map(Into::into);
        Ok(report)
    }

    /// Waits until every zone has converged.
    ///
    /// The primary must first serve a serial newer than the zone’s entry
    /// in `previous`. Then the secondary must serve the same serial. Each
    /// of the two waits is bounded by the configured timeout.
    pub async fn zones_wait(
        &mut self,
        previous: &[Option<Serial>],
    ) -> Result<Vec<ConvergenceState>, Error> {
        let mut res = Vec::with_capacity(self.zones.len());
        for (zone, previous) in self.zones.iter().zip(previous) {
            let mut state = ConvergenceState::new(*previous);
            self.ctx.check_log(&format!(
                "Waiting for zone {} to converge (previous {})",
                zone,
                display_serial(state.previous),
            ));

            let primary = poll_serial(
                &self.primary,
                zone,
                self.config.poll_interval(),
                self.config.timeout(),
                |serial| {
                    ConvergenceState {
                        primary: Some(serial),
                        ..state
                    }
                    .primary_advanced()
                },
            )
            .await?;
            state.primary = primary.last();
            let primary = match primary {
                Poll::Reached(serial) => serial,
                Poll::TimedOut(observed) => {
                    return Err(timeout(&self.primary, zone, state, observed))
                }
            };

            let secondary = poll_serial(
                &self.secondary,
                zone,
                self.config.poll_interval(),
                self.config.timeout(),
                |serial| serial == primary,
            )
            .await?;
            state.secondary = secondary.last();
            if let Poll::TimedOut(observed) = secondary {
                return Err(timeout(&self.secondary, zone, state, observed));
            }

            debug!("zone {} converged at serial {}", zone, primary);
            res.push(state);
        }
        Ok(res)
    }

    /// Sends a random update for every zone to the primary.
    ///
    /// The updates are generated from the primary’s zone files. Returns
    /// the number of counted changes per zone.
    pub async fn random_ddns(&mut self) -> Result<Vec<usize>, Error> {
        let mut res = Vec::with_capacity(self.zones.len());
        for zone in &self.zones {
            let zone_file = self
                .primary
                .zone_file(zone)
                .ok_or_else(|| ServerError::UnknownZone(zone.clone()))?;

            let mut attempt = 0;
            let (update, plan) = loop {
                attempt += 1;
                let mut update = Update::new(zone)?;
                let plan = zone_file.gen_rnd_ddns(
                    &mut update,
                    self.config.allow_ns(),
                    &mut self.rng,
                )?;
                if !plan.is_empty() || self.config.allow_empty() {
                    break (update, plan);
                }
                debug!("zone {}: empty update, attempt {}", zone, attempt);
                if attempt >= self.config.mutation_attempts() {
                    return Err(Error::EmptyMutation {
                        zone: zone.clone(),
                        attempts: attempt,
                    });
                }
            };

            info!(
                "zone {}: {} changes ({} deleted, {} added, {} skipped)",
                zone,
                plan.changes(),
                plan.deleted(),
                plan.added(),
                plan.skipped()
            );
            if !update.is_empty() {
                self.primary.update(&update).await?;
            }
            res.push(plan.changes());
        }
        Ok(res)
    }

    /// Compares the zone content of both servers.
    ///
    /// Differences are recorded as defects.
    pub async fn xfr_diff(&mut self) -> Result<bool, Error> {
        let mut same = true;
        for zone in &self.zones {
            self.ctx.check_log(&format!("Checking AXFR diff for {}", zone));
            let primary = normalized_transfer(&self.primary, zone).await?;
            let secondary = normalized_transfer(&self.secondary, zone).await?;
            if self.ctx.compare_sections(
                &primary,
                self.primary.name(),
                &secondary,
                self.secondary.name(),
                &format!("AXFR {}", zone),
            ) {
                same = false;
            }
        }
        Ok(same)
    }

    /// Verifies the secondary’s zone files.
    ///
    /// Returns the check results per zone.
    pub async fn zone_verify(
        &mut self,
    ) -> Result<Vec<Vec<CheckResult>>, Error> {
        let mut res = Vec::with_capacity(self.zones.len());
        for zone in &self.zones {
            let zone_file = self
                .secondary
                .zone_file(zone)
                .ok_or_else(|| ServerError::UnknownZone(zone.clone()))?;
            res.push(self.verifier.verify(zone_file, &mut self.ctx).await);
        }
        Ok(res)
    }

    fn enter(&mut self, phase: Phase) {
        debug!("{}: {}", self.ctx.case(), phase);
        self.phase = phase;
    }
}

//------------ Helpers -------------------------------------------------------

/// The outcome of polling a server for a zone’s serial.
enum Poll {
    /// An acceptable serial was served.
    Reached(Serial),

    /// Time ran out. Contains the last serial served, if any.
    TimedOut(Option<Serial>),
}

impl Poll {
    fn last(&self) -> Option<Serial> {
        match *self {
            Poll::Reached(serial) => Some(serial),
            Poll::TimedOut(serial) => serial,
        }
    }
}

/// Polls a server until it serves an acceptable serial or time runs out.
async fn poll_serial<C: ServerControl>(
    server: &C,
    zone: &str,
    interval: Duration,
    timeout: Duration,
    accept: impl Fn(Serial) -> bool,
) -> Result<Poll, ServerError> {
    let deadline = Instant::now() + timeout;
    loop {
        let serial = server.zone_serial(zone).await?;
        if let Some(serial) = serial {
            if accept(serial) {
                return Ok(Poll::Reached(serial));
            }
        }
        if Instant::now() >= deadline {
            return Ok(Poll::TimedOut(serial));
        }
        sleep(interval).await;
    }
}

fn timeout<C: ServerControl>(
    server: &C,
    zone: &str,
    state: ConvergenceState,
    observed: Option<Serial>,
) -> Error {
    Error::ConvergenceTimeout {
        server: server.name().into(),
        zone: zone.into(),
        previous: state.previous,
        primary: state.primary.filter(|_| state.primary_advanced()),
        observed,
    }
}

async fn normalized_transfer<C: ServerControl>(
    server: &C,
    zone: &str,
) -> Result<Vec<Record>, ServerError> {
    Ok(server.transfer(zone).await?.normalized().into_iter().collect())
}

fn display_serial(serial: Option<Serial>) -> String {
    match serial {
        Some(serial) => serial.to_string(),
        None => "none".into(),
    }
}

//============ Testing =======================================================
