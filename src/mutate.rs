//! Random dynamic updates.
//!
//! [`random_ddns`] walks the records of a zone and proposes deletions of
//! existing records and additions of copies with a prefixed owner name. The
//! proposals go to an [`UpdateSink`]. Records that are maintained by the
//! server or by signing are never touched.
//!
//! Every proposal results in an [`Attempt`]. A proposal the sink rejects
//! because the synthetic input is malformed is skipped and not counted.
//! The resulting [`MutationPlan`] carries the number of changes that the
//! sink accepted, which callers use to make sure a round actually changed
//! something.

use rand::Rng;
use tracing::trace;

use crate::update::{UpdateError, UpdateSink};
use crate::zonefile::{FormatError, Record, RecordSet, ZoneFile};

/// Record types that are never mutated.
///
/// These are maintained by the server or by signing. Editing them would
/// desynchronize signatures from content.
const IMMUTABLE: &[&str] = &[
    "SOA",
    "RRSIG",
    "DNSKEY",
    "DS",
    "CDS",
    "CDNSKEY",
    "NSEC",
    "NSEC3",
    "NSEC3PARAM",
];

/// Record types that are never copied to a prefixed owner.
const NO_COPY: &[&str] = &["DNAME", "TYPE39"];

/// The label prepended to the owner of added records.
pub const ADD_PREFIX: &str = "xyz.";

/// The longest owner name in presentation format that still fits the wire.
const MAX_OWNER_LEN: usize = 254;

/// The number of sides of the die.
const DIE: u32 = 20;

/// Outcomes of a die roll that lead to a deletion.
const DELETE_ROLLS: [u32; 2] = [4, 5];

/// Outcomes of a die roll that lead to an addition.
const ADD_ROLLS: [u32; 2] = [2, 3];

//------------ Attempt -------------------------------------------------------

/// The outcome of a single proposed change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Attempt {
    /// The change was accepted and counts.
    Applied,

    /// The change was accepted but doesn’t count.
    ///
    /// This is the deletion of an apex NS record. It is still submitted so
    /// the server gets to exercise its handling of such requests, but the
    /// server may legitimately ignore it.
    Uncounted,

    /// The change was rejected because its input was malformed.
    Skip(UpdateError),
}

impl Attempt {
    fn from_result(res: Result<(), UpdateError>, counted: bool) -> Self {
        match res {
            Ok(()) if counted => Attempt::Applied,
            Ok(()) => Attempt::Uncounted,
            Err(err) => Attempt::Skip(err),
        }
    }
}

//------------ MutationPlan --------------------------------------------------

/// A summary of the changes proposed for a zone.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct MutationPlan {
    deleted: usize,
    added: usize,
    uncounted: usize,
    skipped: usize,
}

impl MutationPlan {
    /// Returns the number of changes that count.
    pub fn changes(&self) -> usize {
        self.deleted + self.added
    }

    /// Returns the number of counted deletions.
    pub fn deleted(&self) -> usize {
        self.deleted
    }

    /// Returns the number of additions.
    pub fn added(&self) -> usize {
        self.added
    }

    /// Returns the number of submitted apex NS deletions.
    pub fn uncounted(&self) -> usize {
        self.uncounted
    }

    /// Returns the number of rejected proposals.
    pub fn skipped(&self) -> usize {
        self.skipped
    }

    /// Returns whether no counted change was made.
    pub fn is_empty(&self) -> bool {
        self.changes() == 0
    }

    fn record(&mut self, attempt: &Attempt, delete: bool) {
        match attempt {
            Attempt::Applied if delete => self.deleted += 1,
            Attempt::Applied => self.added += 1,
            Attempt::Uncounted => self.uncounted += 1,
            Attempt::Skip(_) => self.skipped += 1,
        }
    }
}

//------------ random_ddns ---------------------------------------------------

/// Proposes random changes to the records of `set`.
///
/// Each eligible record is deleted with a probability of 10% and, again
/// with a probability of 10%, copied to the owner name prefixed with
/// [`ADD_PREFIX`]. NS records are only eligible if `allow_ns` is true.
pub fn random_ddns<R, U>(
    set: &RecordSet,
    sink: &mut U,
    allow_ns: bool,
    rng: &mut R,
) -> MutationPlan
where
    R: Rng + ?Sized,
    U: UpdateSink + ?Sized,
{
    let mut plan = MutationPlan::default();
    for record in set.records() {
        if !is_mutable(record, allow_ns) {
            continue;
        }

        if DELETE_ROLLS.contains(&rng.gen_range(1..=DIE)) {
            let attempt = propose_delete(record, sink);
            plan.record(&attempt, true);
        }

        if ADD_ROLLS.contains(&rng.gen_range(1..=DIE)) {
            if let Some(attempt) = propose_add(record, sink) {
                plan.record(&attempt, false);
            }
        }
    }
    trace!(
        "random update for {}: {} deleted, {} added, {} uncounted, {} skipped",
        sink.origin(),
        plan.deleted,
        plan.added,
        plan.uncounted,
        plan.skipped
    );
    plan
}

fn is_mutable(record: &Record, allow_ns: bool) -> bool {
    if IMMUTABLE.iter().any(|rtype| record.is_type(rtype)) {
        return false;
    }
    allow_ns || !record.is_type("NS")
}

fn propose_delete<U: UpdateSink + ?Sized>(
    record: &Record,
    sink: &mut U,
) -> Attempt {
    let counted =
        !(record.is_type("NS") && same_name(record.owner(), sink.origin()));
    let res =
        sink.delete(record.owner(), record.rtype(), Some(record.rdata()));
    let attempt = Attempt::from_result(res, counted);
    trace!("delete {}: {:?}", record, attempt);
    attempt
}

fn propose_add<U: UpdateSink + ?Sized>(
    record: &Record,
    sink: &mut U,
) -> Option<Attempt> {
    if NO_COPY.iter().any(|rtype| record.is_type(rtype)) {
        return None;
    }
    if ADD_PREFIX.len() + record.owner().len() > MAX_OWNER_LEN {
        trace!("add for {} skipped: owner too long", record.owner());
        return None;
    }
    let owner = format!("{}{}", ADD_PREFIX, record.owner());
    let res = sink.add(
        &owner,
        record.ttl_or_default(),
        record.rtype(),
        record.rdata(),
    );
    let attempt = Attempt::from_result(res, true);
    trace!(
        "add {} {} {}: {:?}",
        owner,
        record.rtype(),
        record.rdata(),
        attempt
    );
    Some(attempt)
}

fn same_name(left: &str, right: &str) -> bool {
    left.trim_end_matches('.')
        .eq_ignore_ascii_case(right.trim_end_matches('.'))
}

impl ZoneFile {
    /// Proposes random changes for the zone’s current file content.
    ///
    /// See [`random_ddns`] for details.
    pub fn gen_rnd_ddns<R, U>(
        &self,
        sink: &mut U,
        allow_ns: bool,
        rng: &mut R,
    ) -> Result<MutationPlan, FormatError>
    where
        R: Rng + ?Sized,
        U: UpdateSink + ?Sized,
    {
        let set = self.load()?;
        Ok(random_ddns(&set, sink, allow_ns, rng))
    }
}

//============ Testing =======================================================
