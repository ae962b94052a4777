//! Randomised zone mutation and convergence testing for DNS servers.
//!
//! This crate drives a pair of name servers, one primary and one
//! secondary, through rounds of random dynamic updates and checks after
//! each round that both servers serve the same zone content and that the
//! zone files they write pass external verification tools.
//!
//! # Modules
//!
//! * [zonefile] contains the line based model of a zone file and the
//!   handle for a test zone’s file on disk, including its SOA record.
//! * [base] contains the serial number type with its sequence space
//!   arithmetic.
//! * [update] collects the changes of a dynamic update and turns them
//!   into a script for `nsupdate` style tools.
//! * [mutate] proposes random changes for a zone.
//! * [verify] runs external verification tools on zone files.
//! * [server] controls actual name servers. It contains implementations
//!   for Knot DNS and BIND.
//! * [scenario] ties everything together into a convergence scenario.
//!
//! In addition, [config] contains the tunable limits and the locations of
//! external programs, [context] collects the defects of a test case, and
//! [logging] sets up diagnostic output.
//!
//! # Reference of Feature Flags
//!
//! * `serde`: Enables serializing reports and their parts via
//!   [serde](https://serde.rs/).
//! * `interop`: Enables tests that need actual name servers and DNSSEC
//!   tools to be installed.

#![allow(renamed_and_removed_lints)]
#![allow(clippy::unknown_clippy_lints)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod base;
pub mod config;
pub mod context;
pub mod error;
pub mod logging;
pub mod mutate;
pub mod scenario;
pub mod server;
pub mod update;
pub mod verify;
pub mod zonefile;
