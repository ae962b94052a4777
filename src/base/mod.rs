//! Basic types shared by the rest of the crate.
//!
//! Currently this is only the [`Serial`] type which implements the serial
//! number arithmetic that the SOA record’s version counter follows.

pub use self::serial::Serial;

pub mod serial;
