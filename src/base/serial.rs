//! Serial numbers.
//!
//! The serial field of a zone’s SOA record is a 32 bit value that is
//! conceptionally viewed as the 32 bit modulus of a larger number space.
//! Because of that, special rules apply when comparing and incrementing
//! these values. This module provides the type [`Serial`] that implements
//! these rules.
//!
//! Code outside this module must never compare serials as plain integers.
//! Convergence checks in particular rely on [`Serial`]’s partial ordering.

use core::cmp::Ordering;
use core::{cmp, fmt, str};

//------------ Serial --------------------------------------------------------

/// A zone serial number.
///
/// Since these numbers are only 32 bits long, they can wrap. [RFC 1982]
/// defines the semantics for doing arithmetics in the face of these
/// wrap-arounds. This type implements these semantics atop a native `u32`.
///
/// The RFC defines two operations: addition and comparison.
///
/// For addition, the amount added can only be a positive number of up to
/// `2^31 - 1`. Because of this, there is no `Add` implementation but a
/// dedicated method [`add`][Self::add] that panics on larger values.
///
/// Serial numbers only implement a partial ordering. That is, there are
/// pairs of values that are not equal but there still isn’t one value
/// larger than the other. Such a pair is neither greater nor less than the
/// other which means a poll waiting for a serial to grow beyond such a
/// value keeps waiting.
///
/// [RFC 1982]: https://tools.ietf.org/html/rfc1982
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Serial(pub u32);

impl Serial {
    /// Returns the serial number as a raw integer.
    pub fn into_int(self) -> u32 {
        self.0
    }

    /// Add `other` to `self`.
    ///
    /// # Panics
    ///
    /// This method panics if `other` is greater than `2^31 - 1`.
    #[allow(clippy::should_implement_trait)]
    pub fn add(self, other: u32) -> Self {
        assert!(other <= 0x7FFF_FFFF);
        Serial(self.0.wrapping_add(other))
    }

    /// Returns the serial that follows this one.
    ///
    /// This is what the SOA manager writes when it isn’t given an explicit
    /// value. `u32::MAX` wraps around to zero.
    pub fn next(self) -> Self {
        self.add(1)
    }
}

//--- From and FromStr

impl From<u32> for Serial {
    fn from(value: u32) -> Serial {
        Serial(value)
    }
}

impl From<Serial> for u32 {
    fn from(serial: Serial) -> u32 {
        serial.0
    }
}

impl str::FromStr for Serial {
    type Err = <u32 as str::FromStr>::Err;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        <u32 as str::FromStr>::from_str(s).map(Into::into)
    }
}

//--- Display

impl fmt::Display for Serial {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

//--- PartialOrd

impl cmp::PartialOrd for Serial {
    fn partial_cmp(&self, other: &Serial) -> Option<cmp::Ordering> {
        let (diff, flip) = match self.0.cmp(&other.0) {
            Ordering::Equal => return Some(Ordering::Equal),
            Ordering::Less => (other.0 - self.0, false),
            Ordering::Greater => (self.0 - other.0, true),
        };
        let res = match diff.cmp(&0x8000_0000) {
            Ordering::Less => Ordering::Less,
            Ordering::Greater => Ordering::Greater,
            Ordering::Equal => return None,
        };
        Some(if flip { res.reverse() } else { res })
    }
}

//============ Testing =======================================================
