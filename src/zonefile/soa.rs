//! Reading and rewriting the SOA record of a zone file.
//!
//! The last five tokens of the SOA line are its serial, refresh, retry,
//! expire, and minimum fields in that order. Rewriting replaces exactly
//! these tokens and leaves the rest of the line, including its spacing,
//! as it was. A trailing comment and parentheses are allowed as long as
//! the whole record sits on one line.

use crate::base::Serial;

use super::line::{token_spans, LineKind};
use super::set::RecordSet;

//------------ SoaFields -----------------------------------------------------

/// The numeric fields of a SOA record.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SoaFields {
    pub serial: Serial,
    pub refresh: u32,
    pub retry: u32,
    pub expire: u32,
    pub minimum: u32,
}

impl SoaFields {
    /// Parses the fields from the text of a SOA line.
    pub fn from_line(text: &str) -> Option<Self> {
        let values = field_spans(text)?
            .map(|(start, end)| text[start..end].parse::<u32>().ok());
        match values {
            [
                Some(serial),
                Some(refresh),
                Some(retry),
                Some(expire),
                Some(minimum),
            ] => Some(SoaFields {
                serial: Serial(serial),
                refresh,
                retry,
                expire,
                minimum,
            }),
            _ => None,
        }
    }

    fn to_array(self) -> [u32; 5] {
        [
            self.serial.into_int(),
            self.refresh,
            self.retry,
            self.expire,
            self.minimum,
        ]
    }
}

//------------ SoaUpdate -----------------------------------------------------

/// The changes to apply to the SOA record.
///
/// Fields left as `None` keep their current value, except for the serial
/// which is incremented by one if not given.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct SoaUpdate {
    pub serial: Option<Serial>,
    pub refresh: Option<u32>,
    pub retry: Option<u32>,
    pub expire: Option<u32>,
    pub minimum: Option<u32>,
}

impl SoaUpdate {
    /// Creates an update that only increments the serial.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets an explicit serial.
    pub fn serial(mut self, serial: Serial) -> Self {
        self.serial = Some(serial);
        self
    }

    /// Sets the refresh timer.
    pub fn refresh(mut self, value: u32) -> Self {
        self.refresh = Some(value);
        self
    }

    /// Sets the retry timer.
    pub fn retry(mut self, value: u32) -> Self {
        self.retry = Some(value);
        self
    }

    /// Sets the expire timer.
    pub fn expire(mut self, value: u32) -> Self {
        self.expire = Some(value);
        self
    }

    /// Sets the negative caching TTL.
    pub fn minimum(mut self, value: u32) -> Self {
        self.minimum = Some(value);
        self
    }

    /// Applies the update to a set of current values.
    pub fn apply(&self, current: SoaFields) -> SoaFields {
        SoaFields {
            serial: self.serial.unwrap_or_else(|| current.serial.next()),
            refresh: self.refresh.unwrap_or(current.refresh),
            retry: self.retry.unwrap_or(current.retry),
            expire: self.expire.unwrap_or(current.expire),
            minimum: self.minimum.unwrap_or(current.minimum),
        }
    }
}

//------------ SoaError ------------------------------------------------------

/// Locating or parsing the SOA record failed.
///
/// The zone file layer turns this into a `FormatError` carrying the path.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SoaError {
    /// There is no SOA record.
    Missing,

    /// The SOA record at the given line index can’t be parsed.
    Malformed(usize),
}

//------------ RecordSet Extension -------------------------------------------

impl RecordSet {
    /// Returns the index of the first SOA line.
    ///
    /// Only the first SOA record counts. Any later SOA lines are left
    /// alone by all operations.
    pub fn soa_index(&self) -> Option<usize> {
        self.lines().iter().position(|line| match line.kind() {
            LineKind::Data(rec) | LineKind::Shorthand(rec) => {
                rec.is_type("SOA")
            }
            _ => false,
        })
    }

    /// Returns the fields of the first SOA record.
    pub fn soa(&self) -> Result<SoaFields, SoaError> {
        let idx = self.soa_index().ok_or(SoaError::Missing)?;
        SoaFields::from_line(self.lines()[idx].text())
            .ok_or(SoaError::Malformed(idx))
    }

    /// Rewrites the first SOA record and returns its new fields.
    pub fn update_soa(
        &mut self,
        update: &SoaUpdate,
    ) -> Result<SoaFields, SoaError> {
        let idx = self.soa_index().ok_or(SoaError::Missing)?;
        let text = self.lines()[idx].text();
        let current =
            SoaFields::from_line(text).ok_or(SoaError::Malformed(idx))?;
        let spans = field_spans(text).ok_or(SoaError::Malformed(idx))?;
        let new = update.apply(current);

        let mut res = String::with_capacity(text.len() + 8);
        let mut pos = 0;
        for ((start, end), value) in spans.iter().zip(new.to_array()) {
            res.push_str(&text[pos..*start]);
            res.push_str(&value.to_string());
            pos = *end;
        }
        res.push_str(&text[pos..]);
        self.replace_line(idx, res);
        Ok(new)
    }
}

//------------ Helper Functions ----------------------------------------------

/// Returns the byte ranges of the five trailing numeric fields.
fn field_spans(text: &str) -> Option<[(usize, usize); 5]> {
    let data = match text.find(';') {
        Some(pos) => &text[..pos],
        None => text,
    };
    if data.contains('(') && !data.contains(')') {
        return None;
    }
    let spans: Vec<_> = token_spans(data)
        .into_iter()
        .filter(|&(start, end)| {
            let token = &data[start..end];
            token != "(" && token != ")"
        })
        .collect();
    // Owner, type, mname, rname precede the numbers.
    if spans.len() < 9 {
        return None;
    }
    let tail = &spans[spans.len() - 5..];
    Some([tail[0], tail[1], tail[2], tail[3], tail[4]])
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    fn first_line(set: &RecordSet) -> &str {
        set.lines()[set.soa_index().unwrap()].text()
    }

    #[test]
    fn increment_keeps_layout() {
        let mut set = RecordSet::from(
            "; SOA in a comment 9 9 9 9 9\n\
             example.  3600 IN SOA  ns.example. host.example. 41   7200 900 86400  300\n",
        );
        let new = set.update_soa(&SoaUpdate::new()).unwrap();
        assert_eq!(new.serial, Serial(42));
        assert_eq!(
            first_line(&set),
            "example.  3600 IN SOA  ns.example. host.example. 42   7200 900 86400  300"
        );
    }

    #[test]
    fn explicit_fields() {
        let mut set = RecordSet::from(
            "@ IN SOA ns.example. host.example. ( 10 7200 900 86400 300 ) ; soa\n",
        );
        let update = SoaUpdate::new()
            .serial(Serial(5))
            .refresh(1)
            .retry(2)
            .expire(3)
            .minimum(4);
        let new = set.update_soa(&update).unwrap();
        assert_eq!(
            new,
            SoaFields {
                serial: Serial(5),
                refresh: 1,
                retry: 2,
                expire: 3,
                minimum: 4
            }
        );
        assert_eq!(
            first_line(&set),
            "@ IN SOA ns.example. host.example. ( 5 1 2 3 4 ) ; soa"
        );
    }

    #[test]
    fn only_first_soa_is_touched() {
        let mut set = RecordSet::from(
            "a. SOA ns. host. 1 2 3 4 5\nb. SOA ns. host. 7 2 3 4 5\n",
        );
        set.update_soa(&SoaUpdate::new()).unwrap();
        assert_eq!(set.lines()[0].text(), "a. SOA ns. host. 2 2 3 4 5");
        assert_eq!(set.lines()[1].text(), "b. SOA ns. host. 7 2 3 4 5");
    }

    #[test]
    fn serial_wraps() {
        let mut set =
            RecordSet::from("a. SOA ns. host. 4294967295 2 3 4 5\n");
        let new = set.update_soa(&SoaUpdate::new()).unwrap();
        assert_eq!(new.serial, Serial(0));
    }

    #[test]
    fn missing_and_malformed() {
        let mut set = RecordSet::from("a. A 192.0.2.1\n");
        assert_eq!(set.soa(), Err(SoaError::Missing));
        assert_eq!(set.update_soa(&SoaUpdate::new()), Err(SoaError::Missing));

        let set = RecordSet::from("a. A 192.0.2.1\na. SOA ns. host. (\n");
        assert_eq!(set.soa(), Err(SoaError::Malformed(1)));

        let text = "a. SOA ns. host. (\n 1 2 3 4 5 )\n";
        let mut set = RecordSet::from(text);
        assert_eq!(
            set.update_soa(&SoaUpdate::new()),
            Err(SoaError::Malformed(0))
        );
        assert_eq!(set.lines()[1].text(), " 1 2 3 4 5 )");

        let set = RecordSet::from("a. SOA ns. host. 1 2h 3 4 5\n");
        assert_eq!(set.soa(), Err(SoaError::Malformed(0)));
    }
}
