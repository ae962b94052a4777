//! Line-oriented view of a zone file.
//!
//! A zone file is kept as a sequence of [`Line`]s, each holding the
//! original text of the line and a classification of what it contains.
//! Only lines of the form
//!
//! ```text
//! <owner> [<ttl>] [IN] <type> <rdata...>
//! ```
//!
//! are treated as data records. Comments, `$` directives, lines starting
//! with white space (which inherit the previous owner), and lines whose
//! owner is the `@` shorthand are preserved verbatim and never targeted by
//! mutations. Shorthand lines are still parsed because a SOA record is
//! commonly written with an `@` owner.

use std::fmt;

//------------ Line ----------------------------------------------------------

/// A single line of a zone file.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Line {
    /// The line exactly as it appears in the file, without the line feed.
    text: String,

    /// What the line contains.
    kind: LineKind,
}

impl Line {
    /// Classifies a line of text.
    pub fn parse(text: impl Into<String>) -> Self {
        let text = text.into();
        let kind = LineKind::classify(&text);
        Line { text, kind }
    }

    /// Returns the original text of the line.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Returns the classification of the line.
    pub fn kind(&self) -> &LineKind {
        &self.kind
    }

    /// Returns the record if this is a regular data line.
    ///
    /// Shorthand lines are not included.
    pub fn data(&self) -> Option<&Record> {
        match self.kind {
            LineKind::Data(ref record) => Some(record),
            _ => None,
        }
    }

    /// Returns the record of a data line or a shorthand line.
    pub fn any_record(&self) -> Option<&Record> {
        match self.kind {
            LineKind::Data(ref record) | LineKind::Shorthand(ref record) => {
                Some(record)
            }
            _ => None,
        }
    }

    /// Returns whether the line contains the given text anywhere.
    pub fn contains(&self, pattern: &str) -> bool {
        self.text.contains(pattern)
    }
}

impl fmt::Display for Line {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}

//------------ LineKind ------------------------------------------------------

/// The classification of a zone file line.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum LineKind {
    /// An empty line or one with only white space.
    Blank,

    /// A comment line, i.e., the first visible character is `;`.
    Comment,

    /// A control entry such as `$ORIGIN` or `$TTL`.
    Directive,

    /// A record whose owner is written as `@`.
    Shorthand(Record),

    /// A regular record with an explicit owner.
    Data(Record),

    /// Anything else: continuation lines, lines with an inherited owner,
    /// or lines too short to be a record.
    Other,
}

impl LineKind {
    fn classify(text: &str) -> Self {
        let trimmed = text.trim_start();
        if trimmed.trim_end().is_empty() {
            return LineKind::Blank;
        }
        if trimmed.starts_with(';') {
            return LineKind::Comment;
        }
        if trimmed.len() != text.len() {
            return LineKind::Other;
        }
        if trimmed.starts_with('$') {
            return LineKind::Directive;
        }
        match Record::parse(text) {
            Some(record) if record.owner.starts_with('@') => {
                LineKind::Shorthand(record)
            }
            Some(record) => LineKind::Data(record),
            None => LineKind::Other,
        }
    }
}

//------------ Record --------------------------------------------------------

/// A resource record as found on a single zone file line.
///
/// The class is not kept: the only class accepted is `IN`, which may or
/// may not be spelled out. A missing TTL is kept as `None` and means the
/// zone’s default applies.
///
/// The record data is the remainder of the line after the type token with
/// its inner spacing untouched. Use [`normalize`][Self::normalize] before
/// comparing records from different sources.
#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct Record {
    owner: String,
    ttl: Option<u32>,
    rtype: String,
    rdata: String,
}

impl Record {
    /// Creates a new record from its parts.
    pub fn new(
        owner: impl Into<String>,
        ttl: Option<u32>,
        rtype: impl Into<String>,
        rdata: impl Into<String>,
    ) -> Self {
        Record {
            owner: owner.into(),
            ttl,
            rtype: rtype.into(),
            rdata: rdata.into(),
        }
    }

    /// Parses a record from a line of text.
    ///
    /// Returns `None` if the line doesn’t have at least an owner, a type,
    /// and one more token, or if the class isn’t `IN`.
    pub fn parse(text: &str) -> Option<Self> {
        let spans = token_spans(text);
        if spans.len() < 3 {
            return None;
        }
        let token = |idx: usize| &text[spans[idx].0..spans[idx].1];

        let owner = token(0);
        let mut idx = 1;
        let mut ttl = None;
        let mut class = false;

        // TTL and class may appear in either order.
        while idx < spans.len() {
            let item = token(idx);
            if ttl.is_none() && item.bytes().all(|ch| ch.is_ascii_digit()) {
                ttl = Some(item.parse().ok()?);
            } else if !class && item.eq_ignore_ascii_case("IN") {
                class = true;
            } else {
                break;
            }
            idx += 1;
        }
        if idx >= spans.len() {
            return None;
        }

        let rtype = token(idx);
        if rtype.eq_ignore_ascii_case("CH") || rtype.eq_ignore_ascii_case("HS")
        {
            return None;
        }
        let rdata = match spans.get(idx + 1) {
            Some(span) => text[span.0..].trim_end(),
            None => "",
        };

        Some(Record::new(owner, ttl, rtype, rdata))
    }

    /// Returns the owner name as written.
    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Returns the TTL if one was given.
    pub fn ttl(&self) -> Option<u32> {
        self.ttl
    }

    /// Returns the TTL with zero standing in for a missing one.
    pub fn ttl_or_default(&self) -> u32 {
        self.ttl.unwrap_or(0)
    }

    /// Returns the record type token as written.
    pub fn rtype(&self) -> &str {
        &self.rtype
    }

    /// Returns the record data as written.
    pub fn rdata(&self) -> &str {
        &self.rdata
    }

    /// Returns whether the record has the given type.
    ///
    /// Type mnemonics are case insensitive.
    pub fn is_type(&self, rtype: &str) -> bool {
        self.rtype.eq_ignore_ascii_case(rtype)
    }

    /// Returns a normalized copy of the record suitable for comparison.
    ///
    /// The owner is lowercased and given a trailing dot, the type is
    /// uppercased, and runs of white space in the record data are
    /// collapsed into a single space.
    pub fn normalize(&self) -> Self {
        let mut owner = self.owner.to_ascii_lowercase();
        if !owner.ends_with('.') {
            owner.push('.');
        }
        Record {
            owner,
            ttl: self.ttl,
            rtype: self.rtype.to_ascii_uppercase(),
            rdata: self.rdata.split_whitespace().collect::<Vec<_>>().join(" "),
        }
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.owner)?;
        if let Some(ttl) = self.ttl {
            write!(f, " {}", ttl)?;
        }
        write!(f, " IN {}", self.rtype)?;
        if !self.rdata.is_empty() {
            write!(f, " {}", self.rdata)?;
        }
        Ok(())
    }
}

//------------ Helper Functions ----------------------------------------------

/// Returns the byte ranges of the white space separated tokens of `text`.
pub(crate) fn token_spans(text: &str) -> Vec<(usize, usize)> {
    let mut res = Vec::new();
    let mut start = None;
    for (pos, ch) in text.char_indices() {
        match (ch.is_whitespace(), start) {
            (true, Some(begin)) => {
                res.push((begin, pos));
                start = None;
            }
            (false, None) => start = Some(pos),
            _ => {}
        }
    }
    if let Some(begin) = start {
        res.push((begin, text.len()));
    }
    res
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify() {
        assert_eq!(Line::parse("").kind(), &LineKind::Blank);
        assert_eq!(Line::parse("   \t").kind(), &LineKind::Blank);
        assert_eq!(Line::parse("; SOA comment").kind(), &LineKind::Comment);
        assert_eq!(Line::parse("  ;; indented").kind(), &LineKind::Comment);
        assert_eq!(Line::parse("$TTL 3600").kind(), &LineKind::Directive);
        assert_eq!(
            Line::parse("    3600 IN A 192.0.2.1").kind(),
            &LineKind::Other
        );
        assert_eq!(Line::parse("www.example.com. A").kind(), &LineKind::Other);
        assert!(matches!(
            Line::parse("@ 0 NSEC3PARAM 1 0 2 abcdef").kind(),
            LineKind::Shorthand(_)
        ));
        assert!(Line::parse("www.example.com. A 192.0.2.1").data().is_some());
    }

    #[test]
    fn parse_record_variants() {
        let rec = Record::parse("www.example.com. 300 IN A 192.0.2.1").unwrap();
        assert_eq!(rec.owner(), "www.example.com.");
        assert_eq!(rec.ttl(), Some(300));
        assert_eq!(rec.rtype(), "A");
        assert_eq!(rec.rdata(), "192.0.2.1");

        let rec = Record::parse("www.example.com. IN 300 AAAA ::1").unwrap();
        assert_eq!(rec.ttl(), Some(300));
        assert_eq!(rec.rtype(), "AAAA");

        let rec = Record::parse("www.example.com. MX 10 mail.example.com.")
            .unwrap();
        assert_eq!(rec.ttl(), None);
        assert_eq!(rec.ttl_or_default(), 0);
        assert_eq!(rec.rdata(), "10 mail.example.com.");

        assert!(Record::parse("www.example.com. CH TXT foo").is_none());
    }

    #[test]
    fn rdata_keeps_inner_spacing() {
        let rec =
            Record::parse("t.example. 60 IN TXT \"a  b\"   \"c\"  ").unwrap();
        assert_eq!(rec.rdata(), "\"a  b\"   \"c\"");
        assert_eq!(rec.normalize().rdata(), "\"a b\" \"c\"");
    }

    #[test]
    fn normalize() {
        let rec = Record::parse("WWW.Example.COM 300 IN a 192.0.2.1").unwrap();
        let norm = rec.normalize();
        assert_eq!(norm.owner(), "www.example.com.");
        assert_eq!(norm.rtype(), "A");
        assert!(norm.is_type("a"));
        assert_eq!(
            norm.to_string(),
            "www.example.com. 300 IN A 192.0.2.1"
        );
    }

    #[test]
    fn spans() {
        assert_eq!(token_spans(" ab  c\td "), vec![(1, 3), (5, 6), (7, 8)]);
        assert!(token_spans("   ").is_empty());
    }
}
