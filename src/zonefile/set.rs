//! The record set model of a zone file.

use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;

use super::error::FormatError;
use super::line::{Line, Record};

//------------ RecordSet -----------------------------------------------------

/// The content of a zone file as an ordered sequence of lines.
///
/// The set can be written back without reformatting any line that wasn’t
/// explicitly replaced. It does not validate DNS syntax beyond what is
/// needed to classify lines; that is left to the consumers of the file.
#[derive(Clone, Debug, Default)]
pub struct RecordSet {
    lines: Vec<Line>,

    /// Whether the last line was terminated by a line feed.
    trailing_newline: bool,
}

impl RecordSet {
    /// Creates an empty record set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a record set from a file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, FormatError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|err| FormatError::io(path, err))?;
        Ok(Self::from(text.as_str()))
    }

    /// Returns the lines of the set.
    pub fn lines(&self) -> &[Line] {
        &self.lines
    }

    /// Returns an iterator over the regular data records.
    ///
    /// Comments, shorthand and other lines are skipped.
    pub fn records(&self) -> impl Iterator<Item = &Record> + '_ {
        self.lines.iter().filter_map(Line::data)
    }

    /// Returns the number of data records of the given type.
    pub fn count(&self, rtype: &str) -> usize {
        self.records().filter(|rec| rec.is_type(rtype)).count()
    }

    /// Appends a record line.
    ///
    /// The line is written as `<owner> IN <type> <rdata>`. The record data
    /// isn’t checked in any way.
    pub fn append_record(&mut self, owner: &str, rtype: &str, rdata: &str) {
        self.append_line(format!("{} IN {} {}", owner, rtype, rdata));
    }

    /// Appends a line of arbitrary text.
    pub fn append_line(&mut self, text: impl Into<String>) {
        self.lines.push(Line::parse(text));
        self.trailing_newline = true;
    }

    /// Removes all lines for which `keep` returns `false`.
    pub fn retain(&mut self, keep: impl FnMut(&Line) -> bool) {
        self.lines.retain(keep)
    }

    /// Replaces the line at the given index.
    ///
    /// # Panics
    ///
    /// The method panics if `idx` is out of bounds.
    pub fn replace_line(&mut self, idx: usize, text: impl Into<String>) {
        self.lines[idx] = Line::parse(text);
    }

    /// Returns the set of all data and shorthand records, normalized.
    ///
    /// This is what two record sets are compared by. Order and duplicates
    /// don’t matter.
    pub fn normalized(&self) -> BTreeSet<Record> {
        self.lines
            .iter()
            .filter_map(Line::any_record)
            .map(Record::normalize)
            .collect()
    }

    /// Writes the record set to a writer.
    pub fn write<W: Write>(&self, target: &mut W) -> Result<(), io::Error> {
        for (idx, line) in self.lines.iter().enumerate() {
            target.write_all(line.text().as_bytes())?;
            if idx + 1 < self.lines.len() || self.trailing_newline {
                target.write_all(b"\n")?;
            }
        }
        Ok(())
    }

    /// Saves the record set to a file.
    ///
    /// The content is written to a temporary file next to the target which
    /// is then renamed over the target. A reader thus sees either the old
    /// or the new content but never a partially written file.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), FormatError> {
        let path = path.as_ref();
        let mut tmp_name = path.as_os_str().to_owned();
        tmp_name.push(".new");
        let tmp_path = Path::new(&tmp_name);

        let res = File::create(tmp_path).and_then(|mut file| {
            self.write(&mut file)?;
            file.sync_all()
        });
        if let Err(err) = res.and_then(|_| fs::rename(tmp_path, path)) {
            let _ = fs::remove_file(tmp_path);
            return Err(FormatError::io(path, err));
        }
        Ok(())
    }
}

//--- From

impl<'a> From<&'a str> for RecordSet {
    fn from(text: &'a str) -> Self {
        let trailing_newline = text.ends_with('\n');
        let body = text.strip_suffix('\n').unwrap_or(text);
        let lines = if text.is_empty() {
            Vec::new()
        } else {
            body.split('\n').map(Line::parse).collect()
        };
        RecordSet {
            lines,
            trailing_newline,
        }
    }
}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    const ZONE: &str = "\
$ORIGIN example.com.
; a comment mentioning A records
example.com.   3600 IN SOA ns.example.com. admin.example.com. 1 2 3 4 5
example.com.   3600 IN NS  ns.example.com.
@              0    NSEC3PARAM 1 0 2 abcdef
ns.example.com.  A  192.0.2.53
www.example.com. 300 IN A 192.0.2.1
                 300 IN A 192.0.2.2
";

    fn written(set: &RecordSet) -> String {
        let mut buf = Vec::new();
        set.write(&mut buf).unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn roundtrip_is_lossless() {
        assert_eq!(written(&RecordSet::from(ZONE)), ZONE);

        let no_newline = "a.example. A 192.0.2.1\n\n  ; x";
        assert_eq!(written(&RecordSet::from(no_newline)), no_newline);
        assert_eq!(written(&RecordSet::from("")), "");
    }

    #[test]
    fn count_skips_comments_and_shorthand() {
        let set = RecordSet::from(ZONE);
        assert_eq!(set.count("A"), 2);
        assert_eq!(set.count("a"), 2);
        assert_eq!(set.count("NSEC3PARAM"), 0);
        assert_eq!(set.count("SOA"), 1);
        assert_eq!(set.count("MX"), 0);
    }

    #[test]
    fn append_after_unterminated_line() {
        let mut set = RecordSet::from("a.example. A 192.0.2.1");
        set.append_record("b.example.", "TXT", "hello");
        assert_eq!(
            written(&set),
            "a.example. A 192.0.2.1\nb.example. IN TXT hello\n"
        );
        assert_eq!(set.count("TXT"), 1);
    }

    #[test]
    fn normalized_ignores_order_and_layout() {
        let one = RecordSet::from(
            "a.example. 60 IN A 192.0.2.1\nB.example. 60 TXT \"x\"\n",
        );
        let two = RecordSet::from(
            ";; transfer\nb.example.\t60\tIN\tTXT\t\"x\"\na.example. 60 A 192.0.2.1\n",
        );
        assert_eq!(one.normalized(), two.normalized());
    }

    #[test]
    fn save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("example.com.zone");
        let set = RecordSet::from(ZONE);
        set.save(&path).unwrap();
        assert!(!dir.path().join("example.com.zone.new").exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), ZONE);
        assert_eq!(RecordSet::load(&path).unwrap().count("A"), 2);
    }

    #[test]
    fn load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = RecordSet::load(dir.path().join("nope.zone")).unwrap_err();
        assert!(matches!(err, FormatError::Io { .. }));
    }
}
