//! Building dynamic update messages.
//!
//! The mutation generator doesn’t talk to name servers itself. Instead, it
//! hands every change to an [`UpdateSink`] which either accepts the change
//! or rejects it with an [`UpdateError`] if the owner name, record type or
//! record data are malformed.
//!
//! [`Update`] is the sink used against real servers. It checks every change
//! with the `domain` crate and collects the accepted ones so they can later
//! be sent as a single RFC 2136 update via an `nsupdate` style script.

use std::fmt;
use std::net::SocketAddr;
use std::str::FromStr;

use bytes::Bytes;
use domain::base::iana::Rtype;
use domain::base::Name;
use domain::zonefile::inplace::Zonefile;

//------------ UpdateSink ----------------------------------------------------

/// Something that accepts record additions and deletions for a zone.
pub trait UpdateSink {
    /// Returns the absolute name of the zone being updated.
    fn origin(&self) -> &str;

    /// Adds a record.
    fn add(
        &mut self,
        owner: &str,
        ttl: u32,
        rtype: &str,
        rdata: &str,
    ) -> Result<(), UpdateError>;

    /// Deletes a record, or the whole RRset if `rdata` is `None`.
    fn delete(
        &mut self,
        owner: &str,
        rtype: &str,
        rdata: Option<&str>,
    ) -> Result<(), UpdateError>;
}

//------------ UpdateOp ------------------------------------------------------

/// A single accepted change.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpdateOp {
    Add {
        owner: String,
        ttl: u32,
        rtype: Rtype,
        rdata: String,
    },
    Delete {
        owner: String,
        rtype: Rtype,
        rdata: Option<String>,
    },
}

impl fmt::Display for UpdateOp {
    /// Formats the operation as an `nsupdate` command.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UpdateOp::Add {
                owner,
                ttl,
                rtype,
                rdata,
            } => write!(
                f,
                "update add {} {} IN {} {}",
                owner, ttl, rtype, rdata
            ),
            UpdateOp::Delete {
                owner,
                rtype,
                rdata,
            } => {
                write!(f, "update delete {} IN {}", owner, rtype)?;
                if let Some(rdata) = rdata {
                    write!(f, " {}", rdata)?;
                }
                Ok(())
            }
        }
    }
}

//------------ Update --------------------------------------------------------

/// A dynamic update for one zone.
#[derive(Clone, Debug)]
pub struct Update {
    /// The zone name as text, ending in a dot.
    origin: String,

    /// The zone name for checking owners and scanning record data.
    apex: Name<Bytes>,

    /// The accepted changes in order.
    ops: Vec<UpdateOp>,
}

impl Update {
    /// Creates an empty update for the given zone.
    pub fn new(origin: &str) -> Result<Self, UpdateError> {
        let apex = parse_name(origin)?;
        let mut origin = origin.to_ascii_lowercase();
        if !origin.ends_with('.') {
            origin.push('.');
        }
        Ok(Update {
            origin,
            apex,
            ops: Vec::new(),
        })
    }

    /// Returns the accepted changes.
    pub fn ops(&self) -> &[UpdateOp] {
        &self.ops
    }

    /// Returns the number of accepted changes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns whether no change was accepted.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Renders the update as a script for `nsupdate` or `knsupdate`.
    ///
    /// Relative names in record data were checked against the zone apex,
    /// so the script sets the apex as origin for the tool, too.
    pub fn script(&self, server: SocketAddr) -> String {
        let mut res = format!(
            "server {} {}\nzone {}\norigin {}\n",
            server.ip(),
            server.port(),
            self.origin,
            self.origin
        );
        for op in &self.ops {
            res.push_str(&op.to_string());
            res.push('\n');
        }
        res.push_str("send\nanswer\nquit\n");
        res
    }

    /// Turns an owner into an absolute name within the zone.
    fn owner(&self, owner: &str) -> Result<String, UpdateError> {
        let absolute = if owner == "@" {
            self.origin.clone()
        } else if owner.ends_with('.') {
            owner.to_string()
        } else {
            format!("{}.{}", owner, self.origin)
        };
        let name = parse_name(&absolute)?;
        if !name.ends_with(&self.apex) {
            return Err(UpdateError::NotInZone(absolute));
        }
        Ok(absolute)
    }

    /// Checks record data by scanning it as a one record zone file.
    fn check_rdata(
        &self,
        owner: &str,
        rtype: Rtype,
        rdata: &str,
    ) -> Result<(), UpdateError> {
        let text = format!("{} 0 IN {} {}\n", owner, rtype, rdata);
        let mut zonefile = Zonefile::from(text.as_str());
        zonefile.set_origin(self.apex.clone());
        match zonefile.next_entry() {
            Ok(Some(_)) => Ok(()),
            Ok(None) => Err(UpdateError::BadRdata("no record".into())),
            Err(err) => Err(UpdateError::BadRdata(err.to_string())),
        }
    }
}

impl UpdateSink for Update {
    fn origin(&self) -> &str {
        &self.origin
    }

    fn add(
        &mut self,
        owner: &str,
        ttl: u32,
        rtype: &str,
        rdata: &str,
    ) -> Result<(), UpdateError> {
        let owner = self.owner(owner)?;
        let rtype = parse_rtype(rtype)?;
        self.check_rdata(&owner, rtype, rdata)?;
        self.ops.push(UpdateOp::Add {
            owner,
            ttl,
            rtype,
            rdata: rdata.into(),
        });
        Ok(())
    }

    fn delete(
        &mut self,
        owner: &str,
        rtype: &str,
        rdata: Option<&str>,
    ) -> Result<(), UpdateError> {
        let owner = self.owner(owner)?;
        let rtype = parse_rtype(rtype)?;
        if let Some(rdata) = rdata {
            self.check_rdata(&owner, rtype, rdata)?;
        }
        self.ops.push(UpdateOp::Delete {
            owner,
            rtype,
            rdata: rdata.map(Into::into),
        });
        Ok(())
    }
}

fn parse_name(name: &str) -> Result<Name<Bytes>, UpdateError> {
    Name::from_str(name).map_err(|err| UpdateError::BadName {
        name: name.into(),
        reason: err.to_string(),
    })
}

fn parse_rtype(rtype: &str) -> Result<Rtype, UpdateError> {
    Rtype::from_str(rtype).map_err(|_| UpdateError::UnknownType(rtype.into()))
}

//------------ UpdateError ---------------------------------------------------

/// A change was rejected because its input is malformed.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum UpdateError {
    /// The record type mnemonic is unknown.
    UnknownType(String),

    /// The owner name is malformed, e.g., a label or the name is too long.
    BadName { name: String, reason: String },

    /// The owner name is outside the zone.
    NotInZone(String),

    /// The record data doesn’t fit the record type.
    BadRdata(String),
}

impl fmt::Display for UpdateError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            UpdateError::UnknownType(rtype) => {
                write!(f, "unknown record type '{}'", rtype)
            }
            UpdateError::BadName { name, reason } => {
                write!(f, "bad name '{}': {}", name, reason)
            }
            UpdateError::NotInZone(name) => {
                write!(f, "name '{}' is outside the zone", name)
            }
            UpdateError::BadRdata(reason) => {
                write!(f, "bad record data: {}", reason)
            }
        }
    }
}

impl std::error::Error for UpdateError {}

//============ Testing =======================================================

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn accepts_valid_changes() {
        let mut update = Update::new("Example.COM").unwrap();
        assert_eq!(update.origin(), "example.com.");
        update
            .add("www.example.com.", 300, "A", "192.0.2.1")
            .unwrap();
        update.add("mail", 0, "MX", "10 mx.example.com.").unwrap();
        update
            .delete("old.example.com.", "TXT", Some("\"gone\""))
            .unwrap();
        update.delete("old.example.com.", "AAAA", None).unwrap();
        assert_eq!(update.len(), 4);
        assert_eq!(
            update.ops()[1],
            UpdateOp::Add {
                owner: "mail.example.com.".into(),
                ttl: 0,
                rtype: Rtype::MX,
                rdata: "10 mx.example.com.".into(),
            }
        );
    }

    #[test]
    fn rejects_malformed_input() {
        let mut update = Update::new("example.com.").unwrap();
        assert!(matches!(
            update.add("www.example.com.", 0, "BOGUS", "x"),
            Err(UpdateError::UnknownType(_))
        ));
        let long_label = format!("{}.example.com.", "a".repeat(64));
        assert!(matches!(
            update.add(&long_label, 0, "A", "192.0.2.1"),
            Err(UpdateError::BadName { .. })
        ));
        let long_name = format!("{}example.com.", "abcdefghi.".repeat(26));
        assert!(matches!(
            update.delete(&long_name, "A", None),
            Err(UpdateError::BadName { .. })
        ));
        assert!(matches!(
            update.add("www.example.net.", 0, "A", "192.0.2.1"),
            Err(UpdateError::NotInZone(_))
        ));
        assert!(matches!(
            update.add("www.example.com.", 0, "A", "not-an-address"),
            Err(UpdateError::BadRdata(_))
        ));
        assert!(update.is_empty());
    }

    #[test]
    fn script() {
        let mut update = Update::new("example.com.").unwrap();
        update.add("a.example.com.", 60, "A", "192.0.2.1").unwrap();
        update
            .delete("b.example.com.", "A", Some("192.0.2.2"))
            .unwrap();
        assert_eq!(
            update.script("127.0.0.1:5300".parse().unwrap()),
            "server 127.0.0.1 5300\n\
             zone example.com.\n\
             origin example.com.\n\
             update add a.example.com. 60 IN A 192.0.2.1\n\
             update delete b.example.com. IN A 192.0.2.2\n\
             send\nanswer\nquit\n"
        );
    }

    #[test]
    fn relative_rdata_is_resolved_at_apex() {
        let mut update = Update::new("example.com").unwrap();
        update.delete("@", "MX", Some("10 mail")).unwrap();
        update.add("www", 300, "CNAME", "web").unwrap();
        let script = update.script("192.0.2.53:53".parse().unwrap());
        let lines: Vec<_> = script.lines().collect();
        assert_eq!(lines[2], "origin example.com.");
        assert_eq!(lines[3], "update delete example.com. IN MX 10 mail");
        assert_eq!(
            lines[4],
            "update add www.example.com. 300 IN CNAME web"
        );
    }
}
