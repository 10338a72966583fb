//! Page record lifecycle status
//!
//! A page record is WAITING whenever no traversal is working on it, and
//! PROCESSING while a spider is fetching, parsing or saving one of its pages.

use std::fmt;

/// Represents the lifecycle status of a page record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PageStatus {
    /// Idle; a crawl may be requested
    #[default]
    Waiting,

    /// A spider is currently walking this record's pagination chain
    Processing,
}

impl PageStatus {
    /// Returns true if no traversal is working on the record
    pub fn is_idle(&self) -> bool {
        matches!(self, Self::Waiting)
    }

    /// Converts the status to a database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Processing => "processing",
        }
    }

    /// Parses a status from a database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "waiting" => Some(Self::Waiting),
            "processing" => Some(Self::Processing),
            _ => None,
        }
    }
}

impl fmt::Display for PageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Waiting => "WAITING",
            Self::Processing => "PROCESSING",
        };
        write!(f, "{}", s)
    }
}
