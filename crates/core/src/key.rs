use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a job inside a scheduler.
///
/// Auto-assigned keys are always [`JobKey::Index`]; callers may also pick
/// their own index or a free-form name. The two variants share one key
/// space: `Index(3)` and `Name("3")` are different keys, and uniqueness is
/// checked across both.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum JobKey {
    Index(usize),
    Name(String),
}

impl JobKey {
    /// The numeric index, if this is an index key.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            JobKey::Index(i) => Some(*i),
            JobKey::Name(_) => None,
        }
    }

    /// The name, if this is a named key.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            JobKey::Index(_) => None,
            JobKey::Name(n) => Some(n),
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKey::Index(i) => write!(f, "{i}"),
            JobKey::Name(n) => f.write_str(n),
        }
    }
}

impl From<usize> for JobKey {
    fn from(i: usize) -> Self {
        JobKey::Index(i)
    }
}

impl From<&str> for JobKey {
    fn from(s: &str) -> Self {
        JobKey::Name(s.to_string())
    }
}

impl From<String> for JobKey {
    fn from(s: String) -> Self {
        JobKey::Name(s)
    }
}
