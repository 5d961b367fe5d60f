use std::fmt::Display;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

use crate::error::Error;

/// The largest index a client may submit.
pub const MAX_INDEX: i64 = 40;
/// What a cache entry reads as until the worker has computed its value.
pub const PLACEHOLDER: &str = "Nothing yet!";
/// The only topic the pipeline publishes on.
pub const INSERT_TOPIC: &str = "insert";
/// Name of the hash in the fast cache.
pub const VALUES_HASH: &str = "values";

/// A validated index, `0..=MAX_INDEX`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Index(u8);

impl Index {
    pub fn new(value: i64) -> Result<Self, Error> {
        if value < 0 || value > MAX_INDEX {
            return Err(Error::OutOfRange(value));
        }
        Ok(Self(value as u8))
    }

    #[inline]
    pub fn get(self) -> u32 {
        self.0 as u32
    }
}

impl TryFrom<i64> for Index {
    type Error = Error;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Index> for i64 {
    fn from(index: Index) -> Self {
        index.0 as i64
    }
}

impl Display for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Index {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = s
            .trim()
            .parse::<i64>()
            .map_err(|_| Error::NotAnIndex(s.to_string()))?;
        Self::new(value)
    }
}

/// Content of a cache entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheValue {
    Placeholder,
    Computed(u64),
}

impl CacheValue {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, Self::Placeholder)
    }
}

impl Display for CacheValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Placeholder => f.write_str(PLACEHOLDER),
            Self::Computed(v) => write!(f, "{v}"),
        }
    }
}

/// A row of the durable log. Rows written by older deployments are not revalidated, hence the raw integer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DurableRecord {
    pub number: i32,
}

impl From<Index> for DurableRecord {
    fn from(index: Index) -> Self {
        Self {
            number: index.get() as i32,
        }
    }
}

/// A message on the notification channel. The payload is the bare index as text, there is no envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub topic:   String,
    pub payload: String,
}

impl Notification {
    pub fn insert(index: Index) -> Self {
        Self {
            topic:   INSERT_TOPIC.to_string(),
            payload: index.to_string(),
        }
    }
}

/// A notification the worker couldn't turn into a cache value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub payload: String,
    pub reason:  String,
}
