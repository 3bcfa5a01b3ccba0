//! The run log: a JSON record of which slugs were published on which day.
//!
//! ```json
//! {
//!   "published": {
//!     "2024-06-01": ["redis-caching"]
//!   }
//! }
//! ```
//!
//! The log is bookkeeping only. Nothing in a run reads it to make a decision,
//! so a corrupt log is replaced rather than treated as an error. Top-level keys
//! other than `published` are carried through unchanged.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use tracing::warn;

use crate::date;
use crate::util::{self, FileError};

/// Slugs published per publishing date.
#[derive(Clone, Debug, Default, PartialEq, Deserialize, Serialize)]
pub struct RunLog {
    /// ISO date to the slugs published that day, in publishing order.
    #[serde(default)]
    pub published: BTreeMap<String, Vec<String>>,

    #[serde(flatten)]
    other: serde_json::Map<String, serde_json::Value>,
}

impl RunLog {
    /// Loads the log at `path`. A missing or unparseable log loads as empty.
    pub fn load(path: &Path) -> Result<RunLog> {
        let json = match util::read_optional(path)? {
            Some(json) => json,
            None => return Ok(RunLog::default()),
        };
        match serde_json::from_str(&json) {
            Ok(log) => Ok(log),
            Err(err) => {
                warn!(path = %path.display(), error = %err, "Run log is malformed, starting a new one");
                Ok(RunLog::default())
            }
        }
    }

    /// Appends `slug` to the entry for `day`.
    pub fn record(&mut self, day: NaiveDate, slug: &str) {
        self.published
            .entry(date::iso(day))
            .or_default()
            .push(slug.to_owned());
    }

    /// Writes the log to `path` as indented JSON.
    pub fn save(&self, path: &Path) -> Result<()> {
        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');
        util::write(path, json)?;
        Ok(())
    }
}

type Result<T> = std::result::Result<T, Error>;

/// Represents a problem reading or writing the run log.
#[derive(Debug)]
pub enum Error {
    /// Returned when the log can't be serialized.
    Serialize(serde_json::Error),

    /// Returned for I/O problems on the log file.
    File(FileError),
}

impl fmt::Display for Error {
    /// Implements [`fmt::Display`] for [`Error`].
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::Serialize(err) => write!(f, "Serializing run log: {}", err),
            Error::File(err) => write!(f, "Updating run log {}", err),
        }
    }
}

impl std::error::Error for Error {
    /// Implements [`std::error::Error`] for [`Error`].
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Serialize(err) => Some(err),
            Error::File(err) => Some(err),
        }
    }
}

impl From<serde_json::Error> for Error {
    /// Converts [`serde_json::Error`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: serde_json::Error) -> Error {
        Error::Serialize(err)
    }
}

impl From<FileError> for Error {
    /// Converts [`FileError`]s into [`Error`]. This allows us to use the `?`
    /// operator.
    fn from(err: FileError) -> Error {
        Error::File(err)
    }
}
