//! GNU GLOBAL version parsing and capability thresholds.
//!
//! Versions are dotted integer tuples. Comparison pads the shorter tuple with
//! zeros, so `6.2` and `6.2.0` are equal and `6.3` sorts after `6.2.3`.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::{GtagsError, Result};

/// `gtags --single-update` first shipped in this release.
/// See http://lists.gnu.org/archive/html/info-global/2009-10/msg00000.html
pub const SINGLE_UPDATE_ARRIVAL: &str = "5.7.6";

/// Release that replaced the C parser; reference results differ before it.
/// See http://lists.gnu.org/archive/html/info-global/2010-03/msg00001.html
pub const NEW_PARSER_ARRIVAL: &str = "5.8.2";

/// `gtags` stopped producing GSYMS with this release.
/// See http://lists.gnu.org/archive/html/info-global/2010-06/msg00000.html
pub const GSYMS_REMOVAL: &str = "5.9";

/// First release accepting `--result grep`.
pub const RESULT_OPTION_ARRIVAL: &str = "5.7";

static BANNER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^global - GNU GLOBAL (?P<version>[\d.]+)$").unwrap());

/// A parsed indexer version.
#[derive(Debug, Clone)]
pub struct Version {
    numbers: Vec<u64>,
    text: String,
}

impl Version {
    pub fn parse(text: &str) -> Result<Self> {
        let text = text.trim();
        if text.is_empty() {
            return Err(GtagsError::Parse("empty version string".to_string()));
        }

        let numbers = text
            .split('.')
            .map(|segment| {
                if segment.is_empty() || !segment.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(GtagsError::Parse(format!(
                        "invalid version segment '{}' in '{}'",
                        segment, text
                    )));
                }
                segment.parse::<u64>().map_err(|e| {
                    GtagsError::Parse(format!("invalid version segment '{}': {}", segment, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            numbers,
            text: text.to_string(),
        })
    }

    /// Extract the version from the first line of `global --version`.
    ///
    /// Returns `None` when the line is not a GNU GLOBAL banner, which callers
    /// treat as "unknown tool".
    pub fn from_banner(line: &str) -> Option<Self> {
        let caps = BANNER_RE.captures(line.trim_end())?;
        Self::parse(&caps["version"]).ok()
    }

    pub fn numbers(&self) -> &[u64] {
        &self.numbers
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// `self >= threshold`, where `threshold` is one of the constants above.
    pub fn at_least(&self, threshold: &str) -> bool {
        match Version::parse(threshold) {
            Ok(threshold) => *self >= threshold,
            Err(_) => false,
        }
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.numbers.len().max(other.numbers.len());
        for i in 0..len {
            let a = self.numbers.get(i).copied().unwrap_or(0);
            let b = other.numbers.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                unequal => return unequal,
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Version {}

impl FromStr for Version {
    type Err = GtagsError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

impl Serialize for Version {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text)
    }
}
