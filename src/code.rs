//! Human-readable contract codes of the form `CON-<year>-<seq>`.
//!
//! The sequence is per calendar year, starts at 1 and is zero-padded to at
//! least four digits. Past 9999 it simply grows wider (`CON-2026-10000`).
//! Allocation is done by the store inside the insert transaction; this module
//! only formats and parses.

use crate::error::ContractError;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const CODE_PREFIX: &str = "CON";

static CODE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^CON-(\d{4})-(\d{4,})$").expect("contract code pattern is valid")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContractCode {
    year: i32,
    sequence: u32,
}

impl ContractCode {
    pub fn new(year: i32, sequence: u32) -> Self {
        Self { year, sequence }
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Parse `CON-YYYY-NNNN`. Sequence 0 is rejected.
    pub fn parse(s: &str) -> Result<Self, ContractError> {
        let invalid = || ContractError::validation(format!("'{s}' is not a valid contract code"));
        let caps = CODE_RE.captures(s).ok_or_else(invalid)?;
        let year: i32 = caps[1].parse().map_err(|_| invalid())?;
        let sequence: u32 = caps[2].parse().map_err(|_| invalid())?;
        if sequence == 0 {
            return Err(invalid());
        }
        Ok(Self { year, sequence })
    }
}

impl fmt::Display for ContractCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{:04}-{:04}", CODE_PREFIX, self.year, self.sequence)
    }
}

impl FromStr for ContractCode {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for ContractCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ContractCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}
