use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{HiveId, ReportId};

/// Number of mites counted for one hive in one week. Never negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MiteCount(u32);

impl MiteCount {
    pub const ZERO: MiteCount = MiteCount(0);

    /// Validate raw user input.
    pub fn parse(raw: i64) -> Result<Self, CoreError> {
        u32::try_from(raw)
            .map(Self)
            .map_err(|_| CoreError::InvalidCount(raw))
    }

    pub fn new(count: u32) -> Self {
        Self(count)
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl TryFrom<i64> for MiteCount {
    type Error = CoreError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::parse(raw)
    }
}

impl From<MiteCount> for i64 {
    fn from(count: MiteCount) -> Self {
        i64::from(count.0)
    }
}

impl fmt::Display for MiteCount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// ISO week number, 1..=53.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Week(u8);

impl Week {
    pub const MAX: u8 = 53;

    pub fn new(week: i64) -> Result<Self, CoreError> {
        match u8::try_from(week) {
            Ok(w) if (1..=Self::MAX).contains(&w) => Ok(Self(w)),
            _ => Err(CoreError::InvalidWeek(week)),
        }
    }

    pub fn get(&self) -> u8 {
        self.0
    }
}

impl TryFrom<i64> for Week {
    type Error = CoreError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Week> for i64 {
    fn from(week: Week) -> Self {
        i64::from(week.0)
    }
}

impl fmt::Display for Week {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct Year(u16);

impl Year {
    pub fn new(year: i64) -> Result<Self, CoreError> {
        match u16::try_from(year) {
            Ok(y) if (1..=9999).contains(&y) => Ok(Self(y)),
            _ => Err(CoreError::InvalidYear(year)),
        }
    }

    pub fn get(&self) -> u16 {
        self.0
    }
}

impl TryFrom<i64> for Year {
    type Error = CoreError;

    fn try_from(raw: i64) -> Result<Self, Self::Error> {
        Self::new(raw)
    }
}

impl From<Year> for i64 {
    fn from(year: Year) -> Self {
        i64::from(year.0)
    }
}

impl fmt::Display for Year {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// At most one report may exist per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportKey {
    pub hive_id: HiveId,
    pub year: Year,
    pub week: Week,
}

impl ReportKey {
    pub fn new(hive_id: HiveId, year: Year, week: Week) -> Self {
        Self { hive_id, year, week }
    }
}

impl fmt::Display for ReportKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}-W{:02}", self.hive_id, self.year, self.week.get())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiteReport {
    pub report_id: ReportId,
    pub hive_id: HiveId,
    pub year: Year,
    pub week: Week,
    pub count: MiteCount,
}

impl MiteReport {
    pub fn key(&self) -> ReportKey {
        ReportKey::new(self.hive_id, self.year, self.week)
    }

    pub fn is_for(&self, year: Year, week: Week) -> bool {
        self.year == year && self.week == week
    }
}

/// Years a hive has reports for, plus `current`, newest first.
pub fn report_years(reports: &[MiteReport], current: Year) -> Vec<Year> {
    let years: BTreeSet<Year> = reports
        .iter()
        .map(|r| r.year)
        .chain(std::iter::once(current))
        .collect();
    years.into_iter().rev().collect()
}
