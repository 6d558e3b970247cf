use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::ids::{ApiaryId, HiveId};
use crate::report::Year;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Apiary {
    pub apiary_id: ApiaryId,
    pub name: String,
    pub location: String,
}

/// An apiary as listed on the member page, with its hive count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiaryOverview {
    pub apiary: Apiary,
    pub hive_count: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hive {
    pub hive_id: HiveId,
    pub apiary_id: ApiaryId,
    pub name: String,
    pub description: Option<String>,
    pub start_year: Year,
    pub start_month: u8,
}

/// Fields a member fills in when registering a hive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewHive {
    pub name: String,
    pub description: Option<String>,
    pub start_year: Year,
    pub start_month: u8,
}

impl NewHive {
    pub fn new(name: &str, start_year: Year, start_month: i64) -> Result<Self, CoreError> {
        if name.trim().is_empty() {
            return Err(CoreError::InvalidData("hive name must not be empty".into()));
        }
        let start_month = match u8::try_from(start_month) {
            Ok(m) if (1..=12).contains(&m) => m,
            _ => return Err(CoreError::InvalidMonth(start_month)),
        };
        Ok(Self {
            name: name.to_string(),
            description: None,
            start_year,
            start_month,
        })
    }

    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }
}
