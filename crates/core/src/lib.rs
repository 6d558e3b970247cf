pub mod apiary;
pub mod error;
pub mod ids;
pub mod report;

pub use apiary::{Apiary, ApiaryOverview, Hive, NewHive};
pub use error::CoreError;
pub use ids::*;
pub use report::{MiteCount, MiteReport, ReportKey, Week, Year, report_years};
