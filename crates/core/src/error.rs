use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("invalid mite count: {0} (must be a non-negative integer)")]
    InvalidCount(i64),

    #[error("invalid week: {0} (must be 1..=53)")]
    InvalidWeek(i64),

    #[error("invalid year: {0}")]
    InvalidYear(i64),

    #[error("invalid start month: {0} (must be 1..=12)")]
    InvalidMonth(i64),

    #[error("invalid data: {0}")]
    InvalidData(String),
}
