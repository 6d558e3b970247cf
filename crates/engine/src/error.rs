use hivelog_core::CoreError;
use hivelog_storage::StorageError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("core error: {0}")]
    Core(#[from] CoreError),

    #[error("config error: {0}")]
    Config(String),

    #[error("no apiary selected")]
    NoApiarySelected,

    #[error("no reporting year/week selected")]
    PeriodNotSelected,

    #[error("hive is not part of the selected apiary: {0}")]
    UnknownHive(String),

    #[error("a batch is already in progress")]
    BatchInProgress,

    #[error("no conflict is awaiting a decision")]
    NoPendingConflict,
}
