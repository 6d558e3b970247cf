pub mod batch;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod sheet;

pub use batch::{
    Batch, BatchPhase, BatchSummary, Decision, FailedItem, PendingConflict, Selection,
};
pub use config::{ExistenceCheck, ReportingConfig, TargetOrder};
pub use error::EngineError;
pub use events::{EventBus, SessionEvent};
pub use session::{ReportingSession, RunOutcome};
pub use sheet::{HiveReportSheet, SheetSaveSummary, WeekRow};
