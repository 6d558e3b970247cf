//! In-memory state of one batch mite-count submission.
//!
//! [`BatchPhase`] is the tagged state of a reporting session. Only
//! `Suspended` carries a [`PendingConflict`], so there is never more than one
//! outstanding conflict. [`Batch`] holds the fixed targets and inputs plus the
//! progress (`cursor`, `completed`, tally); its methods are pure and the
//! session performs the store calls between them.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};

use hivelog_core::{ApiaryId, Hive, HiveId, MiteCount, MiteReport, ReportKey, Week, Year};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub apiary_id: ApiaryId,
    pub targets: Vec<Hive>,
    pub inputs: BTreeMap<HiveId, MiteCount>,
}

impl Selection {
    pub fn new(apiary_id: ApiaryId, targets: Vec<Hive>) -> Self {
        Self {
            apiary_id,
            targets,
            inputs: BTreeMap::new(),
        }
    }

    pub fn contains(&self, hive_id: HiveId) -> bool {
        self.targets.iter().any(|h| h.hive_id == hive_id)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchPhase {
    Idle,
    Selecting(Selection),
    Running(Batch),
    Suspended {
        batch: Batch,
        conflict: PendingConflict,
    },
    Completed(BatchSummary),
    Cancelled,
}

impl BatchPhase {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Selecting(_) => "selecting",
            Self::Running(_) => "running",
            Self::Suspended { .. } => "suspended",
            Self::Completed(_) => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Running(_) | Self::Suspended { .. })
    }
}

/// A report key that already exists on the store, awaiting overwrite or skip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingConflict {
    pub hive_id: HiveId,
    pub hive_name: String,
    pub key: ReportKey,
    pub candidate: MiteCount,
    /// `None` when the conflict surfaced as a rejected create rather than a
    /// listed report.
    pub existing: Option<MiteCount>,
}

impl PendingConflict {
    /// Text for the decision prompt: names the hive and week and shows the
    /// value that would be written.
    pub fn prompt(&self) -> String {
        let current = match self.existing {
            Some(existing) => format!(" (currently {existing})"),
            None => String::new(),
        };
        format!(
            "{} already has a mite report for week {} of {}{current}. Overwrite with {}?",
            self.hive_name, self.key.week, self.key.year, self.candidate
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Overwrite,
    Skip,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    pub hive_id: HiveId,
    pub error: String,
}

/// Reported once when a batch finishes. Hives without input appear nowhere.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub year: Year,
    pub week: Week,
    pub succeeded: Vec<HiveId>,
    pub failed: Vec<FailedItem>,
    pub skipped: Vec<HiveId>,
}

impl BatchSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_hives(&self) -> Vec<HiveId> {
        self.failed.iter().map(|f| f.hive_id).collect()
    }
}

impl fmt::Display for BatchSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-W{:02}: {} saved, {} failed, {} skipped",
            self.year,
            self.week.get(),
            self.succeeded.len(),
            self.failed.len(),
            self.skipped.len()
        )
    }
}

/// What to do with the target under the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Every target has been advanced past.
    Done,
    /// Target already finalized; move on without a store call.
    AlreadyCompleted(HiveId),
    /// No count was entered for the target.
    NoInput(HiveId),
    Attempt { hive: Hive, count: MiteCount },
}

/// How the target under the cursor was finalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Succeeded,
    Failed(String),
    Skipped,
    Excluded,
}

/// Reports listed once at submit, per hive. A failed listing is kept so the
/// hive fails when its turn comes.
pub type ReportSnapshot = BTreeMap<HiveId, Result<Vec<MiteReport>, String>>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    year: Year,
    week: Week,
    targets: Vec<Hive>,
    inputs: BTreeMap<HiveId, MiteCount>,
    cursor: usize,
    completed: HashSet<HiveId>,
    snapshot: Option<ReportSnapshot>,
    succeeded: Vec<HiveId>,
    failed: Vec<FailedItem>,
    skipped: Vec<HiveId>,
}

impl Batch {
    pub fn new(
        year: Year,
        week: Week,
        targets: Vec<Hive>,
        inputs: BTreeMap<HiveId, MiteCount>,
    ) -> Self {
        Self {
            year,
            week,
            targets,
            inputs,
            cursor: 0,
            completed: HashSet::new(),
            snapshot: None,
            succeeded: Vec::new(),
            failed: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn with_snapshot(mut self, snapshot: ReportSnapshot) -> Self {
        self.snapshot = Some(snapshot);
        self
    }

    pub fn year(&self) -> Year {
        self.year
    }

    pub fn week(&self) -> Week {
        self.week
    }

    pub fn targets(&self) -> &[Hive] {
        &self.targets
    }

    pub fn inputs(&self) -> &BTreeMap<HiveId, MiteCount> {
        &self.inputs
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn is_completed(&self, hive_id: HiveId) -> bool {
        self.completed.contains(&hive_id)
    }

    pub fn is_finished(&self) -> bool {
        self.cursor >= self.targets.len()
    }

    pub fn snapshot(&self) -> Option<&ReportSnapshot> {
        self.snapshot.as_ref()
    }

    pub fn key_for(&self, hive_id: HiveId) -> ReportKey {
        ReportKey::new(hive_id, self.year, self.week)
    }

    pub fn next_step(&self) -> Step {
        let Some(target) = self.targets.get(self.cursor) else {
            return Step::Done;
        };
        if self.completed.contains(&target.hive_id) {
            return Step::AlreadyCompleted(target.hive_id);
        }
        match self.inputs.get(&target.hive_id) {
            None => Step::NoInput(target.hive_id),
            Some(count) => Step::Attempt {
                hive: target.clone(),
                count: *count,
            },
        }
    }

    /// Move past a target that was finalized earlier.
    pub fn pass_completed(&mut self) {
        if let Some(target) = self.targets.get(self.cursor) {
            debug_assert!(self.completed.contains(&target.hive_id));
            self.cursor += 1;
        }
    }

    /// Finalize the target under the cursor and advance. Items can only be
    /// finalized in target order. Returns the finalized hive.
    pub fn finalize_current(&mut self, outcome: ItemOutcome) -> Option<HiveId> {
        let hive_id = self.targets.get(self.cursor)?.hive_id;
        if !self.completed.insert(hive_id) {
            self.cursor += 1;
            return None;
        }
        match outcome {
            ItemOutcome::Succeeded => self.succeeded.push(hive_id),
            ItemOutcome::Failed(error) => self.failed.push(FailedItem { hive_id, error }),
            ItemOutcome::Skipped => self.skipped.push(hive_id),
            ItemOutcome::Excluded => {}
        }
        self.cursor += 1;
        Some(hive_id)
    }

    pub fn into_summary(self) -> BatchSummary {
        BatchSummary {
            year: self.year,
            week: self.week,
            succeeded: self.succeeded,
            failed: self.failed,
            skipped: self.skipped,
        }
    }
}
