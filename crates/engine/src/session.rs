use std::collections::BTreeMap;

use crossbeam::channel::Receiver;
use tracing::{debug, info, warn};

use hivelog_core::{ApiaryId, Hive, HiveId, MiteCount, MiteReport, ReportKey, Week, Year};
use hivelog_storage::{ObservationStore, StorageError};

use crate::batch::{
    Batch, BatchPhase, BatchSummary, Decision, ItemOutcome, PendingConflict, ReportSnapshot,
    Selection, Step,
};
use crate::config::{ExistenceCheck, ReportingConfig, TargetOrder};
use crate::error::EngineError;
use crate::events::{EventBus, SessionEvent};

/// Where a call to [`ReportingSession::run`] left the batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// Waiting for [`ReportingSession::resolve_conflict`].
    Suspended(PendingConflict),
    Completed(BatchSummary),
    /// No batch was running; nothing was done.
    Inactive,
}

/// One open reporting dialog: selection, batch progress and the conflict
/// prompt for a single user. Nothing here outlives the session.
pub struct ReportingSession<S: ObservationStore> {
    store: S,
    config: ReportingConfig,
    events: EventBus,
    period: Option<(Year, Week)>,
    phase: BatchPhase,
}

impl<S: ObservationStore> ReportingSession<S> {
    pub fn new(store: S, config: ReportingConfig) -> Self {
        Self {
            store,
            config,
            events: EventBus::new(),
            period: None,
            phase: BatchPhase::Idle,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    pub fn into_store(self) -> S {
        self.store
    }

    pub fn config(&self) -> &ReportingConfig {
        &self.config
    }

    pub fn phase(&self) -> &BatchPhase {
        &self.phase
    }

    pub fn period(&self) -> Option<(Year, Week)> {
        self.period
    }

    pub fn subscribe(&mut self) -> Receiver<SessionEvent> {
        self.events.subscribe()
    }

    pub fn pending_conflict(&self) -> Option<&PendingConflict> {
        match &self.phase {
            BatchPhase::Suspended { conflict, .. } => Some(conflict),
            _ => None,
        }
    }

    pub fn targets(&self) -> &[Hive] {
        match &self.phase {
            BatchPhase::Selecting(selection) => &selection.targets,
            BatchPhase::Running(batch) | BatchPhase::Suspended { batch, .. } => batch.targets(),
            _ => &[],
        }
    }

    pub fn count_for(&self, hive_id: HiveId) -> Option<MiteCount> {
        match &self.phase {
            BatchPhase::Selecting(selection) => selection.inputs.get(&hive_id).copied(),
            BatchPhase::Running(batch) | BatchPhase::Suspended { batch, .. } => {
                batch.inputs().get(&hive_id).copied()
            }
            _ => None,
        }
    }

    // ========================================================================
    // Target/Input Selection
    // ========================================================================

    /// Choose the apiary whose hives form the batch. Any inputs or batch
    /// progress from a previous selection is discarded first.
    pub fn select_apiary(&mut self, apiary_id: ApiaryId) -> Result<(), EngineError> {
        self.discard("apiary changed");

        let mut targets = self.store.list_hives_for_apiary(apiary_id)?;
        if self.config.target_order == TargetOrder::Name {
            targets.sort_by(|a, b| a.name.cmp(&b.name));
        }
        debug!(apiary = %apiary_id, targets = targets.len(), "apiary selected");
        self.phase = BatchPhase::Selecting(Selection::new(apiary_id, targets));
        Ok(())
    }

    pub fn select_period(&mut self, year: i64, week: i64) -> Result<(), EngineError> {
        if self.phase.is_active() {
            return Err(EngineError::BatchInProgress);
        }
        self.period = Some((Year::new(year)?, Week::new(week)?));
        Ok(())
    }

    /// Enter or clear (`None`) the count for one hive. Invalid counts are
    /// rejected here and never reach a batch.
    pub fn set_count(&mut self, hive_id: HiveId, count: Option<i64>) -> Result<(), EngineError> {
        let selection = match &mut self.phase {
            BatchPhase::Selecting(selection) => selection,
            BatchPhase::Running(_) | BatchPhase::Suspended { .. } => {
                return Err(EngineError::BatchInProgress);
            }
            _ => return Err(EngineError::NoApiarySelected),
        };
        if !selection.contains(hive_id) {
            return Err(EngineError::UnknownHive(hive_id.to_string()));
        }
        match count {
            Some(raw) => {
                let count = MiteCount::parse(raw)?;
                selection.inputs.insert(hive_id, count);
            }
            None => {
                selection.inputs.remove(&hive_id);
            }
        }
        Ok(())
    }

    // ========================================================================
    // Batch Coordinator
    // ========================================================================

    /// Freeze the selection into a batch and start running it.
    pub fn submit(&mut self) -> Result<RunOutcome, EngineError> {
        match &self.phase {
            BatchPhase::Selecting(_) => {}
            BatchPhase::Running(_) | BatchPhase::Suspended { .. } => {
                return Err(EngineError::BatchInProgress);
            }
            _ => return Err(EngineError::NoApiarySelected),
        }
        let (year, week) = self.period.ok_or(EngineError::PeriodNotSelected)?;
        let BatchPhase::Selecting(selection) = std::mem::replace(&mut self.phase, BatchPhase::Idle)
        else {
            return Err(EngineError::NoApiarySelected);
        };

        let mut batch = Batch::new(year, week, selection.targets, selection.inputs);
        if self.config.existence_check == ExistenceCheck::Snapshot {
            let snapshot = self.snapshot_reports(&batch);
            batch = batch.with_snapshot(snapshot);
        }
        info!(
            apiary = %selection.apiary_id,
            year = %year,
            week = %week,
            targets = batch.targets().len(),
            inputs = batch.inputs().len(),
            "batch submitted"
        );
        self.phase = BatchPhase::Running(batch);
        Ok(self.run())
    }

    /// Advance the batch until it completes or hits a conflict.
    ///
    /// Safe to call at any time: while a conflict is outstanding it returns
    /// that conflict untouched, and outside a running batch it does nothing.
    /// Targets already finalized are passed over without store calls.
    pub fn run(&mut self) -> RunOutcome {
        let mut batch = match std::mem::replace(&mut self.phase, BatchPhase::Idle) {
            BatchPhase::Running(batch) => batch,
            BatchPhase::Suspended { batch, conflict } => {
                debug!(hive = %conflict.hive_id, "run ignored while a conflict is pending");
                let outcome = RunOutcome::Suspended(conflict.clone());
                self.phase = BatchPhase::Suspended { batch, conflict };
                return outcome;
            }
            other => {
                self.phase = other;
                return RunOutcome::Inactive;
            }
        };

        loop {
            match batch.next_step() {
                Step::Done => break,
                Step::AlreadyCompleted(hive_id) => {
                    debug!(hive = %hive_id, cursor = batch.cursor(), "already handled");
                    batch.pass_completed();
                }
                Step::NoInput(hive_id) => {
                    debug!(hive = %hive_id, cursor = batch.cursor(), "no input, excluded");
                    batch.finalize_current(ItemOutcome::Excluded);
                }
                Step::Attempt { hive, count } => {
                    let key = batch.key_for(hive.hive_id);
                    let existing = match self.existing_report(&batch, key) {
                        Ok(existing) => existing,
                        Err(error) => {
                            warn!(hive = %hive.hive_id, %error, "existence check failed");
                            batch.finalize_current(ItemOutcome::Failed(error));
                            continue;
                        }
                    };
                    if let Some(report) = existing {
                        return self.suspend(batch, &hive, key, count, Some(report.count));
                    }
                    match self.store.create_report(key, count) {
                        Ok(_) => {
                            debug!(hive = %hive.hive_id, count = count.get(), "report created");
                            self.events
                                .publish(SessionEvent::ReportWritten { key, count });
                            batch.finalize_current(ItemOutcome::Succeeded);
                        }
                        Err(StorageError::DuplicateReport(_)) => {
                            return self.suspend(batch, &hive, key, count, None);
                        }
                        Err(e) => {
                            warn!(hive = %hive.hive_id, error = %e, "create failed");
                            batch.finalize_current(ItemOutcome::Failed(e.to_string()));
                        }
                    }
                }
            }
        }

        let summary = batch.into_summary();
        info!(summary = %summary, "batch completed");
        self.events
            .publish(SessionEvent::BatchCompleted(summary.clone()));
        self.phase = BatchPhase::Completed(summary.clone());
        RunOutcome::Completed(summary)
    }

    fn suspend(
        &mut self,
        batch: Batch,
        hive: &Hive,
        key: ReportKey,
        candidate: MiteCount,
        existing: Option<MiteCount>,
    ) -> RunOutcome {
        let conflict = PendingConflict {
            hive_id: hive.hive_id,
            hive_name: hive.name.clone(),
            key,
            candidate,
            existing,
        };
        info!(hive = %hive.hive_id, key = %key, cursor = batch.cursor(), "conflict, awaiting decision");
        self.events
            .publish(SessionEvent::ConflictDetected(conflict.clone()));
        self.phase = BatchPhase::Suspended {
            batch,
            conflict: conflict.clone(),
        };
        RunOutcome::Suspended(conflict)
    }

    fn existing_report(
        &self,
        batch: &Batch,
        key: ReportKey,
    ) -> Result<Option<MiteReport>, String> {
        let matching = |reports: &[MiteReport]| {
            reports
                .iter()
                .find(|r| r.is_for(key.year, key.week))
                .cloned()
        };
        match batch.snapshot() {
            Some(snapshot) => match snapshot.get(&key.hive_id) {
                Some(Ok(reports)) => Ok(matching(reports)),
                Some(Err(error)) => Err(error.clone()),
                None => Ok(None),
            },
            None => self
                .store
                .list_reports_for_hive(key.hive_id)
                .map(|reports| matching(&reports))
                .map_err(|e| e.to_string()),
        }
    }

    fn snapshot_reports(&self, batch: &Batch) -> ReportSnapshot {
        let mut snapshot = BTreeMap::new();
        for hive in batch.targets() {
            if !batch.inputs().contains_key(&hive.hive_id) {
                continue;
            }
            let listed = self
                .store
                .list_reports_for_hive(hive.hive_id)
                .map_err(|e| e.to_string());
            snapshot.insert(hive.hive_id, listed);
        }
        snapshot
    }

    // ========================================================================
    // Conflict Resolver
    // ========================================================================

    /// Apply the user's decision on the outstanding conflict and resume.
    /// Rejected, with state untouched, when no conflict is pending.
    pub fn resolve_conflict(&mut self, decision: Decision) -> Result<RunOutcome, EngineError> {
        let (mut batch, conflict) = match std::mem::replace(&mut self.phase, BatchPhase::Idle) {
            BatchPhase::Suspended { batch, conflict } => (batch, conflict),
            other => {
                warn!(phase = other.name(), "conflict decision without a pending conflict");
                self.phase = other;
                return Err(EngineError::NoPendingConflict);
            }
        };

        let outcome = match decision {
            Decision::Overwrite => {
                match self.store.update_report(conflict.key, conflict.candidate) {
                    Ok(_) => {
                        info!(key = %conflict.key, count = conflict.candidate.get(), "report overwritten");
                        self.events.publish(SessionEvent::ReportWritten {
                            key: conflict.key,
                            count: conflict.candidate,
                        });
                        ItemOutcome::Succeeded
                    }
                    Err(e) => {
                        warn!(key = %conflict.key, error = %e, "overwrite failed");
                        ItemOutcome::Failed(e.to_string())
                    }
                }
            }
            Decision::Skip => {
                info!(key = %conflict.key, "conflict skipped");
                ItemOutcome::Skipped
            }
        };
        let finalized = batch.finalize_current(outcome);
        debug_assert_eq!(finalized, Some(conflict.hive_id));

        self.phase = BatchPhase::Running(batch);
        Ok(self.run())
    }

    // ========================================================================
    // Cancellation
    // ========================================================================

    /// Stop the batch. Reports already written stay on the store.
    pub fn cancel(&mut self) {
        if matches!(self.phase, BatchPhase::Idle) {
            return;
        }
        self.discard("cancelled");
        self.phase = BatchPhase::Cancelled;
    }

    /// Dialog closed: drop everything, including a finished summary.
    pub fn close(&mut self) {
        self.discard("closed");
        self.phase = BatchPhase::Idle;
    }

    fn discard(&mut self, reason: &str) {
        let previous = std::mem::replace(&mut self.phase, BatchPhase::Idle);
        match &previous {
            BatchPhase::Running(batch) | BatchPhase::Suspended { batch, .. } => {
                info!(reason, cursor = batch.cursor(), targets = batch.targets().len(), "batch discarded");
                self.events.publish(SessionEvent::BatchCancelled);
            }
            BatchPhase::Selecting(selection) if !selection.inputs.is_empty() => {
                debug!(reason, inputs = selection.inputs.len(), "inputs discarded");
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hivelog_core::NewHive;
    use hivelog_storage::{RegistryStore, SqliteStore};

    fn session_with_hives(names: &[&str]) -> (ReportingSession<SqliteStore>, ApiaryId, Vec<Hive>) {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let apiary = store.create_apiary("Gården", "Visingsö").unwrap();
        let hives = names
            .iter()
            .map(|name| {
                store
                    .create_hive(
                        apiary.apiary_id,
                        NewHive::new(name, Year::new(2020).unwrap(), 5).unwrap(),
                    )
                    .unwrap()
            })
            .collect();
        let session = ReportingSession::new(store, ReportingConfig::default());
        (session, apiary.apiary_id, hives)
    }

    #[test]
    fn set_count_requires_selection() {
        let (mut session, _, hives) = session_with_hives(&["H1"]);
        let result = session.set_count(hives[0].hive_id, Some(3));
        assert!(matches!(result, Err(EngineError::NoApiarySelected)));
    }

    #[test]
    fn negative_count_rejected_at_input() {
        let (mut session, apiary_id, hives) = session_with_hives(&["H1"]);
        session.select_apiary(apiary_id).unwrap();
        let result = session.set_count(hives[0].hive_id, Some(-2));
        assert!(matches!(result, Err(EngineError::Core(_))));
        assert_eq!(session.count_for(hives[0].hive_id), None);
    }

    #[test]
    fn unknown_hive_rejected() {
        let (mut session, apiary_id, _) = session_with_hives(&["H1"]);
        session.select_apiary(apiary_id).unwrap();
        let result = session.set_count(HiveId::new(), Some(2));
        assert!(matches!(result, Err(EngineError::UnknownHive(_))));
    }

    #[test]
    fn clearing_a_count_removes_the_input() {
        let (mut session, apiary_id, hives) = session_with_hives(&["H1"]);
        session.select_apiary(apiary_id).unwrap();
        session.set_count(hives[0].hive_id, Some(2)).unwrap();
        session.set_count(hives[0].hive_id, None).unwrap();
        assert_eq!(session.count_for(hives[0].hive_id), None);
    }

    #[test]
    fn submit_without_period_keeps_selection() {
        let (mut session, apiary_id, hives) = session_with_hives(&["H1"]);
        session.select_apiary(apiary_id).unwrap();
        session.set_count(hives[0].hive_id, Some(2)).unwrap();
        assert!(matches!(session.submit(), Err(EngineError::PeriodNotSelected)));
        assert_eq!(session.phase().name(), "selecting");
        assert_eq!(session.count_for(hives[0].hive_id), Some(MiteCount::new(2)));
    }

    #[test]
    fn invalid_period_rejected() {
        let (mut session, _, _) = session_with_hives(&[]);
        assert!(session.select_period(2025, 0).is_err());
        assert!(session.select_period(2025, 54).is_err());
        assert_eq!(session.period(), None);
    }

    #[test]
    fn name_order_sorts_targets() {
        let (session, apiary_id, _) = session_with_hives(&["Citron", "Apel", "Björk"]);
        let store = session.into_store();
        let config = ReportingConfig {
            target_order: TargetOrder::Name,
            ..ReportingConfig::default()
        };
        let mut session = ReportingSession::new(store, config);
        session.select_apiary(apiary_id).unwrap();
        let names: Vec<&str> = session.targets().iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Apel", "Björk", "Citron"]);
    }

    #[test]
    fn empty_batch_completes_immediately() {
        let (mut session, apiary_id, _) = session_with_hives(&["H1", "H2"]);
        session.select_apiary(apiary_id).unwrap();
        session.select_period(2025, 18).unwrap();
        match session.submit().unwrap() {
            RunOutcome::Completed(summary) => {
                assert!(summary.succeeded.is_empty());
                assert!(summary.is_success());
            }
            other => panic!("expected completion, got {other:?}"),
        }
        assert_eq!(session.store().report_count().unwrap(), 0);
    }

    #[test]
    fn resolve_without_conflict_is_rejected() {
        let (mut session, apiary_id, _) = session_with_hives(&["H1"]);
        session.select_apiary(apiary_id).unwrap();
        let result = session.resolve_conflict(Decision::Overwrite);
        assert!(matches!(result, Err(EngineError::NoPendingConflict)));
        assert_eq!(session.phase().name(), "selecting");
    }

    #[test]
    fn cancel_from_idle_is_a_no_op() {
        let (mut session, _, _) = session_with_hives(&[]);
        session.cancel();
        assert_eq!(session.phase(), &BatchPhase::Idle);
    }

    #[test]
    fn run_when_idle_is_inactive() {
        let (mut session, _, _) = session_with_hives(&[]);
        assert_eq!(session.run(), RunOutcome::Inactive);
    }
}
