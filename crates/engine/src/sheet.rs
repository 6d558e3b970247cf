use std::collections::BTreeMap;

use tracing::{debug, warn};

use hivelog_core::{HiveId, MiteCount, MiteReport, ReportKey, Week, Year, report_years};
use hivelog_storage::ObservationStore;

use crate::error::EngineError;

/// Weeks always shown on a sheet. Week 53 appears only when it has data.
pub const SHEET_WEEKS: u8 = 52;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WeekRow {
    pub week: Week,
    pub stored: Option<MiteCount>,
    pub staged: Option<MiteCount>,
}

impl WeekRow {
    /// Value to display: the staged edit if any, else the stored count.
    pub fn shown(&self) -> Option<MiteCount> {
        self.staged.or(self.stored)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SheetSaveSummary {
    pub saved: Vec<Week>,
    pub failed: Vec<(Week, String)>,
    /// Set when the writes went through but the fresh report list could not
    /// be fetched.
    pub reload_error: Option<String>,
}

impl SheetSaveSummary {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.reload_error.is_none()
    }
}

/// One hive's weekly mite counts for a year, editable in place.
///
/// Unlike a batch submission there is no conflict prompt: a week with a
/// stored report is updated, any other week is created.
#[derive(Debug, Clone)]
pub struct HiveReportSheet {
    hive_id: HiveId,
    year: Year,
    reports: Vec<MiteReport>,
    edits: BTreeMap<Week, MiteCount>,
}

impl HiveReportSheet {
    pub fn load<S: ObservationStore>(
        store: &S,
        hive_id: HiveId,
        year: Year,
    ) -> Result<Self, EngineError> {
        let reports = store.list_reports_for_hive(hive_id)?;
        Ok(Self {
            hive_id,
            year,
            reports,
            edits: BTreeMap::new(),
        })
    }

    pub fn hive_id(&self) -> HiveId {
        self.hive_id
    }

    pub fn year(&self) -> Year {
        self.year
    }

    pub fn years(&self, current: Year) -> Vec<Year> {
        report_years(&self.reports, current)
    }

    /// Switching year drops staged edits; they belong to the old year.
    pub fn select_year(&mut self, year: Year) {
        if year != self.year {
            self.edits.clear();
            self.year = year;
        }
    }

    pub fn stored(&self, week: Week) -> Option<&MiteReport> {
        self.reports.iter().find(|r| r.is_for(self.year, week))
    }

    pub fn rows(&self) -> Vec<WeekRow> {
        let mut rows = Vec::with_capacity(usize::from(SHEET_WEEKS));
        for raw in 1..=Week::MAX {
            let Ok(week) = Week::new(i64::from(raw)) else {
                continue;
            };
            let stored = self.stored(week).map(|r| r.count);
            let staged = self.edits.get(&week).copied();
            if raw > SHEET_WEEKS && stored.is_none() && staged.is_none() {
                continue;
            }
            rows.push(WeekRow { week, stored, staged });
        }
        rows
    }

    /// Stage a count for `week`; `None` drops the staged edit.
    pub fn edit(&mut self, week: i64, count: Option<i64>) -> Result<(), EngineError> {
        let week = Week::new(week)?;
        match count {
            Some(raw) => {
                self.edits.insert(week, MiteCount::parse(raw)?);
            }
            None => {
                self.edits.remove(&week);
            }
        }
        Ok(())
    }

    pub fn has_edits(&self) -> bool {
        !self.edits.is_empty()
    }

    pub fn discard_edits(&mut self) {
        self.edits.clear();
    }

    /// Write staged edits in week order, then reload the hive's reports.
    /// A failing week does not stop the others and stays staged for the
    /// next save. If the reload fails the sheet keeps the reports returned
    /// by the writes and the summary carries the reload error.
    pub fn save<S: ObservationStore>(&mut self, store: &mut S) -> SheetSaveSummary {
        let mut summary = SheetSaveSummary::default();
        let edits = std::mem::take(&mut self.edits);
        for (week, count) in edits {
            let key = ReportKey::new(self.hive_id, self.year, week);
            let result = if self.stored(week).is_some() {
                store.update_report(key, count)
            } else {
                store.create_report(key, count)
            };
            match result {
                Ok(report) => {
                    debug!(key = %key, count = count.get(), "sheet week saved");
                    self.apply(report);
                    summary.saved.push(week);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "sheet week not saved");
                    self.edits.insert(week, count);
                    summary.failed.push((week, e.to_string()));
                }
            }
        }
        match store.list_reports_for_hive(self.hive_id) {
            Ok(reports) => self.reports = reports,
            Err(e) => {
                warn!(hive = %self.hive_id, error = %e, "sheet reload failed");
                summary.reload_error = Some(e.to_string());
            }
        }
        summary
    }

    fn apply(&mut self, report: MiteReport) {
        let key = report.key();
        match self.reports.iter_mut().find(|r| r.key() == key) {
            Some(existing) => *existing = report,
            None => self.reports.push(report),
        }
    }
}
