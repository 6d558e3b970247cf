use hivelog_core::{
    Apiary, ApiaryId, Hive, HiveId, MiteCount, MiteReport, NewHive, ReportKey, Week, Year,
};
use hivelog_engine::{ReportingConfig, ReportingSession};
use hivelog_storage::{ObservationStore, RegistryStore, SqliteStore, StorageError};

use crate::recording::RecordingStore;

pub type TestStore = RecordingStore<SqliteStore>;

/// An in-memory store seeded with one apiary and its hives.
pub struct TestApiary {
    pub store: SqliteStore,
    pub apiary: Apiary,
    pub hives: Vec<Hive>,
}

impl TestApiary {
    pub fn with_hives(names: &[&str]) -> Result<Self, StorageError> {
        let mut store = SqliteStore::open_in_memory()?;
        let apiary = store.create_apiary("Norrgården", "Visingsö")?;
        let start = Year::new(2021)?;
        let mut hives = Vec::new();
        for name in names {
            hives.push(store.create_hive(apiary.apiary_id, NewHive::new(name, start, 5)?)?);
        }
        Ok(Self {
            store,
            apiary,
            hives,
        })
    }

    pub fn apiary_id(&self) -> ApiaryId {
        self.apiary.apiary_id
    }

    /// Panics if no hive has that name.
    pub fn hive_id(&self, name: &str) -> HiveId {
        hive_id(&self.hives, name)
    }

    /// Store a report directly, as another member or an earlier visit would.
    pub fn seed_report(
        &mut self,
        name: &str,
        year: i64,
        week: i64,
        count: u32,
    ) -> Result<MiteReport, StorageError> {
        let key = ReportKey::new(self.hive_id(name), Year::new(year)?, Week::new(week)?);
        self.store.create_report(key, MiteCount::new(count))
    }

    pub fn start_session(self, config: ReportingConfig) -> TestSession {
        TestSession {
            session: ReportingSession::new(RecordingStore::new(self.store), config),
            apiary: self.apiary,
            hives: self.hives,
        }
    }
}

pub struct TestSession {
    pub session: ReportingSession<TestStore>,
    pub apiary: Apiary,
    pub hives: Vec<Hive>,
}

impl TestSession {
    pub fn apiary_id(&self) -> ApiaryId {
        self.apiary.apiary_id
    }

    pub fn hive_id(&self, name: &str) -> HiveId {
        hive_id(&self.hives, name)
    }

    pub fn store(&self) -> &TestStore {
        self.session.store()
    }

    pub fn store_mut(&mut self) -> &mut TestStore {
        self.session.store_mut()
    }

    /// Select the apiary and period, then enter the given counts.
    pub fn prepare(
        &mut self,
        year: i64,
        week: i64,
        counts: &[(&str, i64)],
    ) -> Result<(), hivelog_engine::EngineError> {
        self.session.select_apiary(self.apiary.apiary_id)?;
        self.session.select_period(year, week)?;
        for (name, count) in counts {
            let hive_id = self.hive_id(name);
            self.session.set_count(hive_id, Some(*count))?;
        }
        Ok(())
    }

    /// Stored count for a hive, read without going through the recorder.
    pub fn stored_count(&self, name: &str, year: i64, week: i64) -> Option<u32> {
        let hive_id = self.hive_id(name);
        let reports = self.store().inner().list_reports_for_hive(hive_id).ok()?;
        reports
            .into_iter()
            .find(|r| i64::from(r.year) == year && i64::from(r.week) == week)
            .map(|r| r.count.get())
    }
}

fn hive_id(hives: &[Hive], name: &str) -> HiveId {
    match hives.iter().find(|h| h.name == name) {
        Some(hive) => hive.hive_id,
        None => panic!("no hive named {name}"),
    }
}
