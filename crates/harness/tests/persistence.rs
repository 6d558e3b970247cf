use hivelog_core::{NewHive, Year};
use hivelog_engine::{
    Decision, ExistenceCheck, ReportingConfig, ReportingSession, RunOutcome, TargetOrder,
};
use hivelog_storage::{ObservationStore, RegistryStore, SqliteStore};

type TestResult = Result<(), Box<dyn std::error::Error>>;

#[test]
fn batch_on_file_store_survives_reopen() -> TestResult {
    let dir = tempfile::tempdir()?;
    let db_path = dir.path().join("hivelog.db");
    let db = db_path.to_str().ok_or("non-utf8 temp path")?;
    let config_path = dir.path().join("reporting.toml");
    std::fs::write(
        &config_path,
        "target_order = \"name\"\nexistence_check = \"snapshot\"\n",
    )?;
    let config = ReportingConfig::load(&config_path)?;
    assert_eq!(config.target_order, TargetOrder::Name);
    assert_eq!(config.existence_check, ExistenceCheck::Snapshot);

    let mut store = SqliteStore::open(db)?;
    let apiary = store.create_apiary("Backen", "Gränna")?;
    let start = Year::new(2023)?;
    let bravo = store.create_hive(apiary.apiary_id, NewHive::new("Bravo", start, 4)?)?;
    let alfa = store.create_hive(apiary.apiary_id, NewHive::new("Alfa", start, 6)?)?;

    let mut session = ReportingSession::new(store, config.clone());
    session.select_apiary(apiary.apiary_id)?;
    let order: Vec<&str> = session.targets().iter().map(|h| h.name.as_str()).collect();
    assert_eq!(order, vec!["Alfa", "Bravo"]);
    session.select_period(2025, 30)?;
    session.set_count(alfa.hive_id, Some(11))?;
    session.set_count(bravo.hive_id, Some(0))?;
    let RunOutcome::Completed(first) = session.submit()? else {
        return Err("first batch should complete without conflicts".into());
    };
    assert_eq!(first.succeeded, vec![alfa.hive_id, bravo.hive_id]);
    drop(session.into_store());

    let store = SqliteStore::open(db)?;
    assert_eq!(store.list_hives_for_apiary(apiary.apiary_id)?.len(), 2);
    let mut session = ReportingSession::new(store, config);
    session.select_apiary(apiary.apiary_id)?;
    session.select_period(2025, 30)?;
    session.set_count(bravo.hive_id, Some(2))?;
    let RunOutcome::Suspended(conflict) = session.submit()? else {
        return Err("reopened store should report the earlier week".into());
    };
    assert_eq!(conflict.hive_id, bravo.hive_id);
    assert_eq!(conflict.existing.map(|c| c.get()), Some(0));
    session.resolve_conflict(Decision::Skip)?;

    let reports = session.store().list_reports_for_hive(bravo.hive_id)?;
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].count.get(), 0);
    Ok(())
}
