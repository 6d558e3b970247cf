use hivelog_core::{
    Apiary, ApiaryId, ApiaryOverview, Hive, HiveId, MiteCount, MiteReport, NewHive, ReportKey,
};

use crate::error::StorageError;

/// The remote service holding hives and per-(hive, year, week) mite reports.
///
/// Existence of a report is derived by filtering [`list_reports_for_hive`];
/// there is no dedicated existence call.
///
/// [`list_reports_for_hive`]: ObservationStore::list_reports_for_hive
pub trait ObservationStore {
    fn list_hives_for_apiary(&self, apiary_id: ApiaryId) -> Result<Vec<Hive>, StorageError>;

    fn list_reports_for_hive(&self, hive_id: HiveId) -> Result<Vec<MiteReport>, StorageError>;

    /// Fails with [`StorageError::DuplicateReport`] if the key already exists.
    fn create_report(
        &mut self,
        key: ReportKey,
        count: MiteCount,
    ) -> Result<MiteReport, StorageError>;

    /// Overwrites the count of an existing report.
    fn update_report(
        &mut self,
        key: ReportKey,
        count: MiteCount,
    ) -> Result<MiteReport, StorageError>;
}

/// Apiary and hive registry maintained from the member pages.
pub trait RegistryStore {
    fn create_apiary(&mut self, name: &str, location: &str) -> Result<Apiary, StorageError>;

    fn get_apiary(&self, apiary_id: ApiaryId) -> Result<Option<ApiaryOverview>, StorageError>;

    fn list_apiaries(&self) -> Result<Vec<ApiaryOverview>, StorageError>;

    fn update_apiary(
        &mut self,
        apiary_id: ApiaryId,
        name: &str,
        location: &str,
    ) -> Result<Apiary, StorageError>;

    /// Removes the apiary together with its hives and their reports.
    fn delete_apiary(&mut self, apiary_id: ApiaryId) -> Result<(), StorageError>;

    fn create_hive(&mut self, apiary_id: ApiaryId, hive: NewHive) -> Result<Hive, StorageError>;

    fn get_hive(&self, hive_id: HiveId) -> Result<Option<Hive>, StorageError>;
}
