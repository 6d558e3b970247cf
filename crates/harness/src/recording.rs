use std::cell::RefCell;
use std::collections::HashMap;

use hivelog_core::{ApiaryId, Hive, HiveId, MiteCount, MiteReport, ReportKey};
use hivelog_storage::{ObservationStore, StorageError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreCall {
    ListHives(ApiaryId),
    ListReports(HiveId),
    Create(ReportKey),
    Update(ReportKey),
}

impl StoreCall {
    pub fn hive_id(&self) -> Option<HiveId> {
        match self {
            Self::ListHives(_) => None,
            Self::ListReports(hive_id) => Some(*hive_id),
            Self::Create(key) | Self::Update(key) => Some(key.hive_id),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultOp {
    ListReports,
    Create,
    Update,
}

/// Wraps a store, recording every call and failing the ones configured with
/// [`RecordingStore::fail`] until they are healed.
pub struct RecordingStore<S> {
    inner: S,
    calls: RefCell<Vec<StoreCall>>,
    faults: HashMap<(FaultOp, HiveId), String>,
}

impl<S: ObservationStore> RecordingStore<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            calls: RefCell::new(Vec::new()),
            faults: HashMap::new(),
        }
    }

    /// Unrecorded access, e.g. to play a concurrent writer.
    pub fn inner(&self) -> &S {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn fail(&mut self, op: FaultOp, hive_id: HiveId, message: &str) {
        self.faults.insert((op, hive_id), message.to_string());
    }

    pub fn heal(&mut self, op: FaultOp, hive_id: HiveId) {
        self.faults.remove(&(op, hive_id));
    }

    pub fn calls(&self) -> Vec<StoreCall> {
        self.calls.borrow().clone()
    }

    pub fn calls_for(&self, hive_id: HiveId) -> Vec<StoreCall> {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.hive_id() == Some(hive_id))
            .copied()
            .collect()
    }

    pub fn call_count(&self) -> usize {
        self.calls.borrow().len()
    }

    pub fn clear_calls(&self) {
        self.calls.borrow_mut().clear();
    }

    fn record(&self, call: StoreCall) {
        self.calls.borrow_mut().push(call);
    }

    fn check_fault(&self, op: FaultOp, hive_id: HiveId) -> Result<(), StorageError> {
        match self.faults.get(&(op, hive_id)) {
            Some(message) => Err(StorageError::Unavailable(message.clone())),
            None => Ok(()),
        }
    }
}

impl<S: ObservationStore> ObservationStore for RecordingStore<S> {
    fn list_hives_for_apiary(&self, apiary_id: ApiaryId) -> Result<Vec<Hive>, StorageError> {
        self.record(StoreCall::ListHives(apiary_id));
        self.inner.list_hives_for_apiary(apiary_id)
    }

    fn list_reports_for_hive(&self, hive_id: HiveId) -> Result<Vec<MiteReport>, StorageError> {
        self.record(StoreCall::ListReports(hive_id));
        self.check_fault(FaultOp::ListReports, hive_id)?;
        self.inner.list_reports_for_hive(hive_id)
    }

    fn create_report(
        &mut self,
        key: ReportKey,
        count: MiteCount,
    ) -> Result<MiteReport, StorageError> {
        self.record(StoreCall::Create(key));
        self.check_fault(FaultOp::Create, key.hive_id)?;
        self.inner.create_report(key, count)
    }

    fn update_report(
        &mut self,
        key: ReportKey,
        count: MiteCount,
    ) -> Result<MiteReport, StorageError> {
        self.record(StoreCall::Update(key));
        self.check_fault(FaultOp::Update, key.hive_id)?;
        self.inner.update_report(key, count)
    }
}
