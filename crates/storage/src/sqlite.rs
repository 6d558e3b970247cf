use rusqlite::{Connection, OptionalExtension};
use tracing::debug;

use hivelog_core::{
    Apiary, ApiaryId, ApiaryOverview, Hive, HiveId, MiteCount, MiteReport, NewHive, ReportId,
    ReportKey, Week, Year,
};

use crate::error::StorageError;
use crate::traits::{ObservationStore, RegistryStore};

/// Convert Vec<u8> to fixed-size array with proper error handling.
fn to_array<const N: usize>(v: Vec<u8>, label: &str) -> Result<[u8; N], StorageError> {
    v.try_into()
        .map_err(|_| StorageError::Serialization(format!("invalid {label} length")))
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
    )
}

fn is_foreign_key_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_FOREIGNKEY
    )
}

/// SQLite-backed store. Enforces the same (hive, year, week) uniqueness the
/// remote service does.
pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let conn = Connection::open(path)?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        crate::schema::init_schema(&conn)?;
        Ok(Self { conn })
    }

    pub fn report_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM mite_reports", [], |row| row.get(0))?;
        Ok(count as u64)
    }

    fn get_report(&self, key: ReportKey) -> Result<Option<MiteReport>, StorageError> {
        let raw = self
            .conn
            .query_row(
                "SELECT report_id, hive_id, year, week, mite_count FROM mite_reports WHERE hive_id = ?1 AND year = ?2 AND week = ?3",
                rusqlite::params![
                    key.hive_id.as_bytes().as_slice(),
                    i64::from(key.year),
                    i64::from(key.week),
                ],
                read_report_row,
            )
            .optional()?;
        raw.map(report_from_row).transpose()
    }
}

type ReportRow = (Vec<u8>, Vec<u8>, i64, i64, i64);
type HiveRow = (Vec<u8>, Vec<u8>, String, Option<String>, i64, i64);

fn read_report_row(row: &rusqlite::Row) -> rusqlite::Result<ReportRow> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?))
}

fn report_from_row(raw: ReportRow) -> Result<MiteReport, StorageError> {
    let (report_id, hive_id, year, week, count) = raw;
    Ok(MiteReport {
        report_id: ReportId::from_bytes(to_array::<16>(report_id, "report_id")?),
        hive_id: HiveId::from_bytes(to_array::<16>(hive_id, "hive_id")?),
        year: Year::new(year)?,
        week: Week::new(week)?,
        count: MiteCount::parse(count)?,
    })
}

fn read_hive_row(row: &rusqlite::Row) -> rusqlite::Result<HiveRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
    ))
}

fn hive_from_row(raw: HiveRow) -> Result<Hive, StorageError> {
    let (hive_id, apiary_id, name, description, start_year, start_month) = raw;
    let start_month = u8::try_from(start_month)
        .map_err(|_| StorageError::Serialization(format!("invalid start_month {start_month}")))?;
    Ok(Hive {
        hive_id: HiveId::from_bytes(to_array::<16>(hive_id, "hive_id")?),
        apiary_id: ApiaryId::from_bytes(to_array::<16>(apiary_id, "apiary_id")?),
        name,
        description,
        start_year: Year::new(start_year)?,
        start_month,
    })
}

fn overview_from_row(
    raw: (Vec<u8>, String, String, i64),
) -> Result<ApiaryOverview, StorageError> {
    let (apiary_id, name, location, hive_count) = raw;
    Ok(ApiaryOverview {
        apiary: Apiary {
            apiary_id: ApiaryId::from_bytes(to_array::<16>(apiary_id, "apiary_id")?),
            name,
            location,
        },
        hive_count: hive_count as u32,
    })
}

impl ObservationStore for SqliteStore {
    fn list_hives_for_apiary(&self, apiary_id: ApiaryId) -> Result<Vec<Hive>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT hive_id, apiary_id, name, description, start_year, start_month FROM hives WHERE apiary_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![apiary_id.as_bytes().as_slice()], read_hive_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(hive_from_row).collect()
    }

    fn list_reports_for_hive(&self, hive_id: HiveId) -> Result<Vec<MiteReport>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT report_id, hive_id, year, week, mite_count FROM mite_reports WHERE hive_id = ?1 ORDER BY year, week",
        )?;
        let rows = stmt
            .query_map(rusqlite::params![hive_id.as_bytes().as_slice()], read_report_row)?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(report_from_row).collect()
    }

    fn create_report(
        &mut self,
        key: ReportKey,
        count: MiteCount,
    ) -> Result<MiteReport, StorageError> {
        let report_id = ReportId::new();
        let result = self.conn.execute(
            "INSERT INTO mite_reports (report_id, hive_id, year, week, mite_count) VALUES (?1, ?2, ?3, ?4, ?5)",
            rusqlite::params![
                report_id.as_bytes().as_slice(),
                key.hive_id.as_bytes().as_slice(),
                i64::from(key.year),
                i64::from(key.week),
                i64::from(count),
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_unique_violation(&e) => {
                return Err(StorageError::DuplicateReport(key));
            }
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(StorageError::NotFound(format!("hive {}", key.hive_id)));
            }
            Err(e) => return Err(StorageError::Sqlite(e)),
        }
        debug!(key = %key, count = count.get(), "report created");
        Ok(MiteReport {
            report_id,
            hive_id: key.hive_id,
            year: key.year,
            week: key.week,
            count,
        })
    }

    fn update_report(
        &mut self,
        key: ReportKey,
        count: MiteCount,
    ) -> Result<MiteReport, StorageError> {
        let changed = self.conn.execute(
            "UPDATE mite_reports SET mite_count = ?1, updated_at = CAST(unixepoch('now','subsec') * 1000 AS INTEGER)
             WHERE hive_id = ?2 AND year = ?3 AND week = ?4",
            rusqlite::params![
                i64::from(count),
                key.hive_id.as_bytes().as_slice(),
                i64::from(key.year),
                i64::from(key.week),
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("report {key}")));
        }
        debug!(key = %key, count = count.get(), "report updated");
        self.get_report(key)?
            .ok_or_else(|| StorageError::NotFound(format!("report {key}")))
    }
}

impl RegistryStore for SqliteStore {
    fn create_apiary(&mut self, name: &str, location: &str) -> Result<Apiary, StorageError> {
        let apiary_id = ApiaryId::new();
        self.conn.execute(
            "INSERT INTO apiaries (apiary_id, name, location) VALUES (?1, ?2, ?3)",
            rusqlite::params![apiary_id.as_bytes().as_slice(), name, location],
        )?;
        debug!(apiary = %apiary_id, name, "apiary created");
        Ok(Apiary {
            apiary_id,
            name: name.to_string(),
            location: location.to_string(),
        })
    }

    fn get_apiary(&self, apiary_id: ApiaryId) -> Result<Option<ApiaryOverview>, StorageError> {
        let raw = self
            .conn
            .query_row(
                "SELECT a.apiary_id, a.name, a.location, COUNT(h.rowid) FROM apiaries a
                 LEFT JOIN hives h ON h.apiary_id = a.apiary_id
                 WHERE a.apiary_id = ?1 GROUP BY a.rowid",
                rusqlite::params![apiary_id.as_bytes().as_slice()],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;
        raw.map(overview_from_row).transpose()
    }

    fn list_apiaries(&self) -> Result<Vec<ApiaryOverview>, StorageError> {
        let mut stmt = self.conn.prepare(
            "SELECT a.apiary_id, a.name, a.location, COUNT(h.rowid) FROM apiaries a
             LEFT JOIN hives h ON h.apiary_id = a.apiary_id
             GROUP BY a.rowid ORDER BY a.rowid",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(overview_from_row).collect()
    }

    fn update_apiary(
        &mut self,
        apiary_id: ApiaryId,
        name: &str,
        location: &str,
    ) -> Result<Apiary, StorageError> {
        let changed = self.conn.execute(
            "UPDATE apiaries SET name = ?1, location = ?2 WHERE apiary_id = ?3",
            rusqlite::params![name, location, apiary_id.as_bytes().as_slice()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("apiary {apiary_id}")));
        }
        Ok(Apiary {
            apiary_id,
            name: name.to_string(),
            location: location.to_string(),
        })
    }

    fn delete_apiary(&mut self, apiary_id: ApiaryId) -> Result<(), StorageError> {
        let changed = self.conn.execute(
            "DELETE FROM apiaries WHERE apiary_id = ?1",
            rusqlite::params![apiary_id.as_bytes().as_slice()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("apiary {apiary_id}")));
        }
        debug!(apiary = %apiary_id, "apiary deleted");
        Ok(())
    }

    fn create_hive(&mut self, apiary_id: ApiaryId, hive: NewHive) -> Result<Hive, StorageError> {
        let hive_id = HiveId::new();
        let result = self.conn.execute(
            "INSERT INTO hives (hive_id, apiary_id, name, description, start_year, start_month) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            rusqlite::params![
                hive_id.as_bytes().as_slice(),
                apiary_id.as_bytes().as_slice(),
                hive.name,
                hive.description,
                i64::from(hive.start_year),
                hive.start_month,
            ],
        );
        match result {
            Ok(_) => {}
            Err(e) if is_foreign_key_violation(&e) => {
                return Err(StorageError::NotFound(format!("apiary {apiary_id}")));
            }
            Err(e) => return Err(StorageError::Sqlite(e)),
        }
        Ok(Hive {
            hive_id,
            apiary_id,
            name: hive.name,
            description: hive.description,
            start_year: hive.start_year,
            start_month: hive.start_month,
        })
    }

    fn get_hive(&self, hive_id: HiveId) -> Result<Option<Hive>, StorageError> {
        let raw = self
            .conn
            .query_row(
                "SELECT hive_id, apiary_id, name, description, start_year, start_month FROM hives WHERE hive_id = ?1",
                rusqlite::params![hive_id.as_bytes().as_slice()],
                read_hive_row,
            )
            .optional()?;
        raw.map(hive_from_row).transpose()
    }
}
