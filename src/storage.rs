//! Storage and export for merged records.
//!
//! `SqliteStore` upserts by canonical key so re-running a merge over the
//! same CPUs updates rows in place.

use rusqlite::{params, Connection, OptionalExtension};
use serde::Serialize;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::Result;
use crate::models::{Manufacturer, MergedRecord, SpecFields, SpecificationRecord};

const WRITE_BATCH_SIZE: usize = 1_000;

/// Export document format version.
pub const EXPORT_VERSION: u32 = 1;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted,
    Updated,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UpsertSummary {
    pub inserted: usize,
    pub updated: usize,
}

impl UpsertSummary {
    fn add(&mut self, outcome: UpsertOutcome) {
        match outcome {
            UpsertOutcome::Inserted => self.inserted += 1,
            UpsertOutcome::Updated => self.updated += 1,
        }
    }
}

/// Consumer of merged records. Upserts must be idempotent per canonical key.
pub trait SpecSink {
    fn upsert(&mut self, record: &MergedRecord) -> Result<UpsertOutcome>;

    fn upsert_all(&mut self, records: &[MergedRecord]) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for record in records {
            summary.add(self.upsert(record)?);
        }
        Ok(summary)
    }
}

/// One row read back from the store.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredCpu {
    pub canonical_key: String,
    pub name: String,
    pub manufacturer: Manufacturer,
    pub source: String,
    pub quality_score: f64,
    pub fields: SpecFields,
}

impl StoredCpu {
    /// Rebuild the record as stored. Priority and raw data are not kept.
    pub fn to_record(&self) -> SpecificationRecord {
        let mut record =
            SpecificationRecord::new(self.name.clone(), self.manufacturer, self.source.clone());
        record.fields = self.fields.clone();
        record
    }
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA temp_store = MEMORY;",
        )?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS cpus (
                canonical_key TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                manufacturer TEXT NOT NULL,
                source TEXT NOT NULL,
                source_priority TEXT NOT NULL,
                cores INTEGER,
                threads INTEGER,
                base_clock INTEGER,
                boost_clock INTEGER,
                tdp INTEGER,
                socket_name TEXT,
                quality_score REAL NOT NULL,
                contributors TEXT NOT NULL,
                missing_fields TEXT NOT NULL,
                fields_json TEXT NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_cpus_quality ON cpus(quality_score);",
        )?;
        Ok(Self { conn })
    }

    pub fn count(&self) -> Result<usize> {
        let n: i64 = self.conn.query_row("SELECT COUNT(*) FROM cpus", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    pub fn load_all(&self) -> Result<Vec<StoredCpu>> {
        let mut stmt = self.conn.prepare(
            "SELECT canonical_key, name, manufacturer, source, quality_score, fields_json
             FROM cpus ORDER BY canonical_key",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, f64>(4)?,
                row.get::<_, String>(5)?,
            ))
        })?;

        let mut cpus = Vec::new();
        for row in rows {
            let (canonical_key, name, manufacturer, source, quality_score, fields_json) = row?;
            cpus.push(StoredCpu {
                canonical_key,
                name,
                manufacturer: serde_json::from_value(serde_json::Value::String(manufacturer))
                    .unwrap_or_default(),
                source,
                quality_score,
                fields: serde_json::from_str(&fields_json)?,
            });
        }
        Ok(cpus)
    }

    /// Batched upsert, one transaction per chunk.
    pub fn upsert_batched(
        &mut self,
        records: &[MergedRecord],
        mut on_row: impl FnMut(),
    ) -> Result<UpsertSummary> {
        let mut summary = UpsertSummary::default();
        for chunk in records.chunks(WRITE_BATCH_SIZE) {
            let tx = self.conn.transaction()?;
            for record in chunk {
                summary.add(upsert_on(&tx, record)?);
                on_row();
            }
            tx.commit()?;
        }
        Ok(summary)
    }
}

impl SpecSink for SqliteStore {
    fn upsert(&mut self, record: &MergedRecord) -> Result<UpsertOutcome> {
        upsert_on(&self.conn, record)
    }

    fn upsert_all(&mut self, records: &[MergedRecord]) -> Result<UpsertSummary> {
        self.upsert_batched(records, || {})
    }
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

fn upsert_on(conn: &Connection, merged: &MergedRecord) -> Result<UpsertOutcome> {
    let exists = conn
        .prepare_cached("SELECT 1 FROM cpus WHERE canonical_key = ?1")?
        .query_row([&merged.canonical_key], |_| Ok(()))
        .optional()?
        .is_some();

    let record = &merged.record;
    let fields = &record.fields;
    let mut stmt = conn.prepare_cached(
        "INSERT INTO cpus (canonical_key, name, manufacturer, source, source_priority,
                           cores, threads, base_clock, boost_clock, tdp, socket_name,
                           quality_score, contributors, missing_fields, fields_json, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(canonical_key) DO UPDATE SET
            name = excluded.name,
            manufacturer = excluded.manufacturer,
            source = excluded.source,
            source_priority = excluded.source_priority,
            cores = excluded.cores,
            threads = excluded.threads,
            base_clock = excluded.base_clock,
            boost_clock = excluded.boost_clock,
            tdp = excluded.tdp,
            socket_name = excluded.socket_name,
            quality_score = excluded.quality_score,
            contributors = excluded.contributors,
            missing_fields = excluded.missing_fields,
            fields_json = excluded.fields_json,
            updated_at = excluded.updated_at",
    )?;
    stmt.execute(params![
        merged.canonical_key,
        record.name,
        record.manufacturer.to_string(),
        record.source,
        record.source_priority.as_str(),
        fields.cores,
        fields.threads,
        fields.base_clock,
        fields.boost_clock,
        fields.tdp,
        fields.socket_name,
        merged.quality_score,
        serde_json::to_string(&merged.contributors)?,
        serde_json::to_string(&merged.missing_fields)?,
        serde_json::to_string(fields)?,
        unix_now(),
    ])?;

    Ok(if exists {
        UpsertOutcome::Updated
    } else {
        UpsertOutcome::Inserted
    })
}

// ============================================================================
// JSON Export
// ============================================================================

#[derive(Serialize)]
struct ExportDocument<'a> {
    version: u32,
    generated_at: i64,
    total: usize,
    cpus: &'a [MergedRecord],
}

/// Write `{version, generated_at, total, cpus}` as pretty JSON.
pub fn write_json_export(path: &Path, records: &[MergedRecord]) -> Result<()> {
    let doc = ExportDocument {
        version: EXPORT_VERSION,
        generated_at: unix_now(),
        total: records.len(),
        cpus: records,
    };
    let file = std::fs::File::create(path)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, &doc)?;
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MergeConfig;
    use crate::engine::MergeEngine;
    use crate::models::Field;
    use crate::sources::SourcePriority;

    fn merged_records() -> Vec<MergedRecord> {
        let engine = MergeEngine::new(MergeConfig::default());
        engine
            .merge(vec![
                SpecificationRecord::new("Intel Core i9-14900K", Manufacturer::Intel, "intel_ark")
                    .with_priority(SourcePriority::Official)
                    .with(Field::Cores, 24)
                    .with(Field::SocketName, "LGA1700"),
                SpecificationRecord::new("AMD Ryzen 9 9950X3D", Manufacturer::Amd, "amd_specs")
                    .with_priority(SourcePriority::Official)
                    .with(Field::L3Cache, 131072),
            ])
            .records
    }

    #[test]
    fn test_upsert_is_idempotent() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let records = merged_records();

        let first = store.upsert_all(&records).unwrap();
        assert_eq!(first, UpsertSummary { inserted: 2, updated: 0 });

        let second = store.upsert_all(&records).unwrap();
        assert_eq!(second, UpsertSummary { inserted: 0, updated: 2 });
        assert_eq!(store.count().unwrap(), 2);
    }

    #[test]
    fn test_single_upsert_updates_in_place() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let mut record = merged_records().remove(0);
        assert_eq!(store.upsert(&record).unwrap(), UpsertOutcome::Inserted);

        record.record.fields.tdp = Some(125);
        assert_eq!(store.upsert(&record).unwrap(), UpsertOutcome::Updated);

        let rows = store.load_all().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.tdp, Some(125));
    }

    #[test]
    fn test_load_all_round_trips_fields() {
        let mut store = SqliteStore::open_in_memory().unwrap();
        let records = merged_records();
        store.upsert_all(&records).unwrap();

        let rows = store.load_all().unwrap();
        let intel = rows.iter().find(|r| r.canonical_key == "i9 14900k").unwrap();
        assert_eq!(intel.manufacturer, Manufacturer::Intel);
        assert_eq!(intel.fields.cores, Some(24));
        assert_eq!(intel.fields.socket_name.as_deref(), Some("LGA1700"));

        let amd = rows.iter().find(|r| r.canonical_key == "ryzen9 9950x3d").unwrap();
        assert_eq!(amd.manufacturer, Manufacturer::Amd);
    }

    #[test]
    fn test_json_export() {
        let records = merged_records();
        let path =
            std::env::temp_dir().join(format!("cpu-spec-export-{}.json", std::process::id()));
        write_json_export(&path, &records).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let doc: serde_json::Value = serde_json::from_str(&text).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(doc["version"], 1);
        assert_eq!(doc["total"], 2);
        let cpus = doc["cpus"].as_array().unwrap();
        let intel = cpus.iter().find(|c| c["canonical_key"] == "i9 14900k").unwrap();
        assert_eq!(intel["cores"], 24);
        assert_eq!(intel["manufacturer"], "INTEL");
        assert!(intel.get("tdp").is_none());
    }
}
