use std::path::Path;

use rusqlite::{Connection, OpenFlags, OptionalExtension, Transaction, params};
use serde::Serialize;

use crate::domain::{MigrationKind, SampleCode};
use crate::error::MigrateError;
use crate::metadata::FieldData;
use crate::sheet::SheetExtractionResult;

const TARGET_SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS project(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    legacy_id INTEGER NOT NULL UNIQUE,
    name TEXT NOT NULL,
    description TEXT
);
CREATE TABLE IF NOT EXISTS subject(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    legacy_id INTEGER NOT NULL UNIQUE,
    project_id INTEGER NOT NULL,
    code TEXT NOT NULL,
    sex TEXT,
    birth_date TEXT,
    FOREIGN KEY(project_id) REFERENCES project(id)
);
CREATE TABLE IF NOT EXISTS sample(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    code TEXT NOT NULL,
    kind TEXT NOT NULL,
    source_file TEXT NOT NULL,
    skipped_rows INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_sample_code ON sample(code);
CREATE TABLE IF NOT EXISTS sample_metadata(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    name TEXT NOT NULL,
    value TEXT NOT NULL,
    unit TEXT,
    FOREIGN KEY(sample_id) REFERENCES sample(id),
    UNIQUE(sample_id, name)
);
CREATE TABLE IF NOT EXISTS cnv(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_id INTEGER NOT NULL,
    position INTEGER NOT NULL,
    chromosome TEXT NOT NULL,
    cytoband_start TEXT,
    cytoband_stop TEXT,
    start_position TEXT,
    stop_position TEXT,
    probes TEXT,
    amplification REAL,
    is_amplification INTEGER NOT NULL,
    deletion REAL,
    is_deletion INTEGER NOT NULL,
    p_value REAL,
    gene_names TEXT,
    mirnas TEXT,
    FOREIGN KEY(sample_id) REFERENCES sample(id)
);
CREATE INDEX IF NOT EXISTS idx_cnv_sample ON cnv(sample_id);
CREATE TABLE IF NOT EXISTS genomic_file(
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    sample_code TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    kind TEXT NOT NULL,
    created_at TEXT NOT NULL
);
";

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacyProject {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LegacySubject {
    pub id: i64,
    pub project_id: Option<i64>,
    pub code: String,
    pub sex: Option<String>,
    pub birth_date: Option<String>,
}

/// Read side of the copy: the legacy schema, opened read-only.
pub struct LegacyStore {
    conn: Connection,
}

impl LegacyStore {
    pub fn open(path: &Path) -> Result<Self, MigrateError> {
        if !path.exists() {
            return Err(MigrateError::InputNotFound(path.display().to_string()));
        }
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
            .map_err(|err| MigrateError::Database(format!("open {}: {err}", path.display())))?;
        Ok(Self { conn })
    }

    pub fn from_connection(conn: Connection) -> Self {
        Self { conn }
    }

    pub fn projects(&self) -> Result<Vec<LegacyProject>, MigrateError> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, name, description FROM projects ORDER BY id")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegacyProject {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    description: row.get(2)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }

    pub fn subjects(&self) -> Result<Vec<LegacySubject>, MigrateError> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT id, project_id, code, sex, birth_date FROM subjects ORDER BY id",
            )
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| {
                Ok(LegacySubject {
                    id: row.get(0)?,
                    project_id: row.get(1)?,
                    code: row.get(2)?,
                    sex: row.get(3)?,
                    birth_date: row.get(4)?,
                })
            })
            .map_err(db_err)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(db_err)
    }
}

/// Write side of the copy: the new schema.
pub struct TargetStore {
    conn: Connection,
}

impl TargetStore {
    pub fn open(path: &Path) -> Result<Self, MigrateError> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|err| MigrateError::Filesystem(err.to_string()))?;
        }
        let conn = Connection::open(path)
            .map_err(|err| MigrateError::Database(format!("open {}: {err}", path.display())))?;
        Self::from_connection(conn)
    }

    pub fn from_connection(conn: Connection) -> Result<Self, MigrateError> {
        conn.execute("PRAGMA foreign_keys = ON", []).map_err(db_err)?;
        conn.execute_batch(TARGET_SCHEMA).map_err(db_err)?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Starts a transaction; dropping the returned value without
    /// [`TargetTx::commit`] rolls every insert back.
    pub fn transaction(&mut self) -> Result<TargetTx<'_>, MigrateError> {
        let tx = self.conn.transaction().map_err(db_err)?;
        Ok(TargetTx { tx })
    }
}

pub struct TargetTx<'a> {
    tx: Transaction<'a>,
}

impl TargetTx<'_> {
    pub fn commit(self) -> Result<(), MigrateError> {
        self.tx.commit().map_err(db_err)
    }

    pub fn insert_project(&self, project: &LegacyProject) -> Result<i64, MigrateError> {
        self.tx
            .execute(
                "INSERT INTO project(legacy_id, name, description) VALUES (?1, ?2, ?3)",
                params![project.id, project.name, project.description],
            )
            .map_err(db_err)?;
        Ok(self.tx.last_insert_rowid())
    }

    pub fn project_id_for_legacy(&self, legacy_id: i64) -> Result<Option<i64>, MigrateError> {
        self.tx
            .query_row(
                "SELECT id FROM project WHERE legacy_id = ?1",
                params![legacy_id],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)
    }

    pub fn insert_subject(
        &self,
        subject: &LegacySubject,
        project_id: i64,
    ) -> Result<i64, MigrateError> {
        self.tx
            .execute(
                "INSERT INTO subject(legacy_id, project_id, code, sex, birth_date)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    subject.id,
                    project_id,
                    subject.code,
                    subject.sex,
                    subject.birth_date
                ],
            )
            .map_err(db_err)?;
        Ok(self.tx.last_insert_rowid())
    }

    /// Writes the sample row, its processed metadata and its CNV records.
    /// Returns the new sample id.
    pub fn insert_sheet(
        &self,
        result: &SheetExtractionResult,
        source_file: &str,
    ) -> Result<i64, MigrateError> {
        self.tx
            .execute(
                "INSERT INTO sample(code, kind, source_file, skipped_rows, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    result.sample_code.as_str(),
                    MigrationKind::Cgh.to_string(),
                    source_file,
                    result.skipped_rows as i64,
                    now_rfc3339()
                ],
            )
            .map_err(db_err)?;
        let sample_id = self.tx.last_insert_rowid();

        let mut insert_meta = self
            .tx
            .prepare(
                "INSERT INTO sample_metadata(sample_id, position, name, value, unit)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )
            .map_err(db_err)?;
        for (position, field) in result.processed_metadata.iter().enumerate() {
            let value = match &field.data {
                FieldData::Value(value) => serde_json::to_string(value),
                FieldData::Values(values) => serde_json::to_string(values),
            }
            .map_err(|err| MigrateError::Database(err.to_string()))?;
            insert_meta
                .execute(params![
                    sample_id,
                    position as i64,
                    field.name,
                    value,
                    field.unit
                ])
                .map_err(db_err)?;
        }

        let mut insert_cnv = self
            .tx
            .prepare(
                "INSERT INTO cnv(sample_id, position, chromosome, cytoband_start, cytoband_stop,
                                 start_position, stop_position, probes, amplification,
                                 is_amplification, deletion, is_deletion, p_value,
                                 gene_names, mirnas)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
            )
            .map_err(db_err)?;
        for (position, record) in result.cnv_records.iter().enumerate() {
            insert_cnv
                .execute(params![
                    sample_id,
                    position as i64,
                    record.chromosome,
                    record.cytoband_start,
                    record.cytoband_stop,
                    record.start.to_text(),
                    record.stop.to_text(),
                    record.probes.to_text(),
                    record.amplification,
                    record.is_amplification,
                    record.deletion,
                    record.is_deletion,
                    record.p_value,
                    json_list(record.gene_names.as_deref())?,
                    json_list(record.mirnas.as_deref())?,
                ])
                .map_err(db_err)?;
        }

        Ok(sample_id)
    }

    pub fn insert_genomic_file(
        &self,
        sample_code: &SampleCode,
        path: &str,
        kind: MigrationKind,
    ) -> Result<i64, MigrateError> {
        self.tx
            .execute(
                "INSERT INTO genomic_file(sample_code, path, kind, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![sample_code.as_str(), path, kind.to_string(), now_rfc3339()],
            )
            .map_err(db_err)?;
        Ok(self.tx.last_insert_rowid())
    }
}

fn json_list(values: Option<&[String]>) -> Result<Option<String>, MigrateError> {
    values
        .map(serde_json::to_string)
        .transpose()
        .map_err(|err| MigrateError::Database(err.to_string()))
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

fn db_err(err: rusqlite::Error) -> MigrateError {
    MigrateError::Database(err.to_string())
}
