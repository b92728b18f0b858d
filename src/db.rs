// 🗄️ Run Ledger - SQLite + WAL
// Which snapshot each run consumed, which units it read or skipped, and what it wrote

use crate::report::{RunReport, UnitOutcome, UnitStatus};
use crate::schema::SourceCategory;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    Succeeded,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<RunStatus> {
        match s {
            "succeeded" => Some(RunStatus::Succeeded),
            "failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// One row of the `runs` table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRecord {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub snapshot_fingerprint: String,
    pub status: RunStatus,
    pub output_rows: Option<i64>,
    pub output_columns: Option<i64>,
    pub output_path: Option<String>,
    pub error: Option<String>,
}

impl RunRecord {
    pub fn from_report(
        report: &RunReport,
        fingerprint: &str,
        error: Option<String>,
    ) -> Self {
        RunRecord {
            run_id: report.run_id.clone(),
            started_at: report.started_at,
            finished_at: Utc::now(),
            snapshot_fingerprint: fingerprint.to_string(),
            status: if error.is_none() {
                RunStatus::Succeeded
            } else {
                RunStatus::Failed
            },
            output_rows: report.output_shape.map(|(rows, _)| rows as i64),
            output_columns: report.output_shape.map(|(_, cols)| cols as i64),
            output_path: report
                .output_path
                .as_ref()
                .map(|p| p.display().to_string()),
            error,
        }
    }

    pub fn summary(&self) -> String {
        let shape = match (self.output_rows, self.output_columns) {
            (Some(r), Some(c)) => format!("({}, {})", r, c),
            _ => "-".to_string(),
        };
        format!(
            "{} | {} | {} | {} | snapshot {}",
            self.started_at.format("%Y-%m-%d %H:%M:%S"),
            self.run_id,
            self.status.as_str(),
            shape,
            &self.snapshot_fingerprint[..self.snapshot_fingerprint.len().min(12)]
        )
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

pub fn setup_database(conn: &Connection) -> Result<()> {
    // Enable WAL mode for crash recovery
    conn.pragma_update(None, "journal_mode", "WAL")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT UNIQUE NOT NULL,
            started_at TEXT NOT NULL,
            finished_at TEXT NOT NULL,
            snapshot_fingerprint TEXT NOT NULL,
            status TEXT NOT NULL,
            output_rows INTEGER,
            output_columns INTEGER,
            output_path TEXT,
            error TEXT,
            created_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS unit_outcomes (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            run_id TEXT NOT NULL REFERENCES runs(run_id),
            category TEXT NOT NULL,
            chunk_index INTEGER,
            path TEXT NOT NULL,
            status TEXT NOT NULL,
            rows INTEGER,
            reason TEXT
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_unit_outcomes_run ON unit_outcomes(run_id)",
        [],
    )?;

    Ok(())
}

// ============================================================================
// WRITES
// ============================================================================

/// Store a run and all its unit outcomes atomically.
pub fn record_run(conn: &Connection, record: &RunRecord, units: &[UnitOutcome]) -> Result<()> {
    let tx = conn.unchecked_transaction()?;

    tx.execute(
        "INSERT INTO runs (
            run_id, started_at, finished_at, snapshot_fingerprint, status,
            output_rows, output_columns, output_path, error
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            record.run_id,
            record.started_at.to_rfc3339(),
            record.finished_at.to_rfc3339(),
            record.snapshot_fingerprint,
            record.status.as_str(),
            record.output_rows,
            record.output_columns,
            record.output_path,
            record.error,
        ],
    )
    .with_context(|| format!("Failed to insert run {}", record.run_id))?;

    for unit in units {
        let category = serde_json::to_string(&unit.category)?;
        tx.execute(
            "INSERT INTO unit_outcomes (run_id, category, chunk_index, path, status, rows, reason)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                record.run_id,
                category,
                unit.index.map(|i| i as i64),
                unit.path.display().to_string(),
                unit.status.name(),
                unit.status.rows().map(|r| r as i64),
                unit.status.reason(),
            ],
        )?;
    }

    tx.commit()?;
    Ok(())
}

// ============================================================================
// READS
// ============================================================================

/// Most recent runs first
pub fn get_runs(conn: &Connection, limit: usize) -> Result<Vec<RunRecord>> {
    let mut stmt = conn.prepare(
        "SELECT run_id, started_at, finished_at, snapshot_fingerprint, status,
                output_rows, output_columns, output_path, error
         FROM runs
         ORDER BY started_at DESC, id DESC
         LIMIT ?1",
    )?;

    let runs = stmt
        .query_map(params![limit as i64], |row| {
            let started: String = row.get(1)?;
            let finished: String = row.get(2)?;
            let status: String = row.get(4)?;

            Ok(RunRecord {
                run_id: row.get(0)?,
                started_at: parse_timestamp(&started)?,
                finished_at: parse_timestamp(&finished)?,
                snapshot_fingerprint: row.get(3)?,
                status: RunStatus::parse(&status).ok_or(rusqlite::Error::InvalidQuery)?,
                output_rows: row.get(5)?,
                output_columns: row.get(6)?,
                output_path: row.get(7)?,
                error: row.get(8)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(runs)
}

pub fn get_unit_outcomes(conn: &Connection, run_id: &str) -> Result<Vec<UnitOutcome>> {
    let mut stmt = conn.prepare(
        "SELECT category, chunk_index, path, status, rows, reason
         FROM unit_outcomes
         WHERE run_id = ?1
         ORDER BY id",
    )?;

    let units = stmt
        .query_map(params![run_id], |row| {
            let category: String = row.get(0)?;
            let index: Option<i64> = row.get(1)?;
            let path: String = row.get(2)?;
            let status: String = row.get(3)?;
            let rows: Option<i64> = row.get(4)?;
            let reason: Option<String> = row.get(5)?;

            let category: SourceCategory =
                serde_json::from_str(&category).map_err(|_| rusqlite::Error::InvalidQuery)?;
            let status = match status.as_str() {
                "loaded" => UnitStatus::Loaded {
                    rows: rows.unwrap_or(0) as usize,
                },
                _ => UnitStatus::Skipped {
                    reason: reason.unwrap_or_default(),
                },
            };

            Ok(UnitOutcome {
                category,
                index: index.map(|i| i as usize),
                path: PathBuf::from(path),
                status,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(units)
}

fn parse_timestamp(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

// ============================================================================
// SNAPSHOT FINGERPRINT
// ============================================================================

/// SHA-256 over every file under `base_dir` (relative path + byte length),
/// in sorted path order. Identifies the raw snapshot a run consumed without
/// hashing gigabytes of content.
pub fn snapshot_fingerprint(base_dir: &Path) -> Result<String> {
    let mut files = Vec::new();
    if base_dir.exists() {
        collect_files(base_dir, base_dir, &mut files)?;
    }
    files.sort();

    let mut hasher = Sha256::new();
    for (path, len) in &files {
        hasher.update(format!("{}\0{}\n", path, len));
    }
    Ok(format!("{:x}", hasher.finalize()))
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<(String, u64)>) -> Result<()> {
    let entries = fs::read_dir(dir)
        .with_context(|| format!("Failed to list directory: {}", dir.display()))?;

    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        let meta = entry.metadata()?;
        if meta.is_dir() {
            collect_files(root, &path, files)?;
        } else {
            let relative = path.strip_prefix(root).unwrap_or(&path);
            let relative = relative
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            files.push((relative, meta.len()));
        }
    }
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report_with_units() -> RunReport {
        let mut report = RunReport::new();
        report.record(UnitOutcome {
            category: SourceCategory::Companies,
            index: Some(0),
            path: PathBuf::from("empresas/Empresas0.csv"),
            status: UnitStatus::Loaded { rows: 120 },
        });
        report.record(UnitOutcome {
            category: SourceCategory::IndustryClasses,
            index: None,
            path: PathBuf::from("cnae/Cnaes.csv"),
            status: UnitStatus::Skipped {
                reason: "Failed to open file".to_string(),
            },
        });
        report.output_shape = Some((40, 31));
        report.output_path = Some(PathBuf::from("result.csv"));
        report
    }

    #[test]
    fn test_setup_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        setup_database(&conn).unwrap();
        assert!(get_runs(&conn, 10).unwrap().is_empty());
    }

    #[test]
    fn test_record_and_read_back_run() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let report = report_with_units();
        let record = RunRecord::from_report(&report, "abc123", None);
        record_run(&conn, &record, &report.units).unwrap();

        let runs = get_runs(&conn, 10).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].run_id, report.run_id);
        assert_eq!(runs[0].status, RunStatus::Succeeded);
        assert_eq!(runs[0].output_rows, Some(40));
        assert_eq!(runs[0].output_columns, Some(31));

        let units = get_unit_outcomes(&conn, &report.run_id).unwrap();
        assert_eq!(units, report.units);
    }

    #[test]
    fn test_failed_run_keeps_error() {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();

        let mut report = RunReport::new();
        report.output_shape = None;
        let record = RunRecord::from_report(&report, "abc", Some("join failed".to_string()));
        record_run(&conn, &record, &[]).unwrap();

        let runs = get_runs(&conn, 1).unwrap();
        assert_eq!(runs[0].status, RunStatus::Failed);
        assert_eq!(runs[0].error.as_deref(), Some("join failed"));
        assert!(runs[0].output_rows.is_none());
        assert!(runs[0].summary().contains("failed"));
    }

    #[test]
    fn test_fingerprint_tracks_snapshot_changes() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("empresas")).unwrap();
        fs::write(dir.path().join("empresas").join("Empresas0.csv"), b"1;2\n").unwrap();

        let first = snapshot_fingerprint(dir.path()).unwrap();
        assert_eq!(first, snapshot_fingerprint(dir.path()).unwrap());
        assert_eq!(first.len(), 64);

        fs::write(dir.path().join("empresas").join("Empresas1.csv"), b"3;4\n").unwrap();
        assert_ne!(first, snapshot_fingerprint(dir.path()).unwrap());
    }

    #[test]
    fn test_fingerprint_of_missing_dir() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nothing");
        let empty = snapshot_fingerprint(dir.path()).unwrap();
        assert_eq!(snapshot_fingerprint(&missing).unwrap(), empty);
    }
}
