// 📋 Run Report
// What each unit (chunk or reference file) contributed, what the stages kept,
// and what was written

use crate::parser::ChunkRead;
use crate::schema::SourceCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// UNIT OUTCOMES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum UnitStatus {
    Loaded { rows: usize },
    Skipped { reason: String },
}

impl UnitStatus {
    pub fn name(&self) -> &'static str {
        match self {
            UnitStatus::Loaded { .. } => "loaded",
            UnitStatus::Skipped { .. } => "skipped",
        }
    }

    pub fn rows(&self) -> Option<usize> {
        match self {
            UnitStatus::Loaded { rows } => Some(*rows),
            UnitStatus::Skipped { .. } => None,
        }
    }

    pub fn reason(&self) -> Option<&str> {
        match self {
            UnitStatus::Loaded { .. } => None,
            UnitStatus::Skipped { reason } => Some(reason),
        }
    }
}

/// One input unit; `index` is None for single-file reference tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnitOutcome {
    pub category: SourceCategory,
    pub index: Option<usize>,
    pub path: PathBuf,
    pub status: UnitStatus,
}

impl UnitOutcome {
    pub fn from_read(
        category: SourceCategory,
        index: Option<usize>,
        path: impl Into<PathBuf>,
        read: &ChunkRead,
    ) -> Self {
        let status = match read {
            ChunkRead::Loaded(df) => UnitStatus::Loaded {
                rows: df.height(),
            },
            ChunkRead::Skipped { reason } => UnitStatus::Skipped {
                reason: reason.clone(),
            },
        };

        UnitOutcome {
            category,
            index,
            path: path.into(),
            status,
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self.status, UnitStatus::Loaded { .. })
    }
}

// ============================================================================
// RUN REPORT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: String,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub units: Vec<UnitOutcome>,
    pub retained_companies: usize,
    pub active_ventures: usize,

    /// (rows, columns) of the written output; None until the write succeeds
    pub output_shape: Option<(usize, usize)>,
    pub output_path: Option<PathBuf>,
    pub timings: Vec<StageTiming>,
}

impl Default for RunReport {
    fn default() -> Self {
        Self::new()
    }
}

impl RunReport {
    pub fn new() -> Self {
        RunReport {
            run_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            units: Vec::new(),
            retained_companies: 0,
            active_ventures: 0,
            output_shape: None,
            output_path: None,
            timings: Vec::new(),
        }
    }

    pub fn record(&mut self, outcome: UnitOutcome) {
        self.units.push(outcome);
    }

    pub fn record_timing(&mut self, stage: &str, elapsed: Duration) {
        self.timings.push(StageTiming {
            stage: stage.to_string(),
            elapsed_ms: elapsed.as_millis() as u64,
        });
    }

    pub fn loaded(&self, category: SourceCategory) -> usize {
        self.units
            .iter()
            .filter(|u| u.category == category && u.is_loaded())
            .count()
    }

    pub fn skipped(&self) -> Vec<&UnitOutcome> {
        self.units.iter().filter(|u| !u.is_loaded()).collect()
    }

    pub fn total_elapsed_ms(&self) -> u64 {
        self.timings.iter().map(|t| t.elapsed_ms).sum()
    }

    pub fn summary(&self) -> String {
        let shape = match self.output_shape {
            Some((rows, cols)) => format!("({}, {})", rows, cols),
            None => "no output".to_string(),
        };

        format!(
            "{} units read, {} skipped | {} companies retained, {} active ventures | output {} in {} ms",
            self.units.len() - self.skipped().len(),
            self.skipped().len(),
            self.retained_companies,
            self.active_ventures,
            shape,
            self.total_elapsed_ms()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use polars::prelude::DataFrame;

    #[test]
    fn test_outcome_from_read() {
        let skipped = ChunkRead::Skipped {
            reason: "Failed to open file".to_string(),
        };
        let outcome = UnitOutcome::from_read(SourceCategory::Companies, Some(4), "Empresas4.csv", &skipped);
        assert!(!outcome.is_loaded());
        assert_eq!(outcome.status.name(), "skipped");
        assert_eq!(outcome.status.reason(), Some("Failed to open file"));

        let loaded = UnitOutcome::from_read(
            SourceCategory::Countries,
            None,
            "Paises.csv",
            &ChunkRead::Loaded(DataFrame::empty()),
        );
        assert_eq!(loaded.status.rows(), Some(0));
    }

    #[test]
    fn test_summary_counts_units() {
        let mut report = RunReport::new();
        report.record(UnitOutcome {
            category: SourceCategory::Companies,
            index: Some(0),
            path: PathBuf::from("Empresas0.csv"),
            status: UnitStatus::Loaded { rows: 10 },
        });
        report.record(UnitOutcome {
            category: SourceCategory::Companies,
            index: Some(1),
            path: PathBuf::from("Empresas1.csv"),
            status: UnitStatus::Skipped {
                reason: "missing".to_string(),
            },
        });
        report.retained_companies = 3;
        report.output_shape = Some((5, 26));
        report.record_timing("join", Duration::from_millis(12));

        assert_eq!(report.loaded(SourceCategory::Companies), 1);
        let summary = report.summary();
        assert!(summary.starts_with("1 units read, 1 skipped"));
        assert!(summary.contains("3 companies retained"));
        assert!(summary.contains("(5, 26)"));
        assert!(summary.contains("12 ms"));
    }

    #[test]
    fn test_status_serializes_with_tag() {
        let json = serde_json::to_string(&UnitStatus::Loaded { rows: 2 }).unwrap();
        assert_eq!(json, r#"{"status":"loaded","rows":2}"#);
    }
}
