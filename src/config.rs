// ⚙️ Pipeline Configuration
// Everything a run needs, passed explicitly into pipeline::run

use crate::error::{PipelineError, Result};
use crate::parser::ReadOptions;
use crate::rules::TierThresholds;
use crate::schema::SourceCategory;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_BASE_DIR: &str = "downloaded_files";
pub const DEFAULT_OUTPUT: &str = "result.csv";
pub const DEFAULT_CHUNK_COUNT: usize = 10;

/// Subdirectory of `base_dir` holding each category's extracted files
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Directories {
    pub companies: String,
    pub ventures: String,
    pub municipalities: String,
    pub countries: String,
    pub industry_classes: String,
}

impl Default for Directories {
    fn default() -> Self {
        Directories {
            companies: SourceCategory::Companies.default_dir().to_string(),
            ventures: SourceCategory::Ventures.default_dir().to_string(),
            municipalities: SourceCategory::Municipalities.default_dir().to_string(),
            countries: SourceCategory::Countries.default_dir().to_string(),
            industry_classes: SourceCategory::IndustryClasses.default_dir().to_string(),
        }
    }
}

impl Directories {
    pub fn get(&self, category: SourceCategory) -> &str {
        match category {
            SourceCategory::Companies => &self.companies,
            SourceCategory::Ventures => &self.ventures,
            SourceCategory::Municipalities => &self.municipalities,
            SourceCategory::Countries => &self.countries,
            SourceCategory::IndustryClasses => &self.industry_classes,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub base_dir: PathBuf,
    pub directories: Directories,

    /// Chunk indices 0..chunk_count are attempted for companies and ventures
    pub chunk_count: usize,

    pub infer_schema_length: usize,
    pub try_parse_dates: bool,

    /// Read the chunks of one category in parallel (order is preserved either way)
    pub parallel_reads: bool,

    pub output_path: PathBuf,
    pub thresholds: TierThresholds,

    /// SQLite provenance ledger; no ledger when absent
    pub ledger_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let read = ReadOptions::default();
        PipelineConfig {
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            directories: Directories::default(),
            chunk_count: DEFAULT_CHUNK_COUNT,
            infer_schema_length: read.infer_schema_length,
            try_parse_dates: read.try_parse_dates,
            parallel_reads: true,
            output_path: PathBuf::from(DEFAULT_OUTPUT),
            thresholds: TierThresholds::default(),
            ledger_path: None,
        }
    }
}

impl PipelineConfig {
    /// Load from a JSON file; missing fields take their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: PipelineConfig =
            serde_json::from_str(&content).context("Failed to parse config JSON")?;

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.chunk_count == 0 {
            return Err(PipelineError::config("chunk_count must be at least 1"));
        }
        if self.infer_schema_length == 0 {
            return Err(PipelineError::config("infer_schema_length must be at least 1"));
        }
        if !self.thresholds.is_valid() {
            return Err(PipelineError::config(format!(
                "tier thresholds must be non-negative and strictly increasing, got {:?}",
                self.thresholds
            )));
        }
        Ok(())
    }

    pub fn category_dir(&self, category: SourceCategory) -> PathBuf {
        self.base_dir.join(self.directories.get(category))
    }

    /// Extracted CSV path of one unit; `chunk` is ignored for single-file categories
    pub fn unit_path(&self, category: SourceCategory, chunk: Option<usize>) -> PathBuf {
        self.category_dir(category).join(category.file_name(chunk))
    }

    pub fn read_options(&self) -> ReadOptions {
        ReadOptions {
            infer_schema_length: self.infer_schema_length,
            try_parse_dates: self.try_parse_dates,
        }
    }
}
