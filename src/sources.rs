// 🌐 Release Sources
// Where a monthly registry release lives, and the collaborators that fetch
// and unpack it before the pipeline runs.
//
// Network and archive handling sit behind the Downloader / Extractor traits;
// this module only sequences them: download → extract → clean/join.

use crate::config::PipelineConfig;
use crate::pipeline;
use crate::report::RunReport;
use crate::schema::SourceCategory;
use anyhow::{Context, Result};
use chrono::{Datelike, Months, NaiveDate};
use polars::prelude::DataFrame;
use std::fmt::Display;
use std::fs;
use std::path::Path;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

pub const RELEASE_BASE_URL: &str =
    "https://arquivos.receitafederal.gov.br/dados/cnpj/dados_abertos_cnpj";

/// Chunk indices probed per release (0..MAX_CHUNKS)
pub const MAX_CHUNKS: usize = 12;

// ============================================================================
// REFERENCE MONTH
// ============================================================================

pub fn format_month(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Current month (`YYYY-MM`) if its release is published, otherwise the
/// previous month.
pub fn reference_month<F>(today: NaiveDate, mut is_available: F) -> String
where
    F: FnMut(&str) -> bool,
{
    let current = format_month(today);
    if is_available(&current) {
        return current;
    }

    let first = today.with_day(1).unwrap_or(today);
    let previous = first.checked_sub_months(Months::new(1)).unwrap_or(first);
    format_month(previous)
}

// ============================================================================
// RELEASE CATALOG
// ============================================================================

/// Archive URLs of one monthly release
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseCatalog {
    pub base_url: String,
    pub month: String,
    pub chunks: Vec<usize>,
}

impl ReleaseCatalog {
    pub fn new(month: impl Into<String>, chunks: Vec<usize>) -> Self {
        ReleaseCatalog {
            base_url: RELEASE_BASE_URL.to_string(),
            month: month.into(),
            chunks,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Contiguous chunk indices from 0, stopping at the first one the probe
    /// reports missing.
    pub fn available_chunks<F>(mut probe: F) -> Vec<usize>
    where
        F: FnMut(usize) -> bool,
    {
        (0..MAX_CHUNKS).take_while(|i| probe(*i)).collect()
    }

    /// Directory listing URL of the month, used to probe availability
    pub fn month_url(&self) -> String {
        format!("{}/{}/", self.base_url, self.month)
    }

    pub fn archive_name(category: SourceCategory, chunk: Option<usize>) -> String {
        match chunk {
            Some(i) if category.is_chunked() => format!("{}{}.zip", category.file_stem(), i),
            _ => format!("{}.zip", category.file_stem()),
        }
    }

    pub fn url(&self, category: SourceCategory, chunk: Option<usize>) -> String {
        format!(
            "{}{}",
            self.month_url(),
            Self::archive_name(category, chunk)
        )
    }

    /// Every archive of the release, grouped by category
    pub fn entries(&self) -> Vec<(SourceCategory, String)> {
        let mut entries = Vec::new();
        for category in SourceCategory::ALL {
            if category.is_chunked() {
                for i in &self.chunks {
                    entries.push((category, self.url(category, Some(*i))));
                }
            } else {
                entries.push((category, self.url(category, None)));
            }
        }
        entries
    }
}

// ============================================================================
// RETRY POLICY
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// Waits between consecutive attempts: base, 2·base, 4·base, ...
    pub fn delays(&self) -> Vec<Duration> {
        (0..self.max_attempts.saturating_sub(1))
            .map(|n| self.base_delay.saturating_mul(2u32.saturating_pow(n)))
            .collect()
    }

    /// Run `op` until it succeeds or the attempt ceiling is reached; the last
    /// error is returned on exhaustion. `op` receives the 1-based attempt.
    pub fn retry<T, E, F>(&self, label: &str, mut op: F) -> std::result::Result<T, E>
    where
        E: Display,
        F: FnMut(u32) -> std::result::Result<T, E>,
    {
        let delays = self.delays();
        let mut attempt = 1;
        loop {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) if (attempt as usize) <= delays.len() => {
                    let delay = delays[attempt as usize - 1];
                    warn!(label, attempt, error = %err, delay_ms = delay.as_millis() as u64, "retrying");
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

// ============================================================================
// COLLABORATORS
// ============================================================================

/// Fetches one archive into a directory
pub trait Downloader {
    fn download(&self, url: &str, dest_dir: &Path) -> Result<()>;
}

/// Recursively extracts every archive under `base_dir`: the single member of
/// `X.zip` becomes `X.csv` beside it, and the archive is removed.
pub trait Extractor {
    fn extract_all(&self, base_dir: &Path) -> Result<()>;
}

/// Download every archive of the release into its category directory,
/// retrying each one per `policy`. The first exhausted archive fails the run.
pub fn download_release<D: Downloader>(
    downloader: &D,
    catalog: &ReleaseCatalog,
    config: &PipelineConfig,
    policy: &RetryPolicy,
) -> Result<()> {
    for (category, url) in catalog.entries() {
        let dir = config.category_dir(category);
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create directory: {}", dir.display()))?;

        policy
            .retry(&url, |_| downloader.download(&url, &dir))
            .with_context(|| format!("Failed to download {}", url))?;
        info!(category = category.name(), url = %url, "downloaded archive");
    }
    Ok(())
}

/// download → extract → clean/join
pub fn run_stages<D: Downloader, X: Extractor>(
    downloader: &D,
    extractor: &X,
    catalog: &ReleaseCatalog,
    config: &PipelineConfig,
    policy: &RetryPolicy,
) -> Result<(DataFrame, RunReport)> {
    info!(month = %catalog.month, archives = catalog.entries().len(), "fetching release");
    download_release(downloader, catalog, config, policy)?;

    extractor
        .extract_all(&config.base_dir)
        .with_context(|| format!("Failed to extract archives in {}", config.base_dir.display()))?;

    let result = pipeline::run(config)?;
    Ok(result)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use std::cell::RefCell;
    use tempfile::TempDir;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_reference_month_falls_back_to_previous() {
        assert_eq!(reference_month(date(2024, 7, 15), |_| true), "2024-07");
        assert_eq!(reference_month(date(2024, 7, 31), |_| false), "2024-06");
        assert_eq!(reference_month(date(2024, 1, 3), |_| false), "2023-12");
    }

    #[test]
    fn test_available_chunks_stop_at_first_gap() {
        assert_eq!(ReleaseCatalog::available_chunks(|i| i != 3), vec![0, 1, 2]);
        assert_eq!(ReleaseCatalog::available_chunks(|_| true).len(), MAX_CHUNKS);
        assert!(ReleaseCatalog::available_chunks(|_| false).is_empty());
    }

    #[test]
    fn test_catalog_urls() {
        let catalog = ReleaseCatalog::new("2024-07", vec![0, 1]);
        assert_eq!(
            catalog.url(SourceCategory::Ventures, Some(1)),
            "https://arquivos.receitafederal.gov.br/dados/cnpj/dados_abertos_cnpj/2024-07/Estabelecimentos1.zip"
        );
        assert_eq!(
            catalog.url(SourceCategory::IndustryClasses, None),
            "https://arquivos.receitafederal.gov.br/dados/cnpj/dados_abertos_cnpj/2024-07/Cnaes.zip"
        );

        let entries = catalog.entries();
        assert_eq!(entries.len(), 7);
        assert!(entries
            .iter()
            .any(|(c, u)| *c == SourceCategory::Companies && u.ends_with("/Empresas1.zip")));
    }

    #[test]
    fn test_retry_delays_are_exponential() {
        let policy = RetryPolicy {
            max_attempts: 4,
            base_delay: Duration::from_millis(100),
        };
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(400)
            ]
        );
    }

    #[test]
    fn test_retry_stops_at_ceiling() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::ZERO,
        };

        let mut calls = 0;
        let result: std::result::Result<(), String> = policy.retry("flaky", |_| {
            calls += 1;
            Err("timeout".to_string())
        });
        assert_eq!(result, Err("timeout".to_string()));
        assert_eq!(calls, 3);

        let ok: std::result::Result<u32, String> = policy.retry("recovers", |attempt| {
            if attempt < 2 {
                Err("timeout".to_string())
            } else {
                Ok(attempt)
            }
        });
        assert_eq!(ok, Ok(2));
    }

    struct RecordingDownloader {
        fail_on: Option<&'static str>,
        seen: RefCell<Vec<String>>,
    }

    impl Downloader for RecordingDownloader {
        fn download(&self, url: &str, dest_dir: &Path) -> Result<()> {
            self.seen.borrow_mut().push(url.to_string());
            if self.fail_on.map_or(false, |f| url.ends_with(f)) {
                return Err(anyhow!("connection reset"));
            }
            assert!(dest_dir.is_dir());
            Ok(())
        }
    }

    struct NoopExtractor;

    impl Extractor for NoopExtractor {
        fn extract_all(&self, _base_dir: &Path) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_download_exhaustion_propagates() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            base_dir: dir.path().to_path_buf(),
            ..PipelineConfig::default()
        };
        let downloader = RecordingDownloader {
            fail_on: Some("Paises.zip"),
            seen: RefCell::new(Vec::new()),
        };
        let policy = RetryPolicy {
            max_attempts: 2,
            base_delay: Duration::ZERO,
        };
        let catalog = ReleaseCatalog::new("2024-07", vec![0]);

        let err = run_stages(&downloader, &NoopExtractor, &catalog, &config, &policy).unwrap_err();
        assert!(format!("{:#}", err).contains("Paises.zip"));

        let seen = downloader.seen.borrow();
        assert_eq!(seen.iter().filter(|u| u.ends_with("Paises.zip")).count(), 2);
        assert!(dir.path().join("empresas").is_dir());
    }

    #[test]
    fn test_run_stages_reaches_pipeline() {
        let dir = TempDir::new().unwrap();
        let config = PipelineConfig {
            base_dir: dir.path().to_path_buf(),
            chunk_count: 1,
            ..PipelineConfig::default()
        };
        let downloader = RecordingDownloader {
            fail_on: None,
            seen: RefCell::new(Vec::new()),
        };
        let catalog = ReleaseCatalog::new("2024-07", vec![0]);

        // Nothing was really extracted, so the pipeline finds no company chunk
        let err = run_stages(&downloader, &NoopExtractor, &catalog, &config, &RetryPolicy::default())
            .unwrap_err();
        assert!(err.to_string().contains("no readable companies chunk"));
        assert_eq!(downloader.seen.borrow().len(), 5);
    }
}
