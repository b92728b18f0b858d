// CNPJ Pipeline - Core Library
// Cleanses the public business registry release and joins it into one table

pub mod error;
pub mod frame;      // polars glue: concat, join, text helpers
pub mod schema;     // Shape Layer - canonical schemas + harmonization
pub mod parser;     // Raw Table Reader
pub mod temporal;   // YYYYMMDD registry dates
pub mod rules;      // Size tier thresholds
pub mod entities;   // Company / Venture / reference stages
pub mod join;       // Join Engine + output writer
pub mod report;
pub mod config;
pub mod pipeline;
pub mod sources;    // Release catalog, retry policy, collaborators
pub mod db;         // Run ledger

// Re-export commonly used types
pub use error::{PipelineError, Result};
pub use frame::{concat_frames, join_frames};
pub use schema::{canonical_code, ColumnDef, ColumnKind, FieldType, Schema, SourceCategory};
pub use parser::{read_raw_table, ChunkRead, ReadOptions};
pub use temporal::parse_compact_date;
pub use rules::{capital_to_int, normalize_capital, SizeTier, TierThresholds};
pub use entities::{
    classify_companies, first_code, load_countries, load_industry_classes,
    load_municipalities, normalize_ventures, ReferenceTables,
};
pub use join::{build_final_records, synthesize_cnpj, write_output};
pub use report::{RunReport, UnitOutcome, UnitStatus};
pub use config::PipelineConfig;
pub use pipeline::{run, run_with_report};
pub use sources::{reference_month, Downloader, Extractor, ReleaseCatalog, RetryPolicy};
pub use db::{get_runs, record_run, setup_database, snapshot_fingerprint, RunRecord, RunStatus};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
