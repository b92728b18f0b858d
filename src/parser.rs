// 📥 Raw Table Reader
// Parses one positional, headerless, ISO-8859-15 registry file into a DataFrame

use crate::frame::blank_to_null;
use crate::schema::ColumnDef;
use anyhow::{bail, Context, Result};
use encoding_rs_io::DecodeReaderBytesBuilder;
use polars::prelude::{
    CsvParseOptions, CsvReadOptions, DataFrame, DataType, Schema as FrameSchema, SerReader,
};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{Cursor, Read};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

// ============================================================================
// CORE TYPES
// ============================================================================

/// Parsing knobs shared by every raw file of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadOptions {
    /// Rows used to infer a column's type; later rows that do not fit become null
    pub infer_schema_length: usize,

    /// Detect ISO date literals (YYYY-MM-DD) during inference
    pub try_parse_dates: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        ReadOptions {
            infer_schema_length: 10_000,
            try_parse_dates: true,
        }
    }
}

/// Outcome of reading one unit (chunk or reference file).
///
/// A skipped unit is a recoverable condition: the caller drops it from
/// aggregation and keeps going.
#[derive(Debug, Clone)]
pub enum ChunkRead {
    Loaded(DataFrame),
    Skipped { reason: String },
}

impl ChunkRead {
    pub fn is_loaded(&self) -> bool {
        matches!(self, ChunkRead::Loaded(_))
    }

    pub fn into_frame(self) -> Option<DataFrame> {
        match self {
            ChunkRead::Loaded(df) => Some(df),
            ChunkRead::Skipped { .. } => None,
        }
    }
}

// ============================================================================
// READER
// ============================================================================

/// Read `path` and name its first N positional columns after `columns`
/// (N = min(columns, parsed columns)).
///
/// Never fails: any problem (missing file, undecodable bytes, more columns
/// than names, empty file) is logged with `index` and the path and reported
/// as `ChunkRead::Skipped`.
pub fn read_raw_table(
    path: &Path,
    columns: &[ColumnDef],
    index: Option<usize>,
    options: &ReadOptions,
) -> ChunkRead {
    match parse_file(path, columns, options) {
        Ok(df) => {
            debug!(
                index = ?index,
                path = %path.display(),
                rows = df.height(),
                columns = df.width(),
                "read source file"
            );
            ChunkRead::Loaded(df)
        }
        Err(err) => {
            warn!(index = ?index, path = %path.display(), error = %format!("{:#}", err), "could not read source file");
            ChunkRead::Skipped {
                reason: format!("{:#}", err),
            }
        }
    }
}

fn parse_file(path: &Path, columns: &[ColumnDef], options: &ReadOptions) -> Result<DataFrame> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open file: {}", path.display()))?;

    let mut decoded = DecodeReaderBytesBuilder::new()
        .encoding(Some(encoding_rs::ISO_8859_15))
        .build(file);
    let mut bytes = Vec::new();
    decoded
        .read_to_end(&mut bytes)
        .with_context(|| format!("Failed to decode file: {}", path.display()))?;

    let width = first_record_width(&bytes)
        .with_context(|| format!("Failed to parse first record of {}", path.display()))?;
    if width > columns.len() {
        bail!(
            "file has {} columns but only {} names were supplied",
            width,
            columns.len()
        );
    }

    // Headerless columns are named column_1, column_2, ... until renamed below
    let mut verbatim = FrameSchema::with_capacity(width);
    for def in columns.iter().take(width).filter(|d| d.is_verbatim()) {
        verbatim.with_column(format!("column_{}", def.index + 1).into(), DataType::String);
    }

    let mut df = CsvReadOptions::default()
        .with_has_header(false)
        .with_infer_schema_length(Some(options.infer_schema_length))
        // Out-of-sample values become null instead of failing the file
        .with_ignore_errors(true)
        .with_schema_overwrite(Some(Arc::new(verbatim)))
        .with_parse_options(
            CsvParseOptions::default()
                .with_separator(b';')
                .with_quote_char(Some(b'"'))
                .with_try_parse_dates(options.try_parse_dates),
        )
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()
        .with_context(|| format!("Failed to parse file: {}", path.display()))?;

    let names: Vec<&str> = columns.iter().take(df.width()).map(|d| d.name).collect();
    df.set_column_names(names)?;
    blank_to_null(&mut df)?;

    Ok(df)
}

/// Field count of the first record; an empty file has none.
fn first_record_width(bytes: &[u8]) -> Result<usize> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .quote(b'"')
        .has_headers(false)
        .from_reader(bytes);

    let mut record = csv::ByteRecord::new();
    if !reader.read_byte_record(&mut record)? {
        bail!("file has no records");
    }
    Ok(record.len())
}

// ============================================================================
// TESTS
// ============================================================================
