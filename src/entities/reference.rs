// 🗺️ Reference Tables - municipality, country and CNAE code → description lookups
// Each is one two-column file; a failure yields no table, never a panic

use crate::parser::{read_raw_table, ChunkRead, ReadOptions};
use crate::schema::{Schema, SourceCategory};
use polars::prelude::DataFrame;
use std::path::Path;
use tracing::warn;

/// The three lookup tables the join engine needs. `None` = could not be read.
#[derive(Debug, Clone, Default)]
pub struct ReferenceTables {
    pub municipalities: Option<DataFrame>,
    pub countries: Option<DataFrame>,
    pub industry_classes: Option<DataFrame>,
}

pub fn load_municipalities(path: &Path, options: &ReadOptions) -> ChunkRead {
    load_reference(SourceCategory::Municipalities, path, options)
}

/// Country codes come out in canonical text form, the same as the venture
/// `pais` column.
pub fn load_countries(path: &Path, options: &ReadOptions) -> ChunkRead {
    load_reference(SourceCategory::Countries, path, options)
}

pub fn load_industry_classes(path: &Path, options: &ReadOptions) -> ChunkRead {
    load_reference(SourceCategory::IndustryClasses, path, options)
}

/// Read a code→description file and cast it to its canonical schema.
/// A cast failure is reported like a read failure: the table is absent.
pub fn load_reference(category: SourceCategory, path: &Path, options: &ReadOptions) -> ChunkRead {
    let schema = Schema::for_category(category);

    let df = match read_raw_table(path, schema.columns(), None, options) {
        ChunkRead::Loaded(df) => df,
        skipped => return skipped,
    };

    match schema.harmonize(df) {
        Ok(df) => ChunkRead::Loaded(df),
        Err(err) => {
            warn!(
                category = category.name(),
                path = %path.display(),
                error = %err,
                "reference table does not match its schema"
            );
            ChunkRead::Skipped {
                reason: err.to_string(),
            }
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
