// 🏬 Venture Normalizer
// Establishments: active only, enumerations recoded, dates parsed, secondary CNAE reduced

use crate::error::{PipelineError, Result};
use crate::frame::{concat_frames, text_values};
use crate::schema::SourceCategory;
use crate::temporal::compact_date_series;
use polars::prelude::{BooleanChunked, Column, DataFrame, NamedFrom, NewChunkedArray, Series};
use tracing::info;

/// Registry code for an active establishment
pub const ACTIVE_STATUS: i64 = 2;

pub const BRANCH_FLAG_LABELS: [(i64, &str); 2] = [(1, "Headquarters"), (2, "Branch")];

pub const STATUS_LABELS: [(i64, &str); 1] = [(ACTIVE_STATUS, "Active")];

/// Date columns encoded as YYYYMMDD in the release
pub const DATE_COLUMNS: [&str; 3] = [
    "data_situacao_cadastral",
    "data_inicio_atividade",
    "data_situacao_especial",
];

/// Concatenate venture chunks (ascending chunk order) and normalize them.
pub fn normalize_ventures(chunks: Vec<DataFrame>) -> Result<DataFrame> {
    let ventures = concat_frames(SourceCategory::Ventures.name(), chunks)?;
    let total = ventures.height();

    // 1. Active establishments only
    let mask: Vec<bool> = ventures
        .column("situacao_cadastral")?
        .i64()?
        .into_iter()
        .map(|v| v == Some(ACTIVE_STATUS))
        .collect();
    let mut df = ventures.filter(&BooleanChunked::from_slice("active".into(), &mask))?;

    // 2. Enumerations; an unmapped code here is a logic error, not data noise
    let branch = recode(df.column("identificador_matriz_filial")?, &BRANCH_FLAG_LABELS)?;
    let status = recode(df.column("situacao_cadastral")?, &STATUS_LABELS)?;
    df.with_column(branch)?;
    df.with_column(status)?;

    // 3. Dates
    for name in DATE_COLUMNS {
        let parsed = compact_date_series(df.column(name)?)?;
        df.with_column(parsed)?;
    }

    // 4. Secondary classification: first code of the list
    let secondary = reduce_secondary_codes(df.column("cnae_secundario")?)?;
    df.with_column(secondary)?;

    info!(total, active = df.height(), "normalized ventures");
    Ok(df)
}

/// Map integer codes to labels. Nulls stay null; any other value fails.
pub fn recode(column: &Column, mapping: &[(i64, &str)]) -> Result<Series> {
    let name = column.name().to_string();
    let codes = column.i64().map_err(|_| PipelineError::Recode {
        column: name.clone(),
        code: format!("<{}>", column.dtype()),
    })?;

    let labels = codes
        .into_iter()
        .map(|value| match value {
            None => Ok(None),
            Some(code) => mapping
                .iter()
                .find(|(c, _)| *c == code)
                .map(|(_, label)| Some(*label))
                .ok_or_else(|| PipelineError::Recode {
                    column: name.clone(),
                    code: code.to_string(),
                }),
        })
        .collect::<Result<Vec<Option<&str>>>>()?;

    Ok(Series::new(column.name().clone(), labels))
}

/// "Take first, else absent": `"4711,4712"` → 4711, `""` / `"x,1"` → None.
pub fn first_code(raw: &str) -> Option<i64> {
    raw.split(',')
        .next()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .and_then(|s| s.parse::<i64>().ok())
}

pub fn reduce_secondary_codes(column: &Column) -> Result<Series> {
    let codes: Vec<Option<i64>> = text_values(column)?
        .iter()
        .map(|v| v.as_deref().and_then(first_code))
        .collect();
    Ok(Series::new(column.name().clone(), codes))
}

// ============================================================================
// TESTS
// ============================================================================
