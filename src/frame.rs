// 🧮 DataFrame helpers
// Thin glue over polars shared by the entity stages and the join engine

use crate::error::{PipelineError, Result};
use polars::prelude::*;

/// Cell values of `column` rendered as text, nulls kept.
pub fn text_values(column: &Column) -> PolarsResult<Vec<Option<String>>> {
    let rendered = column.cast(&DataType::String)?;
    Ok(rendered
        .str()?
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Blank or whitespace-only text cells become null in every String column.
pub fn blank_to_null(df: &mut DataFrame) -> PolarsResult<()> {
    let text_columns: Vec<PlSmallStr> = df
        .get_columns()
        .iter()
        .filter(|c| c.dtype() == &DataType::String)
        .map(|c| c.name().clone())
        .collect();

    for name in text_columns {
        let cleaned: StringChunked = df
            .column(name.as_str())?
            .str()?
            .into_iter()
            .map(|v| v.filter(|s| !s.trim().is_empty()))
            .collect();
        df.with_column(cleaned.with_name(name).into_series())?;
    }
    Ok(())
}

/// Vertically stack chunks in the given order.
///
/// Every chunk must carry the same column names and types as the first one;
/// any disagreement fails the whole step.
pub fn concat_frames(category: &str, frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut frames = frames.into_iter();
    let mut stacked = frames.next().ok_or_else(|| PipelineError::Concat {
        category: category.to_string(),
        message: "no chunks to concatenate".to_string(),
    })?;

    for (offset, frame) in frames.enumerate() {
        let expected = shape_signature(&stacked);
        let found = shape_signature(&frame);
        if expected != found {
            return Err(PipelineError::Concat {
                category: category.to_string(),
                message: format!(
                    "chunk {} has columns {:?}, expected {:?}",
                    offset + 1,
                    found,
                    expected
                ),
            });
        }

        stacked
            .vstack_mut(&frame)
            .map_err(|e| PipelineError::Concat {
                category: category.to_string(),
                message: e.to_string(),
            })?;
    }

    Ok(stacked)
}

fn shape_signature(df: &DataFrame) -> Vec<(String, DataType)> {
    df.get_columns()
        .iter()
        .map(|c| (c.name().to_string(), c.dtype().clone()))
        .collect()
}

/// Equi-join on one key column per side. The right key is coalesced into the
/// left one; polars rejects keys whose types differ.
pub fn join_frames(
    left: &DataFrame,
    right: &DataFrame,
    left_on: &str,
    right_on: &str,
    how: JoinType,
) -> Result<DataFrame> {
    left.clone()
        .lazy()
        .join(
            right.clone().lazy(),
            [col(left_on)],
            [col(right_on)],
            JoinArgs::new(how),
        )
        .collect()
        .map_err(|e| PipelineError::join(format!("{} = {}: {}", left_on, right_on, e)))
}

// ============================================================================
// TESTS
// ============================================================================
