// ⏰ Registry Dates
// The release encodes dates as 8-digit YYYYMMDD numbers; zero-filled means "no date"

use crate::frame::text_values;
use chrono::NaiveDate;
use polars::prelude::{Column, NamedFrom, PolarsResult, Series};

/// Compact registry date format
pub const COMPACT_DATE_FORMAT: &str = "%Y%m%d";

/// Parse `YYYYMMDD` (text or number) into a date.
///
/// Anything else, including the `0` / `00000000` placeholders and impossible
/// calendar dates, is `None`.
pub fn parse_compact_date(raw: &str) -> Option<NaiveDate> {
    let trimmed = raw.trim();
    if trimmed.len() != 8 || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    NaiveDate::parse_from_str(trimmed, COMPACT_DATE_FORMAT).ok()
}

/// Column form: every cell renders to text first, then parses into a Date
/// column of the same name.
pub fn compact_date_series(column: &Column) -> PolarsResult<Series> {
    let dates: Vec<Option<NaiveDate>> = text_values(column)?
        .iter()
        .map(|v| v.as_deref().and_then(parse_compact_date))
        .collect();
    Ok(Series::new(column.name().clone(), dates))
}
