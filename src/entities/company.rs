// 🏢 Company Classifier
// Union of harmonized company chunks → capital normalized → size tier → large tiers only
//
// Problem solved:
// - "1.234,56", "1000,00", "" → one integer capital per company
// - five tiers computed for every row, only Small/Medium/Large reported

use crate::error::Result;
use crate::frame::{concat_frames, text_values};
use crate::rules::{capital_to_int, normalize_capital, SizeTier, TierThresholds};
use crate::schema::SourceCategory;
use polars::prelude::{BooleanChunked, DataFrame, NamedFrom, NewChunkedArray, Series};
use tracing::info;

/// Columns handed to the join engine, in order
pub const COMPANY_OUTPUT_COLUMNS: [&str; 4] = [
    "cnpj_basico",
    "razao_social",
    "capital_social",
    "classificacao_porte",
];

/// Concatenate harmonized chunks (ascending chunk order) and keep only the
/// companies in reported tiers, projected to `COMPANY_OUTPUT_COLUMNS`.
///
/// Chunks whose column names or types disagree fail the whole step.
pub fn classify_companies(chunks: Vec<DataFrame>, thresholds: &TierThresholds) -> Result<DataFrame> {
    let companies = concat_frames(SourceCategory::Companies.name(), chunks)?;
    let total = companies.height();

    let (classified, tiers) = add_size_classification(companies, thresholds)?;
    let mask: Vec<bool> = tiers.iter().map(SizeTier::is_reported).collect();
    let mask = BooleanChunked::from_slice("reported".into(), &mask);
    let retained = classified.filter(&mask)?.select(COMPANY_OUTPUT_COLUMNS)?;

    info!(
        total,
        retained = retained.height(),
        "classified companies by declared capital"
    );
    Ok(retained)
}

/// Append `capital_social_int` (never null) and `classificacao_porte`.
/// Also returns the tier of every row so callers can filter without
/// re-parsing labels.
pub fn add_size_classification(
    mut df: DataFrame,
    thresholds: &TierThresholds,
) -> Result<(DataFrame, Vec<SizeTier>)> {
    let capitals: Vec<i64> = text_values(df.column("capital_social")?)?
        .iter()
        .map(|v| capital_to_int(normalize_capital(v.as_deref().unwrap_or(""))))
        .collect();

    let tiers: Vec<SizeTier> = capitals
        .iter()
        .map(|c| SizeTier::classify(*c, thresholds))
        .collect();
    let labels: Vec<&str> = tiers.iter().map(SizeTier::label).collect();

    df.with_column(Series::new("capital_social_int".into(), capitals))?;
    df.with_column(Series::new("classificacao_porte".into(), labels))?;
    Ok((df, tiers))
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use polars::df;

    fn chunk(rows: &[(i64, &str, Option<&str>)]) -> DataFrame {
        let n = rows.len();
        df!(
            "cnpj_basico" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "razao_social" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            "natureza_juridica" => vec![2062i64; n],
            "qualificacao_responsavel" => vec![49i64; n],
            "capital_social" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            "porte_da_empresa" => vec!["05"; n],
            "ente_federativo_responsavel" => vec![None::<&str>; n],
        )
        .unwrap()
    }

    fn labels(df: &DataFrame) -> Vec<String> {
        df.column("classificacao_porte")
            .unwrap()
            .str()
            .unwrap()
            .into_iter()
            .map(|v| v.unwrap_or_default().to_string())
            .collect()
    }

    #[test]
    fn test_classifier_keeps_only_reported_tiers() {
        let first = chunk(&[
            (1, "TINY", Some("1000,00")),
            (2, "SMALL BIZ", Some("200000,00")),
            (3, "PEQUENA", Some("1.000.000,00")),
        ]);
        let second = chunk(&[
            (4, "MEDIA", Some("50000000,00")),
            (5, "GRANDE", Some("900000000,00")),
            (6, "SEM CAPITAL", None),
        ]);

        let out = classify_companies(vec![first, second], &TierThresholds::default()).unwrap();
        let names: Vec<&str> = out.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(names, COMPANY_OUTPUT_COLUMNS.to_vec());

        let ids: Vec<Option<i64>> = out.column("cnpj_basico").unwrap().i64().unwrap().into_iter().collect();
        assert_eq!(ids, vec![Some(3), Some(4), Some(5)]);

        let labels = labels(&out);
        assert!(!labels.iter().any(|l| l == "MEI" || l == "ME"));
        assert_eq!(labels[2], "Large-sized Company");
        assert_eq!(
            out.column("capital_social").unwrap().str().unwrap().get(0),
            Some("1.000.000,00")
        );
    }

    #[test]
    fn test_missing_capital_is_zero_and_mei() {
        let (df, tiers) =
            add_size_classification(chunk(&[(1, "X", None)]), &TierThresholds::default()).unwrap();
        assert_eq!(df.column("capital_social_int").unwrap().i64().unwrap().get(0), Some(0));
        assert_eq!(tiers, vec![SizeTier::Mei]);
    }

    #[test]
    fn test_boundary_capital_values() {
        let (df, tiers) = add_size_classification(
            chunk(&[(1, "A", Some("81000,00")), (2, "B", Some("81001,00"))]),
            &TierThresholds::default(),
        )
        .unwrap();
        assert_eq!(tiers, vec![SizeTier::Mei, SizeTier::Me]);
        assert_eq!(labels(&df), vec!["MEI", "ME"]);
    }

    #[test]
    fn test_chunk_type_mismatch_is_structural() {
        let good = chunk(&[(1, "A", Some("1,00"))]);
        let mut drifted = good.clone();
        drifted
            .with_column(Series::new("natureza_juridica".into(), ["2062"]))
            .unwrap();

        let err = classify_companies(vec![good, drifted], &TierThresholds::default()).unwrap_err();
        assert!(matches!(err, PipelineError::Concat { .. }));
    }
}
