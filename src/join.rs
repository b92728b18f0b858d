// 🔗 Join Engine
// Company ⋈ Venture ⟕ Municipality ⟕ Country ⟕ CNAE (primary) ⟕ CNAE (secondary)
//
// All-or-nothing: any failure here is structural and aborts the run.

use crate::entities::ReferenceTables;
use crate::error::{PipelineError, Result};
use crate::frame::{join_frames, text_values};
use polars::prelude::{CsvWriter, DataFrame, JoinType, NamedFrom, PlSmallStr, SerWriter, Series};
use std::fs::{self, File};
use std::path::Path;
use tracing::info;

/// Columns superseded by `cnpj` or excluded from the output
pub const DROPPED_COLUMNS: [&str; 7] = [
    "cnpj_basico",
    "cnpj_ordem",
    "cnpj_dv",
    "motivo_situacao_cadastral",
    "ddd_fax",
    "fax",
    "municipio",
];

pub const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

// Widths of the three CNPJ components
const BASE_WIDTH: usize = 8;
const ORDER_WIDTH: usize = 4;
const CHECK_WIDTH: usize = 2;

// ============================================================================
// FINAL RECORDS
// ============================================================================

/// Build the FinalRecord table: one row per active venture of a retained
/// company, `cnpj` first.
pub fn build_final_records(
    companies: &DataFrame,
    ventures: &DataFrame,
    references: &ReferenceTables,
) -> Result<DataFrame> {
    join_all(companies, ventures, references).map_err(|err| match err {
        PipelineError::Join { .. } => err,
        other => PipelineError::join(other.to_string()),
    })
}

fn join_all(
    companies: &DataFrame,
    ventures: &DataFrame,
    references: &ReferenceTables,
) -> Result<DataFrame> {
    let municipalities = require(&references.municipalities, "municipality")?;
    let countries = require(&references.countries, "country")?;
    let industry = require(&references.industry_classes, "industry classification")?;

    // Inner join drops ventures of filtered-out companies and companies without ventures
    let joined = join_frames(companies, ventures, "cnpj_basico", "cnpj_basico", JoinType::Inner)?;
    // Foreign establishments have no municipality, domestic ones no country
    let joined = join_frames(&joined, municipalities, "municipio", "codigo", JoinType::Left)?;
    let joined = join_frames(&joined, countries, "pais", "codigo", JoinType::Left)?;

    let mut joined = join_frames(&joined, industry, "cnae_principal", "codigo", JoinType::Left)?;
    joined.rename("descricao", "descricao_cnae_principal".into())?;
    let mut joined = join_frames(&joined, industry, "cnae_secundario", "codigo", JoinType::Left)?;
    joined.rename("descricao", "descricao_cnae_secundario".into())?;

    let cnpj = cnpj_column(&joined)?;
    joined.with_column(cnpj)?;
    for name in DROPPED_COLUMNS {
        joined = joined.drop(name)?;
    }

    let mut order: Vec<PlSmallStr> = vec!["cnpj".into()];
    order.extend(
        joined
            .get_column_names()
            .into_iter()
            .filter(|name| name.as_str() != "cnpj")
            .cloned(),
    );
    let records = joined.select(order)?;

    info!(
        rows = records.height(),
        columns = records.width(),
        "joined final records"
    );
    Ok(records)
}

fn require<'a>(df: &'a Option<DataFrame>, name: &str) -> Result<&'a DataFrame> {
    df.as_ref()
        .ok_or_else(|| PipelineError::join(format!("{} table is unavailable", name)))
}

// ============================================================================
// CNPJ SYNTHESIS
// ============================================================================

/// 14-digit national ID: base (8) ‖ order (4) ‖ check digit (2), zero-padded,
/// no separators. String concatenation only, so leading zeros survive.
pub fn synthesize_cnpj(base: &str, order: &str, check: &str) -> String {
    format!(
        "{:0>bw$}{:0>ow$}{:0>cw$}",
        base.trim(),
        order.trim(),
        check.trim(),
        bw = BASE_WIDTH,
        ow = ORDER_WIDTH,
        cw = CHECK_WIDTH
    )
}

/// `cnpj` column; a row with any null component gets a null ID.
fn cnpj_column(df: &DataFrame) -> Result<Series> {
    let base = text_values(df.column("cnpj_basico")?)?;
    let order = text_values(df.column("cnpj_ordem")?)?;
    let check = text_values(df.column("cnpj_dv")?)?;

    let ids: Vec<Option<String>> = base
        .iter()
        .zip(&order)
        .zip(&check)
        .map(|((b, o), c)| match (b, o, c) {
            (Some(b), Some(o), Some(c)) => Some(synthesize_cnpj(b, o, c)),
            _ => None,
        })
        .collect();

    Ok(Series::new("cnpj".into(), ids))
}

// ============================================================================
// OUTPUT
// ============================================================================

/// Persist as `;`-separated UTF-8 with BOM and a header row.
///
/// Written to a sibling temp file and renamed into place, so a failed write
/// never leaves a partial result behind.
pub fn write_output(df: &DataFrame, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PipelineError::io(parent, e))?;
    }

    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("result.csv");
    let partial = path.with_file_name(format!(".{}.partial", file_name));

    let written = write_delimited(df, &partial);
    if written.is_err() {
        let _ = fs::remove_file(&partial);
        return written;
    }

    fs::rename(&partial, path).map_err(|e| PipelineError::io(path, e))?;
    info!(path = %path.display(), rows = df.height(), "wrote output");
    Ok(())
}

fn write_delimited(df: &DataFrame, path: &Path) -> Result<()> {
    let mut file = File::create(path).map_err(|e| PipelineError::io(path, e))?;
    let mut df = df.clone();

    CsvWriter::new(&mut file)
        .include_bom(true)
        .include_header(true)
        .with_separator(b';')
        .finish(&mut df)?;
    Ok(())
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use polars::df;
    use polars::prelude::SortMultipleOptions;
    use tempfile::TempDir;

    fn companies() -> DataFrame {
        df!(
            "cnpj_basico" => [12345678i64, 191],
            "razao_social" => ["ACME SA", "BANCO"],
            "capital_social" => ["5000000,00", "900000000,00"],
            "classificacao_porte" => ["Medium-sized Company", "Large-sized Company"],
        )
        .unwrap()
    }

    /// Four ventures: two of ACME (one foreign), one of 191, one of a filtered company
    fn ventures() -> DataFrame {
        df!(
            "cnpj_basico" => [12345678i64, 12345678, 191, 999],
            "cnpj_ordem" => ["0001", "0002", "0001", "0001"],
            "cnpj_dv" => ["90", "71", "08", "11"],
            "identificador_matriz_filial" => ["Headquarters", "Branch", "Headquarters", "Headquarters"],
            "situacao_cadastral" => ["Active"; 4],
            "motivo_situacao_cadastral" => [0i64; 4],
            "pais" => [None, Some("249"), Some("777"), None],
            "cnae_principal" => [4711301i64, 6201501, 6422100, 4711301],
            "cnae_secundario" => [Some(6201501i64), None, None, None],
            "municipio" => [Some(7107i64), None, Some(9701), Some(7107)],
            "ddd_fax" => [None::<&str>; 4],
            "fax" => [None::<&str>; 4],
        )
        .unwrap()
    }

    fn references() -> ReferenceTables {
        ReferenceTables {
            municipalities: Some(
                df!(
                    "codigo" => [7107i64, 9701],
                    "nome_municipio" => ["SAO PAULO", "BRASILIA"],
                )
                .unwrap(),
            ),
            countries: Some(
                df!(
                    "codigo" => ["249", "105"],
                    "nome_pais" => ["ESTADOS UNIDOS", "BRASIL"],
                )
                .unwrap(),
            ),
            industry_classes: Some(
                df!(
                    "codigo" => [4711301i64, 6201501, 6422100],
                    "descricao" => ["Hipermercados", "Software sob encomenda", "Bancos"],
                )
                .unwrap(),
            ),
        }
    }

    /// Final records ordered by `cnpj`, so assertions do not depend on join order
    fn final_records() -> DataFrame {
        build_final_records(&companies(), &ventures(), &references())
            .unwrap()
            .sort(["cnpj"], SortMultipleOptions::default())
            .unwrap()
    }

    fn texts(df: &DataFrame, name: &str) -> Vec<Option<String>> {
        text_values(df.column(name).unwrap()).unwrap()
    }

    fn some(value: &str) -> Option<String> {
        Some(value.to_string())
    }

    #[test]
    fn test_synthesize_cnpj_preserves_leading_zeros() {
        assert_eq!(synthesize_cnpj("12345678", "0001", "90"), "12345678000190");
        assert_eq!(synthesize_cnpj("191", "1", "8"), "00000191000108");
    }

    #[test]
    fn test_final_records_shape_and_order() {
        let out = final_records();

        // Venture of company 999 is gone: it has no retained company
        assert_eq!(out.height(), 3);
        let names: Vec<&str> = out.get_column_names().iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "cnpj",
                "razao_social",
                "capital_social",
                "classificacao_porte",
                "identificador_matriz_filial",
                "situacao_cadastral",
                "pais",
                "cnae_principal",
                "cnae_secundario",
                "nome_municipio",
                "nome_pais",
                "descricao_cnae_principal",
                "descricao_cnae_secundario",
            ]
        );
        assert_eq!(
            texts(&out, "cnpj"),
            vec![some("00000191000108"), some("12345678000190"), some("12345678000271")]
        );
    }

    #[test]
    fn test_missing_references_resolve_to_null() {
        let out = final_records();

        // Unknown country code 777 keeps the row with a null name
        assert_eq!(texts(&out, "nome_pais"), vec![None, None, some("ESTADOS UNIDOS")]);
        assert_eq!(
            texts(&out, "nome_municipio"),
            vec![some("BRASILIA"), some("SAO PAULO"), None]
        );
        assert_eq!(
            texts(&out, "descricao_cnae_secundario"),
            vec![None, some("Software sob encomenda"), None]
        );
        assert_eq!(texts(&out, "descricao_cnae_principal")[0], some("Bancos"));
    }

    #[test]
    fn test_absent_reference_table_aborts() {
        let mut refs = references();
        refs.countries = None;

        let err = build_final_records(&companies(), &ventures(), &refs).unwrap_err();
        assert!(matches!(err, PipelineError::Join { .. }));
    }

    #[test]
    fn test_schema_problems_surface_as_join_errors() {
        let broken = ventures().drop("fax").unwrap();
        let err = build_final_records(&companies(), &broken, &references()).unwrap_err();
        assert!(matches!(err, PipelineError::Join { .. }));
    }

    #[test]
    fn test_key_type_mismatch_aborts() {
        let mut refs = references();
        refs.countries = Some(
            df!("codigo" => [249i64], "nome_pais" => ["ESTADOS UNIDOS"]).unwrap(),
        );

        let err = build_final_records(&companies(), &ventures(), &refs).unwrap_err();
        assert!(matches!(err, PipelineError::Join { .. }));
    }

    #[test]
    fn test_write_output_has_bom_header_and_semicolons() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("out").join("result.csv");

        write_output(&final_records(), &path).unwrap();

        let bytes = fs::read(&path).unwrap();
        assert!(bytes.starts_with(UTF8_BOM));
        let text = String::from_utf8(bytes[UTF8_BOM.len()..].to_vec()).unwrap();
        let mut lines = text.lines();
        assert!(lines.next().unwrap().starts_with("cnpj;razao_social;capital_social"));
        assert!(text.contains(
            "\n12345678000190;ACME SA;5000000,00;Medium-sized Company;Headquarters;Active;;4711301;6201501;SAO PAULO;;Hipermercados;Software sob encomenda"
        ));
        assert_eq!(text.lines().count(), 4);
        assert!(!dir.path().join("out").join(".result.csv.partial").exists());
    }
}
