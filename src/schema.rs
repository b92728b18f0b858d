// 📐 Shape Layer - Canonical Schemas & Harmonization
// One positional schema per source category, consulted by the reader (names)
// and by the harmonizer (target types)

use crate::error::{PipelineError, Result};
use polars::prelude::{DataFrame, DataType, IntoSeries, PlSmallStr, StringChunked};
use serde::{Deserialize, Serialize};

// ============================================================================
// SOURCE CATEGORIES
// ============================================================================

/// SourceCategory - which part of the registry release a file belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SourceCategory {
    Companies,
    Ventures,
    Municipalities,
    Countries,
    IndustryClasses,
}

impl SourceCategory {
    pub const ALL: [SourceCategory; 5] = [
        SourceCategory::Companies,
        SourceCategory::Ventures,
        SourceCategory::Municipalities,
        SourceCategory::Countries,
        SourceCategory::IndustryClasses,
    ];

    /// Human-readable name for logs
    pub fn name(&self) -> &'static str {
        match self {
            SourceCategory::Companies => "companies",
            SourceCategory::Ventures => "ventures",
            SourceCategory::Municipalities => "municipalities",
            SourceCategory::Countries => "countries",
            SourceCategory::IndustryClasses => "industry classes",
        }
    }

    /// Subdirectory of the base directory the release uses
    pub fn default_dir(&self) -> &'static str {
        match self {
            SourceCategory::Companies => "empresas",
            SourceCategory::Ventures => "empreendimentos",
            SourceCategory::Municipalities => "municipios",
            SourceCategory::Countries => "paises",
            SourceCategory::IndustryClasses => "cnae",
        }
    }

    /// File stem inside the release ("Empresas" + chunk index, or a single file)
    pub fn file_stem(&self) -> &'static str {
        match self {
            SourceCategory::Companies => "Empresas",
            SourceCategory::Ventures => "Estabelecimentos",
            SourceCategory::Municipalities => "Municipios",
            SourceCategory::Countries => "Paises",
            SourceCategory::IndustryClasses => "Cnaes",
        }
    }

    /// Companies and ventures ship as numbered chunks
    pub fn is_chunked(&self) -> bool {
        matches!(self, SourceCategory::Companies | SourceCategory::Ventures)
    }

    /// Extracted CSV name for a chunk (or the single file when `chunk` is None)
    pub fn file_name(&self, chunk: Option<usize>) -> String {
        match chunk {
            Some(i) if self.is_chunked() => format!("{}{}.csv", self.file_stem(), i),
            _ => format!("{}.csv", self.file_stem()),
        }
    }
}

// ============================================================================
// COLUMN DEFINITIONS
// ============================================================================

/// Canonical type of a column after harmonization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int,
    Text,
}

impl FieldType {
    pub fn dtype(&self) -> DataType {
        match self {
            FieldType::Int => DataType::Int64,
            FieldType::Text => DataType::String,
        }
    }
}

/// How the reader treats a column before harmonization
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Type inferred from the sample, then cast
    Inferred,
    /// Raw text, no inference: keeps leading zeros in postal codes, branch orders and the like
    Verbatim,
    /// Raw text reduced to its canonical code form (see `canonical_code`)
    Code,
}

/// One positional column of a canonical schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnDef {
    pub name: &'static str,
    pub index: usize,
    pub field: FieldType,
    pub kind: ColumnKind,
}

impl ColumnDef {
    /// Read as text regardless of what inference would pick
    pub fn is_verbatim(&self) -> bool {
        !matches!(self.kind, ColumnKind::Inferred)
    }
}

const INT: (FieldType, ColumnKind) = (FieldType::Int, ColumnKind::Inferred);
const CODE: (FieldType, ColumnKind) = (FieldType::Text, ColumnKind::Code);
const RAW: (FieldType, ColumnKind) = (FieldType::Text, ColumnKind::Verbatim);

const COMPANY_COLUMNS: [(&str, (FieldType, ColumnKind)); 7] = [
    ("cnpj_basico", INT),
    ("razao_social", RAW),
    ("natureza_juridica", INT),
    ("qualificacao_responsavel", INT),
    ("capital_social", RAW),
    ("porte_da_empresa", RAW),
    ("ente_federativo_responsavel", RAW),
];

const VENTURE_COLUMNS: [(&str, (FieldType, ColumnKind)); 30] = [
    ("cnpj_basico", INT),
    ("cnpj_ordem", RAW),
    ("cnpj_dv", RAW),
    ("identificador_matriz_filial", INT),
    ("nome_fantasia", RAW),
    ("situacao_cadastral", INT),
    ("data_situacao_cadastral", RAW),
    ("motivo_situacao_cadastral", INT),
    ("nome_cidade_exterior", RAW),
    ("pais", CODE),
    ("data_inicio_atividade", RAW),
    ("cnae_principal", INT),
    ("cnae_secundario", RAW),
    ("tipo_logradouro", RAW),
    ("logradouro", RAW),
    ("numero", RAW),
    ("complemento", RAW),
    ("bairro", RAW),
    ("cep", RAW),
    ("uf", RAW),
    ("municipio", INT),
    ("ddd_1", RAW),
    ("telefone_1", RAW),
    ("ddd_2", RAW),
    ("telefone_2", RAW),
    ("ddd_fax", RAW),
    ("fax", RAW),
    ("email", RAW),
    ("situacao_especial", RAW),
    ("data_situacao_especial", RAW),
];

const MUNICIPALITY_COLUMNS: [(&str, (FieldType, ColumnKind)); 2] =
    [("codigo", INT), ("nome_municipio", RAW)];

// Same rule as the venture `pais` column, so both join keys agree whatever
// the inference sample looked like.
const COUNTRY_COLUMNS: [(&str, (FieldType, ColumnKind)); 2] = [("codigo", CODE), ("nome_pais", RAW)];

const INDUSTRY_COLUMNS: [(&str, (FieldType, ColumnKind)); 2] = [("codigo", INT), ("descricao", RAW)];

/// Canonical text form of a numeric registry code: trimmed, no leading zeros.
/// `"013"` → `"13"`, `"000"` → `"0"`, blank → None.
pub fn canonical_code(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() {
        Some("0".to_string())
    } else {
        Some(stripped.to_string())
    }
}

// ============================================================================
// SCHEMA
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    pub category: SourceCategory,
    columns: Vec<ColumnDef>,
}

impl Schema {
    pub fn for_category(category: SourceCategory) -> Self {
        let defs: &[(&'static str, (FieldType, ColumnKind))] = match category {
            SourceCategory::Companies => &COMPANY_COLUMNS,
            SourceCategory::Ventures => &VENTURE_COLUMNS,
            SourceCategory::Municipalities => &MUNICIPALITY_COLUMNS,
            SourceCategory::Countries => &COUNTRY_COLUMNS,
            SourceCategory::IndustryClasses => &INDUSTRY_COLUMNS,
        };

        let columns = defs
            .iter()
            .enumerate()
            .map(|(index, (name, (field, kind)))| ColumnDef {
                name: *name,
                index,
                field: *field,
                kind: *kind,
            })
            .collect();

        Schema { category, columns }
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.columns.iter().map(|c| c.name).collect()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Strict-cast every schema column to its canonical type and reduce code
    /// columns to `canonical_code`.
    ///
    /// Column order and names are untouched. A missing column or a value the
    /// cast would lose is an error: at this stage it means upstream drift.
    pub fn harmonize(&self, mut df: DataFrame) -> Result<DataFrame> {
        if df.width() < self.len() {
            return Err(PipelineError::schema(format!(
                "{} table has {} columns, canonical schema needs {}",
                self.category.name(),
                df.width(),
                self.len()
            )));
        }

        for def in &self.columns {
            let target = def.field.dtype();
            let cast = df
                .column(def.name)?
                .as_materialized_series()
                .strict_cast(&target)
                .map_err(|e| PipelineError::Cast {
                    column: def.name.to_string(),
                    target: target.to_string(),
                    message: e.to_string(),
                })?;

            let cast = if def.kind == ColumnKind::Code {
                let codes: StringChunked = cast
                    .str()?
                    .into_iter()
                    .map(|v| v.and_then(canonical_code))
                    .collect();
                codes.with_name(PlSmallStr::from_static(def.name)).into_series()
            } else {
                cast
            };

            df.with_column(cast)?;
        }

        Ok(df)
    }
}

// ============================================================================
// TESTS
// ============================================================================
