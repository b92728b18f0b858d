// 🚀 Pipeline
// read chunks → harmonize → classify companies / normalize ventures
//   → load references → join → write
//
// Per-unit read failures are recorded and skipped; everything else aborts
// before the output file is touched.

use crate::config::PipelineConfig;
use crate::entities::{classify_companies, load_reference, normalize_ventures, ReferenceTables};
use crate::error::{PipelineError, Result};
use crate::join::{build_final_records, write_output};
use crate::parser::{read_raw_table, ChunkRead, ReadOptions};
use crate::report::{RunReport, UnitOutcome};
use crate::schema::{Schema, SourceCategory};
use polars::prelude::DataFrame;
use rayon::prelude::*;
use std::time::Instant;
use tracing::info;

/// Run the whole pipeline with a fresh report.
pub fn run(config: &PipelineConfig) -> Result<(DataFrame, RunReport)> {
    let mut report = RunReport::new();
    let records = run_with_report(config, &mut report)?;
    Ok((records, report))
}

/// Run the pipeline, filling `report` as stages complete. On error the report
/// still holds every unit outcome gathered so far.
pub fn run_with_report(config: &PipelineConfig, report: &mut RunReport) -> Result<DataFrame> {
    config.validate()?;
    let options = config.read_options();

    info!(
        run_id = %report.run_id,
        base_dir = %config.base_dir.display(),
        chunks = config.chunk_count,
        parallel = config.parallel_reads,
        "starting pipeline run"
    );

    // Companies
    let started = Instant::now();
    let chunks = load_chunks(config, SourceCategory::Companies, &options, report)?;
    let companies = classify_companies(chunks, &config.thresholds)?;
    report.retained_companies = companies.height();
    report.record_timing("companies", started.elapsed());

    // Ventures
    let started = Instant::now();
    let chunks = load_chunks(config, SourceCategory::Ventures, &options, report)?;
    let ventures = normalize_ventures(chunks)?;
    report.active_ventures = ventures.height();
    report.record_timing("ventures", started.elapsed());

    // Reference tables
    let started = Instant::now();
    let references = load_references(config, &options, report);
    report.record_timing("references", started.elapsed());

    // Join + write
    let started = Instant::now();
    let records = build_final_records(&companies, &ventures, &references)?;
    report.record_timing("join", started.elapsed());

    let started = Instant::now();
    write_output(&records, &config.output_path)?;
    report.output_shape = Some(records.shape());
    report.output_path = Some(config.output_path.clone());
    report.record_timing("write", started.elapsed());

    info!(run_id = %report.run_id, summary = %report.summary(), "pipeline run finished");
    Ok(records)
}

// ============================================================================
// CHUNK LOADING
// ============================================================================

/// Read and harmonize chunks 0..chunk_count of one category.
///
/// Frames come back in ascending chunk index whether the reads ran in
/// parallel or not. A chunk that cannot be read is skipped; a chunk that was
/// read but does not fit the canonical schema is an error.
pub fn load_chunks(
    config: &PipelineConfig,
    category: SourceCategory,
    options: &ReadOptions,
    report: &mut RunReport,
) -> Result<Vec<DataFrame>> {
    let schema = Schema::for_category(category);

    let read_one = |index: usize| -> Result<(UnitOutcome, Option<DataFrame>)> {
        let path = config.unit_path(category, Some(index));
        let read = read_raw_table(&path, schema.columns(), Some(index), options);
        let outcome = UnitOutcome::from_read(category, Some(index), &path, &read);
        let frame = read.into_frame().map(|df| schema.harmonize(df)).transpose()?;
        Ok((outcome, frame))
    };

    let results: Vec<Result<(UnitOutcome, Option<DataFrame>)>> = if config.parallel_reads {
        (0..config.chunk_count).into_par_iter().map(read_one).collect()
    } else {
        (0..config.chunk_count).map(read_one).collect()
    };

    let mut frames = Vec::new();
    for result in results {
        let (outcome, frame) = result?;
        report.record(outcome);
        frames.extend(frame);
    }

    if frames.is_empty() {
        return Err(PipelineError::NoChunks {
            category: category.name().to_string(),
            dir: config.category_dir(category),
        });
    }

    info!(
        category = category.name(),
        loaded = frames.len(),
        attempted = config.chunk_count,
        "loaded chunks"
    );
    Ok(frames)
}

/// Municipality, country and CNAE tables; an unreadable one is left absent
/// and the join stage decides what that means.
pub fn load_references(
    config: &PipelineConfig,
    options: &ReadOptions,
    report: &mut RunReport,
) -> ReferenceTables {
    let mut load = |category: SourceCategory| -> Option<DataFrame> {
        let path = config.unit_path(category, None);
        let read: ChunkRead = load_reference(category, &path, options);
        report.record(UnitOutcome::from_read(category, None, &path, &read));
        read.into_frame()
    };

    ReferenceTables {
        municipalities: load(SourceCategory::Municipalities),
        countries: load(SourceCategory::Countries),
        industry_classes: load(SourceCategory::IndustryClasses),
    }
}

// ============================================================================
// TESTS
// ============================================================================
