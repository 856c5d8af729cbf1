use serde::Serialize;

use crate::audit::{AuditReport, RunMeta};
use crate::cleaning::resolve_discrepancies;
use crate::config::ReconConfig;
use crate::conflicts::canonicalize_conflicts;
use crate::corrections::apply_corrections;
use crate::error::ReconError;
use crate::load::load_csv;
use crate::model::Table;
use crate::neighbors::attach_suggestions;
use crate::reporter::Reporter;
use crate::spatial::SpatialIndex;

/// Which part of the pipeline to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Corrections, discrepancy resolution, neighbors, then conflicts.
    Full,
    /// Corrections, discrepancy resolution and neighbors.
    Clean,
    /// Conflict detection on an already cleaned table.
    Conflicts,
}

impl Stage {
    pub fn cleans(self) -> bool {
        matches!(self, Self::Full | Self::Clean)
    }

    pub fn resolves_conflicts(self) -> bool {
        matches!(self, Self::Full | Self::Conflicts)
    }
}

#[derive(Debug, Clone)]
pub struct ReconOutcome {
    /// Discrepancy-resolved table, when the stage cleans.
    pub cleaned: Option<Table>,
    /// Name-canonicalized table, when the stage resolves conflicts.
    pub canonical: Option<Table>,
    pub report: AuditReport,
}

/// Run the pipeline over a loaded table. Fails before producing anything if
/// a correction rule is stale.
pub fn run(
    config: &ReconConfig,
    mut table: Table,
    input: &str,
    stage: Stage,
    reporter: &mut dyn Reporter,
) -> Result<ReconOutcome, ReconError> {
    let mut report = AuditReport::new(RunMeta::new(config, input, stage));
    let mut cleaned = None;

    if stage.cleans() {
        if !config.corrections.is_empty() {
            let applied = apply_corrections(
                &mut table,
                &config.corrections,
                config.cleaning.coordinate_decimals,
                reporter,
            )?;
            report.record_rules(applied);
        }

        let mut outcome = resolve_discrepancies(&table, &config.cleaning, reporter);
        let index = SpatialIndex::build(std::mem::take(&mut outcome.corpus));
        reporter.debug(&format!("spatial index over {} combinations", index.len()));
        attach_suggestions(&mut outcome.flagged, &index, &config.neighbors, reporter);

        report.record_cleaning(outcome.stats, outcome.corrections, outcome.flagged);
        table = outcome.table;
        cleaned = Some(table.clone());
    }

    let mut canonical = None;
    if stage.resolves_conflicts() {
        let outcome = canonicalize_conflicts(&table, &config.conflicts, reporter);
        report.record_conflicts(outcome.stats, outcome.canonicalizations, outcome.cross_scope);
        canonical = Some(outcome.table);
    }

    Ok(ReconOutcome { cleaned, canonical, report })
}

/// Parse CSV text and run the pipeline.
pub fn run_csv(
    config: &ReconConfig,
    csv_data: &str,
    input: &str,
    stage: Stage,
    reporter: &mut dyn Reporter,
) -> Result<ReconOutcome, ReconError> {
    let table = load_csv(csv_data, config.cleaning.coordinate_decimals)?;
    reporter.info(&format!("loaded {} rows from {input}", table.rows.len()));
    run(config, table, input, stage, reporter)
}
