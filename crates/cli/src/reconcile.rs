//! Coordinate reconciliation commands: run, clean, conflicts, validate.

use std::path::{Path, PathBuf};

use clap::Args;

use georecon::{AuditReport, LogReporter, ReconConfig, ReconError, Stage, Table};
use georecon_io::markdown::LogPaths;

use crate::exit_codes::EXIT_REVIEW;
use crate::paths::OutputPaths;
use crate::CliError;

/// Flags shared by every reconciliation command.
#[derive(Args, Debug)]
pub struct CommonArgs {
    /// Observation CSV (raw export or previously cleaned file)
    #[arg(short, long)]
    pub input: PathBuf,

    /// TOML config with thresholds and correction rules
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Auto-merge groups whose coordinates are at most this many meters apart
    #[arg(long, value_name = "METERS")]
    pub distance_threshold: Option<f64>,

    /// Bucket width in degrees for point-name collision detection
    #[arg(long, value_name = "DEGREES")]
    pub coordinate_precision: Option<f64>,

    /// Print the audit report as JSON to stdout
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Final cleaned CSV [default: <stem>_cleaned.csv]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Discrepancy-resolved CSV, before name canonicalization [default: <stem>_cleaned_mult_coord.csv]
    #[arg(long)]
    pub cleaned_coordinates: Option<PathBuf>,

    /// Flagged discrepancies CSV [default: <stem>_flagged_coordinates.csv]
    #[arg(long)]
    pub flagged: Option<PathBuf>,

    /// Coordinate cleaning log [default: <stem>_coordinate_cleaning.md]
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Cross-scope conflicts CSV [default: <stem>_coordinate_conflicts.csv]
    #[arg(long)]
    pub conflicts_output: Option<PathBuf>,

    /// Point-name corrections log [default: <stem>_cleaned.md]
    #[arg(long)]
    pub corrections_log: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct CleanArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Discrepancy-resolved CSV [default: <stem>_cleaned_mult_coord.csv]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Flagged discrepancies CSV [default: <stem>_flagged_coordinates.csv]
    #[arg(long)]
    pub flagged: Option<PathBuf>,

    /// Coordinate cleaning log [default: <stem>_coordinate_cleaning.md]
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct ConflictsArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Name-canonicalized CSV [default: <stem>_cleaned.csv]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Cross-scope conflicts CSV [default: <stem>_coordinate_conflicts.csv]
    #[arg(long)]
    pub conflicts_output: Option<PathBuf>,

    /// Point-name corrections log [default: <stem>_cleaned.md]
    #[arg(long)]
    pub corrections_log: Option<PathBuf>,
}

// ---------------------------------------------------------------------------
// Error mapping
// ---------------------------------------------------------------------------

fn engine_err(err: ReconError) -> CliError {
    let message = err.to_string();
    match err {
        ReconError::MissingColumn { .. } => CliError::input(message)
            .with_hint("required columns: unit, subunit, site, point_name, lat, lon, year"),
        ReconError::Csv(_) | ReconError::Io(_) => CliError::input(message),
        ReconError::RuleMatchedNothing { .. } => CliError::config(message)
            .with_hint("the correction list is stale for this input; update or remove the rule"),
        ReconError::RuleUnknownColumn { .. }
        | ReconError::RuleSourceMissing { .. }
        | ReconError::ConfigParse(_)
        | ReconError::ConfigValidation(_) => CliError::config(message),
    }
}

fn write_err(path: &Path) -> impl FnOnce(String) -> CliError + '_ {
    move |e| CliError::output(format!("cannot write {}: {e}", path.display()))
}

// ---------------------------------------------------------------------------
// Shared steps
// ---------------------------------------------------------------------------

/// Config file (or defaults) with command-line overrides applied.
fn resolve_config(common: &CommonArgs) -> Result<ReconConfig, CliError> {
    let mut config = match &common.config {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .map_err(|e| CliError::config(format!("cannot read config {}: {e}", path.display())))?;
            ReconConfig::from_toml(&text).map_err(engine_err)?
        }
        None => ReconConfig::default(),
    };

    if common.distance_threshold.is_none() && common.coordinate_precision.is_none() {
        return Ok(config);
    }
    if let Some(threshold) = common.distance_threshold {
        config.cleaning.distance_threshold_m = threshold;
    }
    if let Some(precision) = common.coordinate_precision {
        config.conflicts.coordinate_precision = precision;
    }
    config.validate().map_err(|e| CliError::usage(e.to_string()))?;
    Ok(config)
}

fn load_input(common: &CommonArgs, config: &ReconConfig) -> Result<Table, CliError> {
    let text = georecon_io::csv::read_file_as_utf8(&common.input)
        .map_err(|e| CliError::input(format!("cannot read input: {e}")))?;
    let table = georecon::load_csv(&text, config.cleaning.coordinate_decimals).map_err(engine_err)?;
    log::info!("loaded {} rows from {}", table.rows.len(), common.input.display());
    Ok(table)
}

fn execute(common: &CommonArgs, stage: Stage) -> Result<(ReconConfig, georecon::ReconOutcome), CliError> {
    let config = resolve_config(common)?;
    let table = load_input(common, &config)?;
    let label = common.input.display().to_string();
    let outcome = georecon::run(&config, table, &label, stage, &mut LogReporter).map_err(engine_err)?;
    Ok((config, outcome))
}

fn write_text(path: &Path, text: &str) -> Result<(), CliError> {
    std::fs::write(path, text).map_err(|e| write_err(path)(e.to_string()))
}

fn wrote(path: &Path) {
    eprintln!("wrote {}", path.display());
}

struct StageOneOutputs<'a> {
    cleaned: &'a Path,
    flagged: &'a Path,
    report: &'a Path,
}

struct StageTwoOutputs<'a> {
    cleaned: &'a Path,
    conflicts: &'a Path,
    log: &'a Path,
}

fn write_stage_one(
    table: &Table,
    report: &AuditReport,
    config: &ReconConfig,
    out: &StageOneOutputs<'_>,
) -> Result<(), CliError> {
    let paths = LogPaths {
        cleaned: out.cleaned.display().to_string(),
        flagged: out.flagged.display().to_string(),
        ..LogPaths::default()
    };
    georecon_io::csv::write_table(table, out.cleaned).map_err(write_err(out.cleaned))?;
    wrote(out.cleaned);
    georecon_io::csv::write_flagged(&report.flagged, config.neighbors.slots, out.flagged)
        .map_err(write_err(out.flagged))?;
    wrote(out.flagged);
    write_text(out.report, &georecon_io::markdown::render_cleaning_log(report, &paths))?;
    wrote(out.report);
    Ok(())
}

fn write_stage_two(
    table: &Table,
    report: &AuditReport,
    out: &StageTwoOutputs<'_>,
) -> Result<(), CliError> {
    let paths = LogPaths {
        cleaned: out.cleaned.display().to_string(),
        conflicts: out.conflicts.display().to_string(),
        ..LogPaths::default()
    };
    georecon_io::csv::write_table(table, out.cleaned).map_err(write_err(out.cleaned))?;
    wrote(out.cleaned);
    georecon_io::csv::write_conflicts(&report.cross_scope, out.conflicts).map_err(write_err(out.conflicts))?;
    wrote(out.conflicts);
    write_text(out.log, &georecon_io::markdown::render_canonicalization_log(report, &paths))?;
    wrote(out.log);
    Ok(())
}

/// JSON to stdout, human summary to stderr, verdict as exit status.
fn finish(report: &AuditReport, json: bool, flagged_path: Option<&Path>) -> Result<(), CliError> {
    if json {
        let text = georecon_io::json::report_to_string(report)
            .map_err(|e| CliError::output(format!("JSON serialization error: {e}")))?;
        println!("{text}");
    }

    if let Some(s) = &report.summary.cleaning {
        eprintln!(
            "cleaning: {} rows, {} groups: {} untouched, {} auto-corrected, {} flagged",
            s.total_rows, s.point_groups, s.untouched_groups, s.corrected_groups, s.flagged_groups
        );
    }
    if let Some(s) = &report.summary.conflicts {
        eprintln!(
            "conflicts: {} collisions resolved ({} rows renamed), {} cross-scope",
            s.collisions, s.rows_affected, s.cross_scope
        );
    }

    if !report.requires_manual_review() {
        return Ok(());
    }

    let mut reasons = Vec::new();
    if !report.flagged.is_empty() {
        reasons.push(format!("{} point groups flagged", report.flagged.len()));
    }
    if report.summary.unresolved_conflicts > 0 {
        reasons.push(format!(
            "{} cross-scope collisions unresolved",
            report.summary.unresolved_conflicts
        ));
    }
    Err(CliError {
        code: EXIT_REVIEW,
        message: format!("manual review required: {}", reasons.join(", ")),
        hint: flagged_path
            .filter(|_| !report.flagged.is_empty())
            .map(|p| format!("see {}", p.display())),
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

pub fn cmd_run(args: RunArgs) -> Result<(), CliError> {
    let defaults = OutputPaths::from_input(&args.common.input);
    let cleaned_coordinates = args.cleaned_coordinates.unwrap_or(defaults.cleaned_coordinates);
    let flagged = args.flagged.unwrap_or(defaults.flagged);
    let report_path = args.report.unwrap_or(defaults.cleaning_log);
    let output = args.output.unwrap_or(defaults.cleaned);
    let conflicts = args.conflicts_output.unwrap_or(defaults.conflicts);
    let corrections_log = args.corrections_log.unwrap_or(defaults.corrections_log);

    let (config, outcome) = execute(&args.common, Stage::Full)?;

    let one = StageOneOutputs { cleaned: &cleaned_coordinates, flagged: &flagged, report: &report_path };
    let two = StageTwoOutputs { cleaned: &output, conflicts: &conflicts, log: &corrections_log };

    if let Some(table) = &outcome.cleaned {
        write_stage_one(table, &outcome.report, &config, &one)?;
    }
    if let Some(table) = &outcome.canonical {
        write_stage_two(table, &outcome.report, &two)?;
    }
    finish(&outcome.report, args.common.json, Some(flagged.as_path()))
}

pub fn cmd_clean(args: CleanArgs) -> Result<(), CliError> {
    let defaults = OutputPaths::from_input(&args.common.input);
    let output = args.output.unwrap_or(defaults.cleaned_coordinates);
    let flagged = args.flagged.unwrap_or(defaults.flagged);
    let report_path = args.report.unwrap_or(defaults.cleaning_log);

    let (config, outcome) = execute(&args.common, Stage::Clean)?;

    let one = StageOneOutputs { cleaned: &output, flagged: &flagged, report: &report_path };
    if let Some(table) = &outcome.cleaned {
        write_stage_one(table, &outcome.report, &config, &one)?;
    }
    finish(&outcome.report, args.common.json, Some(flagged.as_path()))
}

pub fn cmd_conflicts(args: ConflictsArgs) -> Result<(), CliError> {
    let defaults = OutputPaths::from_input(&args.common.input);
    let output = args.output.unwrap_or(defaults.cleaned);
    let conflicts = args.conflicts_output.unwrap_or(defaults.conflicts);
    let corrections_log = args.corrections_log.unwrap_or(defaults.corrections_log);

    let (_, outcome) = execute(&args.common, Stage::Conflicts)?;

    let two = StageTwoOutputs { cleaned: &output, conflicts: &conflicts, log: &corrections_log };
    if let Some(table) = &outcome.canonical {
        write_stage_two(table, &outcome.report, &two)?;
    }
    finish(&outcome.report, args.common.json, None)
}

pub fn cmd_validate(config_path: PathBuf) -> Result<(), CliError> {
    let text = std::fs::read_to_string(&config_path)
        .map_err(|e| CliError::config(format!("cannot read config {}: {e}", config_path.display())))?;
    let config = ReconConfig::from_toml(&text).map_err(engine_err)?;

    eprintln!(
        "config OK: threshold {} m, precision {}°, cross-scope {}, {} correction rules",
        config.cleaning.distance_threshold_m,
        config.conflicts.coordinate_precision,
        config.conflicts.cross_scope,
        config.corrections.len()
    );
    Ok(())
}
