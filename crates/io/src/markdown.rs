// Markdown audit logs

use std::fmt::Write as _;

use georecon::model::{year_codes, KeyPart};
use georecon::AuditReport;

use crate::csv::format_meters;

/// Output file names referenced from the logs.
#[derive(Debug, Clone, Default)]
pub struct LogPaths {
    pub cleaned: String,
    pub flagged: String,
    pub conflicts: String,
}

fn timestamp(run_at: &str) -> String {
    chrono::DateTime::parse_from_rfc3339(run_at)
        .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|_| run_at.to_string())
}

fn join_years(years: &[i32]) -> String {
    years.iter().map(|y| y.to_string()).collect::<Vec<_>>().join(", ")
}

/// Stage-one log: what was merged, what was held back.
pub fn render_cleaning_log(report: &AuditReport, paths: &LogPaths) -> String {
    let meta = &report.meta;
    let threshold = meta.distance_threshold_m;
    let mut md = String::new();

    let _ = writeln!(md, "# COORDINATE CLEANING LOG\n");
    let _ = writeln!(md, "**Timestamp:** {}", timestamp(&meta.run_at));
    let _ = writeln!(md, "**Input file:** {}", meta.input);
    let _ = writeln!(md, "**Distance threshold:** {threshold} meters");
    let _ = writeln!(md, "**Engine version:** {}\n", meta.engine_version);

    let _ = writeln!(md, "## PROCESSING NOTES\n");
    let _ = writeln!(
        md,
        "- All coordinates rounded to 1e-{} precision before analysis",
        meta.coordinate_decimals
    );
    let _ = writeln!(md, "- Original coordinates preserved as orig_lat, orig_lon fields");
    let _ = writeln!(md, "- Auto-correction uses coordinates from the most recent year");
    if report.summary.rules_applied > 0 {
        let _ = writeln!(
            md,
            "- {} manual correction rules applied to {} rows before cleaning",
            report.summary.rules_applied, report.summary.rows_touched_by_rules
        );
    }
    let _ = writeln!(md, "- Flagged discrepancies exported to: {}", paths.flagged);
    let _ = writeln!(md, "- Cleaned data exported to: {}\n", paths.cleaned);

    if let Some(stats) = &report.summary.cleaning {
        let _ = writeln!(md, "## SUMMARY STATISTICS\n");
        let _ = writeln!(md, "- **Total rows processed:** {}", stats.total_rows);
        let _ = writeln!(md, "- **Rows with valid coordinates:** {}", stats.rows_with_coords);
        let _ = writeln!(md, "- **Rows without coordinates:** {}", stats.rows_without_coords);
        let _ = writeln!(md, "- **Unique point groups examined:** {}", stats.point_groups);
        let _ = writeln!(md, "- **Point groups with unique coordinates:** {}", stats.untouched_groups);
        let _ = writeln!(md, "- **Point groups auto-corrected:** {}", stats.corrected_groups);
        let _ = writeln!(md, "- **Point groups flagged for review:** {}", stats.flagged_groups);
        let _ = writeln!(md, "- **Total rows auto-corrected:** {}", stats.corrected_rows);
        let _ = writeln!(md, "- **Total rows flagged for manual review:** {}\n", stats.flagged_rows);
    }

    if !report.rule_applications.is_empty() {
        let _ = writeln!(md, "## MANUAL CORRECTIONS\n");
        for rule in &report.rule_applications {
            let _ = writeln!(
                md,
                "- **#{}** {} ({} rows): {}",
                rule.rule,
                rule.description,
                rule.rows_matched,
                rule.actions.join("; ")
            );
        }
        md.push('\n');
    }

    if !report.corrections.is_empty() {
        let _ = writeln!(md, "## AUTO-CORRECTIONS (≤{threshold}m)\n");
        for c in &report.corrections {
            let _ = writeln!(md, "### Point Group: {}\n", c.key);
            let _ = writeln!(md, "- **Coordinate count:** {}", c.coordinate_count);
            let _ = writeln!(md, "- **Max distance between coordinates:** {:.1}m", c.max_distance_m);
            let _ = writeln!(md, "- **Years affected:** {}", join_years(&c.years_affected()));
            let _ = writeln!(md, "- **Coordinates found:**");
            for obs in &c.coordinates {
                let _ = writeln!(md, "  * {} (years: {})", obs.coordinate, join_years(&obs.years));
            }
            let source = match c.resolution_year {
                Some(year) => format!("from year {year}"),
                None => "from the first observation (no year recorded)".to_string(),
            };
            let _ = writeln!(
                md,
                "- **Resolution:** Used most recent coordinates ({}) {source}",
                c.resolution
            );
            let _ = writeln!(md, "- **Rows corrected:** {}\n", c.rows_corrected);
        }
    }

    if !report.flagged.is_empty() {
        let _ = writeln!(md, "## FLAGGED FOR MANUAL REVIEW (>{threshold}m)\n");
        for f in &report.flagged {
            let mut years: Vec<i32> = f.coordinates.iter().flat_map(|c| c.years.iter().copied()).collect();
            years.sort_unstable();
            years.dedup();

            let _ = writeln!(md, "### Point Group: {}\n", f.key);
            let _ = writeln!(md, "- **Coordinate count:** {}", f.coordinates.len());
            let _ = writeln!(md, "- **Max distance between coordinates:** {}m", format_meters(f.max_distance_m));
            let _ = writeln!(md, "- **Years affected:** {}", year_codes(&years).replace(';', ", "));
            let _ = writeln!(md, "- **Coordinates found:**");
            for c in &f.coordinates {
                let _ = write!(
                    md,
                    "  * {} (years: {})",
                    c.coordinate,
                    year_codes(&c.years).replace(';', ", ")
                );
                match &c.nearest {
                    Some(n) => {
                        let _ = writeln!(md, " - nearest: {} at {:.1}m", n.key, n.distance_m);
                    }
                    None => md.push('\n'),
                }
            }
            let _ = writeln!(md, "- **Status:** REQUIRES MANUAL CURATION");
            let _ = writeln!(md, "- **Action needed:** Review source data or create coordinate override\n");
        }
    }

    let _ = writeln!(md, "---");
    let _ = writeln!(md, "*End of coordinate cleaning log*");
    md
}

fn names(parts: &[&KeyPart]) -> String {
    parts.iter().map(|p| p.to_string()).collect::<Vec<_>>().join(";")
}

/// Stage-two log: point-name canonicalizations and cross-scope leftovers.
pub fn render_canonicalization_log(report: &AuditReport, paths: &LogPaths) -> String {
    let meta = &report.meta;
    let mut md = String::new();
    let fixed = report.canonicalizations.len();
    let manual = report.cross_scope.len();
    let rows: usize = report.canonicalizations.iter().map(|c| c.rows_affected).sum();

    let _ = writeln!(md, "# Point Name Corrections Applied\n");
    let _ = writeln!(md, "**Date:** {}", timestamp(&meta.run_at));
    let _ = writeln!(md, "**Input file:** {}", meta.input);
    let _ = writeln!(md, "**Cleaned output file:** {}", paths.cleaned);
    let _ = writeln!(md, "**Coordinate precision:** {} degrees\n", meta.coordinate_precision);

    let _ = writeln!(md, "## Summary\n");
    let _ = writeln!(md, "- **Total conflicts detected:** {}", fixed + manual);
    let _ = writeln!(md, "- **Automatically fixed:** {fixed}");
    let _ = writeln!(md, "- **Requiring manual review:** {manual}");
    let _ = writeln!(md, "- **Total rows affected:** {rows}\n");

    if fixed > 0 {
        let _ = writeln!(md, "## Automatic Corrections Applied\n");
        let _ = writeln!(
            md,
            "| Grouped Coordinates | Target Coordinates | Unit | Site | Old Point Names | New Point Name | Reason | Rows Affected |"
        );
        let _ = writeln!(
            md,
            "|--------------------|--------------------|------|------|-----------------|----------------|--------|---------------|"
        );
        for c in &report.canonicalizations {
            let _ = writeln!(
                md,
                "| {} | {} | {} | {} | {} | {} | {} | {} |",
                c.bucket,
                c.canonical_coordinate,
                c.scope.unit,
                c.scope.site,
                names(&c.old_names()),
                c.canonical_name,
                c.reason(),
                c.rows_affected
            );
        }
    }

    if manual > 0 {
        let _ = writeln!(md, "\n## Conflicts Requiring Manual Review\n");
        let _ = writeln!(md, "See detailed conflicts in: `{}`\n", paths.conflicts);
        let _ = writeln!(md, "These conflicts involve different units or sites and require manual resolution.");
    }

    md
}
