//! Per-point discrepancy resolution: auto-merge small spreads, flag large ones.

use serde::Serialize;

use crate::config::CleaningConfig;
use crate::distance::diameter;
use crate::grouping::{distinct_combinations, distinct_coordinates, group_points, most_recent_coordinate};
use crate::model::{Coordinate, CoordinateObservation, IdentityKey, PointCombination, Table};
use crate::reporter::Reporter;

/// An auto-merged group.
#[derive(Debug, Clone, Serialize)]
pub struct CoordinateCorrection {
    pub key: IdentityKey,
    pub coordinate_count: usize,
    pub max_distance_m: f64,
    pub coordinates: Vec<CoordinateObservation>,
    pub resolution: Coordinate,
    pub resolution_year: Option<i32>,
    pub rows_corrected: usize,
}

impl CoordinateCorrection {
    /// Union of years across every distinct coordinate.
    pub fn years_affected(&self) -> Vec<i32> {
        let mut years: Vec<i32> = self.coordinates.iter().flat_map(|c| c.years.iter().copied()).collect();
        years.sort_unstable();
        years.dedup();
        years
    }
}

/// Suggested alternate for a flagged coordinate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NeighborSuggestion {
    pub key: IdentityKey,
    pub coordinate: Coordinate,
    /// Rounded to 0.1 m.
    pub distance_m: f64,
    pub years: Vec<i32>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlaggedCoordinate {
    pub coordinate: Coordinate,
    pub years: Vec<i32>,
    pub row_count: usize,
    pub nearest: Option<NeighborSuggestion>,
}

/// A group held back for manual review. None of its rows reach the cleaned output.
#[derive(Debug, Clone, Serialize)]
pub struct FlaggedGroup {
    pub key: IdentityKey,
    /// `f64::INFINITY` when a coordinate was unusable; serialized as `null`.
    pub max_distance_m: f64,
    pub row_count: usize,
    pub coordinates: Vec<FlaggedCoordinate>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CleaningStats {
    pub total_rows: usize,
    pub rows_with_coords: usize,
    pub rows_without_coords: usize,
    pub point_groups: usize,
    pub untouched_groups: usize,
    pub untouched_rows: usize,
    pub corrected_groups: usize,
    pub corrected_rows: usize,
    pub flagged_groups: usize,
    pub flagged_rows: usize,
}

#[derive(Debug, Clone)]
pub struct CleaningOutcome {
    /// Input order, flagged rows removed.
    pub table: Table,
    pub corrections: Vec<CoordinateCorrection>,
    pub flagged: Vec<FlaggedGroup>,
    pub stats: CleaningStats,
    /// Every (key, coordinate) combination as it stood before merging.
    pub corpus: Vec<PointCombination>,
}

enum Decision {
    Untouched,
    Corrected,
    Flagged,
}

pub fn resolve_discrepancies(
    table: &Table,
    config: &CleaningConfig,
    reporter: &mut dyn Reporter,
) -> CleaningOutcome {
    let rows = &table.rows;
    let mut stats = CleaningStats {
        total_rows: rows.len(),
        rows_with_coords: table.rows_with_coordinates(),
        ..CleaningStats::default()
    };
    stats.rows_without_coords = stats.total_rows - stats.rows_with_coords;

    let groups = group_points(rows);
    stats.point_groups = groups.len();
    reporter.info(&format!(
        "{} rows, {} with coordinates, {} point groups",
        stats.total_rows, stats.rows_with_coords, stats.point_groups
    ));

    let mut replacement: Vec<Option<Coordinate>> = vec![None; rows.len()];
    let mut excluded = vec![false; rows.len()];
    let mut corrections = Vec::new();
    let mut flagged = Vec::new();

    for group in &groups {
        let distinct = distinct_coordinates(rows, &group.rows);
        let decision = if distinct.len() <= 1 {
            Decision::Untouched
        } else {
            let coords: Vec<Coordinate> = distinct.iter().map(|d| d.coordinate).collect();
            let spread = diameter(&coords);
            if spread <= config.distance_threshold_m {
                let Some((resolution, resolution_year)) = most_recent_coordinate(rows, &group.rows) else {
                    continue;
                };
                for &i in &group.rows {
                    replacement[i] = Some(resolution);
                }
                reporter.debug(&format!(
                    "merged {} coordinates of {} ({:.1} m spread)",
                    distinct.len(),
                    group.key,
                    spread
                ));
                corrections.push(CoordinateCorrection {
                    key: group.key.clone(),
                    coordinate_count: distinct.len(),
                    max_distance_m: spread,
                    coordinates: distinct,
                    resolution,
                    resolution_year,
                    rows_corrected: group.rows.len(),
                });
                Decision::Corrected
            } else {
                for &i in &group.rows {
                    excluded[i] = true;
                }
                reporter.warn(&format!(
                    "flagged {}: {} coordinates up to {} apart",
                    group.key,
                    distinct.len(),
                    describe_distance(spread)
                ));
                flagged.push(FlaggedGroup {
                    key: group.key.clone(),
                    max_distance_m: spread,
                    row_count: group.rows.len(),
                    coordinates: distinct
                        .into_iter()
                        .map(|d| FlaggedCoordinate {
                            coordinate: d.coordinate,
                            years: d.years,
                            row_count: d.row_count,
                            nearest: None,
                        })
                        .collect(),
                });
                Decision::Flagged
            }
        };

        match decision {
            Decision::Untouched => {
                stats.untouched_groups += 1;
                stats.untouched_rows += group.rows.len();
            }
            Decision::Corrected => {
                stats.corrected_groups += 1;
                stats.corrected_rows += group.rows.len();
            }
            Decision::Flagged => {
                stats.flagged_groups += 1;
                stats.flagged_rows += group.rows.len();
            }
        }
    }

    let cleaned: Vec<_> = rows
        .iter()
        .enumerate()
        .filter(|(i, _)| !excluded[*i])
        .map(|(i, row)| {
            let mut row = row.clone();
            if let Some(c) = replacement[i] {
                row.coordinate = Some(c);
            }
            row
        })
        .collect();

    reporter.info(&format!(
        "{} groups auto-corrected, {} flagged for review",
        stats.corrected_groups, stats.flagged_groups
    ));

    CleaningOutcome {
        table: table.with_rows(cleaned),
        corrections,
        flagged,
        stats,
        corpus: distinct_combinations(rows),
    }
}

pub(crate) fn describe_distance(meters: f64) -> String {
    if meters.is_finite() {
        format!("{meters:.1} m")
    } else {
        "an unmeasurable distance".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::load_csv;
    use crate::reporter::{MemoryReporter, NullReporter};

    fn clean(data: &str) -> CleaningOutcome {
        let table = load_csv(data, 6).unwrap();
        resolve_discrepancies(&table, &CleaningConfig::default(), &mut NullReporter)
    }

    #[test]
    fn small_spread_takes_most_recent_coordinate() {
        let out = clean(
            "\
unit,subunit,site,point_name,lat,lon,year
U,,S,P,32.0,35.0,2010
U,,S,P,32.0004,35.0004,2015
U,,S,P,32.0,35.0,2012
",
        );
        assert!(out.flagged.is_empty());
        assert_eq!(out.corrections.len(), 1);
        assert!(out
            .table
            .rows
            .iter()
            .all(|r| r.coordinate == Some(Coordinate::new(32.0004, 35.0004))));
        assert_eq!(out.table.rows[0].orig_lat, "32.0");

        let c = &out.corrections[0];
        assert_eq!(c.coordinate_count, 2);
        assert_eq!(c.resolution_year, Some(2015));
        assert_eq!(c.rows_corrected, 3);
        assert_eq!(c.years_affected(), vec![2010, 2012, 2015]);
        assert_eq!(out.stats.corrected_rows, 3);
    }

    #[test]
    fn large_spread_is_flagged_and_removed() {
        let out = clean(
            "\
unit,subunit,site,point_name,lat,lon,year
U,,S,P,32.0,35.0,2010
U,,S,Q,31.0,35.0,2010
U,,S,P,32.0045,35.0,2015
",
        );
        assert!(out.corrections.is_empty());
        assert_eq!(out.flagged.len(), 1);
        assert_eq!(out.table.rows.len(), 1);
        assert_eq!(out.table.rows[0].key.point_name.as_str(), "Q");

        let f = &out.flagged[0];
        assert_eq!(f.row_count, 2);
        assert_eq!(f.coordinates.len(), 2);
        assert_eq!(f.coordinates[0].years, vec![2010]);
        assert_eq!(f.coordinates[1].years, vec![2015]);
        assert_eq!(out.stats.flagged_rows, 2);
        assert_eq!(out.stats.untouched_groups, 1);
        assert_eq!(out.corpus.len(), 3);
    }

    #[test]
    fn invalid_coordinate_forces_flag() {
        let out = clean(
            "\
unit,subunit,site,point_name,lat,lon,year
U,,S,P,32.0,35.0,2010
U,,S,P,95.0,35.0,2015
",
        );
        assert_eq!(out.flagged.len(), 1);
        assert!(out.flagged[0].max_distance_m.is_infinite());
        assert!(out.table.rows.is_empty());
    }

    #[test]
    fn rows_without_coordinates_pass_through_in_order() {
        let out = clean(
            "\
unit,subunit,site,point_name,lat,lon,year
U,,S,P,,,2010
U,,S,Q,31.0,35.0,2010
U,,S,R,x,35.0,2010
",
        );
        let names: Vec<&str> = out.table.rows.iter().map(|r| r.key.point_name.as_str()).collect();
        assert_eq!(names, vec!["P", "Q", "R"]);
        assert_eq!(out.stats.rows_without_coords, 2);
        assert_eq!(out.stats.point_groups, 1);
    }

    #[test]
    fn threshold_is_inclusive_and_configurable() {
        let table = load_csv(
            "\
unit,subunit,site,point_name,lat,lon,year
U,,S,P,32.0,35.0,2010
U,,S,P,32.0045,35.0,2015
",
            6,
        )
        .unwrap();
        let wide = CleaningConfig { distance_threshold_m: 600.0, ..CleaningConfig::default() };
        let mut reporter = MemoryReporter::default();
        let out = resolve_discrepancies(&table, &wide, &mut reporter);
        assert_eq!(out.corrections.len(), 1);
        assert!(reporter.messages(log::Level::Warn).is_empty());

        let zero = CleaningConfig { distance_threshold_m: 0.0, ..CleaningConfig::default() };
        let out = resolve_discrepancies(&table, &zero, &mut reporter);
        assert_eq!(out.flagged.len(), 1);
        assert_eq!(reporter.messages(log::Level::Warn).len(), 1);
    }
}
