use std::collections::HashMap;

use crate::model::{insert_year, Coordinate, CoordinateObservation, IdentityKey, PointCombination, Record};

/// Rows sharing one identity key. `rows` index into the source slice, in input order.
#[derive(Debug, Clone)]
pub struct PointGroup {
    pub key: IdentityKey,
    pub rows: Vec<usize>,
}

/// Partition rows that carry a coordinate by identity key, in first-seen key order.
pub fn group_points(rows: &[Record]) -> Vec<PointGroup> {
    let mut groups: Vec<PointGroup> = Vec::new();
    let mut index: HashMap<&IdentityKey, usize> = HashMap::new();

    for (i, row) in rows.iter().enumerate() {
        if row.coordinate.is_none() {
            continue;
        }
        match index.get(&row.key) {
            Some(&g) => groups[g].rows.push(i),
            None => {
                index.insert(&row.key, groups.len());
                groups.push(PointGroup { key: row.key.clone(), rows: vec![i] });
            }
        }
    }

    groups
}

/// Distinct coordinates of a group, first-seen order, with their years.
pub fn distinct_coordinates(rows: &[Record], members: &[usize]) -> Vec<CoordinateObservation> {
    let mut out: Vec<CoordinateObservation> = Vec::new();
    let mut index: HashMap<(u64, u64), usize> = HashMap::new();

    for &i in members {
        let row = &rows[i];
        let Some(coordinate) = row.coordinate else { continue };
        let slot = *index.entry(coordinate.exact_key()).or_insert_with(|| {
            out.push(CoordinateObservation { coordinate, years: Vec::new(), row_count: 0 });
            out.len() - 1
        });
        out[slot].row_count += 1;
        if let Some(year) = row.year {
            insert_year(&mut out[slot].years, year);
        }
    }

    out
}

/// Distinct (identity key, coordinate) combinations across all rows with a coordinate.
pub fn distinct_combinations(rows: &[Record]) -> Vec<PointCombination> {
    let mut out: Vec<PointCombination> = Vec::new();
    let mut index: HashMap<(IdentityKey, (u64, u64)), usize> = HashMap::new();

    for row in rows {
        let Some(coordinate) = row.coordinate else { continue };
        let slot = match index.get(&(row.key.clone(), coordinate.exact_key())) {
            Some(&slot) => slot,
            None => {
                index.insert((row.key.clone(), coordinate.exact_key()), out.len());
                out.push(PointCombination {
                    key: row.key.clone(),
                    coordinate,
                    years: Vec::new(),
                    row_count: 0,
                });
                out.len() - 1
            }
        };
        out[slot].row_count += 1;
        if let Some(year) = row.year {
            insert_year(&mut out[slot].years, year);
        }
    }

    out
}

/// Coordinate of the most recent row; ties go to the earliest row. Rows
/// without a year only win when no row has one.
pub fn most_recent_coordinate(rows: &[Record], members: &[usize]) -> Option<(Coordinate, Option<i32>)> {
    let mut best: Option<(Coordinate, Option<i32>)> = None;
    for &i in members {
        let row = &rows[i];
        let Some(coordinate) = row.coordinate else { continue };
        best = match (best, row.year) {
            (None, year) => Some((coordinate, year)),
            (Some((_, None)), Some(year)) => Some((coordinate, Some(year))),
            (Some((_, Some(best_year))), Some(year)) if year > best_year => Some((coordinate, Some(year))),
            (keep, _) => keep,
        };
    }
    best
}
