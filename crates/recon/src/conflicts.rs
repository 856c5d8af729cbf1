//! Coordinate collisions between differently-named points, and their
//! recency-based canonicalization.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::{ConflictConfig, CrossScopePolicy};
use crate::grouping::distinct_combinations;
use crate::model::{Coordinate, KeyPart, PointCombination, Scope, Table};
use crate::reporter::Reporter;

/// Floor-truncation of coordinates to a fixed number of decimals.
#[derive(Debug, Clone, Copy)]
pub struct Truncation {
    pub decimals: u32,
    factor: f64,
}

impl Truncation {
    pub fn new(decimals: u32) -> Self {
        Self { decimals, factor: 10f64.powi(decimals as i32) }
    }

    pub fn bucket(&self, c: Coordinate) -> BucketKey {
        BucketKey {
            lat: (c.lat * self.factor).floor() as i64,
            lon: (c.lon * self.factor).floor() as i64,
        }
    }

    /// Truncated coordinate of a bucket, for display.
    pub fn corner(&self, bucket: BucketKey) -> Coordinate {
        Coordinate::new(bucket.lat as f64 / self.factor, bucket.lon as f64 / self.factor)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct BucketKey {
    pub lat: i64,
    pub lon: i64,
}

/// Differently-named points collapsed onto one name within a scope.
#[derive(Debug, Clone, Serialize)]
pub struct Canonicalization {
    pub bucket: Coordinate,
    pub scope: Scope,
    /// Every colliding name, first-seen order, canonical one included.
    pub point_names: Vec<KeyPart>,
    pub canonical_name: KeyPart,
    pub canonical_coordinate: Coordinate,
    pub driving_year: Option<i32>,
    /// Rows whose point_name actually changed.
    pub rows_affected: usize,
}

impl Canonicalization {
    pub fn old_names(&self) -> Vec<&KeyPart> {
        self.point_names.iter().filter(|n| **n != self.canonical_name).collect()
    }

    pub fn reason(&self) -> String {
        match self.driving_year {
            Some(year) => format!("Most recent year: {year}"),
            None => "No year recorded; first observed".to_string(),
        }
    }
}

/// Differently-named points sharing a bucket across more than one scope.
/// Never rewritten.
#[derive(Debug, Clone, Serialize)]
pub struct CrossScopeCollision {
    pub bucket: Coordinate,
    pub scopes: Vec<Scope>,
    pub point_names: Vec<KeyPart>,
    pub years: Vec<i32>,
    /// Name of the most recent combination in the bucket.
    pub suggested_name: KeyPart,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictStats {
    pub combinations: usize,
    pub buckets: usize,
    pub collisions: usize,
    pub rows_affected: usize,
    pub cross_scope: usize,
}

#[derive(Debug, Clone)]
pub struct ConflictOutcome {
    pub table: Table,
    pub canonicalizations: Vec<Canonicalization>,
    pub cross_scope: Vec<CrossScopeCollision>,
    pub stats: ConflictStats,
}

type ScopedBucket = (Scope, BucketKey);

/// Group indices by a key, preserving first-seen order of keys and members.
fn group_by<K, F>(len: usize, mut key_of: F) -> Vec<(K, Vec<usize>)>
where
    K: std::hash::Hash + Eq + Clone,
    F: FnMut(usize) -> Option<K>,
{
    let mut groups: Vec<(K, Vec<usize>)> = Vec::new();
    let mut index: HashMap<K, usize> = HashMap::new();
    for i in 0..len {
        let Some(key) = key_of(i) else { continue };
        match index.get(&key) {
            Some(&g) => groups[g].1.push(i),
            None => {
                index.insert(key.clone(), groups.len());
                groups.push((key, vec![i]));
            }
        }
    }
    groups
}

fn distinct_names<'a>(combos: impl Iterator<Item = &'a PointCombination>) -> Vec<KeyPart> {
    let mut names: Vec<KeyPart> = Vec::new();
    for c in combos {
        if !names.contains(&c.key.point_name) {
            names.push(c.key.point_name.clone());
        }
    }
    names
}

/// First combination whose years include the bucket's maximum year.
fn canonical_member<'a>(combos: &[&'a PointCombination]) -> Option<(&'a PointCombination, Option<i32>)> {
    let max_year = combos.iter().filter_map(|c| c.years.last().copied()).max();
    let chosen = match max_year {
        Some(year) => combos.iter().find(|c| c.years.contains(&year)),
        None => combos.first(),
    };
    chosen.map(|c| (*c, max_year))
}

pub fn canonicalize_conflicts(
    table: &Table,
    config: &ConflictConfig,
    reporter: &mut dyn Reporter,
) -> ConflictOutcome {
    let truncation = Truncation::new(config.decimals());
    let combos = distinct_combinations(&table.rows);
    let mut stats = ConflictStats { combinations: combos.len(), ..ConflictStats::default() };

    let buckets: Vec<(ScopedBucket, Vec<usize>)> = group_by(combos.len(), |i| {
        let c = &combos[i];
        Some((c.key.scope(), truncation.bucket(c.coordinate)))
    });
    stats.buckets = buckets.len();

    // Rows per (scope, bucket); the canonical coordinate stays in its bucket.
    let mut rows_by_bucket: HashMap<ScopedBucket, Vec<usize>> = HashMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        if let Some(c) = row.coordinate {
            rows_by_bucket
                .entry((row.key.scope(), truncation.bucket(c)))
                .or_default()
                .push(i);
        }
    }

    let mut rows = table.rows.clone();
    let mut canonicalizations = Vec::new();

    for ((scope, bucket), members) in &buckets {
        let members: Vec<&PointCombination> = members.iter().map(|&i| &combos[i]).collect();
        let point_names = distinct_names(members.iter().copied());
        if point_names.len() < 2 {
            continue;
        }
        let Some((canonical, driving_year)) = canonical_member(&members) else { continue };

        let mut rows_affected = 0;
        if let Some(row_ids) = rows_by_bucket.get(&(scope.clone(), *bucket)) {
            for &r in row_ids {
                let row = &mut rows[r];
                if row.key.point_name != canonical.key.point_name {
                    rows_affected += 1;
                    row.key.point_name = canonical.key.point_name.clone();
                }
                row.coordinate = Some(canonical.coordinate);
            }
        }

        reporter.debug(&format!(
            "{scope} at {}: {} names → '{}'",
            truncation.corner(*bucket),
            point_names.len(),
            canonical.key.point_name
        ));
        stats.collisions += 1;
        stats.rows_affected += rows_affected;
        canonicalizations.push(Canonicalization {
            bucket: truncation.corner(*bucket),
            scope: scope.clone(),
            point_names,
            canonical_name: canonical.key.point_name.clone(),
            canonical_coordinate: canonical.coordinate,
            driving_year,
            rows_affected,
        });
    }

    let table = table.with_rows(rows);
    let cross_scope = match config.cross_scope {
        CrossScopePolicy::Ignore => Vec::new(),
        CrossScopePolicy::Report | CrossScopePolicy::Fail => detect_cross_scope(&table, truncation),
    };
    stats.cross_scope = cross_scope.len();

    reporter.info(&format!(
        "{} coordinate collisions resolved, {} rows renamed",
        stats.collisions, stats.rows_affected
    ));
    if !cross_scope.is_empty() {
        reporter.warn(&format!(
            "{} collisions span more than one unit/site and were left unresolved",
            cross_scope.len()
        ));
    }

    ConflictOutcome { table, canonicalizations, cross_scope, stats }
}

/// Buckets shared by more than one scope with more than one point name.
pub fn detect_cross_scope(table: &Table, truncation: Truncation) -> Vec<CrossScopeCollision> {
    let combos = distinct_combinations(&table.rows);
    let buckets = group_by(combos.len(), |i| Some(truncation.bucket(combos[i].coordinate)));

    let mut out = Vec::new();
    for (bucket, members) in buckets {
        let members: Vec<&PointCombination> = members.iter().map(|&i| &combos[i]).collect();
        let mut scopes: Vec<Scope> = Vec::new();
        for c in &members {
            let scope = c.key.scope();
            if !scopes.contains(&scope) {
                scopes.push(scope);
            }
        }
        let point_names = distinct_names(members.iter().copied());
        if scopes.len() < 2 || point_names.len() < 2 {
            continue;
        }

        let mut years: Vec<i32> = members.iter().flat_map(|c| c.years.iter().copied()).collect();
        years.sort_unstable();
        years.dedup();

        let suggested_name = canonical_member(&members)
            .map(|(c, _)| c.key.point_name.clone())
            .unwrap_or(KeyPart::Missing);

        out.push(CrossScopeCollision {
            bucket: truncation.corner(bucket),
            scopes,
            point_names,
            years,
            suggested_name,
        });
    }
    out
}
