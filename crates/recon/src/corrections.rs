//! Declarative manual corrections applied before reconciliation.

use std::collections::HashMap;

use serde::Serialize;

use crate::config::{CorrectionAction, CorrectionRule, RulePredicate};
use crate::error::ReconError;
use crate::model::{
    format_degrees, Coordinate, IdentityKey, KeyPart, Record, Table, COL_POINT_NAME, COL_SITE,
    COL_SUBUNIT, COL_UNIT,
};
use crate::reporter::Reporter;

const TIME_COLUMN: &str = "time";

#[derive(Debug, Clone, Serialize)]
pub struct RuleApplication {
    /// 1-based position in the rule list.
    pub rule: usize,
    pub description: String,
    pub rows_matched: usize,
    pub actions: Vec<String>,
}

/// A rule with its column references resolved against the table.
struct BoundRule<'a> {
    rule: &'a CorrectionRule,
    fields: Vec<(usize, &'a str)>,
    actions: Vec<BoundAction<'a>>,
}

enum BoundAction<'a> {
    Rename(&'a str),
    Recoordinate(Coordinate),
    SetExtra(usize, &'a str),
    CopyExtra { from: usize, to: usize },
    ReplaceText { targets: Vec<TextTarget>, from: &'a str, to: &'a str },
    CopyCoordinates(&'a [i32]),
    Delete,
}

#[derive(Clone, Copy)]
enum TextTarget {
    Unit,
    Subunit,
    Site,
    PointName,
    Extra(usize),
}

/// Rows a rule hit, and the coordinates it will copy, fixed before any rule
/// of its batch runs.
struct Plan {
    hits: Vec<usize>,
    copied: HashMap<(usize, IdentityKey), Coordinate>,
}

fn bind<'a>(n: usize, rule: &'a CorrectionRule, table: &Table, decimals: u32) -> Result<BoundRule<'a>, ReconError> {
    let column = |name: &str| {
        table
            .extra_index(name)
            .ok_or_else(|| ReconError::RuleUnknownColumn { rule: n, column: name.to_string() })
    };
    let text_target = |name: &str| match name {
        COL_UNIT => Ok(TextTarget::Unit),
        COL_SUBUNIT => Ok(TextTarget::Subunit),
        COL_SITE => Ok(TextTarget::Site),
        COL_POINT_NAME => Ok(TextTarget::PointName),
        other => column(other).map(TextTarget::Extra),
    };

    let mut fields = Vec::new();
    for (name, value) in &rule.when.fields {
        fields.push((column(name)?, value.as_str()));
    }

    let mut actions = Vec::new();
    for action in &rule.actions {
        actions.push(match action {
            CorrectionAction::Rename { point_name } => BoundAction::Rename(point_name),
            CorrectionAction::Recoordinate { lat, lon } => {
                BoundAction::Recoordinate(Coordinate::new(*lat, *lon).rounded(decimals))
            }
            CorrectionAction::Retime { time } => BoundAction::SetExtra(column(TIME_COLUMN)?, time),
            CorrectionAction::SetField { column: name, value } => BoundAction::SetExtra(column(name)?, value),
            CorrectionAction::CopyField { from, to } => BoundAction::CopyExtra {
                from: column(from)?,
                to: column(to)?,
            },
            CorrectionAction::ReplaceText { columns, from, to } => BoundAction::ReplaceText {
                targets: columns.iter().map(|c| text_target(c.as_str())).collect::<Result<_, _>>()?,
                from,
                to,
            },
            CorrectionAction::CopyCoordinatesFrom { years } => BoundAction::CopyCoordinates(years),
            CorrectionAction::Delete => BoundAction::Delete,
        });
    }

    Ok(BoundRule { rule, fields, actions })
}

fn matches(predicate: &RulePredicate, fields: &[(usize, &str)], row: &Record) -> bool {
    let key = &row.key;
    let part = |p: &KeyPart, expected: &Option<String>| expected.as_deref().map_or(true, |e| p.matches(e));

    part(&key.unit, &predicate.unit)
        && part(&key.subunit, &predicate.subunit)
        && part(&key.site, &predicate.site)
        && part(&key.point_name, &predicate.point_name)
        && predicate
            .years
            .as_ref()
            .map_or(true, |years| row.year.is_some_and(|y| years.contains(&y)))
        && predicate.near.as_ref().map_or(true, |near| {
            row.coordinate
                .is_some_and(|c| c.within(&Coordinate::new(near.lat, near.lon), near.tolerance))
        })
        && fields
            .iter()
            .all(|(i, value)| row.extra.get(*i).is_some_and(|v| v == value))
}

/// Most common coordinate of `key` outside `hits`, first seen wins a tie.
fn most_common_coordinate(table: &Table, hits: &[usize], key: &IdentityKey, years: &[i32]) -> Option<Coordinate> {
    let mut counts: Vec<(Coordinate, usize)> = Vec::new();
    for (idx, row) in table.rows.iter().enumerate() {
        if row.key != *key || hits.binary_search(&idx).is_ok() {
            continue;
        }
        if !years.is_empty() && !row.year.is_some_and(|y| years.contains(&y)) {
            continue;
        }
        let Some(c) = row.coordinate else { continue };
        match counts.iter_mut().find(|(seen, _)| seen.exact_key() == c.exact_key()) {
            Some((_, count)) => *count += 1,
            None => counts.push((c, 1)),
        }
    }

    let mut best: Option<(Coordinate, usize)> = None;
    for (c, count) in counts {
        if best.map_or(true, |(_, top)| count > top) {
            best = Some((c, count));
        }
    }
    best.map(|(c, _)| c)
}

fn plan(n: usize, rule: &BoundRule<'_>, table: &Table, decimals: u32) -> Result<Plan, ReconError> {
    let hits: Vec<usize> = table
        .rows
        .iter()
        .enumerate()
        .filter(|(_, row)| matches(&rule.rule.when, &rule.fields, row))
        .map(|(idx, _)| idx)
        .collect();

    if hits.is_empty() {
        return Err(ReconError::RuleMatchedNothing {
            rule: n,
            description: rule.rule.description.clone(),
        });
    }

    let mut copied = HashMap::new();
    for (a, action) in rule.actions.iter().enumerate() {
        let BoundAction::CopyCoordinates(years) = action else { continue };
        for &idx in &hits {
            let key = &table.rows[idx].key;
            if copied.contains_key(&(a, key.clone())) {
                continue;
            }
            let source = most_common_coordinate(table, &hits, key, years)
                .ok_or_else(|| ReconError::RuleSourceMissing { rule: n, point: key.to_string() })?;
            copied.insert((a, key.clone()), source.rounded(decimals));
        }
    }

    Ok(Plan { hits, copied })
}

fn set_coordinate(row: &mut Record, c: Coordinate) {
    row.coordinate = Some(c);
    row.orig_lat = format_degrees(c.lat);
    row.orig_lon = format_degrees(c.lon);
}

fn replace_in_part(part: &mut KeyPart, from: &str, to: &str) {
    if let KeyPart::Value(v) = part {
        if v.contains(from) {
            *part = KeyPart::from_cell(&v.replace(from, to));
        }
    }
}

/// Apply one rule's actions to its planned rows. Returns whether the rows are
/// to be deleted.
fn execute(rule: &BoundRule<'_>, plan: &Plan, table: &mut Table) -> bool {
    let mut delete = false;
    for &idx in &plan.hits {
        let row = &mut table.rows[idx];
        let planned_key = row.key.clone();
        for (a, action) in rule.actions.iter().enumerate() {
            match action {
                BoundAction::Rename(name) => row.key.point_name = KeyPart::from_cell(name),
                BoundAction::Recoordinate(c) => set_coordinate(row, *c),
                BoundAction::SetExtra(col, value) => {
                    if let Some(cell) = row.extra.get_mut(*col) {
                        *cell = value.to_string();
                    }
                }
                BoundAction::CopyExtra { from, to } => {
                    if let Some(value) = row.extra.get(*from).cloned() {
                        if let Some(cell) = row.extra.get_mut(*to) {
                            *cell = value;
                        }
                    }
                }
                BoundAction::ReplaceText { targets, from, to } => {
                    for target in targets {
                        match *target {
                            TextTarget::Unit => replace_in_part(&mut row.key.unit, from, to),
                            TextTarget::Subunit => replace_in_part(&mut row.key.subunit, from, to),
                            TextTarget::Site => replace_in_part(&mut row.key.site, from, to),
                            TextTarget::PointName => replace_in_part(&mut row.key.point_name, from, to),
                            TextTarget::Extra(col) => {
                                if let Some(cell) = row.extra.get_mut(col) {
                                    if cell.contains(*from) {
                                        *cell = cell.replace(*from, to);
                                    }
                                }
                            }
                        }
                    }
                }
                BoundAction::CopyCoordinates(_) => {
                    if let Some(c) = plan.copied.get(&(a, planned_key.clone())) {
                        set_coordinate(row, *c);
                    }
                }
                BoundAction::Delete => delete = true,
            }
        }
    }
    delete
}

/// End of the batch starting at `start`: the run of adjacent rules sharing
/// its group, or the rule alone.
fn batch_end(bound: &[BoundRule<'_>], start: usize) -> usize {
    match &bound[start].rule.group {
        None => start + 1,
        Some(group) => {
            let len = bound[start..]
                .iter()
                .take_while(|b| b.rule.group.as_ref() == Some(group))
                .count();
            start + len
        }
    }
}

/// Apply rules in declared order. An ungrouped rule sees the table as left
/// by the previous ones. Every rule of a group is matched before any of
/// them runs, and their deletions happen last. A rule matching no rows
/// aborts the whole run.
pub fn apply_corrections(
    table: &mut Table,
    rules: &[CorrectionRule],
    decimals: u32,
    reporter: &mut dyn Reporter,
) -> Result<Vec<RuleApplication>, ReconError> {
    let bound: Vec<BoundRule<'_>> = rules
        .iter()
        .enumerate()
        .map(|(i, rule)| bind(i + 1, rule, table, decimals))
        .collect::<Result<_, _>>()?;

    let mut applied = Vec::with_capacity(bound.len());
    let mut start = 0;

    while start < bound.len() {
        let end = batch_end(&bound, start);
        let snapshot: &Table = table;
        let plans: Vec<Plan> = (start..end)
            .map(|i| plan(i + 1, &bound[i], snapshot, decimals))
            .collect::<Result<_, _>>()?;

        let mut doomed: Vec<usize> = Vec::new();
        for (i, plan) in (start..end).zip(&plans) {
            let n = i + 1;
            let rule = &bound[i];
            if execute(rule, plan, table) {
                doomed.extend_from_slice(&plan.hits);
            }

            reporter.debug(&format!(
                "rule #{n} '{}' matched {} rows",
                rule.rule.description,
                plan.hits.len()
            ));
            applied.push(RuleApplication {
                rule: n,
                description: rule.rule.description.clone(),
                rows_matched: plan.hits.len(),
                actions: rule.rule.actions.iter().map(|a| a.to_string()).collect(),
            });
        }

        if !doomed.is_empty() {
            doomed.sort_unstable();
            doomed.dedup();
            let mut idx = 0;
            table.rows.retain(|_| {
                let keep = doomed.binary_search(&idx).is_err();
                idx += 1;
                keep
            });
        }
        start = end;
    }

    if !applied.is_empty() {
        reporter.info(&format!("{} correction rules applied", applied.len()));
    }
    Ok(applied)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ReconConfig;
    use crate::load::load_csv;
    use crate::reporter::NullReporter;

    const DATA: &str = "\
unit,subunit,site,point_name,lat,lon,year,time,observer
U,,S,Ofer Far 5,32.0,35.0,2012,07:00,dana
U,,S,Ofer Far 5,32.0,35.0,2014,07:10,dana
U,,S,Ofer Far 6,32.1,35.0,2012,07:20,test
";

    fn rules(toml: &str) -> Vec<CorrectionRule> {
        ReconConfig::from_toml(toml).unwrap().corrections
    }

    #[test]
    fn rename_and_retime_by_year() {
        let mut table = load_csv(DATA, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "2012 Ofer Far 5 is really Ofer Far 7"
when = { point_name = "Ofer Far 5", years = [2012] }
actions = [
  { kind = "rename", point_name = "Ofer Far 7" },
  { kind = "retime", time = "06:55" },
]
"#,
        );
        let applied = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(applied[0].rows_matched, 1);
        assert_eq!(applied[0].actions, vec!["rename to 'Ofer Far 7'", "set time to '06:55'"]);
        assert_eq!(table.rows[0].key.point_name.as_str(), "Ofer Far 7");
        assert_eq!(table.rows[0].extra[0], "06:55");
        assert_eq!(table.rows[1].key.point_name.as_str(), "Ofer Far 5");
    }

    #[test]
    fn rules_see_earlier_changes() {
        let mut table = load_csv(DATA, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "rename 6"
when = { point_name = "Ofer Far 6" }
actions = [{ kind = "rename", point_name = "Ofer Far 5" }]

[[corrections]]
description = "move every Ofer Far 5"
when = { point_name = "Ofer Far 5" }
actions = [{ kind = "recoordinate", lat = 32.05000004, lon = 35.0 }]
"#,
        );
        let applied = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(applied[1].rows_matched, 3);
        assert!(table.rows.iter().all(|r| r.coordinate == Some(Coordinate::new(32.05, 35.0))));
        assert_eq!(table.rows[2].orig_lat, "32.05");
    }

    #[test]
    fn delete_by_field() {
        let mut table = load_csv(DATA, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "drop test rows"
when = { fields = { observer = "test" } }
actions = [{ kind = "delete" }]
"#,
        );
        apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert!(table.rows.iter().all(|r| r.extra[1] == "dana"));
    }

    #[test]
    fn near_predicate() {
        let mut table = load_csv(DATA, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "fix point at 32.1"
when = { near = { lat = 32.10005, lon = 35.0 } }
actions = [{ kind = "set_field", column = "observer", value = "noa" }]
"#,
        );
        apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(table.rows[2].extra[1], "noa");
        assert_eq!(table.rows[0].extra[1], "dana");
    }

    #[test]
    fn stale_rule_aborts() {
        let mut table = load_csv(DATA, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "fine"
when = { point_name = "Ofer Far 6" }
actions = [{ kind = "retime", time = "08:00" }]

[[corrections]]
description = "no such point"
when = { point_name = "Ofer Far 99" }
actions = [{ kind = "delete" }]
"#,
        );
        let err = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap_err();
        assert!(matches!(err, ReconError::RuleMatchedNothing { rule: 2, .. }));
    }

    #[test]
    fn unknown_column_is_rejected_before_any_change() {
        let mut table = load_csv(DATA, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "rename 6"
when = { point_name = "Ofer Far 6" }
actions = [{ kind = "rename", point_name = "X" }]

[[corrections]]
description = "bad column"
actions = [{ kind = "set_field", column = "weather", value = "rain" }]
"#,
        );
        let err = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap_err();
        assert!(matches!(err, ReconError::RuleUnknownColumn { rule: 2, ref column } if column == "weather"));
        assert_eq!(table.rows[2].key.point_name.as_str(), "Ofer Far 6");
    }

    #[test]
    fn empty_subunit_selects_missing() {
        let mut table = load_csv(DATA, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "all rows without subunit"
when = { subunit = "" }
actions = [{ kind = "set_field", column = "observer", value = "x" }]
"#,
        );
        let applied = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(applied[0].rows_matched, 3);
    }

    const EXCHANGE: &str = "\
unit,subunit,site,point_name,lat,lon,year,time
U,,Lehavim,Lehavim Near 1,31.36837,34.82344,2012,06:00
U,,Lehavim,Lehavim Near 3,31.37010,34.82500,2012,06:20
U,,Lehavim,Lehavim Near 1,31.37010,34.82500,2015,06:05
";

    const EXCHANGE_RULES: &str = r#"
[[corrections]]
description = "Near 1 was logged as Near 3 in 2012"
group = "2012 exchange"
when = { point_name = "Lehavim Near 1", years = [2012] }
actions = [{ kind = "rename", point_name = "Lehavim Near 3" }]

[[corrections]]
description = "Near 3 was logged as Near 1 in 2012"
group = "2012 exchange"
when = { point_name = "Lehavim Near 3", years = [2012] }
actions = [{ kind = "rename", point_name = "Lehavim Near 1" }]
"#;

    fn point_names(table: &Table) -> Vec<&str> {
        table.rows.iter().map(|r| r.key.point_name.as_str()).collect()
    }

    #[test]
    fn grouped_rules_exchange_names() {
        let mut table = load_csv(EXCHANGE, 6).unwrap();
        let applied = apply_corrections(&mut table, &rules(EXCHANGE_RULES), 6, &mut NullReporter).unwrap();
        assert_eq!(applied.iter().map(|a| a.rows_matched).collect::<Vec<_>>(), vec![1, 1]);
        assert_eq!(point_names(&table), vec!["Lehavim Near 3", "Lehavim Near 1", "Lehavim Near 1"]);
    }

    #[test]
    fn ungrouped_exchange_collapses() {
        let mut table = load_csv(EXCHANGE, 6).unwrap();
        let ungrouped = EXCHANGE_RULES.replace("group = \"2012 exchange\"\n", "");
        let applied = apply_corrections(&mut table, &rules(&ungrouped), 6, &mut NullReporter).unwrap();
        assert_eq!(applied[1].rows_matched, 2);
        assert_eq!(point_names(&table), vec!["Lehavim Near 1", "Lehavim Near 1", "Lehavim Near 1"]);
    }

    #[test]
    fn group_deletes_after_all_rules_ran() {
        let mut table = load_csv(EXCHANGE, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "drop the 2012 Near 3 visit"
group = "g"
when = { point_name = "Lehavim Near 3" }
actions = [{ kind = "delete" }]

[[corrections]]
description = "retime the 2015 visit"
group = "g"
when = { years = [2015] }
actions = [{ kind = "retime", time = "07:00" }]
"#,
        );
        apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[1].extra[0], "07:00");
        assert_eq!(table.rows[0].extra[0], "06:00");
    }

    const WEATHER: &str = "\
unit,subunit,site,point_name,lat,lon,year,disturbances,comment_disturbances,comment_weather
U,,Ein Yaacov,Ein Yaacov Far 1,33.0,35.2,2012,harsh_weather,strong wind,
U,,Ein Yaacov,Ein Yaacov Far 1,33.0,35.2,2015,,,clear
U,,Abirim,Abirim Far 1,33.04,35.28,2015,,,
U,,Abirim,Abirim Far 1,33.04,35.28,2019,,,
U,,Abirim,Abirim Far 1,33.12,35.31,2017,,,
U,,Abirim,Abirim Far 1,33.041,35.281,2021,,,
";

    #[test]
    fn copy_field_moves_comment() {
        let mut table = load_csv(WEATHER, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "harsh weather recorded as a disturbance"
when = { fields = { disturbances = "harsh_weather" } }
actions = [
  { kind = "copy_field", from = "comment_disturbances", to = "comment_weather" },
  { kind = "set_field", column = "disturbances", value = "" },
  { kind = "set_field", column = "comment_disturbances", value = "" },
]
"#,
        );
        let applied = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(applied[0].rows_matched, 1);
        assert_eq!(table.rows[0].extra, vec!["", "", "strong wind"]);
        assert_eq!(table.rows[1].extra, vec!["", "", "clear"]);
    }

    #[test]
    fn replace_text_fixes_spelling_in_key_columns() {
        let mut table = load_csv(WEATHER, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "Ein Yaacov is spelled Ein Yaakov"
when = { site = "Ein Yaacov" }
actions = [{ kind = "replace_text", columns = ["unit", "site", "point_name"], from = "Ein Yaacov", to = "Ein Yaakov" }]
"#,
        );
        apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(table.rows[0].key, IdentityKey::new("U", "", "Ein Yaakov", "Ein Yaakov Far 1"));
        assert_eq!(table.rows[1].key.site.as_str(), "Ein Yaakov");
        assert_eq!(table.rows[2].key.site.as_str(), "Abirim");
    }

    #[test]
    fn replace_text_rejects_unknown_column() {
        let mut table = load_csv(WEATHER, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "spelling"
actions = [{ kind = "replace_text", columns = ["region"], from = "a", to = "b" }]
"#,
        );
        let err = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap_err();
        assert!(matches!(err, ReconError::RuleUnknownColumn { rule: 1, ref column } if column == "region"));
    }

    #[test]
    fn copy_coordinates_from_other_years() {
        let mut table = load_csv(WEATHER, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "2017 Abirim Far 1 recorded with a wrong GPS fix"
when = { point_name = "Abirim Far 1", years = [2017] }
actions = [{ kind = "copy_coordinates_from" }]
"#,
        );
        let applied = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(applied[0].actions, vec!["copy coordinates from other rows of the point"]);
        assert_eq!(table.rows[4].coordinate, Some(Coordinate::new(33.04, 35.28)));
        assert_eq!(table.rows[4].orig_lat, "33.04");
        assert_eq!(table.rows[5].coordinate, Some(Coordinate::new(33.041, 35.281)));
    }

    #[test]
    fn copy_coordinates_from_listed_years() {
        let mut table = load_csv(WEATHER, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "2017 takes the 2021 position"
when = { point_name = "Abirim Far 1", years = [2017] }
actions = [{ kind = "copy_coordinates_from", years = [2021] }]
"#,
        );
        apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap();
        assert_eq!(table.rows[4].coordinate, Some(Coordinate::new(33.041, 35.281)));
    }

    #[test]
    fn copy_coordinates_without_source_fails() {
        let mut table = load_csv(WEATHER, 6).unwrap();
        let rules = rules(
            r#"
[[corrections]]
description = "no 2010 visit exists"
when = { point_name = "Abirim Far 1", years = [2017] }
actions = [{ kind = "copy_coordinates_from", years = [2010] }]
"#,
        );
        let err = apply_corrections(&mut table, &rules, 6, &mut NullReporter).unwrap_err();
        assert!(matches!(err, ReconError::RuleSourceMissing { rule: 1, ref point } if point.contains("Abirim Far 1")));
    }
}
