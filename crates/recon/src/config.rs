use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::ReconError;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReconConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub cleaning: CleaningConfig,
    #[serde(default)]
    pub neighbors: NeighborConfig,
    #[serde(default)]
    pub conflicts: ConflictConfig,
    #[serde(default)]
    pub corrections: Vec<CorrectionRule>,
}

// ---------------------------------------------------------------------------
// Cleaning
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CleaningConfig {
    /// Groups whose coordinate diameter is at or below this are auto-merged.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold_m: f64,
    /// Coordinates are rounded to this many decimals on load.
    #[serde(default = "default_coordinate_decimals")]
    pub coordinate_decimals: u32,
}

fn default_distance_threshold() -> f64 {
    100.0
}

fn default_coordinate_decimals() -> u32 {
    6
}

impl Default for CleaningConfig {
    fn default() -> Self {
        Self {
            distance_threshold_m: default_distance_threshold(),
            coordinate_decimals: default_coordinate_decimals(),
        }
    }
}

// ---------------------------------------------------------------------------
// Neighbors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NeighborConfig {
    /// Candidates pulled from the spatial index per query.
    #[serde(default = "default_k")]
    pub k: usize,
    /// A candidate with the same key and a coordinate this close is the query itself.
    #[serde(default = "default_self_tolerance")]
    pub self_tolerance_deg: f64,
    /// Coordinate slots rendered in the flagged table.
    #[serde(default = "default_slots")]
    pub slots: usize,
}

fn default_k() -> usize {
    10
}

fn default_self_tolerance() -> f64 {
    1e-5
}

fn default_slots() -> usize {
    3
}

impl Default for NeighborConfig {
    fn default() -> Self {
        Self {
            k: default_k(),
            self_tolerance_deg: default_self_tolerance(),
            slots: default_slots(),
        }
    }
}

// ---------------------------------------------------------------------------
// Conflicts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConflictConfig {
    /// Bucket width in degrees. `1e-4` truncates to 4 decimals (about 11 m).
    #[serde(default = "default_precision")]
    pub coordinate_precision: f64,
    #[serde(default)]
    pub cross_scope: CrossScopePolicy,
}

fn default_precision() -> f64 {
    1e-4
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            coordinate_precision: default_precision(),
            cross_scope: CrossScopePolicy::default(),
        }
    }
}

impl ConflictConfig {
    /// Decimal places implied by the precision, `-log10(precision)` truncated.
    /// `3e-4` gives 3. The nudge keeps `1e-3` from landing on 2.999...
    pub fn decimals(&self) -> u32 {
        let d = (-self.coordinate_precision.log10() + 1e-9).trunc();
        if d.is_finite() && d > 0.0 {
            d as u32
        } else {
            0
        }
    }
}

/// What to do with collisions whose combinations span more than one (unit, site).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossScopePolicy {
    Ignore,
    #[default]
    Report,
    Fail,
}

impl std::fmt::Display for CrossScopePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Report => write!(f, "report"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

// ---------------------------------------------------------------------------
// Correction rules
// ---------------------------------------------------------------------------

/// A hand-curated correction: rows matching `when` get every action applied.
///
/// Adjacent rules sharing a `group` are matched against the table as it was
/// before any of them ran, so a group can exchange two point names.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CorrectionRule {
    pub description: String,
    #[serde(default)]
    pub group: Option<String>,
    #[serde(default)]
    pub when: RulePredicate,
    pub actions: Vec<CorrectionAction>,
}

/// Conjunctive row predicate. Absent fields match everything.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RulePredicate {
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub subunit: Option<String>,
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub point_name: Option<String>,
    #[serde(default)]
    pub years: Option<Vec<i32>>,
    #[serde(default)]
    pub near: Option<NearPredicate>,
    /// Pass-through column name → exact cell value.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NearPredicate {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_near_tolerance")]
    pub tolerance: f64,
}

fn default_near_tolerance() -> f64 {
    1e-4
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CorrectionAction {
    Rename { point_name: String },
    Recoordinate { lat: f64, lon: f64 },
    Retime { time: String },
    SetField { column: String, value: String },
    /// Overwrite `to` with the row's own `from` cell.
    CopyField { from: String, to: String },
    /// Substring replacement in key or pass-through columns.
    ReplaceText { columns: Vec<String>, from: String, to: String },
    /// Take the most common coordinate among rows of the same point that the
    /// rule did not match, limited to `years` when given.
    CopyCoordinatesFrom {
        #[serde(default)]
        years: Vec<i32>,
    },
    Delete,
}

impl std::fmt::Display for CorrectionAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rename { point_name } => write!(f, "rename to '{point_name}'"),
            Self::Recoordinate { lat, lon } => write!(f, "recoordinate to {lat},{lon}"),
            Self::Retime { time } => write!(f, "set time to '{time}'"),
            Self::SetField { column, value } => write!(f, "set {column} to '{value}'"),
            Self::CopyField { from, to } => write!(f, "copy {from} into {to}"),
            Self::ReplaceText { columns, from, to } => {
                write!(f, "replace '{from}' with '{to}' in {}", columns.join(", "))
            }
            Self::CopyCoordinatesFrom { years } if years.is_empty() => {
                write!(f, "copy coordinates from other rows of the point")
            }
            Self::CopyCoordinatesFrom { years } => {
                let years: Vec<String> = years.iter().map(|y| y.to_string()).collect();
                write!(f, "copy coordinates from {}", years.join(", "))
            }
            Self::Delete => write!(f, "delete"),
        }
    }
}

// ---------------------------------------------------------------------------
// Parse + Validate
// ---------------------------------------------------------------------------

impl ReconConfig {
    pub fn from_toml(input: &str) -> Result<Self, ReconError> {
        let config: ReconConfig =
            toml::from_str(input).map_err(|e| ReconError::ConfigParse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ReconError> {
        let threshold = self.cleaning.distance_threshold_m;
        if !threshold.is_finite() || threshold < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "cleaning.distance_threshold_m must be a non-negative number, got {threshold}"
            )));
        }

        if self.cleaning.coordinate_decimals > 12 {
            return Err(ReconError::ConfigValidation(format!(
                "cleaning.coordinate_decimals must be at most 12, got {}",
                self.cleaning.coordinate_decimals
            )));
        }

        if self.neighbors.k == 0 {
            return Err(ReconError::ConfigValidation(
                "neighbors.k must be at least 1".into(),
            ));
        }

        if self.neighbors.slots == 0 {
            return Err(ReconError::ConfigValidation(
                "neighbors.slots must be at least 1".into(),
            ));
        }

        let tol = self.neighbors.self_tolerance_deg;
        if !tol.is_finite() || tol < 0.0 {
            return Err(ReconError::ConfigValidation(format!(
                "neighbors.self_tolerance_deg must be a non-negative number, got {tol}"
            )));
        }

        let precision = self.conflicts.coordinate_precision;
        if !precision.is_finite() || precision <= 0.0 || precision > 1.0 {
            return Err(ReconError::ConfigValidation(format!(
                "conflicts.coordinate_precision must be in (0, 1], got {precision}"
            )));
        }
        if self.conflicts.decimals() > 12 {
            return Err(ReconError::ConfigValidation(format!(
                "conflicts.coordinate_precision {precision} implies more than 12 decimals"
            )));
        }

        for (i, rule) in self.corrections.iter().enumerate() {
            let n = i + 1;
            if rule.description.trim().is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "correction rule #{n}: description is empty"
                )));
            }
            if rule.actions.is_empty() {
                return Err(ReconError::ConfigValidation(format!(
                    "correction rule #{n} '{}': no actions",
                    rule.description
                )));
            }
            if let Some(near) = &rule.when.near {
                if !near.tolerance.is_finite() || near.tolerance <= 0.0 {
                    return Err(ReconError::ConfigValidation(format!(
                        "correction rule #{n}: near.tolerance must be positive"
                    )));
                }
            }
            for action in &rule.actions {
                match action {
                    CorrectionAction::Recoordinate { lat, lon } => {
                        if !(-90.0..=90.0).contains(lat) || !(-180.0..=180.0).contains(lon) {
                            return Err(ReconError::ConfigValidation(format!(
                                "correction rule #{n}: coordinate {lat},{lon} is out of range"
                            )));
                        }
                    }
                    CorrectionAction::CopyField { from, to } if from == to => {
                        return Err(ReconError::ConfigValidation(format!(
                            "correction rule #{n}: copy_field from and to are both '{from}'"
                        )));
                    }
                    CorrectionAction::ReplaceText { columns, from, .. } => {
                        if columns.is_empty() {
                            return Err(ReconError::ConfigValidation(format!(
                                "correction rule #{n}: replace_text needs at least one column"
                            )));
                        }
                        if from.is_empty() {
                            return Err(ReconError::ConfigValidation(format!(
                                "correction rule #{n}: replace_text 'from' is empty"
                            )));
                        }
                    }
                    _ => {}
                }
            }
        }

        // A group is one contiguous run of rules.
        let mut closed: Vec<&str> = Vec::new();
        let mut current: Option<&str> = None;
        for (i, rule) in self.corrections.iter().enumerate() {
            let group = rule.group.as_deref();
            if group == current {
                continue;
            }
            if let Some(prev) = current {
                closed.push(prev);
            }
            if let Some(g) = group {
                if closed.contains(&g) {
                    return Err(ReconError::ConfigValidation(format!(
                        "correction rule #{}: group '{g}' must be contiguous",
                        i + 1
                    )));
                }
            }
            current = group;
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
name = "Maquis monitoring"

[cleaning]
distance_threshold_m = 50
coordinate_decimals = 5

[neighbors]
k = 4
self_tolerance_deg = 0.00002
slots = 2

[conflicts]
coordinate_precision = 0.001
cross_scope = "fail"

[[corrections]]
description = "Ofer Far 5 was recorded under the wrong name in 2012"
when = { site = "Ofer", point_name = "Ofer Far 5", years = [2012] }

[[corrections.actions]]
kind = "rename"
point_name = "Ofer Far 6"

[[corrections.actions]]
kind = "retime"
time = "08:30"
"#;

    #[test]
    fn parse_full() {
        let config = ReconConfig::from_toml(FULL).unwrap();
        assert_eq!(config.name.as_deref(), Some("Maquis monitoring"));
        assert_eq!(config.cleaning.distance_threshold_m, 50.0);
        assert_eq!(config.cleaning.coordinate_decimals, 5);
        assert_eq!(config.neighbors.k, 4);
        assert_eq!(config.neighbors.slots, 2);
        assert_eq!(config.conflicts.decimals(), 3);
        assert_eq!(config.conflicts.cross_scope, CrossScopePolicy::Fail);

        let rule = &config.corrections[0];
        assert_eq!(rule.when.point_name.as_deref(), Some("Ofer Far 5"));
        assert_eq!(rule.when.years.as_deref(), Some(&[2012][..]));
        assert_eq!(
            rule.actions,
            vec![
                CorrectionAction::Rename { point_name: "Ofer Far 6".into() },
                CorrectionAction::Retime { time: "08:30".into() },
            ]
        );
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = ReconConfig::from_toml("").unwrap();
        assert_eq!(config.cleaning.distance_threshold_m, 100.0);
        assert_eq!(config.cleaning.coordinate_decimals, 6);
        assert_eq!(config.neighbors.k, 10);
        assert_eq!(config.neighbors.self_tolerance_deg, 1e-5);
        assert_eq!(config.neighbors.slots, 3);
        assert_eq!(config.conflicts.decimals(), 4);
        assert_eq!(config.conflicts.cross_scope, CrossScopePolicy::Report);
        assert!(config.corrections.is_empty());
    }

    #[test]
    fn parse_near_and_delete() {
        let input = r#"
[[corrections]]
description = "duplicate test row"
when = { near = { lat = 31.5, lon = 35.1 }, fields = { observer = "test" } }
actions = [{ kind = "delete" }]
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        let near = config.corrections[0].when.near.as_ref().unwrap();
        assert_eq!(near.tolerance, 1e-4);
        assert_eq!(config.corrections[0].when.fields["observer"], "test");
        assert_eq!(config.corrections[0].actions, vec![CorrectionAction::Delete]);
    }

    #[test]
    fn reject_unknown_action_kind() {
        let input = r#"
[[corrections]]
description = "bad"
actions = [{ kind = "teleport" }]
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_typo_in_section() {
        let err = ReconConfig::from_toml("[cleaning]\ndistance_treshold_m = 5\n").unwrap_err();
        assert!(matches!(err, ReconError::ConfigParse(_)));
    }

    #[test]
    fn reject_negative_threshold() {
        let err = ReconConfig::from_toml("[cleaning]\ndistance_threshold_m = -1\n").unwrap_err();
        assert!(err.to_string().contains("distance_threshold_m"));
    }

    #[test]
    fn reject_zero_precision() {
        let err = ReconConfig::from_toml("[conflicts]\ncoordinate_precision = 0.0\n").unwrap_err();
        assert!(err.to_string().contains("coordinate_precision"));
    }

    #[test]
    fn reject_rule_without_actions() {
        let input = r#"
[[corrections]]
description = "nothing to do"
actions = []
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("no actions"));
    }

    #[test]
    fn decimals_truncate() {
        let with = |p: f64| ConflictConfig { coordinate_precision: p, ..ConflictConfig::default() }.decimals();
        assert_eq!(with(1e-4), 4);
        assert_eq!(with(1e-3), 3);
        assert_eq!(with(3e-4), 3);
        assert_eq!(with(0.05), 1);
        assert_eq!(with(1.0), 0);
    }

    #[test]
    fn parse_copy_and_replace_actions() {
        let input = r#"
[[corrections]]
description = "harsh weather logged as a disturbance"
when = { fields = { disturbances = "harsh_weather" } }
actions = [
  { kind = "copy_field", from = "comment_disturbances", to = "comment_weather" },
  { kind = "set_field", column = "disturbances", value = "" },
]

[[corrections]]
description = "Ein Yaacov spelling"
actions = [{ kind = "replace_text", columns = ["site", "point_name"], from = "Ein Yaacov", to = "Ein Yaakov" }]

[[corrections]]
description = "2017 Abirim coordinates"
when = { point_name = "Abirim Far 1", years = [2017] }
actions = [{ kind = "copy_coordinates_from" }]
"#;
        let config = ReconConfig::from_toml(input).unwrap();
        assert_eq!(
            config.corrections[0].actions[0],
            CorrectionAction::CopyField { from: "comment_disturbances".into(), to: "comment_weather".into() }
        );
        assert_eq!(
            config.corrections[1].actions[0].to_string(),
            "replace 'Ein Yaacov' with 'Ein Yaakov' in site, point_name"
        );
        assert_eq!(config.corrections[2].actions[0], CorrectionAction::CopyCoordinatesFrom { years: vec![] });
    }

    #[test]
    fn reject_empty_replace() {
        let input = r#"
[[corrections]]
description = "nothing to find"
actions = [{ kind = "replace_text", columns = ["site"], from = "", to = "x" }]
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("'from' is empty"));
    }

    #[test]
    fn reject_split_group() {
        let input = r#"
[[corrections]]
description = "a"
group = "swap"
actions = [{ kind = "rename", point_name = "B" }]

[[corrections]]
description = "b"
actions = [{ kind = "rename", point_name = "C" }]

[[corrections]]
description = "c"
group = "swap"
actions = [{ kind = "rename", point_name = "A" }]
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("rule #3: group 'swap' must be contiguous"));
    }

    #[test]
    fn reject_out_of_range_recoordinate() {
        let input = r#"
[[corrections]]
description = "swapped axes"
actions = [{ kind = "recoordinate", lat = 135.0, lon = 31.0 }]
"#;
        let err = ReconConfig::from_toml(input).unwrap_err();
        assert!(err.to_string().contains("out of range"));
    }
}
