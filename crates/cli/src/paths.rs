//! Default output locations, derived from the input file name.

use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    /// Discrepancy-resolved table.
    pub cleaned_coordinates: PathBuf,
    pub flagged: PathBuf,
    pub cleaning_log: PathBuf,
    /// Name-canonicalized table.
    pub cleaned: PathBuf,
    pub conflicts: PathBuf,
    pub corrections_log: PathBuf,
}

fn sibling(input: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    input.with_file_name(format!("{stem}{suffix}"))
}

impl OutputPaths {
    pub fn from_input(input: &Path) -> Self {
        Self {
            cleaned_coordinates: sibling(input, "_cleaned_mult_coord.csv"),
            flagged: sibling(input, "_flagged_coordinates.csv"),
            cleaning_log: sibling(input, "_coordinate_cleaning.md"),
            cleaned: sibling(input, "_cleaned.csv"),
            conflicts: sibling(input, "_coordinate_conflicts.csv"),
            corrections_log: sibling(input, "_cleaned.md"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_follow_input_stem() {
        let paths = OutputPaths::from_input(Path::new("data/monitoring.csv"));
        assert_eq!(paths.cleaned_coordinates, PathBuf::from("data/monitoring_cleaned_mult_coord.csv"));
        assert_eq!(paths.flagged, PathBuf::from("data/monitoring_flagged_coordinates.csv"));
        assert_eq!(paths.cleaning_log, PathBuf::from("data/monitoring_coordinate_cleaning.md"));
        assert_eq!(paths.cleaned, PathBuf::from("data/monitoring_cleaned.csv"));
        assert_eq!(paths.conflicts, PathBuf::from("data/monitoring_coordinate_conflicts.csv"));
        assert_eq!(paths.corrections_log, PathBuf::from("data/monitoring_cleaned.md"));
    }

    #[test]
    fn bare_file_name() {
        let paths = OutputPaths::from_input(Path::new("obs.csv"));
        assert_eq!(paths.cleaned, PathBuf::from("obs_cleaned.csv"));
    }
}
