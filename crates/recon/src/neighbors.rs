use crate::cleaning::{FlaggedGroup, NeighborSuggestion};
use crate::config::NeighborConfig;
use crate::model::{Coordinate, IdentityKey};
use crate::reporter::Reporter;
use crate::spatial::SpatialIndex;

/// Closest combination that is not the query itself.
///
/// A candidate is the query only when it has the same identity key AND a
/// coordinate within `self_tolerance_deg` on both axes. Another coordinate
/// of the same key is a valid suggestion.
pub fn find_neighbor(
    index: &SpatialIndex,
    key: &IdentityKey,
    coordinate: Coordinate,
    config: &NeighborConfig,
) -> Option<NeighborSuggestion> {
    index
        .nearest(coordinate, config.k)
        .into_iter()
        .find(|n| {
            !(n.combination.key == *key
                && n.combination.coordinate.within(&coordinate, config.self_tolerance_deg))
        })
        .map(|n| NeighborSuggestion {
            key: n.combination.key.clone(),
            coordinate: n.combination.coordinate,
            distance_m: (n.distance_m * 10.0).round() / 10.0,
            years: n.combination.years.clone(),
        })
}

/// Fill `nearest` on every coordinate of every flagged group.
pub fn attach_suggestions(
    flagged: &mut [FlaggedGroup],
    index: &SpatialIndex,
    config: &NeighborConfig,
    reporter: &mut dyn Reporter,
) {
    let mut suggested = 0usize;
    for group in flagged.iter_mut() {
        for slot in group.coordinates.iter_mut() {
            slot.nearest = find_neighbor(index, &group.key, slot.coordinate, config);
            match &slot.nearest {
                Some(n) => {
                    suggested += 1;
                    reporter.debug(&format!(
                        "{} at {}: nearest is {} ({:.1} m)",
                        group.key, slot.coordinate, n.key, n.distance_m
                    ));
                }
                None => reporter.debug(&format!(
                    "{} at {}: no neighbor found",
                    group.key, slot.coordinate
                )),
            }
        }
    }
    if !flagged.is_empty() {
        reporter.info(&format!(
            "neighbor suggestions for {suggested} flagged coordinates across {} groups",
            flagged.len()
        ));
    }
}
