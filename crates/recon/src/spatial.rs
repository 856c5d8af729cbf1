//! Nearest-neighbor index over point-coordinate combinations.
//!
//! Coordinates are embedded on the unit sphere so that Euclidean chord length
//! orders candidates exactly like great-circle distance.

use rstar::{PointDistance, RTree, RTreeObject, AABB};

use crate::distance::haversine_distance;
use crate::model::{Coordinate, PointCombination};

#[derive(Debug, Clone, Copy)]
struct IndexedCombination {
    idx: usize,
    xyz: [f64; 3],
}

impl RTreeObject for IndexedCombination {
    type Envelope = AABB<[f64; 3]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_point(self.xyz)
    }
}

impl PointDistance for IndexedCombination {
    fn distance_2(&self, point: &[f64; 3]) -> f64 {
        let dx = self.xyz[0] - point[0];
        let dy = self.xyz[1] - point[1];
        let dz = self.xyz[2] - point[2];
        dx * dx + dy * dy + dz * dz
    }
}

fn unit_vector(c: Coordinate) -> [f64; 3] {
    let lat = c.lat.to_radians();
    let lon = c.lon.to_radians();
    [lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin()]
}

/// A candidate returned by [`SpatialIndex::nearest`].
#[derive(Debug, Clone, Copy)]
pub struct Neighbor<'a> {
    /// Position of the combination in the corpus.
    pub index: usize,
    pub combination: &'a PointCombination,
    /// Great-circle distance in meters.
    pub distance_m: f64,
}

pub struct SpatialIndex {
    tree: RTree<IndexedCombination>,
    corpus: Vec<PointCombination>,
}

impl SpatialIndex {
    /// Build once over the corpus. Combinations with unusable coordinates are
    /// kept in the corpus but never returned.
    pub fn build(corpus: Vec<PointCombination>) -> Self {
        let entries: Vec<IndexedCombination> = corpus
            .iter()
            .enumerate()
            .filter(|(_, c)| c.coordinate.is_valid())
            .map(|(idx, c)| IndexedCombination { idx, xyz: unit_vector(c.coordinate) })
            .collect();
        Self { tree: RTree::bulk_load(entries), corpus }
    }

    /// Number of searchable combinations.
    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn corpus(&self) -> &[PointCombination] {
        &self.corpus
    }

    /// Up to `k` nearest combinations, closest first. Equal distances keep
    /// corpus (first-seen) order.
    pub fn nearest(&self, query: Coordinate, k: usize) -> Vec<Neighbor<'_>> {
        if !query.is_valid() || k == 0 {
            return Vec::new();
        }
        let q = unit_vector(query);
        let mut found: Vec<Neighbor<'_>> = self
            .tree
            .nearest_neighbor_iter(&q)
            .take(k.min(self.len()))
            .map(|entry| {
                let combination = &self.corpus[entry.idx];
                Neighbor {
                    index: entry.idx,
                    combination,
                    distance_m: haversine_distance(query, combination.coordinate),
                }
            })
            .collect();
        found.sort_by(|a, b| a.distance_m.total_cmp(&b.distance_m).then(a.index.cmp(&b.index)));
        found
    }
}
