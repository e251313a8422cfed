//! R-tree indexed trackpoints for map pointer lookups.

use rstar::primitives::GeomWithData;
use rstar::{PointDistance, RTree};

use crate::GeoPoint;

/// `[lat, lng]` position tagged with its index in the track.
pub type IndexedPoint = GeomWithData<[f64; 2], usize>;

/// Bulk-load the trackpoint positions of a track.
pub fn build_rtree(points: &[GeoPoint]) -> RTree<IndexedPoint> {
    RTree::bulk_load(
        points
            .iter()
            .enumerate()
            .map(|(i, p)| IndexedPoint::new([p.latitude, p.longitude], i))
            .collect(),
    )
}

/// Index of the trackpoint nearest to (lat, lng) by squared planar distance.
///
/// Equidistant candidates resolve to the lowest track index.
pub fn nearest_index(tree: &RTree<IndexedPoint>, lat: f64, lng: f64) -> Option<usize> {
    let query = [lat, lng];
    let mut candidates = tree.nearest_neighbor_iter(&query);
    let first = candidates.next()?;
    let best_dist = first.distance_2(&query);

    let tied_min = candidates
        .take_while(|p| p.distance_2(&query) <= best_dist)
        .map(|p| p.data)
        .min()
        .unwrap_or(first.data);

    Some(tied_min.min(first.data))
}
