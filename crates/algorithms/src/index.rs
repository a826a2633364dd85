//! Spatial Index
//!
//! R*-tree over the metric envelopes of a feature set. Built once with a
//! bulk load, then shared read-only by the query phase. Entries carry the
//! position of their feature in the prepared slice.

use rstar::primitives::{GeomWithData, Rectangle};
use rstar::{RTree, AABB};

use crate::prepare::PreparedFeature;
use gapsnap_core::BoundingBox;

type Entry = GeomWithData<Rectangle<[f64; 2]>, usize>;

fn rectangle(b: &BoundingBox) -> Rectangle<[f64; 2]> {
    Rectangle::from_corners([b.min_x, b.min_y], [b.max_x, b.max_y])
}

/// Bounding-box index answering "who could be within `r` of this box"
pub struct SpatialIndex {
    tree: RTree<Entry>,
}

impl SpatialIndex {
    /// Build from envelopes; entry `i` refers to the `i`-th box.
    pub fn build<I>(boxes: I) -> Self
    where
        I: IntoIterator<Item = BoundingBox>,
    {
        let entries: Vec<Entry> = boxes
            .into_iter()
            .enumerate()
            .map(|(i, b)| GeomWithData::new(rectangle(&b), i))
            .collect();
        Self {
            tree: RTree::bulk_load(entries),
        }
    }

    pub fn from_features(features: &[PreparedFeature]) -> Self {
        Self::build(features.iter().map(|f| f.bbox))
    }

    pub fn len(&self) -> usize {
        self.tree.size()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.size() == 0
    }

    /// Entries whose box intersects `bbox` grown by `radius`, ascending.
    pub fn candidates(&self, bbox: &BoundingBox, radius: f64) -> Vec<usize> {
        let query = bbox.expand(radius);
        let envelope = AABB::from_corners([query.min_x, query.min_y], [query.max_x, query.max_y]);
        let mut hits: Vec<usize> = self
            .tree
            .locate_in_envelope_intersecting(&envelope)
            .map(|e| e.data)
            .collect();
        hits.sort_unstable();
        hits
    }

    /// Entries whose box lies within `radius` of a point (box test only).
    pub fn candidates_near(&self, x: f64, y: f64, radius: f64) -> Vec<usize> {
        self.candidates(&BoundingBox::new(x, y, x, y), radius)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(n: usize, spacing: f64) -> Vec<BoundingBox> {
        let mut boxes = Vec::new();
        for i in 0..n {
            for j in 0..n {
                let x = i as f64 * spacing;
                let y = j as f64 * spacing;
                boxes.push(BoundingBox::new(x, y, x + 1.0, y + 1.0));
            }
        }
        boxes
    }

    #[test]
    fn test_candidates_match_brute_force() {
        let boxes = grid(20, 10.0);
        let index = SpatialIndex::build(boxes.clone());
        assert_eq!(index.len(), 400);

        let query = BoundingBox::new(45.0, 45.0, 46.0, 46.0);
        for r in [0.0, 4.0, 9.5, 25.0] {
            let expected: Vec<usize> = boxes
                .iter()
                .enumerate()
                .filter(|(_, b)| b.intersects(&query.expand(r)))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(index.candidates(&query, r), expected, "radius {r}");
        }
    }

    #[test]
    fn test_point_query() {
        let index = SpatialIndex::build(grid(3, 10.0));
        assert!(index.candidates_near(5.0, 5.0, 1.0).is_empty());
        assert_eq!(index.candidates_near(5.0, 5.0, 4.0), vec![0]);
    }

    #[test]
    fn test_empty_index() {
        let index = SpatialIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.candidates_near(0.0, 0.0, 100.0).is_empty());
    }
}
