//! Bounded visualization space for projected coordinates
//!
//! Raw reducer output lives in an arbitrary frame. Normalization recenters
//! the batch on its bounding-box midpoint and applies one uniform scale so
//! the longest axis spans exactly `2 * scale`.

use serde::{Deserialize, Serialize};

use crate::types::{Coords, VectorId};

/// Axis-aligned bounding box of a coordinate batch
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min: Coords,
    pub max: Coords,
}

impl BoundingBox {
    /// `None` for an empty batch.
    pub fn of<'a, I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = &'a Coords>,
    {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bbox = Self {
            min: first,
            max: first,
        };
        for p in iter {
            for axis in 0..3 {
                bbox.min[axis] = bbox.min[axis].min(p[axis]);
                bbox.max[axis] = bbox.max[axis].max(p[axis]);
            }
        }
        Some(bbox)
    }

    pub fn midpoint(&self) -> [f64; 3] {
        std::array::from_fn(|axis| (self.min[axis] as f64 + self.max[axis] as f64) / 2.0)
    }

    /// Extent of the longest axis
    pub fn longest_extent(&self) -> f64 {
        (0..3)
            .map(|axis| self.max[axis] as f64 - self.min[axis] as f64)
            .fold(0.0, f64::max)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProjectionNormalizer {
    scale: f32,
}

impl ProjectionNormalizer {
    pub fn new(scale: f32) -> Self {
        Self { scale }
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Normalize a batch in place.
    ///
    /// Coincident points all end up at the origin; there is no extent to
    /// scale by.
    pub fn normalize_points(&self, points: &mut [Coords]) {
        let Some(bbox) = BoundingBox::of(points.iter()) else {
            return;
        };
        let mid = bbox.midpoint();
        let range = bbox.longest_extent();
        let scale = self.scale as f64;
        let factor = if range > 0.0 { 2.0 * scale / range } else { 1.0 };

        for p in points.iter_mut() {
            for axis in 0..3 {
                let v = (p[axis] as f64 - mid[axis]) * factor;
                // Guards against rounding past the cube boundary
                p[axis] = v.clamp(-scale, scale) as f32;
            }
        }
    }

    /// Normalize an identifier-keyed batch, preserving order.
    pub fn normalize(&self, coords: Vec<(VectorId, Coords)>) -> Vec<(VectorId, Coords)> {
        let (ids, mut points): (Vec<_>, Vec<_>) = coords.into_iter().unzip();
        self.normalize_points(&mut points);
        ids.into_iter().zip(points).collect()
    }
}

/// One projected point in the coordinate document
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CoordinatePoint {
    pub id: VectorId,
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Projection kind tag plus every projected point.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CoordinateDocument {
    pub projection: String,
    pub points: Vec<CoordinatePoint>,
}

impl CoordinateDocument {
    pub fn new<I>(projection: impl Into<String>, points: I) -> Self
    where
        I: IntoIterator<Item = (VectorId, Coords)>,
    {
        Self {
            projection: projection.into(),
            points: points
                .into_iter()
                .map(|(id, [x, y, z])| CoordinatePoint { id, x, y, z })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    #[test]
    fn test_square_maps_to_corners() {
        let normalizer = ProjectionNormalizer::new(10.0);
        let mut points = [
            [0.0, 0.0, 5.0],
            [2.0, 0.0, 5.0],
            [0.0, 2.0, 5.0],
            [2.0, 2.0, 5.0],
        ];
        normalizer.normalize_points(&mut points);
        assert_eq!(
            points,
            [
                [-10.0, -10.0, 0.0],
                [10.0, -10.0, 0.0],
                [-10.0, 10.0, 0.0],
                [10.0, 10.0, 0.0],
            ]
        );
    }

    #[test]
    fn test_coincident_points_go_to_origin() {
        let normalizer = ProjectionNormalizer::new(10.0);
        let mut points = [[3.5, -1.0, 2.0]; 4];
        normalizer.normalize_points(&mut points);
        assert!(points.iter().all(|p| *p == [0.0, 0.0, 0.0]));
    }

    #[test]
    fn test_empty_batch() {
        let normalizer = ProjectionNormalizer::new(10.0);
        assert!(normalizer.normalize(Vec::new()).is_empty());
    }

    #[test]
    fn test_bounds_hold_for_random_batches() {
        let mut rng = StdRng::seed_from_u64(42);
        let normalizer = ProjectionNormalizer::new(7.5);

        for _ in 0..50 {
            let n = rng.gen_range(2..40);
            let mut points: Vec<Coords> = (0..n)
                .map(|_| {
                    [
                        rng.gen_range(-100.0..100.0),
                        rng.gen_range(-3.0..3.0),
                        rng.gen_range(0.0..1000.0),
                    ]
                })
                .collect();
            normalizer.normalize_points(&mut points);

            let bbox = BoundingBox::of(points.iter()).unwrap();
            for axis in 0..3 {
                assert!(bbox.min[axis] >= -7.5 && bbox.max[axis] <= 7.5);
            }
            assert!((bbox.longest_extent() - 15.0).abs() < 1e-3);
        }
    }

    #[test]
    fn test_uniform_scale_preserves_aspect() {
        let normalizer = ProjectionNormalizer::new(1.0);
        let mut points = [[0.0, 0.0, 0.0], [4.0, 1.0, 0.0]];
        normalizer.normalize_points(&mut points);
        // x spans the full cube, y keeps its 1:4 proportion
        assert_eq!(points[0], [-1.0, -0.25, 0.0]);
        assert_eq!(points[1], [1.0, 0.25, 0.0]);
    }

    #[test]
    fn test_normalize_keeps_identifier_order() {
        let ids: Vec<VectorId> = (0..3).map(|_| VectorId::new()).collect();
        let input = vec![
            (ids[0], [0.0, 0.0, 0.0]),
            (ids[1], [1.0, 0.0, 0.0]),
            (ids[2], [2.0, 0.0, 0.0]),
        ];
        let output = ProjectionNormalizer::new(10.0).normalize(input);
        let order: Vec<_> = output.iter().map(|(id, _)| *id).collect();
        assert_eq!(order, ids);
        assert_eq!(output[1].1, [0.0, 0.0, 0.0]);
    }

    #[test]
    fn test_coordinate_document_layout() {
        let id = VectorId::new();
        let doc = CoordinateDocument::new("umap-3d-cosine", [(id, [1.0, 2.0, 3.0])]);
        let json = serde_json::to_value(&doc).unwrap();
        assert_eq!(json["projection"], "umap-3d-cosine");
        assert_eq!(json["points"][0]["id"], id.to_string());
        assert_eq!(json["points"][0]["z"], 3.0);
    }
}
