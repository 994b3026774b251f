use std::{fmt, sync::Arc};

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

use crate::{
    frame::{Frame, Grid},
    geom::Vec2F,
};

pub type SharedRoi = Arc<dyn Roi>;

/// A region of interest in a frame's coordinate domain.
///
/// Implementors only decide membership of single points; rasterizing onto a
/// grid and extracting samples come for free.
pub trait Roi: Send + Sync + fmt::Debug {
    /// Whether the coordinate `(x, y)` lies inside the region.
    fn contains(&self, x: f32, y: f32) -> bool;

    /// Membership of every node of `grid`.
    fn mask(&self, grid: &Grid) -> Array2<bool> {
        Array2::from_shape_fn(grid.shape(), |(r, c)| {
            let p = grid.position(r, c);
            self.contains(p.x, p.y)
        })
    }

    /// Values of `frame` inside the region, in row-major order.
    fn samples(&self, frame: &Frame) -> Vec<f32> {
        masked_samples(frame, &self.mask(frame.grid()))
    }
}

/// Values of `frame` where `mask` is set. `mask` must match the frame's shape.
pub fn masked_samples(frame: &Frame, mask: &Array2<bool>) -> Vec<f32> {
    let mut samples = Vec::new();
    Zip::from(frame.values())
        .and(mask)
        .for_each(|&value, &inside| {
            if inside {
                samples.push(value);
            }
        });
    samples
}

/// Axis-aligned rectangle, borders included.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RectangleRoi {
    min: Vec2F,
    max: Vec2F,
}

impl RectangleRoi {
    /// Rectangle spanned by two opposite corners, in any order.
    pub fn new(a: Vec2F, b: Vec2F) -> Self {
        Self {
            min: Vec2F::new(a.x.min(b.x), a.y.min(b.y)),
            max: Vec2F::new(a.x.max(b.x), a.y.max(b.y)),
        }
    }
}

impl Roi for RectangleRoi {
    fn contains(&self, x: f32, y: f32) -> bool {
        (self.min.x..=self.max.x).contains(&x) && (self.min.y..=self.max.y).contains(&y)
    }
}

/// Axis-aligned ellipse.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EllipseRoi {
    center: Vec2F,
    radii: Vec2F,
}

impl EllipseRoi {
    pub fn new(center: Vec2F, radii: Vec2F) -> Self {
        Self {
            center,
            radii: Vec2F::new(radii.x.abs(), radii.y.abs()),
        }
    }

    /// The ellipse inscribed into the rectangle spanned by `a` and `b`.
    pub fn inscribed(a: Vec2F, b: Vec2F) -> Self {
        Self::new((a + b) * 0.5, (b - a) * 0.5)
    }
}

impl Roi for EllipseRoi {
    fn contains(&self, x: f32, y: f32) -> bool {
        if self.radii.x <= 0.0 || self.radii.y <= 0.0 {
            return false;
        }
        let dx = (x - self.center.x) / self.radii.x;
        let dy = (y - self.center.y) / self.radii.y;
        dx * dx + dy * dy <= 1.0
    }
}

/// Closed polygon, filled by the even-odd rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolygonRoi {
    vertices: Vec<Vec2F>,
}

impl PolygonRoi {
    pub fn new(vertices: Vec<Vec2F>) -> Self {
        Self { vertices }
    }

    pub fn vertices(&self) -> &[Vec2F] {
        &self.vertices
    }
}

impl Roi for PolygonRoi {
    fn contains(&self, x: f32, y: f32) -> bool {
        if self.vertices.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = self.vertices.len() - 1;
        for (i, a) in self.vertices.iter().enumerate() {
            let b = self.vertices[j];
            if (a.y > y) != (b.y > y) {
                let crossing = a.x + (y - a.y) / (b.y - a.y) * (b.x - a.x);
                if x < crossing {
                    inside = !inside;
                }
            }
            j = i;
        }
        inside
    }
}

/// Points inside any of the parts.
#[derive(Debug, Clone)]
pub struct Union(pub Vec<SharedRoi>);

impl Roi for Union {
    fn contains(&self, x: f32, y: f32) -> bool {
        self.0.iter().any(|roi| roi.contains(x, y))
    }
}

/// Points of `base` that are not inside `cut`.
#[derive(Debug, Clone)]
pub struct Difference {
    pub base: SharedRoi,
    pub cut: SharedRoi,
}

impl Roi for Difference {
    fn contains(&self, x: f32, y: f32) -> bool {
        self.base.contains(x, y) && !self.cut.contains(x, y)
    }
}

/// Every point outside the inner region.
#[derive(Debug, Clone)]
pub struct Complement(pub SharedRoi);

impl Roi for Complement {
    fn contains(&self, x: f32, y: f32) -> bool {
        !self.0.contains(x, y)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::tests::{grid, ramp};

    fn p(x: f32, y: f32) -> Vec2F {
        Vec2F::new(x, y)
    }

    fn count(mask: &Array2<bool>) -> usize {
        mask.iter().filter(|&&inside| inside).count()
    }

    #[test]
    fn rectangle_includes_borders() {
        let roi = RectangleRoi::new(p(3.0, 2.0), p(1.0, 1.0));
        let mask = roi.mask(&grid(5, 5));
        assert_eq!(count(&mask), 6);
        // x is the column, y the row
        assert!(mask[[2, 3]]);
        assert!(!mask[[3, 2]]);
    }

    #[test]
    fn samples_are_row_major() {
        let frame = ramp("f", 4, 4, 0.0);
        let roi = RectangleRoi::new(p(1.0, 1.0), p(2.0, 2.0));
        assert_eq!(roi.samples(&frame), [11.0, 12.0, 21.0, 22.0]);
    }

    #[test]
    fn ellipse() {
        let roi = EllipseRoi::inscribed(p(0.0, 0.0), p(4.0, 4.0));
        assert!(roi.contains(2.0, 2.0));
        assert!(roi.contains(2.0, 0.0));
        assert!(!roi.contains(0.0, 0.0));
        assert_eq!(count(&roi.mask(&grid(5, 5))), 13);

        let flat = EllipseRoi::new(p(1.0, 1.0), p(0.0, 3.0));
        assert!(!flat.contains(1.0, 1.0));
    }

    #[test]
    fn polygon_even_odd() {
        let triangle = PolygonRoi::new(vec![p(0.0, 0.0), p(4.0, 0.0), p(0.0, 4.0)]);
        assert!(triangle.contains(1.0, 1.0));
        assert!(!triangle.contains(3.0, 3.0));
        assert!(!triangle.contains(-1.0, 1.0));

        // fewer than three vertices enclose nothing
        let line = PolygonRoi::new(vec![p(0.0, 0.0), p(1.0, 1.0)]);
        assert!(!line.contains(0.5, 0.5));
    }

    #[test]
    fn composition() {
        let outer: SharedRoi = Arc::new(RectangleRoi::new(p(0.0, 0.0), p(4.0, 4.0)));
        let inner: SharedRoi = Arc::new(RectangleRoi::new(p(1.0, 1.0), p(3.0, 3.0)));
        let far: SharedRoi = Arc::new(RectangleRoi::new(p(10.0, 10.0), p(11.0, 11.0)));
        let g = grid(12, 12);

        let ring = Difference {
            base: outer.clone(),
            cut: inner.clone(),
        };
        assert_eq!(count(&ring.mask(&g)), 25 - 9);

        let both = Union(vec![inner.clone(), far]);
        assert_eq!(count(&both.mask(&g)), 9 + 4);

        let outside = Complement(outer);
        assert_eq!(count(&outside.mask(&g)), 144 - 25);
        assert!(!outside.contains(2.0, 2.0));
    }

    #[test]
    fn empty_intersection_yields_no_samples() {
        let roi = RectangleRoi::new(p(20.0, 20.0), p(30.0, 30.0));
        assert!(roi.samples(&ramp("f", 3, 3, 0.0)).is_empty());
    }
}
