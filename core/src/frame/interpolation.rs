use std::{fmt, sync::Arc};

use ndarray::{Array2, ArrayView2};
use serde::{Deserialize, Serialize};

use super::{Frame, Grid};

/// Shared handle to an interpolation method.
pub type Interpolator = Arc<dyn Interpolation2D>;

/// Derives values of a frame at positions that are not on its grid.
///
/// Implementors only need [`Interpolation2D::sample_index`]. Positions
/// outside the frame are clamped onto its border.
pub trait Interpolation2D: Send + Sync + fmt::Debug {
    /// Value at the continuous index position `(row, column)`.
    fn sample_index(&self, values: ArrayView2<'_, f32>, row: f32, column: f32) -> f32;

    /// Value at the coordinate `(x, y)`, `x` along the column axis and `y`
    /// along the row axis.
    fn sample(&self, frame: &Frame, x: f32, y: f32) -> f32 {
        let grid = frame.grid();
        self.sample_index(
            frame.values().view(),
            grid.rows().fractional_index(y),
            grid.columns().fractional_index(x),
        )
    }

    /// Values of `frame` on every node of `target`.
    fn regrid(&self, frame: &Frame, target: &Grid) -> Array2<f32> {
        let source = frame.grid();
        let rows: Vec<f32> = target
            .rows()
            .values()
            .map(|y| source.rows().fractional_index(y))
            .collect();
        let columns: Vec<f32> = target
            .columns()
            .values()
            .map(|x| source.columns().fractional_index(x))
            .collect();

        let values = frame.values().view();
        Array2::from_shape_fn(target.shape(), |(r, c)| {
            self.sample_index(values, rows[r], columns[c])
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum InterpolationMethod {
    NearestNeighbour,
    #[default]
    Bilinear,
}

impl InterpolationMethod {
    pub fn interpolator(self) -> Interpolator {
        Arc::new(self)
    }
}

impl From<InterpolationMethod> for Interpolator {
    fn from(method: InterpolationMethod) -> Self {
        method.interpolator()
    }
}

impl Interpolation2D for InterpolationMethod {
    fn sample_index(&self, values: ArrayView2<'_, f32>, row: f32, column: f32) -> f32 {
        let (rows, columns) = values.dim();
        if rows == 0 || columns == 0 {
            return f32::NAN;
        }
        let row = clamp_index(row, rows);
        let column = clamp_index(column, columns);

        match self {
            InterpolationMethod::NearestNeighbour => {
                values[[row.round() as usize, column.round() as usize]]
            }
            InterpolationMethod::Bilinear => {
                let r0 = row.floor() as usize;
                let c0 = column.floor() as usize;
                let r1 = (r0 + 1).min(rows - 1);
                let c1 = (c0 + 1).min(columns - 1);
                let dr = row - r0 as f32;
                let dc = column - c0 as f32;

                let top = blend(values[[r0, c0]], values[[r0, c1]], dc);
                if dr == 0.0 {
                    return top;
                }
                let bottom = blend(values[[r1, c0]], values[[r1, c1]], dc);
                blend(top, bottom, dr)
            }
        }
    }
}

/// Linear blend of `a` and `b`. A zero weight leaves `a` untouched, so a NaN
/// in `b` cannot leak into samples taken exactly on a node.
fn blend(a: f32, b: f32, t: f32) -> f32 {
    if t == 0.0 {
        a
    } else {
        a * (1.0 - t) + b * t
    }
}

fn clamp_index(index: f32, len: usize) -> f32 {
    if index.is_nan() {
        return 0.0;
    }
    index.clamp(0.0, (len - 1) as f32)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    #[test]
    fn nearest_with_clamping() {
        let values = array![[0.0, 1.0, 2.0], [10.0, 11.0, 12.0], [20.0, 21.0, 22.0]];
        let m = InterpolationMethod::NearestNeighbour;
        assert_eq!(m.sample_index(values.view(), 1.6, 1.2), 21.0);
        assert_eq!(m.sample_index(values.view(), 1.0, -2.0), 10.0);
        assert_eq!(m.sample_index(values.view(), 9.0, 9.0), 22.0);
    }

    #[test]
    fn bilinear_center_and_border() {
        let values = array![[0.0, 10.0], [20.0, 30.0]];
        let m = InterpolationMethod::Bilinear;
        assert!((m.sample_index(values.view(), 0.5, 0.5) - 15.0).abs() < 1e-6);
        assert!((m.sample_index(values.view(), -0.25, -0.25) - 0.0).abs() < 1e-6);
        assert!((m.sample_index(values.view(), 1.0, 1.0) - 30.0).abs() < 1e-6);
        assert!((m.sample_index(values.view(), 0.0, 0.25) - 2.5).abs() < 1e-6);
    }

    #[test]
    fn missing_neighbours_do_not_leak_onto_nodes() {
        let values = array![[1.0, f32::NAN], [f32::NAN, f32::NAN]];
        let m = InterpolationMethod::Bilinear;
        assert_eq!(m.sample_index(values.view(), 0.0, 0.0), 1.0);

        let values = array![[1.0, 3.0], [f32::NAN, f32::NAN]];
        assert!((m.sample_index(values.view(), 0.0, 0.5) - 2.0).abs() < 1e-6);
        assert!(m.sample_index(values.view(), 0.5, 0.5).is_nan());
    }

    #[test]
    fn single_row() {
        let values = array![[1.0, 3.0]];
        let m = InterpolationMethod::Bilinear;
        assert!((m.sample_index(values.view(), 0.7, 0.5) - 2.0).abs() < 1e-6);
    }
}
