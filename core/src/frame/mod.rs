pub mod interpolation;

use std::mem::size_of;

use get_size::GetSize;
use ndarray::{Array2, ArrayView1, Axis as ArrayAxis, ErrorKind, ShapeError};
use serde::{Deserialize, Serialize};

use crate::{
    common::{axis::Axis, quantity::Quantity, range::RangeIncl},
    error::{Error, Result},
    geom::Vec2F,
};

use self::interpolation::Interpolation2D;

/// The coordinate grid of a frame: rows run along `y`, columns along `x`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, GetSize)]
pub struct Grid {
    rows: Axis,
    columns: Axis,
}

impl Grid {
    pub fn new(rows: Axis, columns: Axis) -> Self {
        Self { rows, columns }
    }

    pub fn rows(&self) -> &Axis {
        &self.rows
    }

    pub fn columns(&self) -> &Axis {
        &self.columns
    }

    /// `(row count, column count)`
    pub fn shape(&self) -> (usize, usize) {
        (self.rows.count(), self.columns.count())
    }

    /// Same bounds, sampled with `rows × columns` nodes.
    pub fn resized(&self, rows: usize, columns: usize) -> Result<Self> {
        Ok(Self::new(self.rows.resized(rows)?, self.columns.resized(columns)?))
    }

    /// Same node count and spacing along both axes.
    pub fn is_compatible(&self, other: &Grid) -> bool {
        self.rows.is_compatible(&other.rows) && self.columns.is_compatible(&other.columns)
    }

    /// Coordinate of the node at `(row, column)`.
    pub(crate) fn position(&self, row: usize, column: usize) -> Vec2F {
        Vec2F::new(self.columns.at(column), self.rows.at(row))
    }
}

/// A single 2D scalar field sampled on a [`Grid`].
///
/// Frames are never mutated once built; every transformation returns a new frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FrameRepr")]
pub struct Frame {
    id: String,
    grid: Grid,
    values: Array2<f32>,
    quantity: Quantity,
}

impl Frame {
    pub fn new(
        id: impl Into<String>,
        grid: Grid,
        values: Array2<f32>,
        quantity: Quantity,
    ) -> Result<Self> {
        if values.dim() != grid.shape() {
            return Err(Error::Shape(ShapeError::from_kind(
                ErrorKind::IncompatibleShape,
            )));
        }
        Ok(Self {
            id: id.into(),
            grid,
            values,
            quantity,
        })
    }

    /// Row-major `values`.
    pub fn from_vec(
        id: impl Into<String>,
        grid: Grid,
        values: Vec<f32>,
        quantity: Quantity,
    ) -> Result<Self> {
        let values = Array2::from_shape_vec(grid.shape(), values)?;
        Self::new(id, grid, values, quantity)
    }

    pub fn from_fn(
        id: impl Into<String>,
        grid: Grid,
        quantity: Quantity,
        f: impl FnMut((usize, usize)) -> f32,
    ) -> Self {
        let values = Array2::from_shape_fn(grid.shape(), f);
        Self {
            id: id.into(),
            grid,
            values,
            quantity,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    pub fn values(&self) -> &Array2<f32> {
        &self.values
    }

    pub fn quantity(&self) -> &Quantity {
        &self.quantity
    }

    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    pub fn value_at(&self, row: usize, column: usize) -> Result<f32> {
        let (rows, columns) = self.shape();
        if row >= rows {
            return Err(Error::OutOfRange {
                index: row,
                count: rows,
            });
        }
        if column >= columns {
            return Err(Error::OutOfRange {
                index: column,
                count: columns,
            });
        }
        Ok(self.values[[row, column]])
    }

    pub fn row(&self, row: usize) -> Result<ArrayView1<'_, f32>> {
        let rows = self.shape().0;
        if row >= rows {
            return Err(Error::OutOfRange {
                index: row,
                count: rows,
            });
        }
        Ok(self.values.index_axis(ArrayAxis(0), row))
    }

    pub fn column(&self, column: usize) -> Result<ArrayView1<'_, f32>> {
        let columns = self.shape().1;
        if column >= columns {
            return Err(Error::OutOfRange {
                index: column,
                count: columns,
            });
        }
        Ok(self.values.index_axis(ArrayAxis(1), column))
    }

    /// Smallest and largest finite value.
    pub fn value_range(&self) -> Option<RangeIncl<f32>> {
        RangeIncl::from_iter_val(self.values.iter().copied().filter(|v| v.is_finite()))
    }

    pub fn sample(&self, x: f32, y: f32, interpolation: &dyn Interpolation2D) -> f32 {
        interpolation.sample(self, x, y)
    }

    /// Samples the frame at each of `points`, in order.
    pub fn sample_along(&self, points: &[Vec2F], interpolation: &dyn Interpolation2D) -> Vec<f32> {
        points
            .iter()
            .map(|p| interpolation.sample(self, p.x, p.y))
            .collect()
    }

    /// This frame's values on `grid`. Returns a plain copy when the grid is
    /// already the frame's own.
    pub fn regridded(&self, grid: &Grid, interpolation: &dyn Interpolation2D) -> Frame {
        if &self.grid == grid {
            return self.clone();
        }
        Frame {
            id: self.id.clone(),
            grid: grid.clone(),
            values: interpolation.regrid(self, grid),
            quantity: self.quantity.clone(),
        }
    }
}

/// Unchecked wire form of [`Frame`], validated through [`Frame::new`].
#[derive(Deserialize)]
struct FrameRepr {
    id: String,
    grid: Grid,
    values: Array2<f32>,
    #[serde(default)]
    quantity: Quantity,
}

impl TryFrom<FrameRepr> for Frame {
    type Error = Error;

    fn try_from(repr: FrameRepr) -> Result<Self> {
        Frame::new(repr.id, repr.grid, repr.values, repr.quantity)
    }
}

impl GetSize for Frame {
    fn get_heap_size(&self) -> usize {
        self.id.get_heap_size()
            + self.grid.get_heap_size()
            + self.quantity.get_heap_size()
            + self.values.len() * size_of::<f32>()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::interpolation::InterpolationMethod;
    use super::*;

    pub(crate) fn grid(rows: usize, columns: usize) -> Grid {
        Grid::new(
            Axis::indices(rows, Quantity::new("Y", "m")).unwrap(),
            Axis::indices(columns, Quantity::new("X", "m")).unwrap(),
        )
    }

    pub(crate) fn ramp(id: &str, rows: usize, columns: usize, offset: f32) -> Frame {
        Frame::from_fn(
            id,
            grid(rows, columns),
            Quantity::new("Height", "nm"),
            |(r, c)| offset + 10.0 * r as f32 + c as f32,
        )
    }

    #[test]
    fn shape_must_match_grid() {
        let err = Frame::from_vec("f", grid(2, 2), vec![1.0, 2.0, 3.0], Quantity::default());
        assert!(matches!(err, Err(Error::Shape(_))));

        let err = Frame::new("f", grid(2, 3), Array2::zeros((3, 2)), Quantity::default());
        assert!(matches!(err, Err(Error::Shape(_))));
    }

    #[test]
    fn row_major_values() {
        let frame = Frame::from_vec(
            "f",
            grid(2, 3),
            vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0],
            Quantity::default(),
        )
        .unwrap();
        assert_eq!(frame.value_at(1, 0).unwrap(), 4.0);
        assert_eq!(frame.row(0).unwrap().to_vec(), [1.0, 2.0, 3.0]);
        assert_eq!(frame.column(2).unwrap().to_vec(), [3.0, 6.0]);
        assert!(matches!(
            frame.value_at(2, 0),
            Err(Error::OutOfRange { index: 2, count: 2 })
        ));
        assert!(frame.column(3).is_err());
    }

    #[test]
    fn value_range_skips_nan() {
        let frame = Frame::from_vec(
            "f",
            grid(1, 3),
            vec![f32::NAN, -2.0, 5.0],
            Quantity::default(),
        )
        .unwrap();
        assert_eq!(frame.value_range(), Some(RangeIncl::new(-2.0, 5.0)));
    }

    #[test]
    fn sampling_uses_coordinates() {
        let g = Grid::new(
            Axis::new(100.0, 2.0, 3, Quantity::default()).unwrap(),
            Axis::new(-1.0, 0.5, 3, Quantity::default()).unwrap(),
        );
        let frame = Frame::from_fn("f", g, Quantity::default(), |(r, c)| {
            10.0 * r as f32 + c as f32
        });
        let bilinear = InterpolationMethod::Bilinear;
        // x = -0.5 is column 1, y = 103 is row 1.5
        assert!((frame.sample(-0.5, 103.0, &bilinear) - 16.0).abs() < 1e-5);
        let along = frame.sample_along(
            &[Vec2F::new(-1.0, 100.0), Vec2F::new(0.0, 104.0)],
            &bilinear,
        );
        assert!((along[0] - 0.0).abs() < 1e-5);
        assert!((along[1] - 22.0).abs() < 1e-5);
    }

    #[test]
    fn regrid_to_own_resolution_is_identity() {
        let frame = Frame::from_fn(
            "f",
            Grid::new(
                Axis::new(0.3, 0.7, 6, Quantity::default()).unwrap(),
                Axis::new(-2.0, 0.15, 9, Quantity::default()).unwrap(),
            ),
            Quantity::default(),
            |(r, c)| ((r * 7 + c * 3) % 5) as f32 * 1.5 - 2.0,
        );
        let target = frame.grid().resized(6, 9).unwrap();
        for method in [
            InterpolationMethod::NearestNeighbour,
            InterpolationMethod::Bilinear,
        ] {
            let values = method.regrid(&frame, &target);
            for (a, b) in values.iter().zip(frame.values().iter()) {
                assert!((a - b).abs() < 1e-4, "{method:?}: {a} != {b}");
            }
        }
    }

    #[test]
    fn regrid_upsamples_linear_field() {
        let frame = ramp("f", 3, 3, 0.0);
        let target = frame.grid().resized(5, 5).unwrap();
        let fine = frame.regridded(&target, &InterpolationMethod::Bilinear);
        assert_eq!(fine.shape(), (5, 5));
        // a linear field is reproduced exactly by bilinear interpolation
        assert!((fine.values()[[1, 3]] - (5.0 + 1.5)).abs() < 1e-5);
        assert_eq!(fine.grid(), &target);
    }

    #[test]
    fn deserialized_shape_must_match_grid() {
        let frame = ramp("f", 2, 2, 0.0);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(serde_json::from_str::<Frame>(&json).unwrap(), frame);

        let mut value: serde_json::Value = serde_json::from_str(&json).unwrap();
        value["grid"] = serde_json::to_value(grid(3, 3)).unwrap();
        assert!(serde_json::from_value::<Frame>(value).is_err());
    }

    #[test]
    fn heap_size_counts_values() {
        let frame = ramp("f", 4, 5, 0.0);
        assert!(frame.get_heap_size() >= 20 * size_of::<f32>());
    }
}
