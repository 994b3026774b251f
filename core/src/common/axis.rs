use get_size::GetSize;
use serde::{Deserialize, Serialize};

use super::{quantity::Quantity, range::RangeIncl};
use crate::error::{Error, Result};

/// Relative tolerance used when deciding whether two axes describe the same grid.
const STEP_TOLERANCE: f32 = 1e-5;

/// An immutable linear coordinate axis: `value(i) = origin + i * step` for `i < count`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, GetSize)]
#[serde(try_from = "AxisRepr")]
pub struct Axis {
    origin: f32,
    step: f32,
    count: usize,
    quantity: Quantity,
}

impl Axis {
    pub fn new(origin: f32, step: f32, count: usize, quantity: Quantity) -> Result<Self> {
        if count == 0 {
            return Err(Error::invalid_settings("an axis needs at least one value"));
        }
        if !origin.is_finite() || !step.is_finite() {
            return Err(Error::invalid_settings(format!(
                "axis origin {origin} and step {step} must be finite"
            )));
        }
        if count > 1 && step == 0.0 {
            return Err(Error::invalid_settings(
                "an axis with more than one value needs a non-zero step",
            ));
        }
        Ok(Self {
            origin,
            step,
            count,
            quantity,
        })
    }

    /// Axis running from `first` to `last` (inclusive) in `count` equal steps.
    pub fn from_range(first: f32, last: f32, count: usize, quantity: Quantity) -> Result<Self> {
        let step = if count > 1 {
            (last - first) / (count - 1) as f32
        } else {
            0.0
        };
        Self::new(first, step, count, quantity)
    }

    /// `0, 1, ..., count - 1`
    pub fn indices(count: usize, quantity: Quantity) -> Result<Self> {
        Self::new(0.0, 1.0, count, quantity)
    }

    pub fn origin(&self) -> f32 {
        self.origin
    }

    pub fn step(&self) -> f32 {
        self.step
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn quantity(&self) -> &Quantity {
        &self.quantity
    }

    pub fn with_quantity(mut self, quantity: Quantity) -> Self {
        self.quantity = quantity;
        self
    }

    pub fn first(&self) -> f32 {
        self.origin
    }

    pub fn last(&self) -> f32 {
        self.at(self.count - 1)
    }

    pub fn minimum(&self) -> f32 {
        self.first().min(self.last())
    }

    pub fn maximum(&self) -> f32 {
        self.first().max(self.last())
    }

    pub fn range(&self) -> RangeIncl<f32> {
        RangeIncl::new(self.minimum(), self.maximum())
    }

    pub fn value(&self, index: usize) -> Result<f32> {
        if index >= self.count {
            return Err(Error::OutOfRange {
                index,
                count: self.count,
            });
        }
        Ok(self.at(index))
    }

    /// Caller guarantees `index < count`.
    pub(crate) fn at(&self, index: usize) -> f32 {
        self.origin + index as f32 * self.step
    }

    pub fn values(&self) -> impl Iterator<Item = f32> + '_ {
        (0..self.count).map(move |i| self.at(i))
    }

    /// Continuous position of `value` in index space. Not clamped.
    pub fn fractional_index(&self, value: f32) -> f32 {
        if self.count == 1 {
            return 0.0;
        }
        (value - self.origin) / self.step
    }

    /// Index whose value is nearest to `value`, clamped into `[0, count - 1]`.
    pub fn closest_index_within_bounds(&self, value: f32) -> usize {
        let index = self.fractional_index(value).round();
        if index.is_nan() || index <= 0.0 {
            0
        } else if index >= (self.count - 1) as f32 {
            self.count - 1
        } else {
            index as usize
        }
    }

    /// Same first and last value, sampled with `count` points.
    pub fn resized(&self, count: usize) -> Result<Self> {
        if count == self.count {
            return Ok(self.clone());
        }
        if self.count == 1 && count > 1 {
            return Err(Error::invalid_settings(
                "cannot resample a single-valued axis onto several points",
            ));
        }
        Self::from_range(self.first(), self.last(), count, self.quantity.clone())
    }

    /// Same number of values with the same spacing.
    pub fn is_compatible(&self, other: &Axis) -> bool {
        self.count == other.count && approx_eq(self.step, other.step)
    }
}

/// Unchecked wire form of [`Axis`], validated through [`Axis::new`].
#[derive(Deserialize)]
struct AxisRepr {
    origin: f32,
    step: f32,
    count: usize,
    #[serde(default)]
    quantity: Quantity,
}

impl TryFrom<AxisRepr> for Axis {
    type Error = Error;

    fn try_from(repr: AxisRepr) -> Result<Self> {
        Axis::new(repr.origin, repr.step, repr.count, repr.quantity)
    }
}

fn approx_eq(a: f32, b: f32) -> bool {
    let scale = a.abs().max(b.abs());
    (a - b).abs() <= STEP_TOLERANCE * scale
}
