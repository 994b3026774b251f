use derive_more::{Add, Constructor, Mul, Sub};
use serde::{Deserialize, Serialize};

#[derive(
    Add, Sub, Mul, Constructor, Default, PartialEq, Debug, Copy, Clone, Serialize, Deserialize,
)]
pub struct Vec2<T> {
    pub x: T,
    pub y: T,
}

pub type Vec2F = Vec2<f32>;

impl Vec2F {
    pub const ZERO: Vec2F = Vec2F { x: 0.0, y: 0.0 };

    pub fn length(&self) -> f32 {
        self.x.hypot(self.y)
    }

    pub fn distance(&self, other: Vec2F) -> f32 {
        (other - *self).length()
    }

    /// Point at fraction `t` of the way from `self` to `other`.
    pub fn lerp(&self, other: Vec2F, t: f32) -> Vec2F {
        *self + (other - *self) * t
    }
}

impl<T> From<(T, T)> for Vec2<T> {
    fn from((x, y): (T, T)) -> Self {
        Vec2 { x, y }
    }
}

impl<T> From<Vec2<T>> for (T, T) {
    fn from(v: Vec2<T>) -> Self {
        (v.x, v.y)
    }
}
