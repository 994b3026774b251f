use std::ops::Sub;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RangeIncl<N> {
    pub min: N,
    pub max: N,
}

impl<N> RangeIncl<N> {
    pub fn new(min: N, max: N) -> Self {
        Self { min, max }
    }
}

impl<N: Default> Default for RangeIncl<N> {
    fn default() -> Self {
        Self {
            min: N::default(),
            max: N::default(),
        }
    }
}

impl<N: Sub<Output = N> + Copy> RangeIncl<N> {
    pub fn width(&self) -> N {
        self.max - self.min
    }
}

impl<N: PartialOrd + Copy> RangeIncl<N> {
    pub fn expand(&self, new: N) -> Self {
        Self::new(
            if self.min < new { self.min } else { new },
            if self.max > new { self.max } else { new },
        )
    }

    pub fn contains(&self, value: N) -> bool {
        self.min <= value && value <= self.max
    }

    pub fn from_iter_val(iter: impl IntoIterator<Item = N>) -> Option<RangeIncl<N>> {
        iter.into_iter().fold(None, |acc, n| match acc {
            Some(acc) => Some(acc.expand(n)),
            None => Some(RangeIncl::new(n, n)),
        })
    }
}

impl<N> From<RangeIncl<N>> for std::ops::RangeInclusive<N> {
    fn from(range: RangeIncl<N>) -> Self {
        range.min..=range.max
    }
}
