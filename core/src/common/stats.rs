use std::fmt;

use serde::{Deserialize, Serialize};

use super::{quantity::Quantity, range::RangeIncl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StatisticKind {
    Count,
    Sum,
    Mean,
    Median,
    Minimum,
    Maximum,
    Range,
    Variance,
    StdDev,
    Rms,
}

impl StatisticKind {
    pub const ALL: [StatisticKind; 10] = [
        StatisticKind::Count,
        StatisticKind::Sum,
        StatisticKind::Mean,
        StatisticKind::Median,
        StatisticKind::Minimum,
        StatisticKind::Maximum,
        StatisticKind::Range,
        StatisticKind::Variance,
        StatisticKind::StdDev,
        StatisticKind::Rms,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StatisticKind::Count => "Count",
            StatisticKind::Sum => "Sum",
            StatisticKind::Mean => "Mean",
            StatisticKind::Median => "Median",
            StatisticKind::Minimum => "Minimum",
            StatisticKind::Maximum => "Maximum",
            StatisticKind::Range => "Range",
            StatisticKind::Variance => "Variance",
            StatisticKind::StdDev => "Standard deviation",
            StatisticKind::Rms => "RMS",
        }
    }

    /// Whether the statistic has a value for an empty sample.
    pub fn defined_when_empty(&self) -> bool {
        matches!(self, StatisticKind::Count | StatisticKind::Sum)
    }

    /// Quantity of the statistic computed over samples of `source`.
    pub fn quantity(&self, source: &Quantity) -> Quantity {
        match self {
            StatisticKind::Count => Quantity::dimensionless(self.name()),
            StatisticKind::Variance => source.squared(self.name()),
            _ => source.renamed(self.name()),
        }
    }
}

impl fmt::Display for StatisticKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Computes `kind` over `values`.
///
/// Returns `None` for an empty sample unless the statistic is defined at zero
/// elements (see [`StatisticKind::defined_when_empty`]).
pub fn statistic(kind: StatisticKind, values: &[f32]) -> Option<f32> {
    if values.is_empty() && !kind.defined_when_empty() {
        return None;
    }

    let value = match kind {
        StatisticKind::Count => values.len() as f64,
        StatisticKind::Sum => values.iter().map(|&v| f64::from(v)).sum(),
        StatisticKind::Mean => Moments::new(values).mean,
        StatisticKind::Variance => Moments::new(values).variance(),
        StatisticKind::StdDev => Moments::new(values).variance().sqrt(),
        StatisticKind::Rms => {
            let sum_sq: f64 = values.iter().map(|&v| f64::from(v) * f64::from(v)).sum();
            (sum_sq / values.len() as f64).sqrt()
        }
        StatisticKind::Median => median(values),
        StatisticKind::Minimum => f64::from(value_range(values)?.min),
        StatisticKind::Maximum => f64::from(value_range(values)?.max),
        StatisticKind::Range => f64::from(value_range(values)?.width()),
    };
    Some(value as f32)
}

fn value_range(values: &[f32]) -> Option<RangeIncl<f32>> {
    RangeIncl::from_iter_val(values.iter().copied())
}

/// Running mean and sum of squared deviations (Welford).
struct Moments {
    count: usize,
    mean: f64,
    m2: f64,
}

impl Moments {
    fn new(values: &[f32]) -> Self {
        let mut moments = Self {
            count: 0,
            mean: 0.0,
            m2: 0.0,
        };
        for &value in values {
            let value = f64::from(value);
            moments.count += 1;
            let delta = value - moments.mean;
            moments.mean += delta / moments.count as f64;
            moments.m2 += delta * (value - moments.mean);
        }
        moments
    }

    /// Population variance.
    fn variance(&self) -> f64 {
        self.m2 / self.count as f64
    }
}

fn median(values: &[f32]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (f64::from(sorted[mid - 1]) + f64::from(sorted[mid])) / 2.0
    } else {
        f64::from(sorted[mid])
    }
}
