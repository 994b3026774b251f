use std::fmt;

use get_size::GetSize;
use serde::{Deserialize, Serialize};

/// A named physical quantity together with its unit tag, e.g. `Height [nm]`.
///
/// Quantities travel unchanged through slicing and resampling. Only
/// statistics derive new ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize, GetSize)]
pub struct Quantity {
    pub name: String,
    pub unit: String,
}

impl Quantity {
    pub fn new(name: impl Into<String>, unit: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            unit: unit.into(),
        }
    }

    pub fn dimensionless(name: impl Into<String>) -> Self {
        Self::new(name, "")
    }

    pub fn is_dimensionless(&self) -> bool {
        self.unit.is_empty()
    }

    /// Same name, unit raised to the second power.
    pub fn squared(&self, name: impl Into<String>) -> Self {
        let unit = if self.is_dimensionless() {
            String::new()
        } else if self.unit.contains(|c: char| c.is_whitespace() || c == '/' || c == '*') {
            format!("({})^2", self.unit)
        } else {
            format!("{}^2", self.unit)
        };
        Self::new(name, unit)
    }

    pub fn renamed(&self, name: impl Into<String>) -> Self {
        Self::new(name, self.unit.clone())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_dimensionless() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} [{}]", self.name, self.unit)
        }
    }
}
