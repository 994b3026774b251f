pub mod axis;
pub mod quantity;
pub mod range;
pub mod stats;
