// TODO: Re-enable and fix
// #![warn(clippy::pedantic)]

// #![warn(clippy::nursery)]
// #![warn(clippy::cargo)]
#![warn(clippy::complexity)]
#![warn(clippy::correctness)]
#![warn(clippy::perf)]
#![warn(clippy::style)]
#![warn(clippy::suspicious)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::todo)]
#![warn(clippy::unimplemented)]
#![warn(clippy::dbg_macro)]
// #![warn(clippy::unwrap_used)]
// #![warn(clippy::expect_used)]

pub mod common;
pub mod error;
pub mod frame;
pub mod geom;
pub mod profile;
pub mod resample;
pub mod roi;
pub mod runner;
pub mod sections;
pub mod stack;
pub mod statistics;

pub use error::{Error, Result};
pub use frame::{Frame, Grid};
pub use stack::Stack;
