#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
// #![warn(clippy::cargo)]

pub mod batch;
pub mod config;
mod error;
pub mod kragten;
pub mod standards;
pub mod stats;
pub mod strategy;
pub mod table;

pub use batch::{Batch, BatchState, CalculationResult, QaqcRow, ReportRow};
pub use config::SystemConfig;
pub use error::Error;
pub use standards::ReferenceMaterial;
pub use strategy::{CalibrationStrategy, NPointLinear, SinglePointOffset, TwoPointLinear};

pub type Result<T> = ::std::result::Result<T, Error>;
