//! Aggregate bias reports.
//!
//! Planning decides which charts are legible, `chart` draws them as SVG,
//! `raster` turns them into PNG and the generator ties it all to the audit
//! table on disk.

pub mod chart;
pub mod generator;
pub mod planner;
pub mod raster;

pub use generator::{generate_reports, IndexFormat, ReportSettings};
pub use planner::Legibility;
