//! Analysis modules.
//!
//! Aggregations over the audit table used by the report renderer.

pub mod aggregator;

pub use aggregator::*;
