//! A stress tester for S3-compatible object stores.
//!
//! A run drives a configurable number of concurrent workers against an [`ObjectStore`] for a fixed
//! duration. Workers issue GETs for keys from a manifest, PUTs of freshly generated objects, or a
//! random mix of both. Every operation is timed and the results are aggregated into [`RunStats`]
//! with exact nearest-rank latency percentiles.
//!
//! Write runs can alternatively upload a fixed number of objects and record their keys in a
//! manifest, which a later read run can then replay.
//!
//! Use [`stresstest::run`] to run from a [`Config`], or [`Stresstest`] to drive an existing
//! store directly.
#![warn(missing_debug_implementations)]

pub mod cli;
pub mod config;
pub mod error;
pub mod executor;
pub mod manifest;
pub mod observability;
pub mod report;
pub mod stats;
pub mod store;
pub mod stresstest;
pub mod workload;

pub use crate::config::Config;
pub use crate::error::Error;
pub use crate::stats::RunStats;
pub use crate::store::ObjectStore;
pub use crate::stresstest::{RunReport, Stresstest};
