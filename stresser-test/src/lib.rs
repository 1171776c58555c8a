//! Test utilities for the stresser.
//!
//! This crate provides utilities to facilitate testing of stress runs without a real object
//! store. See the modules for all available utilities.

pub mod store;
pub mod tracing;
