//! Larger test suites for the propagation crate.

mod engine;
