//! # hp-cli
//!
//! Command-line driver for HyperSched: benchmark objectives and the
//! `hp-optimize` binary's argument handling.

pub mod benchmarks;
pub mod cli;

pub use benchmarks::Benchmark;
pub use cli::{run, Args};
