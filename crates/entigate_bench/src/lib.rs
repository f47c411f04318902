//! Benchmarks for EntiGate.
//!
//! Run with `cargo bench -p entigate_bench`.
