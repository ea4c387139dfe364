//! Synthetic trace generation.
//!
//! The generated workloads execute one transaction at a time, so every trace
//! is anomaly-free by construction. They exercise the engine's bookkeeping
//! (ordering, windowing, version chains, pruning) without any finding to
//! report.

pub mod generator;
