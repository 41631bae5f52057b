//! Credit-default risk scoring engine.
//!
//! Wraps a trained tree-ensemble classifier behind a stateless serving
//! boundary: raw applicant records are encoded into the trained feature
//! schema, scored against a configured decision threshold, explained through
//! per-feature attribution, and monitored for distribution drift against the
//! training-time reference.

pub mod config;
pub mod error;
pub mod scoring;
pub mod telemetry;
