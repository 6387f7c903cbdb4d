//! adaptest-core — Adaptive testing engine: IRT models, ability estimation,
//! item selection, stopping rules, and scoring.
//!
//! The engine is pure in-memory computation. An enclosing application loads
//! a calibrated [`bank::ItemBank`], builds an [`engine::AssessmentEngine`],
//! and drives sessions through `start_session` / `next_item` /
//! `submit_response` / `get_report`.

pub mod bank;
pub mod config;
pub mod engine;
pub mod error;
pub mod estimator;
pub mod irt;
pub mod model;
pub mod parser;
pub mod report;
pub mod scoring;
pub mod selector;
pub mod session;
pub mod simulation;
pub mod statistics;
pub mod stopping;
pub mod traits;
