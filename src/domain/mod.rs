//! Core domain types and logic.

pub mod aggregator;
pub mod bar;
pub mod config_validation;
pub mod engine;
pub mod error;
pub mod execution;
pub mod features;
pub mod metrics;
pub mod momentum;
pub mod order;
pub mod position;
pub mod settings;
pub mod signal;
pub mod stats;
pub mod strategy;
