//! Rainfall-probability prediction service for Indian meteorological
//! subdivisions.
//!
//! The pipeline aligns an arbitrary, partially-filled request onto the
//! exact feature schema the model was trained on, imputes and scales it,
//! runs a logistic classifier, and applies an ordered chain of heuristic
//! corrections before reporting a bounded probability with a confidence
//! label.

pub mod adjust;
pub mod config;
pub mod data;
pub mod error;
pub mod http;
pub mod model;
pub mod pipeline;
pub mod types;
