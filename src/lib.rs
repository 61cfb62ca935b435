//! Offer taker: autonomous agent that takes the best-priced fixed-price
//! offer under a configurable policy.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod dashboard;
pub mod engine;
pub mod service;
pub mod strategy;
pub mod types;
