//! BAKEN — JRA betting-ticket ingestion and settlement engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod ingest;
pub mod results;
pub mod engine;
pub mod storage;
