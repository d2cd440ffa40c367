//! # varq
//!
//! Variant queue harness for product configurators.
//!
//! Generates attribute-value combinations from option schemas, deduplicates
//! them by content hash into a SQLite-backed queue, and drains the queue
//! through a pool of concurrent senders, recording every outcome.

pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod generator;
pub mod model;
pub mod schema;
pub mod sender;
pub mod telemetry;
