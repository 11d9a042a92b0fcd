pub mod client;
pub mod config;
pub mod connection_pool;
pub mod generator;

pub use client::{RequestOutcome, issue_request};
pub use generator::{Counters, LoadGenerator};
