//! Read-mostly query API for aggregated news story groups.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
