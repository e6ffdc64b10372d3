//! Application services layer.

pub mod error;
pub mod groups;
pub mod repos;
pub mod tasks;
pub mod views;
