pub mod api;
pub mod config;
pub mod engines;
pub mod humanize;
pub mod observability;
pub mod progress;
pub mod registry;
pub mod storage;
pub mod worker;
