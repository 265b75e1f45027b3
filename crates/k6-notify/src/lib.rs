pub mod cli;
pub mod config;
pub mod payload;
pub mod report;
pub mod sink;
pub mod summary;
pub mod threshold;
