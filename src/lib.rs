pub mod config;
pub mod dashboard;
pub mod error;
pub mod fetcher;
pub mod model;
pub mod refresh;
pub mod series;
pub mod telemetry;
pub mod types;
