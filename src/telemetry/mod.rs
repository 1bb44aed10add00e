pub mod health;
pub mod latency;

pub use health::RefreshHealth;
pub use latency::FetchLatency;
