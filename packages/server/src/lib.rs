pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::{Config, PlanLimits};
