pub mod config;
pub mod execution;
pub mod job;
pub mod registry;
pub mod telemetry;

#[cfg(test)]
mod tests;

pub use config::EngineConfig;
pub use execution::engine::Engine;
pub use job::{Job, JobBuilder};
pub use registry::JobRegistry;
