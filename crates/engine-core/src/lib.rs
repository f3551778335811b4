pub mod context;
pub mod item;
pub mod metrics;
pub mod partition;
pub mod state;
pub mod tasklet;
pub mod transaction;
