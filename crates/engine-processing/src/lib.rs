pub mod chunk;
pub mod env;
pub mod partition;
pub mod runner;
pub mod state_manager;
pub mod step;
pub mod tasklet;

#[cfg(test)]
pub(crate) mod testing;

pub use env::{PartitionFailurePolicy, StepEnv};
pub use runner::execute_step;
pub use step::{Step, StepBuilder, StepKind, StepOutcome};
