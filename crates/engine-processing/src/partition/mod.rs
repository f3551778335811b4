mod coordinator;

pub use coordinator::run_partitions;
