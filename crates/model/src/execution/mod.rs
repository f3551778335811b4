pub mod context;
pub mod job;
pub mod params;
pub mod status;
pub mod step;
