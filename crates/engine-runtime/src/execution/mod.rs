pub mod engine;
mod history;
