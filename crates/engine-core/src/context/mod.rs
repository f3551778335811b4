pub mod chunk;

pub use chunk::ChunkContext;
