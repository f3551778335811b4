pub mod processor;
pub mod reader;
pub mod writer;

pub use processor::{ItemProcessor, PassThrough};
pub use reader::ItemReader;
pub use writer::ItemWriter;
