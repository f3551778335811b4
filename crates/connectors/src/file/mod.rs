pub mod checksum;
pub mod copy;
pub mod object;
pub mod reader;
pub mod template;
pub mod writer;

pub use checksum::ChecksumAlgorithm;
pub use copy::{FileCopy, FileLocation};
pub use object::{FileFormat, FileObjectModel};
pub use reader::FileItemReader;
pub use writer::FileItemWriter;
