pub mod error;
pub mod mmap;
pub mod reader;
pub mod recovery;
pub mod scratchpad;
pub mod transform;

pub use error::{IoError, IoResult};
pub use reader::{Event, FlatReader, VerticalReader};
pub use scratchpad::{FileSink, FileSource, MemorySink, MemorySource, ScratchpadReader, ScratchpadWriter, Sink, Source};
