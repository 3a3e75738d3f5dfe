//! Streaming response pipeline: tag classification and assembly.

pub mod assembler;
pub mod tag_parser;

pub use assembler::{AssembledResponse, ResponseAssembler, StreamDelta};
pub use tag_parser::{StreamFragment, TagStreamParser, DEFAULT_THINKING_ALIASES};
