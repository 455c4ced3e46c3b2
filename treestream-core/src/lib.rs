pub mod chunk;
pub mod decode;
pub mod encode;
pub mod error;
pub mod frame;
pub mod header;
pub mod manifest;
pub mod path_safety;
pub mod pipe;
pub mod walker;

pub use decode::{DecodeReport, Decoder};
pub use encode::{EncodeReport, Encoder};
pub use error::{Result, StreamError};
pub use frame::{EntryKind, DEFAULT_CHUNK_SIZE};
