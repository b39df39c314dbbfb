mod chunks;
mod event_stream;

pub use chunks::{Chunks, Error as ChunksError};
#[cfg(test)]
pub use event_stream::encode_frame;
pub use event_stream::{EventStream, Frame};
