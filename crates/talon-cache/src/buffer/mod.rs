//! The read and write buffers that decouple the fast path from the
//! serialized eviction policy.

pub(crate) mod read;
pub(crate) mod write;

pub(crate) use read::ReadBuffer;
pub(crate) use write::{WriteBuffer, WriteTask};
