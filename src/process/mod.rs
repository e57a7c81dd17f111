//! Agent subprocess plumbing: spawning and stdin framing

mod child;
mod writer;

pub use child::{SpawnSpec, SpawnedProcess, WrappedChild, forward_stderr, spawn};
pub use writer::FrameWriter;
