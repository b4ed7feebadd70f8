//! Text preparation for synthesis.

pub mod chunker;

pub use chunker::{Chunk, normalize, rejoin, split};
