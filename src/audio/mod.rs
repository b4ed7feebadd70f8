//! Audio container handling.

pub mod wav;

pub use wav::{AudioFormat, Fragment};
