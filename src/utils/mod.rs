//! Small helpers shared across the crate.

pub mod retry;
pub mod text;
