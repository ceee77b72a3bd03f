//! Application services layer: the streaming engine and its seams.

pub mod engine;
pub mod error;
pub mod fetch;
pub mod renderer;
