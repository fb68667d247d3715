//! Helpers shared by the taskrelay crates.

pub mod context;

pub use context::FromMessage;
