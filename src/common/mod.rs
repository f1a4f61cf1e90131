//! Shared input handling.

pub mod scene;
