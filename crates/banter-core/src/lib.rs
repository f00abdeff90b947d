//! Shared types, configuration, and the error taxonomy used by every
//! banter crate. Keep this crate dependency-light — it sits at the
//! bottom of the workspace graph.

pub mod config;
pub mod error;
pub mod persona;
pub mod types;
