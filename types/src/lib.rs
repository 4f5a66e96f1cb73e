//! Shared configuration types for editorlog
//!
//! This crate contains the serializable configuration consumed by the parsing
//! engine and the binaries, plus display helpers for durations and counts.

pub mod config;
pub mod formatting;

pub use config::*;
