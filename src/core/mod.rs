//! Core types & traits: transport-agnostic contracts for tools and protocol.

pub mod content;
pub mod error;
pub mod mcp;
pub mod schema;
pub mod tool;
