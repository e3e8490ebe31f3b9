//! Core module - Error types and low-level memory primitives
//!
//! Shared by the debug session, the module scanner and the key extraction.

pub mod debugger;
pub mod memory;

// Re-export common types
pub use debugger::DebugError;
pub use memory::{MemoryError, MemoryProtection, SavedProtection};
