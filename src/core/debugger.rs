//! Debugger errors
//!
//! Every fallible session operation reports a [`DebugError`]. Setup failures
//! (module, section, signature) happen before any breakpoint is written.

use thiserror::Error;

use super::memory::MemoryError;

/// Debugger-specific errors
#[derive(Error, Debug)]
pub enum DebugError {
    #[error("Failed to attach to process {pid}: {reason}")]
    AttachFailed { pid: u32, reason: String },

    #[error("Failed to detach from process {pid}: {reason}")]
    DetachFailed { pid: u32, reason: String },

    #[error("Failed to launch {path}: {reason}")]
    LaunchFailed { path: String, reason: String },

    #[error("Not attached to process {pid}")]
    NotAttached { pid: u32 },

    #[error("Module not found: {name}")]
    ModuleNotFound { name: String },

    #[error("Section {section} not found in {module}")]
    SectionNotFound { module: String, section: String },

    #[error("Signature not found in {module}: {reason}")]
    SignatureNotFound { module: String, reason: String },

    #[error("Thread {tid} context error: {reason}")]
    ThreadContext { tid: u32, reason: String },

    #[error("Debug event error: {0}")]
    EventError(String),

    #[error(transparent)]
    Memory(#[from] MemoryError),
}
