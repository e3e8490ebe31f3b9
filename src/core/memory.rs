//! Memory - Target memory errors and protection flags
//!
//! Shared by the session (reads/writes) and the breakpoint manager
//! (page protection around code patches).

use thiserror::Error;

/// Memory operation errors
#[derive(Error, Debug)]
pub enum MemoryError {
    #[error("Failed to read memory at {address:#x}: {reason}")]
    ReadFailed { address: u64, reason: String },

    #[error("Failed to write memory at {address:#x}: {reason}")]
    WriteFailed { address: u64, reason: String },

    #[error("Partial transfer at {address:#x}: {actual} of {expected} bytes")]
    PartialTransfer {
        address: u64,
        expected: usize,
        actual: usize,
    },

    #[error("Failed to change protection at {address:#x}: {reason}")]
    ProtectFailed { address: u64, reason: String },

    #[error("Failed to flush instruction cache at {address:#x}: {reason}")]
    FlushFailed { address: u64, reason: String },

    #[error("No process attached")]
    NoProcess,
}

/// Memory protection flags
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryProtection {
    pub read: bool,
    pub write: bool,
    pub execute: bool,
}

impl MemoryProtection {
    pub const RWX: Self = Self {
        read: true,
        write: true,
        execute: true,
    };
}

/// Opaque page protection value returned by the OS when it is changed.
///
/// Handed back unchanged to restore the exact original protection, including
/// bits (guard, copy-on-write) that [`MemoryProtection`] does not model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SavedProtection(pub u32);
