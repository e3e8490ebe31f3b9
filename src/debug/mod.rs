//! Debug module - Minimal single-target debugger.
//!
//! Provides:
//! - Process attach/detach ([`DebugSession`])
//! - Software breakpoints with single-step re-arming
//! - The blocking debug event loop
//!
//! All OS access goes through [`DebugBackend`]; the Win32 implementation lives
//! in [`windows`], tests use a scripted stand-in.

pub mod types;

mod breakpoint;
mod event_loop;
mod session;

#[cfg(all(target_os = "windows", target_arch = "x86_64"))]
pub mod windows;

#[cfg(test)]
pub(crate) mod mock;


#[cfg(all(target_os = "windows", target_arch = "x86_64"))]
pub use self::windows::WindowsBackend as PlatformBackend;

pub use breakpoint::BreakpointCallback;
pub use session::DebugSession;

use crate::core::{DebugError, MemoryError, MemoryProtection, SavedProtection};
use types::{ContinueStatus, DebugEvent, ModuleInfo, RawHandle, RegisterContext};

/// The OS debug facility the session is built on.
///
/// Implementations are thin: no bookkeeping beyond what the OS call needs.
/// Breakpoint state, pending single steps and the attach/exit flags are owned
/// by [`DebugSession`].
pub trait DebugBackend {
    /// Establish the debug link to a running process
    fn attach(&mut self, pid: u32) -> Result<(), DebugError>;

    /// Release the debug link; the target keeps running
    fn detach(&mut self, pid: u32) -> Result<(), DebugError>;

    /// Open a handle with VM read/write/operation and query rights
    fn open_process(&mut self, pid: u32) -> Result<RawHandle, DebugError>;

    /// Close any handle handed out by this backend or carried by an event
    fn close_handle(&mut self, handle: RawHandle);

    /// Block until the next debug event
    fn wait_for_event(&mut self) -> Result<DebugEvent, DebugError>;

    /// Resume the thread that reported `event`
    fn continue_event(&mut self, event: &DebugEvent, status: ContinueStatus)
        -> Result<(), DebugError>;

    /// Read into `buffer`, returning how many bytes were transferred
    fn read_memory(
        &self,
        process: RawHandle,
        address: u64,
        buffer: &mut [u8],
    ) -> Result<usize, MemoryError>;

    /// Write `data`, returning how many bytes were transferred
    fn write_memory(
        &mut self,
        process: RawHandle,
        address: u64,
        data: &[u8],
    ) -> Result<usize, MemoryError>;

    /// Change page protection, returning the previous value
    fn protect(
        &mut self,
        process: RawHandle,
        address: u64,
        size: usize,
        protection: MemoryProtection,
    ) -> Result<SavedProtection, MemoryError>;

    /// Put back a protection value returned by [`DebugBackend::protect`]
    fn restore_protection(
        &mut self,
        process: RawHandle,
        address: u64,
        size: usize,
        saved: SavedProtection,
    ) -> Result<(), MemoryError>;

    fn flush_instruction_cache(
        &mut self,
        process: RawHandle,
        address: u64,
        size: usize,
    ) -> Result<(), MemoryError>;

    fn get_thread_context(&mut self, tid: u32) -> Result<RegisterContext, DebugError>;

    fn set_thread_context(&mut self, tid: u32, context: &RegisterContext)
        -> Result<(), DebugError>;

    /// Enumerate modules currently mapped into `pid`
    fn modules(&self, pid: u32) -> Result<Vec<ModuleInfo>, DebugError>;
}
