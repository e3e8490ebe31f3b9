//! Software breakpoints (`int3`) with exact byte restoration.

use super::session::DebugSession;
use super::types::{RegisterContext, TRAP_OPCODE};
use super::DebugBackend;
use crate::core::{DebugError, MemoryError, MemoryProtection};

/// Invoked on every hit with the registers captured at the trap.
///
/// The session is handed back so the callback can read target memory or
/// detach to end the event loop early.
pub type BreakpointCallback<B> = Box<dyn FnMut(&mut DebugSession<B>, &RegisterContext)>;

pub(super) struct Breakpoint<B: DebugBackend> {
    pub(super) original_byte: u8,
    /// Taken out while the callback runs
    pub(super) callback: Option<BreakpointCallback<B>>,
}

impl<B: DebugBackend> DebugSession<B> {
    /// Install a trap at `address`.
    ///
    /// A second call for the same address is a no-op: the first original byte
    /// and callback are kept.
    pub fn set_breakpoint<F>(&mut self, address: u64, callback: F) -> Result<(), DebugError>
    where
        F: FnMut(&mut DebugSession<B>, &RegisterContext) + 'static,
    {
        if self.breakpoints.contains_key(&address) {
            log::debug!("Breakpoint at {:#x} already installed", address);
            return Ok(());
        }

        let original_byte = self.read_memory(address, 1)?[0];
        self.patch_code_byte(address, TRAP_OPCODE)?;
        self.breakpoints.insert(
            address,
            Breakpoint {
                original_byte,
                callback: Some(Box::new(callback)),
            },
        );

        log::debug!(
            "Breakpoint set at {:#x} (original byte {:02x})",
            address,
            original_byte
        );
        Ok(())
    }

    /// Put the original byte back and forget the breakpoint. No-op if absent.
    ///
    /// The breakpoint stays registered when the write fails, so a later call
    /// (or detach) can retry.
    pub fn restore_breakpoint(&mut self, address: u64) -> Result<(), MemoryError> {
        let Some(original_byte) = self.breakpoints.get(&address).map(|b| b.original_byte) else {
            return Ok(());
        };
        self.patch_code_byte(address, original_byte)?;
        self.breakpoints.remove(&address);
        log::debug!("Breakpoint removed at {:#x}", address);
        Ok(())
    }

    /// Temporarily put the original instruction byte back for a single step.
    pub(super) fn disarm(&mut self, address: u64) -> Result<(), MemoryError> {
        match self.breakpoints.get(&address) {
            Some(breakpoint) => {
                let original_byte = breakpoint.original_byte;
                self.patch_code_byte(address, original_byte)
            }
            None => Ok(()),
        }
    }

    /// Write the trap byte again after a single step, if still registered.
    pub(super) fn rearm(&mut self, address: u64) -> Result<(), MemoryError> {
        if !self.breakpoints.contains_key(&address) {
            return Ok(());
        }
        self.patch_code_byte(address, TRAP_OPCODE)
    }

    /// Write one byte into (usually read-only) code pages and make sure the
    /// CPU sees it.
    ///
    /// Fails only if the byte was not written. A flush failure after a
    /// successful write is logged.
    fn patch_code_byte(&mut self, address: u64, byte: u8) -> Result<(), MemoryError> {
        let process = self.process.ok_or(MemoryError::NoProcess)?;

        let saved = self
            .backend
            .protect(process, address, 1, MemoryProtection::RWX)?;
        let written = self.write_memory(address, &[byte]);
        if let Err(e) = self.backend.restore_protection(process, address, 1, saved) {
            log::warn!("{}", e);
        }
        written?;

        if let Err(e) = self.backend.flush_instruction_cache(process, address, 1) {
            log::warn!("{}", e);
        }
        Ok(())
    }
}
