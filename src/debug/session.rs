//! Debug session: attach/detach lifecycle and target memory access.

use std::collections::HashMap;

use super::breakpoint::Breakpoint;
use super::types::{ModuleInfo, RawHandle, SectionInfo, TRAP_FLAG};
use super::DebugBackend;
use crate::analysis::loader::{self, HEADER_READ_SIZE};
use crate::core::{DebugError, MemoryError};

/// A debugging session on a single process.
///
/// Owns the process handle, every installed breakpoint and the pending
/// single-step table. Dropping the session detaches, so patched bytes are
/// restored on every exit path.
pub struct DebugSession<B: DebugBackend> {
    pub(super) backend: B,
    pub(super) pid: u32,
    pub(super) process: Option<RawHandle>,
    pub(super) attached: bool,
    pub(super) exiting: bool,
    pub(super) breakpoints: HashMap<u64, Breakpoint<B>>,
    /// thread id -> breakpoint address to re-arm after its single step
    pub(super) single_steps: HashMap<u32, u64>,
}

impl<B: DebugBackend> DebugSession<B> {
    /// Create a detached session for `pid`
    pub fn new(pid: u32, backend: B) -> Self {
        Self {
            backend,
            pid,
            process: None,
            attached: false,
            exiting: false,
            breakpoints: HashMap::new(),
            single_steps: HashMap::new(),
        }
    }

    /// Take debug control of the process. No-op when already attached.
    pub fn attach(&mut self) -> Result<(), DebugError> {
        if self.attached {
            return Ok(());
        }
        log::info!("Attaching to process {}", self.pid);

        self.backend.attach(self.pid)?;
        let handle = match self.backend.open_process(self.pid) {
            Ok(handle) => handle,
            Err(e) => {
                if let Err(stop) = self.backend.detach(self.pid) {
                    log::warn!("Releasing debug link after failed open: {}", stop);
                }
                return Err(e);
            }
        };

        self.process = Some(handle);
        self.attached = true;
        self.exiting = false;

        log::info!("Successfully attached to process {}", self.pid);
        Ok(())
    }

    /// Restore all patched bytes, drop the debug link and close the process handle.
    ///
    /// Best effort: individual failures are logged and skipped so that detach
    /// always completes. Calling it again is a no-op.
    pub fn detach(&mut self) {
        self.exiting = true;

        let addresses: Vec<u64> = self.breakpoints.keys().copied().collect();
        for address in addresses {
            if let Err(e) = self.restore_breakpoint(address) {
                log::warn!("Could not restore breakpoint at {:#x}: {}", address, e);
            }
        }
        self.breakpoints.clear();

        for (tid, address) in std::mem::take(&mut self.single_steps) {
            log::debug!("Cancelling pending single step of thread {} at {:#x}", tid, address);
            if let Err(e) = self.clear_trap_flag(tid) {
                log::warn!("Could not clear trap flag of thread {}: {}", tid, e);
            }
        }

        if self.attached {
            log::info!("Detaching from process {}", self.pid);
            if let Err(e) = self.backend.detach(self.pid) {
                log::warn!("{}", e);
            }
            self.attached = false;
        }

        if let Some(handle) = self.process.take() {
            self.backend.close_handle(handle);
        }
    }

    fn clear_trap_flag(&mut self, tid: u32) -> Result<(), DebugError> {
        let mut context = self.backend.get_thread_context(tid)?;
        if context.rflags & TRAP_FLAG != 0 {
            context.rflags &= !TRAP_FLAG;
            self.backend.set_thread_context(tid, &context)?;
        }
        Ok(())
    }

    /// Read exactly `length` bytes. A short read is an error.
    pub fn read_memory(&self, address: u64, length: usize) -> Result<Vec<u8>, MemoryError> {
        let process = self.process.ok_or(MemoryError::NoProcess)?;
        let mut buffer = vec![0u8; length];
        let read = self.backend.read_memory(process, address, &mut buffer)?;
        if read != length {
            return Err(MemoryError::PartialTransfer {
                address,
                expected: length,
                actual: read,
            });
        }
        Ok(buffer)
    }

    /// Write all of `data`. A short write is an error.
    pub fn write_memory(&mut self, address: u64, data: &[u8]) -> Result<(), MemoryError> {
        let process = self.process.ok_or(MemoryError::NoProcess)?;
        let written = self.backend.write_memory(process, address, data)?;
        if written != data.len() {
            return Err(MemoryError::PartialTransfer {
                address,
                expected: data.len(),
                actual: written,
            });
        }
        Ok(())
    }

    /// First loaded module whose name matches, ignoring case.
    pub fn find_module(&self, name: &str) -> Option<ModuleInfo> {
        let modules = match self.backend.modules(self.pid) {
            Ok(modules) => modules,
            Err(e) => {
                log::warn!("Module enumeration failed: {}", e);
                return None;
            }
        };
        modules
            .into_iter()
            .find(|module| module.name.eq_ignore_ascii_case(name))
    }

    /// Locate a section by parsing the image header mapped at the module base.
    ///
    /// Returns `None` whenever the header cannot be read or parsed.
    pub fn find_section(&self, module: &ModuleInfo, name: &str) -> Option<SectionInfo> {
        let length = HEADER_READ_SIZE.min(module.size as usize);
        let header = match self.read_memory(module.base_address, length) {
            Ok(header) => header,
            Err(e) => {
                log::warn!("Reading header of {} failed: {}", module.name, e);
                return None;
            }
        };
        loader::parse_sections(&header, module.base_address)?
            .into_iter()
            .find(|section| section.name.eq_ignore_ascii_case(name))
    }

    /// Read a section's full mapped contents.
    pub fn read_section(&self, section: &SectionInfo) -> Result<Vec<u8>, MemoryError> {
        self.read_memory(section.start_address, section.virtual_size as usize)
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn is_attached(&self) -> bool {
        self.attached
    }

    /// Set once detach has started; the event loop stops after the current event.
    pub fn is_exiting(&self) -> bool {
        self.exiting
    }

    pub fn breakpoint_count(&self) -> usize {
        self.breakpoints.len()
    }

    pub fn has_breakpoint(&self, address: u64) -> bool {
        self.breakpoints.contains_key(&address)
    }

    pub fn pending_single_steps(&self) -> usize {
        self.single_steps.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: DebugBackend> Drop for DebugSession<B> {
    fn drop(&mut self) {
        if self.attached || self.process.is_some() || !self.breakpoints.is_empty() {
            self.detach();
        }
    }
}
