//! Blocking debug event loop.

use super::session::DebugSession;
use super::types::{ContinueStatus, DebugEvent, DebugEventKind, RawHandle, TRAP_FLAG};
use super::DebugBackend;
use crate::core::DebugError;

impl<B: DebugBackend> DebugSession<B> {
    /// Wait for and dispatch debug events until the process exits or the
    /// session detaches.
    ///
    /// Every event is continued before the next wait. After a detach (usually
    /// from a breakpoint callback) the current event is continued once more and
    /// the loop returns.
    pub fn run(&mut self) -> Result<(), DebugError> {
        if !self.attached {
            return Err(DebugError::NotAttached { pid: self.pid });
        }

        while !self.exiting {
            let event = self.backend.wait_for_event()?;
            log::trace!("{:?}", event);

            let status = match event.kind {
                DebugEventKind::ProcessCreated { image_file } => {
                    self.release_image_file(image_file);
                    ContinueStatus::Handled
                }
                DebugEventKind::ModuleLoaded {
                    base_address,
                    image_file,
                } => {
                    log::debug!("Module loaded at {:#x}", base_address);
                    self.release_image_file(image_file);
                    ContinueStatus::Handled
                }
                DebugEventKind::BreakpointHit { address } => {
                    self.on_breakpoint(event.thread_id, address)?
                }
                DebugEventKind::SingleStep { .. } => self.on_single_step(event.thread_id),
                DebugEventKind::ProcessExited { exit_code } => {
                    log::info!("Process {} exited with code {}", self.pid, exit_code);
                    self.resume(&event, ContinueStatus::Handled)?;
                    return Ok(());
                }
                DebugEventKind::Exception { code, address, .. } => {
                    log::debug!("Passing exception {:#010x} at {:#x} to target", code, address);
                    ContinueStatus::NotHandled
                }
                DebugEventKind::ThreadCreated
                | DebugEventKind::ThreadExited
                | DebugEventKind::Other { .. } => ContinueStatus::Handled,
            };

            self.resume(&event, status)?;
        }

        Ok(())
    }

    fn resume(&mut self, event: &DebugEvent, status: ContinueStatus) -> Result<(), DebugError> {
        match self.backend.continue_event(event, status) {
            Ok(()) => Ok(()),
            // the debug link may already be gone after a detach
            Err(e) if self.exiting => {
                log::debug!("Final continue: {}", e);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn release_image_file(&mut self, image_file: Option<RawHandle>) {
        if let Some(handle) = image_file {
            self.backend.close_handle(handle);
        }
    }

    /// Step back over our `int3`, arrange for one single step with the original
    /// instruction in place, then hand the registers to the callback.
    fn on_breakpoint(&mut self, tid: u32, address: u64) -> Result<ContinueStatus, DebugError> {
        if !self.breakpoints.contains_key(&address) {
            // attach break-in or a trap compiled into the target
            log::debug!("Foreign breakpoint at {:#x} on thread {}", address, tid);
            return Ok(ContinueStatus::Handled);
        }
        log::debug!("Breakpoint hit at {:#x} on thread {}", address, tid);

        let snapshot = match self.backend.get_thread_context(tid) {
            Ok(context) => context,
            Err(e) => {
                // leave the trap armed; the thread resumes past it
                log::warn!("Skipping breakpoint at {:#x}: {}", address, e);
                return Ok(ContinueStatus::Handled);
            }
        };

        self.disarm(address)?;

        let mut context = snapshot.clone();
        context.rip = address;
        context.rflags |= TRAP_FLAG;
        if let Err(e) = self.backend.set_thread_context(tid, &context) {
            log::warn!("Skipping breakpoint at {:#x}: {}", address, e);
            if let Err(e) = self.rearm(address) {
                log::warn!("Could not re-arm breakpoint at {:#x}: {}", address, e);
            }
            return Ok(ContinueStatus::Handled);
        }
        self.single_steps.insert(tid, address);

        let callback = self
            .breakpoints
            .get_mut(&address)
            .and_then(|breakpoint| breakpoint.callback.take());
        if let Some(mut callback) = callback {
            callback(self, &snapshot);
            if let Some(breakpoint) = self.breakpoints.get_mut(&address) {
                breakpoint.callback = Some(callback);
            }
        }

        Ok(ContinueStatus::Handled)
    }

    fn on_single_step(&mut self, tid: u32) -> ContinueStatus {
        if let Some(address) = self.single_steps.remove(&tid) {
            if !self.exiting {
                if let Err(e) = self.rearm(address) {
                    log::warn!("Could not re-arm breakpoint at {:#x}: {}", address, e);
                }
            }
        }
        ContinueStatus::Handled
    }
}
