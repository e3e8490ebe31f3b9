//! Windows backend using the Win32 Debug API.

mod process;

pub use process::{enumerate_modules, launch};

use std::ffi::c_void;

use super::types::{ContinueStatus, DebugEvent, DebugEventKind, ModuleInfo, RawHandle, RegisterContext};
use super::DebugBackend;
use crate::core::{DebugError, MemoryError, MemoryProtection, SavedProtection};

use windows::Win32::Foundation::{CloseHandle, HANDLE, NTSTATUS};
use windows::Win32::System::Diagnostics::Debug::{
    ContinueDebugEvent, DebugActiveProcess, DebugActiveProcessStop, DebugSetProcessKillOnExit,
    FlushInstructionCache, GetThreadContext, ReadProcessMemory, SetThreadContext,
    WaitForDebugEvent, WriteProcessMemory, CONTEXT, CONTEXT_CONTROL_AMD64, CONTEXT_INTEGER_AMD64,
    CREATE_PROCESS_DEBUG_EVENT, CREATE_THREAD_DEBUG_EVENT, DEBUG_EVENT, EXCEPTION_DEBUG_EVENT,
    EXIT_PROCESS_DEBUG_EVENT, EXIT_THREAD_DEBUG_EVENT, LOAD_DLL_DEBUG_EVENT,
};
use windows::Win32::System::Memory::{
    VirtualProtectEx, PAGE_EXECUTE_READ, PAGE_EXECUTE_READWRITE, PAGE_NOACCESS,
    PAGE_PROTECTION_FLAGS, PAGE_READONLY, PAGE_READWRITE,
};
use windows::Win32::System::Threading::{
    OpenProcess, OpenThread, INFINITE, PROCESS_QUERY_INFORMATION, PROCESS_VM_OPERATION,
    PROCESS_VM_READ, PROCESS_VM_WRITE, THREAD_GET_CONTEXT, THREAD_QUERY_INFORMATION,
    THREAD_SET_CONTEXT,
};

const DBG_CONTINUE: NTSTATUS = NTSTATUS(0x00010002i32);
const DBG_EXCEPTION_NOT_HANDLED: NTSTATUS = NTSTATUS(0x80010001u32 as i32);
const EXCEPTION_BREAKPOINT_CODE: u32 = 0x80000003;
const EXCEPTION_SINGLE_STEP_CODE: u32 = 0x80000004;

/// Win32 implementation of [`DebugBackend`] (x64 targets only)
#[derive(Debug, Default)]
pub struct WindowsBackend;

impl WindowsBackend {
    pub fn new() -> Self {
        Self
    }
}

fn handle(raw: RawHandle) -> HANDLE {
    HANDLE(raw.0)
}

/// `None` for the null / invalid handles events use to mean "no file"
fn owned_handle(h: HANDLE) -> Option<RawHandle> {
    if h.is_invalid() {
        None
    } else {
        Some(RawHandle(h.0))
    }
}

fn page_flags(protection: MemoryProtection) -> PAGE_PROTECTION_FLAGS {
    match (protection.read, protection.write, protection.execute) {
        (_, true, true) => PAGE_EXECUTE_READWRITE,
        (_, false, true) => PAGE_EXECUTE_READ,
        (_, true, false) => PAGE_READWRITE,
        (true, false, false) => PAGE_READONLY,
        (false, false, false) => PAGE_NOACCESS,
    }
}

/// Open a thread with the rights needed to read and write its context,
/// run `f`, and close it again.
fn with_thread<T>(
    tid: u32,
    f: impl FnOnce(HANDLE) -> Result<T, DebugError>,
) -> Result<T, DebugError> {
    let thread = unsafe {
        OpenThread(
            THREAD_GET_CONTEXT | THREAD_SET_CONTEXT | THREAD_QUERY_INFORMATION,
            false,
            tid,
        )
        .map_err(|e| DebugError::ThreadContext {
            tid,
            reason: e.to_string(),
        })?
    };
    let result = f(thread);
    unsafe {
        let _ = CloseHandle(thread);
    }
    result
}

fn read_context(tid: u32, thread: HANDLE) -> Result<CONTEXT, DebugError> {
    let mut context = CONTEXT {
        ContextFlags: CONTEXT_CONTROL_AMD64 | CONTEXT_INTEGER_AMD64,
        ..Default::default()
    };
    unsafe {
        GetThreadContext(thread, &mut context).map_err(|e| DebugError::ThreadContext {
            tid,
            reason: e.to_string(),
        })?;
    }
    Ok(context)
}

impl DebugBackend for WindowsBackend {
    fn attach(&mut self, pid: u32) -> Result<(), DebugError> {
        unsafe {
            DebugActiveProcess(pid).map_err(|e| DebugError::AttachFailed {
                pid,
                reason: e.to_string(),
            })?;
            // leaving (or crashing) must not take the target down with us
            if let Err(e) = DebugSetProcessKillOnExit(false) {
                log::warn!("DebugSetProcessKillOnExit failed: {}", e);
            }
        }
        Ok(())
    }

    fn detach(&mut self, pid: u32) -> Result<(), DebugError> {
        unsafe {
            DebugActiveProcessStop(pid).map_err(|e| DebugError::DetachFailed {
                pid,
                reason: e.to_string(),
            })
        }
    }

    fn open_process(&mut self, pid: u32) -> Result<RawHandle, DebugError> {
        let process = unsafe {
            OpenProcess(
                PROCESS_VM_READ | PROCESS_VM_WRITE | PROCESS_VM_OPERATION | PROCESS_QUERY_INFORMATION,
                false,
                pid,
            )
            .map_err(|e| DebugError::AttachFailed {
                pid,
                reason: e.to_string(),
            })?
        };
        Ok(RawHandle(process.0))
    }

    fn close_handle(&mut self, raw: RawHandle) {
        unsafe {
            if let Err(e) = CloseHandle(handle(raw)) {
                log::debug!("CloseHandle({:#x}) failed: {}", raw.0, e);
            }
        }
    }

    fn wait_for_event(&mut self) -> Result<DebugEvent, DebugError> {
        let mut debug_event = DEBUG_EVENT::default();
        unsafe {
            WaitForDebugEvent(&mut debug_event, INFINITE)
                .map_err(|e| DebugError::EventError(e.to_string()))?;
        }

        let code = debug_event.dwDebugEventCode;
        let kind = match code {
            EXCEPTION_DEBUG_EVENT => unsafe {
                let info = debug_event.u.Exception;
                let record = info.ExceptionRecord;
                let address = record.ExceptionAddress as u64;
                let code_raw = record.ExceptionCode.0 as u32;
                match code_raw {
                    EXCEPTION_BREAKPOINT_CODE => DebugEventKind::BreakpointHit { address },
                    EXCEPTION_SINGLE_STEP_CODE => DebugEventKind::SingleStep { address },
                    _ => DebugEventKind::Exception {
                        code: code_raw,
                        address,
                        first_chance: info.dwFirstChance != 0,
                    },
                }
            },
            CREATE_PROCESS_DEBUG_EVENT => DebugEventKind::ProcessCreated {
                image_file: owned_handle(unsafe { debug_event.u.CreateProcessInfo.hFile }),
            },
            LOAD_DLL_DEBUG_EVENT => unsafe {
                let info = debug_event.u.LoadDll;
                DebugEventKind::ModuleLoaded {
                    base_address: info.lpBaseOfDll as u64,
                    image_file: owned_handle(info.hFile),
                }
            },
            EXIT_PROCESS_DEBUG_EVENT => DebugEventKind::ProcessExited {
                exit_code: unsafe { debug_event.u.ExitProcess.dwExitCode },
            },
            CREATE_THREAD_DEBUG_EVENT => DebugEventKind::ThreadCreated,
            EXIT_THREAD_DEBUG_EVENT => DebugEventKind::ThreadExited,
            other => DebugEventKind::Other { code: other.0 },
        };

        Ok(DebugEvent {
            process_id: debug_event.dwProcessId,
            thread_id: debug_event.dwThreadId,
            kind,
        })
    }

    fn continue_event(&mut self, event: &DebugEvent, status: ContinueStatus) -> Result<(), DebugError> {
        let status = match status {
            ContinueStatus::Handled => DBG_CONTINUE,
            ContinueStatus::NotHandled => DBG_EXCEPTION_NOT_HANDLED,
        };
        unsafe {
            ContinueDebugEvent(event.process_id, event.thread_id, status)
                .map_err(|e| DebugError::EventError(format!("Continue failed: {}", e)))
        }
    }

    fn read_memory(&self, process: RawHandle, address: u64, buffer: &mut [u8]) -> Result<usize, MemoryError> {
        let mut bytes_read = 0usize;
        unsafe {
            ReadProcessMemory(
                handle(process),
                address as *const c_void,
                buffer.as_mut_ptr() as *mut c_void,
                buffer.len(),
                Some(&mut bytes_read),
            )
            .map_err(|e| MemoryError::ReadFailed {
                address,
                reason: e.to_string(),
            })?;
        }
        Ok(bytes_read)
    }

    fn write_memory(&mut self, process: RawHandle, address: u64, data: &[u8]) -> Result<usize, MemoryError> {
        let mut bytes_written = 0usize;
        unsafe {
            WriteProcessMemory(
                handle(process),
                address as *const c_void,
                data.as_ptr() as *const c_void,
                data.len(),
                Some(&mut bytes_written),
            )
            .map_err(|e| MemoryError::WriteFailed {
                address,
                reason: e.to_string(),
            })?;
        }
        Ok(bytes_written)
    }

    fn protect(
        &mut self,
        process: RawHandle,
        address: u64,
        size: usize,
        protection: MemoryProtection,
    ) -> Result<SavedProtection, MemoryError> {
        let mut old = PAGE_PROTECTION_FLAGS::default();
        unsafe {
            VirtualProtectEx(
                handle(process),
                address as *const c_void,
                size,
                page_flags(protection),
                &mut old,
            )
            .map_err(|e| MemoryError::ProtectFailed {
                address,
                reason: e.to_string(),
            })?;
        }
        Ok(SavedProtection(old.0))
    }

    fn restore_protection(
        &mut self,
        process: RawHandle,
        address: u64,
        size: usize,
        saved: SavedProtection,
    ) -> Result<(), MemoryError> {
        let mut previous = PAGE_PROTECTION_FLAGS::default();
        unsafe {
            VirtualProtectEx(
                handle(process),
                address as *const c_void,
                size,
                PAGE_PROTECTION_FLAGS(saved.0),
                &mut previous,
            )
            .map_err(|e| MemoryError::ProtectFailed {
                address,
                reason: e.to_string(),
            })
        }
    }

    fn flush_instruction_cache(&mut self, process: RawHandle, address: u64, size: usize) -> Result<(), MemoryError> {
        unsafe {
            FlushInstructionCache(handle(process), Some(address as *const c_void), size).map_err(|e| {
                MemoryError::FlushFailed {
                    address,
                    reason: e.to_string(),
                }
            })
        }
    }

    fn get_thread_context(&mut self, tid: u32) -> Result<RegisterContext, DebugError> {
        with_thread(tid, |thread| {
            let context = read_context(tid, thread)?;
            Ok(RegisterContext {
                rax: context.Rax,
                rbx: context.Rbx,
                rcx: context.Rcx,
                rdx: context.Rdx,
                rsi: context.Rsi,
                rdi: context.Rdi,
                rbp: context.Rbp,
                rsp: context.Rsp,
                r8: context.R8,
                r9: context.R9,
                r10: context.R10,
                r11: context.R11,
                r12: context.R12,
                r13: context.R13,
                r14: context.R14,
                r15: context.R15,
                rip: context.Rip,
                rflags: context.EFlags as u64,
            })
        })
    }

    fn set_thread_context(&mut self, tid: u32, registers: &RegisterContext) -> Result<(), DebugError> {
        with_thread(tid, |thread| {
            // start from the live context so segment/debug fields stay intact
            let mut context = read_context(tid, thread)?;
            context.Rax = registers.rax;
            context.Rbx = registers.rbx;
            context.Rcx = registers.rcx;
            context.Rdx = registers.rdx;
            context.Rsi = registers.rsi;
            context.Rdi = registers.rdi;
            context.Rbp = registers.rbp;
            context.Rsp = registers.rsp;
            context.R8 = registers.r8;
            context.R9 = registers.r9;
            context.R10 = registers.r10;
            context.R11 = registers.r11;
            context.R12 = registers.r12;
            context.R13 = registers.r13;
            context.R14 = registers.r14;
            context.R15 = registers.r15;
            context.Rip = registers.rip;
            context.EFlags = registers.rflags as u32;
            unsafe {
                SetThreadContext(thread, &context).map_err(|e| DebugError::ThreadContext {
                    tid,
                    reason: e.to_string(),
                })
            }
        })
    }

    fn modules(&self, pid: u32) -> Result<Vec<ModuleInfo>, DebugError> {
        enumerate_modules(pid)
    }
}
