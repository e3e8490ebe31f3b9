//! Scripted in-memory backend for tests.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::types::{ContinueStatus, DebugEvent, DebugEventKind, ModuleInfo, RawHandle, RegisterContext};
use super::DebugBackend;
use crate::core::{DebugError, MemoryError, MemoryProtection, SavedProtection};

pub(crate) const PROCESS_HANDLE: RawHandle = RawHandle(0x44);

#[derive(Debug, Default)]
pub(crate) struct MockBackend {
    /// Sparse target memory; absent addresses are unmapped
    pub memory: HashMap<u64, u8>,
    pub events: VecDeque<DebugEvent>,
    pub threads: HashMap<u32, RegisterContext>,
    pub modules: Vec<ModuleInfo>,

    pub fail_attach: bool,
    pub fail_open: bool,
    pub fail_write: bool,
    pub fail_flush: bool,

    pub attach_calls: usize,
    pub detach_calls: usize,
    pub closed_handles: Vec<RawHandle>,
    pub continued: Vec<(u32, ContinueStatus)>,
    pub writes: Vec<(u64, u8)>,
    pub protect_calls: usize,
    pub restore_calls: usize,
    pub flushes: Vec<u64>,

    /// Receives the final memory contents when the backend is dropped
    pub on_drop: Option<Rc<RefCell<Option<HashMap<u64, u8>>>>>,
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        if let Some(slot) = &self.on_drop {
            *slot.borrow_mut() = Some(std::mem::take(&mut self.memory));
        }
    }
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn map(&mut self, address: u64, bytes: &[u8]) {
        for (i, byte) in bytes.iter().enumerate() {
            self.memory.insert(address + i as u64, *byte);
        }
    }

    pub fn byte(&self, address: u64) -> Option<u8> {
        self.memory.get(&address).copied()
    }

    pub fn push_event(&mut self, thread_id: u32, kind: DebugEventKind) {
        self.events.push_back(DebugEvent {
            process_id: 1,
            thread_id,
            kind,
        });
    }

    /// Queue an `int3` hit at `address`; the thread's rip points past the trap.
    pub fn push_hit(&mut self, thread_id: u32, address: u64, registers: RegisterContext) {
        self.threads.insert(
            thread_id,
            RegisterContext {
                rip: address + 1,
                ..registers
            },
        );
        self.push_event(thread_id, DebugEventKind::BreakpointHit { address });
    }
}

impl DebugBackend for MockBackend {
    fn attach(&mut self, pid: u32) -> Result<(), DebugError> {
        self.attach_calls += 1;
        if self.fail_attach {
            return Err(DebugError::AttachFailed {
                pid,
                reason: "access denied".into(),
            });
        }
        Ok(())
    }

    fn detach(&mut self, _pid: u32) -> Result<(), DebugError> {
        self.detach_calls += 1;
        Ok(())
    }

    fn open_process(&mut self, pid: u32) -> Result<RawHandle, DebugError> {
        if self.fail_open {
            return Err(DebugError::AttachFailed {
                pid,
                reason: "OpenProcess denied".into(),
            });
        }
        Ok(PROCESS_HANDLE)
    }

    fn close_handle(&mut self, handle: RawHandle) {
        self.closed_handles.push(handle);
    }

    fn wait_for_event(&mut self) -> Result<DebugEvent, DebugError> {
        self.events
            .pop_front()
            .ok_or_else(|| DebugError::EventError("event queue exhausted".into()))
    }

    fn continue_event(&mut self, event: &DebugEvent, status: ContinueStatus) -> Result<(), DebugError> {
        self.continued.push((event.thread_id, status));
        Ok(())
    }

    fn read_memory(&self, _process: RawHandle, address: u64, buffer: &mut [u8]) -> Result<usize, MemoryError> {
        for (i, slot) in buffer.iter_mut().enumerate() {
            match self.memory.get(&(address + i as u64)) {
                Some(byte) => *slot = *byte,
                None if i == 0 => {
                    return Err(MemoryError::ReadFailed {
                        address,
                        reason: "unmapped".into(),
                    })
                }
                None => return Ok(i),
            }
        }
        Ok(buffer.len())
    }

    fn write_memory(&mut self, _process: RawHandle, address: u64, data: &[u8]) -> Result<usize, MemoryError> {
        if self.fail_write {
            return Err(MemoryError::WriteFailed {
                address,
                reason: "access denied".into(),
            });
        }
        for (i, byte) in data.iter().enumerate() {
            let at = address + i as u64;
            match self.memory.get_mut(&at) {
                Some(slot) => *slot = *byte,
                None => {
                    return Err(MemoryError::WriteFailed {
                        address: at,
                        reason: "unmapped".into(),
                    })
                }
            }
            self.writes.push((at, *byte));
        }
        Ok(data.len())
    }

    fn protect(
        &mut self,
        _process: RawHandle,
        _address: u64,
        _size: usize,
        _protection: MemoryProtection,
    ) -> Result<SavedProtection, MemoryError> {
        self.protect_calls += 1;
        Ok(SavedProtection(0x20))
    }

    fn restore_protection(
        &mut self,
        _process: RawHandle,
        _address: u64,
        _size: usize,
        saved: SavedProtection,
    ) -> Result<(), MemoryError> {
        assert_eq!(saved, SavedProtection(0x20));
        self.restore_calls += 1;
        Ok(())
    }

    fn flush_instruction_cache(&mut self, _process: RawHandle, address: u64, _size: usize) -> Result<(), MemoryError> {
        if self.fail_flush {
            return Err(MemoryError::FlushFailed {
                address,
                reason: "invalid handle".into(),
            });
        }
        self.flushes.push(address);
        Ok(())
    }

    fn get_thread_context(&mut self, tid: u32) -> Result<RegisterContext, DebugError> {
        self.threads
            .get(&tid)
            .cloned()
            .ok_or_else(|| DebugError::ThreadContext {
                tid,
                reason: "no such thread".into(),
            })
    }

    fn set_thread_context(&mut self, tid: u32, context: &RegisterContext) -> Result<(), DebugError> {
        self.threads.insert(tid, context.clone());
        Ok(())
    }

    fn modules(&self, _pid: u32) -> Result<Vec<ModuleInfo>, DebugError> {
        Ok(self.modules.clone())
    }
}
