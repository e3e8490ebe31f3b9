//! Common types for debugging functionality.

/// x86 trap flag in RFLAGS: raise a single-step exception after the next instruction.
pub const TRAP_FLAG: u64 = 0x100;

/// `int3`
pub const TRAP_OPCODE: u8 = 0xCC;

/// Raw OS handle value.
///
/// Kept as a plain integer so that the platform-independent parts of the crate
/// can carry handles around without depending on the Win32 bindings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub isize);

/// A debug event as delivered by the OS, tagged with the ids needed to continue it.
#[derive(Debug, Clone)]
pub struct DebugEvent {
    pub process_id: u32,
    pub thread_id: u32,
    pub kind: DebugEventKind,
}

/// Debug event received from the debugger
#[derive(Debug, Clone)]
pub enum DebugEventKind {
    /// Process created/attached. `image_file` must be closed by the debugger.
    ProcessCreated { image_file: Option<RawHandle> },
    /// Process exited
    ProcessExited { exit_code: u32 },
    /// Thread created
    ThreadCreated,
    /// Thread exited
    ThreadExited,
    /// DLL loaded. `image_file` must be closed by the debugger.
    ModuleLoaded {
        base_address: u64,
        image_file: Option<RawHandle>,
    },
    /// `int3` executed
    BreakpointHit { address: u64 },
    /// Single step completed
    SingleStep { address: u64 },
    /// Any other exception
    Exception {
        code: u32,
        address: u64,
        first_chance: bool,
    },
    /// Unload, debug string, RIP events
    Other { code: u32 },
}

/// How the target should treat the event it is resumed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContinueStatus {
    /// The debugger dealt with it (`DBG_CONTINUE`)
    Handled,
    /// Let the target's own exception handling run (`DBG_EXCEPTION_NOT_HANDLED`)
    NotHandled,
}

/// CPU register state (x64)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegisterContext {
    pub rax: u64,
    pub rbx: u64,
    pub rcx: u64,
    pub rdx: u64,
    pub rsi: u64,
    pub rdi: u64,
    pub rbp: u64,
    pub rsp: u64,
    pub r8: u64,
    pub r9: u64,
    pub r10: u64,
    pub r11: u64,
    pub r12: u64,
    pub r13: u64,
    pub r14: u64,
    pub r15: u64,
    pub rip: u64,
    pub rflags: u64,
}

/// Snapshot of a module loaded into the target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    /// Module file name, e.g. `wrapper.node`
    pub name: String,
    /// Base address of the mapped image
    pub base_address: u64,
    /// Size of the mapped image
    pub size: u32,
}

/// A section of a mapped module image
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SectionInfo {
    /// Section name
    pub name: String,
    /// Relative virtual address
    pub virtual_address: u32,
    /// Size in memory
    pub virtual_size: u32,
    /// Module base + RVA
    pub start_address: u64,
}
