//! Key extraction: find the key routine, trap it, read its arguments.

use std::cell::RefCell;
use std::rc::Rc;

use super::keys::{CandidateKey, Confidence, KeyCollector};
use super::target::ExtractionTarget;
use crate::analysis::signature::{self, SectionBytes};
use crate::core::DebugError;
use crate::debug::types::RegisterContext;
use crate::debug::{DebugBackend, DebugSession};

/// The located key routine
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRoutine {
    /// Absolute address of the `lea rdx, [marker]` instruction
    pub address: u64,
    /// Same address relative to the module base
    pub module_offset: u64,
}

/// Find the instruction that loads the marker string inside the target module.
///
/// Reads only; nothing is patched until this succeeds.
pub fn locate_key_routine<B: DebugBackend>(
    session: &DebugSession<B>,
    target: &ExtractionTarget,
) -> Result<KeyRoutine, DebugError> {
    let module = session
        .find_module(&target.module)
        .ok_or_else(|| DebugError::ModuleNotFound {
            name: target.module.clone(),
        })?;
    log::info!("{} loaded at {:#x}", module.name, module.base_address);

    let section_not_found = |section: &str| DebugError::SectionNotFound {
        module: target.module.clone(),
        section: section.to_string(),
    };
    let data = session
        .find_section(&module, &target.data_section)
        .ok_or_else(|| section_not_found(&target.data_section))?;
    let code = session
        .find_section(&module, &target.code_section)
        .ok_or_else(|| section_not_found(&target.code_section))?;

    let data_bytes = session.read_section(&data)?;
    let code_bytes = session.read_section(&code)?;

    let marker_address = signature::find_marker(
        SectionBytes::new(data.start_address, &data_bytes),
        target.marker.as_bytes(),
    )
    .ok_or_else(|| DebugError::SignatureNotFound {
        module: target.module.clone(),
        reason: format!("marker {:?} not in {}", target.marker, data.name),
    })?;
    log::debug!("Marker at {:#x}", marker_address);

    let address = signature::find_lea_reference(
        SectionBytes::new(code.start_address, &code_bytes),
        marker_address,
    )
    .ok_or_else(|| DebugError::SignatureNotFound {
        module: target.module.clone(),
        reason: format!("no reference to {:#x} in {}", marker_address, code.name),
    })?;

    let routine = KeyRoutine {
        address,
        module_offset: address - module.base_address,
    };
    log::info!(
        "Key routine at {:#x} ({}+{:#x})",
        routine.address,
        module.name,
        routine.module_offset
    );
    Ok(routine)
}

/// Inspect one hit of the key routine.
///
/// `rdx` is the schema name and `r8` the key buffer. Stops the session once a
/// high-confidence key was seen.
fn on_key_routine_hit<B: DebugBackend>(
    session: &mut DebugSession<B>,
    registers: &RegisterContext,
    target: &ExtractionTarget,
    collector: &RefCell<KeyCollector>,
) {
    let database = target.database.as_bytes();
    match session.read_memory(registers.rdx, database.len()) {
        Ok(name) if name == database => {}
        Ok(name) => {
            log::debug!("Skipping key for database {}", String::from_utf8_lossy(&name));
            return;
        }
        Err(e) => {
            log::debug!("Unreadable database name at {:#x}: {}", registers.rdx, e);
            return;
        }
    }

    let key = match session.read_memory(registers.r8, target.key_len) {
        Ok(key) => key,
        Err(e) => {
            log::warn!("Unreadable key buffer at {:#x}: {}", registers.r8, e);
            return;
        }
    };
    log::trace!("Key buffer {}", hex::encode(&key));

    if collector.borrow_mut().record(&key) == Some(Confidence::High) {
        session.detach();
    }
}

/// Attach, trap the key routine and collect keys until a high-confidence
/// key is found or the process exits.
///
/// The session is always detached on return, including on errors.
pub fn extract_keys<B: DebugBackend>(
    session: &mut DebugSession<B>,
    target: &ExtractionTarget,
) -> Result<Vec<CandidateKey>, DebugError> {
    session.attach()?;
    let result = trap_and_collect(session, target);
    session.detach();
    result
}

fn trap_and_collect<B: DebugBackend>(
    session: &mut DebugSession<B>,
    target: &ExtractionTarget,
) -> Result<Vec<CandidateKey>, DebugError> {
    let routine = locate_key_routine(session, target)?;

    let collector = Rc::new(RefCell::new(KeyCollector::new()));
    let hit_collector = Rc::clone(&collector);
    let hit_target = target.clone();
    session.set_breakpoint(routine.address, move |session, registers| {
        on_key_routine_hit(session, registers, &hit_target, &hit_collector);
    })?;

    session.run()?;

    let keys = std::mem::take(&mut *collector.borrow_mut());
    Ok(keys.into_keys())
}
