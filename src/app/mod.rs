//! App module - key extraction workflow
//!
//! Ties the debugger and the scanners together for the QQNT client.

mod extract;
mod keys;
mod target;

pub use extract::*;
pub use keys::*;
pub use target::*;
