//! QQNT key finder
//!
//! A purpose-built debugger that starts (or attaches to) the QQNT client,
//! traps the routine that hands the database key to SQLite and reads the key
//! from its arguments. The target is left unmodified on detach.

pub mod analysis;
pub mod app;
pub mod core;
pub mod debug;
