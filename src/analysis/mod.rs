//! Analysis Module - Static scanning of mapped module images
//!
//! Contains the PE section table parser and the string-reference locator.

pub mod loader;
pub mod signature;

pub use loader::parse_sections;
pub use signature::{locate_reference, SectionBytes};
