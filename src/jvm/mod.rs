//! JVM types, names, and method bytecode
//!
//! This module contains the pieces of the JVM that the analysis needs to
//! reason about: field and method descriptors, class and member names, and a
//! linear representation of method code. There is intentionally no classfile
//! reader or writer here - methods are handed to this crate by the owning
//! backend, already verified to have consistent stack depths on all paths,
//! and are handed back in place with zero or more instructions removed.

mod access_flags;
pub mod code;
mod descriptors;
mod errors;
mod names;

pub use access_flags::*;
pub use descriptors::*;
pub use errors::*;
pub use names::*;
