//! Linear method bytecode
//!
//! ### Structure
//!
//! A method body here is an ordered sequence of [`Insn`]s, addressed by
//! stable [`InsnIdx`] positions. Unlike a representation built around basic
//! blocks, branches carry the index of their target instruction directly -
//! this subsystem receives already-generated code and must *reconstruct*
//! control flow from it (see [`crate::analysis::ControlFlow`]) rather than
//! build it up.
//!
//! ### Mutation
//!
//! The only mutation a pass performs is removal of individual instructions.
//! [`Method`] therefore keeps instructions in an arena of slots: removal
//! marks a slot dead without shifting anything, so instruction indices (and
//! any frame table keyed by them) stay valid across deletions.

mod instructions;
mod method;

pub use instructions::*;
pub use method::*;
