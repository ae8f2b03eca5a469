//! Forward dataflow analysis over method bytecode
//!
//! For any specific instruction inside a method body, the stack and locals
//! have the same depth regardless of which control flow path was used to
//! reach it - the upstream stages guarantee as much, and this module treats
//! a violation as fatal. What *can* differ between paths is the abstract
//! value sitting in each slot, so reaching a stable description of every
//! program point is a fix-point computation: start from the entry frame,
//! push frames through instructions, and merge frames wherever paths join
//! until nothing changes.
//!
//! The pieces:
//!
//!   - [`ControlFlow`] rebuilds basic blocks and edges from the linear
//!     instruction sequence (including edges into exception handlers)
//!   - [`Frame`] is the abstract machine state (stack + locals) at one
//!     program point
//!   - [`Interpreter`] is the pluggable value domain: it decides what value
//!     each instruction produces and how two values merge at a join
//!   - [`analyze`] runs the worklist iteration and hands back one frame per
//!     reachable instruction, describing the state *before* that
//!     instruction executes
//!
//! Termination does not depend on the interpreter being clever: any domain
//! whose merge is idempotent, commutative, and moves values only finitely
//! far up a lattice will converge.

mod cfg;
mod engine;
mod frame;

pub use cfg::*;
pub use engine::*;
pub use frame::*;
