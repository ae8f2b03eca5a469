//! Method-level bytecode rewrites
//!
//! Every rewrite here follows the same shape: run a dataflow analysis from
//! [`crate::analysis`] over the untouched method, decide on edits from the
//! computed frames only, then apply all edits at once. A pass that hits a
//! malformed method (bad branch target, inconsistent stack depths) aborts
//! with an error and leaves the method exactly as it found it.

mod check_cast;
mod reified;

pub use check_cast::*;
pub use reified::*;

use crate::jvm::code::Method;
use crate::jvm::{BinaryName, Error};

/// An in-place rewrite of one method body
pub trait MethodTransformer {
    /// Rewrite the method, or leave it untouched and report why not
    ///
    /// The class name is only used for diagnostics.
    fn transform(&self, class: &BinaryName, method: &mut Method) -> Result<(), Error>;
}
