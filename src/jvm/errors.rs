use super::code::InsnIdx;
use super::{BinaryName, Name, UnqualifiedName};
use std::fmt;

/// Fatal malformed-input error
///
/// Any of these indicates a bug in the stage that produced the method, not a
/// condition a pass can recover from. The pass that hits one aborts for that
/// method and leaves its instruction sequence unmodified. The offending
/// method and instruction index are always carried so the diagnostic can
/// point at the culprit.
#[derive(Debug)]
pub struct Error {
    /// Class owning the method being processed
    pub class: BinaryName,

    /// Name of the method being processed
    pub method: UnqualifiedName,

    /// Instruction at which the problem was detected
    pub at: InsnIdx,

    /// What went wrong
    pub kind: ErrorKind,
}

#[derive(Debug, PartialEq, Eq)]
pub enum ErrorKind {
    /// A jump names a target outside the instruction sequence
    BranchTargetOutOfBounds(InsnIdx),

    /// An exception handler range or entry lies outside the instruction sequence
    HandlerOutOfBounds(InsnIdx),

    /// Two frames being merged at a join point have different stack depths
    StackDepthMismatch { expected: usize, found: usize },

    /// Two frames being merged have different numbers of local slots
    LocalsSizeMismatch { expected: usize, found: usize },

    /// An instruction consumes more values than the stack holds
    EmptyStack,

    /// A load or store names a local slot past the end of the frame
    InvalidLocalIndex(u16),

    /// The value consumed by an instruction has the wrong shape
    /// (eg. an array operation applied to a non-array value)
    InvalidType,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{} at instruction {:?}: {}",
            self.class.as_str(),
            self.method.as_str(),
            self.at,
            self.kind
        )
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::BranchTargetOutOfBounds(target) => {
                write!(f, "branch target {:?} is outside the method", target)
            }
            ErrorKind::HandlerOutOfBounds(target) => {
                write!(f, "exception handler {:?} is outside the method", target)
            }
            ErrorKind::StackDepthMismatch { expected, found } => write!(
                f,
                "stack depth mismatch at join point (expected {}, found {})",
                expected, found
            ),
            ErrorKind::LocalsSizeMismatch { expected, found } => write!(
                f,
                "locals size mismatch at join point (expected {}, found {})",
                expected, found
            ),
            ErrorKind::EmptyStack => f.write_str("popped from an empty stack"),
            ErrorKind::InvalidLocalIndex(index) => {
                write!(f, "local variable index {} is out of range", index)
            }
            ErrorKind::InvalidType => f.write_str("value has the wrong shape"),
        }
    }
}

impl std::error::Error for Error {}
