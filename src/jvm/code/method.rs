use super::Insn;
use crate::jvm::{BinaryName, MethodAccessFlags, MethodDescriptor, UnqualifiedName};
use std::fmt;

/// Position of an instruction in its owning [`Method`]
///
/// Indices are stable for the lifetime of the method: removing an
/// instruction never renumbers the survivors, so an index recorded before a
/// removal (in a frame table, say) still names the same slot afterwards.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct InsnIdx(pub usize);

impl fmt::Debug for InsnIdx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_fmt(format_args!("i{}", self.0))
    }
}

/// One protected range of instructions and the handler covering it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExceptionHandler {
    /// First instruction of the protected range
    pub start: InsnIdx,

    /// Past-the-end instruction of the protected range
    pub end: InsnIdx,

    /// Handler entry point
    pub handler: InsnIdx,

    /// Class of exceptions routed to this handler (`None` catches everything)
    pub catch_type: Option<BinaryName>,
}

impl ExceptionHandler {
    /// Does the protected range cover the given instruction?
    pub fn protects(&self, idx: InsnIdx) -> bool {
        self.start <= idx && idx < self.end
    }
}

#[derive(Clone, Debug, PartialEq)]
struct Slot {
    insn: Insn,
    removed: bool,
}

/// A method body: an arena of instruction slots plus exception handler
/// ranges
///
/// Constructed upstream (or by tests) with [`Method::push`], consumed by
/// passes that analyze it and remove instructions. Nothing else about a
/// method is ever mutated: operands are never rewritten, instructions are
/// never reordered or inserted.
#[derive(Clone, Debug, PartialEq)]
pub struct Method {
    /// Name of the method
    pub name: UnqualifiedName,

    /// Signature of the method
    pub descriptor: MethodDescriptor,

    /// Access flags (`STATIC` decides whether a `this` slot exists)
    pub access_flags: MethodAccessFlags,

    /// Exception handler ranges
    pub handlers: Vec<ExceptionHandler>,

    /// Instruction arena
    insns: Vec<Slot>,
}

impl Method {
    pub fn new(
        name: UnqualifiedName,
        descriptor: MethodDescriptor,
        access_flags: MethodAccessFlags,
    ) -> Method {
        Method {
            name,
            descriptor,
            access_flags,
            handlers: vec![],
            insns: vec![],
        }
    }

    /// Append an instruction, returning its position
    pub fn push(&mut self, insn: Insn) -> InsnIdx {
        let idx = InsnIdx(self.insns.len());
        self.insns.push(Slot {
            insn,
            removed: false,
        });
        idx
    }

    /// Register an exception handler range
    pub fn add_handler(&mut self, handler: ExceptionHandler) {
        self.handlers.push(handler);
    }

    /// Does the method lack a `this` parameter?
    pub fn is_static(&self) -> bool {
        self.access_flags.contains(MethodAccessFlags::STATIC)
    }

    /// Total number of slots ever pushed (removed slots included)
    pub fn len(&self) -> usize {
        self.insns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insns.is_empty()
    }

    /// Number of instructions that have not been removed
    pub fn live_len(&self) -> usize {
        self.insns.iter().filter(|slot| !slot.removed).count()
    }

    /// Is the index inside the arena (live or not)?
    pub fn in_bounds(&self, idx: InsnIdx) -> bool {
        idx.0 < self.insns.len()
    }

    /// Instruction at the given position, unless removed or out of bounds
    pub fn get(&self, idx: InsnIdx) -> Option<&Insn> {
        match self.insns.get(idx.0) {
            Some(slot) if !slot.removed => Some(&slot.insn),
            _ => None,
        }
    }

    /// Closest live instruction strictly before the given position
    pub fn prev(&self, idx: InsnIdx) -> Option<InsnIdx> {
        self.insns[..idx.0]
            .iter()
            .rposition(|slot| !slot.removed)
            .map(InsnIdx)
    }

    /// Closest live instruction strictly after the given position
    pub fn next(&self, idx: InsnIdx) -> Option<InsnIdx> {
        self.insns[idx.0 + 1..]
            .iter()
            .position(|slot| !slot.removed)
            .map(|offset| InsnIdx(idx.0 + 1 + offset))
    }

    /// First live instruction at or after the given position
    ///
    /// A branch whose target instruction was removed lands here: control
    /// continues with whatever live instruction follows the dead slot.
    pub fn resolve(&self, idx: InsnIdx) -> Option<InsnIdx> {
        self.insns[idx.0..]
            .iter()
            .position(|slot| !slot.removed)
            .map(|offset| InsnIdx(idx.0 + offset))
    }

    /// Iterate over live instructions in program order
    pub fn iter(&self) -> impl Iterator<Item = (InsnIdx, &Insn)> {
        self.insns
            .iter()
            .enumerate()
            .filter(|(_, slot)| !slot.removed)
            .map(|(idx, slot)| (InsnIdx(idx), &slot.insn))
    }

    /// Mark an instruction as removed
    ///
    /// Returns whether the slot was live; removing twice is a no-op. The
    /// slot itself stays in the arena so later indices keep their meaning.
    pub fn remove(&mut self, idx: InsnIdx) -> bool {
        match self.insns.get_mut(idx.0) {
            Some(slot) if !slot.removed => {
                slot.removed = true;
                true
            }
            _ => false,
        }
    }
}
