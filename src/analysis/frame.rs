use crate::jvm::ErrorKind;
use crate::util::Width;

/// Abstract machine state at one program point
///
/// One abstract value per JVM slot: wide values (`long`/`double`) sit at
/// their first local slot with a filler value in the second, mirroring how
/// the JVM numbers locals. The stack grows towards the back of the vector,
/// so the top of the stack is the last element.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct Frame<V> {
    /// Local variable slots
    pub locals: Vec<V>,

    /// Values on the operand stack (top last)
    pub stack: Vec<V>,
}

impl<V> Frame<V> {
    /// Frame with the given locals and an empty stack
    pub fn new(locals: Vec<V>) -> Frame<V> {
        Frame {
            locals,
            stack: vec![],
        }
    }

    pub fn push(&mut self, value: V) {
        self.stack.push(value);
    }

    pub fn pop(&mut self) -> Result<V, ErrorKind> {
        self.stack.pop().ok_or(ErrorKind::EmptyStack)
    }

    /// Value at the top of the stack
    pub fn top(&self) -> Option<&V> {
        self.stack.last()
    }

    pub fn get_local(&self, index: u16) -> Result<&V, ErrorKind> {
        self.locals
            .get(index as usize)
            .ok_or(ErrorKind::InvalidLocalIndex(index))
    }
}

impl<V: Clone + Width> Frame<V> {
    /// Store a value into a local slot
    ///
    /// Storing over either half of a wide value invalidates the whole value,
    /// and storing a wide value claims the following slot too; `empty` fills
    /// the slots that stop holding a usable value.
    pub fn set_local(&mut self, index: u16, value: V, empty: &V) -> Result<(), ErrorKind> {
        let index = index as usize;
        let extra = value.width() - 1;
        if index + extra >= self.locals.len() {
            return Err(ErrorKind::InvalidLocalIndex(index as u16));
        }

        if index > 0 && self.locals[index - 1].width() == 2 {
            self.locals[index - 1] = empty.clone();
        }
        if extra == 1 {
            self.locals[index + 1] = empty.clone();
        } else if self.locals[index].width() == 2 && index + 1 < self.locals.len() {
            self.locals[index + 1] = empty.clone();
        }
        self.locals[index] = value;
        Ok(())
    }
}

impl<V: Clone + PartialEq> Frame<V> {
    /// Merge another frame into this one, slot by slot
    ///
    /// Returns whether anything in this frame changed. The two frames must
    /// agree on stack depth and locals size - a mismatch means the upstream
    /// stage produced inconsistent code and the analysis must abort.
    pub fn merge_from(
        &mut self,
        other: &Frame<V>,
        mut merge: impl FnMut(&V, &V) -> V,
    ) -> Result<bool, ErrorKind> {
        if self.stack.len() != other.stack.len() {
            return Err(ErrorKind::StackDepthMismatch {
                expected: self.stack.len(),
                found: other.stack.len(),
            });
        }
        if self.locals.len() != other.locals.len() {
            return Err(ErrorKind::LocalsSizeMismatch {
                expected: self.locals.len(),
                found: other.locals.len(),
            });
        }

        let mut changed = false;
        for (mine, theirs) in self
            .locals
            .iter_mut()
            .chain(self.stack.iter_mut())
            .zip(other.locals.iter().chain(other.stack.iter()))
        {
            let merged = merge(mine, theirs);
            if merged != *mine {
                *mine = merged;
                changed = true;
            }
        }
        Ok(changed)
    }
}
