use super::{ControlFlow, Frame};
use crate::jvm::code::{Insn, InsnIdx, Method};
use crate::jvm::{BinaryName, Error, ErrorKind, FieldType};
use crate::util::Width;
use std::collections::VecDeque;
use std::fmt::Debug;

/// Pluggable value domain for the dataflow engine
///
/// The engine owns the structural side of execution - how many values an
/// instruction pops, where copies go on loads, stores, and the `dup` family.
/// The interpreter owns the values themselves: what each instruction
/// produces, and how two values reconcile when control flow joins.
pub trait Interpreter {
    type Value: Clone + PartialEq + Width + Debug;

    /// Value seeding a local slot from a method parameter (or `this`)
    fn parameter_value(&mut self, ty: &FieldType) -> Self::Value;

    /// Value for a local slot holding nothing usable (unseeded slots, the
    /// second half of a wide value, slots clobbered by a partial overwrite)
    fn empty_value(&mut self) -> Self::Value;

    /// Value sitting alone on the stack at an exception handler entry
    fn exception_value(&mut self, catch_type: Option<&BinaryName>) -> Self::Value;

    /// Value produced by one instruction
    ///
    /// `popped` holds the consumed values in the order they were pushed
    /// (deepest first). Instructions that produce nothing (stores were
    /// already handled by the engine; think `putfield`, branches, returns)
    /// answer `None`, but still get called so a domain can track
    /// instruction-local state.
    fn transfer(
        &mut self,
        method: &Method,
        at: InsnIdx,
        insn: &Insn,
        popped: &[Self::Value],
    ) -> Result<Option<Self::Value>, ErrorKind>;

    /// Join two values at a control flow merge point
    fn merge(&self, a: &Self::Value, b: &Self::Value) -> Self::Value;
}

/// Result of [`analyze`]: the frame *before* each instruction executes
///
/// Keyed by instruction position; instructions the fixpoint never reached
/// (dead code) have no frame.
#[derive(Debug)]
pub struct FrameTable<V> {
    frames: Vec<Option<Frame<V>>>,
}

impl<V> FrameTable<V> {
    /// Frame describing the state just before the given instruction
    pub fn get(&self, idx: InsnIdx) -> Option<&Frame<V>> {
        self.frames.get(idx.0).and_then(|frame| frame.as_ref())
    }
}

/// Run a forward worklist fixpoint over a method
///
/// Seeds the entry block from the method signature, then repeatedly
/// re-executes blocks whose input frame changed, merging output frames into
/// successors (and handler entries, for throwing instructions inside
/// protected ranges) until everything is stable.
///
/// The method itself is never mutated; clients read the returned
/// [`FrameTable`] and decide on rewrites afterwards.
pub fn analyze<I: Interpreter>(
    class: &BinaryName,
    method: &Method,
    interpreter: &mut I,
) -> Result<FrameTable<I::Value>, Error> {
    let fatal = |at: InsnIdx, kind: ErrorKind| {
        let error = Error {
            class: class.clone(),
            method: method.name.clone(),
            at,
            kind,
        };
        log::error!("Analysis aborted: {}", error);
        error
    };

    let cfg = ControlFlow::build(class, method)?;
    let mut frames: Vec<Option<Frame<I::Value>>> = vec![None; method.len()];

    let entry = match cfg.entry() {
        Some(entry) => entry,
        None => return Ok(FrameTable { frames }),
    };

    // Per-block input frames; the entry block starts from the signature
    let mut block_inputs: Vec<Option<Frame<I::Value>>> = vec![None; cfg.blocks().len()];
    block_inputs[entry.0] = Some(entry_frame(method, interpreter));

    let mut worklist: VecDeque<usize> = VecDeque::new();
    let mut queued = vec![false; cfg.blocks().len()];
    worklist.push_back(entry.0);
    queued[entry.0] = true;

    while let Some(block_id) = worklist.pop_front() {
        queued[block_id] = false;
        log::trace!("Executing block b{} of {:?}", block_id, method.name);
        let block = &cfg.blocks()[block_id];
        let mut frame = match &block_inputs[block_id] {
            Some(input) => input.clone(),
            None => continue,
        };

        let mut last_at = block.start;
        for slot in block.start.0..block.end.0 {
            let at = InsnIdx(slot);
            let insn = match method.get(at) {
                Some(insn) => insn,
                None => continue,
            };
            last_at = at;

            // An exception raised by this instruction reaches the handler
            // with the locals as they stand now and only the exception on
            // the stack
            if insn.can_throw() {
                for edge in &block.handlers {
                    let handler_frame = Frame {
                        locals: frame.locals.clone(),
                        stack: vec![interpreter.exception_value(edge.catch_type.as_ref())],
                    };
                    let changed = merge_into(interpreter, &mut block_inputs, edge.block.0, &handler_frame)
                        .map_err(|kind| fatal(at, kind))?;
                    if changed && !queued[edge.block.0] {
                        queued[edge.block.0] = true;
                        worklist.push_back(edge.block.0);
                    }
                }
            }

            frames[slot] = Some(frame.clone());
            step(method, at, insn, &mut frame, interpreter).map_err(|kind| fatal(at, kind))?;
        }

        let successors = cfg.blocks()[block_id].successors.clone();
        for successor in successors {
            let changed = merge_into(interpreter, &mut block_inputs, successor.0, &frame)
                .map_err(|kind| fatal(last_at, kind))?;
            if changed && !queued[successor.0] {
                queued[successor.0] = true;
                worklist.push_back(successor.0);
            }
        }
    }

    Ok(FrameTable { frames })
}

/// Merge a frame into a block's input, reporting whether anything changed
///
/// A block never reached before adopts the frame outright.
fn merge_into<I: Interpreter>(
    interpreter: &I,
    inputs: &mut [Option<Frame<I::Value>>],
    target: usize,
    frame: &Frame<I::Value>,
) -> Result<bool, ErrorKind> {
    match &mut inputs[target] {
        Some(existing) => existing.merge_from(frame, |a, b| interpreter.merge(a, b)),
        empty => {
            *empty = Some(frame.clone());
            Ok(true)
        }
    }
}

/// Entry frame for a method: locals seeded from `this` (for instance
/// methods) and the declared parameters, empty stack
fn entry_frame<I: Interpreter>(method: &Method, interpreter: &mut I) -> Frame<I::Value> {
    let mut locals = vec![];
    if !method.is_static() {
        // The analysis does not model `<init>` specially, so `this` is just
        // an object value even before the superclass constructor runs
        locals.push(interpreter.parameter_value(&FieldType::object(BinaryName::OBJECT)));
    }
    for parameter in &method.descriptor.parameters {
        let value = interpreter.parameter_value(parameter);
        let width = value.width();
        locals.push(value);
        if width == 2 {
            locals.push(interpreter.empty_value());
        }
    }
    for _ in locals.len()..locals_size(method) {
        locals.push(interpreter.empty_value());
    }
    Frame::new(locals)
}

/// Number of local slots the frame needs: enough for the parameters and for
/// every local the code touches
fn locals_size(method: &Method) -> usize {
    let mut size = method.descriptor.parameter_width(!method.is_static());
    for (_, insn) in method.iter() {
        let touched = match insn {
            Insn::ILoad(index)
            | Insn::FLoad(index)
            | Insn::ALoad(index)
            | Insn::IStore(index)
            | Insn::FStore(index)
            | Insn::AStore(index)
            | Insn::IInc(index, _) => *index as usize + 1,
            Insn::LLoad(index)
            | Insn::DLoad(index)
            | Insn::LStore(index)
            | Insn::DStore(index) => *index as usize + 2,
            _ => 0,
        };
        size = size.max(touched);
    }
    size
}

/// Apply one instruction to a frame
///
/// Copies (loads, stores, the `dup` family, `swap`) move cloned values
/// around without consulting the interpreter - a clone carries whatever
/// domain flags the original had. Everything else pops its operands and
/// asks the interpreter what (if anything) gets pushed.
fn step<I: Interpreter>(
    method: &Method,
    at: InsnIdx,
    insn: &Insn,
    frame: &mut Frame<I::Value>,
    interpreter: &mut I,
) -> Result<(), ErrorKind> {
    match insn {
        Insn::ILoad(index)
        | Insn::LLoad(index)
        | Insn::FLoad(index)
        | Insn::DLoad(index)
        | Insn::ALoad(index) => {
            let value = frame.get_local(*index)?.clone();
            frame.push(value);
        }

        Insn::IStore(index)
        | Insn::LStore(index)
        | Insn::FStore(index)
        | Insn::DStore(index)
        | Insn::AStore(index) => {
            let value = frame.pop()?;
            let empty = interpreter.empty_value();
            frame.set_local(*index, value, &empty)?;
        }

        Insn::IInc(index, _) => {
            let _ = frame.get_local(*index)?;
        }

        Insn::Pop => {
            let _ = frame.pop()?;
        }

        Insn::Pop2 => {
            let top = frame.pop()?;
            if top.width() == 1 {
                let _ = frame.pop()?;
            }
        }

        Insn::Dup => {
            let top = frame.pop()?;
            frame.push(top.clone());
            frame.push(top);
        }

        Insn::DupX1 => {
            let first = frame.pop()?;
            let second = frame.pop()?;
            frame.push(first.clone());
            frame.push(second);
            frame.push(first);
        }

        Insn::DupX2 => {
            let first = frame.pop()?;
            let second = frame.pop()?;
            if second.width() == 1 {
                let third = frame.pop()?;
                frame.push(first.clone());
                frame.push(third);
                frame.push(second);
                frame.push(first);
            } else {
                frame.push(first.clone());
                frame.push(second);
                frame.push(first);
            }
        }

        Insn::Dup2 => {
            let first = frame.pop()?;
            if first.width() == 1 {
                let second = frame.pop()?;
                frame.push(second.clone());
                frame.push(first.clone());
                frame.push(second);
                frame.push(first);
            } else {
                frame.push(first.clone());
                frame.push(first);
            }
        }

        Insn::Dup2X1 => {
            let first = frame.pop()?;
            let second = frame.pop()?;
            if first.width() == 1 {
                let third = frame.pop()?;
                frame.push(second.clone());
                frame.push(first.clone());
                frame.push(third);
                frame.push(second);
                frame.push(first);
            } else {
                frame.push(first.clone());
                frame.push(second);
                frame.push(first);
            }
        }

        Insn::Dup2X2 => {
            let first = frame.pop()?;
            if first.width() == 1 {
                let second = frame.pop()?;
                let third = frame.pop()?;
                if third.width() == 1 {
                    let fourth = frame.pop()?;
                    frame.push(second.clone());
                    frame.push(first.clone());
                    frame.push(fourth);
                    frame.push(third);
                    frame.push(second);
                    frame.push(first);
                } else {
                    frame.push(second.clone());
                    frame.push(first.clone());
                    frame.push(third);
                    frame.push(second);
                    frame.push(first);
                }
            } else {
                let second = frame.pop()?;
                frame.push(first.clone());
                frame.push(second);
                frame.push(first);
            }
        }

        Insn::Swap => {
            let first = frame.pop()?;
            let second = frame.pop()?;
            frame.push(first);
            frame.push(second);
        }

        _ => {
            let mut popped = Vec::with_capacity(pop_count(insn));
            for _ in 0..pop_count(insn) {
                popped.push(frame.pop()?);
            }
            popped.reverse();
            if let Some(produced) = interpreter.transfer(method, at, insn, &popped)? {
                frame.push(produced);
            }
        }
    }
    Ok(())
}

/// How many values an instruction consumes off the stack
///
/// Counted in values, not slot widths - a `long` is one value here. The
/// structural instructions handled directly in [`step`] never reach this.
fn pop_count(insn: &Insn) -> usize {
    match insn {
        Insn::Nop
        | Insn::ReifiedMarker
        | Insn::AConstNull
        | Insn::IConst(_)
        | Insn::LConst(_)
        | Insn::FConst(_)
        | Insn::DConst(_)
        | Insn::Ldc(_)
        | Insn::GetStatic(_)
        | Insn::New(_)
        | Insn::Goto(_)
        | Insn::Return => 0,

        Insn::INeg
        | Insn::LNeg
        | Insn::FNeg
        | Insn::DNeg
        | Insn::I2L
        | Insn::I2F
        | Insn::I2D
        | Insn::L2I
        | Insn::L2F
        | Insn::L2D
        | Insn::F2I
        | Insn::F2L
        | Insn::F2D
        | Insn::D2I
        | Insn::D2L
        | Insn::D2F
        | Insn::I2B
        | Insn::I2C
        | Insn::I2S
        | Insn::ArrayLength
        | Insn::CheckCast(_)
        | Insn::InstanceOf(_)
        | Insn::NewArray(_)
        | Insn::ANewArray(_)
        | Insn::GetField(_)
        | Insn::PutStatic(_)
        | Insn::If(_, _)
        | Insn::IfNull(_, _)
        | Insn::TableSwitch { .. }
        | Insn::LookupSwitch { .. }
        | Insn::IReturn
        | Insn::LReturn
        | Insn::FReturn
        | Insn::DReturn
        | Insn::AReturn
        | Insn::AThrow => 1,

        Insn::IAdd
        | Insn::LAdd
        | Insn::FAdd
        | Insn::DAdd
        | Insn::ISub
        | Insn::LSub
        | Insn::FSub
        | Insn::DSub
        | Insn::IMul
        | Insn::LMul
        | Insn::FMul
        | Insn::DMul
        | Insn::IDiv
        | Insn::LDiv
        | Insn::FDiv
        | Insn::DDiv
        | Insn::IRem
        | Insn::LRem
        | Insn::FRem
        | Insn::DRem
        | Insn::ISh(_)
        | Insn::LSh(_)
        | Insn::IAnd
        | Insn::LAnd
        | Insn::IOr
        | Insn::LOr
        | Insn::IXor
        | Insn::LXor
        | Insn::LCmp
        | Insn::FCmp(_)
        | Insn::DCmp(_)
        | Insn::IALoad
        | Insn::LALoad
        | Insn::FALoad
        | Insn::DALoad
        | Insn::AALoad
        | Insn::BALoad
        | Insn::CALoad
        | Insn::SALoad
        | Insn::PutField(_)
        | Insn::IfICmp(_, _)
        | Insn::IfACmp(_, _) => 2,

        Insn::IAStore
        | Insn::LAStore
        | Insn::FAStore
        | Insn::DAStore
        | Insn::AAStore
        | Insn::BAStore
        | Insn::CAStore
        | Insn::SAStore => 3,

        Insn::Invoke(invoke_type, method_ref) => {
            let receiver = if invoke_type.has_receiver() { 1 } else { 0 };
            receiver + method_ref.descriptor.parameters.len()
        }

        Insn::MultiANewArray(_, dimensions) => *dimensions as usize,

        // Structural instructions are handled in `step` before reaching here
        Insn::ILoad(_)
        | Insn::LLoad(_)
        | Insn::FLoad(_)
        | Insn::DLoad(_)
        | Insn::ALoad(_)
        | Insn::IStore(_)
        | Insn::LStore(_)
        | Insn::FStore(_)
        | Insn::DStore(_)
        | Insn::AStore(_)
        | Insn::IInc(_, _)
        | Insn::Pop
        | Insn::Pop2
        | Insn::Dup
        | Insn::DupX1
        | Insn::DupX2
        | Insn::Dup2
        | Insn::Dup2X1
        | Insn::Dup2X2
        | Insn::Swap => 0,
    }
}

/// A value produced right after a marker sentinel counts as reified; some
/// producers look further back than one instruction
pub fn marker_within(method: &Method, at: InsnIdx, distance: usize) -> bool {
    let mut cursor = at;
    for _ in 0..distance {
        cursor = match method.prev(cursor) {
            Some(prev) => prev,
            None => return false,
        };
    }
    method
        .get(cursor)
        .map(Insn::is_reified_marker)
        .unwrap_or(false)
}
