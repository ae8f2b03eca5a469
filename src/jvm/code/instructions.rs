//! The instruction set is a practical subset of JVM bytecode, represented
//! slightly differently from the usual opcode listing to cut down on
//! repetitive pattern matches:
//!
//!   - Families of opcodes that differ only in an immediate are merged into
//!     one variant with a field (`iconst_<n>`/`bipush`/`sipush` all become
//!     [`Insn::IConst`], the six `if<cond>` opcodes become [`Insn::If`], the
//!     `wide` prefix never shows up, and so on)
//!
//!   - Branching instructions carry the [`InsnIdx`] of their target rather
//!     than a byte offset
//!
//!   - [`Insn::ReifiedMarker`] stands for the sentinel call the frontend
//!     inserts immediately before operations whose value derives from a
//!     generic type parameter; it has no stack effect of its own

use super::InsnIdx;
use crate::jvm::{
    BaseType, BinaryName, FieldType, MethodDescriptor, RefType, UnqualifiedName,
};
use std::ops::Not;

/// JVM bytecode instruction
#[derive(Clone, Debug, PartialEq)]
pub enum Insn {
    Nop,

    // Constants
    AConstNull,
    IConst(i32), // covers `iconst_{m1,0,..,5}`, `bipush`, and `sipush`
    LConst(i64), // covers `lconst_{0,1}` and `ldc2_w` of a long
    FConst(f32), // covers `fconst_{0,1,2}` and `ldc` of a float
    DConst(f64), // covers `dconst_{0,1}` and `ldc2_w` of a double
    Ldc(Constant),

    // Local variable loads and stores
    ILoad(u16), // covers `iload`, `iload_{0,3}`, and `wide iload`
    LLoad(u16),
    FLoad(u16),
    DLoad(u16),
    ALoad(u16),
    IStore(u16), // covers `istore`, `istore_{0,3}`, and `wide istore`
    LStore(u16),
    FStore(u16),
    DStore(u16),
    AStore(u16),
    IInc(u16, i16), // covers `iinc` and `wide iinc`

    // Array loads and stores
    IALoad,
    LALoad,
    FALoad,
    DALoad,
    AALoad,
    BALoad,
    CALoad,
    SALoad,
    IAStore,
    LAStore,
    FAStore,
    DAStore,
    AAStore,
    BAStore,
    CAStore,
    SAStore,

    // Stack shuffling
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,

    // Arithmetic and logic
    IAdd,
    LAdd,
    FAdd,
    DAdd,
    ISub,
    LSub,
    FSub,
    DSub,
    IMul,
    LMul,
    FMul,
    DMul,
    IDiv,
    LDiv,
    FDiv,
    DDiv,
    IRem,
    LRem,
    FRem,
    DRem,
    INeg,
    LNeg,
    FNeg,
    DNeg,
    ISh(ShiftType), // covers `ishl`, `ishr`, and `iushr`
    LSh(ShiftType),
    IAnd,
    LAnd,
    IOr,
    LOr,
    IXor,
    LXor,

    // Conversions
    I2L,
    I2F,
    I2D,
    L2I,
    L2F,
    L2D,
    F2I,
    F2L,
    F2D,
    D2I,
    D2L,
    D2F,
    I2B,
    I2C,
    I2S,

    // Comparisons
    LCmp,
    FCmp(CompareMode), // covers `fcmpl` and `fcmpg`
    DCmp(CompareMode), // covers `dcmpl` and `dcmpg`

    // Fields and calls
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),
    Invoke(InvokeType, MethodRef),

    // Objects and arrays
    New(BinaryName),
    NewArray(BaseType),
    ANewArray(RefType), // operand is the *element* type
    MultiANewArray(RefType, u8),
    ArrayLength,
    CheckCast(RefType),
    InstanceOf(RefType),

    /// Sentinel inserted by the frontend before operations on values derived
    /// from reified type parameters; downstream tooling recovers the runtime
    /// type from it, so passes must keep instructions it guards intact
    ReifiedMarker,

    // Branches
    If(OrdComparison, InsnIdx), // covers `ifeq`, `ifne`, `iflt`, `ifge`, `ifgt`, `ifle`
    IfICmp(OrdComparison, InsnIdx), // covers `if_icmpeq`, ..., `if_icmple`
    IfACmp(EqComparison, InsnIdx), // covers `if_acmpeq`, `if_acmpne`
    IfNull(EqComparison, InsnIdx), // covers `ifnull`, `ifnonnull`
    Goto(InsnIdx),               // covers `goto` and `goto_w`
    TableSwitch {
        /// Value associated with the first jump target
        low: i32,

        /// Jump target if the argument is less than `low` or greater than
        /// `low + targets.len()`
        default: InsnIdx,

        /// Jump targets
        targets: Vec<InsnIdx>,
    },
    LookupSwitch {
        /// Jump target if there is no matching key
        default: InsnIdx,

        /// Jump targets, keyed by match value
        targets: Vec<(i32, InsnIdx)>,
    },

    // Returns and throws
    IReturn,
    LReturn,
    FReturn,
    DReturn,
    AReturn,
    Return,
    AThrow,
}

impl Insn {
    /// Is this instruction the reification marker sentinel?
    pub fn is_reified_marker(&self) -> bool {
        matches!(self, Insn::ReifiedMarker)
    }

    /// Does this instruction end a basic block?
    ///
    /// This covers branches, switches, returns, and `athrow` - everything
    /// after which control does not implicitly continue to the next
    /// instruction on every path.
    pub fn ends_block(&self) -> bool {
        !self.jump_targets().is_empty() || !self.falls_through()
    }

    /// Can control continue to the instruction that follows this one?
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Insn::Goto(_)
                | Insn::TableSwitch { .. }
                | Insn::LookupSwitch { .. }
                | Insn::IReturn
                | Insn::LReturn
                | Insn::FReturn
                | Insn::DReturn
                | Insn::AReturn
                | Insn::Return
                | Insn::AThrow
        )
    }

    /// Explicit jump targets of this instruction (not including fall-through)
    pub fn jump_targets(&self) -> Vec<InsnIdx> {
        match self {
            Insn::If(_, target)
            | Insn::IfICmp(_, target)
            | Insn::IfACmp(_, target)
            | Insn::IfNull(_, target)
            | Insn::Goto(target) => vec![*target],
            Insn::TableSwitch {
                default, targets, ..
            } => {
                let mut all = Vec::with_capacity(targets.len() + 1);
                all.push(*default);
                all.extend(targets.iter().copied());
                all
            }
            Insn::LookupSwitch { default, targets } => {
                let mut all = Vec::with_capacity(targets.len() + 1);
                all.push(*default);
                all.extend(targets.iter().map(|(_, target)| *target));
                all
            }
            _ => vec![],
        }
    }

    /// Can executing this instruction raise a runtime fault?
    ///
    /// Used when reconstructing control flow: any instruction in a protected
    /// range for which this holds gets an edge into the handler.
    pub fn can_throw(&self) -> bool {
        matches!(
            self,
            // Resolving a class constant can raise a linkage fault
            Insn::Ldc(Constant::Class(_))
                | Insn::IALoad
                | Insn::LALoad
                | Insn::FALoad
                | Insn::DALoad
                | Insn::AALoad
                | Insn::BALoad
                | Insn::CALoad
                | Insn::SALoad
                | Insn::IAStore
                | Insn::LAStore
                | Insn::FAStore
                | Insn::DAStore
                | Insn::AAStore
                | Insn::BAStore
                | Insn::CAStore
                | Insn::SAStore
                | Insn::IDiv
                | Insn::LDiv
                | Insn::IRem
                | Insn::LRem
                | Insn::GetStatic(_)
                | Insn::PutStatic(_)
                | Insn::GetField(_)
                | Insn::PutField(_)
                | Insn::Invoke(_, _)
                | Insn::New(_)
                | Insn::NewArray(_)
                | Insn::ANewArray(_)
                | Insn::MultiANewArray(_, _)
                | Insn::ArrayLength
                | Insn::CheckCast(_)
                | Insn::AThrow
        )
    }
}

/// Loadable constant (the `ldc` family, minus the numeric cases that are
/// already covered by the merged `const` variants)
#[derive(Clone, Debug, PartialEq)]
pub enum Constant {
    String(String),
    Class(RefType),
}

/// Reference to a field
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: FieldType,
}

/// Reference to a method
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub class: BinaryName,
    pub name: UnqualifiedName,
    pub descriptor: MethodDescriptor,
}

impl MethodRef {
    /// Is this the reserved enum-lookup operation `java/lang/Enum.valueOf`?
    pub fn is_enum_value_of(&self) -> bool {
        self.class == BinaryName::ENUM && self.name == UnqualifiedName::VALUEOF
    }
}

/// Kind of method call
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum InvokeType {
    Virtual,
    Special,
    Static,
    Interface,
}

impl InvokeType {
    /// Does the call pop a receiver off the stack?
    pub fn has_receiver(&self) -> bool {
        !matches!(self, InvokeType::Static)
    }
}

/// Shift types for `int` and `long` shifts
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum ShiftType {
    Left,
    LogicalRight,
    ArithmeticRight,
}

/// Comparison modes for floating point
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum CompareMode {
    /// -1 on NaN
    L,

    /// 1 on NaN
    G,
}

/// Binary comparison operators available for `int` branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum OrdComparison {
    EQ,
    GE,
    GT,
    LE,
    LT,
    NE,
}

impl Not for OrdComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            OrdComparison::EQ => OrdComparison::NE,
            OrdComparison::GE => OrdComparison::LT,
            OrdComparison::GT => OrdComparison::LE,
            OrdComparison::LE => OrdComparison::GT,
            OrdComparison::LT => OrdComparison::GE,
            OrdComparison::NE => OrdComparison::EQ,
        }
    }
}

/// Equality comparison operators available for reference branches
#[derive(Copy, Clone, Eq, PartialEq, Debug, Hash)]
pub enum EqComparison {
    EQ,
    NE,
}

impl Not for EqComparison {
    type Output = Self;

    fn not(self) -> Self::Output {
        match self {
            EqComparison::EQ => EqComparison::NE,
            EqComparison::NE => EqComparison::EQ,
        }
    }
}
