use crate::analysis::{marker_within, Interpreter};
use crate::jvm::code::{Constant, Insn, InsnIdx, Method};
use crate::jvm::{BaseType, BinaryName, ErrorKind, FieldType, RefType};
use crate::util::Width;
use std::mem;

/// Type half of the value domain
///
/// Types are compared for exact equality only. [`AbstractType::Top`] is the
/// result of merging two different types; anything could be there at
/// runtime, so no claim about it survives.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum AbstractType {
    /// Unknown or conflicting type
    Top,
    Int,
    Float,
    Long,
    Double,
    /// The `null` reference (the static type of `aconst_null`)
    Null,
    Ref(RefType),
}

impl AbstractType {
    /// Abstract type of a declared field, parameter, or return type
    ///
    /// Sub-`int` primitives all collapse to `Int`, the way the operand
    /// stack treats them.
    pub fn of(field_type: &FieldType) -> AbstractType {
        match field_type {
            FieldType::Base(base) => match base {
                BaseType::Byte
                | BaseType::Char
                | BaseType::Int
                | BaseType::Short
                | BaseType::Boolean => AbstractType::Int,
                BaseType::Float => AbstractType::Float,
                BaseType::Long => AbstractType::Long,
                BaseType::Double => AbstractType::Double,
            },
            FieldType::Ref(ref_type) => AbstractType::Ref(ref_type.clone()),
        }
    }

    /// Can a value of this type hold a reference?
    pub fn is_reference(&self) -> bool {
        matches!(self, AbstractType::Null | AbstractType::Ref(_))
    }
}

/// One abstract stack or local value: a type plus a provenance flag
///
/// `reified` records that the value was produced under a reification marker
/// on every path reaching this program point. Instructions that would
/// recover a runtime type from such a value must not be optimized away.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct TypedValue {
    pub ty: AbstractType,
    pub reified: bool,
}

impl TypedValue {
    pub fn of(ty: AbstractType) -> TypedValue {
        TypedValue { ty, reified: false }
    }
}

impl Width for TypedValue {
    fn width(&self) -> usize {
        match self.ty {
            AbstractType::Long | AbstractType::Double => 2,
            _ => 1,
        }
    }
}

/// Value domain tracking static types and reification provenance
///
/// One instance is scoped to one method's analysis. The `pending` flag is
/// the look-back state: a producer notices a marker behind it (or a special
/// case below sets the flag directly) and the flag is consumed by the next
/// value actually synthesized. Producers that push nothing leave it set,
/// which errs toward keeping casts.
#[derive(Default)]
pub struct ReificationInterpreter {
    pending: bool,
}

impl Interpreter for ReificationInterpreter {
    type Value = TypedValue;

    fn parameter_value(&mut self, ty: &FieldType) -> TypedValue {
        TypedValue::of(AbstractType::of(ty))
    }

    fn empty_value(&mut self) -> TypedValue {
        TypedValue::of(AbstractType::Top)
    }

    fn exception_value(&mut self, catch_type: Option<&BinaryName>) -> TypedValue {
        let class = catch_type.cloned().unwrap_or(BinaryName::THROWABLE);
        TypedValue::of(AbstractType::Ref(RefType::Object(class)))
    }

    fn transfer(
        &mut self,
        method: &Method,
        at: InsnIdx,
        insn: &Insn,
        popped: &[TypedValue],
    ) -> Result<Option<TypedValue>, ErrorKind> {
        match insn {
            // The flag survives a cast: checking a reified value's type
            // does not erase where it came from
            Insn::CheckCast(_) => {
                if popped.first().map(|value| value.reified).unwrap_or(false) {
                    self.pending = true;
                }
            }

            // Allocating an enum array sits one length computation after
            // its marker, so look back two instructions
            Insn::ANewArray(RefType::Object(class)) if *class == BinaryName::ENUM => {
                if marker_within(method, at, 2) {
                    self.pending = true;
                }
            }

            // The enum lookup call has its class and name arguments pushed
            // between the marker and the call itself
            Insn::Invoke(_, method_ref) if method_ref.is_enum_value_of() => {
                if marker_within(method, at, 3) {
                    self.pending = true;
                }
            }

            _ => {}
        }

        // Default look-back: whatever comes right after a marker is the
        // guarded operation
        if marker_within(method, at, 1) {
            self.pending = true;
        }

        Ok(produced_type(insn, popped)?.map(|ty| {
            let pending = mem::replace(&mut self.pending, false);
            let reified = pending && ty.is_reference();
            TypedValue { ty, reified }
        }))
    }

    fn merge(&self, a: &TypedValue, b: &TypedValue) -> TypedValue {
        TypedValue {
            ty: if a.ty == b.ty {
                a.ty.clone()
            } else {
                AbstractType::Top
            },
            reified: a.reified && b.reified,
        }
    }
}

/// Static type of the value an instruction pushes, if any
fn produced_type(insn: &Insn, popped: &[TypedValue]) -> Result<Option<AbstractType>, ErrorKind> {
    let ty = match insn {
        Insn::AConstNull => AbstractType::Null,
        Insn::IConst(_) => AbstractType::Int,
        Insn::LConst(_) => AbstractType::Long,
        Insn::FConst(_) => AbstractType::Float,
        Insn::DConst(_) => AbstractType::Double,
        Insn::Ldc(Constant::String(_)) => {
            AbstractType::Ref(RefType::Object(BinaryName::STRING))
        }
        Insn::Ldc(Constant::Class(_)) => AbstractType::Ref(RefType::Object(BinaryName::CLASS)),

        Insn::IALoad | Insn::BALoad | Insn::CALoad | Insn::SALoad => AbstractType::Int,
        Insn::LALoad => AbstractType::Long,
        Insn::FALoad => AbstractType::Float,
        Insn::DALoad => AbstractType::Double,
        Insn::AALoad => match popped.first().map(|value| &value.ty) {
            Some(AbstractType::Ref(array)) => match array.element_type() {
                Some(FieldType::Ref(element)) => AbstractType::Ref(element),
                _ => return Err(ErrorKind::InvalidType),
            },
            // Indexing `null` faults at runtime; indexing an unknown type
            // yields an unknown element
            Some(AbstractType::Null) | Some(AbstractType::Top) => AbstractType::Top,
            _ => return Err(ErrorKind::InvalidType),
        },

        Insn::IAdd
        | Insn::ISub
        | Insn::IMul
        | Insn::IDiv
        | Insn::IRem
        | Insn::INeg
        | Insn::ISh(_)
        | Insn::IAnd
        | Insn::IOr
        | Insn::IXor
        | Insn::I2B
        | Insn::I2C
        | Insn::I2S
        | Insn::L2I
        | Insn::F2I
        | Insn::D2I
        | Insn::LCmp
        | Insn::FCmp(_)
        | Insn::DCmp(_)
        | Insn::ArrayLength
        | Insn::InstanceOf(_) => AbstractType::Int,

        Insn::LAdd
        | Insn::LSub
        | Insn::LMul
        | Insn::LDiv
        | Insn::LRem
        | Insn::LNeg
        | Insn::LSh(_)
        | Insn::LAnd
        | Insn::LOr
        | Insn::LXor
        | Insn::I2L
        | Insn::F2L
        | Insn::D2L => AbstractType::Long,

        Insn::FAdd
        | Insn::FSub
        | Insn::FMul
        | Insn::FDiv
        | Insn::FRem
        | Insn::FNeg
        | Insn::I2F
        | Insn::L2F
        | Insn::D2F => AbstractType::Float,

        Insn::DAdd
        | Insn::DSub
        | Insn::DMul
        | Insn::DDiv
        | Insn::DRem
        | Insn::DNeg
        | Insn::I2D
        | Insn::L2D
        | Insn::F2D => AbstractType::Double,

        Insn::GetStatic(field) | Insn::GetField(field) => AbstractType::of(&field.descriptor),
        Insn::Invoke(_, method_ref) => match &method_ref.descriptor.return_type {
            Some(return_type) => AbstractType::of(return_type),
            None => return Ok(None),
        },

        Insn::New(class) => AbstractType::Ref(RefType::Object(class.clone())),
        Insn::NewArray(base) => {
            AbstractType::Ref(RefType::array(FieldType::Base(*base)))
        }
        Insn::ANewArray(element) => {
            AbstractType::Ref(RefType::array(FieldType::Ref(element.clone())))
        }
        Insn::MultiANewArray(array, _) => AbstractType::Ref(array.clone()),
        Insn::CheckCast(target) => AbstractType::Ref(target.clone()),

        _ => return Ok(None),
    };
    Ok(Some(ty))
}
