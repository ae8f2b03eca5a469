use super::{AbstractType, MethodTransformer, ReificationInterpreter};
use crate::analysis::analyze;
use crate::jvm::code::{Insn, Method};
use crate::jvm::{BinaryName, Error, Name};

/// Removes `checkcast` instructions that cannot fail or inform anything
///
/// A cast is removable only when the analysis proves the consumed value
/// already has *exactly* the target type. Exact equality (never mere
/// assignability) keeps the pass trivially sound: the removed instruction
/// could neither throw nor narrow anything.
///
/// Even an exact-type cast is kept when it serves a secondary purpose:
///
///   - it sits right after a reification marker, or consumes a value the
///     analysis flagged as reified - downstream tooling recovers a runtime
///     type from the cast itself
///   - its target is a multi-dimensional array type, which some downstream
///     consumers cannot tell apart from other encodings of "array of
///     objects" without the cast as a hint
///
/// Eligibility is decided entirely against the frames of the untouched
/// method; removals happen in one batch afterwards, so an error during
/// analysis never leaves the method half rewritten. Running the pass a
/// second time removes nothing new.
pub struct RedundantCheckCastElimination;

impl MethodTransformer for RedundantCheckCastElimination {
    fn transform(&self, class: &BinaryName, method: &mut Method) -> Result<(), Error> {
        // Methods without a cast skip the whole fixpoint
        if !method
            .iter()
            .any(|(_, insn)| matches!(insn, Insn::CheckCast(_)))
        {
            return Ok(());
        }

        let mut interpreter = ReificationInterpreter::default();
        let frames = analyze(class, method, &mut interpreter)?;

        let mut removable = vec![];
        for (at, insn) in method.iter() {
            let target = match insn {
                Insn::CheckCast(target) => target,
                _ => continue,
            };

            let marker_before = method
                .prev(at)
                .and_then(|prev| method.get(prev))
                .map(Insn::is_reified_marker)
                .unwrap_or(false);
            if marker_before {
                continue;
            }

            // Unreachable casts have no frame; leave them for dead code
            // elimination to deal with
            let value = match frames.get(at).and_then(|frame| frame.top()) {
                Some(value) => value,
                None => continue,
            };

            if value.reified {
                continue;
            }
            match &value.ty {
                AbstractType::Ref(found) if found == target => {}
                _ => continue,
            }
            if target.dimensions() > 1 {
                continue;
            }

            removable.push(at);
        }

        if !removable.is_empty() {
            log::debug!(
                "Removing {} redundant cast(s) in {}.{}",
                removable.len(),
                class.as_str(),
                method.name.as_str(),
            );
        }
        for at in removable {
            log::trace!("Removing checkcast at {:?}", at);
            method.remove(at);
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{ExceptionHandler, InsnIdx, InvokeType, MethodRef, OrdComparison};
    use crate::jvm::{
        ErrorKind, MethodAccessFlags, MethodDescriptor, ParseDescriptor, RefType, UnqualifiedName,
    };

    fn class() -> BinaryName {
        BinaryName::from_string("com/example/Host".to_string()).unwrap()
    }

    fn name(source: &str) -> BinaryName {
        BinaryName::from_string(source.to_string()).unwrap()
    }

    fn static_method(descriptor: &str) -> Method {
        Method::new(
            UnqualifiedName::from_string("subject".to_string()).unwrap(),
            MethodDescriptor::parse(descriptor).unwrap(),
            MethodAccessFlags::STATIC,
        )
    }

    fn run(method: &mut Method) -> Result<(), Error> {
        RedundantCheckCastElimination.transform(&class(), method)
    }

    fn live(method: &Method) -> Vec<Insn> {
        method.iter().map(|(_, insn)| insn.clone()).collect()
    }

    #[test]
    fn exact_type_cast_is_removed() {
        let foo = name("com/example/Foo");
        let mut method = static_method("()Ljava/lang/Object;");
        method.push(Insn::New(foo.clone()));
        method.push(Insn::CheckCast(RefType::Object(foo.clone())));
        method.push(Insn::AReturn);

        run(&mut method).unwrap();
        assert_eq!(live(&method), vec![Insn::New(foo), Insn::AReturn]);
    }

    #[test]
    fn cast_after_marker_survives() {
        // The value is produced under a marker, so the cast doubles as the
        // runtime-type breadcrumb and must stay
        let foo = name("com/example/Foo");
        let boxer = MethodRef {
            class: foo.clone(),
            name: UnqualifiedName::VALUEOF,
            descriptor: MethodDescriptor::parse("(I)Lcom/example/Foo;").unwrap(),
        };

        let mut method = static_method("(I)Ljava/lang/Object;");
        method.push(Insn::ILoad(0));
        method.push(Insn::ReifiedMarker);
        method.push(Insn::Invoke(InvokeType::Static, boxer));
        method.push(Insn::CheckCast(RefType::Object(foo)));
        method.push(Insn::AReturn);

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }

    #[test]
    fn cast_directly_preceded_by_marker_survives() {
        let foo = name("com/example/Foo");
        let mut method = static_method("()Ljava/lang/Object;");
        method.push(Insn::New(foo.clone()));
        method.push(Insn::ReifiedMarker);
        method.push(Insn::CheckCast(RefType::Object(foo)));
        method.push(Insn::AReturn);

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }

    #[test]
    fn widening_cast_survives() {
        let mut method = static_method("()Ljava/lang/Object;");
        method.push(Insn::New(BinaryName::OBJECT));
        method.push(Insn::CheckCast(RefType::Object(name("com/example/Foo"))));
        method.push(Insn::AReturn);

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }

    #[test]
    fn multi_dimensional_array_cast_survives() {
        let objects = RefType::parse("[[Ljava/lang/Object;").unwrap();
        let mut method = static_method("()Ljava/lang/Object;");
        method.push(Insn::IConst(3));
        method.push(Insn::IConst(4));
        method.push(Insn::MultiANewArray(objects.clone(), 2));
        method.push(Insn::CheckCast(objects));
        method.push(Insn::AReturn);

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }

    #[test]
    fn merged_type_is_not_exact() {
        // if (x) v = new Foo else v = new Bar; checkcast Foo  -- the merge
        // point only knows "some reference", so the cast stays
        let foo = name("com/example/Foo");
        let mut method = static_method("(I)Ljava/lang/Object;");
        method.push(Insn::ILoad(0)); // i0
        method.push(Insn::If(OrdComparison::EQ, InsnIdx(4))); // i1
        method.push(Insn::New(foo.clone())); // i2
        method.push(Insn::Goto(InsnIdx(5))); // i3
        method.push(Insn::New(name("com/example/Bar"))); // i4
        method.push(Insn::CheckCast(RefType::Object(foo))); // i5
        method.push(Insn::AReturn); // i6

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }

    #[test]
    fn exact_merge_is_still_removed() {
        // Both paths produce a Foo, so the join keeps the exact type
        let foo = name("com/example/Foo");
        let mut method = static_method("(I)Ljava/lang/Object;");
        method.push(Insn::ILoad(0)); // i0
        method.push(Insn::If(OrdComparison::EQ, InsnIdx(4))); // i1
        method.push(Insn::New(foo.clone())); // i2
        method.push(Insn::Goto(InsnIdx(5))); // i3
        method.push(Insn::New(foo.clone())); // i4
        method.push(Insn::CheckCast(RefType::Object(foo))); // i5
        method.push(Insn::AReturn); // i6

        run(&mut method).unwrap();
        assert_eq!(method.live_len(), 6);
        assert!(!live(&method)
            .iter()
            .any(|insn| matches!(insn, Insn::CheckCast(_))));
    }

    #[test]
    fn reified_flag_needs_every_path() {
        // Only one of the two joining paths is marked, so the joined value
        // is not reified and the exact-type cast goes away
        let foo = name("com/example/Foo");
        let mut method = static_method("(I)Ljava/lang/Object;");
        method.push(Insn::ILoad(0)); // i0
        method.push(Insn::If(OrdComparison::EQ, InsnIdx(5))); // i1
        method.push(Insn::ReifiedMarker); // i2
        method.push(Insn::New(foo.clone())); // i3
        method.push(Insn::Goto(InsnIdx(6))); // i4
        method.push(Insn::New(foo.clone())); // i5
        method.push(Insn::CheckCast(RefType::Object(foo))); // i6
        method.push(Insn::AReturn); // i7

        run(&mut method).unwrap();
        assert!(!live(&method)
            .iter()
            .any(|insn| matches!(insn, Insn::CheckCast(_))));
    }

    #[test]
    fn second_run_changes_nothing() {
        let foo = name("com/example/Foo");
        let mut method = static_method("()Ljava/lang/Object;");
        method.push(Insn::New(foo.clone()));
        method.push(Insn::CheckCast(RefType::Object(foo.clone())));
        method.push(Insn::New(BinaryName::OBJECT));
        method.push(Insn::Pop);
        method.push(Insn::CheckCast(RefType::Object(foo)));
        method.push(Insn::AReturn);

        run(&mut method).unwrap();
        let after_first = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), after_first);
    }

    #[test]
    fn method_without_cast_skips_analysis() {
        // The branch target is out of bounds, which analysis reports as
        // fatal, but the fast exit means it is never looked at
        let mut method = static_method("(I)V");
        method.push(Insn::ILoad(0));
        method.push(Insn::If(OrdComparison::EQ, InsnIdx(99)));
        method.push(Insn::Return);

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }

    #[test]
    fn malformed_method_is_left_untouched() {
        let foo = name("com/example/Foo");
        let mut method = static_method("()Ljava/lang/Object;");
        method.push(Insn::New(foo.clone()));
        method.push(Insn::CheckCast(RefType::Object(foo.clone())));
        method.push(Insn::Goto(InsnIdx(99)));

        let before = live(&method);
        let err = run(&mut method).unwrap_err();
        assert_eq!(err.kind, ErrorKind::BranchTargetOutOfBounds(InsnIdx(99)));
        assert_eq!(live(&method), before);
    }

    #[test]
    fn cast_inside_protected_range_uses_handler_frames() {
        // try { v = new Foo } catch (Throwable t) { v = t }; the handler
        // path makes the value Throwable, so a cast to Foo after the join
        // must stay even though the happy path matches exactly
        let foo = name("com/example/Foo");
        let mut method = static_method("()Ljava/lang/Object;");
        method.push(Insn::New(foo.clone())); // i0
        method.push(Insn::AStore(0)); // i1
        method.push(Insn::Goto(InsnIdx(4))); // i2
        method.push(Insn::AStore(0)); // i3 (handler)
        method.push(Insn::ALoad(0)); // i4
        method.push(Insn::CheckCast(RefType::Object(foo))); // i5
        method.push(Insn::AReturn); // i6
        method.add_handler(ExceptionHandler {
            start: InsnIdx(0),
            end: InsnIdx(2),
            handler: InsnIdx(3),
            catch_type: Some(BinaryName::THROWABLE),
        });

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }

    #[test]
    fn class_constant_fault_path_reaches_handler() {
        // try { v = new Bar; ldc X.class } catch (any e) { checkcast Foo v }
        // with a Foo parameter in local 0: the ldc can fault *after* the
        // store clobbered the local, so the handler must see Bar (merged to
        // top with the pre-store Foo) and the cast has to stay
        let foo = name("com/example/Foo");
        let mut method = static_method("(Lcom/example/Foo;)Ljava/lang/Object;");
        method.push(Insn::New(name("com/example/Bar"))); // i0
        method.push(Insn::AStore(0)); // i1
        method.push(Insn::Ldc(crate::jvm::code::Constant::Class(
            RefType::Object(name("com/example/X")),
        ))); // i2
        method.push(Insn::Pop); // i3
        method.push(Insn::ALoad(0)); // i4
        method.push(Insn::AReturn); // i5
        method.push(Insn::AStore(1)); // i6 (handler)
        method.push(Insn::ALoad(0)); // i7
        method.push(Insn::CheckCast(RefType::Object(foo))); // i8
        method.push(Insn::AReturn); // i9
        method.add_handler(ExceptionHandler {
            start: InsnIdx(0),
            end: InsnIdx(3),
            handler: InsnIdx(6),
            catch_type: None,
        });

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }

    #[test]
    fn enum_lookup_result_cast_survives() {
        let color = name("com/example/Color");
        let value_of = MethodRef {
            class: BinaryName::ENUM,
            name: UnqualifiedName::VALUEOF,
            descriptor: MethodDescriptor::parse(
                "(Ljava/lang/Class;Ljava/lang/String;)Ljava/lang/Enum;",
            )
            .unwrap(),
        };

        let mut method = static_method("()Ljava/lang/Object;");
        method.push(Insn::ReifiedMarker);
        method.push(Insn::Ldc(crate::jvm::code::Constant::Class(RefType::Object(
            color.clone(),
        ))));
        method.push(Insn::Ldc(crate::jvm::code::Constant::String(
            "RED".to_string(),
        )));
        method.push(Insn::Invoke(InvokeType::Static, value_of));
        method.push(Insn::CheckCast(RefType::Object(color)));
        method.push(Insn::AReturn);

        let before = live(&method);
        run(&mut method).unwrap();
        assert_eq!(live(&method), before);
    }
}
