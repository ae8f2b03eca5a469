use crate::jvm::code::{InsnIdx, Method};
use crate::jvm::{BinaryName, Error, ErrorKind};
use std::collections::BTreeSet;

/// Identifier of a basic block inside a [`ControlFlow`]
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct BlockId(pub usize);

impl std::fmt::Debug for BlockId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("b{}", self.0))
    }
}

/// Edge from inside a protected range into its exception handler
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HandlerEdge {
    /// Block at the handler entry point
    pub block: BlockId,

    /// Class of exceptions the handler catches (`None` catches everything)
    pub catch_type: Option<BinaryName>,
}

/// A maximal run of instructions with a single entry and no internal jump
/// targets
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BasicBlock {
    /// First instruction of the block
    pub start: InsnIdx,

    /// Past-the-end instruction of the block
    pub end: InsnIdx,

    /// Blocks control can transfer to when the block exits normally
    /// (fall-through and jump targets alike)
    pub successors: Vec<BlockId>,

    /// Handlers reachable from this block's throwing instructions
    ///
    /// These are not ordinary successors: the edge is taken from *each*
    /// throwing instruction inside the block, with whatever locals that
    /// instruction sees and a stack holding only the exception.
    pub handlers: Vec<HandlerEdge>,
}

/// Basic blocks and edges, reconstructed from a linear instruction sequence
///
/// Derived fresh per pass invocation and never stored on the method. Block
/// boundaries sit at jump targets, at instructions following a block-ending
/// instruction, at exception handler entries, and at protected range
/// boundaries (so that each block lies entirely inside or outside each
/// protected range).
#[derive(Debug)]
pub struct ControlFlow {
    blocks: Vec<BasicBlock>,
    block_index: Vec<Option<BlockId>>,
}

impl ControlFlow {
    /// Reconstruct the control flow graph of a method
    ///
    /// Fails if any branch or handler names a position outside the
    /// instruction sequence - that is a malformed method, not something to
    /// skip over silently.
    pub fn build(class: &BinaryName, method: &Method) -> Result<ControlFlow, Error> {
        let err = |at: InsnIdx, kind: ErrorKind| {
            let error = Error {
                class: class.clone(),
                method: method.name.clone(),
                at,
                kind,
            };
            log::error!("Malformed method: {}", error);
            error
        };

        // Validate all control transfer targets before anything else
        for (idx, insn) in method.iter() {
            for target in insn.jump_targets() {
                if !method.in_bounds(target) {
                    return Err(err(idx, ErrorKind::BranchTargetOutOfBounds(target)));
                }
            }
        }
        for handler in &method.handlers {
            for position in [handler.start, handler.handler] {
                if !method.in_bounds(position) {
                    return Err(err(position, ErrorKind::HandlerOutOfBounds(position)));
                }
            }
            if handler.end.0 > method.len() {
                return Err(err(handler.end, ErrorKind::HandlerOutOfBounds(handler.end)));
            }
        }

        // Block leaders
        let mut leaders: BTreeSet<InsnIdx> = BTreeSet::new();
        if let Some(entry) = method.resolve(InsnIdx(0)) {
            leaders.insert(entry);
        }
        for (idx, insn) in method.iter() {
            for target in insn.jump_targets() {
                leaders.extend(method.resolve(target));
            }
            if insn.ends_block() {
                leaders.extend(method.next(idx));
            }
        }
        for handler in &method.handlers {
            leaders.extend(method.resolve(handler.handler));
            leaders.extend(method.resolve(handler.start));
            if handler.end.0 < method.len() {
                leaders.extend(method.resolve(handler.end));
            }
        }

        // Carve the instruction sequence into blocks
        let mut blocks: Vec<BasicBlock> = vec![];
        let mut block_index: Vec<Option<BlockId>> = vec![None; method.len()];
        let mut bounds = leaders.iter().copied().peekable();
        while let Some(start) = bounds.next() {
            let end = bounds.peek().copied().unwrap_or(InsnIdx(method.len()));
            let id = BlockId(blocks.len());
            for slot in start.0..end.0 {
                block_index[slot] = Some(id);
            }
            blocks.push(BasicBlock {
                start,
                end,
                successors: vec![],
                handlers: vec![],
            });
        }

        let block_at = |position: InsnIdx| -> BlockId {
            block_index[position.0].unwrap_or_else(|| {
                // Leaders cover every live slot, so this is unreachable for
                // any position produced by `Method::resolve`
                unreachable!("no block covers {:?}", position)
            })
        };

        // Normal successors come from the last instruction of each block
        for id in 0..blocks.len() {
            let block = &blocks[id];
            let last = match (block.start.0..block.end.0)
                .rev()
                .map(InsnIdx)
                .find_map(|idx| method.get(idx).map(|insn| (idx, insn)))
            {
                Some(found) => found,
                None => continue, // block of removed slots only
            };

            let mut successors = vec![];
            if last.1.falls_through() {
                if let Some(next) = method.next(last.0) {
                    successors.push(block_at(next));
                }
            }
            for target in last.1.jump_targets() {
                if let Some(resolved) = method.resolve(target) {
                    successors.push(block_at(resolved));
                }
            }
            blocks[id].successors = successors;
        }

        // Exception edges: each block wholly inside a protected range gets
        // an edge to the range's handler
        for handler in &method.handlers {
            let target = match method.resolve(handler.handler) {
                Some(resolved) => block_at(resolved),
                None => continue,
            };
            for block in blocks.iter_mut() {
                if handler.protects(block.start) {
                    block.handlers.push(HandlerEdge {
                        block: target,
                        catch_type: handler.catch_type.clone(),
                    });
                }
            }
        }

        Ok(ControlFlow {
            blocks,
            block_index,
        })
    }

    /// Block holding the method entry point, if the method has any code
    pub fn entry(&self) -> Option<BlockId> {
        if self.blocks.is_empty() {
            None
        } else {
            Some(BlockId(0))
        }
    }

    pub fn blocks(&self) -> &[BasicBlock] {
        &self.blocks
    }

    pub fn block(&self, id: BlockId) -> &BasicBlock {
        &self.blocks[id.0]
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{ExceptionHandler, Insn, OrdComparison};
    use crate::jvm::{MethodAccessFlags, MethodDescriptor, Name, UnqualifiedName};

    fn method_of(insns: Vec<Insn>) -> Method {
        let mut method = Method::new(
            UnqualifiedName::from_string(String::from("test")).unwrap(),
            MethodDescriptor {
                parameters: vec![],
                return_type: None,
            },
            MethodAccessFlags::STATIC,
        );
        for insn in insns {
            method.push(insn);
        }
        method
    }

    fn class() -> BinaryName {
        BinaryName::from_string(String::from("me/Test")).unwrap()
    }

    #[test]
    fn straight_line_is_one_block() {
        let method = method_of(vec![Insn::IConst(1), Insn::Pop, Insn::Return]);
        let cfg = ControlFlow::build(&class(), &method).unwrap();
        assert_eq!(cfg.blocks().len(), 1);
        assert_eq!(cfg.block(BlockId(0)).start, InsnIdx(0));
        assert_eq!(cfg.block(BlockId(0)).end, InsnIdx(3));
        assert_eq!(cfg.block(BlockId(0)).successors, vec![]);
    }

    #[test]
    fn conditional_branch_has_two_edges() {
        // 0: iconst 0
        // 1: ifeq -> 4
        // 2: iconst 1
        // 3: goto -> 5
        // 4: iconst 2
        // 5: pop
        // 6: return
        let method = method_of(vec![
            Insn::IConst(0),
            Insn::If(OrdComparison::EQ, InsnIdx(4)),
            Insn::IConst(1),
            Insn::Goto(InsnIdx(5)),
            Insn::IConst(2),
            Insn::Pop,
            Insn::Return,
        ]);
        let cfg = ControlFlow::build(&class(), &method).unwrap();
        assert_eq!(cfg.blocks().len(), 4);

        let entry = cfg.block(BlockId(0));
        assert_eq!(entry.end, InsnIdx(2));
        assert_eq!(entry.successors, vec![BlockId(1), BlockId(2)]);

        let then_arm = cfg.block(BlockId(1));
        assert_eq!(then_arm.successors, vec![BlockId(3)]);

        let else_arm = cfg.block(BlockId(2));
        assert_eq!(else_arm.successors, vec![BlockId(3)]);
    }

    #[test]
    fn switch_fans_out() {
        let method = method_of(vec![
            Insn::IConst(1),
            Insn::TableSwitch {
                low: 0,
                default: InsnIdx(2),
                targets: vec![InsnIdx(3), InsnIdx(4)],
            },
            Insn::Return,
            Insn::Return,
            Insn::Return,
        ]);
        let cfg = ControlFlow::build(&class(), &method).unwrap();
        assert_eq!(
            cfg.block(BlockId(0)).successors,
            vec![BlockId(1), BlockId(2), BlockId(3)]
        );
    }

    #[test]
    fn protected_range_routes_to_handler() {
        // 0: new me/Foo     (protected, can throw)
        // 1: pop
        // 2: return
        // 3: pop            (handler entry: exception on stack)
        // 4: return
        let foo = BinaryName::from_string(String::from("me/Foo")).unwrap();
        let mut method = method_of(vec![
            Insn::New(foo),
            Insn::Pop,
            Insn::Return,
            Insn::Pop,
            Insn::Return,
        ]);
        method.add_handler(ExceptionHandler {
            start: InsnIdx(0),
            end: InsnIdx(2),
            handler: InsnIdx(3),
            catch_type: None,
        });

        let cfg = ControlFlow::build(&class(), &method).unwrap();
        let entry = cfg.block(BlockId(0));
        assert_eq!(entry.handlers.len(), 1);
        assert_eq!(entry.handlers[0].block, cfg.block_index[3].unwrap());
    }

    #[test]
    fn branch_target_out_of_bounds_is_fatal() {
        let method = method_of(vec![Insn::Goto(InsnIdx(17)), Insn::Return]);
        let error = ControlFlow::build(&class(), &method).unwrap_err();
        assert_eq!(error.at, InsnIdx(0));
        assert_eq!(error.kind, ErrorKind::BranchTargetOutOfBounds(InsnIdx(17)));
    }

    #[test]
    fn handler_out_of_bounds_is_fatal() {
        let mut method = method_of(vec![Insn::Return]);
        method.add_handler(ExceptionHandler {
            start: InsnIdx(0),
            end: InsnIdx(1),
            handler: InsnIdx(9),
            catch_type: None,
        });
        let error = ControlFlow::build(&class(), &method).unwrap_err();
        assert_eq!(error.kind, ErrorKind::HandlerOutOfBounds(InsnIdx(9)));
    }
}
