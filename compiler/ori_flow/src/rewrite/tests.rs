use std::rc::Rc;

use pretty_assertions::assert_eq;

use crate::builder::CfgBuilder;
use crate::ir::{BinaryOp, Constant, Edge, EnumStep, Expr, ExprRef, LocalId, Span, Stmt, UnaryOp};
use crate::test_helpers::{
    assert_bookkeeping_consistent, enum_loop, int, l, local, mentions, set, straight, try_region,
    while_loop, FoldConstants, Identity, PruneConstantBranches, RenameLocal,
};
use crate::visit::{walk_block, walk_edge, walk_expr};

use super::*;

/// Enumeration sources known to be empty. A loop over one never runs, so
/// its acquire step becomes a jump straight to the loop's continuation.
struct EmptySources {
    known_empty: LocalId,
}

impl EmptySources {
    fn skip_loop(&mut self, cx: &mut RewriteCx<'_>, header: BlockId) -> Result<EdgeRef, CfgError> {
        let header_block = Rc::clone(cx.block(header)?);
        let Some(Edge::Enumerate {
            step: EnumStep::Advance { body, next, .. },
            ..
        }) = header_block.edge().map(|e| &**e)
        else {
            return Err(CfgError::UnknownBlock(header));
        };
        cx.mark_possibly_unreachable(*body);
        cx.mark_possibly_unreachable(header);
        Ok(Edge::goto(cx.visit_block(self, *next)?))
    }
}

impl Rewriter for EmptySources {
    fn rewrite_expr(&mut self, expr: &ExprRef) -> ExprRef {
        match **expr {
            Expr::Local(id) if id == self.known_empty => Expr::constant(Constant::EmptySource),
            _ => walk_expr(self, expr),
        }
    }

    fn rewrite_edge(
        &mut self,
        cx: &mut RewriteCx<'_>,
        edge: &EdgeRef,
    ) -> Result<EdgeRef, CfgError> {
        if let Edge::Enumerate {
            step: EnumStep::Acquire { source, header, .. },
            ..
        } = &**edge
        {
            if self.rewrite_expr(source).as_const() == Some(Constant::EmptySource) {
                return self.skip_loop(cx, *header);
            }
        }
        walk_edge(self, cx, edge)
    }
}

/// Skips empty forwarding blocks by handing back their target.
struct ThreadJumps;

impl Rewriter for ThreadJumps {
    fn rewrite_block(
        &mut self,
        cx: &mut RewriteCx<'_>,
        block: &Rc<Block>,
    ) -> Result<BlockId, CfgError> {
        if block.kind() == BlockKind::Plain && block.stmts().is_empty() {
            if let Some(Edge::Goto { target }) = block.edge().map(|e| &**e) {
                return cx.visit_block(self, *target);
            }
        }
        walk_block(self, cx, block)
    }
}

fn same_block(a: &Cfg, b: &Cfg, id: BlockId) -> bool {
    match (a.block(id), b.block(id)) {
        (Some(x), Some(y)) => Rc::ptr_eq(x, y),
        _ => false,
    }
}

// ── Identity ────────────────────────────────────────────────────────

#[test]
fn noop_rewrite_returns_identical_graph() {
    let e = enum_loop();
    let out = rewrite(&e.cfg, &mut Identity).unwrap();

    assert_eq!(out.entry(), e.entry);
    assert_eq!(out.exit(), e.exit);
    for id in e.cfg.reachable_blocks() {
        assert!(same_block(&out, &e.cfg, id), "{id} was reallocated");
    }
    assert!(std::ptr::eq(out.suspension_points(), e.cfg.suspension_points()));
    assert!(out.unreachable().is_empty());
    assert!(out.same_lineage(&e.cfg));
}

#[test]
fn noop_rewrite_of_cyclic_graph_terminates() {
    let w = while_loop();
    let out = rewrite(&w.cfg, &mut Identity).unwrap();
    assert_eq!(out.reachable_blocks(), w.cfg.reachable_blocks());
}

// ── Repair ──────────────────────────────────────────────────────────

/// `head` changes, so the latch's back-edge goes stale during the update
/// phase. Repair clones the latch and the body leading to it.
#[test]
fn back_edge_to_changed_header_is_repaired() {
    let w = while_loop();
    let out = rewrite(&w.cfg, &mut RenameLocal::new(0, 1)).unwrap();

    assert!(mentions(&out, l(0)).is_empty(), "stale %0 reads survive");
    let reachable = out.reachable_blocks();
    assert_eq!(reachable.len(), 6);
    for stale in [w.entry, w.head, w.body, w.latch] {
        assert!(!reachable.contains(&stale), "{stale} is still referenced");
    }
    assert!(same_block(&out, &w.cfg, w.after));
    assert!(same_block(&out, &w.cfg, w.exit));

    // The clones share their contents with the originals.
    let new_head = out.successors(out.entry())[0];
    let new_body = out.successors(new_head)[0];
    let new_latch = out.successors(new_body)[0];
    assert!(Rc::ptr_eq(
        out.block(new_body).unwrap().stmts(),
        w.cfg.block(w.body).unwrap().stmts()
    ));
    assert_eq!(out.successors(new_latch).as_slice(), &[new_head]);
    assert_bookkeeping_consistent(&out);
}

#[test]
fn rewrite_never_touches_the_input() {
    let w = while_loop();
    let before: Vec<_> = w
        .cfg
        .reachable_blocks()
        .into_iter()
        .map(|id| Rc::clone(w.cfg.block(id).unwrap()))
        .collect();

    let _ = rewrite(&w.cfg, &mut RenameLocal::new(0, 1)).unwrap();

    let after: Vec<_> = w
        .cfg
        .reachable_blocks()
        .into_iter()
        .map(|id| Rc::clone(w.cfg.block(id).unwrap()))
        .collect();
    assert_eq!(before.len(), after.len());
    for (old, new) in before.iter().zip(&after) {
        assert!(Rc::ptr_eq(old, new));
    }
    assert_eq!(mentions(&w.cfg, l(0)), vec![w.entry, w.head]);
    verify_cfg(&w.cfg).unwrap();
}

/// A merge block rewritten through its first predecessor is handed out
/// stale to the second one; repair clones the second predecessor.
#[test]
fn merge_point_reference_is_repaired() {
    let mut b = CfgBuilder::new();
    let exit = b.block(BlockKind::Exit, [], None);
    let merge = b.block(BlockKind::Plain, [set(0, int(1))], Some(Edge::goto(exit)));
    let left = b.block(BlockKind::Plain, [set(1, int(1))], Some(Edge::goto(merge)));
    let right = b.block(BlockKind::Plain, [set(2, int(2))], Some(Edge::goto(merge)));
    let entry = b.block(
        BlockKind::Entry,
        [],
        Some(Edge::branch(local(5), left, right)),
    );
    let cfg = b.finish(entry, exit).unwrap();

    let out = rewrite(&cfg, &mut RenameLocal::new(0, 9)).unwrap();

    assert!(mentions(&out, l(0)).is_empty());
    let reachable = out.reachable_blocks();
    assert_eq!(reachable.len(), 5);
    for stale in [merge, left, right] {
        assert!(!reachable.contains(&stale), "{stale} is still referenced");
    }
    let new_merge = out.successors(out.successors(out.entry())[0])[0];
    let via_right = out.successors(out.successors(out.entry())[1])[0];
    assert_eq!(new_merge, via_right);
}

/// Blocks that only lead away from the change keep their identity.
#[test]
fn unaffected_blocks_keep_identity() {
    let s = straight();
    let out = rewrite(&s.cfg, &mut RenameLocal::new(0, 3)).unwrap();
    assert_ne!(out.entry(), s.entry);
    assert!(!out.is_reachable(s.mid));
    assert!(same_block(&out, &s.cfg, s.exit));
    assert_eq!(out.reachable_blocks().len(), 3);
}

/// A case arm loops back to the switch block, whose discriminant changes.
/// The arm is cloned to follow the new switch block; the other arm and the
/// continuation are shared.
#[test]
fn case_back_edge_to_changed_switch_is_repaired() {
    let mut b = CfgBuilder::new();
    let exit = b.block(BlockKind::Exit, [], None);
    let next = b.block(BlockKind::Plain, [], Some(Edge::goto(exit)));
    let head = b.reserve();
    let retry_kind = BlockKind::Case {
        label: Some(Constant::Int(0)),
    };
    let retry = b.block(retry_kind, [set(1, int(0))], Some(Edge::goto(head)));
    let done = b.block(
        BlockKind::Case { label: None },
        [],
        Some(Edge::goto(next)),
    );
    b.define(
        head,
        BlockKind::Plain,
        [],
        Some(Edge::switch(local(0), [retry, done], next)),
    )
    .unwrap();
    let entry = b.block(BlockKind::Entry, [], Some(Edge::goto(head)));
    let cfg = b.finish(entry, exit).unwrap();

    let out = rewrite(&cfg, &mut RenameLocal::new(0, 7)).unwrap();
    verify_cfg(&out).unwrap();
    assert!(mentions(&out, l(0)).is_empty());
    assert_eq!(out.reachable_blocks().len(), cfg.reachable_blocks().len());

    let new_head = out.successors(out.entry())[0];
    assert_ne!(new_head, head);
    let Some(Edge::Switch {
        discriminant,
        cases,
        next: continuation,
    }) = out.block(new_head).unwrap().edge().map(|e| &**e)
    else {
        panic!("head must end in a switch");
    };
    assert_eq!(**discriminant, Expr::Local(l(7)));
    assert_eq!(*continuation, next);
    assert_ne!(cases[0], retry);
    assert_eq!(out.block(cases[0]).unwrap().kind(), retry_kind);
    assert_eq!(out.successors(cases[0]).as_slice(), &[new_head]);
    assert_eq!(cases[1], done);
    assert!(same_block(&out, &cfg, done));
    assert!(same_block(&out, &cfg, next));
}

// ── Scenarios ───────────────────────────────────────────────────────

#[test]
fn empty_enumerator_drops_body_and_suspension_point() {
    let e = enum_loop();
    assert_eq!(e.cfg.paired_acquire(e.header), Some(e.entry));

    let out = rewrite(&e.cfg, &mut EmptySources { known_empty: l(0) }).unwrap();

    let reachable = out.reachable_blocks();
    assert!(!reachable.contains(&e.body));
    assert!(!reachable.contains(&e.header));
    assert!(reachable.contains(&e.next));
    assert!(same_block(&out, &e.cfg, e.next), "continuation must be shared");
    assert!(out.unreachable().contains(&e.body));
    assert!(out.unreachable().contains(&e.header));
    assert!(out.suspension_points().iter().all(|p| p.id != e.point));
    assert!(out.suspension_points().is_empty());
    assert_eq!(out.successors(out.entry()).as_slice(), &[e.next]);
    assert_bookkeeping_consistent(&out);

    // The input still has its loop.
    assert_eq!(e.cfg.suspension_points().len(), 1);
    assert_eq!(e.cfg.paired_acquire(e.header), Some(e.entry));
}

#[test]
fn nested_condition_in_try_body_rebuilds_only_the_path() {
    let t = try_region();
    let out = rewrite(&t.cfg, &mut FoldConstants).unwrap();

    // entry and body are new; everything else is shared.
    assert_ne!(out.entry(), t.entry);
    assert!(!out.is_reachable(t.body));
    for id in [t.then_block, t.else_block, t.next, t.exit] {
        assert!(same_block(&out, &t.cfg, id), "{id} was reallocated");
    }
    for handler in t.handlers {
        assert!(same_block(&out, &t.cfg, handler), "handler {handler} was reallocated");
    }
    assert_eq!(out.reachable_blocks().len(), t.cfg.reachable_blocks().len());

    let old_entry = t.cfg.block(t.entry).unwrap();
    let new_entry = out.block(out.entry()).unwrap();
    let (Some(Edge::Try { handlers: old, .. }), Some(Edge::Try { body, handlers, .. })) = (
        old_entry.edge().map(|e| &**e),
        new_entry.edge().map(|e| &**e),
    ) else {
        panic!("entry must end in a try");
    };
    assert!(Rc::ptr_eq(old, handlers), "handler list must be shared");

    // Only the folded operand and its ancestors are new.
    let old_body = t.cfg.block(t.body).unwrap();
    let new_body = out.block(*body).unwrap();
    let (Some(Edge::Branch { cond: old_cond, .. }), Some(Edge::Branch { cond: new_cond, .. })) = (
        old_body.edge().map(|e| &**e),
        new_body.edge().map(|e| &**e),
    ) else {
        panic!("body must end in a branch");
    };
    let (
        Expr::Binary {
            lhs: old_eq,
            rhs: old_not,
            ..
        },
        Expr::Binary {
            lhs: new_eq,
            rhs: new_not,
            ..
        },
    ) = (&**old_cond, &**new_cond)
    else {
        panic!("condition must be a conjunction");
    };
    assert!(Rc::ptr_eq(old_not, new_not));
    assert!(!Rc::ptr_eq(old_eq, new_eq));
    let expected = Expr::binary(BinaryOp::Eq, local(0), int(3));
    assert_eq!(*new_eq, expected);
    assert!(matches!(&**new_not, Expr::Unary { op: UnaryOp::Not, .. }));
    assert!(Rc::ptr_eq(new_body.stmts(), old_body.stmts()));
}

// ── Unreachability ──────────────────────────────────────────────────

/// `a → d → e` hangs off the dropped arm; `d` and `e` are orphaned only
/// because `a` is.
#[test]
fn orphaned_chain_is_unreachable() {
    let mut b = CfgBuilder::new();
    let point = b.suspension_point(0, Span::DUMMY);
    let exit = b.block(BlockKind::Exit, [], None);
    let c = b.block(BlockKind::Plain, [], Some(Edge::goto(exit)));
    let e = b.block(
        BlockKind::Plain,
        [Stmt::yield_at(point, None)],
        Some(Edge::goto(c)),
    );
    let d = b.block(BlockKind::Plain, [], Some(Edge::goto(e)));
    let a = b.block(BlockKind::Plain, [], Some(Edge::goto(d)));
    let cond = Expr::constant(Constant::Bool(false));
    let entry = b.block(BlockKind::Entry, [], Some(Edge::branch(cond, a, c)));
    let cfg = b.finish(entry, exit).unwrap();

    let out = rewrite(&cfg, &mut PruneConstantBranches).unwrap();

    let mut unreachable: Vec<_> = out.unreachable().iter().copied().collect();
    unreachable.sort();
    let mut expected = vec![a, d, e];
    expected.sort();
    assert_eq!(unreachable, expected);
    assert!(out.suspension_points().is_empty());
    assert!(same_block(&out, &cfg, c));
    assert_bookkeeping_consistent(&out);

    // Carried through later passes.
    let again = rewrite(&out, &mut Identity).unwrap();
    assert_eq!(again.unreachable(), out.unreachable());
}

/// Rewrites both arms of a constant branch before dropping the dead one, so
/// the dropped arm already has a new version when it is flagged.
struct RenameThenPrune {
    rename: RenameLocal,
}

impl Rewriter for RenameThenPrune {
    fn rewrite_expr(&mut self, expr: &ExprRef) -> ExprRef {
        self.rename.rewrite_expr(expr)
    }

    fn rewrite_edge(
        &mut self,
        cx: &mut RewriteCx<'_>,
        edge: &EdgeRef,
    ) -> Result<EdgeRef, CfgError> {
        if let Edge::Branch {
            cond,
            then_block,
            else_block,
        } = &**edge
        {
            if let Some(Constant::Bool(taken)) = cond.as_const() {
                let then_id = cx.visit_block(self, *then_block)?;
                let else_id = cx.visit_block(self, *else_block)?;
                let (keep, drop) = if taken {
                    (then_id, *else_block)
                } else {
                    (else_id, *then_block)
                };
                cx.mark_possibly_unreachable(drop);
                return Ok(Edge::goto(keep));
            }
        }
        walk_edge(self, cx, edge)
    }
}

/// The dead arm `a → e` is rewritten before it is dropped. The ids the
/// input graph knows are recorded, not just the pass's own versions.
#[test]
fn dropped_arm_rewritten_before_marking_is_recorded() {
    let mut b = CfgBuilder::new();
    let point = b.suspension_point(0, Span::DUMMY);
    let exit = b.block(BlockKind::Exit, [], None);
    let c = b.block(BlockKind::Plain, [], Some(Edge::goto(exit)));
    let e = b.block(
        BlockKind::Plain,
        [Stmt::yield_at(point, Some(local(0)))],
        Some(Edge::goto(c)),
    );
    let a = b.block(BlockKind::Plain, [], Some(Edge::goto(e)));
    let cond = Expr::constant(Constant::Bool(false));
    let entry = b.block(BlockKind::Entry, [], Some(Edge::branch(cond, a, c)));
    let cfg = b.finish(entry, exit).unwrap();

    let mut rewriter = RenameThenPrune {
        rename: RenameLocal::new(0, 5),
    };
    let out = rewrite(&cfg, &mut rewriter).unwrap();

    assert_eq!(out.successors(out.entry()).as_slice(), &[c]);
    assert!(out.unreachable().contains(&a));
    assert!(out.unreachable().contains(&e));
    // Plus the versions of `a` and `e` built before the drop.
    assert_eq!(out.unreachable().len(), 4);
    assert!(out.suspension_points().is_empty());
    assert!(same_block(&out, &cfg, c));
    assert_bookkeeping_consistent(&out);
}

#[test]
fn marked_block_reachable_elsewhere_stays_live() {
    let mut b = CfgBuilder::new();
    let exit = b.block(BlockKind::Exit, [], None);
    let join = b.block(BlockKind::Plain, [], Some(Edge::goto(exit)));
    let side = b.block(BlockKind::Plain, [set(0, int(0))], Some(Edge::goto(join)));
    let cond = Expr::constant(Constant::Bool(true));
    let entry = b.block(BlockKind::Entry, [], Some(Edge::branch(cond, side, join)));
    let cfg = b.finish(entry, exit).unwrap();

    let out = rewrite(&cfg, &mut PruneConstantBranches).unwrap();
    assert!(out.unreachable().is_empty());
    assert!(out.is_reachable(join));
    assert!(out.is_reachable(side));
}

#[test]
fn rewriter_may_hand_back_an_existing_block() {
    let mut b = CfgBuilder::new();
    let exit = b.block(BlockKind::Exit, [], None);
    let tail = b.block(BlockKind::Plain, [set(0, int(1))], Some(Edge::goto(exit)));
    let hop = b.block(BlockKind::Plain, [], Some(Edge::goto(tail)));
    let entry = b.block(BlockKind::Entry, [], Some(Edge::goto(hop)));
    let cfg = b.finish(entry, exit).unwrap();

    let out = rewrite(&cfg, &mut ThreadJumps).unwrap();
    assert_eq!(out.successors(out.entry()).as_slice(), &[tail]);
    assert!(same_block(&out, &cfg, tail));
    assert!(!out.is_reachable(hop));
}

#[test]
fn blocks_created_in_a_pass_are_visible_to_it() {
    struct PadEntry {
        done: bool,
    }

    impl Rewriter for PadEntry {
        fn rewrite_edge(
            &mut self,
            cx: &mut RewriteCx<'_>,
            edge: &EdgeRef,
        ) -> Result<EdgeRef, CfgError> {
            if std::mem::replace(&mut self.done, true) {
                return walk_edge(self, cx, edge);
            }
            let edge = walk_edge(self, cx, edge)?;
            let pad = cx.new_block(BlockKind::Plain, Rc::from(Vec::new()), Some(edge))?;
            assert_eq!(cx.block(pad)?.kind(), BlockKind::Plain);
            Ok(Edge::goto(pad))
        }
    }

    let s = straight();
    let out = rewrite(&s.cfg, &mut PadEntry { done: false }).unwrap();
    let pad = out.successors(out.entry())[0];
    assert_ne!(pad, s.mid);
    assert_eq!(out.successors(pad).as_slice(), &[s.mid]);
    assert_eq!(out.reachable_blocks().len(), 4);
}

// ── Loop pairing ────────────────────────────────────────────────────

/// Renaming the key binding rebuilds the header; the acquire and the
/// body's back-edge both follow it.
#[test]
fn loop_pairing_follows_rebuilt_header() {
    let e = enum_loop();
    let out = rewrite(&e.cfg, &mut RenameLocal::new(2, 7)).unwrap();

    let header = out.successors(out.entry())[0];
    assert_ne!(header, e.header);
    assert_eq!(out.paired_acquire(header), Some(out.entry()));

    let Some(Edge::Enumerate {
        loop_id,
        step: EnumStep::Advance { body, next, key, .. },
    }) = out.block(header).unwrap().edge().map(|e| &**e)
    else {
        panic!("header must advance");
    };
    assert_eq!(*loop_id, e.loop_id);
    assert_eq!(key.as_deref(), Some(&Expr::Local(l(7))));
    assert_eq!(*next, e.next);
    assert_ne!(*body, e.body);
    assert_eq!(out.successors(*body).as_slice(), &[header]);
    assert_eq!(out.suspension_points_in(*body), vec![e.point]);
    assert!(std::ptr::eq(out.suspension_points(), e.cfg.suspension_points()));
}

#[test]
fn loop_pairing_survives_new_acquire() {
    let e = enum_loop();
    let out = rewrite(&e.cfg, &mut RenameLocal::new(0, 4)).unwrap();
    assert_ne!(out.entry(), e.entry);
    assert!(same_block(&out, &e.cfg, e.header));
    assert_eq!(out.paired_acquire(e.header), Some(out.entry()));
}

// ── Lineage & failure ───────────────────────────────────────────────

#[test]
fn sequential_rewrites_keep_every_version_valid() {
    let w = while_loop();
    let first = rewrite(&w.cfg, &mut RenameLocal::new(0, 1)).unwrap();
    let second = rewrite(&first, &mut RenameLocal::new(1, 2)).unwrap();

    assert!(mentions(&second, l(0)).is_empty());
    assert!(mentions(&second, l(1)).is_empty());
    assert!(!mentions(&first, l(1)).is_empty());
    assert!(!mentions(&w.cfg, l(0)).is_empty());
    assert!(second.same_lineage(&w.cfg));
    verify_cfg(&first).unwrap();
    verify_cfg(&second).unwrap();

    let earlier = first.reachable_blocks();
    let fresh: Vec<_> = second
        .reachable_blocks()
        .into_iter()
        .filter(|id| !earlier.contains(id))
        .collect();
    assert!(!fresh.is_empty());
    for id in fresh {
        assert!(w.cfg.block(id).is_none(), "{id} collides with an input block");
    }
}

#[test]
fn reentrant_rewrite_is_rejected() {
    struct Reenter {
        graph: Cfg,
        inner: Option<Result<Cfg, CfgError>>,
    }

    impl Rewriter for Reenter {
        fn rewrite_block(
            &mut self,
            cx: &mut RewriteCx<'_>,
            block: &Rc<Block>,
        ) -> Result<BlockId, CfgError> {
            if self.inner.is_none() {
                let graph = self.graph.clone();
                self.inner = Some(rewrite(&graph, &mut Identity));
            }
            walk_block(self, cx, block)
        }
    }

    let s = straight();
    let mut rewriter = Reenter {
        graph: s.cfg.clone(),
        inner: None,
    };
    let out = rewrite(&s.cfg, &mut rewriter).unwrap();
    assert_eq!(out.entry(), s.entry);
    assert!(matches!(rewriter.inner, Some(Err(CfgError::PassInProgress))));

    // The lineage is free again.
    assert!(rewrite(&s.cfg, &mut Identity).is_ok());
}

#[test]
fn failed_rewrite_leaves_input_valid() {
    struct Dangle;

    impl Rewriter for Dangle {
        fn rewrite_edge(
            &mut self,
            cx: &mut RewriteCx<'_>,
            _edge: &EdgeRef,
        ) -> Result<EdgeRef, CfgError> {
            Ok(Edge::goto(cx.visit_block(self, BlockId::new(999))?))
        }
    }

    let s = straight();
    let err = rewrite(&s.cfg, &mut Dangle).unwrap_err();
    assert_eq!(err, CfgError::UnknownBlock(BlockId::new(999)));

    verify_cfg(&s.cfg).unwrap();
    let out = rewrite(&s.cfg, &mut RenameLocal::new(0, 1)).unwrap();
    assert!(mentions(&out, l(0)).is_empty());
}

#[test]
fn exhausted_id_space_abandons_the_pass() {
    let s = straight();
    s.cfg.context().exhaust_block_ids();

    let err = rewrite(&s.cfg, &mut RenameLocal::new(0, 1)).unwrap_err();
    assert_eq!(err, CfgError::BlockIdsExhausted);

    // Nothing is allocated when nothing changes, and the lineage is free.
    verify_cfg(&s.cfg).unwrap();
    let out = rewrite(&s.cfg, &mut Identity).unwrap();
    assert_eq!(out.entry(), s.entry);
}

#[test]
fn output_verification_catches_broken_rewrites() {
    struct WrapInTry;

    impl Rewriter for WrapInTry {
        fn rewrite_edge(
            &mut self,
            cx: &mut RewriteCx<'_>,
            edge: &EdgeRef,
        ) -> Result<EdgeRef, CfgError> {
            match **edge {
                Edge::Goto { target } => {
                    let target = cx.visit_block(self, target)?;
                    Ok(Edge::try_catch(target, [target], None, target))
                }
                _ => walk_edge(self, cx, edge),
            }
        }
    }

    let s = straight();
    let err = rewrite_with(&s.cfg, &mut WrapInTry, &RewriteOptions::checked()).unwrap_err();
    assert!(matches!(
        err,
        CfgError::WrongBlockKind {
            expected: "handler",
            found: "plain",
            ..
        }
    ));

    assert!(rewrite_with(&s.cfg, &mut WrapInTry, &RewriteOptions::unchecked()).is_ok());
}

#[test]
fn long_chains_do_not_exhaust_the_stack() {
    const LEN: usize = 20_000;

    let mut b = CfgBuilder::new();
    let exit = b.block(BlockKind::Exit, [], None);
    let mut next = b.block(BlockKind::Plain, [set(0, int(0))], Some(Edge::goto(exit)));
    for _ in 0..LEN {
        next = b.block(BlockKind::Plain, [], Some(Edge::goto(next)));
    }
    let entry = b.block(BlockKind::Entry, [], Some(Edge::goto(next)));
    let cfg = b.finish(entry, exit).unwrap();

    let out = rewrite(&cfg, &mut RenameLocal::new(0, 1)).unwrap();
    assert!(mentions(&out, l(0)).is_empty());
    assert_eq!(out.reachable_blocks().len(), LEN + 3);
}
