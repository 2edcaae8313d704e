//! Shared fixtures and rewriters for unit tests. Only compiled in test builds.

use std::rc::Rc;

use crate::builder::CfgBuilder;
use crate::error::CfgError;
use crate::graph::Cfg;
use crate::ir::{
    BinaryOp, BlockId, BlockKind, Constant, Edge, EdgeRef, Expr, ExprRef, LocalId, LoopId, Span,
    Stmt, StmtRef, SuspensionId, UnaryOp,
};
use crate::rewrite::RewriteCx;
use crate::visit::{walk_edge, walk_expr, Rewriter};

/// Shorthand for `LocalId::new(n)`.
pub(crate) fn l(n: u32) -> LocalId {
    LocalId::new(n)
}

pub(crate) fn local(n: u32) -> ExprRef {
    Expr::local(l(n))
}

pub(crate) fn int(n: i64) -> ExprRef {
    Expr::constant(Constant::Int(n))
}

/// `%n = value`
pub(crate) fn set(n: u32, value: ExprRef) -> StmtRef {
    Stmt::assign(local(n), value)
}

/// Reachable blocks that read or write `target`.
pub(crate) fn mentions(cfg: &Cfg, target: LocalId) -> Vec<BlockId> {
    cfg.reachable_blocks()
        .into_iter()
        .filter(|&id| {
            let Some(block) = cfg.block(id) else {
                return false;
            };
            let in_stmts = block.stmts().iter().any(|stmt| match &**stmt {
                Stmt::Assign { target: t, value } => {
                    expr_mentions(t, target) || expr_mentions(value, target)
                }
                Stmt::Eval(expr) => expr_mentions(expr, target),
                Stmt::Yield { value, .. } => {
                    value.as_ref().is_some_and(|v| expr_mentions(v, target))
                }
            });
            let mut in_edge = false;
            if let Some(edge) = block.edge() {
                let _ = edge.map_operands(|expr| {
                    in_edge |= expr_mentions(expr, target);
                    Rc::clone(expr)
                });
            }
            in_stmts || in_edge
        })
        .collect()
}

fn expr_mentions(expr: &Expr, target: LocalId) -> bool {
    match expr {
        Expr::Const(_) => false,
        Expr::Local(id) => *id == target,
        Expr::Unary { operand, .. } => expr_mentions(operand, target),
        Expr::Binary { lhs, rhs, .. } => expr_mentions(lhs, target) || expr_mentions(rhs, target),
        Expr::Member { object, .. } => expr_mentions(object, target),
        Expr::Call { args, .. } => args.iter().any(|arg| expr_mentions(arg, target)),
        Expr::Record { fields } => fields.iter().any(|(_, v)| expr_mentions(v, target)),
    }
}

/// No block is both reachable and recorded as unreachable, and every
/// recorded suspension point lives in a reachable block.
pub(crate) fn assert_bookkeeping_consistent(cfg: &Cfg) {
    let reachable = cfg.reachable_blocks();
    for id in &reachable {
        assert!(
            !cfg.unreachable().contains(id),
            "{id} is reachable but recorded as unreachable"
        );
    }
    for point in cfg.suspension_points() {
        assert!(
            reachable
                .iter()
                .any(|&id| cfg.suspension_points_in(id).contains(&point.id)),
            "{} is recorded but not yielded in any reachable block",
            point.id
        );
    }
}

// ── Rewriters ───────────────────────────────────────────────────────

/// Changes nothing.
pub(crate) struct Identity;

impl Rewriter for Identity {}

/// Replaces every use of one local with another.
pub(crate) struct RenameLocal {
    pub from: LocalId,
    pub to: LocalId,
}

impl RenameLocal {
    pub(crate) fn new(from: u32, to: u32) -> Self {
        RenameLocal {
            from: l(from),
            to: l(to),
        }
    }
}

impl Rewriter for RenameLocal {
    fn rewrite_expr(&mut self, expr: &ExprRef) -> ExprRef {
        match **expr {
            Expr::Local(id) if id == self.from => Expr::local(self.to),
            _ => walk_expr(self, expr),
        }
    }
}

/// Folds integer arithmetic and boolean negation over constants.
pub(crate) struct FoldConstants;

impl Rewriter for FoldConstants {
    fn rewrite_expr(&mut self, expr: &ExprRef) -> ExprRef {
        let expr = walk_expr(self, expr);
        let folded = match &*expr {
            Expr::Binary { op, lhs, rhs } => match (op, lhs.as_const(), rhs.as_const()) {
                (BinaryOp::Add, Some(Constant::Int(a)), Some(Constant::Int(b))) => {
                    Some(Constant::Int(a + b))
                }
                (BinaryOp::Mul, Some(Constant::Int(a)), Some(Constant::Int(b))) => {
                    Some(Constant::Int(a * b))
                }
                _ => None,
            },
            Expr::Unary {
                op: UnaryOp::Not,
                operand,
            } => match operand.as_const() {
                Some(Constant::Bool(b)) => Some(Constant::Bool(!b)),
                _ => None,
            },
            _ => None,
        };
        folded.map_or(expr, Expr::constant)
    }
}

/// Turns branches on a constant into gotos and flags the dropped arm.
pub(crate) struct PruneConstantBranches;

impl Rewriter for PruneConstantBranches {
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
                let (keep, drop) = if taken {
                    (*then_block, *else_block)
                } else {
                    (*else_block, *then_block)
                };
                cx.mark_possibly_unreachable(drop);
                return Ok(Edge::goto(cx.visit_block(self, keep)?));
            }
        }
        walk_edge(self, cx, edge)
    }
}

// ── Fixtures ────────────────────────────────────────────────────────

/// `entry → mid → exit`, `mid` assigns `%0 = 1`.
pub(crate) struct Straight {
    pub cfg: Cfg,
    pub entry: BlockId,
    pub mid: BlockId,
    pub exit: BlockId,
}

pub(crate) fn straight() -> Straight {
    let mut b = CfgBuilder::new();
    let exit = b.block(BlockKind::Exit, [], None);
    let mid = b.block(BlockKind::Plain, [set(0, int(1))], Some(Edge::goto(exit)));
    let entry = b.block(BlockKind::Entry, [], Some(Edge::goto(mid)));
    let cfg = b.finish(entry, exit).unwrap();
    Straight {
        cfg,
        entry,
        mid,
        exit,
    }
}

/// A counting loop with a back-edge:
///
/// ```text
/// entry: %0 = 0; goto head
/// head:  branch %0 < 10 → body, after
/// body:  %2 = %2 * 2; goto latch
/// latch: %3 = 1; goto head
/// after: goto exit
/// ```
///
/// `body` and `latch` never read `%0`.
pub(crate) struct WhileLoop {
    pub cfg: Cfg,
    pub entry: BlockId,
    pub head: BlockId,
    pub body: BlockId,
    pub latch: BlockId,
    pub after: BlockId,
    pub exit: BlockId,
}

pub(crate) fn while_loop() -> WhileLoop {
    let mut b = CfgBuilder::new();
    let exit = b.block(BlockKind::Exit, [], None);
    let after = b.block(BlockKind::Plain, [], Some(Edge::goto(exit)));
    let head = b.reserve();
    let latch = b.block(BlockKind::Plain, [set(3, int(1))], Some(Edge::goto(head)));
    let body = b.block(
        BlockKind::Plain,
        [set(2, Expr::binary(BinaryOp::Mul, local(2), int(2)))],
        Some(Edge::goto(latch)),
    );
    b.define(
        head,
        BlockKind::Plain,
        [],
        Some(Edge::branch(
            Expr::binary(BinaryOp::Lt, local(0), int(10)),
            body,
            after,
        )),
    )
    .unwrap();
    let entry = b.block(BlockKind::Entry, [set(0, int(0))], Some(Edge::goto(head)));
    let cfg = b.finish(entry, exit).unwrap();
    WhileLoop {
        cfg,
        entry,
        head,
        body,
        latch,
        after,
        exit,
    }
}

/// An enumerator loop whose body yields:
///
/// ```text
/// entry:  acquire loop0 over %0 → header
/// header: advance loop0, key %2 → body | next
/// body:   yield sp0 %1; goto header
/// next:   goto exit
/// ```
pub(crate) struct EnumLoop {
    pub cfg: Cfg,
    pub entry: BlockId,
    pub header: BlockId,
    pub body: BlockId,
    pub next: BlockId,
    pub exit: BlockId,
    pub loop_id: LoopId,
    pub point: SuspensionId,
}

pub(crate) fn enum_loop() -> EnumLoop {
    let mut b = CfgBuilder::new();
    let loop_id = b.fresh_loop();
    let point = b.suspension_point(1, Span::new(10, 20));
    let exit = b.block(BlockKind::Exit, [], None);
    let next = b.block(BlockKind::Plain, [], Some(Edge::goto(exit)));
    let header = b.reserve();
    let body = b.block(
        BlockKind::Plain,
        [Stmt::yield_at(point, Some(local(1)))],
        Some(Edge::goto(header)),
    );
    b.define(
        header,
        BlockKind::Plain,
        [],
        Some(Edge::advance(
            loop_id,
            body,
            next,
            Some(local(2)),
            None,
            Span::new(0, 30),
        )),
    )
    .unwrap();
    let entry = b.block(
        BlockKind::Entry,
        [],
        Some(Edge::acquire(loop_id, local(0), false, header)),
    );
    let cfg = b.finish(entry, exit).unwrap();
    EnumLoop {
        cfg,
        entry,
        header,
        body,
        next,
        exit,
        loop_id,
        point,
    }
}

/// A protected region whose body branches on a nested condition:
///
/// ```text
/// entry: try body, handlers [h0, h1] → next
/// body:  branch (%0 == (1 + 2)) && !%1 → then, else
/// then/else/h0/h1: goto next
/// next:  goto exit
/// ```
pub(crate) struct TryRegion {
    pub cfg: Cfg,
    pub entry: BlockId,
    pub body: BlockId,
    pub then_block: BlockId,
    pub else_block: BlockId,
    pub handlers: [BlockId; 2],
    pub next: BlockId,
    pub exit: BlockId,
}

pub(crate) fn try_region() -> TryRegion {
    let mut b = CfgBuilder::new();
    let exit = b.block(BlockKind::Exit, [], None);
    let next = b.block(BlockKind::Plain, [], Some(Edge::goto(exit)));
    let handler = |catches| BlockKind::Handler {
        catches,
        binding: Some(l(9)),
    };
    let h0 = b.block(handler(None), [set(4, local(9))], Some(Edge::goto(next)));
    let h1 = b.block(handler(None), [], Some(Edge::leave(next)));
    let then_block = b.block(BlockKind::Plain, [set(5, int(1))], Some(Edge::goto(next)));
    let else_block = b.block(BlockKind::Plain, [set(5, int(2))], Some(Edge::goto(next)));
    let cond = Expr::binary(
        BinaryOp::And,
        Expr::binary(
            BinaryOp::Eq,
            local(0),
            Expr::binary(BinaryOp::Add, int(1), int(2)),
        ),
        Expr::unary(UnaryOp::Not, local(1)),
    );
    let body = b.block(
        BlockKind::Plain,
        [],
        Some(Edge::branch(cond, then_block, else_block)),
    );
    let entry = b.block(
        BlockKind::Entry,
        [],
        Some(Edge::try_catch(body, [h0, h1], None, next)),
    );
    let cfg = b.finish(entry, exit).unwrap();
    TryRegion {
        cfg,
        entry,
        body,
        then_block,
        else_block,
        handlers: [h0, h1],
        next,
        exit,
    }
}
