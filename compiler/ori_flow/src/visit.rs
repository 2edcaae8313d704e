//! Rewrite dispatch over blocks, edges and operation nodes.
//!
//! # Design
//!
//! A concrete pass implements [`Rewriter`] and overrides only the hooks for
//! the nodes it transforms. Every hook defaults to the matching `walk_*`
//! function, which recurses into children and rebuilds through the
//! copy-on-write primitives, so an override can do its own work and then
//! call `walk_*` to continue (or skip it to prune).
//!
//! Block and edge hooks get a [`RewriteCx`]: block references must be
//! followed with [`RewriteCx::visit_block`], never by reading the target and
//! recursing by hand, so the engine can memoize, color and record
//! replacements. Operation hooks are pure tree rewrites and never see the
//! engine.
//!
//! # Example
//!
//! ```text
//! struct FoldNot;
//!
//! impl Rewriter for FoldNot {
//!     fn rewrite_expr(&mut self, expr: &ExprRef) -> ExprRef {
//!         let expr = walk_expr(self, expr);
//!         if let Expr::Unary { op: UnaryOp::Not, operand } = &*expr {
//!             if let Some(Constant::Bool(b)) = operand.as_const() {
//!                 return Expr::constant(Constant::Bool(!b));
//!             }
//!         }
//!         expr
//!     }
//! }
//! ```

use std::rc::Rc;

use crate::cow;
use crate::error::CfgError;
use crate::ir::{Block, BlockId, EdgeRef, Expr, ExprRef, Stmt, StmtRef, StmtSeq};
use crate::rewrite::RewriteCx;

/// A node-local graph transformation.
pub trait Rewriter: Sized {
    /// Rewrite one block. Called at most once per block per pass.
    ///
    /// Returns the id of the block that replaces `block`: `block.id()` when
    /// nothing changed, otherwise a block built with
    /// [`RewriteCx::update_block`] or [`RewriteCx::new_block`].
    fn rewrite_block(
        &mut self,
        cx: &mut RewriteCx<'_>,
        block: &Rc<Block>,
    ) -> Result<BlockId, CfgError> {
        walk_block(self, cx, block)
    }

    /// Rewrite the outgoing edge of the block being rewritten.
    fn rewrite_edge(
        &mut self,
        cx: &mut RewriteCx<'_>,
        edge: &EdgeRef,
    ) -> Result<EdgeRef, CfgError> {
        walk_edge(self, cx, edge)
    }

    fn rewrite_stmt(&mut self, stmt: &StmtRef) -> StmtRef {
        walk_stmt(self, stmt)
    }

    fn rewrite_expr(&mut self, expr: &ExprRef) -> ExprRef {
        walk_expr(self, expr)
    }
}

// ── Walk functions ──────────────────────────────────────────────────

/// Rewrite the statements, then the edge, then rebuild the block.
pub fn walk_block<R: Rewriter>(
    rewriter: &mut R,
    cx: &mut RewriteCx<'_>,
    block: &Rc<Block>,
) -> Result<BlockId, CfgError> {
    let stmts = walk_stmts(rewriter, block.stmts());
    let edge = match block.edge() {
        Some(edge) => Some(rewriter.rewrite_edge(cx, edge)?),
        None => None,
    };
    cx.update_block(block, stmts, edge)
}

pub fn walk_stmts<R: Rewriter>(rewriter: &mut R, stmts: &StmtSeq) -> StmtSeq {
    cow::update_seq(stmts, |stmt| rewriter.rewrite_stmt(stmt))
}

/// Rewrite the operand slots, then follow every target through the engine.
pub fn walk_edge<R: Rewriter>(
    rewriter: &mut R,
    cx: &mut RewriteCx<'_>,
    edge: &EdgeRef,
) -> Result<EdgeRef, CfgError> {
    let edge = edge.map_operands(|expr| rewriter.rewrite_expr(expr));
    edge.try_map_targets(|target| cx.visit_block(rewriter, target))
}

pub fn walk_stmt<R: Rewriter>(rewriter: &mut R, stmt: &StmtRef) -> StmtRef {
    match &**stmt {
        Stmt::Assign { target, value } => {
            let target_t = rewriter.rewrite_expr(target);
            let value_t = rewriter.rewrite_expr(value);
            let unchanged = cow::same(&target_t, target) && cow::same(&value_t, value);
            cow::rebuild(stmt, unchanged, || Stmt::Assign {
                target: target_t,
                value: value_t,
            })
        }
        Stmt::Eval(expr) => {
            let expr_t = rewriter.rewrite_expr(expr);
            cow::rebuild(stmt, cow::same(&expr_t, expr), || Stmt::Eval(expr_t))
        }
        Stmt::Yield { point, value } => {
            let value_t = cow::update_opt(value, |v| rewriter.rewrite_expr(v));
            cow::rebuild(stmt, cow::same_opt(&value_t, value), || Stmt::Yield {
                point: *point,
                value: value_t,
            })
        }
    }
}

pub fn walk_expr<R: Rewriter>(rewriter: &mut R, expr: &ExprRef) -> ExprRef {
    match &**expr {
        Expr::Const(_) | Expr::Local(_) => Rc::clone(expr),
        Expr::Unary { op, operand } => {
            let operand_t = rewriter.rewrite_expr(operand);
            cow::rebuild(expr, cow::same(&operand_t, operand), || Expr::Unary {
                op: *op,
                operand: operand_t,
            })
        }
        Expr::Binary { op, lhs, rhs } => {
            let lhs_t = rewriter.rewrite_expr(lhs);
            let rhs_t = rewriter.rewrite_expr(rhs);
            let unchanged = cow::same(&lhs_t, lhs) && cow::same(&rhs_t, rhs);
            cow::rebuild(expr, unchanged, || Expr::Binary {
                op: *op,
                lhs: lhs_t,
                rhs: rhs_t,
            })
        }
        Expr::Member { object, field } => {
            let object_t = rewriter.rewrite_expr(object);
            cow::rebuild(expr, cow::same(&object_t, object), || Expr::Member {
                object: object_t,
                field: *field,
            })
        }
        Expr::Call { callee, args } => {
            let args_t = cow::update_seq(args, |arg| rewriter.rewrite_expr(arg));
            cow::rebuild(expr, cow::same(&args_t, args), || Expr::Call {
                callee: *callee,
                args: args_t,
            })
        }
        Expr::Record { fields } => {
            let fields_t = cow::update_pairs(fields, |value| rewriter.rewrite_expr(value));
            cow::rebuild(expr, cow::same(&fields_t, fields), || Expr::Record {
                fields: fields_t,
            })
        }
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
