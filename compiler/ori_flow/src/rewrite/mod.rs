//! The two-phase rewrite engine.
//!
//! # Algorithm
//!
//! 1. **Update.** Depth-first from the entry. Each block is entered once
//!    per pass: its tag is stamped `explored` *before* recursing, so a
//!    back-edge to a block still on the stack just returns the block's id.
//!    The [`Rewriter`] rebuilds statements and edge; a block that comes back
//!    as a different id is recorded in the pass's replacement table.
//!
//! 2. **Repair.** Only when the table is non-empty. The update phase can
//!    leave stale ids behind: a block reached a second time (through a
//!    back-edge or a merge point) was returned as it was on first entry,
//!    before its own rewrite finished. Repair re-walks the result, resolves
//!    every target through the table, and rebuilds exactly the blocks whose
//!    edges must change (see [`repair`]).
//!
//! 3. **Settle.** Blocks the rewriter flagged with
//!    [`RewriteCx::mark_possibly_unreachable`] that the final walk did not
//!    reach, together with everything reachable only through them, join the
//!    unreachable set; their suspension points are dropped.
//!
//! # Ownership
//!
//! The input graph is never modified. The pass works on an O(1) clone of
//! the persistent block store; blocks it creates are private to the pass
//! until the new [`Cfg`] is returned, which is what allows repair to
//! overwrite their edges.

mod repair;

use std::rc::Rc;

use rustc_hash::FxHashMap;

use crate::color::Watermarks;
use crate::cow;
use crate::error::CfgError;
use crate::graph::{BlockStore, Cfg, CfgParts, GraphContext};
use crate::ir::{Block, BlockId, BlockKind, EdgeRef, StmtSeq};
use crate::options::RewriteOptions;
use crate::reach;
use crate::verify::verify_cfg;
use crate::visit::Rewriter;

/// Minimum stack to keep available before entering another block.
#[cfg(not(target_arch = "wasm32"))]
const STACK_RED_ZONE: usize = 100 * 1024;

/// Stack allocated whenever the red zone is hit.
#[cfg(not(target_arch = "wasm32"))]
const STACK_GROWTH: usize = 1024 * 1024;

/// Pass-scoped engine state handed to [`Rewriter`] hooks.
pub struct RewriteCx<'g> {
    context: &'g GraphContext,
    marks: Watermarks,
    store: BlockStore,
    /// Old block id → the block that supersedes it.
    replaced: FxHashMap<BlockId, BlockId>,
    possibly_unreachable: Vec<BlockId>,
    created: usize,
}

impl<'g> RewriteCx<'g> {
    fn new(context: &'g GraphContext, marks: Watermarks, store: BlockStore) -> Self {
        RewriteCx {
            context,
            marks,
            store,
            replaced: FxHashMap::default(),
            possibly_unreachable: Vec::new(),
            created: 0,
        }
    }

    /// Look up a block in the graph being rewritten.
    ///
    /// Sees both the input blocks and those created earlier in this pass.
    pub fn block(&self, id: BlockId) -> Result<&Rc<Block>, CfgError> {
        self.store.get(&id).ok_or(CfgError::UnknownBlock(id))
    }

    /// Follow a block reference: rewrite the target (once per pass) and
    /// return the id to reference from now on.
    pub fn visit_block<R: Rewriter>(
        &mut self,
        rewriter: &mut R,
        id: BlockId,
    ) -> Result<BlockId, CfgError> {
        let block = Rc::clone(self.block(id)?);
        if self.marks.is_explored(block.tag.get()) {
            return Ok(id);
        }
        block.tag.set(self.marks.explored);

        let new_id = grow_stack(|| rewriter.rewrite_block(self, &block))?;
        if new_id != id {
            tracing::trace!(old = %id, new = %new_id, "block replaced");
            self.replaced.insert(id, new_id);
        }
        Ok(new_id)
    }

    /// Copy-on-write block update: returns `block.id()` when `stmts` and
    /// `edge` are the block's own, otherwise a new block of the same kind.
    pub fn update_block(
        &mut self,
        block: &Block,
        stmts: StmtSeq,
        edge: Option<EdgeRef>,
    ) -> Result<BlockId, CfgError> {
        if cow::same(&stmts, block.stmts()) && cow::same_opt(&edge, &block.edge().cloned()) {
            return Ok(block.id());
        }
        self.new_block(block.kind(), stmts, edge)
    }

    /// Create a block in this pass.
    pub fn new_block(
        &mut self,
        kind: BlockKind,
        stmts: StmtSeq,
        edge: Option<EdgeRef>,
    ) -> Result<BlockId, CfgError> {
        let id = self.context.alloc_block()?;
        let block = Block::new(id, kind, stmts, edge);
        block.tag.set(self.marks.changed);
        self.store.insert(id, Rc::new(block));
        self.created += 1;
        Ok(id)
    }

    /// Flag a block that may have lost its last incoming edge.
    ///
    /// Flagging a block that turns out to be reachable is harmless.
    pub fn mark_possibly_unreachable(&mut self, id: BlockId) {
        self.possibly_unreachable.push(id);
    }

    /// Latest version of `id` recorded so far in this pass.
    pub(crate) fn resolve(&self, id: BlockId) -> BlockId {
        let mut current = id;
        // Chains form when a rewriter hands back another pre-existing block.
        // Bounded so that two blocks returning each other cannot spin.
        for _ in 0..=self.replaced.len() {
            match self.replaced.get(&current) {
                Some(&next) if next != current => current = next,
                _ => break,
            }
        }
        current
    }

    pub(crate) fn possibly_unreachable(&self) -> &[BlockId] {
        &self.possibly_unreachable
    }
}

#[cfg(not(target_arch = "wasm32"))]
#[inline]
fn grow_stack<T>(f: impl FnOnce() -> T) -> T {
    stacker::maybe_grow(STACK_RED_ZONE, STACK_GROWTH, f)
}

/// WASM manages its own stack.
#[cfg(target_arch = "wasm32")]
#[inline]
fn grow_stack<T>(f: impl FnOnce() -> T) -> T {
    f()
}

// ── Entry points ────────────────────────────────────────────────────

/// Rewrite `cfg` with default [`RewriteOptions`].
pub fn rewrite<R: Rewriter>(cfg: &Cfg, rewriter: &mut R) -> Result<Cfg, CfgError> {
    rewrite_with(cfg, rewriter, &RewriteOptions::default())
}

/// Rewrite `cfg`, returning a new graph that shares every untouched block
/// with the input.
///
/// On error the pass is abandoned; `cfg` is unaffected and still valid.
pub fn rewrite_with<R: Rewriter>(
    cfg: &Cfg,
    rewriter: &mut R,
    options: &RewriteOptions,
) -> Result<Cfg, CfgError> {
    if options.verify_input {
        verify_cfg(cfg)?;
    }

    let context = cfg.context();
    let result = {
        let _pass = context.begin_pass()?;
        let marks = context.colors.next_pass();
        let mut cx = RewriteCx::new(context, marks, cfg.store().clone());

        // Phase 1: update.
        let entry = cx.visit_block(rewriter, cfg.entry())?;
        let changed = cx.replaced.len();

        // Phase 2: repair, only if something was replaced.
        let (entry, live_mark, cloned) = if cx.replaced.is_empty() {
            (entry, marks.explored, 0)
        } else {
            let outcome = repair::repair(&mut cx, entry)?;
            (outcome.entry, marks.repaired, outcome.cloned)
        };

        // Settle unreachable blocks and suspension points.
        let settled = reach::settle(
            &cx,
            live_mark,
            cfg.unreachable(),
            cfg.suspension_points_shared(),
        );

        tracing::debug!(
            changed,
            created = cx.created,
            cloned,
            newly_unreachable = settled.newly_unreachable,
            pruned_suspension_points = settled.pruned,
            "rewrote control-flow graph",
        );

        let exit = cx.resolve(cfg.exit());
        Cfg::from_parts(CfgParts {
            entry,
            exit,
            blocks: cx.store,
            labels: Rc::clone(cfg.labels_shared()),
            suspension_points: settled.suspension_points,
            unreachable: settled.unreachable,
            context: Rc::clone(context),
        })
    };

    if options.verify_output {
        verify_cfg(&result)?;
    }
    Ok(result)
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
mod tests;
