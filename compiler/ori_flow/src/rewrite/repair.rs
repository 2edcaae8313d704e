//! Phase 2: retarget stale references after the update phase.
//!
//! The walk follows every edge through the replacement table, so it only
//! ever reaches final block versions. Each reached block is stamped with the
//! `repaired` watermark, which both memoizes the walk and, afterwards, marks
//! exactly the blocks of the output graph.
//!
//! Blocks created in this pass are private to it and get their edges
//! overwritten in place. A block that predates the pass is shared with the
//! input graph and is never touched: when its edge must change it is cloned
//! under a fresh id instead. That is needed when it references a replaced
//! block, or a block that is itself being cloned, so the second condition is
//! propagated backwards through pre-existing predecessors until it settles.
//! Every other pre-existing block keeps its identity.

use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use super::RewriteCx;
use crate::cow;
use crate::error::CfgError;
use crate::ir::{Block, BlockId};

pub(super) struct RepairOutcome {
    pub entry: BlockId,
    pub cloned: usize,
}

struct Reached {
    id: BlockId,
    /// Predates the pass (neither created by the rewriter nor cloned).
    original: bool,
}

pub(super) fn repair(cx: &mut RewriteCx<'_>, root: BlockId) -> Result<RepairOutcome, CfgError> {
    let marks = cx.marks;
    let root = cx.resolve(root);

    // Discover the output graph and the originals with stale edges.
    let mut reached = Vec::new();
    let mut originals = FxHashSet::default();
    let mut preds: FxHashMap<BlockId, SmallVec<[BlockId; 2]>> = FxHashMap::default();
    let mut dirty: Vec<BlockId> = Vec::new();
    let mut stack = vec![root];

    while let Some(id) = stack.pop() {
        let block = Rc::clone(cx.block(id)?);
        let tag = block.tag.get();
        if marks.is_repaired(tag) {
            continue;
        }
        let original = marks.is_original(tag);
        block.tag.set(marks.repaired);
        reached.push(Reached { id, original });
        if original {
            originals.insert(id);
        }

        let mut stale = false;
        for target in block.successors() {
            let resolved = cx.resolve(target);
            stale |= resolved != target;
            let entry = preds.entry(resolved).or_default();
            if entry.last() != Some(&id) {
                entry.push(id);
            }
            stack.push(resolved);
        }
        if original && stale {
            dirty.push(id);
        }
    }

    // A cloned original gets a new id, so its original predecessors must be
    // cloned as well.
    let mut must_clone: FxHashSet<BlockId> = dirty.iter().copied().collect();
    while let Some(id) = dirty.pop() {
        for &pred in preds.get(&id).into_iter().flatten() {
            if originals.contains(&pred) && must_clone.insert(pred) {
                dirty.push(pred);
            }
        }
    }

    // Clone, then retarget every pass-private block in one sweep.
    let mut private = Vec::with_capacity(reached.len());
    for Reached { id, original } in reached {
        if !original {
            private.push(id);
        } else if must_clone.contains(&id) {
            let clone_id = cx.context.alloc_block()?;
            let clone = cx.block(id)?.clone_as(clone_id, marks.repaired);
            cx.store.insert(clone_id, Rc::new(clone));
            cx.replaced.insert(id, clone_id);
            tracing::trace!(original = %id, clone = %clone_id, "cloned block for repair");
            private.push(clone_id);
        }
    }

    for id in private {
        retarget(cx, id)?;
    }

    Ok(RepairOutcome {
        entry: cx.resolve(root),
        cloned: must_clone.len(),
    })
}

/// Overwrite the edge of a pass-private block with fully resolved targets.
fn retarget(cx: &mut RewriteCx<'_>, id: BlockId) -> Result<(), CfgError> {
    let block = Rc::clone(cx.block(id)?);
    let Some(edge) = block.edge() else {
        return Ok(());
    };
    let resolved = edge.map_targets(|target| cx.resolve(target));
    if !cow::same(&resolved, edge) {
        debug_assert!(
            !cx.marks.is_original(block.tag.get()),
            "repair must not overwrite {id}, which is shared with the input graph",
        );
        cx.store.insert(id, Rc::new(Block::with_edge(&block, resolved)));
    }
    Ok(())
}
