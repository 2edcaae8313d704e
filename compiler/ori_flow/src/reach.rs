//! Unreachable-block and suspension-point bookkeeping at the end of a pass.
//!
//! A rewriter flags blocks that *may* have lost their last incoming edge.
//! Whether they actually did is read off the block tags: after the final
//! walk of the pass, a block belongs to the output graph iff its tag is at
//! or above the live watermark (`explored` when nothing changed, otherwise
//! `repaired`). A flagged block is an orphan when neither it nor its
//! latest version in the pass is live; both ids are recorded. Their
//! successors that are not live either were reachable only through them,
//! so they are orphaned too, however many levels down.

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::graph::SuspensionPoint;
use crate::ir::{BlockId, SuspensionId};
use crate::rewrite::RewriteCx;

/// Outcome of [`settle`].
pub(crate) struct Settled {
    pub unreachable: im::HashSet<BlockId>,
    pub suspension_points: Rc<[SuspensionPoint]>,
    pub newly_unreachable: usize,
    pub pruned: usize,
}

/// Compute the unreachable set and surviving suspension points of the
/// output graph.
pub(crate) fn settle(
    cx: &RewriteCx<'_>,
    live_mark: u64,
    previous: &im::HashSet<BlockId>,
    suspension_points: &Rc<[SuspensionPoint]>,
) -> Settled {
    let is_live = |id: BlockId| cx.block(id).is_ok_and(|block| block.tag.get() >= live_mark);
    // A superseded block is never live itself; it is gone only if its
    // replacement is not live either.
    let is_gone = |id: BlockId| !is_live(id) && !is_live(cx.resolve(id));

    // Blocks that are reached again leave the set.
    let mut unreachable: im::HashSet<BlockId> =
        previous.iter().copied().filter(|&id| !is_live(id)).collect();

    let mut orphans = Vec::new();
    let mut stack: Vec<BlockId> = cx
        .possibly_unreachable()
        .iter()
        .flat_map(|&id| with_latest(cx, id))
        .collect();
    let mut seen = FxHashSet::default();

    while let Some(id) = stack.pop() {
        if !seen.insert(id) || !is_gone(id) || unreachable.contains(&id) {
            continue;
        }
        let Ok(block) = cx.block(id) else {
            continue;
        };
        orphans.push(id);
        for target in block.successors() {
            stack.extend(with_latest(cx, target));
        }
    }

    let mut doomed: FxHashSet<SuspensionId> = FxHashSet::default();
    for &id in &orphans {
        if let Ok(block) = cx.block(id) {
            doomed.extend(block.suspension_points());
        }
        unreachable.insert(id);
    }

    let surviving = prune(suspension_points, &doomed);
    let pruned = suspension_points.len() - surviving.len();

    Settled {
        unreachable,
        suspension_points: surviving,
        newly_unreachable: orphans.len(),
        pruned,
    }
}

/// `id` followed by its latest version, if the pass replaced it.
fn with_latest(cx: &RewriteCx<'_>, id: BlockId) -> impl Iterator<Item = BlockId> {
    let latest = cx.resolve(id);
    std::iter::once(id).chain((latest != id).then_some(latest))
}

/// Drop the points in `doomed`, keeping the others in order. Shares the
/// input slice when nothing is dropped.
fn prune(
    points: &Rc<[SuspensionPoint]>,
    doomed: &FxHashSet<SuspensionId>,
) -> Rc<[SuspensionPoint]> {
    if doomed.is_empty() || !points.iter().any(|p| doomed.contains(&p.id)) {
        return Rc::clone(points);
    }
    points
        .iter()
        .filter(|p| !doomed.contains(&p.id))
        .copied()
        .collect()
}
