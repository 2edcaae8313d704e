//! The control-flow graph value and its lineage context.
//!
//! A [`Cfg`] is a persistent value: cloning it is O(1), and rewriting it
//! produces a new `Cfg` that shares every untouched block with the input.
//! Graph values handed out earlier stay valid after any later rewrite.
//!
//! All versions produced from one [`CfgBuilder`](crate::CfgBuilder) form a
//! *lineage* and share a [`GraphContext`]: the block-id allocator and the
//! coloring counter. Sharing them is what keeps ids unique across versions
//! and lets sequential passes skip the tag reset.

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::color::ColorClock;
use crate::error::CfgError;
use crate::ir::{Block, BlockId, Edge, EnumStep, Name, Span, SuspensionId};

/// Persistent block store of one graph version.
pub(crate) type BlockStore = im::HashMap<BlockId, Rc<Block>>;

/// A coroutine suspension point, recorded for state-machine lowering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SuspensionPoint {
    pub id: SuspensionId,
    /// Resume state index assigned by the producer.
    pub state: u32,
    pub span: Span,
}

// ── Lineage context ─────────────────────────────────────────────────

/// State shared by every version of one graph.
#[derive(Debug, Default)]
pub(crate) struct GraphContext {
    pub colors: ColorClock,
    next_block: Cell<u32>,
    in_pass: Cell<bool>,
}

impl GraphContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a block id unique within the lineage.
    pub fn alloc_block(&self) -> Result<BlockId, CfgError> {
        let raw = self.next_block.get();
        let next = raw.checked_add(1).ok_or(CfgError::BlockIdsExhausted)?;
        self.next_block.set(next);
        Ok(BlockId::new(raw))
    }

    /// Use up the id space so the next allocation fails.
    #[cfg(test)]
    pub fn exhaust_block_ids(&self) {
        self.next_block.set(u32::MAX);
    }

    /// Claim the lineage for a rewrite pass.
    ///
    /// Passes are not reentrant: watermarks and block tags are shared
    /// mutable state until the pass finishes.
    pub fn begin_pass(&self) -> Result<PassGuard<'_>, CfgError> {
        if self.in_pass.replace(true) {
            return Err(CfgError::PassInProgress);
        }
        Ok(PassGuard { context: self })
    }
}

/// Releases the lineage when the pass ends, including on early `?` exits.
pub(crate) struct PassGuard<'a> {
    context: &'a GraphContext,
}

impl Drop for PassGuard<'_> {
    fn drop(&mut self) {
        self.context.in_pass.set(false);
    }
}

// ── Graph ───────────────────────────────────────────────────────────

/// A control-flow graph.
///
/// Owns the blocks reachable from `entry` plus `exit`. The store may also
/// hold blocks that are no longer reachable (superseded versions, orphans);
/// they are invisible to every query that starts from the entry.
#[derive(Clone)]
pub struct Cfg {
    entry: BlockId,
    exit: BlockId,
    blocks: BlockStore,
    labels: Rc<[Name]>,
    suspension_points: Rc<[SuspensionPoint]>,
    unreachable: im::HashSet<BlockId>,
    context: Rc<GraphContext>,
}

/// Field bundle for assembling a [`Cfg`] inside the crate.
pub(crate) struct CfgParts {
    pub entry: BlockId,
    pub exit: BlockId,
    pub blocks: BlockStore,
    pub labels: Rc<[Name]>,
    pub suspension_points: Rc<[SuspensionPoint]>,
    pub unreachable: im::HashSet<BlockId>,
    pub context: Rc<GraphContext>,
}

impl Cfg {
    pub(crate) fn from_parts(parts: CfgParts) -> Self {
        Cfg {
            entry: parts.entry,
            exit: parts.exit,
            blocks: parts.blocks,
            labels: parts.labels,
            suspension_points: parts.suspension_points,
            unreachable: parts.unreachable,
            context: parts.context,
        }
    }

    pub(crate) fn store(&self) -> &BlockStore {
        &self.blocks
    }

    pub(crate) fn context(&self) -> &Rc<GraphContext> {
        &self.context
    }

    pub(crate) fn labels_shared(&self) -> &Rc<[Name]> {
        &self.labels
    }

    pub(crate) fn suspension_points_shared(&self) -> &Rc<[SuspensionPoint]> {
        &self.suspension_points
    }

    #[inline]
    pub fn entry(&self) -> BlockId {
        self.entry
    }

    #[inline]
    pub fn exit(&self) -> BlockId {
        self.exit
    }

    /// Look up a block by id.
    pub fn block(&self, id: BlockId) -> Option<&Rc<Block>> {
        self.blocks.get(&id)
    }

    /// Look up a block that must exist.
    pub fn expect_block(&self, id: BlockId) -> Result<&Rc<Block>, CfgError> {
        self.blocks.get(&id).ok_or(CfgError::UnknownBlock(id))
    }

    /// Declared labels. Diagnostic metadata, carried through rewrites verbatim.
    pub fn labels(&self) -> &[Name] {
        &self.labels
    }

    /// Suspension points still live in this graph, in declaration order.
    pub fn suspension_points(&self) -> &[SuspensionPoint] {
        &self.suspension_points
    }

    /// Blocks known to be unreachable from the entry.
    pub fn unreachable(&self) -> &im::HashSet<BlockId> {
        &self.unreachable
    }

    /// Successors of `id` (empty for unknown blocks and the exit).
    pub fn successors(&self, id: BlockId) -> SmallVec<[BlockId; 4]> {
        self.blocks
            .get(&id)
            .map(|block| block.successors())
            .unwrap_or_default()
    }

    /// Blocks reachable from the entry, in depth-first preorder.
    ///
    /// Iterative: deeply nested graphs must not overflow the stack.
    pub fn reachable_blocks(&self) -> Vec<BlockId> {
        let mut order = Vec::new();
        self.find_reachable(|block| {
            order.push(block.id());
            false
        });
        order
    }

    /// Walks from the entry until `id` is found. For many queries against
    /// one graph, collect [`reachable_blocks`](Self::reachable_blocks) once.
    pub fn is_reachable(&self, id: BlockId) -> bool {
        self.find_reachable(|block| block.id() == id).is_some()
    }

    /// First reachable block, in depth-first preorder, that satisfies
    /// `pred`. Stops as soon as one does.
    fn find_reachable(&self, mut pred: impl FnMut(&Block) -> bool) -> Option<BlockId> {
        let mut seen = FxHashSet::default();
        let mut stack = vec![self.entry];

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(block) = self.blocks.get(&id) else {
                continue;
            };
            if pred(block) {
                return Some(id);
            }
            // Reverse so the first successor is visited first.
            stack.extend(block.successors().into_iter().rev());
        }

        None
    }

    /// Deduplicated predecessor lists of the reachable blocks.
    pub fn predecessors(&self) -> FxHashMap<BlockId, SmallVec<[BlockId; 2]>> {
        let mut preds: FxHashMap<BlockId, SmallVec<[BlockId; 2]>> = FxHashMap::default();
        for id in self.reachable_blocks() {
            let mut seen = FxHashSet::default();
            for succ in self.successors(id) {
                if seen.insert(succ) {
                    preds.entry(succ).or_default().push(id);
                }
            }
        }
        preds
    }

    /// Find the block carrying the `Acquire` step paired with the `Advance`
    /// step on `header`.
    ///
    /// Returns `None` if `header` is not an advancing loop header or no
    /// reachable block acquires into it. One walk from the entry per call.
    pub fn paired_acquire(&self, header: BlockId) -> Option<BlockId> {
        let Some(Edge::Enumerate {
            loop_id,
            step: EnumStep::Advance { .. },
        }) = self.block(header)?.edge().map(|e| &**e)
        else {
            return None;
        };

        self.find_reachable(|block| {
            matches!(
                block.edge().map(|e| &**e),
                Some(Edge::Enumerate {
                    loop_id: acquire_loop,
                    step: EnumStep::Acquire { header: h, .. },
                }) if acquire_loop == loop_id && *h == header
            )
        })
    }

    /// Suspension points yielded in `id`.
    pub fn suspension_points_in(&self, id: BlockId) -> Vec<SuspensionId> {
        self.blocks
            .get(&id)
            .map(|block| block.suspension_points().collect())
            .unwrap_or_default()
    }

    /// Whether both graphs belong to the same lineage.
    pub fn same_lineage(&self, other: &Cfg) -> bool {
        Rc::ptr_eq(&self.context, &other.context)
    }
}

impl fmt::Debug for Cfg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cfg")
            .field("entry", &self.entry)
            .field("exit", &self.exit)
            .field("blocks", &self.blocks.len())
            .field("labels", &self.labels.len())
            .field("suspension_points", &self.suspension_points)
            .field("unreachable", &self.unreachable.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
