//! Graph construction.
//!
//! Edges name their targets by id, so a producer reserves ids first and
//! defines blocks in any order; [`CfgBuilder::finish`] checks that every
//! reserved id was defined and then runs [`verify_cfg`].

use std::rc::Rc;

use rustc_hash::FxHashSet;

use crate::error::CfgError;
use crate::graph::{BlockStore, Cfg, CfgParts, GraphContext, SuspensionPoint};
use crate::ir::{Block, BlockId, BlockKind, EdgeRef, LoopId, Name, Span, StmtRef, SuspensionId};
use crate::verify::verify_cfg;

/// Incremental builder for a [`Cfg`].
///
/// The finished graph starts a new lineage: every graph later rewritten
/// from it allocates block ids from the same counter.
pub struct CfgBuilder {
    context: Rc<GraphContext>,
    blocks: BlockStore,
    /// Reserved ids not yet defined.
    pending: FxHashSet<BlockId>,
    labels: Vec<Name>,
    suspension_points: Vec<SuspensionPoint>,
    next_loop: u32,
    /// First allocation failure, reported by `finish`.
    failed: Option<CfgError>,
}

impl Default for CfgBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl CfgBuilder {
    pub fn new() -> Self {
        CfgBuilder {
            context: Rc::new(GraphContext::new()),
            blocks: BlockStore::new(),
            pending: FxHashSet::default(),
            labels: Vec::new(),
            suspension_points: Vec::new(),
            next_loop: 0,
            failed: None,
        }
    }

    /// Reserve a block id to be defined later.
    pub fn reserve(&mut self) -> BlockId {
        let id = self.alloc();
        self.pending.insert(id);
        id
    }

    /// Define a previously reserved block.
    pub fn define(
        &mut self,
        id: BlockId,
        kind: BlockKind,
        stmts: impl IntoIterator<Item = StmtRef>,
        edge: Option<EdgeRef>,
    ) -> Result<(), CfgError> {
        if self.blocks.contains_key(&id) {
            return Err(CfgError::DuplicateBlock(id));
        }
        if !self.pending.remove(&id) {
            return Err(CfgError::UnknownBlock(id));
        }
        let block = Block::new(id, kind, stmts.into_iter().collect(), edge);
        self.blocks.insert(id, Rc::new(block));
        Ok(())
    }

    /// Reserve and define a block in one step. Its edge can only reference
    /// blocks that already have ids.
    pub fn block(
        &mut self,
        kind: BlockKind,
        stmts: impl IntoIterator<Item = StmtRef>,
        edge: Option<EdgeRef>,
    ) -> BlockId {
        let id = self.alloc();
        let block = Block::new(id, kind, stmts.into_iter().collect(), edge);
        self.blocks.insert(id, Rc::new(block));
        id
    }

    /// Once the id space runs out every further id is `u32::MAX` and
    /// `finish` fails.
    fn alloc(&mut self) -> BlockId {
        match self.context.alloc_block() {
            Ok(id) => id,
            Err(err) => {
                self.failed.get_or_insert(err);
                BlockId::new(u32::MAX)
            }
        }
    }

    /// Identity for a new enumerator loop.
    pub fn fresh_loop(&mut self) -> LoopId {
        let id = LoopId::new(self.next_loop);
        self.next_loop += 1;
        id
    }

    /// Register a suspension point. Points keep their registration order.
    pub fn suspension_point(&mut self, state: u32, span: Span) -> SuspensionId {
        let id = SuspensionId::new(u32::try_from(self.suspension_points.len()).unwrap_or(u32::MAX));
        self.suspension_points.push(SuspensionPoint { id, state, span });
        id
    }

    pub fn label(&mut self, name: Name) {
        self.labels.push(name);
    }

    /// Seal the graph.
    pub fn finish(self, entry: BlockId, exit: BlockId) -> Result<Cfg, CfgError> {
        if let Some(err) = self.failed {
            return Err(err);
        }
        if let Some(&id) = self.pending.iter().min() {
            return Err(CfgError::UndefinedBlock(id));
        }

        tracing::debug!(
            blocks = self.blocks.len(),
            suspension_points = self.suspension_points.len(),
            "built control-flow graph",
        );

        let cfg = Cfg::from_parts(CfgParts {
            entry,
            exit,
            blocks: self.blocks,
            labels: self.labels.into(),
            suspension_points: self.suspension_points.into(),
            unreachable: im::HashSet::new(),
            context: self.context,
        });
        verify_cfg(&cfg)?;
        Ok(cfg)
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
