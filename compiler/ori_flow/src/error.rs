//! Errors raised while building, verifying or rewriting a graph.
//!
//! Every variant is a defect: either the producer handed over a graph that
//! breaks the structural invariants, or a rewrite broke a node contract.
//! None of them is recoverable inside a pass. The pass is abandoned and
//! the input graph, which is never mutated, stays valid.

use thiserror::Error;

use crate::ir::{BlockId, LoopId, SuspensionId};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum CfgError {
    /// A block id resolved to nothing in the graph's store.
    #[error("block {0} does not exist in this graph")]
    UnknownBlock(BlockId),

    /// An edge targets a block that is not part of the graph.
    #[error("block {from} has an edge to {target}, which is not part of the graph")]
    DanglingBlock { from: BlockId, target: BlockId },

    /// A reserved block id was never given a definition.
    #[error("block {0} was reserved but never defined")]
    UndefinedBlock(BlockId),

    /// A block id was defined twice.
    #[error("block {0} is already defined")]
    DuplicateBlock(BlockId),

    /// The exit block must not transfer control anywhere.
    #[error("exit block {0} has an outgoing edge")]
    ExitHasEdge(BlockId),

    /// A block plays a role its kind does not allow.
    #[error("block {block} is a {found} block but is used as {expected}")]
    WrongBlockKind {
        block: BlockId,
        expected: &'static str,
        found: &'static str,
    },

    /// An enumerator acquire/advance pair does not line up.
    #[error("enumerator {loop_id} at block {block} is not paired: {reason}")]
    MalformedLoop {
        loop_id: LoopId,
        block: BlockId,
        reason: &'static str,
    },

    /// A `yield` names a suspension point the graph does not record.
    #[error("block {block} yields at {point}, which is not a registered suspension point")]
    UnknownSuspensionPoint { point: SuspensionId, block: BlockId },

    /// Every block id of the lineage has been handed out.
    #[error("block id space of this graph is exhausted")]
    BlockIdsExhausted,

    /// A rewrite was started while another pass runs on the same lineage.
    #[error("a rewrite pass is already running on this graph")]
    PassInProgress,
}
