//! Copy-on-write rewriting of control-flow graphs for the Ori compiler.
//!
//! This crate provides:
//!
//! - **Flow IR** ([`Cfg`], [`Block`], [`Edge`], [`Stmt`], [`Expr`]): a
//!   control-flow graph with exception regions, enumerator loops, switch
//!   dispatch and coroutine suspension points.
//!
//! - **Rewrite engine** ([`rewrite`], [`Rewriter`], [`RewriteCx`]): applies
//!   node-local transformations and returns a new graph that shares every
//!   untouched block and operation subtree with the input. References left
//!   stale by a change (loop back-edges, merge points) are repaired in a
//!   second phase that only runs when something changed.
//!
//! - **Reachability bookkeeping**: blocks a transformation orphans join the
//!   graph's unreachable set and their suspension points are dropped.
//!
//! # Design
//!
//! Blocks are referenced by [`BlockId`] and owned by a persistent map in
//! each graph version, so older versions stay valid after any rewrite.
//! Visit state is a per-block integer tag compared against watermarks drawn
//! from a per-graph counter: starting a pass never has to reset tags.
//!
//! Enumerator loops are one compound [`Edge::Enumerate`] construct whose
//! acquire and advance roles share a [`LoopId`], so rewriting either side
//! never leaves the other pointing at a stale partner.
//!
//! # Example
//!
//! ```text
//! let mut b = CfgBuilder::new();
//! let exit = b.block(BlockKind::Exit, [], None);
//! let entry = b.block(BlockKind::Entry, [], Some(Edge::goto(exit)));
//! let cfg = b.finish(entry, exit)?;
//! let folded = rewrite(&cfg, &mut ConstantFolder)?;
//! ```

pub mod builder;
mod color;
pub mod cow;
pub mod error;
pub mod graph;
pub mod ir;
pub mod options;
mod reach;
pub mod rewrite;
pub mod verify;
pub mod visit;

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "fixtures are built from known-valid graphs"
)]
mod test_helpers;

use std::sync::Once;

pub use builder::CfgBuilder;
pub use error::CfgError;
pub use graph::{Cfg, SuspensionPoint};
pub use ir::{
    BinaryOp, Block, BlockId, BlockKind, Constant, Edge, EdgeRef, EnumStep, Expr, ExprRef, LocalId,
    LoopId, Name, Span, Stmt, StmtRef, StmtSeq, SuspensionId, UnaryOp,
};
pub use options::RewriteOptions;
pub use rewrite::{rewrite, rewrite_with, RewriteCx};
pub use verify::verify_cfg;
pub use visit::{walk_block, walk_edge, walk_expr, walk_stmt, walk_stmts, Rewriter};

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for debug output.
///
/// Safe to call multiple times. Enable with `RUST_LOG=ori_flow=debug`
/// (one event per pass) or `RUST_LOG=ori_flow=trace` (every replaced block).
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
