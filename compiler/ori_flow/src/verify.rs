//! Structural invariant checks.
//!
//! Run on the producer's graph before a pass and on the result after it
//! (see [`RewriteOptions`](crate::RewriteOptions)). Only blocks reachable
//! from the entry, plus the exit, are checked: the store may legitimately
//! hold stale or orphaned blocks.

use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::CfgError;
use crate::graph::Cfg;
use crate::ir::{Block, BlockId, BlockKind, Edge, EnumStep, LoopId};

/// Check every structural invariant of `cfg`, failing on the first
/// violation.
///
/// - entry is an `Entry` block, exit is an `Exit` block without an edge
/// - every edge target exists
/// - `Try` handlers are `Handler` blocks, `Switch` cases are `Case` blocks
/// - enumerator steps are paired: each `Acquire` enters a header that
///   `Advance`s the same loop, and each `Advance` is entered by exactly one
///   such `Acquire`
/// - every `yield` names a registered suspension point
pub fn verify_cfg(cfg: &Cfg) -> Result<(), CfgError> {
    let entry = cfg.expect_block(cfg.entry())?;
    expect_kind(entry, "entry", |kind| kind == BlockKind::Entry)?;

    let exit = cfg.expect_block(cfg.exit())?;
    expect_kind(exit, "exit", |kind| kind == BlockKind::Exit)?;
    if exit.edge().is_some() {
        return Err(CfgError::ExitHasEdge(exit.id()));
    }

    let registered: FxHashSet<_> = cfg.suspension_points().iter().map(|p| p.id).collect();
    // header → loop it is acquired for
    let mut acquired: FxHashMap<BlockId, LoopId> = FxHashMap::default();
    let mut advancing: Vec<(BlockId, LoopId)> = Vec::new();

    let mut seen = FxHashSet::default();
    let mut stack = vec![cfg.entry()];
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        let block = cfg.expect_block(id)?;

        for point in block.suspension_points() {
            if !registered.contains(&point) {
                return Err(CfgError::UnknownSuspensionPoint { point, block: id });
            }
        }

        let Some(edge) = block.edge() else {
            continue;
        };
        for target in edge.successors() {
            if cfg.block(target).is_none() {
                return Err(CfgError::DanglingBlock { from: id, target });
            }
            stack.push(target);
        }

        match &**edge {
            Edge::Try { handlers, .. } => {
                for &handler in handlers.iter() {
                    let block = cfg.expect_block(handler)?;
                    expect_kind(block, "handler", |kind| {
                        matches!(kind, BlockKind::Handler { .. })
                    })?;
                }
            }
            Edge::Switch { cases, .. } => {
                for &case in cases.iter() {
                    let block = cfg.expect_block(case)?;
                    expect_kind(block, "case", |kind| matches!(kind, BlockKind::Case { .. }))?;
                }
            }
            Edge::Enumerate {
                loop_id,
                step: EnumStep::Acquire { header, .. },
            } => {
                check_acquire(cfg, id, *loop_id, *header)?;
                if acquired.insert(*header, *loop_id).is_some() {
                    return Err(CfgError::MalformedLoop {
                        loop_id: *loop_id,
                        block: *header,
                        reason: "loop header is acquired more than once",
                    });
                }
            }
            Edge::Enumerate {
                loop_id,
                step: EnumStep::Advance { .. },
            } => advancing.push((id, *loop_id)),
            Edge::Goto { .. } | Edge::Leave { .. } | Edge::Branch { .. } => {}
        }
    }

    for (header, loop_id) in advancing {
        if acquired.get(&header) != Some(&loop_id) {
            return Err(CfgError::MalformedLoop {
                loop_id,
                block: header,
                reason: "advance step has no matching acquire",
            });
        }
    }

    Ok(())
}

fn expect_kind(
    block: &Block,
    expected: &'static str,
    accepts: impl FnOnce(BlockKind) -> bool,
) -> Result<(), CfgError> {
    if accepts(block.kind()) {
        Ok(())
    } else {
        Err(CfgError::WrongBlockKind {
            block: block.id(),
            expected,
            found: block.kind().name(),
        })
    }
}

fn check_acquire(
    cfg: &Cfg,
    from: BlockId,
    loop_id: LoopId,
    header: BlockId,
) -> Result<(), CfgError> {
    let edge = cfg.block(header).and_then(|block| block.edge()).map(|e| &**e);
    match edge {
        Some(Edge::Enumerate {
            loop_id: advance_loop,
            step: EnumStep::Advance { .. },
        }) if *advance_loop == loop_id => Ok(()),
        Some(Edge::Enumerate {
            step: EnumStep::Advance { .. },
            ..
        }) => Err(CfgError::MalformedLoop {
            loop_id,
            block: from,
            reason: "header advances a different loop",
        }),
        _ => Err(CfgError::MalformedLoop {
            loop_id,
            block: from,
            reason: "acquire does not enter an advancing header",
        }),
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
