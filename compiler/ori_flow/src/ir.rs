//! Flow IR: blocks, edges and operation trees of the control-flow graph.
//!
//! # Architecture
//!
//! - **[`Block`]**: straight-line statements plus at most one outgoing [`Edge`]
//! - **[`Edge`]**: how control leaves a block (goto, branch, try, loop, switch)
//! - **[`Stmt`] / [`Expr`]**: tree-shaped operation nodes behind `Rc`
//!
//! Blocks form a general directed graph (loops, merge points, handler
//! cross-references), so they are never linked by pointer. Edges name their
//! targets by [`BlockId`] and the owning [`Cfg`](crate::Cfg) resolves them.
//! A `BlockId` always denotes one immutable block value: rewriting a block
//! produces a block with a fresh id.
//!
//! Operation nodes are plain trees. Sharing an `Rc` between an old and a
//! new tree is how copy-on-write avoids re-allocating untouched subtrees;
//! "unchanged" always means "the same `Rc`" (see [`crate::cow`]).

use std::cell::Cell;
use std::fmt;
use std::rc::Rc;

use smallvec::{smallvec, SmallVec};

use crate::cow;

// ── ID newtypes ─────────────────────────────────────────────────────

macro_rules! define_id {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
        #[repr(transparent)]
        pub struct $name(u32);

        impl $name {
            /// Create an ID from a raw index.
            #[inline]
            pub const fn new(raw: u32) -> Self {
                Self(raw)
            }

            /// Get the raw `u32` value.
            #[inline]
            pub const fn raw(self) -> u32 {
                self.0
            }

            /// Get the index as `usize`.
            #[inline]
            pub const fn index(self) -> usize {
                self.0 as usize
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

define_id!(
    /// Handle of a block within one graph lineage.
    ///
    /// Allocated by the lineage's `GraphContext`, so ids never collide
    /// between the blocks of an input graph and those created by rewriting it.
    BlockId,
    "bb"
);

define_id!(
    /// Identity of one enumerator loop, shared by its acquire and advance steps.
    LoopId,
    "loop"
);

define_id!(
    /// Identity of a coroutine suspension point (a `yield` site).
    SuspensionId,
    "sp"
);

define_id!(
    /// Local variable slot.
    LocalId,
    "%"
);

define_id!(
    /// Interned identifier (callee, field, label or type name) from the binder.
    Name,
    "#"
);

/// Source position: byte offsets, `end` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: u32,
    pub end: u32,
}

impl Span {
    /// Span for synthesized code.
    pub const DUMMY: Span = Span { start: 0, end: 0 };

    #[inline]
    pub const fn new(start: u32, end: u32) -> Self {
        Span { start, end }
    }
}

// ── Operation nodes ─────────────────────────────────────────────────

pub type ExprRef = Rc<Expr>;
pub type StmtRef = Rc<Stmt>;

/// Ordered sequence of expressions.
pub type ExprSeq = Rc<[ExprRef]>;

/// Key/value sequence of expressions (record fields).
pub type FieldSeq = Rc<[(Name, ExprRef)]>;

/// Ordered statement sequence of a block.
pub type StmtSeq = Rc<[StmtRef]>;

/// Compile-time constant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Constant {
    Int(i64),
    Bool(bool),
    Str(Name),
    Null,
    /// An enumeration source statically known to produce no elements.
    EmptySource,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Eq,
    NotEq,
    Lt,
    And,
    Or,
}

/// Expression tree node.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Expr {
    Const(Constant),
    Local(LocalId),
    Unary {
        op: UnaryOp,
        operand: ExprRef,
    },
    Binary {
        op: BinaryOp,
        lhs: ExprRef,
        rhs: ExprRef,
    },
    /// Field read: `object.field`.
    Member {
        object: ExprRef,
        field: Name,
    },
    /// Direct call: `callee(args...)`.
    Call {
        callee: Name,
        args: ExprSeq,
    },
    /// Record literal: `{ name: value, ... }`.
    Record {
        fields: FieldSeq,
    },
}

impl Expr {
    pub fn constant(value: Constant) -> ExprRef {
        Rc::new(Expr::Const(value))
    }

    pub fn local(local: LocalId) -> ExprRef {
        Rc::new(Expr::Local(local))
    }

    pub fn unary(op: UnaryOp, operand: ExprRef) -> ExprRef {
        Rc::new(Expr::Unary { op, operand })
    }

    pub fn binary(op: BinaryOp, lhs: ExprRef, rhs: ExprRef) -> ExprRef {
        Rc::new(Expr::Binary { op, lhs, rhs })
    }

    pub fn member(object: ExprRef, field: Name) -> ExprRef {
        Rc::new(Expr::Member { object, field })
    }

    pub fn call(callee: Name, args: impl IntoIterator<Item = ExprRef>) -> ExprRef {
        Rc::new(Expr::Call {
            callee,
            args: args.into_iter().collect(),
        })
    }

    pub fn record(fields: impl IntoIterator<Item = (Name, ExprRef)>) -> ExprRef {
        Rc::new(Expr::Record {
            fields: fields.into_iter().collect(),
        })
    }

    /// Returns the constant if this node is a literal.
    pub fn as_const(&self) -> Option<Constant> {
        match self {
            Expr::Const(c) => Some(*c),
            _ => None,
        }
    }
}

/// Statement node: one entry of a block's straight-line sequence.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Stmt {
    /// `target = value`. `target` is an l-value expression.
    Assign { target: ExprRef, value: ExprRef },
    /// Expression evaluated for its side effects.
    Eval(ExprRef),
    /// Coroutine suspension. `point` must be registered with the graph.
    Yield {
        point: SuspensionId,
        value: Option<ExprRef>,
    },
}

impl Stmt {
    pub fn assign(target: ExprRef, value: ExprRef) -> StmtRef {
        Rc::new(Stmt::Assign { target, value })
    }

    pub fn eval(expr: ExprRef) -> StmtRef {
        Rc::new(Stmt::Eval(expr))
    }

    pub fn yield_at(point: SuspensionId, value: Option<ExprRef>) -> StmtRef {
        Rc::new(Stmt::Yield { point, value })
    }
}

// ── Edges ───────────────────────────────────────────────────────────

pub type EdgeRef = Rc<Edge>;

/// The two roles of an enumerator loop.
///
/// `Acquire` sits on the loop's preheader and enters the loop header;
/// `Advance` sits on the header itself and either runs the body or leaves
/// the loop. Both carry the same [`LoopId`]; the pairing is by that value,
/// so it stays valid whichever side a rewrite rebuilds.
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum EnumStep {
    Acquire {
        /// Produces the enumeration source.
        source: ExprRef,
        is_async: bool,
        header: BlockId,
    },
    Advance {
        body: BlockId,
        next: BlockId,
        /// Binding target for the element key, if any.
        key: Option<ExprRef>,
        /// Binding target for the element value, if any.
        value: Option<ExprRef>,
        span: Span,
    },
}

/// Outgoing control transfer of a block.
///
/// Every edge is owned by exactly one block. Successors are referenced by
/// [`BlockId`].
#[derive(Debug, PartialEq, Eq, Hash)]
pub enum Edge {
    /// Unconditional transfer.
    Goto { target: BlockId },

    /// Early exit through enclosing constructs (`break`, `return` through
    /// `finally`, ...).
    Leave { target: BlockId },

    /// Two-way conditional transfer.
    Branch {
        cond: ExprRef,
        then_block: BlockId,
        else_block: BlockId,
    },

    /// Protected region. `handlers` must be `Handler` blocks.
    Try {
        body: BlockId,
        handlers: Rc<[BlockId]>,
        finally: Option<BlockId>,
        next: BlockId,
    },

    /// Enumerator loop step, see [`EnumStep`].
    Enumerate { loop_id: LoopId, step: EnumStep },

    /// Multi-way dispatch. `cases` must be `Case` blocks.
    Switch {
        discriminant: ExprRef,
        cases: Rc<[BlockId]>,
        next: BlockId,
    },
}

impl Edge {
    pub fn goto(target: BlockId) -> EdgeRef {
        Rc::new(Edge::Goto { target })
    }

    pub fn leave(target: BlockId) -> EdgeRef {
        Rc::new(Edge::Leave { target })
    }

    pub fn branch(cond: ExprRef, then_block: BlockId, else_block: BlockId) -> EdgeRef {
        Rc::new(Edge::Branch {
            cond,
            then_block,
            else_block,
        })
    }

    pub fn try_catch(
        body: BlockId,
        handlers: impl IntoIterator<Item = BlockId>,
        finally: Option<BlockId>,
        next: BlockId,
    ) -> EdgeRef {
        Rc::new(Edge::Try {
            body,
            handlers: handlers.into_iter().collect(),
            finally,
            next,
        })
    }

    pub fn acquire(loop_id: LoopId, source: ExprRef, is_async: bool, header: BlockId) -> EdgeRef {
        Rc::new(Edge::Enumerate {
            loop_id,
            step: EnumStep::Acquire {
                source,
                is_async,
                header,
            },
        })
    }

    pub fn advance(
        loop_id: LoopId,
        body: BlockId,
        next: BlockId,
        key: Option<ExprRef>,
        value: Option<ExprRef>,
        span: Span,
    ) -> EdgeRef {
        Rc::new(Edge::Enumerate {
            loop_id,
            step: EnumStep::Advance {
                body,
                next,
                key,
                value,
                span,
            },
        })
    }

    pub fn switch(
        discriminant: ExprRef,
        cases: impl IntoIterator<Item = BlockId>,
        next: BlockId,
    ) -> EdgeRef {
        Rc::new(Edge::Switch {
            discriminant,
            cases: cases.into_iter().collect(),
            next,
        })
    }

    /// Successor block ids in traversal order.
    ///
    /// `SmallVec` keeps the common case (at most two successors)
    /// allocation-free.
    pub fn successors(&self) -> SmallVec<[BlockId; 4]> {
        match self {
            Edge::Goto { target } | Edge::Leave { target } => smallvec![*target],
            Edge::Branch {
                then_block,
                else_block,
                ..
            } => smallvec![*then_block, *else_block],
            Edge::Try {
                body,
                handlers,
                finally,
                next,
            } => {
                let mut targets = SmallVec::with_capacity(handlers.len() + 3);
                targets.push(*body);
                targets.extend(handlers.iter().copied());
                targets.extend(*finally);
                targets.push(*next);
                targets
            }
            Edge::Enumerate { step, .. } => match step {
                EnumStep::Acquire { header, .. } => smallvec![*header],
                EnumStep::Advance { body, next, .. } => smallvec![*body, *next],
            },
            Edge::Switch { cases, next, .. } => {
                let mut targets = SmallVec::with_capacity(cases.len() + 1);
                targets.extend(cases.iter().copied());
                targets.push(*next);
                targets
            }
        }
    }

    /// Copy-on-write retargeting: calls `f` on every successor (in
    /// [`successors`](Self::successors) order) and returns `self` when no
    /// target changed.
    pub fn try_map_targets<E>(
        self: &Rc<Self>,
        mut f: impl FnMut(BlockId) -> Result<BlockId, E>,
    ) -> Result<EdgeRef, E> {
        let rebuilt = match &**self {
            Edge::Goto { target } => {
                let t = f(*target)?;
                (t != *target).then_some(Edge::Goto { target: t })
            }
            Edge::Leave { target } => {
                let t = f(*target)?;
                (t != *target).then_some(Edge::Leave { target: t })
            }
            Edge::Branch {
                cond,
                then_block,
                else_block,
            } => {
                let then_t = f(*then_block)?;
                let else_t = f(*else_block)?;
                (then_t != *then_block || else_t != *else_block).then(|| Edge::Branch {
                    cond: Rc::clone(cond),
                    then_block: then_t,
                    else_block: else_t,
                })
            }
            Edge::Try {
                body,
                handlers,
                finally,
                next,
            } => {
                let body_t = f(*body)?;
                let handlers_t = cow::try_update_ids(handlers, &mut f)?;
                let finally_t = finally.map(&mut f).transpose()?;
                let next_t = f(*next)?;
                let unchanged = body_t == *body
                    && Rc::ptr_eq(&handlers_t, handlers)
                    && finally_t == *finally
                    && next_t == *next;
                (!unchanged).then_some(Edge::Try {
                    body: body_t,
                    handlers: handlers_t,
                    finally: finally_t,
                    next: next_t,
                })
            }
            Edge::Enumerate { loop_id, step } => match step {
                EnumStep::Acquire {
                    source,
                    is_async,
                    header,
                } => {
                    let header_t = f(*header)?;
                    (header_t != *header).then(|| Edge::Enumerate {
                        loop_id: *loop_id,
                        step: EnumStep::Acquire {
                            source: Rc::clone(source),
                            is_async: *is_async,
                            header: header_t,
                        },
                    })
                }
                EnumStep::Advance {
                    body,
                    next,
                    key,
                    value,
                    span,
                } => {
                    let body_t = f(*body)?;
                    let next_t = f(*next)?;
                    (body_t != *body || next_t != *next).then(|| Edge::Enumerate {
                        loop_id: *loop_id,
                        step: EnumStep::Advance {
                            body: body_t,
                            next: next_t,
                            key: key.clone(),
                            value: value.clone(),
                            span: *span,
                        },
                    })
                }
            },
            Edge::Switch {
                discriminant,
                cases,
                next,
            } => {
                let cases_t = cow::try_update_ids(cases, &mut f)?;
                let next_t = f(*next)?;
                (!Rc::ptr_eq(&cases_t, cases) || next_t != *next).then(|| Edge::Switch {
                    discriminant: Rc::clone(discriminant),
                    cases: cases_t,
                    next: next_t,
                })
            }
        };
        Ok(rebuilt.map_or_else(|| Rc::clone(self), Rc::new))
    }

    /// Infallible form of [`try_map_targets`](Self::try_map_targets).
    pub fn map_targets(self: &Rc<Self>, mut f: impl FnMut(BlockId) -> BlockId) -> EdgeRef {
        let result: Result<EdgeRef, std::convert::Infallible> =
            self.try_map_targets(|t| Ok(f(t)));
        match result {
            Ok(edge) => edge,
            Err(never) => match never {},
        }
    }

    /// Copy-on-write over the operand slots (condition, enumeration source,
    /// key/value bindings, switch discriminant).
    pub fn map_operands(self: &Rc<Self>, mut f: impl FnMut(&ExprRef) -> ExprRef) -> EdgeRef {
        match &**self {
            Edge::Goto { .. } | Edge::Leave { .. } | Edge::Try { .. } => Rc::clone(self),
            Edge::Branch {
                cond,
                then_block,
                else_block,
            } => {
                let cond_t = f(cond);
                cow::rebuild(self, cow::same(&cond_t, cond), || Edge::Branch {
                    cond: cond_t,
                    then_block: *then_block,
                    else_block: *else_block,
                })
            }
            Edge::Enumerate { loop_id, step } => match step {
                EnumStep::Acquire {
                    source,
                    is_async,
                    header,
                } => {
                    let source_t = f(source);
                    cow::rebuild(self, cow::same(&source_t, source), || Edge::Enumerate {
                        loop_id: *loop_id,
                        step: EnumStep::Acquire {
                            source: source_t,
                            is_async: *is_async,
                            header: *header,
                        },
                    })
                }
                EnumStep::Advance {
                    body,
                    next,
                    key,
                    value,
                    span,
                } => {
                    let key_t = cow::update_opt(key, &mut f);
                    let value_t = cow::update_opt(value, &mut f);
                    let unchanged = cow::same_opt(&key_t, key) && cow::same_opt(&value_t, value);
                    cow::rebuild(self, unchanged, || Edge::Enumerate {
                        loop_id: *loop_id,
                        step: EnumStep::Advance {
                            body: *body,
                            next: *next,
                            key: key_t,
                            value: value_t,
                            span: *span,
                        },
                    })
                }
            },
            Edge::Switch {
                discriminant,
                cases,
                next,
            } => {
                let disc_t = f(discriminant);
                cow::rebuild(self, cow::same(&disc_t, discriminant), || Edge::Switch {
                    discriminant: disc_t,
                    cases: Rc::clone(cases),
                    next: *next,
                })
            }
        }
    }

    /// Short variant name for diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Edge::Goto { .. } => "goto",
            Edge::Leave { .. } => "leave",
            Edge::Branch { .. } => "branch",
            Edge::Try { .. } => "try",
            Edge::Enumerate {
                step: EnumStep::Acquire { .. },
                ..
            } => "enumerate.acquire",
            Edge::Enumerate {
                step: EnumStep::Advance { .. },
                ..
            } => "enumerate.advance",
            Edge::Switch { .. } => "switch",
        }
    }
}

// ── Blocks ──────────────────────────────────────────────────────────

/// Role of a block in the graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Plain,
    Entry,
    Exit,
    /// Exception handler: target of a `Try` edge.
    Handler {
        catches: Option<Name>,
        binding: Option<LocalId>,
    },
    /// Switch arm: target of a `Switch` edge. `None` is the default arm.
    Case { label: Option<Constant> },
}

impl BlockKind {
    pub fn name(self) -> &'static str {
        match self {
            BlockKind::Plain => "plain",
            BlockKind::Entry => "entry",
            BlockKind::Exit => "exit",
            BlockKind::Handler { .. } => "handler",
            BlockKind::Case { .. } => "case",
        }
    }
}

/// A node of the control-flow graph.
///
/// Immutable once published in a [`Cfg`](crate::Cfg). The `tag` is scratch
/// state for the rewrite engine's coloring and means nothing outside an
/// active pass.
#[derive(Debug)]
pub struct Block {
    id: BlockId,
    kind: BlockKind,
    stmts: StmtSeq,
    edge: Option<EdgeRef>,
    pub(crate) tag: Cell<u64>,
}

impl Block {
    pub(crate) fn new(id: BlockId, kind: BlockKind, stmts: StmtSeq, edge: Option<EdgeRef>) -> Self {
        Block {
            id,
            kind,
            stmts,
            edge,
            tag: Cell::new(0),
        }
    }

    /// Shallow copy under a new id. Statements and edge are shared.
    pub(crate) fn clone_as(&self, id: BlockId, tag: u64) -> Self {
        Block {
            id,
            kind: self.kind,
            stmts: Rc::clone(&self.stmts),
            edge: self.edge.clone(),
            tag: Cell::new(tag),
        }
    }

    /// Same block (same id) with its outgoing edge replaced.
    pub(crate) fn with_edge(&self, edge: EdgeRef) -> Self {
        Block {
            id: self.id,
            kind: self.kind,
            stmts: Rc::clone(&self.stmts),
            edge: Some(edge),
            tag: Cell::new(self.tag.get()),
        }
    }

    #[inline]
    pub fn id(&self) -> BlockId {
        self.id
    }

    #[inline]
    pub fn kind(&self) -> BlockKind {
        self.kind
    }

    #[inline]
    pub fn stmts(&self) -> &StmtSeq {
        &self.stmts
    }

    #[inline]
    pub fn edge(&self) -> Option<&EdgeRef> {
        self.edge.as_ref()
    }

    /// Successor ids, empty for a block without an outgoing edge.
    pub fn successors(&self) -> SmallVec<[BlockId; 4]> {
        self.edge
            .as_deref()
            .map(Edge::successors)
            .unwrap_or_default()
    }

    /// Suspension points yielded directly in this block.
    pub fn suspension_points(&self) -> impl Iterator<Item = SuspensionId> + '_ {
        self.stmts.iter().filter_map(|stmt| match **stmt {
            Stmt::Yield { point, .. } => Some(point),
            _ => None,
        })
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    reason = "tests use unwrap to panic on unexpected state"
)]
