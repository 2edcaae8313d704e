//! Copy-on-write update primitives.
//!
//! Every update takes the current node plus the proposed new fields and
//! hands back the *original* `Rc` when nothing differs. Callers detect
//! change with [`same`] (pointer identity), never with structural
//! equality, so an unchanged subtree costs no allocation and a changed leaf
//! re-allocates only its ancestors.
//!
//! Sequences follow the same contract: every element is visited, and a new
//! slice is allocated only once some element came back as a different `Rc`.

use std::rc::Rc;

use crate::ir::BlockId;

/// Pointer identity, the "unchanged" test of every update.
#[inline]
pub fn same<T: ?Sized>(a: &Rc<T>, b: &Rc<T>) -> bool {
    Rc::ptr_eq(a, b)
}

/// [`same`] lifted over optional slots.
#[inline]
pub fn same_opt<T>(a: &Option<Rc<T>>, b: &Option<Rc<T>>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => Rc::ptr_eq(a, b),
        (None, None) => true,
        _ => false,
    }
}

/// Returns `original` when `unchanged`, otherwise allocates the node built
/// by `build`.
#[inline]
pub fn rebuild<T>(original: &Rc<T>, unchanged: bool, build: impl FnOnce() -> T) -> Rc<T> {
    if unchanged {
        Rc::clone(original)
    } else {
        Rc::new(build())
    }
}

/// Update an optional child.
pub fn update_opt<T>(slot: &Option<Rc<T>>, f: impl FnOnce(&Rc<T>) -> Rc<T>) -> Option<Rc<T>> {
    slot.as_ref().map(f)
}

/// Update every element of an ordered sequence.
///
/// Elements before the first change are reused as-is; once an element
/// changes the rest are still visited, in order, into the new slice.
pub fn update_seq<T>(seq: &Rc<[Rc<T>]>, mut f: impl FnMut(&Rc<T>) -> Rc<T>) -> Rc<[Rc<T>]> {
    for (i, elem) in seq.iter().enumerate() {
        let new_elem = f(elem);
        if !Rc::ptr_eq(&new_elem, elem) {
            let mut out = Vec::with_capacity(seq.len());
            out.extend(seq[..i].iter().cloned());
            out.push(new_elem);
            for rest in &seq[i + 1..] {
                out.push(f(rest));
            }
            return Rc::from(out);
        }
    }
    Rc::clone(seq)
}

/// Update the values of a key/value sequence. Keys are carried over.
pub fn update_pairs<K: Clone, T>(
    seq: &Rc<[(K, Rc<T>)]>,
    mut f: impl FnMut(&Rc<T>) -> Rc<T>,
) -> Rc<[(K, Rc<T>)]> {
    for (i, (key, value)) in seq.iter().enumerate() {
        let new_value = f(value);
        if !Rc::ptr_eq(&new_value, value) {
            let mut out = Vec::with_capacity(seq.len());
            out.extend(seq[..i].iter().cloned());
            out.push((key.clone(), new_value));
            for (k, v) in &seq[i + 1..] {
                out.push((k.clone(), f(v)));
            }
            return Rc::from(out);
        }
    }
    Rc::clone(seq)
}

/// Retarget an ordered list of block ids, failing fast on the first error.
pub fn try_update_ids<E>(
    ids: &Rc<[BlockId]>,
    mut f: impl FnMut(BlockId) -> Result<BlockId, E>,
) -> Result<Rc<[BlockId]>, E> {
    for (i, &id) in ids.iter().enumerate() {
        let new_id = f(id)?;
        if new_id != id {
            let mut out = Vec::with_capacity(ids.len());
            out.extend_from_slice(&ids[..i]);
            out.push(new_id);
            for &rest in &ids[i + 1..] {
                out.push(f(rest)?);
            }
            return Ok(Rc::from(out));
        }
    }
    Ok(Rc::clone(ids))
}
