use crate::node::tree::{Ends, Tree};
use crate::node::{SetNode, SetOp};

//-------------------------------------

// A cluster index, as seen from one operand.
enum Side<'a, C> {
    Full,
    Part(&'a C),
    Empty,
}

fn side_of<C: SetNode>(t: &Tree<C>, i: u64) -> Side<'_, C> {
    if t.filled.contains(i) {
        Side::Full
    } else if let Some(c) = t.clusters.get(&i) {
        Side::Part(c)
    } else {
        Side::Empty
    }
}

// A merged cluster, normalized: full children compact away, empty ones
// vanish.
enum Merged<C> {
    Full,
    Part(C),
    Empty,
}

fn normalize<C: SetNode>(c: C) -> Merged<C> {
    if c.is_empty() {
        Merged::Empty
    } else if c.is_full() {
        Merged::Full
    } else {
        Merged::Part(c)
    }
}

fn combine_sides<C: SetNode>(op: SetOp, a: Side<'_, C>, b: Side<'_, C>) -> Merged<C> {
    use Side::*;
    use SetOp::*;

    match (op, a, b) {
        (Or, Full, _) | (Or, _, Full) => Merged::Full,
        (Or, Part(x), Part(y)) => normalize(C::combine(Or, x, y)),
        (Or, Part(x), Empty) | (Or, Empty, Part(x)) => Merged::Part(x.clone()),
        (Or, Empty, Empty) => Merged::Empty,

        (And, Full, Full) => Merged::Full,
        (And, Full, Part(y)) => Merged::Part(y.clone()),
        (And, Part(x), Full) => Merged::Part(x.clone()),
        (And, Part(x), Part(y)) => normalize(C::combine(And, x, y)),
        (And, Empty, _) | (And, _, Empty) => Merged::Empty,

        (Xor, Full, Full) => Merged::Empty,
        (Xor, Full, Empty) | (Xor, Empty, Full) => Merged::Full,
        (Xor, Full, Part(y)) | (Xor, Part(y), Full) => {
            // complement within the cluster
            normalize(C::combine(Xor, y, &C::full()))
        }
        (Xor, Part(x), Part(y)) => normalize(C::combine(Xor, x, y)),
        (Xor, Part(x), Empty) | (Xor, Empty, Part(x)) => Merged::Part(x.clone()),
        (Xor, Empty, Empty) => Merged::Empty,
    }
}

// Ascending walk over the union of two index sets.
fn union_indices<C: SetNode>(a: &C, b: &C, f: &mut dyn FnMut(u64)) {
    let mut ia = a.min();
    let mut ib = b.min();
    loop {
        match (ia, ib) {
            (None, None) => break,
            (Some(x), None) => {
                f(x);
                ia = a.successor(x);
            }
            (None, Some(y)) => {
                f(y);
                ib = b.successor(y);
            }
            (Some(x), Some(y)) if x == y => {
                f(x);
                ia = a.successor(x);
                ib = b.successor(y);
            }
            (Some(x), Some(y)) if x < y => {
                f(x);
                ia = a.successor(x);
            }
            (_, Some(y)) => {
                f(y);
                ib = b.successor(y);
            }
        }
    }
}

fn aside_elems<C: SetNode>(t: &Tree<C>) -> Vec<u64> {
    match t.ends {
        None => Vec::new(),
        Some(e) if e.min == e.max => vec![e.min],
        Some(e) => vec![e.min, e.max],
    }
}

//-------------------------------------

impl<C: SetNode> Tree<C> {
    /// The cluster-by-cluster reconciliation of two nodes of the same
    /// width.  The result is built fresh: children are merged per
    /// operator, the operands' aside elements are folded in, and the
    /// result's own min/max are pulled back out of the children.
    pub(super) fn merge(op: SetOp, a: &Self, b: &Self) -> Self {
        use SetOp::*;

        match op {
            Or | Xor => {
                if a.is_empty() {
                    return b.clone();
                }
                if b.is_empty() {
                    return a.clone();
                }
            }
            And => {
                if a.is_empty() || b.is_empty() {
                    return Self::empty();
                }
            }
        }

        let mut r = Self::empty();
        {
            let mut merge_cluster = |i: u64| {
                match combine_sides(op, side_of(a, i), side_of(b, i)) {
                    Merged::Full => {
                        r.summary.insert(i);
                        r.filled.insert(i);
                    }
                    Merged::Part(c) => {
                        r.summary.insert(i);
                        r.clusters.insert(i, c);
                    }
                    Merged::Empty => (),
                }
            };

            match op {
                And => {
                    // only indices present on both sides can survive
                    let mut cursor = a.summary.min();
                    while let Some(i) = cursor {
                        if b.summary.contains(i) {
                            merge_cluster(i);
                        }
                        cursor = a.summary.successor(i);
                    }
                }
                Or | Xor => union_indices(&a.summary, &b.summary, &mut merge_cluster),
            }
        }

        // The cluster merge covered children only; fold the operands'
        // aside elements in on top.
        match op {
            Or => {
                for v in aside_elems(a).into_iter().chain(aside_elems(b)) {
                    r.child_insert(v);
                }
            }
            And => {
                for v in aside_elems(a) {
                    if b.contains(v) {
                        r.child_insert(v);
                    }
                }
                for v in aside_elems(b) {
                    if a.contains(v) {
                        r.child_insert(v);
                    }
                }
            }
            Xor => {
                for v in aside_elems(a).into_iter().chain(aside_elems(b)) {
                    if r.child_contains(v) {
                        r.child_remove(v);
                    } else {
                        r.child_insert(v);
                    }
                }
            }
        }

        // restore the aside invariant
        match r.pop_min_child() {
            None => Self::empty(),
            Some(min) => {
                let max = r.pop_max_child().unwrap_or(min);
                r.ends = Some(Ends { min, max });
                r
            }
        }
    }
}

//-------------------------------------


//-------------------------------------
