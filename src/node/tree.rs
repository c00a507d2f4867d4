use std::collections::hash_map::Entry;
use std::collections::HashMap;
use std::io::{self, Read, Write};
use std::mem::size_of;

use crate::node::{SetNode, SetOp};
use crate::pack::{read_varint, write_varint};

//-------------------------------------

/// The minimum and maximum of a node, stored aside from the children.
#[derive(Copy, Clone, Debug)]
pub(super) struct Ends {
    pub min: u64,
    pub max: u64,
}

/// A recursive node over [0, 2^(2w)) built from child nodes over [0, 2^w).
///
/// The aside `ends` hold the node's true minimum and maximum; they are
/// never recorded in the children.  Everything strictly between them lives
/// in the clusters: `summary` marks every non-empty cluster index,
/// `filled` the implicitly-full ones, and `clusters` holds only the
/// resident (partial) children.  A resident cluster is never empty and
/// never full.
///
/// The cluster table is an unordered hash map; ordered traversal always
/// walks the summary's successor chain instead.
#[derive(Clone)]
pub(crate) struct Tree<C: SetNode> {
    pub(super) ends: Option<Ends>,
    pub(super) summary: C,
    pub(super) filled: C,
    pub(super) clusters: HashMap<u64, C>,
}

fn hi_of<C: SetNode>(x: u64) -> u64 {
    x >> C::BITS
}

fn lo_of<C: SetNode>(x: u64) -> u64 {
    x & C::MAX_ELEM
}

impl<C: SetNode> Tree<C> {
    /// A node holding exactly the two aside elements (or one, when they
    /// are equal) and no children.
    pub(crate) fn with_ends(min: u64, max: u64) -> Self {
        let mut t = Self::empty();
        t.ends = Some(Ends { min, max });
        t
    }

    /// Wraps a full-universe child into a node one width up: the child
    /// becomes cluster 0 once its own min/max have been pulled out into
    /// the aside slots.
    pub(crate) fn widen(mut child: C) -> Self {
        let Some(min) = child.min() else {
            return Self::empty();
        };
        child.remove(min);

        let max = match child.max() {
            Some(m) => {
                child.remove(m);
                m
            }
            None => min,
        };

        let mut t = Self::with_ends(min, max);
        if !child.is_empty() {
            t.summary.insert(0);
            t.clusters.insert(0, child);
        }
        t
    }

    pub(super) fn child_contains(&self, x: u64) -> bool {
        let i = hi_of::<C>(x);
        if self.filled.contains(i) {
            return true;
        }
        match self.clusters.get(&i) {
            Some(c) => c.contains(lo_of::<C>(x)),
            None => false,
        }
    }

    /// Inserts into the children, ignoring the aside slots.
    pub(super) fn child_insert(&mut self, x: u64) -> bool {
        let i = hi_of::<C>(x);
        let off = lo_of::<C>(x);

        if self.filled.contains(i) {
            return false;
        }

        match self.clusters.entry(i) {
            Entry::Occupied(mut e) => {
                if !e.get_mut().insert(off) {
                    return false;
                }
                if e.get().is_full() {
                    e.remove();
                    self.filled.insert(i);
                }
                true
            }
            Entry::Vacant(e) => {
                let mut c = C::empty();
                c.insert(off);
                e.insert(c);
                self.summary.insert(i);
                true
            }
        }
    }

    /// Removes from the children, ignoring the aside slots.  Removal out
    /// of an implicitly-full cluster materializes it as a resident
    /// cluster missing just that element.
    pub(super) fn child_remove(&mut self, x: u64) -> bool {
        let i = hi_of::<C>(x);
        let off = lo_of::<C>(x);

        if self.filled.remove(i) {
            let mut c = C::full();
            c.remove(off);
            if c.is_empty() {
                self.summary.remove(i);
            } else {
                self.clusters.insert(i, c);
            }
            return true;
        }

        match self.clusters.get_mut(&i) {
            Some(c) => {
                if !c.remove(off) {
                    return false;
                }
                if c.is_empty() {
                    self.clusters.remove(&i);
                    self.summary.remove(i);
                }
                true
            }
            None => false,
        }
    }

    /// Removes and returns the smallest element held in the children.
    pub(super) fn pop_min_child(&mut self) -> Option<u64> {
        let i = self.summary.min()?;
        let x = if self.filled.contains(i) {
            i << C::BITS
        } else {
            (i << C::BITS) | self.clusters[&i].min().expect("resident cluster is empty")
        };
        self.child_remove(x);
        Some(x)
    }

    /// Removes and returns the largest element held in the children.
    pub(super) fn pop_max_child(&mut self) -> Option<u64> {
        let i = self.summary.max()?;
        let x = if self.filled.contains(i) {
            (i << C::BITS) | C::MAX_ELEM
        } else {
            (i << C::BITS) | self.clusters[&i].max().expect("resident cluster is empty")
        };
        self.child_remove(x);
        Some(x)
    }

    pub(super) fn child_count(&self) -> u64 {
        (self.filled.count() << C::BITS)
            + self.clusters.values().map(|c| c.count()).sum::<u64>()
    }
}

impl<C: SetNode> SetNode for Tree<C> {
    const BITS: u32 = 2 * C::BITS;
    const MAX_ELEM: u64 = u64::MAX >> (64 - 2 * C::BITS);

    fn empty() -> Self {
        Tree {
            ends: None,
            summary: C::empty(),
            filled: C::empty(),
            clusters: HashMap::new(),
        }
    }

    fn full() -> Self {
        // Aside 0 and MAX leave the two boundary clusters one element
        // short of full, so they are resident; everything between is
        // implicitly full.
        let last = hi_of::<C>(Self::MAX_ELEM);
        let mut t = Self::with_ends(0, Self::MAX_ELEM);

        t.summary = C::full();
        t.filled = C::full();
        t.filled.remove(0);
        t.filled.remove(last);

        let mut first_cluster = C::full();
        first_cluster.remove(0);
        t.clusters.insert(0, first_cluster);

        let mut last_cluster = C::full();
        last_cluster.remove(C::MAX_ELEM);
        t.clusters.insert(last, last_cluster);

        t
    }

    fn is_empty(&self) -> bool {
        self.ends.is_none()
    }

    fn is_full(&self) -> bool {
        match self.ends {
            Some(e) if e.min == 0 && e.max == Self::MAX_ELEM => {
                self.child_count() == Self::MAX_ELEM - 1
            }
            _ => false,
        }
    }

    fn contains(&self, x: u64) -> bool {
        let Some(e) = self.ends else {
            return false;
        };
        if x == e.min || x == e.max {
            return true;
        }
        if x < e.min || x > e.max {
            return false;
        }
        self.child_contains(x)
    }

    fn insert(&mut self, x: u64) -> bool {
        let Some(mut e) = self.ends else {
            self.ends = Some(Ends { min: x, max: x });
            return true;
        };

        if x == e.min || x == e.max {
            return false;
        }

        let added = if e.min == e.max {
            // a second element just widens the aside pair
            if x < e.min {
                e.min = x;
            } else {
                e.max = x;
            }
            true
        } else if x < e.min {
            let old = std::mem::replace(&mut e.min, x);
            self.child_insert(old)
        } else if x > e.max {
            let old = std::mem::replace(&mut e.max, x);
            self.child_insert(old)
        } else {
            self.child_insert(x)
        };

        self.ends = Some(e);
        added
    }

    fn remove(&mut self, x: u64) -> bool {
        let Some(mut e) = self.ends else {
            return false;
        };

        if x == e.min {
            if e.min == e.max {
                self.ends = None;
                return true;
            }
            // promote the next smallest element into the aside slot
            e.min = match self.pop_min_child() {
                Some(m) => m,
                None => e.max,
            };
            self.ends = Some(e);
            return true;
        }

        if x == e.max {
            e.max = match self.pop_max_child() {
                Some(m) => m,
                None => e.min,
            };
            self.ends = Some(e);
            return true;
        }

        if x < e.min || x > e.max {
            return false;
        }
        self.child_remove(x)
    }

    fn count(&self) -> u64 {
        match self.ends {
            None => 0,
            Some(e) if e.min == e.max => 1,
            Some(_) => 2 + self.child_count(),
        }
    }

    fn count_range(&self, lo: u64, hi: u64) -> u64 {
        let Some(e) = self.ends else {
            return 0;
        };
        let hi = hi.min(Self::MAX_ELEM);
        if lo > hi {
            return 0;
        }

        let mut total = 0;
        if lo <= e.min && e.min <= hi {
            total += 1;
        }
        if e.min != e.max && lo <= e.max && e.max <= hi {
            total += 1;
        }

        let hi_i = hi_of::<C>(hi);
        let lo_i = hi_of::<C>(lo);
        let mut cursor = if self.summary.contains(lo_i) {
            Some(lo_i)
        } else {
            self.summary.successor(lo_i)
        };

        while let Some(i) = cursor {
            if i > hi_i {
                break;
            }
            let base = i << C::BITS;
            let a = lo.max(base);
            let b = hi.min(base | C::MAX_ELEM);
            if self.filled.contains(i) {
                total += b - a + 1;
            } else {
                total += self.clusters[&i].count_range(a - base, b - base);
            }
            cursor = self.summary.successor(i);
        }
        total
    }

    fn min(&self) -> Option<u64> {
        self.ends.map(|e| e.min)
    }

    fn max(&self) -> Option<u64> {
        self.ends.map(|e| e.max)
    }

    fn successor(&self, x: u64) -> Option<u64> {
        let e = self.ends?;
        if x < e.min {
            return Some(e.min);
        }
        if x >= e.max {
            return None;
        }

        let i = hi_of::<C>(x);
        let off = lo_of::<C>(x);

        // within x's own cluster first
        if self.filled.contains(i) && off < C::MAX_ELEM {
            return Some((i << C::BITS) | (off + 1));
        }
        if let Some(c) = self.clusters.get(&i) {
            if let Some(n) = c.successor(off) {
                return Some((i << C::BITS) | n);
            }
        }

        // then the next non-empty cluster, falling back to the aside max
        match self.summary.successor(i) {
            Some(j) => {
                if self.filled.contains(j) {
                    Some(j << C::BITS)
                } else {
                    Some((j << C::BITS) | self.clusters[&j].min().expect("resident cluster is empty"))
                }
            }
            None => Some(e.max),
        }
    }

    fn predecessor(&self, x: u64) -> Option<u64> {
        let e = self.ends?;
        if x > e.max {
            return Some(e.max);
        }
        if x <= e.min {
            return None;
        }

        let i = hi_of::<C>(x);
        let off = lo_of::<C>(x);

        if off > 0 {
            if self.filled.contains(i) {
                return Some((i << C::BITS) | (off - 1));
            }
            if let Some(c) = self.clusters.get(&i) {
                if let Some(p) = c.predecessor(off) {
                    return Some((i << C::BITS) | p);
                }
            }
        }

        match self.summary.predecessor(i) {
            Some(j) => {
                if self.filled.contains(j) {
                    Some((j << C::BITS) | C::MAX_ELEM)
                } else {
                    Some((j << C::BITS) | self.clusters[&j].max().expect("resident cluster is empty"))
                }
            }
            None => Some(e.min),
        }
    }

    fn combine(op: SetOp, a: &Self, b: &Self) -> Self {
        Self::merge(op, a, b)
    }

    fn for_each(&self, f: &mut dyn FnMut(u64)) {
        let Some(e) = self.ends else {
            return;
        };
        f(e.min);

        let mut cursor = self.summary.min();
        while let Some(i) = cursor {
            let base = i << C::BITS;
            if self.filled.contains(i) {
                for off in 0..=C::MAX_ELEM {
                    f(base | off);
                }
            } else {
                self.clusters[&i].for_each(&mut |off| f(base | off));
            }
            cursor = self.summary.successor(i);
        }

        if e.max != e.min {
            f(e.max);
        }
    }

    fn pack<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let Some(e) = self.ends else {
            return w.write_all(&[0]);
        };
        w.write_all(&[1])?;
        write_varint(w, e.min)?;
        write_varint(w, e.max)?;
        self.summary.pack(w)?;
        self.filled.pack(w)?;

        let mut indices: Vec<u64> = self.clusters.keys().copied().collect();
        indices.sort_unstable();
        write_varint(w, indices.len() as u64)?;
        for i in indices {
            write_varint(w, i)?;
            self.clusters[&i].pack(w)?;
        }
        Ok(())
    }

    fn unpack<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut occupied = [0u8; 1];
        r.read_exact(&mut occupied)?;
        match occupied[0] {
            0 => return Ok(Self::empty()),
            1 => (),
            _ => {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "bad node occupancy byte",
                ))
            }
        }

        let min = read_varint(r)?;
        let max = read_varint(r)?;
        if min > max || max > Self::MAX_ELEM {
            return Err(io::Error::new(io::ErrorKind::InvalidData, "bad node bounds"));
        }

        let summary = C::unpack(r)?;
        let filled = C::unpack(r)?;

        let nr_clusters = read_varint(r)?;
        let mut clusters = HashMap::with_capacity(nr_clusters as usize);
        for _ in 0..nr_clusters {
            let i = read_varint(r)?;
            if i > C::MAX_ELEM {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "cluster index out of range",
                ));
            }
            let c = C::unpack(r)?;
            clusters.insert(i, c);
        }

        Ok(Tree {
            ends: Some(Ends { min, max }),
            summary,
            filled,
            clusters,
        })
    }

    fn resident_clusters(&self) -> u64 {
        self.clusters
            .values()
            .map(|c| 1 + c.resident_clusters())
            .sum()
    }

    fn heap_bytes(&self) -> usize {
        self.summary.heap_bytes()
            + self.filled.heap_bytes()
            + self.clusters.capacity() * size_of::<(u64, C)>()
            + self.clusters.values().map(|c| c.heap_bytes()).sum::<usize>()
    }
}

//-------------------------------------


//-------------------------------------
