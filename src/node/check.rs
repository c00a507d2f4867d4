use anyhow::{ensure, Result};

use crate::node::tree::Tree;
use crate::node::{Leaf256, SetNode};

//-------------------------------------

impl Leaf256 {
    /// Leaves have no structure beyond the bits themselves.
    pub(crate) fn check(&self) -> Result<u64> {
        Ok(self.count())
    }
}

impl<C: SetNode> Tree<C> {
    /// Verifies the structural invariants and returns the cardinality.
    /// Test-time only; operations maintain these by construction.
    pub(crate) fn check(&self) -> Result<u64>
    where
        C: CheckNode,
    {
        let Some(e) = self.ends else {
            ensure!(self.summary.is_empty(), "empty node with summary bits");
            ensure!(self.filled.is_empty(), "empty node with filled bits");
            ensure!(self.clusters.is_empty(), "empty node with clusters");
            return Ok(0);
        };

        ensure!(e.min <= e.max, "min above max");
        ensure!(e.max <= Self::MAX_ELEM, "max outside the universe");

        if e.min == e.max {
            ensure!(self.summary.is_empty(), "singleton node with summary bits");
            ensure!(self.filled.is_empty(), "singleton node with filled bits");
            ensure!(self.clusters.is_empty(), "singleton node with clusters");
            return Ok(1);
        }

        // the asides are never recorded in the children
        ensure!(!self.child_contains(e.min), "min duplicated in children");
        ensure!(!self.child_contains(e.max), "max duplicated in children");

        ensure!(
            self.summary.count() == self.filled.count() + self.clusters.len() as u64,
            "summary out of sync with filled/resident indices"
        );

        let mut total = 2;

        for (&i, c) in &self.clusters {
            ensure!(self.summary.contains(i), "resident cluster missing from summary");
            ensure!(!self.filled.contains(i), "cluster both resident and filled");
            ensure!(!c.is_empty(), "resident cluster is empty");
            ensure!(!c.is_full(), "resident cluster is full");

            total += c.check_node()?;

            let base = i << C::BITS;
            let lowest = base | c.min().expect("non-empty cluster");
            let highest = base | c.max().expect("non-empty cluster");
            ensure!(lowest > e.min && highest < e.max, "cluster outside the aside envelope");
        }

        let mut cursor = self.filled.min();
        while let Some(i) = cursor {
            ensure!(self.summary.contains(i), "filled cluster missing from summary");
            ensure!(!self.clusters.contains_key(&i), "cluster both filled and resident");
            let base = i << C::BITS;
            ensure!(
                base > e.min && (base | C::MAX_ELEM) < e.max,
                "filled cluster outside the aside envelope"
            );
            cursor = self.filled.successor(i);
        }
        total += self.filled.count() << C::BITS;

        Ok(total)
    }
}

//-------------------------------------

/// Lets the recursive check descend without knowing whether the child is
/// a leaf or another tree.
pub(crate) trait CheckNode: SetNode {
    fn check_node(&self) -> Result<u64>;
}

impl CheckNode for Leaf256 {
    fn check_node(&self) -> Result<u64> {
        self.check()
    }
}

impl<C: SetNode + CheckNode> CheckNode for Tree<C> {
    fn check_node(&self) -> Result<u64> {
        self.check()
    }
}

//-------------------------------------
