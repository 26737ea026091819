//! Frontier expansion over the instance graph.
//!
//! The materializer, the reachability pruner and the cycle regenerator all
//! run the same breadth-first loop: keep a frontier of states, fetch the
//! edges leaving it that have not been visited yet, act on them, advance
//! the frontier to their destinations. [`FrontierWalk`] owns that
//! bookkeeping; callers supply the edges round by round (some fetch them
//! from the store, some from a definition in memory), parameterized by an
//! edge key for the exclusion set.

use crate::definition::StateId;
use std::collections::HashSet;
use std::hash::Hash;

/// Frontier, exclusion set and round counter of one BFS pass.
#[derive(Debug)]
pub(crate) struct FrontierWalk<K> {
    frontier: HashSet<StateId>,
    visited: HashSet<K>,
    round: u32,
}

impl<K: Eq + Hash> FrontierWalk<K> {
    pub fn new(start: impl IntoIterator<Item = StateId>) -> Self {
        Self {
            frontier: start.into_iter().collect(),
            visited: HashSet::new(),
            round: 0,
        }
    }

    /// States the next batch of edges must leave from.
    pub fn frontier(&self) -> &HashSet<StateId> {
        &self.frontier
    }

    /// Whether an edge was already processed in this pass.
    pub fn is_excluded(&self, key: &K) -> bool {
        self.visited.contains(key)
    }

    /// Zero-based depth of the current round.
    pub fn round(&self) -> u32 {
        self.round
    }

    /// Record a round's edges and move the frontier to their destinations.
    pub fn advance<E>(
        &mut self,
        edges: &[E],
        key_of: impl Fn(&E) -> K,
        destination_of: impl Fn(&E) -> StateId,
    ) {
        let mut next = HashSet::new();
        for edge in edges {
            self.visited.insert(key_of(edge));
            next.insert(destination_of(edge));
        }
        self.frontier = next;
        self.round += 1;
    }
}
