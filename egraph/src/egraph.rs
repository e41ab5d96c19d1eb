use std::collections::{HashMap, HashSet};

use indexmap::IndexMap;
use tracing::{debug, trace};

use crate::error::{Result, UnknownClassSnafu};
use crate::{Id, Language, UnionFind};

/// Equivalence class of enodes.
///
/// Members are kept in the order they were first added to the graph, across unions.
#[derive(Debug, Clone)]
pub struct EClass<L> {
    pub id: Id,
    /// `(birth, node)`: the class id the node was created under orders the members.
    members: Vec<(Id, L)>,
}

impl<L> EClass<L> {
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &L> {
        self.members.iter().map(|(_, node)| node)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    fn absorb(&mut self, other: EClass<L>) {
        self.members.extend(other.members);
        // Stable, so equal births keep their relative order.
        self.members.sort_by_key(|(birth, _)| *birth);
    }
}

/// Hash-consed e-graph.
///
/// [`EGraph::union`] only merges member sets; congruence is restored by an explicit,
/// batched [`EGraph::rebuild`]. Classes iterate in creation order.
#[derive(Debug, Clone)]
pub struct EGraph<L: Language> {
    unionfind: UnionFind,
    memo: HashMap<L, Id>,
    classes: IndexMap<Id, EClass<L>>,
    pending: usize,
}

impl<L: Language> Default for EGraph<L> {
    fn default() -> Self {
        Self { unionfind: UnionFind::default(), memo: HashMap::new(), classes: IndexMap::new(), pending: 0 }
    }
}

impl<L: Language> EGraph<L> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn find(&self, id: Id) -> Id {
        self.unionfind.find(id)
    }

    fn canonicalize(&self, node: &L) -> L {
        node.map_children(|child| self.find(child))
    }

    /// Adds `node`, returning the class of an existing equal enode if there is one.
    pub fn add(&mut self, node: L) -> Id {
        let node = self.canonicalize(&node);
        if let Some(&existing) = self.memo.get(&node) {
            return self.find(existing);
        }
        let id = self.unionfind.make_set();
        trace!(%id, ?node, "egraph.add");
        self.classes.insert(id, EClass { id, members: vec![(id, node.clone())] });
        self.memo.insert(node, id);
        id
    }

    pub fn lookup(&self, node: &L) -> Option<Id> {
        self.memo.get(&self.canonicalize(node)).map(|&id| self.find(id))
    }

    /// Merges the classes of `a` and `b`. Returns `false` if they were already one.
    pub fn union(&mut self, a: Id, b: Id) -> bool {
        let (a, b) = (self.unionfind.find_mut(a), self.unionfind.find_mut(b));
        if a == b {
            return false;
        }
        let leader = self.unionfind.union(a, b);
        let follower = if leader == a { b } else { a };
        if let Some(absorbed) = self.classes.shift_remove(&follower)
            && let Some(class) = self.classes.get_mut(&leader)
        {
            class.absorb(absorbed);
        }
        self.pending += 1;
        trace!(%leader, %follower, "egraph.union");
        true
    }

    /// Restores congruence after a batch of unions. Returns the unions it performed.
    pub fn rebuild(&mut self) -> usize {
        if self.pending == 0 {
            return 0;
        }
        let mut rounds = 0;
        let mut unions = 0;
        loop {
            let merged = self.rebuild_once();
            unions += merged;
            rounds += 1;
            if merged == 0 {
                break;
            }
        }
        let trimmed = self.rebuild_classes();
        self.pending = 0;
        debug!(rounds, unions, trimmed, classes = self.classes.len(), "egraph.rebuild");
        unions
    }

    fn rebuild_once(&mut self) -> usize {
        let mut memo: HashMap<L, Id> = HashMap::with_capacity(self.memo.len());
        let mut to_union = Vec::new();
        for (&leader, class) in &self.classes {
            for node in class.iter() {
                if let Some(previous) = memo.insert(self.canonicalize(node), leader)
                    && previous != leader
                {
                    to_union.push((leader, previous));
                }
            }
        }
        self.memo = memo;

        let mut merged = 0;
        for (a, b) in to_union {
            if self.union(a, b) {
                merged += 1;
            }
        }
        merged
    }

    /// Canonicalizes every member and drops duplicates, keeping the earliest.
    fn rebuild_classes(&mut self) -> usize {
        let mut trimmed = 0;
        let unionfind = &self.unionfind;
        for class in self.classes.values_mut() {
            let mut seen = HashSet::with_capacity(class.members.len());
            let before = class.members.len();
            let members = std::mem::take(&mut class.members);
            class.members = members
                .into_iter()
                .map(|(birth, node)| (birth, node.map_children(|child| unionfind.find(child))))
                .filter(|(_, node)| seen.insert(node.clone()))
                .collect();
            trimmed += before - class.members.len();
        }
        trimmed
    }

    pub fn class(&self, id: Id) -> Result<&EClass<L>> {
        if usize::from(id) >= self.unionfind.size() {
            return UnknownClassSnafu { id }.fail();
        }
        self.classes.get(&self.find(id)).ok_or_else(|| UnknownClassSnafu { id }.build())
    }

    pub fn classes(&self) -> impl ExactSizeIterator<Item = &EClass<L>> {
        self.classes.values()
    }

    pub fn number_of_classes(&self) -> usize {
        self.classes.len()
    }

    /// Enodes over all classes.
    pub fn total_size(&self) -> usize {
        self.classes.values().map(EClass::len).sum()
    }

    pub fn pending_unions(&self) -> usize {
        self.pending
    }

    /// No unions since the last rebuild.
    pub fn is_clean(&self) -> bool {
        self.pending == 0
    }
}
