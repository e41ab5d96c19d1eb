use crate::Id;

/// Disjoint sets over dense ids. The smaller id of two roots becomes the leader.
#[derive(Debug, Clone, Default)]
pub struct UnionFind {
    parents: Vec<Id>,
}

impl UnionFind {
    pub fn make_set(&mut self) -> Id {
        let id = Id::from(self.parents.len());
        self.parents.push(id);
        id
    }

    pub fn size(&self) -> usize {
        self.parents.len()
    }

    fn parent(&self, query: Id) -> Id {
        self.parents[usize::from(query)]
    }

    pub fn find(&self, mut current: Id) -> Id {
        while current != self.parent(current) {
            current = self.parent(current);
        }
        current
    }

    /// `find` with path compression.
    pub fn find_mut(&mut self, mut current: Id) -> Id {
        let root = self.find(current);
        while current != root {
            let next = self.parent(current);
            self.parents[usize::from(current)] = root;
            current = next;
        }
        root
    }

    /// Unions the sets of two roots, returning the new root.
    pub fn union(&mut self, root1: Id, root2: Id) -> Id {
        let (leader, follower) = if root1 <= root2 { (root1, root2) } else { (root2, root1) };
        self.parents[usize::from(follower)] = leader;
        leader
    }
}
