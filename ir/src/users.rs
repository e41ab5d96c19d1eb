//! Use side table and pinning.
//!
//! The arena never tracks who consumes a node. Passes that need to delete nodes keep a
//! [`UseTable`], register the users they create and dispose nodes once nothing refers to
//! them. A [`PinGuard`] keeps nodes alive for the duration of a scope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use indexmap::IndexSet;
use smallvec::SmallVec;
use tracing::trace;

use crate::error::{AlreadyDisposedSnafu, DisposePinnedSnafu, DisposeWithUsersSnafu, Result};
use crate::expr::{ExprId, Graph};

type PinCounts = Rc<RefCell<HashMap<ExprId, u32>>>;

#[derive(Debug, Default)]
pub struct UseTable {
    users: HashMap<ExprId, IndexSet<ExprId>>,
    pins: PinCounts,
}

impl UseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `user` as a user of each of its operands. Idempotent.
    pub fn track(&mut self, graph: &Graph, user: ExprId) {
        for &operand in graph.operands(user) {
            self.users.entry(operand).or_default().insert(user);
        }
    }

    /// Forgets `user` as a user of its operands. Idempotent.
    pub fn untrack(&mut self, graph: &Graph, user: ExprId) {
        for &operand in graph.operands(user) {
            if let Some(users) = self.users.get_mut(&operand) {
                users.shift_remove(&user);
                if users.is_empty() {
                    self.users.remove(&operand);
                }
            }
        }
    }

    pub fn users(&self, id: ExprId) -> impl Iterator<Item = ExprId> + '_ {
        self.users.get(&id).into_iter().flat_map(|users| users.iter().copied())
    }

    pub fn user_count(&self, id: ExprId) -> usize {
        self.users.get(&id).map_or(0, IndexSet::len)
    }

    pub fn pin(&self, id: ExprId) -> PinGuard {
        self.pin_all([id])
    }

    /// Pins every id in `ids` until the returned guard is dropped.
    pub fn pin_all(&self, ids: impl IntoIterator<Item = ExprId>) -> PinGuard {
        let ids: SmallVec<[ExprId; 4]> = ids.into_iter().collect();
        let mut pins = self.pins.borrow_mut();
        for &id in &ids {
            *pins.entry(id).or_insert(0) += 1;
        }
        PinGuard { pins: Rc::clone(&self.pins), ids }
    }

    pub fn is_pinned(&self, id: ExprId) -> bool {
        self.pins.borrow().contains_key(&id)
    }

    /// Disposes `id`, releasing the uses it holds on its operands.
    ///
    /// Fails if `id` is already dead, still has users, or is pinned.
    pub fn dispose(&mut self, graph: &mut Graph, id: ExprId) -> Result<()> {
        if !graph.is_alive(id) {
            return AlreadyDisposedSnafu { id }.fail();
        }
        let users = self.user_count(id);
        if users > 0 {
            return DisposeWithUsersSnafu { id, users }.fail();
        }
        if self.is_pinned(id) {
            return DisposePinnedSnafu { id }.fail();
        }
        self.untrack(graph, id);
        graph.mark_dead(id)?;
        trace!(%id, "expr.dispose");
        Ok(())
    }
}

/// Scope guard holding pins on a set of nodes.
#[derive(Debug)]
#[must_use = "nodes are unpinned as soon as the guard is dropped"]
pub struct PinGuard {
    pins: PinCounts,
    ids: SmallVec<[ExprId; 4]>,
}

impl PinGuard {
    pub fn ids(&self) -> &[ExprId] {
        &self.ids
    }
}

impl Drop for PinGuard {
    fn drop(&mut self) {
        let mut pins = self.pins.borrow_mut();
        for id in &self.ids {
            if let Some(count) = pins.get_mut(id) {
                *count -= 1;
                if *count == 0 {
                    pins.remove(id);
                }
            }
        }
    }
}
