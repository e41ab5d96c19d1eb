//! Declarative patterns over expression DAGs.
//!
//! A [`Pattern`] is matched against a node with [`try_match`]. Named sub-patterns bind
//! the node they matched; a name used twice must bind the same node (by identity) or the
//! match fails. Bindings are stored compactly: names are interned into a [`VarIntern`]
//! and the [`BindingStore`] maps interned indices to nodes.
//!
//! ```ignore
//! // x + x, with both operands the very same node
//! let pat = Pattern::op(Op::Binary(BinaryOp::Add), [Pattern::var("x"), Pattern::var("x")]);
//! let m = try_match(&graph, expr, &pat).unwrap();
//! assert_eq!(m["x"], x);
//! ```

pub mod pat;

use std::collections::HashMap;
use std::ops::Index;

use smallvec::SmallVec;
use tracing::warn;

use crate::expr::{ExprId, Graph};

pub use pat::{OpFilter, Pattern, Predicate};

/// Single binding entry: (variable index, bound node).
pub type BindingEntry = (u8, ExprId);

/// Bindings of a match in progress; most patterns bind at most four names.
pub type BindingStore = SmallVec<[BindingEntry; 4]>;

/// Distinct binding names one pattern may use; indices are a single byte.
pub const MAX_BINDINGS: usize = u8::MAX as usize + 1;

/// Interning table from binding names to compact indices.
#[derive(Debug, Clone, Default)]
pub struct VarIntern {
    names: Vec<String>,
    indices: HashMap<String, u8>,
}

impl VarIntern {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index of `name`, interning it first. `None` once [`MAX_BINDINGS`] names are taken.
    pub fn get_or_insert(&mut self, name: &str) -> Option<u8> {
        if let Some(&idx) = self.indices.get(name) {
            return Some(idx);
        }
        let idx = u8::try_from(self.names.len()).ok()?;
        self.names.push(name.to_string());
        self.indices.insert(name.to_string(), idx);
        Some(idx)
    }

    pub fn get_index(&self, name: &str) -> Option<u8> {
        self.indices.get(name).copied()
    }

    pub fn get_name(&self, idx: u8) -> Option<&str> {
        self.names.get(idx as usize).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

pub trait BindingStoreExt {
    fn get_by_index(&self, idx: u8) -> Option<ExprId>;

    /// Binds `idx` to `id`, or checks an existing binding is the same node.
    fn bind_consistent(&mut self, idx: u8, id: ExprId) -> bool;
}

impl BindingStoreExt for BindingStore {
    fn get_by_index(&self, idx: u8) -> Option<ExprId> {
        self.iter().find(|(i, _)| *i == idx).map(|(_, id)| *id)
    }

    fn bind_consistent(&mut self, idx: u8, id: ExprId) -> bool {
        match self.get_by_index(idx) {
            Some(existing) => existing == id,
            None => {
                self.push((idx, id));
                true
            }
        }
    }
}

/// Successful match: the matched node plus the named bindings.
#[derive(Debug, Clone)]
pub struct MatchResult {
    pub root: ExprId,
    intern: VarIntern,
    store: BindingStore,
}

impl MatchResult {
    pub fn get(&self, name: &str) -> Option<ExprId> {
        self.intern.get_index(name).and_then(|idx| self.store.get_by_index(idx))
    }

    pub fn bindings(&self) -> impl Iterator<Item = (&str, ExprId)> {
        self.store.iter().filter_map(|&(idx, id)| self.intern.get_name(idx).map(|name| (name, id)))
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl Index<&str> for MatchResult {
    type Output = ExprId;

    /// Panics if `name` is not bound; use [`MatchResult::get`] for optional names.
    fn index(&self, name: &str) -> &ExprId {
        let idx = self.intern.get_index(name).unwrap_or(u8::MAX);
        self.store
            .iter()
            .find(|(i, _)| *i == idx)
            .map(|(_, id)| id)
            .unwrap_or_else(|| panic!("pattern binding '{name}' is not bound"))
    }
}

/// Matches `pattern` against `expr` in a single pass.
///
/// A pattern with more than [`MAX_BINDINGS`] distinct names never matches.
pub fn try_match(graph: &Graph, expr: ExprId, pattern: &Pattern) -> Option<MatchResult> {
    let Some(intern) = pattern.collect_names() else {
        warn!(limit = MAX_BINDINGS, "pattern.too_many_bindings");
        return None;
    };
    let mut store = BindingStore::new();
    if pattern.match_into(graph, expr, &mut store, &intern) {
        Some(MatchResult { root: expr, intern, store })
    } else {
        None
    }
}
