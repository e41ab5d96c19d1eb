//! E-graph with explicit batched rebuilding and cost-guided extraction.
//!
//! # Module Organization
//!
//! - [`unionfind`] - Disjoint sets of e-class ids
//! - [`language`] - The [`Language`] trait for enodes and [`RecExpr`] terms
//! - [`egraph`] - Hash-consed e-classes, `union` and batched `rebuild`
//! - [`extract`] - Bottom-up extraction under a [`CostFunction`] and hard constraints
//! - [`error`] - Error types and result handling
//!
//! `union` never restores congruence by itself. Callers batch their unions and call
//! [`EGraph::rebuild`] once; [`Extractor::new`] refuses a graph with pending unions.

pub mod egraph;
pub mod error;
pub mod extract;
pub mod language;
pub mod unionfind;


use std::fmt;

pub use egraph::{EClass, EGraph};
pub use error::{Error, Result};
pub use extract::{AstSize, CostFunction, ExtractConstraints, Extractor, NoConstraints};
pub use language::{Language, RecExpr};
pub use unionfind::UnionFind;

/// E-class identifier.
#[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(u32);

impl From<usize> for Id {
    fn from(n: usize) -> Id {
        Id(n as u32)
    }
}

impl From<Id> for usize {
    fn from(id: Id) -> usize {
        id.0 as usize
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
