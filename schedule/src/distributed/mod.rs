//! Auto-distribution: rewrites a single-device function into one whose values are laid
//! out on a device placement, with explicit boxing wherever layouts change.
//!
//! - [`support`] - Which ops may consume distributed tensors
//! - [`candidates`] - Candidate layouts and the bucket map
//! - [`rewriter`] - The candidate search, terminators, pruning and extraction
//! - [`enode`] / [`cost`] - E-graph language and cost model
//! - [`backend`] - Target hooks: cost model and extraction constraints

pub mod backend;
pub mod candidates;
pub mod cost;
pub mod enode;
pub mod rewriter;
pub mod support;

use strata_ir::{Function, Graph, NameAlloc, dce};

pub use backend::{Backend, DefaultBackend};
pub use candidates::{Bucket, leaf_candidates, partial_resolutions};
pub use cost::{BoxingKind, DistributedCost, node_types};
pub use enode::IrNode;
pub use rewriter::{AutoDistributed, diagonal_indices};
pub use support::is_supported;

use crate::config::DistributeConfig;
use crate::error::Result;

/// Distributes `function` and removes every node the result no longer reaches.
///
/// `graph` is expected to hold this function only.
pub fn auto_distribute(
    graph: &mut Graph,
    function: &Function,
    config: &DistributeConfig,
    names: &mut NameAlloc,
) -> Result<Function> {
    auto_distribute_with(graph, function, config, &DefaultBackend, names)
}

/// [`auto_distribute`] with extraction costed and constrained by `backend`.
pub fn auto_distribute_with<B: Backend>(
    graph: &mut Graph,
    function: &Function,
    config: &DistributeConfig,
    backend: &B,
    names: &mut NameAlloc,
) -> Result<Function> {
    let distributed = AutoDistributed::with_backend(graph, config, backend, names).run(function)?;
    let mut roots = distributed.params.clone();
    roots.push(distributed.body);
    dce(graph, &roots);
    Ok(distributed)
}
