//! End-to-end middle-end: distribution, boxing cleanup, kernel selection.

use snafu::ResultExt;
use strata_ir::{Function, Graph, NameAlloc, graph_rewrite};
use tracing::debug;

use crate::config::DistributeConfig;
use crate::distributed::{Backend, DefaultBackend, auto_distribute_with};
use crate::error::{IrSnafu, Result};
use crate::rules::boxing_cleanup;
use crate::selection::{SelectedCall, select_kernels};

#[derive(Debug, Clone)]
pub struct Compiled {
    pub function: Function,
    pub kernels: Vec<SelectedCall>,
}

/// Runs the whole middle-end on a single-function graph.
pub fn compile(graph: &mut Graph, function: &Function, config: &DistributeConfig) -> Result<Compiled> {
    compile_with(graph, function, config, &DefaultBackend)
}

/// [`compile`] for a target whose costs and constraints come from `backend`.
#[tracing::instrument(skip_all, fields(function = %function.name))]
pub fn compile_with<B: Backend>(
    graph: &mut Graph,
    function: &Function,
    config: &DistributeConfig,
    backend: &B,
) -> Result<Compiled> {
    let mut names = NameAlloc::new();
    let distributed = auto_distribute_with(graph, function, config, backend, &mut names)?;

    let body = graph_rewrite(graph, distributed.body, &boxing_cleanup(), &mut ()).context(IrSnafu)?;
    let function = Function::new(distributed.name, distributed.params, body);

    names.reset();
    let kernels = select_kernels(graph, &function, config, &mut names)?;
    debug!(kernels = kernels.len(), "pipeline.done");
    Ok(Compiled { function, kernels })
}
