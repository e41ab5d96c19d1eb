//! Kernel selection: lowers every call of a distributed function to a tiled kernel, a
//! boxing transfer, or a marker for ops without a kernel template yet.

pub mod grids;

use snafu::{ResultExt, ensure};
use strata_ir::tir::{Grid, Stmt};
use strata_ir::{ExprId, Function, Graph, NameAlloc, Op};
use tracing::{debug, trace};

pub use grids::{grid_for, pick_tile};

use crate::config::DistributeConfig;
use crate::distributed::{BoxingKind, is_supported};
use crate::error::{IrSnafu, NotSupportedSnafu, Result};

/// A grid and the loop nest it was tiled into.
#[derive(Debug, Clone)]
pub struct TiledKernel {
    pub grid: Grid,
    pub nest: Stmt,
}

#[derive(Debug, Clone, strum::AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum Selected {
    Kernel(TiledKernel),
    /// Layout change between devices.
    Transfer(BoxingKind),
    /// Host op without a kernel template.
    NotYetLowered { op: &'static str },
}

#[derive(Debug, Clone)]
pub struct SelectedCall {
    pub expr: ExprId,
    pub selected: Selected,
}

impl SelectedCall {
    pub fn kernel(&self) -> Option<&TiledKernel> {
        match &self.selected {
            Selected::Kernel(kernel) => Some(kernel),
            _ => None,
        }
    }
}

/// Selects an implementation for every call reachable from the body, operands first.
#[tracing::instrument(skip_all, fields(function = %function.name))]
pub fn select_kernels(
    graph: &Graph,
    function: &Function,
    config: &DistributeConfig,
    names: &mut NameAlloc,
) -> Result<Vec<SelectedCall>> {
    let mut selected = Vec::new();
    for expr in graph.post_order(&[function.body]) {
        let Some((op, args)) = graph.node(expr).as_call() else { continue };
        let choice = select_call(graph, expr, op, args, config, names)?;
        trace!(%expr, op = op.name(), selected = choice.as_ref(), "selection.call");
        selected.push(SelectedCall { expr, selected: choice });
    }
    debug!(calls = selected.len(), "selection.done");
    Ok(selected)
}

fn select_call(
    graph: &Graph,
    expr: ExprId,
    op: &Op,
    args: &[ExprId],
    config: &DistributeConfig,
    names: &mut NameAlloc,
) -> Result<Selected> {
    if let Op::Boxing { target } = op {
        let source = args.first().map(|&arg| graph.ty(arg));
        return Ok(Selected::Transfer(source.map_or(BoxingKind::Nop, |source| BoxingKind::classify(source, target))));
    }

    let distributed = graph.ty(expr).contains_distributed() || args.iter().any(|&a| graph.ty(a).contains_distributed());
    ensure!(!distributed || is_supported(graph, op, args), NotSupportedSnafu { op: op.name(), expr });

    let Some(grid) = grid_for(graph, expr, names.alloc(op.name()))? else {
        return Ok(Selected::NotYetLowered { op: op.name() });
    };
    let tile = pick_tile(grid.bounds(), &config.tile);
    let nest = grid.tile(&[tile]).context(IrSnafu)?;
    Ok(Selected::Kernel(TiledKernel { grid, nest }))
}
