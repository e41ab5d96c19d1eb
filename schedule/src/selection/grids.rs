//! Grids for the ops lowered to tiled kernels.
//!
//! Every grid iterates the per-device shapes, so a distributed call becomes the kernel
//! one device runs on its shard.

use smallvec::SmallVec;
use snafu::ResultExt;
use strata_ir::affine::{AffineDomain, AffineExpr, AffineMap, AffineRange};
use strata_ir::tir::{Access, Buffer, Grid};
use strata_ir::{ExprId, Graph, Op, Shape, TensorType};

use crate::distributed::cost::local_shape;
use crate::error::{IrSnafu, Result};

/// Single iteration of an axis that is broadcast into the grid.
fn unit() -> AffineRange {
    AffineRange::new(AffineExpr::constant(0), AffineExpr::constant(1))
}

fn follow(domain: &AffineDomain) -> AffineRange {
    AffineRange::new(domain.dim, domain.extent)
}

/// Per-device buffer of `id`.
fn local_buffer(graph: &Graph, id: ExprId) -> Option<Buffer> {
    let ty = graph.ty(id);
    let dtype = ty.logical_tensor()?.dtype;
    let name = graph.name(id).map_or_else(|| id.to_string(), str::to_string);
    Some(Buffer::new(name, TensorType::new(dtype, local_shape(ty)?)))
}

/// Grid computing `out = op(args)`, or `None` if the op has no kernel template.
pub fn grid_for(graph: &Graph, call: ExprId, name: String) -> Result<Option<Grid>> {
    let Some((op, args)) = graph.node(call).as_call() else { return Ok(None) };
    if !matches!(op, Op::Unary(_) | Op::Binary(_) | Op::MatMul | Op::Reduce { .. } | Op::Transpose { .. }) {
        return Ok(None);
    }
    let Some(out) = local_buffer(graph, call) else { return Ok(None) };
    let inputs: Option<SmallVec<[Buffer; 2]>> = args.iter().map(|&arg| local_buffer(graph, arg)).collect();
    let Some(inputs) = inputs else { return Ok(None) };

    let grid = match op {
        Op::Unary(_) | Op::Binary(_) => elementwise(name, &inputs, out),
        Op::MatMul => matmul(name, &inputs, out),
        Op::Reduce { axes, keep_dims, .. } => reduce(name, &inputs[0], out, axes, *keep_dims),
        Op::Transpose { perm } => transpose(name, &inputs[0], out, perm),
        _ => return Ok(None),
    };
    grid.map(Some).context(IrSnafu)
}

/// Output-shaped grid; inputs broadcast numpy-style against the output.
fn elementwise(name: String, inputs: &[Buffer], out: Buffer) -> strata_ir::Result<Grid> {
    let bounds: Vec<usize> = out.ty.shape.to_vec();
    let rank = bounds.len();
    let mut accesses = Vec::with_capacity(inputs.len() + 1);
    for input in inputs {
        let shape = input.ty.shape.clone();
        let offset = rank - shape.len();
        let map = AffineMap::from_callable(rank, 0, |d, _| {
            shape
                .iter()
                .enumerate()
                .map(|(axis, &extent)| if extent == 1 && bounds[axis + offset] != 1 { unit() } else { follow(&d[axis + offset]) })
                .collect()
        })?;
        accesses.push(Access::read(input.clone(), map));
    }
    accesses.push(Access::write(out, AffineMap::identity(rank)));
    Grid::new(name, bounds, accesses)
}

/// `[.., M, N]` output plus a trailing `K` axis.
fn matmul(name: String, inputs: &[Buffer], out: Buffer) -> strata_ir::Result<Grid> {
    let (lhs, rhs) = (&inputs[0], &inputs[1]);
    let out_rank = out.ty.rank();
    let k = lhs.ty.shape.last().copied().unwrap_or(1);
    let mut bounds: Vec<usize> = out.ty.shape.to_vec();
    bounds.push(k);
    let (m_axis, n_axis, k_axis) = (out_rank - 2, out_rank - 1, out_rank);

    let operand_map = |shape: &Shape, rows: usize, cols: usize| {
        let batch = shape.len() - 2;
        let offset = out_rank - 2 - batch;
        let bounds = &bounds;
        AffineMap::from_callable(out_rank + 1, 0, move |d, _| {
            let mut results: Vec<AffineRange> = (0..batch)
                .map(|axis| if shape[axis] == 1 && bounds[axis + offset] != 1 { unit() } else { follow(&d[axis + offset]) })
                .collect();
            results.push(follow(&d[rows]));
            results.push(follow(&d[cols]));
            results
        })
    };
    let lhs_map = operand_map(&lhs.ty.shape, m_axis, k_axis)?;
    let rhs_map = operand_map(&rhs.ty.shape, k_axis, n_axis)?;
    let out_map = AffineMap::from_callable(out_rank + 1, 0, |d, _| (0..out_rank).map(|axis| follow(&d[axis])).collect())?;

    Grid::new(
        name,
        bounds.clone(),
        vec![Access::read(lhs.clone(), lhs_map), Access::read(rhs.clone(), rhs_map), Access::write(out, out_map)],
    )
}

/// Input-shaped grid; reduced axes collapse to one element of the output.
fn reduce(name: String, input: &Buffer, out: Buffer, axes: &[usize], keep_dims: bool) -> strata_ir::Result<Grid> {
    let bounds: Vec<usize> = input.ty.shape.to_vec();
    let rank = bounds.len();
    let out_map = AffineMap::from_callable(rank, 0, |d, _| {
        (0..rank)
            .filter_map(|axis| match (axes.contains(&axis), keep_dims) {
                (true, true) => Some(unit()),
                (true, false) => None,
                (false, _) => Some(follow(&d[axis])),
            })
            .collect()
    })?;
    Grid::new(name, bounds, vec![Access::read(input.clone(), AffineMap::identity(rank)), Access::write(out, out_map)])
}

/// Output-shaped grid reading the input through the inverse permutation.
fn transpose(name: String, input: &Buffer, out: Buffer, perm: &[usize]) -> strata_ir::Result<Grid> {
    let bounds: Vec<usize> = out.ty.shape.to_vec();
    let rank = bounds.len();
    let read = AffineMap::from_callable(rank, 0, |d, _| {
        (0..rank).filter_map(|axis| perm.iter().position(|&p| p == axis).map(|out_axis| follow(&d[out_axis]))).collect()
    })?;
    Grid::new(name, bounds, vec![Access::read(input.clone(), read), Access::write(out, AffineMap::identity(rank))])
}

/// Largest tile not above the requested extent that divides each bound.
///
/// Requests align to the trailing axes; leading axes without a request get tile 1.
pub fn pick_tile(bounds: &[usize], requested: &[usize]) -> Vec<usize> {
    let requested = &requested[requested.len().saturating_sub(bounds.len())..];
    let offset = bounds.len() - requested.len();
    bounds
        .iter()
        .enumerate()
        .map(|(axis, &bound)| {
            let want = if axis < offset { 1 } else { requested[axis - offset] };
            (1..=want.min(bound).max(1)).rev().find(|t| bound % t == 0).unwrap_or(1)
        })
        .collect()
}
