//! Shape and dtype inference on logical tensors.
//!
//! These rules look through distribution: a distributed argument contributes its logical
//! tensor type. [`super::distributed`] reuses them to compute the logical output of a
//! sharded call.

use smallvec::SmallVec;

use super::{Infer, attribute_ints, inputs, logical};
use crate::expr::{ExprId, Graph};
use crate::op::{BinaryOp, Op, ReduceOp};
use crate::types::{Shape, TensorType};

pub fn infer(graph: &Graph, op: &Op, args: &[ExprId]) -> Infer<TensorType> {
    match op {
        Op::Unary(_) => Ok(logical(graph, args[0])?.clone()),
        Op::Binary(bop) => binary(*bop, logical(graph, args[0])?, logical(graph, args[1])?),
        Op::MatMul => matmul(logical(graph, args[0])?, logical(graph, args[1])?),
        Op::Reduce { op, axes, keep_dims } => reduce(logical(graph, args[0])?, *op, axes, *keep_dims),
        Op::Reshape => reshape(logical(graph, args[0])?, &attribute_ints(graph, args[1])?),
        Op::Transpose { perm } => transpose(logical(graph, args[0])?, perm),
        Op::Slice => {
            let spec = SliceSpec::from_args(graph, args)?;
            slice(logical(graph, args[0])?, &spec)
        }
        Op::Concat { axis } => {
            let parts = inputs(op, args).map(|id| logical(graph, id)).collect::<Infer<Vec<_>>>()?;
            concat(&parts, *axis)
        }
        Op::Conv2D { stride, padding, dilation, groups, .. } => conv2d(
            logical(graph, args[0])?,
            logical(graph, args[1])?,
            logical(graph, args[2])?,
            Conv2DAttrs { stride: *stride, padding: *padding, dilation: *dilation, groups: *groups },
        ),
        Op::Softmax { axis } => {
            let input = logical(graph, args[0])?;
            check_axis(input, *axis)?;
            check_float(input, "softmax")?;
            Ok(input.clone())
        }
        Op::LayerNorm { axis, .. } => {
            layer_norm(logical(graph, args[0])?, logical(graph, args[1])?, logical(graph, args[2])?, *axis)
        }
        Op::Cast { dtype } => Ok(TensorType { dtype: *dtype, shape: logical(graph, args[0])?.shape.clone() }),
        Op::Pad { pads } => pad(logical(graph, args[0])?, pads),
        Op::Gather { axis } => gather(logical(graph, args[0])?, logical(graph, args[1])?, *axis),
        Op::Boxing { .. } => Err("boxing is not a tensor computation".to_string()),
    }
}

fn check_axis(ty: &TensorType, axis: usize) -> Infer<()> {
    if axis >= ty.rank() {
        return Err(format!("axis {axis} out of range for {ty}"));
    }
    Ok(())
}

fn check_float(ty: &TensorType, what: &str) -> Infer<()> {
    if !ty.dtype.is_float() {
        return Err(format!("{what} needs a float tensor, got {ty}"));
    }
    Ok(())
}

/// Numpy-style broadcast of two shapes.
pub fn broadcast_shapes(lhs: &[usize], rhs: &[usize]) -> Option<Shape> {
    let rank = lhs.len().max(rhs.len());
    let mut out = Shape::with_capacity(rank);
    for i in 0..rank {
        let l = dim_from_right(lhs, rank, i);
        let r = dim_from_right(rhs, rank, i);
        out.push(match (l, r) {
            (l, r) if l == r => l,
            (1, r) => r,
            (l, 1) => l,
            _ => return None,
        });
    }
    Some(out)
}

/// Extent of `shape` at output position `i` of a rank-`rank` broadcast, 1 if absent.
fn dim_from_right(shape: &[usize], rank: usize, i: usize) -> usize {
    let offset = rank - shape.len();
    if i < offset { 1 } else { shape[i - offset] }
}

fn binary(op: BinaryOp, lhs: &TensorType, rhs: &TensorType) -> Infer<TensorType> {
    if lhs.dtype != rhs.dtype {
        return Err(format!("{op}: dtype mismatch {} vs {}", lhs.dtype, rhs.dtype));
    }
    let shape = broadcast_shapes(&lhs.shape, &rhs.shape)
        .ok_or_else(|| format!("{op}: cannot broadcast {lhs} with {rhs}"))?;
    Ok(TensorType { dtype: lhs.dtype, shape })
}

fn matmul(lhs: &TensorType, rhs: &TensorType) -> Infer<TensorType> {
    if lhs.dtype != rhs.dtype {
        return Err(format!("matmul: dtype mismatch {} vs {}", lhs.dtype, rhs.dtype));
    }
    if lhs.rank() < 2 || rhs.rank() < 2 {
        return Err(format!("matmul needs rank >= 2, got {lhs} x {rhs}"));
    }
    let (lb, lm) = lhs.shape.split_at(lhs.rank() - 2);
    let (rb, rm) = rhs.shape.split_at(rhs.rank() - 2);
    if lm[1] != rm[0] {
        return Err(format!("matmul: contraction mismatch {lhs} x {rhs}"));
    }
    let mut shape = broadcast_shapes(lb, rb).ok_or_else(|| format!("matmul: batch dims of {lhs} and {rhs}"))?;
    shape.push(lm[0]);
    shape.push(rm[1]);
    Ok(TensorType { dtype: lhs.dtype, shape })
}

fn reduce(input: &TensorType, op: ReduceOp, axes: &[usize], keep_dims: bool) -> Infer<TensorType> {
    for (i, &axis) in axes.iter().enumerate() {
        check_axis(input, axis)?;
        if axes[..i].contains(&axis) {
            return Err(format!("reduce: axis {axis} listed twice"));
        }
    }
    if op == ReduceOp::Mean {
        check_float(input, "mean")?;
    }
    let shape = input
        .shape
        .iter()
        .enumerate()
        .filter_map(|(axis, &dim)| match (axes.contains(&axis), keep_dims) {
            (false, _) => Some(dim),
            (true, true) => Some(1),
            (true, false) => None,
        })
        .collect();
    Ok(TensorType { dtype: input.dtype, shape })
}

/// Resolves a reshape target against the element count of `input`.
pub fn reshape_target(input: &TensorType, target: &[i64]) -> Infer<Shape> {
    let mut inferred = None;
    let mut known = 1usize;
    let mut shape = Shape::with_capacity(target.len());
    for (i, &dim) in target.iter().enumerate() {
        match dim {
            -1 if inferred.is_none() => {
                inferred = Some(i);
                shape.push(1);
            }
            -1 => return Err("reshape: more than one -1 extent".to_string()),
            d if d > 0 => {
                known *= d as usize;
                shape.push(d as usize);
            }
            d => return Err(format!("reshape: invalid extent {d}")),
        }
    }
    let numel = input.numel();
    match inferred {
        Some(i) if known > 0 && numel % known == 0 => shape[i] = numel / known,
        Some(_) => return Err(format!("reshape: cannot infer -1 for {input} into {target:?}")),
        None if known != numel => return Err(format!("reshape: {input} has {numel} elements, target {target:?}")),
        None => {}
    }
    Ok(shape)
}

fn reshape(input: &TensorType, target: &[i64]) -> Infer<TensorType> {
    Ok(TensorType { dtype: input.dtype, shape: reshape_target(input, target)? })
}

pub fn check_permutation(perm: &[usize], rank: usize) -> Infer<()> {
    let mut seen = vec![false; rank];
    if perm.len() != rank {
        return Err(format!("permutation {perm:?} does not cover rank {rank}"));
    }
    for &axis in perm {
        if axis >= rank || std::mem::replace(&mut seen[axis], true) {
            return Err(format!("{perm:?} is not a permutation"));
        }
    }
    Ok(())
}

fn transpose(input: &TensorType, perm: &[usize]) -> Infer<TensorType> {
    check_permutation(perm, input.rank())?;
    Ok(TensorType { dtype: input.dtype, shape: perm.iter().map(|&axis| input.shape[axis]).collect() })
}

/// Constant operands of a slice call.
#[derive(Debug, Clone)]
pub struct SliceSpec {
    pub begins: SmallVec<[i64; 4]>,
    pub ends: SmallVec<[i64; 4]>,
    pub axes: SmallVec<[i64; 4]>,
    pub strides: SmallVec<[i64; 4]>,
}

impl SliceSpec {
    pub fn from_args(graph: &Graph, args: &[ExprId]) -> Infer<Self> {
        let spec = Self {
            begins: attribute_ints(graph, args[1])?,
            ends: attribute_ints(graph, args[2])?,
            axes: attribute_ints(graph, args[3])?,
            strides: attribute_ints(graph, args[4])?,
        };
        let n = spec.axes.len();
        if spec.begins.len() != n || spec.ends.len() != n || spec.strides.len() != n {
            return Err("slice: begins, ends, axes and strides differ in length".to_string());
        }
        Ok(spec)
    }

    /// Sliced axes normalized against `rank`.
    pub fn normalized_axes(&self, rank: usize) -> Infer<SmallVec<[usize; 4]>> {
        let mut axes = SmallVec::new();
        for &axis in &self.axes {
            let normalized = if axis < 0 { axis + rank as i64 } else { axis };
            if !(0..rank as i64).contains(&normalized) {
                return Err(format!("slice: axis {axis} out of range for rank {rank}"));
            }
            let normalized = normalized as usize;
            if axes.contains(&normalized) {
                return Err(format!("slice: axis {axis} listed twice"));
            }
            axes.push(normalized);
        }
        Ok(axes)
    }
}

fn clamp_index(index: i64, dim: usize) -> usize {
    let dim = dim as i64;
    let index = if index < 0 { index + dim } else { index };
    index.clamp(0, dim) as usize
}

fn slice(input: &TensorType, spec: &SliceSpec) -> Infer<TensorType> {
    let axes = spec.normalized_axes(input.rank())?;
    let mut shape = input.shape.clone();
    for (i, &axis) in axes.iter().enumerate() {
        let stride = spec.strides[i];
        if stride <= 0 {
            return Err(format!("slice: stride must be positive, got {stride}"));
        }
        let dim = input.shape[axis];
        let begin = clamp_index(spec.begins[i], dim);
        let end = clamp_index(spec.ends[i], dim);
        shape[axis] = end.saturating_sub(begin).div_ceil(stride as usize);
    }
    Ok(TensorType { dtype: input.dtype, shape })
}

fn concat(parts: &[&TensorType], axis: usize) -> Infer<TensorType> {
    let first = parts[0];
    check_axis(first, axis)?;
    let mut shape = first.shape.clone();
    for part in &parts[1..] {
        if part.dtype != first.dtype || part.rank() != first.rank() {
            return Err(format!("concat: {part} does not match {first}"));
        }
        for (d, (&a, &b)) in first.shape.iter().zip(&part.shape).enumerate() {
            if d != axis && a != b {
                return Err(format!("concat: {part} differs from {first} on axis {d}"));
            }
        }
        shape[axis] += part.shape[axis];
    }
    Ok(TensorType { dtype: first.dtype, shape })
}

#[derive(Debug, Clone, Copy)]
struct Conv2DAttrs {
    stride: [usize; 2],
    padding: [usize; 4],
    dilation: [usize; 2],
    groups: usize,
}

fn conv_extent(input: usize, kernel: usize, pad: usize, stride: usize, dilation: usize) -> Infer<usize> {
    let window = dilation * (kernel.max(1) - 1) + 1;
    let padded = input + pad;
    if stride == 0 || padded < window {
        return Err(format!("conv2d: window {window} does not fit padded extent {padded}"));
    }
    Ok((padded - window) / stride + 1)
}

fn conv2d(input: &TensorType, weights: &TensorType, bias: &TensorType, attrs: Conv2DAttrs) -> Infer<TensorType> {
    if input.rank() != 4 || weights.rank() != 4 || bias.rank() != 1 {
        return Err(format!("conv2d expects NCHW, OIHW and [O], got {input}, {weights}, {bias}"));
    }
    if input.dtype != weights.dtype || input.dtype != bias.dtype {
        return Err("conv2d: dtype mismatch".to_string());
    }
    let (n, c, h, w) = (input.shape[0], input.shape[1], input.shape[2], input.shape[3]);
    let (o, ci, kh, kw) = (weights.shape[0], weights.shape[1], weights.shape[2], weights.shape[3]);
    let groups = attrs.groups;
    if groups == 0 || c % groups != 0 || o % groups != 0 || c / groups != ci {
        return Err(format!("conv2d: {c} input channels and {o} filters do not fit {groups} groups of {ci}"));
    }
    if bias.shape[0] != o {
        return Err(format!("conv2d: bias {bias} does not match {o} filters"));
    }
    let [top, bottom, left, right] = attrs.padding;
    let oh = conv_extent(h, kh, top + bottom, attrs.stride[0], attrs.dilation[0])?;
    let ow = conv_extent(w, kw, left + right, attrs.stride[1], attrs.dilation[1])?;
    Ok(TensorType::new(input.dtype, [n, o, oh, ow]))
}

fn layer_norm(input: &TensorType, scale: &TensorType, bias: &TensorType, axis: usize) -> Infer<TensorType> {
    check_axis(input, axis)?;
    check_float(input, "layer_norm")?;
    let normalized = &input.shape[axis..];
    for (what, ty) in [("scale", scale), ("bias", bias)] {
        if ty.shape.as_slice() != normalized || ty.dtype != input.dtype {
            return Err(format!("layer_norm: {what} {ty} does not cover {normalized:?}"));
        }
    }
    Ok(input.clone())
}

fn pad(input: &TensorType, pads: &[(usize, usize)]) -> Infer<TensorType> {
    if pads.len() != input.rank() {
        return Err(format!("pad: {} pad pairs for {input}", pads.len()));
    }
    let shape = input.shape.iter().zip(pads).map(|(dim, (lo, hi))| dim + lo + hi).collect();
    Ok(TensorType { dtype: input.dtype, shape })
}

fn gather(input: &TensorType, indices: &TensorType, axis: usize) -> Infer<TensorType> {
    check_axis(input, axis)?;
    let mut shape = Shape::from_slice(&input.shape[..axis]);
    shape.extend_from_slice(&indices.shape);
    shape.extend_from_slice(&input.shape[axis + 1..]);
    Ok(TensorType { dtype: input.dtype, shape })
}
