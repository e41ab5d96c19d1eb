//! Operation catalogue.
//!
//! [`Op`] is a closed descriptor of what a [`Node::Call`](crate::Node::Call) computes.
//! Operands live in the call node; the op itself only carries attributes. Each op
//! declares its parameter slots, distinguishing data inputs from attribute operands
//! (constant tensors such as a reshape target or slice bounds).

use std::hash::{Hash, Hasher};

use smallvec::SmallVec;
use strata_dtype::DType;

use crate::types::IrType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum UnaryOp {
    Neg,
    Abs,
    Exp,
    Log,
    Sqrt,
    Relu,
    Sigmoid,
    Tanh,
}

impl UnaryOp {
    /// `f(a + b) == f(a) + f(b)`, so partial sums pass through unchanged.
    pub fn is_linear(&self) -> bool {
        matches!(self, UnaryOp::Neg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Max,
    Min,
    Pow,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display, strum::EnumIter)]
#[strum(serialize_all = "snake_case")]
pub enum ReduceOp {
    Sum,
    Mean,
    Max,
    Min,
}

/// Activation clamp fused into a convolution.
#[derive(Debug, Clone, Copy)]
pub struct FusedClamp {
    pub min: f32,
    pub max: f32,
}

impl FusedClamp {
    pub const IDENTITY: FusedClamp = FusedClamp { min: f32::NEG_INFINITY, max: f32::INFINITY };

    pub fn is_identity(&self) -> bool {
        self.min == f32::NEG_INFINITY && self.max == f32::INFINITY
    }
}

impl PartialEq for FusedClamp {
    fn eq(&self, other: &Self) -> bool {
        self.min.to_bits() == other.min.to_bits() && self.max.to_bits() == other.max.to_bits()
    }
}

impl Eq for FusedClamp {}

impl Hash for FusedClamp {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.min.to_bits().hash(state);
        self.max.to_bits().hash(state);
    }
}

/// `f32` attribute compared and hashed by bit pattern.
#[derive(Debug, Clone, Copy)]
pub struct FloatAttr(pub f32);

impl PartialEq for FloatAttr {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatAttr {}

impl Hash for FloatAttr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// Whether an operand is data flowing through the op or a constant attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterKind {
    Input,
    Attribute,
}

/// Declared parameter slot of an op.
#[derive(Debug, Clone, Copy)]
pub struct ParameterInfo {
    pub name: &'static str,
    pub kind: ParameterKind,
    /// Admissible argument types, if the slot restricts them.
    pub accepts: Option<fn(&IrType) -> bool>,
}

impl ParameterInfo {
    const fn input(name: &'static str) -> Self {
        Self { name, kind: ParameterKind::Input, accepts: None }
    }

    const fn attribute(name: &'static str) -> Self {
        Self { name, kind: ParameterKind::Attribute, accepts: Some(is_int_vector) }
    }
}

fn is_int_vector(ty: &IrType) -> bool {
    ty.as_tensor().is_some_and(|t| t.dtype.is_int() && t.rank() == 1)
}

fn is_int_tensor(ty: &IrType) -> bool {
    ty.logical_tensor().is_some_and(|t| t.dtype.is_int())
}

const UNARY_PARAMS: &[ParameterInfo] = &[ParameterInfo::input("input")];
const BINARY_PARAMS: &[ParameterInfo] = &[ParameterInfo::input("lhs"), ParameterInfo::input("rhs")];
const RESHAPE_PARAMS: &[ParameterInfo] = &[ParameterInfo::input("input"), ParameterInfo::attribute("shape")];
const SLICE_PARAMS: &[ParameterInfo] = &[
    ParameterInfo::input("input"),
    ParameterInfo::attribute("begins"),
    ParameterInfo::attribute("ends"),
    ParameterInfo::attribute("axes"),
    ParameterInfo::attribute("strides"),
];
const CONV2D_PARAMS: &[ParameterInfo] =
    &[ParameterInfo::input("input"), ParameterInfo::input("weights"), ParameterInfo::input("bias")];
const LAYER_NORM_PARAMS: &[ParameterInfo] =
    &[ParameterInfo::input("input"), ParameterInfo::input("scale"), ParameterInfo::input("bias")];
const GATHER_PARAMS: &[ParameterInfo] = &[
    ParameterInfo::input("input"),
    ParameterInfo { name: "indices", kind: ParameterKind::Input, accepts: Some(is_int_tensor) },
];
const CONCAT_PARAMS: &[ParameterInfo] = &[ParameterInfo::input("inputs")];

/// Operation descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash, strum::IntoStaticStr)]
#[strum(serialize_all = "snake_case")]
pub enum Op {
    Unary(UnaryOp),
    Binary(BinaryOp),
    /// Batched matrix product `[.., M, K] x [.., K, N]`.
    MatMul,
    Reduce {
        op: ReduceOp,
        axes: SmallVec<[usize; 4]>,
        keep_dims: bool,
    },
    /// `(input, shape)`; `shape` is a constant `Int64` vector, `-1` infers one extent.
    Reshape,
    Transpose {
        perm: SmallVec<[usize; 4]>,
    },
    /// `(input, begins, ends, axes, strides)`; bounds are constant vectors.
    Slice,
    /// Variadic concatenation along `axis`.
    Concat {
        axis: usize,
    },
    /// NCHW convolution with OIHW weights and per-output-channel bias.
    Conv2D {
        stride: [usize; 2],
        /// `[top, bottom, left, right]`.
        padding: [usize; 4],
        dilation: [usize; 2],
        groups: usize,
        fused_clamp: FusedClamp,
    },
    Softmax {
        axis: usize,
    },
    /// Normalizes over axes `axis..`; scale and bias cover the same trailing shape.
    LayerNorm {
        axis: usize,
        epsilon: FloatAttr,
    },
    Cast {
        dtype: DType,
    },
    Pad {
        pads: SmallVec<[(usize, usize); 4]>,
    },
    Gather {
        axis: usize,
    },
    /// Layout conversion of its single operand to `target`.
    Boxing {
        target: IrType,
    },
}

impl Op {
    pub fn name(&self) -> &'static str {
        self.into()
    }

    pub fn parameters(&self) -> &'static [ParameterInfo] {
        match self {
            Op::Unary(_)
            | Op::Reduce { .. }
            | Op::Transpose { .. }
            | Op::Softmax { .. }
            | Op::Cast { .. }
            | Op::Pad { .. }
            | Op::Boxing { .. } => UNARY_PARAMS,
            Op::Binary(_) | Op::MatMul => BINARY_PARAMS,
            Op::Reshape => RESHAPE_PARAMS,
            Op::Slice => SLICE_PARAMS,
            Op::Concat { .. } => CONCAT_PARAMS,
            Op::Conv2D { .. } => CONV2D_PARAMS,
            Op::LayerNorm { .. } => LAYER_NORM_PARAMS,
            Op::Gather { .. } => GATHER_PARAMS,
        }
    }

    pub fn is_variadic(&self) -> bool {
        matches!(self, Op::Concat { .. })
    }

    /// Parameter slot describing the argument at `index`.
    ///
    /// Variadic ops repeat their last slot.
    pub fn parameter(&self, index: usize) -> Option<&'static ParameterInfo> {
        let params = self.parameters();
        match params.get(index) {
            Some(param) => Some(param),
            None if self.is_variadic() => params.last(),
            None => None,
        }
    }

    pub fn parameter_kind(&self, index: usize) -> ParameterKind {
        self.parameter(index).map_or(ParameterKind::Input, |p| p.kind)
    }

    pub fn is_boxing(&self) -> bool {
        matches!(self, Op::Boxing { .. })
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::Unary(op) => write!(f, "{op}"),
            Op::Binary(op) => write!(f, "{op}"),
            Op::Reduce { op, axes, keep_dims } => write!(f, "reduce_{op}{axes:?}{}", if *keep_dims { "k" } else { "" }),
            Op::Transpose { perm } => write!(f, "transpose{perm:?}"),
            Op::Concat { axis } | Op::Softmax { axis } | Op::LayerNorm { axis, .. } | Op::Gather { axis } => {
                write!(f, "{}[{axis}]", self.name())
            }
            Op::Cast { dtype } => write!(f, "cast<{dtype}>"),
            Op::Boxing { target } => write!(f, "boxing<{target}>"),
            _ => write!(f, "{}", self.name()),
        }
    }
}
