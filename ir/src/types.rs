//! Checked types and literal values.
//!
//! Every expression in a [`Graph`](crate::Graph) carries an [`IrType`]. Plain tensors are
//! [`TensorType`]s; sharded tensors are [`DistributedType`]s, which pair the logical tensor
//! type with a [`Placement`] and one [`Sbp`] per placement hierarchy axis.

use std::fmt;
use std::hash::{Hash, Hasher};

use smallvec::SmallVec;
use strata_dtype::{DType, HasDType};

use crate::error::{InvalidPlacementSnafu, Result};

pub type Shape = SmallVec<[usize; 4]>;

/// Plain (single device) tensor type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorType {
    pub dtype: DType,
    pub shape: Shape,
}

impl TensorType {
    pub fn new(dtype: DType, shape: impl AsRef<[usize]>) -> Self {
        Self { dtype, shape: Shape::from_slice(shape.as_ref()) }
    }

    pub fn scalar(dtype: DType) -> Self {
        Self { dtype, shape: Shape::new() }
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn numel(&self) -> usize {
        self.shape.iter().product()
    }

    pub fn bytes(&self) -> usize {
        self.numel() * self.dtype.bytes()
    }
}

impl fmt::Display for TensorType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[", self.dtype)?;
        for (i, dim) in self.shape.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{dim}")?;
        }
        write!(f, "]")
    }
}

/// Sharding descriptor for one placement hierarchy axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Sbp {
    /// Tensor axis is split evenly across the hierarchy axis.
    Split(usize),
    /// Every device holds the full tensor.
    Broadcast,
    /// Every device holds a partial value; the logical tensor is their sum.
    PartialSum,
}

impl Sbp {
    pub fn is_split(&self) -> bool {
        matches!(self, Sbp::Split(_))
    }

    pub fn is_partial(&self) -> bool {
        matches!(self, Sbp::PartialSum)
    }
}

impl fmt::Display for Sbp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Sbp::Split(axis) => write!(f, "S({axis})"),
            Sbp::Broadcast => write!(f, "B"),
            Sbp::PartialSum => write!(f, "P"),
        }
    }
}

pub type NdSbp = SmallVec<[Sbp; 4]>;

/// Device hierarchy a distributed tensor is laid out across.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Placement {
    hierarchy: SmallVec<[usize; 4]>,
    names: SmallVec<[String; 4]>,
}

impl Placement {
    pub fn new<S: Into<String>>(
        hierarchy: impl IntoIterator<Item = usize>,
        names: impl IntoIterator<Item = S>,
    ) -> Result<Self> {
        let hierarchy: SmallVec<[usize; 4]> = hierarchy.into_iter().collect();
        let names: SmallVec<[String; 4]> = names.into_iter().map(Into::into).collect();
        if hierarchy.is_empty() {
            return InvalidPlacementSnafu { reason: "hierarchy is empty" }.fail();
        }
        if hierarchy.len() != names.len() {
            return InvalidPlacementSnafu {
                reason: format!("{} hierarchy sizes but {} names", hierarchy.len(), names.len()),
            }
            .fail();
        }
        if let Some(axis) = hierarchy.iter().position(|&h| h == 0) {
            return InvalidPlacementSnafu { reason: format!("hierarchy axis {axis} has size 0") }.fail();
        }
        Ok(Self { hierarchy, names })
    }

    /// One device on a single hierarchy axis named `d`.
    pub fn single() -> Self {
        Self { hierarchy: smallvec::smallvec![1], names: smallvec::smallvec!["d".to_string()] }
    }

    pub fn hierarchy(&self) -> &[usize] {
        &self.hierarchy
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn rank(&self) -> usize {
        self.hierarchy.len()
    }

    pub fn device_count(&self) -> usize {
        self.hierarchy.iter().product()
    }
}

impl fmt::Display for Placement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@")?;
        for (i, (size, name)) in self.hierarchy.iter().zip(&self.names).enumerate() {
            if i > 0 {
                write!(f, "x")?;
            }
            write!(f, "{name}{size}")?;
        }
        Ok(())
    }
}

/// Product of hierarchy sizes splitting each tensor axis.
///
/// Returns `None` if some split references an axis outside the shape.
pub fn split_factors(shape: &[usize], ndsbp: &[Sbp], placement: &Placement) -> Option<Shape> {
    let mut factors: Shape = smallvec::smallvec![1; shape.len()];
    for (sbp, &size) in ndsbp.iter().zip(placement.hierarchy()) {
        if let Sbp::Split(axis) = sbp {
            *factors.get_mut(*axis)? *= size;
        }
    }
    Some(factors)
}

/// Whether every split in `ndsbp` evenly divides the corresponding tensor axis.
pub fn is_divisible(shape: &[usize], ndsbp: &[Sbp], placement: &Placement) -> bool {
    if ndsbp.len() != placement.rank() {
        return false;
    }
    match split_factors(shape, ndsbp, placement) {
        Some(factors) => shape.iter().zip(&factors).all(|(dim, factor)| dim % factor == 0),
        None => false,
    }
}

/// Tensor type annotated with a placement and per-hierarchy-axis SBP.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DistributedType {
    pub tensor: TensorType,
    pub ndsbp: NdSbp,
    pub placement: Placement,
}

impl DistributedType {
    pub fn new(tensor: TensorType, ndsbp: impl IntoIterator<Item = Sbp>, placement: Placement) -> Self {
        Self { tensor, ndsbp: ndsbp.into_iter().collect(), placement }
    }

    /// Fully broadcast layout of `tensor` on `placement`.
    pub fn broadcast(tensor: TensorType, placement: Placement) -> Self {
        let ndsbp = std::iter::repeat_n(Sbp::Broadcast, placement.rank()).collect();
        Self { tensor, ndsbp, placement }
    }

    pub fn has_partial(&self) -> bool {
        self.ndsbp.iter().any(Sbp::is_partial)
    }

    pub fn is_divisible(&self) -> bool {
        is_divisible(&self.tensor.shape, &self.ndsbp, &self.placement)
    }

    /// Shape of the shard held by one device, `None` unless the layout is divisible.
    pub fn local_shape(&self) -> Option<Shape> {
        if !self.is_divisible() {
            return None;
        }
        let factors = split_factors(&self.tensor.shape, &self.ndsbp, &self.placement)?;
        Some(self.tensor.shape.iter().zip(&factors).map(|(dim, factor)| dim / factor).collect())
    }

    /// Same tensor with every `PartialSum` axis replaced by `Broadcast`.
    pub fn resolve_partial(&self) -> Self {
        let ndsbp = self.ndsbp.iter().map(|sbp| if sbp.is_partial() { Sbp::Broadcast } else { *sbp }).collect();
        Self { tensor: self.tensor.clone(), ndsbp, placement: self.placement.clone() }
    }
}

impl fmt::Display for DistributedType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{{", self.tensor)?;
        for (i, sbp) in self.ndsbp.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{sbp}")?;
        }
        write!(f, "}}{}", self.placement)
    }
}

/// Checked type of an expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Tensor(TensorType),
    Distributed(DistributedType),
    Tuple(Vec<IrType>),
    /// Type inference rejected the expression.
    Invalid { reason: String },
}

impl IrType {
    pub fn invalid(reason: impl Into<String>) -> Self {
        IrType::Invalid { reason: reason.into() }
    }

    pub fn is_invalid(&self) -> bool {
        matches!(self, IrType::Invalid { .. })
    }

    pub fn is_tensor(&self) -> bool {
        matches!(self, IrType::Tensor(_))
    }

    pub fn is_distributed(&self) -> bool {
        matches!(self, IrType::Distributed(_))
    }

    pub fn as_tensor(&self) -> Option<&TensorType> {
        match self {
            IrType::Tensor(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_distributed(&self) -> Option<&DistributedType> {
        match self {
            IrType::Distributed(d) => Some(d),
            _ => None,
        }
    }

    /// Logical tensor type, looking through distribution.
    pub fn logical_tensor(&self) -> Option<&TensorType> {
        match self {
            IrType::Tensor(t) => Some(t),
            IrType::Distributed(d) => Some(&d.tensor),
            _ => None,
        }
    }

    /// Whether a distributed type appears anywhere in this (possibly nested) type.
    pub fn contains_distributed(&self) -> bool {
        match self {
            IrType::Distributed(_) => true,
            IrType::Tuple(fields) => fields.iter().any(IrType::contains_distributed),
            _ => false,
        }
    }

    /// Whether any nested distributed type carries `PartialSum`.
    pub fn contains_partial(&self) -> bool {
        match self {
            IrType::Distributed(d) => d.has_partial(),
            IrType::Tuple(fields) => fields.iter().any(IrType::contains_partial),
            _ => false,
        }
    }

    /// Whether the type is plain all the way down (tensors and tuples of them).
    pub fn is_terminal(&self) -> bool {
        match self {
            IrType::Tensor(_) => true,
            IrType::Tuple(fields) => fields.iter().all(IrType::is_terminal),
            _ => false,
        }
    }
}

impl From<TensorType> for IrType {
    fn from(value: TensorType) -> Self {
        IrType::Tensor(value)
    }
}

impl From<DistributedType> for IrType {
    fn from(value: DistributedType) -> Self {
        IrType::Distributed(value)
    }
}

impl fmt::Display for IrType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrType::Tensor(t) => write!(f, "{t}"),
            IrType::Distributed(d) => write!(f, "{d}"),
            IrType::Tuple(fields) => {
                write!(f, "(")?;
                for (i, field) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{field}")?;
                }
                write!(f, ")")
            }
            IrType::Invalid { reason } => write!(f, "invalid<{reason}>"),
        }
    }
}

/// Scalar constant value.
#[derive(Debug, Clone, Copy)]
pub enum ConstValue {
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ConstValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            ConstValue::Int(v) => Some(*v),
            ConstValue::Bool(v) => Some(*v as i64),
            ConstValue::Float(_) => None,
        }
    }
}

macro_rules! const_from {
    ($variant:ident: $($host:ty),*) => {
        $(
            impl From<$host> for ConstValue {
                fn from(value: $host) -> Self {
                    ConstValue::$variant(value.into())
                }
            }
        )*
    };
}

const_from!(Int: i8, u8, i16, u16, i32, u32, i64);
const_from!(Float: f32, f64);
const_from!(Bool: bool);

// Floats compare by bit pattern so literals can key hash maps.
impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ConstValue::Int(a), ConstValue::Int(b)) => a == b,
            (ConstValue::Float(a), ConstValue::Float(b)) => a.to_bits() == b.to_bits(),
            (ConstValue::Bool(a), ConstValue::Bool(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl Hash for ConstValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            ConstValue::Int(v) => v.hash(state),
            ConstValue::Float(v) => v.to_bits().hash(state),
            ConstValue::Bool(v) => v.hash(state),
        }
    }
}

impl fmt::Display for ConstValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConstValue::Int(v) => write!(f, "{v}"),
            ConstValue::Float(v) => write!(f, "{v:?}"),
            ConstValue::Bool(v) => write!(f, "{v}"),
        }
    }
}

/// Constant tensor.
///
/// `values` holds either one value per element or a single splatted value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Literal {
    pub ty: TensorType,
    pub values: Vec<ConstValue>,
}

impl Literal {
    /// Rank-0 literal typed after the host type of `value`.
    pub fn scalar<T: HasDType + Into<ConstValue>>(value: T) -> Self {
        Self { ty: TensorType::scalar(T::DTYPE), values: vec![value.into()] }
    }

    /// One-dimensional literal typed after the host element type.
    pub fn vector<T: HasDType + Into<ConstValue>>(values: &[T]) -> Self {
        Self { ty: TensorType::new(T::DTYPE, [values.len()]), values: values.iter().map(|&v| v.into()).collect() }
    }

    /// One-dimensional `Int64` literal, as used for shapes and slice bounds.
    pub fn ints(values: &[i64]) -> Self {
        Self::vector(values)
    }

    /// Literal of type `ty` with every element equal to `value`.
    pub fn splat(ty: TensorType, value: ConstValue) -> Self {
        Self { ty, values: vec![value] }
    }

    pub fn is_splat(&self) -> bool {
        self.values.len() == 1 && self.ty.numel() != 1
    }

    pub fn as_ints(&self) -> Option<SmallVec<[i64; 4]>> {
        if self.is_splat() {
            let v = self.values[0].as_int()?;
            return Some(std::iter::repeat_n(v, self.ty.numel()).collect());
        }
        self.values.iter().map(ConstValue::as_int).collect()
    }
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_splat() {
            return write!(f, "splat({}): {}", self.values[0], self.ty);
        }
        write!(f, "[")?;
        for (i, value) in self.values.iter().take(8).enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{value}")?;
        }
        if self.values.len() > 8 {
            write!(f, ", ...")?;
        }
        write!(f, "]: {}", self.ty)
    }
}
