use std::collections::BTreeSet;
use std::fmt;
use std::ops::{Add, Mul, Neg, Sub};

use crate::error::{
    AffineDivisionByZeroSnafu, AffineNonConstantCoefficientSnafu, AffinePositionOutOfRangeSnafu, AffineUnboundSnafu,
    Result,
};

/// Placeholder for the offset of domain `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AffineDim(pub usize);

/// Placeholder for the extent of domain `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AffineExtent(pub usize);

/// Placeholder for runtime parameter `N`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AffineSymbol(pub usize);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AffineDivKind {
    FloorDiv,
    CeilDiv,
    Mod,
}

impl fmt::Display for AffineDivKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            AffineDivKind::FloorDiv => "floordiv",
            AffineDivKind::CeilDiv => "ceildiv",
            AffineDivKind::Mod => "mod",
        })
    }
}

/// Quasi-affine expression over domain offsets, extents and symbols.
///
/// The right operand of `Mul` and `Div` is always constant-like (built from constants
/// and symbols only). The operator overloads only accept constant-like right operands;
/// [`AffineExpr::try_mul`] and [`AffineExpr::try_div`] check arbitrary ones.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AffineExpr {
    Dim(usize),
    Extent(usize),
    Symbol(usize),
    Constant(i64),
    Add(Box<AffineExpr>, Box<AffineExpr>),
    Mul(Box<AffineExpr>, Box<AffineExpr>),
    Div(AffineDivKind, Box<AffineExpr>, Box<AffineExpr>),
}

pub(crate) fn floor_div(a: i64, b: i64) -> i64 {
    let q = a / b;
    if a % b != 0 && ((a < 0) != (b < 0)) { q - 1 } else { q }
}

pub(crate) fn ceil_div(a: i64, b: i64) -> i64 {
    -floor_div(-a, b)
}

fn fold_div(kind: AffineDivKind, a: i64, b: i64) -> i64 {
    match kind {
        AffineDivKind::FloorDiv => floor_div(a, b),
        AffineDivKind::CeilDiv => ceil_div(a, b),
        AffineDivKind::Mod => a - b * floor_div(a, b),
    }
}

impl AffineExpr {
    pub fn dim(position: usize) -> Self {
        AffineExpr::Dim(position)
    }

    pub fn extent(position: usize) -> Self {
        AffineExpr::Extent(position)
    }

    pub fn symbol(position: usize) -> Self {
        AffineExpr::Symbol(position)
    }

    pub fn constant(value: i64) -> Self {
        AffineExpr::Constant(value)
    }

    pub fn as_constant(&self) -> Option<i64> {
        match self {
            AffineExpr::Constant(c) => Some(*c),
            _ => None,
        }
    }

    /// Built from constants and symbols only.
    pub fn is_constant_like(&self) -> bool {
        match self {
            AffineExpr::Dim(_) | AffineExpr::Extent(_) => false,
            AffineExpr::Symbol(_) | AffineExpr::Constant(_) => true,
            AffineExpr::Add(a, b) | AffineExpr::Mul(a, b) | AffineExpr::Div(_, a, b) => {
                a.is_constant_like() && b.is_constant_like()
            }
        }
    }

    /// `self * rhs`, rejecting a right operand that depends on a domain.
    pub fn try_mul(self, rhs: AffineExpr) -> Result<AffineExpr> {
        if !rhs.is_constant_like() {
            return AffineNonConstantCoefficientSnafu { expr: rhs.to_string() }.fail();
        }
        Ok(AffineExpr::Mul(Box::new(self), Box::new(rhs)))
    }

    pub fn try_div(self, kind: AffineDivKind, rhs: AffineExpr) -> Result<AffineExpr> {
        if !rhs.is_constant_like() {
            return AffineNonConstantCoefficientSnafu { expr: rhs.to_string() }.fail();
        }
        Ok(AffineExpr::Div(kind, Box::new(self), Box::new(rhs)))
    }

    pub fn floor_div(self, rhs: impl Into<ConstLike>) -> AffineExpr {
        AffineExpr::Div(AffineDivKind::FloorDiv, Box::new(self), Box::new(rhs.into().0))
    }

    pub fn ceil_div(self, rhs: impl Into<ConstLike>) -> AffineExpr {
        AffineExpr::Div(AffineDivKind::CeilDiv, Box::new(self), Box::new(rhs.into().0))
    }

    pub fn modulo(self, rhs: impl Into<ConstLike>) -> AffineExpr {
        AffineExpr::Div(AffineDivKind::Mod, Box::new(self), Box::new(rhs.into().0))
    }

    /// Constant-folds the expression.
    ///
    /// Constants are moved to the right of `Add`, and nested constant additions and
    /// multiplications are merged.
    pub fn simplify(&self) -> AffineExpr {
        use AffineExpr::{Add, Constant, Div, Mul};

        match self {
            Add(a, b) => match (a.simplify(), b.simplify()) {
                (Constant(x), Constant(y)) => Constant(x + y),
                (x, Constant(0)) | (Constant(0), x) => x,
                (Constant(c), x) => fold_add_constant(x, c),
                (x, Constant(c)) => fold_add_constant(x, c),
                (x, y) => Add(Box::new(x), Box::new(y)),
            },
            Mul(a, b) => match (a.simplify(), b.simplify()) {
                (Constant(x), Constant(y)) => Constant(x * y),
                (_, Constant(0)) | (Constant(0), _) => Constant(0),
                (x, Constant(1)) => x,
                (Mul(x, inner), Constant(c)) => match *inner {
                    Constant(k) => Mul(x, Box::new(Constant(k * c))),
                    inner => Mul(Box::new(Mul(x, Box::new(inner))), Box::new(Constant(c))),
                },
                (x, y) => Mul(Box::new(x), Box::new(y)),
            },
            Div(kind, a, b) => match (a.simplify(), b.simplify()) {
                (Constant(x), Constant(y)) if y != 0 => Constant(fold_div(*kind, x, y)),
                (x, Constant(1)) => match kind {
                    AffineDivKind::Mod => Constant(0),
                    _ => x,
                },
                (x, y) => Div(*kind, Box::new(x), Box::new(y)),
            },
            leaf => leaf.clone(),
        }
    }

    /// Evaluates with concrete values for every referenced position.
    pub fn evaluate(&self, dims: &[i64], extents: &[i64], symbols: &[i64]) -> Result<i64> {
        let lookup = |values: &[i64], kind: &'static str, position: usize| {
            values.get(position).copied().ok_or_else(|| AffineUnboundSnafu { kind, position }.build())
        };
        match self {
            AffineExpr::Dim(p) => lookup(dims, "dim", *p),
            AffineExpr::Extent(p) => lookup(extents, "extent", *p),
            AffineExpr::Symbol(p) => lookup(symbols, "symbol", *p),
            AffineExpr::Constant(c) => Ok(*c),
            AffineExpr::Add(a, b) => Ok(a.evaluate(dims, extents, symbols)? + b.evaluate(dims, extents, symbols)?),
            AffineExpr::Mul(a, b) => Ok(a.evaluate(dims, extents, symbols)? * b.evaluate(dims, extents, symbols)?),
            AffineExpr::Div(kind, a, b) => {
                let divisor = b.evaluate(dims, extents, symbols)?;
                if divisor == 0 {
                    return AffineDivisionByZeroSnafu { expr: self.to_string() }.fail();
                }
                Ok(fold_div(*kind, a.evaluate(dims, extents, symbols)?, divisor))
            }
        }
    }

    /// Replaces `Dim(i)` with `dims[i]` and `Extent(i)` with `extents[i]`.
    pub fn replace_domains(&self, dims: &[AffineExpr], extents: &[AffineExpr]) -> Result<AffineExpr> {
        let pick = |values: &[AffineExpr], kind: &'static str, position: usize| {
            values.get(position).cloned().ok_or_else(|| {
                AffinePositionOutOfRangeSnafu { kind, position, declared: values.len() }.build()
            })
        };
        Ok(match self {
            AffineExpr::Dim(p) => pick(dims, "dim", *p)?,
            AffineExpr::Extent(p) => pick(extents, "extent", *p)?,
            AffineExpr::Symbol(_) | AffineExpr::Constant(_) => self.clone(),
            AffineExpr::Add(a, b) => {
                AffineExpr::Add(Box::new(a.replace_domains(dims, extents)?), Box::new(b.replace_domains(dims, extents)?))
            }
            AffineExpr::Mul(a, b) => {
                AffineExpr::Mul(Box::new(a.replace_domains(dims, extents)?), Box::new(b.replace_domains(dims, extents)?))
            }
            AffineExpr::Div(kind, a, b) => AffineExpr::Div(
                *kind,
                Box::new(a.replace_domains(dims, extents)?),
                Box::new(b.replace_domains(dims, extents)?),
            ),
        })
    }

    /// Renumbers every symbol `s_i` as `s_{i + offset}`.
    pub fn shift_symbols(&self, offset: usize) -> AffineExpr {
        match self {
            AffineExpr::Symbol(p) => AffineExpr::Symbol(p + offset),
            AffineExpr::Dim(_) | AffineExpr::Extent(_) | AffineExpr::Constant(_) => self.clone(),
            AffineExpr::Add(a, b) => AffineExpr::Add(Box::new(a.shift_symbols(offset)), Box::new(b.shift_symbols(offset))),
            AffineExpr::Mul(a, b) => AffineExpr::Mul(Box::new(a.shift_symbols(offset)), Box::new(b.shift_symbols(offset))),
            AffineExpr::Div(kind, a, b) => {
                AffineExpr::Div(*kind, Box::new(a.shift_symbols(offset)), Box::new(b.shift_symbols(offset)))
            }
        }
    }

    pub(crate) fn visit_leaves(&self, f: &mut impl FnMut(&AffineExpr)) {
        match self {
            AffineExpr::Add(a, b) | AffineExpr::Mul(a, b) | AffineExpr::Div(_, a, b) => {
                a.visit_leaves(f);
                b.visit_leaves(f);
            }
            leaf => f(leaf),
        }
    }

    pub fn dims(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        self.visit_leaves(&mut |leaf| {
            if let AffineExpr::Dim(p) = leaf {
                out.insert(*p);
            }
        });
        out
    }

    pub fn extents(&self) -> BTreeSet<usize> {
        let mut out = BTreeSet::new();
        self.visit_leaves(&mut |leaf| {
            if let AffineExpr::Extent(p) = leaf {
                out.insert(*p);
            }
        });
        out
    }

    /// Highest symbol position referenced, if any.
    pub fn max_symbol(&self) -> Option<usize> {
        let mut max = None;
        self.visit_leaves(&mut |leaf| {
            if let AffineExpr::Symbol(p) = leaf {
                max = max.max(Some(*p));
            }
        });
        max
    }
}

fn fold_add_constant(x: AffineExpr, c: i64) -> AffineExpr {
    match x {
        AffineExpr::Add(inner, k) if matches!(*k, AffineExpr::Constant(_)) => {
            let k = k.as_constant().unwrap_or_default();
            if k + c == 0 { *inner } else { AffineExpr::Add(inner, Box::new(AffineExpr::Constant(k + c))) }
        }
        x => AffineExpr::Add(Box::new(x), Box::new(AffineExpr::Constant(c))),
    }
}

/// Right operand accepted by the infallible multiplicative operators.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstLike(AffineExpr);

impl From<i64> for ConstLike {
    fn from(value: i64) -> Self {
        ConstLike(AffineExpr::Constant(value))
    }
}

impl From<AffineSymbol> for ConstLike {
    fn from(value: AffineSymbol) -> Self {
        ConstLike(AffineExpr::Symbol(value.0))
    }
}

impl From<i64> for AffineExpr {
    fn from(value: i64) -> Self {
        AffineExpr::Constant(value)
    }
}

impl From<AffineDim> for AffineExpr {
    fn from(value: AffineDim) -> Self {
        AffineExpr::Dim(value.0)
    }
}

impl From<AffineExtent> for AffineExpr {
    fn from(value: AffineExtent) -> Self {
        AffineExpr::Extent(value.0)
    }
}

impl From<AffineSymbol> for AffineExpr {
    fn from(value: AffineSymbol) -> Self {
        AffineExpr::Symbol(value.0)
    }
}

impl<T: Into<AffineExpr>> Add<T> for AffineExpr {
    type Output = AffineExpr;

    fn add(self, rhs: T) -> AffineExpr {
        AffineExpr::Add(Box::new(self), Box::new(rhs.into()))
    }
}

impl<T: Into<AffineExpr>> Sub<T> for AffineExpr {
    type Output = AffineExpr;

    fn sub(self, rhs: T) -> AffineExpr {
        let rhs: AffineExpr = rhs.into();
        self + (-rhs)
    }
}

impl Neg for AffineExpr {
    type Output = AffineExpr;

    fn neg(self) -> AffineExpr {
        self * -1
    }
}

impl Mul<i64> for AffineExpr {
    type Output = AffineExpr;

    fn mul(self, rhs: i64) -> AffineExpr {
        AffineExpr::Mul(Box::new(self), Box::new(AffineExpr::Constant(rhs)))
    }
}

impl Mul<AffineSymbol> for AffineExpr {
    type Output = AffineExpr;

    fn mul(self, rhs: AffineSymbol) -> AffineExpr {
        AffineExpr::Mul(Box::new(self), Box::new(AffineExpr::Symbol(rhs.0)))
    }
}

macro_rules! impl_placeholder_ops {
    ($($ty:ty),*) => {$(
        impl<T: Into<AffineExpr>> Add<T> for $ty {
            type Output = AffineExpr;
            fn add(self, rhs: T) -> AffineExpr {
                AffineExpr::from(self) + rhs
            }
        }

        impl<T: Into<AffineExpr>> Sub<T> for $ty {
            type Output = AffineExpr;
            fn sub(self, rhs: T) -> AffineExpr {
                AffineExpr::from(self) - rhs
            }
        }

        impl Mul<i64> for $ty {
            type Output = AffineExpr;
            fn mul(self, rhs: i64) -> AffineExpr {
                AffineExpr::from(self) * rhs
            }
        }

        impl Mul<AffineSymbol> for $ty {
            type Output = AffineExpr;
            fn mul(self, rhs: AffineSymbol) -> AffineExpr {
                AffineExpr::from(self) * rhs
            }
        }
    )*};
}

impl_placeholder_ops!(AffineDim, AffineExtent, AffineSymbol);

impl fmt::Display for AffineExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AffineExpr::Dim(p) => write!(f, "d{p}"),
            AffineExpr::Extent(p) => write!(f, "e{p}"),
            AffineExpr::Symbol(p) => write!(f, "s{p}"),
            AffineExpr::Constant(c) => write!(f, "{c}"),
            AffineExpr::Add(a, b) => match b.as_constant() {
                Some(c) if c < 0 => write!(f, "({a} - {})", -c),
                _ => write!(f, "({a} + {b})"),
            },
            AffineExpr::Mul(a, b) => write!(f, "{a} * {b}"),
            AffineExpr::Div(kind, a, b) => write!(f, "({a} {kind} {b})"),
        }
    }
}
