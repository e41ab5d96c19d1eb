//! Affine map algebra for tiling.
//!
//! - [`AffineExpr`]: quasi-affine expressions over domain offsets (`dN`), extents (`eN`),
//!   symbols (`sN`) and constants.
//! - [`AffineMap`]: windows of an iteration space to windows of another space.
//! - [`AffineRelation`]: points to points.
//!
//! Maps compose left to right (`(a * b)(x) == b(a(x))`) and invert when every result
//! depends on at most one domain through invertible steps.

pub mod expr;
pub mod inverse;
pub mod map;
pub mod relation;

pub use expr::{AffineDim, AffineDivKind, AffineExpr, AffineExtent, AffineSymbol, ConstLike};
pub use inverse::{AffineInverseCollector, AffineInverser};
pub use map::{AffineDomain, AffineMap, AffineRange};
pub use relation::AffineRelation;
