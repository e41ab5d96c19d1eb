//! Tiled iteration constructs.
//!
//! A [`Grid`] is a perfectly nested iteration space with an [`AffineMap`] per buffer
//! access. [`Grid::tile`] turns it into a nest of [`For`] loops whose body accesses are
//! the level map composed with the original access map.

pub mod grid;
pub mod stmt;

use std::fmt;
use std::ops::Range;

use crate::affine::AffineMap;
use crate::types::TensorType;

pub use grid::Grid;
pub use stmt::{For, Stmt, TileBody};

/// Concrete multi-dimensional window.
pub type Region = Vec<Range<i64>>;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Buffer {
    pub name: String,
    pub ty: TensorType,
}

impl Buffer {
    pub fn new(name: impl Into<String>, ty: TensorType) -> Self {
        Self { name: name.into(), ty }
    }

    pub fn full_region(&self) -> Region {
        self.ty.shape.iter().map(|&dim| 0..dim as i64).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum AccessKind {
    Read,
    Write,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Access {
    pub buffer: Buffer,
    pub kind: AccessKind,
    /// Iteration window to buffer window.
    pub map: AffineMap,
}

impl Access {
    pub fn read(buffer: Buffer, map: AffineMap) -> Self {
        Self { buffer, kind: AccessKind::Read, map }
    }

    pub fn write(buffer: Buffer, map: AffineMap) -> Self {
        Self { buffer, kind: AccessKind::Write, map }
    }
}

impl fmt::Display for Access {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.kind, self.buffer.name, self.map)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum LoopMode {
    Serial,
    Parallel,
}

/// Intersects each window of `region` with `[0, bounds[i])`.
pub fn clamp(region: &[Range<i64>], bounds: &[usize]) -> Region {
    region
        .iter()
        .zip(bounds)
        .map(|(range, &bound)| {
            let start = range.start.clamp(0, bound as i64);
            start..range.end.clamp(start, bound as i64)
        })
        .collect()
}
