use std::fmt;
use std::ops::Range;

use snafu::ensure;
use tracing::debug;

use super::stmt::{For, Stmt, TileBody};
use super::{Access, LoopMode, Region, clamp};
use crate::affine::{AffineExpr, AffineMap, AffineRange};
use crate::error::{GridAccessRankSnafu, InvalidTilingSnafu, Result};

/// Perfectly nested iteration space `[0, bounds[0]) x .. x [0, bounds[n-1])`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Grid {
    pub name: String,
    bounds: Vec<usize>,
    accesses: Vec<Access>,
}

impl Grid {
    /// Builds a grid, checking every access map spans the grid and its buffer.
    pub fn new(name: impl Into<String>, bounds: Vec<usize>, accesses: Vec<Access>) -> Result<Self> {
        for (index, access) in accesses.iter().enumerate() {
            ensure!(
                access.map.domains() == bounds.len(),
                GridAccessRankSnafu { access: index, what: "domains", expected: bounds.len(), actual: access.map.domains() }
            );
            let rank = access.buffer.ty.rank();
            ensure!(
                access.map.results().len() == rank,
                GridAccessRankSnafu { access: index, what: "results", expected: rank, actual: access.map.results().len() }
            );
        }
        Ok(Self { name: name.into(), bounds, accesses })
    }

    pub fn bounds(&self) -> &[usize] {
        &self.bounds
    }

    pub fn accesses(&self) -> &[Access] {
        &self.accesses
    }

    pub fn full_region(&self) -> Region {
        self.bounds.iter().map(|&b| 0..b as i64).collect()
    }

    fn access(&self, index: usize) -> Result<&Access> {
        self.accesses.get(index).ok_or_else(|| {
            GridAccessRankSnafu { access: index, what: "accesses", expected: self.accesses.len(), actual: index + 1 }
                .build()
        })
    }

    /// Buffer window touched by iteration window `tile` through access `index`.
    pub fn buffer_window(&self, index: usize, tile: &[Range<i64>]) -> Result<Region> {
        let access = self.access(index)?;
        let window = access.map.apply(tile, &[])?;
        Ok(clamp(&window, &access.buffer.ty.shape))
    }

    /// Iterations whose access `index` falls in buffer window `region`.
    pub fn iteration_window(&self, index: usize, region: &[Range<i64>]) -> Result<Region> {
        let access = self.access(index)?;
        let bounds: Vec<AffineExpr> = self.bounds.iter().map(|&b| AffineExpr::Constant(b as i64)).collect();
        let inverse = access.map.inverse(&bounds)?;
        let window = inverse.apply(region, &[])?;
        Ok(clamp(&window, &self.bounds))
    }

    /// Tiles the grid with one tile shape per level, outermost first.
    ///
    /// Level 0 tiles must divide the grid bounds and each later level must divide the
    /// previous one. The outermost loops run in parallel.
    pub fn tile(&self, levels: &[Vec<usize>]) -> Result<Stmt> {
        let rank = self.bounds.len();
        ensure!(!levels.is_empty(), InvalidTilingSnafu { reason: "no tiling levels" });

        let mut outer = self.bounds.clone();
        for (level, tile) in levels.iter().enumerate() {
            ensure!(
                tile.len() == rank,
                InvalidTilingSnafu { reason: format!("level {level} has rank {} but grid has {rank}", tile.len()) }
            );
            for (axis, (&t, &o)) in tile.iter().zip(&outer).enumerate() {
                ensure!(
                    t > 0 && o % t == 0,
                    InvalidTilingSnafu { reason: format!("level {level} tile {t} does not divide {o} on axis {axis}") }
                );
            }
            outer.clone_from(tile);
        }

        let level_map = level_map(levels, rank)?;
        let accesses = self
            .accesses
            .iter()
            .map(|access| Ok(Access { map: (&level_map * &access.map)?, ..access.clone() }))
            .collect::<Result<Vec<_>>>()?;
        let innermost = levels.last().cloned().unwrap_or_default();
        let mut stmt = Stmt::Body(TileBody { grid: self.name.clone(), tile: innermost, accesses });

        // Build the nest inside out.
        for level in (0..levels.len()).rev() {
            let parent: &[usize] = if level == 0 { &self.bounds } else { &levels[level - 1] };
            let mode = if level == 0 { LoopMode::Parallel } else { LoopMode::Serial };
            for axis in (0..rank).rev() {
                stmt = Stmt::For(For {
                    domain: level * rank + axis,
                    extent: parent[axis] / levels[level][axis],
                    mode,
                    body: Box::new(stmt),
                });
            }
        }
        debug!(grid = %self.name, levels = levels.len(), "grid.tile");
        Ok(stmt)
    }
}

/// Loop indices of every level to the iteration window of one innermost tile.
///
/// Loop `l * rank + i` walks axis `i` at level `l` in steps of `levels[l][i]`.
fn level_map(levels: &[Vec<usize>], rank: usize) -> Result<AffineMap> {
    let depth = levels.len();
    AffineMap::from_callable(depth * rank, 0, |domains, _| {
        (0..rank)
            .map(|axis| {
                let offset = (0..depth)
                    .map(|level| domains[level * rank + axis].dim * levels[level][axis] as i64)
                    .fold(AffineExpr::Constant(0), |acc, term| acc + term);
                let inner = &domains[(depth - 1) * rank + axis];
                let extent = inner.extent * levels[depth - 1][axis] as i64;
                AffineRange { offset: offset.simplify(), extent }
            })
            .collect()
    })
}

impl fmt::Display for Grid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "grid {} {:?}", self.name, self.bounds)?;
        for access in &self.accesses {
            writeln!(f, "  {access}")?;
        }
        Ok(())
    }
}
