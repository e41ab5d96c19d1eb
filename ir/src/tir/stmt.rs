use std::fmt;

use super::{Access, LoopMode, Region, clamp};
use crate::error::{GridAccessRankSnafu, Result};

/// Loop over domain `domain` of the enclosing level map, `0..extent`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct For {
    pub domain: usize,
    pub extent: usize,
    pub mode: LoopMode,
    pub body: Box<Stmt>,
}

/// Innermost tile of a tiled grid.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileBody {
    pub grid: String,
    pub tile: Vec<usize>,
    /// Accesses as functions of the loop indices.
    pub accesses: Vec<Access>,
}

impl TileBody {
    /// Buffer window touched by access `index` at the given loop indices.
    pub fn buffer_window(&self, index: usize, indices: &[i64]) -> Result<Region> {
        let access = self.accesses.get(index).ok_or_else(|| {
            GridAccessRankSnafu { access: index, what: "accesses", expected: self.accesses.len(), actual: index + 1 }
                .build()
        })?;
        let windows: Region = indices.iter().map(|&i| i..i + 1).collect();
        Ok(clamp(&access.map.apply(&windows, &[])?, &access.buffer.ty.shape))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stmt {
    For(For),
    Body(TileBody),
}

impl Stmt {
    /// Loops from outermost to innermost.
    pub fn loops(&self) -> Vec<&For> {
        let mut loops = Vec::new();
        let mut current = self;
        while let Stmt::For(f) = current {
            loops.push(f);
            current = &f.body;
        }
        loops
    }

    pub fn body(&self) -> &TileBody {
        match self {
            Stmt::For(f) => f.body.body(),
            Stmt::Body(body) => body,
        }
    }

    fn write_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        let pad = "  ".repeat(depth);
        match self {
            Stmt::For(l) => {
                writeln!(f, "{pad}{} for d{} in 0..{}:", l.mode, l.domain, l.extent)?;
                l.body.write_indented(f, depth + 1)
            }
            Stmt::Body(body) => {
                writeln!(f, "{pad}{} tile {:?}:", body.grid, body.tile)?;
                for access in &body.accesses {
                    writeln!(f, "{pad}  {access}")?;
                }
                Ok(())
            }
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.write_indented(f, 0)
    }
}
