use std::fmt;
use std::ops::{Mul, Range};

use super::expr::{AffineDim, AffineExpr, AffineExtent, AffineSymbol};
use super::inverse::{AffineInverseCollector, AffineInverser};
use crate::error::{AffineCompositionMismatchSnafu, AffineNotInvertibleSnafu, AffinePositionOutOfRangeSnafu, Result};

/// Iteration domain `N`: an offset placeholder `dN` and an extent placeholder `eN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AffineDomain {
    pub dim: AffineDim,
    pub extent: AffineExtent,
}

impl AffineDomain {
    pub fn new(position: usize) -> Self {
        Self { dim: AffineDim(position), extent: AffineExtent(position) }
    }

    pub fn offset(&self) -> AffineExpr {
        self.dim.into()
    }

    pub fn extent(&self) -> AffineExpr {
        self.extent.into()
    }
}

/// Half-open window `[offset, offset + extent)` described symbolically.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffineRange {
    pub offset: AffineExpr,
    pub extent: AffineExpr,
}

impl AffineRange {
    pub fn new(offset: impl Into<AffineExpr>, extent: impl Into<AffineExpr>) -> Self {
        Self { offset: offset.into(), extent: extent.into() }
    }

    pub fn simplify(&self) -> Self {
        Self { offset: self.offset.simplify(), extent: self.extent.simplify() }
    }
}

impl fmt::Display for AffineRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.offset, self.extent)
    }
}

/// `(domains)[symbols] -> (ranges)`.
///
/// Maps a window of an iteration space to a window of another space, e.g. a tile of a
/// loop nest to the buffer region it touches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffineMap {
    domains: usize,
    symbols: usize,
    results: Vec<AffineRange>,
}

impl AffineMap {
    /// Builds a map, checking every result only references declared positions.
    pub fn new(domains: usize, symbols: usize, results: Vec<AffineRange>) -> Result<Self> {
        for range in &results {
            for expr in [&range.offset, &range.extent] {
                check_positions(expr, domains, symbols)?;
            }
        }
        Ok(Self { domains, symbols, results })
    }

    pub fn identity(rank: usize) -> Self {
        let results = (0..rank).map(|i| AffineRange::new(AffineDim(i), AffineExtent(i))).collect();
        Self { domains: rank, symbols: 0, results }
    }

    /// Builds a map by calling `f` with fresh domain and symbol placeholders.
    ///
    /// ```ignore
    /// // tile of 4 rows: (d0, e0) -> (d0 * 4, e0 * 4)
    /// let map = AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].dim * 4, d[0].extent * 4)])?;
    /// ```
    pub fn from_callable(
        domains: usize,
        symbols: usize,
        f: impl FnOnce(&[AffineDomain], &[AffineSymbol]) -> Vec<AffineRange>,
    ) -> Result<Self> {
        let domain_handles: Vec<AffineDomain> = (0..domains).map(AffineDomain::new).collect();
        let symbol_handles: Vec<AffineSymbol> = (0..symbols).map(AffineSymbol).collect();
        Self::new(domains, symbols, f(&domain_handles, &symbol_handles))
    }

    pub fn domains(&self) -> usize {
        self.domains
    }

    pub fn symbols(&self) -> usize {
        self.symbols
    }

    pub fn results(&self) -> &[AffineRange] {
        &self.results
    }

    /// `self` followed by `rhs`: `(self * rhs)(x) == rhs(self(x))`.
    ///
    /// `rhs`'s symbols are appended after `self`'s.
    pub fn compose(&self, rhs: &AffineMap) -> Result<AffineMap> {
        if self.results.len() != rhs.domains {
            return AffineCompositionMismatchSnafu { lhs_results: self.results.len(), rhs_domains: rhs.domains }
                .fail();
        }
        let offsets: Vec<AffineExpr> = self.results.iter().map(|r| r.offset.clone()).collect();
        let extents: Vec<AffineExpr> = self.results.iter().map(|r| r.extent.clone()).collect();
        let results = rhs
            .results
            .iter()
            .map(|range| {
                let offset = range.offset.shift_symbols(self.symbols).replace_domains(&offsets, &extents)?;
                let extent = range.extent.shift_symbols(self.symbols).replace_domains(&offsets, &extents)?;
                Ok(AffineRange { offset: offset.simplify(), extent: extent.simplify() })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(AffineMap { domains: self.domains, symbols: self.symbols + rhs.symbols, results })
    }

    /// Evaluates the map on concrete domain windows.
    pub fn apply(&self, domains: &[Range<i64>], symbols: &[i64]) -> Result<Vec<Range<i64>>> {
        let offsets: Vec<i64> = domains.iter().map(|r| r.start).collect();
        let extents: Vec<i64> = domains.iter().map(|r| r.end - r.start).collect();
        self.results
            .iter()
            .map(|range| {
                let start = range.offset.evaluate(&offsets, &extents, symbols)?;
                let extent = range.extent.evaluate(&offsets, &extents, symbols)?;
                Ok(start..start + extent)
            })
            .collect()
    }

    /// Map from result windows back to the domain windows that produce them.
    ///
    /// `bounds[i]` is the full extent of domain `i`, used for domains no result depends
    /// on; those come back as `(0, bounds[i])`.
    pub fn inverse(&self, bounds: &[AffineExpr]) -> Result<AffineMap> {
        if bounds.len() != self.domains {
            return AffineNotInvertibleSnafu {
                reason: format!("{} bounds given for {} domains", bounds.len(), self.domains),
            }
            .fail();
        }

        let mut claimed: Vec<Option<AffineRange>> = vec![None; self.domains];
        for (j, range) in self.results.iter().enumerate() {
            let Some(domain) = AffineInverseCollector::collect(range).domain()? else { continue };
            if domain >= self.domains {
                return AffinePositionOutOfRangeSnafu { kind: "dim", position: domain, declared: self.domains }.fail();
            }
            if claimed[domain].is_some() {
                return AffineNotInvertibleSnafu { reason: format!("domain {domain} is claimed by two results") }
                    .fail();
            }

            let offset = AffineInverser::translating(domain).invert(&range.offset, AffineExpr::Dim(j))?;
            let extent = if range.extent.extents().contains(&domain) {
                AffineInverser::translating(domain).invert(&range.extent, AffineExpr::Extent(j))?
            } else {
                AffineInverser::scaling(domain).invert(&range.offset, AffineExpr::Extent(j))?
            };
            claimed[domain] = Some(AffineRange { offset: offset.simplify(), extent: extent.simplify() });
        }

        let results = claimed
            .into_iter()
            .zip(bounds)
            .map(|(range, bound)| range.unwrap_or_else(|| AffineRange::new(0, bound.clone())))
            .collect();
        AffineMap::new(self.results.len(), self.symbols, results)
    }
}

fn check_positions(expr: &AffineExpr, domains: usize, symbols: usize) -> Result<()> {
    let mut error = None;
    expr.visit_leaves(&mut |leaf| {
        let (kind, position, declared) = match leaf {
            AffineExpr::Dim(p) => ("dim", *p, domains),
            AffineExpr::Extent(p) => ("extent", *p, domains),
            AffineExpr::Symbol(p) => ("symbol", *p, symbols),
            _ => return,
        };
        if position >= declared && error.is_none() {
            error = Some(AffinePositionOutOfRangeSnafu { kind, position, declared }.build());
        }
    });
    match error {
        Some(error) => Err(error),
        None => Ok(()),
    }
}

impl Mul for &AffineMap {
    type Output = Result<AffineMap>;

    fn mul(self, rhs: &AffineMap) -> Result<AffineMap> {
        self.compose(rhs)
    }
}

impl fmt::Display for AffineMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for i in 0..self.domains {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "d{i}:e{i}")?;
        }
        write!(f, ")")?;
        if self.symbols > 0 {
            write!(f, "[")?;
            for i in 0..self.symbols {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "s{i}")?;
            }
            write!(f, "]")?;
        }
        write!(f, " -> (")?;
        for (i, range) in self.results.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{range}")?;
        }
        write!(f, ")")
    }
}
