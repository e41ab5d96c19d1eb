use std::fmt;

use super::expr::{AffineDim, AffineExpr, AffineSymbol};
use super::inverse::AffineInverser;
use crate::error::{
    AffineCompositionMismatchSnafu, AffineNotInvertibleSnafu, AffinePositionOutOfRangeSnafu, Result,
};

/// `(dims)[symbols] -> (exprs)`: a point-to-point affine relation.
///
/// Unlike [`AffineMap`](super::AffineMap) it carries no extents; results may only
/// reference dims and symbols.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AffineRelation {
    dims: usize,
    symbols: usize,
    results: Vec<AffineExpr>,
}

impl AffineRelation {
    pub fn new(dims: usize, symbols: usize, results: Vec<AffineExpr>) -> Result<Self> {
        for expr in &results {
            if let Some(&position) = expr.extents().first() {
                return AffinePositionOutOfRangeSnafu { kind: "extent", position, declared: 0usize }.fail();
            }
            if let Some(&position) = expr.dims().last()
                && position >= dims
            {
                return AffinePositionOutOfRangeSnafu { kind: "dim", position, declared: dims }.fail();
            }
            if let Some(position) = expr.max_symbol()
                && position >= symbols
            {
                return AffinePositionOutOfRangeSnafu { kind: "symbol", position, declared: symbols }.fail();
            }
        }
        Ok(Self { dims, symbols, results })
    }

    pub fn identity(rank: usize) -> Self {
        Self { dims: rank, symbols: 0, results: (0..rank).map(AffineExpr::Dim).collect() }
    }

    pub fn from_callable(
        dims: usize,
        symbols: usize,
        f: impl FnOnce(&[AffineDim], &[AffineSymbol]) -> Vec<AffineExpr>,
    ) -> Result<Self> {
        let dim_handles: Vec<AffineDim> = (0..dims).map(AffineDim).collect();
        let symbol_handles: Vec<AffineSymbol> = (0..symbols).map(AffineSymbol).collect();
        Self::new(dims, symbols, f(&dim_handles, &symbol_handles))
    }

    pub fn dims(&self) -> usize {
        self.dims
    }

    pub fn symbols(&self) -> usize {
        self.symbols
    }

    pub fn results(&self) -> &[AffineExpr] {
        &self.results
    }

    /// `self` followed by `rhs`, with `rhs`'s symbols appended.
    pub fn compose(&self, rhs: &AffineRelation) -> Result<AffineRelation> {
        if self.results.len() != rhs.dims {
            return AffineCompositionMismatchSnafu { lhs_results: self.results.len(), rhs_domains: rhs.dims }.fail();
        }
        let results = rhs
            .results
            .iter()
            .map(|expr| Ok(expr.shift_symbols(self.symbols).replace_domains(&self.results, &[])?.simplify()))
            .collect::<Result<Vec<_>>>()?;
        Ok(AffineRelation { dims: self.dims, symbols: self.symbols + rhs.symbols, results })
    }

    pub fn apply(&self, point: &[i64], symbols: &[i64]) -> Result<Vec<i64>> {
        self.results.iter().map(|expr| expr.evaluate(point, &[], symbols)).collect()
    }

    /// Inverse of a relation where every result depends on a distinct single dim.
    pub fn inverse(&self) -> Result<AffineRelation> {
        let mut solved: Vec<Option<AffineExpr>> = vec![None; self.dims];
        for (j, expr) in self.results.iter().enumerate() {
            let dims = expr.dims();
            let dim = match (dims.len(), dims.first()) {
                (1, Some(&dim)) => dim,
                (n, _) => {
                    return AffineNotInvertibleSnafu { reason: format!("result {j} depends on {n} dims") }.fail();
                }
            };
            if solved[dim].is_some() {
                return AffineNotInvertibleSnafu { reason: format!("dim {dim} is claimed by two results") }.fail();
            }
            solved[dim] = Some(AffineInverser::translating(dim).invert(expr, AffineExpr::Dim(j))?.simplify());
        }
        let results = solved
            .into_iter()
            .enumerate()
            .map(|(dim, expr)| {
                expr.ok_or_else(|| {
                    AffineNotInvertibleSnafu { reason: format!("no result depends on dim {dim}") }.build()
                })
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(AffineRelation { dims: self.results.len(), symbols: self.symbols, results })
    }
}

impl fmt::Display for AffineRelation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = (0..self.dims).map(|i| format!("d{i}")).collect();
        let results: Vec<String> = self.results.iter().map(ToString::to_string).collect();
        write!(f, "({})", dims.join(", "))?;
        if self.symbols > 0 {
            let symbols: Vec<String> = (0..self.symbols).map(|i| format!("s{i}")).collect();
            write!(f, "[{}]", symbols.join(", "))?;
        }
        write!(f, " -> ({})", results.join(", "))
    }
}
