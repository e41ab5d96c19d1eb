//! Inversion of single-variable affine results.
//!
//! [`AffineInverseCollector`] finds which domain a result range depends on.
//! [`AffineInverser`] then peels the expression around that domain's placeholder,
//! applying the inverse of each step to the target expression.

use std::collections::BTreeSet;

use super::expr::{AffineDivKind, AffineExpr};
use super::map::AffineRange;
use crate::error::{AffineNotInvertibleSnafu, Result};

/// Domain dependencies of one result range.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AffineInverseCollector {
    pub offset_domains: BTreeSet<usize>,
    pub extent_domains: BTreeSet<usize>,
}

impl AffineInverseCollector {
    pub fn collect(range: &AffineRange) -> Self {
        let mut collector = Self::default();
        collector.offset_domains.extend(range.offset.dims());
        collector.offset_domains.extend(range.offset.extents());
        collector.extent_domains.extend(range.extent.dims());
        collector.extent_domains.extend(range.extent.extents());
        collector
    }

    /// The single domain the range depends on, `None` for a constant range.
    pub fn domain(&self) -> Result<Option<usize>> {
        if self.offset_domains.len() > 1 || self.extent_domains.len() > 1 {
            return AffineNotInvertibleSnafu { reason: "result depends on more than one domain".to_string() }.fail();
        }
        let offset = self.offset_domains.first().copied();
        let extent = self.extent_domains.first().copied();
        match (offset, extent) {
            (Some(o), Some(e)) if o != e => AffineNotInvertibleSnafu {
                reason: format!("offset depends on domain {o} but extent on domain {e}"),
            }
            .fail(),
            (None, Some(e)) => AffineNotInvertibleSnafu {
                reason: format!("extent depends on domain {e} but the offset is constant"),
            }
            .fail(),
            (offset, _) => Ok(offset),
        }
    }
}

/// Isolates the placeholder of one domain.
///
/// In translating mode `x + c` inverts to `y - c`; in scaling mode additions are dropped,
/// which recovers window lengths from an offset expression.
#[derive(Debug, Clone, Copy)]
pub struct AffineInverser {
    domain: usize,
    translate: bool,
}

impl AffineInverser {
    pub fn translating(domain: usize) -> Self {
        Self { domain, translate: true }
    }

    pub fn scaling(domain: usize) -> Self {
        Self { domain, translate: false }
    }

    fn depends(&self, expr: &AffineExpr) -> bool {
        expr.dims().contains(&self.domain) || expr.extents().contains(&self.domain)
    }

    /// Solves `expr(x) = target` for the domain placeholder `x`.
    pub fn invert(&self, expr: &AffineExpr, target: AffineExpr) -> Result<AffineExpr> {
        let target = target.simplify();
        match expr {
            AffineExpr::Dim(p) | AffineExpr::Extent(p) if *p == self.domain => Ok(target),

            AffineExpr::Add(a, b) => {
                let (var, other) = match (self.depends(a), self.depends(b)) {
                    (true, false) => (a, b),
                    (false, true) => (b, a),
                    _ => return not_invertible(expr, "the domain must appear in exactly one operand of +"),
                };
                let target = if self.translate { target - (**other).clone() } else { target };
                self.invert(var, target)
            }

            AffineExpr::Mul(a, c) => {
                if !self.depends(a) {
                    return not_invertible(expr, "domain not found under *");
                }
                self.invert(a, target.try_div(AffineDivKind::CeilDiv, (**c).clone())?)
            }

            AffineExpr::Div(AffineDivKind::Mod, _, _) => not_invertible(expr, "mod is not invertible"),

            AffineExpr::Div(_, a, c) => {
                if !self.depends(a) {
                    return not_invertible(expr, "domain not found under division");
                }
                self.invert(a, target.try_mul((**c).clone())?)
            }

            _ => not_invertible(expr, "domain not found"),
        }
    }
}

fn not_invertible<T>(expr: &AffineExpr, why: &str) -> Result<T> {
    AffineNotInvertibleSnafu { reason: format!("{expr}: {why}") }.fail()
}
