use snafu::Snafu;

use crate::expr::ExprId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Expression id does not belong to this graph.
    #[snafu(display("unknown expression {id}"))]
    UnknownExpr { id: ExprId },

    /// Expression was already disposed.
    #[snafu(display("expression {id} was already disposed"))]
    AlreadyDisposed { id: ExprId },

    /// Dispose requested while other expressions still use the node.
    #[snafu(display("cannot dispose {id}: it still has {users} user(s)"))]
    DisposeWithUsers { id: ExprId, users: usize },

    /// Dispose requested while the node is pinned by a live guard.
    #[snafu(display("cannot dispose {id}: it is pinned"))]
    DisposePinned { id: ExprId },

    /// Placement description is malformed.
    #[snafu(display("invalid placement: {reason}"))]
    InvalidPlacement { reason: String },

    /// Rewriting did not reach a fixed point.
    #[snafu(display("graph rewrite did not converge after {iterations} iterations at {id}"))]
    RewriteDidNotConverge { id: ExprId, iterations: usize },

    /// `Mul`/`Div` right-hand side depends on a dimension or extent.
    #[snafu(display("affine coefficient must be constant-like, got {expr}"))]
    AffineNonConstantCoefficient { expr: String },

    /// Composition requires `lhs.results.len() == rhs.domains.len()`.
    #[snafu(display("cannot compose affine maps: lhs has {lhs_results} results but rhs has {rhs_domains} domains"))]
    AffineCompositionMismatch { lhs_results: usize, rhs_domains: usize },

    /// A result references a domain the map does not declare.
    #[snafu(display("affine {kind} position {position} out of range (map declares {declared})"))]
    AffinePositionOutOfRange { kind: &'static str, position: usize, declared: usize },

    /// Map or relation cannot be inverted.
    #[snafu(display("affine map is not invertible: {reason}"))]
    AffineNotInvertible { reason: String },

    /// Concrete evaluation missed a binding.
    #[snafu(display("affine evaluation has no value for {kind} {position}"))]
    AffineUnbound { kind: &'static str, position: usize },

    /// Concrete evaluation divided by zero.
    #[snafu(display("affine evaluation divided by zero in {expr}"))]
    AffineDivisionByZero { expr: String },

    /// Grid access map does not fit the grid or its buffer.
    #[snafu(display("access {access} of grid: expected {expected} {what}, got {actual}"))]
    GridAccessRank { access: usize, what: &'static str, expected: usize, actual: usize },

    /// Tile shape does not fit the grid domain.
    #[snafu(display("invalid tiling: {reason}"))]
    InvalidTiling { reason: String },
}
