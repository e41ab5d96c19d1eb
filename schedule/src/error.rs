use snafu::Snafu;
use strata_ir::ExprId;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// A distributed call reached kernel selection for an op without distributed support.
    #[snafu(display("{op} at {expr} is not supported on distributed tensors"))]
    NotSupported { op: String, expr: ExprId },

    /// Every candidate of an expression was rejected.
    #[snafu(display("no candidate survived for {expr}"))]
    EmptyCandidates { expr: ExprId },

    /// The input function carries an expression that failed type inference.
    #[snafu(display("input expression {expr} is ill-typed: {reason}"))]
    InvalidProgram { expr: ExprId, reason: String },

    /// Configuration value could not be parsed.
    #[snafu(display("invalid {key} '{value}': {reason}"))]
    InvalidConfig { key: &'static str, value: String, reason: String },

    #[snafu(display("extraction failed: {source}"))]
    Extraction { source: strata_egraph::Error },

    #[snafu(display("IR error: {source}"))]
    Ir { source: strata_ir::Error },
}
