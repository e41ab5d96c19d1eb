use snafu::Snafu;

use crate::Id;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Clone, PartialEq, Eq, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    /// Unions are pending; congruence is not restored yet.
    #[snafu(display("e-graph has {pending} union(s) since the last rebuild"))]
    NotRebuilt { pending: usize },

    /// Id does not name an e-class of this graph.
    #[snafu(display("unknown e-class {id}"))]
    UnknownClass { id: Id },

    /// No admissible enode of the class has a finite cost.
    #[snafu(display("e-class {id} has no admissible term"))]
    NoAdmissibleTerm { id: Id },
}
