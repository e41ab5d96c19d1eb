//! Common imports for building and rewriting expression graphs.
//!
//! ```rust,ignore
//! use strata_ir::prelude::*;
//! ```

pub use crate::expr::{ExprId, Function, Graph, Node};
pub use crate::op::{BinaryOp, FloatAttr, FusedClamp, Op, ReduceOp, UnaryOp};
pub use crate::types::{ConstValue, DistributedType, IrType, Literal, NdSbp, Placement, Sbp, TensorType};

pub use crate::pattern::{MatchResult, Pattern, try_match};
pub use crate::rewrite::{FnRule, RewriteRule, graph_rewrite};

pub use strata_dtype::DType;
