//! Tensor IR for the strata middle-end.
//!
//! # Module Organization
//!
//! - [`expr`] - Arena of expression nodes ([`Graph`]), [`ExprId`] handles and [`Function`]s
//! - [`op`] - Operation catalogue with declared parameter slots
//! - [`types`] - Checked types: plain tensors, distributed (SBP) tensors, tuples, literals
//! - [`infer`] - Type inference run when a call is built
//! - [`users`] - Use side table, disposal and pinning
//! - [`pattern`] / [`rewrite`] - Declarative patterns and the fixed-point rewrite engine
//! - [`affine`] - Affine expressions, maps and relations with composition and inversion
//! - [`tir`] - Grids of affine accesses and their tiling into loop nests
//! - [`naming`] / [`tree`] - Name allocation and tree printing
//! - [`error`] - Error types and result handling

pub mod affine;
pub mod error;
pub mod expr;
pub mod infer;
pub mod naming;
pub mod op;
pub mod pattern;
pub mod prelude;
pub mod rewrite;
pub mod tir;
pub mod tree;
pub mod types;
pub mod users;


pub use error::{Error, Result};
pub use expr::{ExprData, ExprId, Function, Graph, Node, Operands};
pub use infer::is_legal_boxing;
pub use naming::NameAlloc;
pub use op::{BinaryOp, FloatAttr, FusedClamp, Op, ParameterInfo, ParameterKind, ReduceOp, UnaryOp};
pub use pattern::{MatchResult, Pattern, try_match};
pub use rewrite::{FnRule, RewriteRule, RuleSet, collect_rewrites, dce, graph_rewrite};
pub use tree::render_tree;
pub use types::{ConstValue, DistributedType, IrType, Literal, NdSbp, Placement, Sbp, Shape, TensorType};
pub use users::{PinGuard, UseTable};

pub use strata_dtype::DType;
