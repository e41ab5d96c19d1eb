//! Scheduling passes for the strata middle-end.
//!
//! # Module Organization
//!
//! - [`distributed`] - Auto-distribution of a function over a device placement
//! - [`rules`] - Pattern rules cleaning up the boxing the distributor leaves behind
//! - [`selection`] - Lowering of calls to tiled kernels and boxing transfers
//! - [`pipeline`] - The three stages chained into [`compile`]
//! - [`config`] - Pass configuration with environment fallbacks
//!
//! Pattern matching and rewriting live in `strata_ir::pattern` and `strata_ir::rewrite`;
//! the e-graph used for extraction lives in `strata_egraph`.

pub mod config;
pub mod distributed;
pub mod error;
pub mod pipeline;
pub mod rules;
pub mod selection;


pub use config::DistributeConfig;
pub use distributed::{AutoDistributed, Backend, BoxingKind, DefaultBackend, auto_distribute, auto_distribute_with};
pub use error::{Error, Result};
pub use pipeline::{Compiled, compile, compile_with};
pub use selection::{Selected, SelectedCall, TiledKernel, select_kernels};
