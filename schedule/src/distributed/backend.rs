//! Target hooks consulted when the cheapest distributed program is extracted.

use std::collections::HashMap;

use strata_egraph::{CostFunction, EGraph, Id};
use strata_ir::IrType;

use super::cost::DistributedCost;
use super::enode::IrNode;

/// What a target can run and what it costs.
///
/// [`Backend::admits`] is a hard constraint: a rejected enode never appears in the
/// extracted program, whatever its cost.
pub trait Backend {
    type Cost: CostFunction<IrNode>;

    /// Cost model over a rebuilt e-graph whose classes are typed by `class_types`.
    fn cost_function(&self, egraph: &EGraph<IrNode>, class_types: HashMap<Id, IrType>) -> Self::Cost;

    /// Whether `enode`, producing a value of type `ty`, may be extracted.
    fn admits(&self, enode: &IrNode, ty: &IrType) -> bool {
        let _ = (enode, ty);
        true
    }
}

/// Every enode is admitted and costed by [`DistributedCost`].
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultBackend;

impl Backend for DefaultBackend {
    type Cost = DistributedCost;

    fn cost_function(&self, egraph: &EGraph<IrNode>, class_types: HashMap<Id, IrType>) -> DistributedCost {
        DistributedCost::new(egraph, class_types)
    }
}
