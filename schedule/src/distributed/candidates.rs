//! Candidate layouts and the per-expression bucket map.

use indexmap::IndexMap;
use itertools::Itertools;
use strata_ir::infer::distributed::leaf_layouts;
use strata_ir::{DistributedType, ExprId, IrType, Placement, Sbp, TensorType};

/// Candidates of one original expression, grouped by checked type.
///
/// Members of one entry are interchangeable. The first member represents its type when
/// consumers build combinations.
pub type Bucket = IndexMap<IrType, Vec<ExprId>>;

/// Every divisible, partial-free layout of `tensor` on `placement`.
pub fn leaf_candidates(tensor: &TensorType, placement: &Placement) -> Vec<DistributedType> {
    leaf_layouts(tensor, placement)
        .into_iter()
        .map(|ndsbp| DistributedType::new(tensor.clone(), ndsbp, placement.clone()))
        .collect()
}

/// Layouts reachable from `ty` by resolving each `PartialSum` axis to `B` or a split.
///
/// `ty` itself is not included. Only divisible layouts are returned.
pub fn partial_resolutions(ty: &DistributedType) -> Vec<DistributedType> {
    if !ty.has_partial() {
        return Vec::new();
    }
    let rank = ty.tensor.rank();
    ty.ndsbp
        .iter()
        .map(|&sbp| -> Vec<Sbp> {
            if sbp.is_partial() {
                std::iter::once(Sbp::Broadcast).chain((0..rank).map(Sbp::Split)).collect()
            } else {
                vec![sbp]
            }
        })
        .multi_cartesian_product()
        .map(|ndsbp| DistributedType::new(ty.tensor.clone(), ndsbp, ty.placement.clone()))
        .filter(|candidate| candidate != ty && candidate.is_divisible())
        .collect()
}
