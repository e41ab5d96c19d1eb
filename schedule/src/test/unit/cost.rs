use strata_ir::{DistributedType, IrType, Op, Sbp};
use test_case::test_case;

use crate::distributed::BoxingKind;
use crate::distributed::cost::{boxing_cost, compute_cost, local_shape};
use crate::test::{f32_tensor, placement};

use Sbp::{Broadcast as B, PartialSum as P, Split as S};

fn dist(shape: &[usize], ndsbp: &[Sbp], hierarchy: &[usize]) -> IrType {
    IrType::Distributed(DistributedType::new(f32_tensor(shape), ndsbp.iter().copied(), placement(hierarchy)))
}

fn plain(shape: &[usize]) -> IrType {
    IrType::Tensor(f32_tensor(shape))
}

#[test_case(plain(&[4]), plain(&[4]) => BoxingKind::Nop ; "plain to plain")]
#[test_case(plain(&[4]), dist(&[4], &[S(0)], &[2]) => BoxingKind::Scatter ; "scatter")]
#[test_case(dist(&[4], &[S(0)], &[2]), plain(&[4]) => BoxingKind::Gather ; "gather")]
#[test_case(dist(&[4], &[B], &[2]), plain(&[4]) => BoxingKind::Nop ; "broadcast leaves for free")]
#[test_case(dist(&[4], &[P], &[2]), dist(&[4], &[B], &[2]) => BoxingKind::AllReduce ; "all reduce")]
#[test_case(dist(&[4], &[P], &[2]), dist(&[4], &[S(0)], &[2]) => BoxingKind::ReduceScatter ; "reduce scatter")]
#[test_case(dist(&[4], &[S(0)], &[2]), dist(&[4], &[B], &[2]) => BoxingKind::AllGather ; "all gather")]
#[test_case(dist(&[4], &[B], &[2]), dist(&[4], &[S(0)], &[2]) => BoxingKind::Slice ; "slice")]
#[test_case(dist(&[4, 4], &[S(0)], &[2]), dist(&[4, 4], &[S(1)], &[2]) => BoxingKind::AllToAll ; "all to all")]
#[test_case(dist(&[4, 4], &[P, S(0)], &[2, 2]), dist(&[4, 4], &[B, B], &[2, 2]) => BoxingKind::Mixed ; "mixed axes")]
#[test_case(dist(&[4, 4], &[P, B], &[2, 2]), dist(&[4, 4], &[B, B], &[2, 2]) => BoxingKind::AllReduce ; "untouched axis")]
fn test_classify(source: IrType, target: IrType) -> BoxingKind {
    BoxingKind::classify(&source, &target)
}

#[test]
fn test_boxing_cost_scales_bytes() {
    let partial = dist(&[8], &[P], &[2]);
    let broadcast = dist(&[8], &[B], &[2]);
    assert_eq!(boxing_cost(&partial, &broadcast), 32 * 2);
    assert_eq!(boxing_cost(&broadcast, &dist(&[8], &[S(0)], &[2])), 0);
    assert_eq!(boxing_cost(&plain(&[8]), &broadcast), 32);
}

#[test]
fn test_compute_cost_uses_local_shapes() {
    let lhs = dist(&[4, 64], &[S(1)], &[2]);
    let rhs = dist(&[64, 4], &[S(0)], &[2]);
    let out = dist(&[4, 4], &[P], &[2]);
    assert_eq!(compute_cost(&Op::MatMul, &out, &[&lhs, &rhs]), 16 * 32);

    let split = dist(&[8, 8], &[S(0)], &[2]);
    assert_eq!(compute_cost(&Op::Unary(strata_ir::UnaryOp::Exp), &split, &[&split]), 32);
}

#[test]
fn test_local_shape() {
    assert_eq!(local_shape(&dist(&[8, 6], &[S(0), S(1)], &[2, 3])).unwrap().as_slice(), &[4, 2]);
    assert!(local_shape(&dist(&[3], &[S(0)], &[2])).is_none());
    assert_eq!(local_shape(&plain(&[5])).unwrap().as_slice(), &[5]);
}
