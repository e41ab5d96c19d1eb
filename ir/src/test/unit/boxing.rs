use test_case::test_case;

use super::{dist, f32_tensor};
use crate::infer::boxing::is_local_transition;
use crate::{Graph, IrType, Op, Sbp, is_legal_boxing};

use Sbp::{Broadcast as B, PartialSum as P, Split as S};

fn plain(shape: &[usize]) -> IrType {
    f32_tensor(shape).into()
}

#[test_case(plain(&[4]), plain(&[4]) => true ; "identical plain")]
#[test_case(plain(&[4]), plain(&[2, 2]) => false ; "plain reshape")]
#[test_case(plain(&[4]), dist(&[4], &[S(0)], &[2]) => true ; "scatter")]
#[test_case(plain(&[4]), dist(&[4], &[P], &[2]) => false ; "plain to partial")]
#[test_case(plain(&[3]), dist(&[3], &[S(0)], &[2]) => false ; "scatter not divisible")]
#[test_case(plain(&[4]), dist(&[8], &[B], &[2]) => false ; "scatter changes tensor")]
#[test_case(dist(&[4], &[S(0)], &[2]), plain(&[4]) => true ; "gather")]
#[test_case(dist(&[4], &[P], &[2]), plain(&[4]) => false ; "partial leaves placement")]
#[test_case(dist(&[4], &[P], &[2]), dist(&[4], &[B], &[2]) => true ; "all reduce")]
#[test_case(dist(&[4], &[P], &[2]), dist(&[4], &[S(0)], &[2]) => true ; "reduce scatter")]
#[test_case(dist(&[4], &[S(0)], &[2]), dist(&[4], &[B], &[2]) => true ; "all gather")]
#[test_case(dist(&[4], &[B], &[2]), dist(&[4], &[P], &[2]) => false ; "broadcast to partial")]
#[test_case(dist(&[4], &[B], &[2]), dist(&[4], &[B], &[4]) => false ; "placement change")]
#[test_case(dist(&[4], &[B], &[2]), dist(&[4], &[B, B], &[2, 2]) => false ; "hierarchy rank change")]
#[test_case(dist(&[4, 4], &[S(0), B], &[2, 2]), dist(&[4, 4], &[B, S(1)], &[2, 2]) => true ; "two axis transfer")]
fn test_boxing_legality(source: IrType, target: IrType) -> bool {
    is_legal_boxing(&source, &target)
}

#[test]
fn test_boxing_call_types() {
    let mut g = Graph::new();
    let x = g.var("x", f32_tensor(&[4]));
    let target = dist(&[4], &[S(0)], &[2]);
    let boxed = g.call(Op::Boxing { target: target.clone() }, [x]);
    assert_eq!(g.ty(boxed), &target);

    let illegal = g.call(Op::Boxing { target: dist(&[4], &[P], &[2]) }, [x]);
    assert!(g.ty(illegal).is_invalid());
}

#[test_case(B, S(0) => true ; "broadcast to split")]
#[test_case(S(1), S(1) => true ; "unchanged")]
#[test_case(S(0), B => false ; "all gather")]
#[test_case(P, B => false ; "all reduce")]
#[test_case(S(0), S(1) => false ; "all to all")]
fn test_local_transition(from: Sbp, to: Sbp) -> bool {
    is_local_transition(from, to)
}
