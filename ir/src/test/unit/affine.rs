use test_case::test_case;

use crate::affine::{AffineDim, AffineExpr, AffineMap, AffineRange, AffineRelation, AffineSymbol};
use crate::error::Error;

fn tile_map(size: i64) -> AffineMap {
    AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].dim * size, d[0].extent * size)]).unwrap()
}

#[test]
fn test_simplify_merges_constants() {
    let nested = (AffineExpr::dim(0) + 2) + 3;
    assert_eq!(nested.simplify(), AffineExpr::dim(0) + 5);

    let scaled = (AffineExpr::dim(0) * 2) * 3;
    assert_eq!(scaled.simplify(), AffineExpr::dim(0) * 6);

    assert_eq!((AffineExpr::constant(2) + AffineExpr::dim(0)).simplify(), AffineExpr::dim(0) + 2);
    assert_eq!((AffineExpr::dim(0) * 0).simplify(), AffineExpr::constant(0));
    assert_eq!(AffineExpr::dim(0).modulo(1).simplify(), AffineExpr::constant(0));
    assert_eq!((AffineDim(0) - 3).simplify().to_string(), "(d0 - 3)");
}

#[test_case(AffineExpr::dim(0).floor_div(2), -7 => -4 ; "floordiv rounds down")]
#[test_case(AffineExpr::dim(0).ceil_div(2), 7 => 4 ; "ceildiv rounds up")]
#[test_case(AffineExpr::dim(0).modulo(3), -7 => 2 ; "mod is non negative")]
#[test_case(AffineExpr::dim(0) * 3 + 1, 2 => 7 ; "linear")]
fn test_evaluate(expr: AffineExpr, d0: i64) -> i64 {
    expr.evaluate(&[d0], &[], &[]).unwrap()
}

#[test]
fn test_evaluate_errors() {
    let by_symbol = AffineExpr::dim(0).floor_div(AffineSymbol(0));
    assert!(matches!(by_symbol.evaluate(&[4], &[], &[0]), Err(Error::AffineDivisionByZero { .. })));
    assert!(matches!(
        AffineExpr::dim(1).evaluate(&[1], &[], &[]),
        Err(Error::AffineUnbound { kind: "dim", position: 1 })
    ));
}

#[test]
fn test_multiplication_by_domain_is_rejected() {
    let err = AffineExpr::dim(0).try_mul(AffineExpr::dim(1)).unwrap_err();
    assert!(matches!(err, Error::AffineNonConstantCoefficient { .. }));
    assert!(AffineExpr::dim(0).try_mul(AffineExpr::symbol(0) * 2).is_ok());
}

#[test]
fn test_map_rejects_undeclared_positions() {
    let err = AffineMap::new(1, 0, vec![AffineRange::new(AffineExpr::dim(1), 1)]).unwrap_err();
    assert_eq!(err, Error::AffinePositionOutOfRange { kind: "dim", position: 1, declared: 1 });

    let err = AffineMap::new(1, 0, vec![AffineRange::new(AffineExpr::symbol(0), 1)]).unwrap_err();
    assert!(matches!(err, Error::AffinePositionOutOfRange { kind: "symbol", .. }));
}

#[test]
fn test_compose_applies_left_then_right() {
    let tile = tile_map(4);
    let shift = AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].dim + 1, d[0].extent)]).unwrap();
    let composed = (&tile * &shift).unwrap();

    let window = [2..3];
    let stepwise = shift.apply(&tile.apply(&window, &[]).unwrap(), &[]).unwrap();
    assert_eq!(composed.apply(&window, &[]).unwrap(), stepwise);
    assert_eq!(stepwise, vec![9..13]);
}

#[test]
fn test_compose_appends_rhs_symbols() {
    let lhs = AffineMap::from_callable(1, 1, |d, s| vec![AffineRange::new(d[0].dim * s[0], d[0].extent * s[0])])
        .unwrap();
    let rhs = AffineMap::from_callable(1, 1, |d, s| vec![AffineRange::new(d[0].dim + s[0], d[0].extent)]).unwrap();
    let composed = lhs.compose(&rhs).unwrap();

    assert_eq!(composed.symbols(), 2);
    assert_eq!(composed.apply(&[1..2], &[3, 5]).unwrap(), vec![8..11]);
}

#[test]
fn test_compose_identity_is_neutral() {
    let tile = tile_map(4);
    assert_eq!((&tile * &AffineMap::identity(1)).unwrap(), tile);
    assert_eq!((&AffineMap::identity(1) * &tile).unwrap(), tile);

    let err = (&AffineMap::identity(2) * &AffineMap::identity(1)).unwrap_err();
    assert_eq!(err, Error::AffineCompositionMismatch { lhs_results: 2, rhs_domains: 1 });
}

#[test]
fn test_compose_is_associative() {
    let tile = tile_map(4);
    let shift = AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].dim + 3, d[0].extent)]).unwrap();
    let halve = AffineMap::from_callable(1, 0, |d, _| {
        vec![AffineRange::new(d[0].offset().floor_div(2), d[0].extent().ceil_div(2))]
    })
    .unwrap();

    let left = (&(&tile * &shift).unwrap() * &halve).unwrap();
    let right = (&tile * &(&shift * &halve).unwrap()).unwrap();
    for window in [0..1, 2..5, 7..8] {
        assert_eq!(left.apply(&[window.clone()], &[]).unwrap(), right.apply(&[window], &[]).unwrap());
    }
}

#[test]
fn test_double_inverse_restores_offset_map() {
    let map = AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].dim * 4 + 2, d[0].extent * 4)]).unwrap();
    let inverse = map.inverse(&[AffineExpr::constant(16)]).unwrap();
    let twice = inverse.inverse(&[AffineExpr::constant(64)]).unwrap();

    assert_eq!(twice.results()[0].to_string(), "((d0 * 4 + 2), e0 * 4)");
    assert_eq!(twice.apply(&[3..5], &[]).unwrap(), map.apply(&[3..5], &[]).unwrap());
}

#[test]
fn test_inverse_of_tile_round_trips() {
    let tile = tile_map(4);
    let inverse = tile.inverse(&[AffineExpr::constant(10)]).unwrap();
    assert_eq!(inverse.apply(&[8..16], &[]).unwrap(), vec![2..4]);
    assert_eq!(tile.apply(&[2..4], &[]).unwrap(), vec![8..16]);
}

#[test]
fn test_inverse_of_shift_translates() {
    let shift = AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].dim + 2, d[0].extent)]).unwrap();
    let inverse = shift.inverse(&[AffineExpr::constant(16)]).unwrap();
    assert_eq!(inverse.apply(&[5..8], &[]).unwrap(), vec![3..6]);
}

#[test]
fn test_inverse_gives_full_bound_to_unused_domains() {
    let second = AffineMap::from_callable(2, 0, |d, _| vec![AffineRange::new(d[1].dim, d[1].extent)]).unwrap();
    let inverse = second.inverse(&[AffineExpr::constant(7), AffineExpr::constant(9)]).unwrap();
    assert_eq!(inverse.domains(), 1);
    assert_eq!(inverse.apply(&[2..5], &[]).unwrap(), vec![0..7, 2..5]);
}

#[test]
fn test_inverse_rejects_non_invertible_maps() {
    let modulo = AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].offset().modulo(4), 1)]).unwrap();
    assert!(matches!(modulo.inverse(&[AffineExpr::constant(8)]), Err(Error::AffineNotInvertible { .. })));

    let mixed =
        AffineMap::from_callable(2, 0, |d, _| vec![AffineRange::new(d[0].dim + d[1].dim, d[0].extent)]).unwrap();
    assert!(matches!(
        mixed.inverse(&[AffineExpr::constant(4), AffineExpr::constant(4)]),
        Err(Error::AffineNotInvertible { .. })
    ));
}

#[test]
fn test_map_display() {
    assert_eq!(tile_map(4).to_string(), "(d0:e0) -> ((d0 * 4, e0 * 4))");
}

#[test]
fn test_relation_inverse_and_compose() {
    let rel = AffineRelation::from_callable(2, 0, |d, _| vec![d[1] + 1, d[0].into()]).unwrap();
    assert_eq!(rel.apply(&[4, 7], &[]).unwrap(), vec![8, 4]);

    let inverse = rel.inverse().unwrap();
    assert_eq!(inverse.apply(&[8, 4], &[]).unwrap(), vec![4, 7]);
    assert_eq!(rel.compose(&inverse).unwrap(), AffineRelation::identity(2));
}

#[test]
fn test_relation_rejects_extents_and_shared_dims() {
    assert!(AffineRelation::new(1, 0, vec![AffineExpr::extent(0)]).is_err());

    let shared = AffineRelation::new(1, 0, vec![AffineExpr::dim(0), AffineExpr::dim(0) + 1]).unwrap();
    assert!(matches!(shared.inverse(), Err(Error::AffineNotInvertible { .. })));
}
