use super::f32_tensor;
use crate::affine::{AffineMap, AffineRange};
use crate::error::Error;
use crate::tir::{Access, Buffer, Grid, LoopMode};

fn elementwise(shape: &[usize]) -> Grid {
    let rank = shape.len();
    let buffer = |name: &str| Buffer::new(name, f32_tensor(shape));
    Grid::new(
        "add",
        shape.to_vec(),
        vec![
            Access::read(buffer("a"), AffineMap::identity(rank)),
            Access::read(buffer("b"), AffineMap::identity(rank)),
            Access::write(buffer("out"), AffineMap::identity(rank)),
        ],
    )
    .unwrap()
}

fn matmul(m: usize, n: usize, k: usize) -> Grid {
    let pick = |axes: [usize; 2]| {
        AffineMap::from_callable(3, 0, |d, _| axes.iter().map(|&a| AffineRange::new(d[a].dim, d[a].extent)).collect())
            .unwrap()
    };
    Grid::new(
        "matmul",
        vec![m, n, k],
        vec![
            Access::read(Buffer::new("lhs", f32_tensor(&[m, k])), pick([0, 2])),
            Access::read(Buffer::new("rhs", f32_tensor(&[k, n])), pick([2, 1])),
            Access::write(Buffer::new("out", f32_tensor(&[m, n])), pick([0, 1])),
        ],
    )
    .unwrap()
}

#[test]
fn test_grid_checks_access_ranks() {
    let err = Grid::new("bad", vec![4, 4], vec![Access::read(Buffer::new("a", f32_tensor(&[4, 4])), AffineMap::identity(1))])
        .unwrap_err();
    assert!(matches!(err, Error::GridAccessRank { what: "domains", expected: 2, actual: 1, .. }));

    let err = Grid::new("bad", vec![4], vec![Access::read(Buffer::new("a", f32_tensor(&[4, 4])), AffineMap::identity(1))])
        .unwrap_err();
    assert!(matches!(err, Error::GridAccessRank { what: "results", expected: 2, actual: 1, .. }));
}

#[test]
fn test_buffer_window_is_clamped() {
    let shift = AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].dim + 2, d[0].extent)]).unwrap();
    let grid = Grid::new("shift", vec![8], vec![Access::read(Buffer::new("a", f32_tensor(&[8])), shift)]).unwrap();

    assert_eq!(grid.buffer_window(0, &[4..8]).unwrap(), vec![6..8]);
    assert!(grid.buffer_window(1, &[0..1]).is_err());
}

#[test]
fn test_iteration_window_inverts_access() {
    let strided = AffineMap::from_callable(1, 0, |d, _| vec![AffineRange::new(d[0].dim * 2, d[0].extent * 2)]).unwrap();
    let grid = Grid::new("strided", vec![8], vec![Access::read(Buffer::new("a", f32_tensor(&[16])), strided)]).unwrap();
    assert_eq!(grid.iteration_window(0, &[4..8]).unwrap(), vec![2..4]);

    let mm = matmul(4, 4, 8);
    assert_eq!(mm.iteration_window(2, &[0..2, 0..4]).unwrap(), vec![0..2, 0..4, 0..8]);
    assert_eq!(mm.buffer_window(0, &mm.full_region()).unwrap(), vec![0..4, 0..8]);
}

#[test]
fn test_tile_builds_loop_nest() {
    let grid = elementwise(&[8, 8]);
    let nest = grid.tile(&[vec![4, 4], vec![2, 2]]).unwrap();

    let loops = nest.loops();
    assert_eq!(loops.len(), 4);
    assert_eq!(loops.iter().map(|l| l.domain).collect::<Vec<_>>(), vec![0, 1, 2, 3]);
    assert_eq!(loops.iter().map(|l| l.extent).collect::<Vec<_>>(), vec![2, 2, 2, 2]);
    assert_eq!(loops[0].mode, LoopMode::Parallel);
    assert_eq!(loops[3].mode, LoopMode::Serial);

    let body = nest.body();
    assert_eq!(body.tile, vec![2, 2]);
    assert_eq!(body.accesses.len(), 3);
    assert_eq!(body.buffer_window(2, &[1, 0, 1, 1]).unwrap(), vec![6..8, 2..4]);
    assert!(nest.to_string().contains("parallel for d0 in 0..2:"), "{nest}");
}

#[test]
fn test_tiles_cover_every_iteration_once() {
    let grid = elementwise(&[4, 6]);
    let nest = grid.tile(&[vec![2, 3]]).unwrap();
    let extents: Vec<i64> = nest.loops().iter().map(|l| l.extent as i64).collect();
    assert_eq!(extents, vec![2, 2]);

    let mut covered = vec![vec![0u8; 6]; 4];
    for i in 0..extents[0] {
        for j in 0..extents[1] {
            let window = nest.body().buffer_window(0, &[i, j]).unwrap();
            for r in window[0].clone() {
                for c in window[1].clone() {
                    covered[r as usize][c as usize] += 1;
                }
            }
        }
    }
    assert!(covered.iter().flatten().all(|&count| count == 1));
}

#[test]
fn test_tile_rejects_non_dividing_levels() {
    let grid = elementwise(&[8, 8]);
    assert!(matches!(grid.tile(&[]), Err(Error::InvalidTiling { .. })));
    assert!(matches!(grid.tile(&[vec![3, 4]]), Err(Error::InvalidTiling { .. })));
    assert!(matches!(grid.tile(&[vec![4, 4], vec![8, 2]]), Err(Error::InvalidTiling { .. })));
    assert!(matches!(grid.tile(&[vec![4]]), Err(Error::InvalidTiling { .. })));
}
