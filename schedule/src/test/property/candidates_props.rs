use proptest::prelude::*;
use strata_ir::test::property::generators::{arb_placement, arb_tensor_type};
use strata_ir::{DistributedType, Graph, NameAlloc, Op, Sbp, UnaryOp};

use crate::distributed::{AutoDistributed, diagonal_indices, leaf_candidates, partial_resolutions};
use crate::DistributeConfig;

proptest! {
    #[test]
    fn every_bucket_member_is_divisible(tensor in arb_tensor_type(), placement in arb_placement()) {
        let mut g = Graph::new();
        let x = g.var("x", tensor.clone());
        let body = g.call(Op::Unary(UnaryOp::Exp), [x]);
        let config = DistributeConfig::builder().placement(placement).build();
        let mut names = NameAlloc::new();
        let mut rewriter = AutoDistributed::new(&mut g, &config, &mut names);
        rewriter.visit(body).unwrap();

        for original in [x, body] {
            for (ty, members) in rewriter.bucket(original).unwrap() {
                prop_assert!(!members.is_empty());
                prop_assert_eq!(ty.logical_tensor(), Some(&tensor));
                if let Some(d) = ty.as_distributed() {
                    prop_assert!(d.is_divisible(), "{}", ty);
                }
            }
        }
    }

    #[test]
    fn partial_resolutions_drop_every_partial(tensor in arb_tensor_type(), placement in arb_placement()) {
        let partial = DistributedType::new(tensor.clone(), std::iter::repeat_n(Sbp::PartialSum, placement.rank()), placement.clone());
        let resolutions = partial_resolutions(&partial);
        prop_assert!(!resolutions.is_empty());
        for layout in &resolutions {
            prop_assert!(!layout.has_partial());
            prop_assert!(layout.is_divisible());
        }
        prop_assert_eq!(leaf_candidates(&tensor, &placement).len(), resolutions.len());
    }

    #[test]
    fn diagonal_indices_are_distinct_and_ordered(
        lens in prop::collection::vec(1usize..5, 1..4),
        limit in 1usize..64,
    ) {
        let indices = diagonal_indices(&lens, limit);
        let total: usize = lens.iter().product();
        prop_assert_eq!(indices.len(), total.min(limit));
        prop_assert_eq!(indices.first().cloned(), Some(vec![0; lens.len()]));

        let mut seen = std::collections::HashSet::new();
        let mut last_sum = 0;
        for tuple in &indices {
            prop_assert!(tuple.iter().zip(&lens).all(|(&i, &len)| i < len));
            prop_assert!(seen.insert(tuple.clone()));
            let sum: usize = tuple.iter().sum();
            prop_assert!(sum >= last_sum);
            last_sum = sum;
        }
    }
}
