//! Property-based tests for dimension trees and dense primitives

#[cfg(test)]
mod tests {
    use crate::{mode_multiply, DenseND, DimTree};
    use proptest::prelude::*;
    use scirs2_core::ndarray_ext::Array2;

    fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(1usize..5, 2..=4)
    }

    fn tensor_of(shape: &[usize], seed: u64) -> DenseND<f64> {
        DenseND::from_shape_fn(shape, |ix| {
            let s: usize = ix.iter().enumerate().map(|(k, &i)| (k + 1) * i).sum();
            ((s as u64 * 31 + seed) % 17) as f64 - 8.0
        })
    }

    proptest! {
        #[test]
        fn prop_canonical_tree_is_consistent(d in 2usize..12) {
            let tree = DimTree::canonical(d).unwrap();
            prop_assert_eq!(tree.nr_nodes(), 2 * d - 1);
            prop_assert_eq!(tree.dims(0), (0..d).collect::<Vec<_>>());

            for t in 0..tree.nr_nodes() {
                // every node is the unique owner of its mode set
                prop_assert_eq!(tree.node_of_dims(&tree.dims(t)).unwrap(), t);
                prop_assert_eq!(tree.covering_subtrees(&tree.dims(t)), vec![t]);
                if let Some((l, r)) = tree.children(t) {
                    let mut joined = tree.ordered_dims(l);
                    joined.extend(tree.ordered_dims(r));
                    prop_assert_eq!(joined, tree.ordered_dims(t));
                }
            }

            // leaves sit on the two deepest levels
            for leaf in tree.leaves() {
                prop_assert!(tree.level(leaf) + 1 >= tree.depth());
            }
        }

        #[test]
        fn prop_post_order_visits_children_first(d in 2usize..12) {
            let tree = DimTree::canonical(d).unwrap();
            let order = tree.post_order();
            prop_assert_eq!(order.len(), tree.nr_nodes());
            let position = |t: usize| order.iter().position(|&s| s == t).unwrap();
            for t in tree.inner_nodes() {
                let (l, r) = tree.children(t).unwrap();
                prop_assert!(position(l) < position(t));
                prop_assert!(position(r) < position(t));
            }
        }

        #[test]
        fn prop_matricize_roundtrip(
            shape in shape_strategy(),
            pick in prop::collection::vec(any::<bool>(), 4),
            seed in 0u64..100,
        ) {
            let tensor = tensor_of(&shape, seed);
            let mut modes: Vec<usize> = (0..shape.len()).filter(|&k| pick[k]).collect();
            modes.reverse();

            let matrix = tensor.matricize(&modes).unwrap();
            let rows: usize = modes.iter().map(|&m| shape[m]).product();
            prop_assert_eq!(matrix.nrows(), rows);
            prop_assert_eq!(matrix.len(), tensor.len());

            let back = DenseND::dematricize(&matrix, &modes, &shape).unwrap();
            prop_assert!(back == tensor);
        }

        #[test]
        fn prop_identity_mode_product_is_noop(shape in shape_strategy(), seed in 0u64..100) {
            let tensor = tensor_of(&shape, seed);
            for mode in 0..shape.len() {
                let eye = Array2::<f64>::eye(shape[mode]);
                let out = mode_multiply(&tensor.view(), &eye.view(), mode).unwrap();
                prop_assert_eq!(&out, tensor.as_array());
            }
        }
    }
}
