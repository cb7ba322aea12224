//! Property-based tests for the HT format
//!
//! Tensors are generated from a shape and a phase, so every case is
//! reproducible from its shrunk inputs.

#[cfg(test)]
mod tests {
    use crate::{add_and_truncate, trunc_rank, HTucker, TruncationConfig};
    use htucker_core::DenseND;
    use proptest::prelude::*;

    // Compression runs several SVDs per case; keep the case count small
    fn proptest_config() -> ProptestConfig {
        ProptestConfig {
            cases: 5,
            max_local_rejects: 1000,
            max_global_rejects: 10000,
            ..ProptestConfig::default()
        }
    }

    fn wave(shape: &[usize], phase: f64) -> DenseND<f64> {
        DenseND::from_shape_fn(shape, |ix| {
            let s: f64 = ix
                .iter()
                .enumerate()
                .map(|(k, &i)| (0.4 + 0.3 * k as f64) * i as f64)
                .sum();
            (s + phase).sin() + 0.25 * (2.0 * s - phase).cos()
        })
    }

    fn exact(a: &DenseND<f64>) -> HTucker {
        HTucker::truncate(a, &TruncationConfig::default(), None)
            .expect("lossless compression should succeed")
            .0
    }

    fn shape_strategy() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(2usize..5, 3..5)
    }

    // Property: compression without a target is lossless
    proptest! {
        #![proptest_config(proptest_config())]
        #[test]
        fn lossless_truncation_reconstructs(shape in shape_strategy(), phase in 0.0f64..3.0) {
            let a = wave(&shape, phase);
            let x = exact(&a);
            let err = (&x.full().unwrap() - &a).frobenius_norm();
            prop_assert!(err <= 1e-10 * a.frobenius_norm().max(1.0), "error {}", err);
            prop_assert!(x.is_orthog());
        }
    }

    // Property: orthogonalization keeps the tensor and is idempotent
    proptest! {
        #![proptest_config(proptest_config())]
        #[test]
        fn orthogonalize_is_idempotent(shape in shape_strategy(), phase in 0.0f64..3.0) {
            let a = wave(&shape, phase);
            let x = exact(&a).add(&exact(&wave(&shape, phase + 1.0))).unwrap();
            prop_assert!(!x.is_orthog());

            let once = x.orthogonalize().unwrap();
            let twice = once.orthogonalize().unwrap();
            prop_assert!(once.is_orthogonal_within(1e-9));
            let dx = (&once.full().unwrap() - &x.full().unwrap()).frobenius_norm();
            let dd = (&twice.full().unwrap() - &once.full().unwrap()).frobenius_norm();
            prop_assert!(dx <= 1e-9 * x.norm().unwrap().max(1.0));
            prop_assert!(dd <= 1e-12 * once.norm().unwrap().max(1.0));
        }
    }

    // Property: inner product and norm agree with the dense values
    proptest! {
        #![proptest_config(proptest_config())]
        #[test]
        fn inner_product_matches_dense(shape in shape_strategy(), p in 0.0f64..3.0, q in 0.0f64..3.0) {
            let (a, b) = (wave(&shape, p), wave(&shape, q));
            let (x, y) = (exact(&a), exact(&b));
            let dense: f64 = a.as_array().iter().zip(b.as_array().iter()).map(|(u, v)| u * v).sum();
            let ht = x.inner_product(&y).unwrap();
            prop_assert!((ht - dense).abs() <= 1e-9 * a.frobenius_norm() * b.frobenius_norm());
            let norm = x.norm().unwrap();
            prop_assert!((norm - a.frobenius_norm()).abs() <= 1e-9 * a.frobenius_norm().max(1.0));
        }
    }

    // Property: ⟨αx + βy, z⟩ = α⟨x, z⟩ + β⟨y, z⟩
    proptest! {
        #![proptest_config(proptest_config())]
        #[test]
        fn inner_product_is_bilinear(
            shape in shape_strategy(),
            alpha in -2.0f64..2.0,
            beta in -2.0f64..2.0,
        ) {
            let x = exact(&wave(&shape, 0.2));
            let y = exact(&wave(&shape, 1.1));
            let z = exact(&wave(&shape, 2.3));
            let combo = x.scalar_mul(alpha).unwrap().add(&y.scalar_mul(beta).unwrap()).unwrap();
            let lhs = combo.inner_product(&z).unwrap();
            let rhs = alpha * x.inner_product(&z).unwrap() + beta * y.inner_product(&z).unwrap();
            let scale = (x.norm().unwrap() + y.norm().unwrap()) * z.norm().unwrap();
            prop_assert!((lhs - rhs).abs() <= 1e-9 * scale.max(1.0));
        }
    }

    // Property: truncated sums stay within the reported error
    proptest! {
        #![proptest_config(proptest_config())]
        #[test]
        fn add_and_truncate_within_reported_error(shape in shape_strategy(), max_rank in 1usize..4) {
            let x = exact(&wave(&shape, 0.5));
            let y = exact(&wave(&shape, 1.7));
            let (z, report) = add_and_truncate(&[&x, &y], &TruncationConfig::new(max_rank)).unwrap();
            let expected = x.add(&y).unwrap().full().unwrap();
            let err = (&z.full().unwrap() - &expected).frobenius_norm();
            prop_assert!(err <= report.total_error() * (1.0 + 1e-8) + 1e-10);
            prop_assert!(z.ranks().iter().skip(1).all(|&r| r <= max_rank));
        }
    }

    // Property: the chosen rank respects the ceiling and the reported error is the tail
    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]
        #[test]
        fn trunc_rank_invariants(
            mut s in prop::collection::vec(0.0f64..10.0, 1..12),
            max_rank in 1usize..12,
            abs_err in prop::option::of(1e-3f64..5.0),
        ) {
            s.sort_by(|a, b| b.total_cmp(a));
            let choice = trunc_rank(&s, max_rank, abs_err, None).unwrap();
            prop_assert!(choice.rank >= 1);
            prop_assert!(choice.rank <= max_rank.min(s.len()));

            let tail = s[choice.rank..].iter().map(|v| v * v).sum::<f64>().sqrt();
            prop_assert!((choice.error - tail).abs() <= 1e-12 * (1.0 + tail));

            match abs_err {
                Some(target) if choice.satisfied => prop_assert!(choice.error < target),
                Some(_) => prop_assert_eq!(choice.rank, max_rank.min(s.len())),
                None => prop_assert_eq!(choice.rank, max_rank.min(s.len())),
            }
        }
    }
}
