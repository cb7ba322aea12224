//! Facade smoke test: the prelude is enough for a full workflow

use htucker::prelude::*;
use scirs2_core::ndarray_ext::Array1;

#[test]
fn test_prelude_workflow() {
    let a = DenseND::<f64>::from_shape_fn(&[3, 4, 5, 2], |ix| {
        1.0 / (1.0 + ix.iter().map(|&i| i as f64).sum::<f64>())
    });
    let (x, report) = HTucker::truncate(&a, &TruncationConfig::new(6).rel_err(1e-10), None).unwrap();
    assert_eq!(report.node(0), None);

    // weight mode 3, then sum out the first two modes against a tensor of ones
    let w = Array1::from(vec![0.5, 2.0]);
    let weighted = x.ews_mode_multiplication(&w.view(), 3).unwrap();
    let ones = DenseND::<f64>::ones(&[3, 4]);
    let (o, _) = HTucker::truncate(&ones, &TruncationConfig::new(1), None).unwrap();
    let z = contract(&weighted, &o, &[0, 1], &[0, 1]).unwrap().into_tensor().unwrap();
    assert_eq!(z.shape(), &[5, 2]);

    let reference = x.full().unwrap();
    let full = z.full().unwrap();
    for k in 0..5 {
        for l in 0..2 {
            let mut expected = 0.0;
            for i in 0..3 {
                for j in 0..4 {
                    expected += reference[&[i, j, k, l][..]];
                }
            }
            expected *= w[l];
            assert!((full[&[k, l][..]] - expected).abs() < 1e-8);
        }
    }

    let bytes = z.to_bytes().unwrap();
    let back = HTucker::from_bytes(&bytes).unwrap();
    assert_eq!(back.shape(), z.shape());
    assert!(matches!(
        back.get(&[ModeIndex::At(4), ModeIndex::At(1)]).unwrap(),
        HtValue::Scalar(_)
    ));
}

#[test]
fn test_tree_side_and_errors_reachable() {
    let tree = DimTree::canonical(4).unwrap();
    let a = DenseND::<f64>::from_shape_fn(&[2, 2, 3, 3], |ix| (ix[0] + 2 * ix[2]) as f64);
    let (x, _) = HTucker::truncate(&a, &TruncationConfig::new(4), Some(tree)).unwrap();
    let y = x.change_root(3, Side::Right).unwrap();
    assert!((y.norm().unwrap() - a.frobenius_norm()).abs() < 1e-9);
    assert!(matches!(
        x.change_root(99, Side::Left),
        Err(HtError::Tree(_) | HtError::InvalidArgument(_))
    ));
}
