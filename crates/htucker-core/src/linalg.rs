//! Linear algebra helpers built on scirs2-linalg
//!
//! Thin QR and SVD wrappers plus the two "left factor only" SVD paths used by
//! rank truncation:
//!
//! - [`left_svd_via_qr`]: the matrix itself is available. QR first, then an SVD
//!   of the small triangular factor, branching on the aspect ratio.
//! - [`left_svd_via_gram`]: only the Gram matrix `G = M Mᵀ` is available.
//!   Eigendecomposition of `G` yields the left singular vectors of `M` and the
//!   squared singular values.
//!
//! Singular values are always returned in descending order.

use anyhow::{bail, Result};
use scirs2_core::ndarray_ext::{s, Array1, Array2, ArrayView2, Axis};

/// Relative size below which a column counts as dependent on its predecessors
const DEPENDENCE_TOL: f64 = 1e-8;

/// Thin QR decomposition `A = Q R` with `Q: m × k`, `R: k × n`, `k = min(m, n)`
///
/// `Q` has orthonormal columns for every input, rank-deficient or not. For a
/// wide matrix the leading `m × m` block is factored and the trailing columns
/// are carried along as `Qᵀ A`, so `R` is upper trapezoidal.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use htucker_core::thin_qr;
///
/// let a = array![[1.0, 2.0, 3.0], [4.0, 5.0, 7.0]];
/// let (q, r) = thin_qr(&a.view()).unwrap();
/// assert_eq!((q.dim(), r.dim()), ((2, 2), (2, 3)));
/// assert!((&q.dot(&r) - &a).iter().all(|v| v.abs() < 1e-12));
/// ```
pub fn thin_qr(a: &ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        bail!("QR decomposition of an empty {}x{} matrix", m, n);
    }

    if m >= n {
        let (q, r) = householder_qr(a)?;
        Ok((q.slice(s![.., ..n]).to_owned(), r.slice(s![..n, ..]).to_owned()))
    } else {
        let (q, _) = householder_qr(&a.slice(s![.., ..m]))?;
        let r = q.t().dot(a);
        Ok((q, r))
    }
}

/// Full Householder QR of a matrix with `rows >= cols`
fn householder_qr(a: &ArrayView2<f64>) -> Result<(Array2<f64>, Array2<f64>)> {
    scirs2_linalg::qr(a, None).map_err(|e| anyhow::anyhow!("QR decomposition failed: {}", e))
}

/// Thin SVD `A = U diag(s) Vᵀ` with `k = min(m, n)` singular triplets
///
/// Uses the one-sided Jacobi SVD of scirs2-linalg's OxiBLAS backend, which
/// keeps small singular values accurate relative to their size. `U` always
/// has orthonormal columns: directions of zero singular values are completed
/// to an orthonormal basis.
pub fn thin_svd(a: &ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>, Array2<f64>)> {
    let (m, n) = a.dim();
    if m == 0 || n == 0 {
        bail!("SVD of an empty {}x{} matrix", m, n);
    }

    let (u, sv, vt) = scirs2_linalg::svd_f64_lapack(a, false)
        .map_err(|e| anyhow::anyhow!("SVD failed: {}", e))?;

    let k = sv.len().min(m).min(n);
    if u.ncols() < k || vt.nrows() < k {
        bail!(
            "SVD of a {}x{} matrix returned factors of shape {:?} and {:?}",
            m,
            n,
            u.shape(),
            vt.shape()
        );
    }
    Ok((
        orthonormal_columns(&u.slice(s![.., ..k]))?,
        sv.slice(s![..k]).to_owned(),
        vt.slice(s![..k, ..]).to_owned(),
    ))
}

/// Left singular vectors and singular values of `x`
///
/// Returns `u: m × min(m, n)` with orthonormal columns and the singular values
/// in descending order. Rank-deficient input still yields orthonormal `u`.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use htucker_core::left_svd_via_qr;
///
/// let x = array![[3.0, 0.0], [0.0, 4.0], [0.0, 0.0]];
/// let (u, s) = left_svd_via_qr(&x.view()).unwrap();
/// assert_eq!(u.dim(), (3, 2));
/// assert!((s[0] - 4.0).abs() < 1e-12);
/// assert!((s[1] - 3.0).abs() < 1e-12);
/// ```
pub fn left_svd_via_qr(x: &ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let (m, n) = x.dim();
    if m > n {
        let (q, r) = thin_qr(x)?;
        let (u, sv, _) = thin_svd(&r.view())?;
        Ok((orthonormal_columns(&q.dot(&u).view())?, sv))
    } else {
        // x = Rᵀ Qᵀ, so the left factor of x is the left factor of Rᵀ.
        let (_, r) = thin_qr(&x.t())?;
        let (u, sv, _) = thin_svd(&r.t())?;
        Ok((u, sv))
    }
}

/// Left singular vectors and singular values of an implicit `M` from `G = M Mᵀ`
///
/// `gram` must be square; it is symmetrized before the eigendecomposition.
/// Negative eigenvalues from round-off are clamped to zero. The returned
/// basis is square and orthonormal.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use htucker_core::left_svd_via_gram;
///
/// let m = array![[1.0, 2.0], [0.0, 1.0]];
/// let g = m.dot(&m.t());
/// let (u, s) = left_svd_via_gram(&g.view()).unwrap();
/// assert_eq!(u.dim(), (2, 2));
/// assert!(s[0] >= s[1]);
/// assert!((s[0] * s[0] + s[1] * s[1] - 6.0).abs() < 1e-10);
/// ```
pub fn left_svd_via_gram(gram: &ArrayView2<f64>) -> Result<(Array2<f64>, Array1<f64>)> {
    let (m, n) = gram.dim();
    if m != n {
        bail!("Gram matrix must be square, got {}x{}", m, n);
    }
    if m == 0 {
        bail!("Gram matrix is empty");
    }

    let symmetric = (&gram.view() + &gram.t()) * 0.5;
    let (eigenvalues, eigenvectors) = scirs2_linalg::eigh_f64_lapack(&symmetric.view())
        .map_err(|e| anyhow::anyhow!("Symmetric eigendecomposition failed: {}", e))?;
    if eigenvalues.len() != m || eigenvectors.dim() != (m, m) {
        bail!("Eigendecomposition of a {}x{} Gram matrix is incomplete", m, m);
    }

    let mut order: Vec<usize> = (0..m).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));

    let sv: Array1<f64> = order
        .iter()
        .map(|&i| eigenvalues[i].max(0.0).sqrt())
        .collect();
    let u = orthonormal_columns(&eigenvectors.select(Axis(1), &order).view())?;
    Ok((u, sv))
}

/// Orthonormalize the columns of `u` in order
///
/// Each column is projected out of its predecessors twice (classical
/// Gram-Schmidt with reorthogonalization) and normalized. A column that is
/// numerically dependent on its predecessors, zero columns included, is
/// replaced by the unit vector with the largest component outside their span.
/// Columns that are already orthonormal come back unchanged up to round-off.
///
/// # Examples
///
/// ```
/// use scirs2_core::ndarray_ext::array;
/// use htucker_core::orthonormal_columns;
///
/// let u = array![[1.0, 0.0], [0.0, 0.0], [0.0, 0.0]];
/// let q = orthonormal_columns(&u.view()).unwrap();
/// let gram = q.t().dot(&q);
/// assert!((gram[[1, 1]] - 1.0).abs() < 1e-14 && gram[[0, 1]].abs() < 1e-14);
/// ```
pub fn orthonormal_columns(u: &ArrayView2<f64>) -> Result<Array2<f64>> {
    let (m, k) = u.dim();
    if k > m {
        bail!("Cannot orthonormalize {} columns of length {}", k, m);
    }

    let mut q = Array2::<f64>::zeros((m, k));
    for j in 0..k {
        let column = u.column(j);
        let scale = column.dot(&column).sqrt();
        let mut v = project_out(&q, j, column.to_owned());
        let mut norm = v.dot(&v).sqrt();

        if !(scale.is_finite() && scale > 0.0 && norm > DEPENDENCE_TOL * scale) {
            let basis = q.slice(s![.., ..j]);
            let best = (0..m)
                .min_by(|&a, &b| {
                    let ra = basis.row(a).dot(&basis.row(a));
                    let rb = basis.row(b).dot(&basis.row(b));
                    ra.total_cmp(&rb)
                })
                .unwrap_or(0);
            let mut unit = Array1::<f64>::zeros(m);
            unit[best] = 1.0;
            v = project_out(&q, j, unit);
            norm = v.dot(&v).sqrt();
        }
        if !(norm > 0.0) {
            bail!("Column {} could not be orthonormalized", j);
        }
        q.column_mut(j).assign(&(v / norm));
    }
    Ok(q)
}

/// `v` minus its projection onto the first `j` columns of `q`, applied twice
fn project_out(q: &Array2<f64>, j: usize, mut v: Array1<f64>) -> Array1<f64> {
    let basis = q.slice(s![.., ..j]);
    for _ in 0..2 {
        let coeffs = basis.t().dot(&v);
        v -= &basis.dot(&coeffs);
    }
    v
}
