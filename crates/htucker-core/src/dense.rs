//! Dense tensor value type and column-major matricization
//!
//! This module provides [`DenseND<T>`], the explicit (uncompressed) tensor used
//! as input to compression and as the output of reconstruction, together with
//! the reshaping conventions shared by every compressed-format kernel.
//!
//! # Flattening convention
//!
//! Storage is C-contiguous, but every *logical* flattening performed by this
//! crate is column-major: when a group of modes `(m₀, m₁, …)` is merged into a
//! single index, the first mode varies fastest:
//!
//! ```text
//! row(i₀, i₁, …) = i₀ + n₀ · (i₁ + n₁ · (…))
//! ```
//!
//! Hierarchical Tucker node bases rely on this ordering, so [`DenseND::matricize`]
//! and [`DenseND::dematricize`] are the only supported way to move between
//! tensors and their matrix unfoldings.

use scirs2_core::ndarray_ext::{Array, Array2, ArrayView, Dimension, Ix2, IxDyn};
use scirs2_core::numeric::{Float, Num};
use std::fmt;

/// Dense N-dimensional tensor backed by scirs2_core's ndarray
///
/// # Examples
///
/// ```
/// use htucker_core::dense::DenseND;
///
/// let tensor = DenseND::<f64>::zeros(&[2, 3, 4]);
/// assert_eq!(tensor.shape(), &[2, 3, 4]);
/// assert_eq!(tensor.rank(), 3);
/// ```
#[derive(Clone, PartialEq)]
pub struct DenseND<T> {
    pub(crate) data: Array<T, IxDyn>,
}

impl<T> DenseND<T>
where
    T: Clone + Num,
{
    /// Create a tensor from an existing ndarray
    pub fn from_array(array: Array<T, IxDyn>) -> Self {
        Self { data: array }
    }

    /// Create a tensor from a vector with given shape
    ///
    /// # Arguments
    ///
    /// * `vec` - Flattened data in row-major order
    /// * `shape` - Target shape
    ///
    /// # Examples
    ///
    /// ```
    /// use htucker_core::dense::DenseND;
    ///
    /// let data = vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0];
    /// let tensor = DenseND::from_vec(data, &[2, 3]).unwrap();
    /// assert_eq!(tensor[&[1, 0][..]], 4.0);
    /// ```
    pub fn from_vec(vec: Vec<T>, shape: &[usize]) -> anyhow::Result<Self> {
        let total: usize = shape.iter().product();
        if vec.len() != total {
            anyhow::bail!(
                "Shape {:?} requires {} elements, but got {}",
                shape,
                total,
                vec.len()
            );
        }
        let array = Array::from_shape_vec(IxDyn(shape), vec)?;
        Ok(Self { data: array })
    }

    /// Create a tensor by evaluating `f` at every multi-index
    ///
    /// # Examples
    ///
    /// ```
    /// use htucker_core::dense::DenseND;
    ///
    /// let t = DenseND::<f64>::from_shape_fn(&[2, 3], |ix| (ix[0] * 10 + ix[1]) as f64);
    /// assert_eq!(t[&[1, 2][..]], 12.0);
    /// ```
    pub fn from_shape_fn<F>(shape: &[usize], mut f: F) -> Self
    where
        F: FnMut(&[usize]) -> T,
    {
        let data = Array::from_shape_fn(IxDyn(shape), |ix: IxDyn| f(ix.slice()));
        Self { data }
    }

    /// Create a tensor filled with `value`
    pub fn from_elem(shape: &[usize], value: T) -> Self {
        Self {
            data: Array::from_elem(IxDyn(shape), value),
        }
    }

    /// Create a tensor filled with zeros
    pub fn zeros(shape: &[usize]) -> Self {
        Self {
            data: Array::zeros(IxDyn(shape)),
        }
    }

    /// Create a tensor filled with ones
    pub fn ones(shape: &[usize]) -> Self {
        Self {
            data: Array::ones(IxDyn(shape)),
        }
    }

    /// Number of modes (tensor order)
    pub fn rank(&self) -> usize {
        self.data.ndim()
    }

    /// Mode sizes
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Total number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Whether the tensor holds no elements
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Borrow the underlying array
    pub fn as_array(&self) -> &Array<T, IxDyn> {
        &self.data
    }

    /// Consume the tensor and return the underlying array
    pub fn into_array(self) -> Array<T, IxDyn> {
        self.data
    }

    /// Read-only view of the underlying array
    pub fn view(&self) -> ArrayView<'_, T, IxDyn> {
        self.data.view()
    }

    /// Get an element without panicking
    ///
    /// Returns `None` if the index is out of bounds or has the wrong length.
    pub fn get(&self, index: &[usize]) -> Option<&T> {
        if index.len() != self.rank() {
            return None;
        }
        self.data.get(IxDyn(index))
    }

    /// Permute the axes of the tensor
    ///
    /// Axis `i` of the result is axis `axes[i]` of `self`.
    pub fn permute(&self, axes: &[usize]) -> anyhow::Result<Self> {
        check_permutation(axes, self.rank())?;
        let data = self
            .data
            .clone()
            .permuted_axes(IxDyn(axes))
            .as_standard_layout()
            .into_owned();
        Ok(Self { data })
    }

    /// Reshape using column-major element order
    ///
    /// # Examples
    ///
    /// ```
    /// use htucker_core::dense::DenseND;
    ///
    /// let t = DenseND::from_vec(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
    /// let v = t.reshape_col_major(&[6]).unwrap();
    /// // columns of `t` are stacked: (1, 4), (2, 5), (3, 6)
    /// assert_eq!(v.as_array().iter().cloned().collect::<Vec<_>>(), vec![1.0, 4.0, 2.0, 5.0, 3.0, 6.0]);
    /// ```
    pub fn reshape_col_major(&self, new_shape: &[usize]) -> anyhow::Result<Self> {
        Ok(Self {
            data: reshape_col_major(self.data.clone(), new_shape)?,
        })
    }

    /// Matricize the tensor with `modes` as row modes
    ///
    /// Rows enumerate the given modes in the given order (column-major, first
    /// listed mode fastest); columns enumerate the remaining modes in their
    /// original relative order, also column-major.
    ///
    /// # Examples
    ///
    /// ```
    /// use htucker_core::dense::DenseND;
    ///
    /// let t = DenseND::<f64>::from_shape_fn(&[2, 3, 4], |ix| (ix[0] + 2 * ix[1] + 6 * ix[2]) as f64);
    /// let m = t.matricize(&[2, 0]).unwrap();
    /// assert_eq!(m.dim(), (8, 3));
    /// // row = i2 + 4 * i0, column = i1
    /// assert_eq!(m[[3 + 4 * 1, 2]], (1 + 2 * 2 + 6 * 3) as f64);
    /// ```
    pub fn matricize(&self, modes: &[usize]) -> anyhow::Result<Array2<T>> {
        let perm = row_major_first(modes, self.rank())?;
        let shape = self.shape();
        let rows: usize = modes.iter().map(|&m| shape[m]).product();
        let cols = if rows == 0 { 0 } else { self.len() / rows };
        let permuted = self.data.clone().permuted_axes(IxDyn(&perm));
        let matrix = reshape_col_major(permuted, &[rows, cols])?.into_dimensionality::<Ix2>()?;
        Ok(matrix)
    }

    /// Inverse of [`DenseND::matricize`]
    ///
    /// `shape` is the shape of the tensor that was matricized over `modes`.
    pub fn dematricize(matrix: &Array2<T>, modes: &[usize], shape: &[usize]) -> anyhow::Result<Self> {
        let perm = row_major_first(modes, shape.len())?;
        let rows: usize = modes.iter().map(|&m| shape[m]).product();
        let total: usize = shape.iter().product();
        if matrix.nrows() != rows || matrix.len() != total {
            anyhow::bail!(
                "Matrix of shape {:?} cannot be folded into {:?} over modes {:?}",
                matrix.shape(),
                shape,
                modes
            );
        }

        let permuted_shape: Vec<usize> = perm.iter().map(|&p| shape[p]).collect();
        let folded = reshape_col_major(matrix.clone().into_dyn(), &permuted_shape)?;
        let data = folded
            .permuted_axes(IxDyn(&inverse_permutation(&perm)))
            .as_standard_layout()
            .into_owned();
        Ok(Self { data })
    }

    /// Frobenius norm
    pub fn frobenius_norm(&self) -> T
    where
        T: Float,
    {
        self.data.iter().map(|&x| x * x).fold(T::zero(), |acc, v| acc + v).sqrt()
    }
}

/// Reshape an array using column-major element order
///
/// The result is C-contiguous; only the logical ordering is column-major.
pub fn reshape_col_major<T>(array: Array<T, IxDyn>, new_shape: &[usize]) -> anyhow::Result<Array<T, IxDyn>>
where
    T: Clone,
{
    let total: usize = new_shape.iter().product();
    if total != array.len() {
        anyhow::bail!(
            "Cannot reshape {} elements of shape {:?} into {:?}",
            array.len(),
            array.shape(),
            new_shape
        );
    }

    // Column-major order of `array` is row-major order of its axis-reversed view.
    let flat: Vec<T> = array.reversed_axes().iter().cloned().collect();
    let reversed_shape: Vec<usize> = new_shape.iter().rev().copied().collect();
    let reshaped = Array::from_shape_vec(IxDyn(&reversed_shape), flat)?
        .reversed_axes()
        .as_standard_layout()
        .into_owned();
    Ok(reshaped)
}

/// Inverse of an axis permutation
pub fn inverse_permutation(perm: &[usize]) -> Vec<usize> {
    let mut inv = vec![0; perm.len()];
    for (i, &p) in perm.iter().enumerate() {
        inv[p] = i;
    }
    inv
}

fn check_permutation(axes: &[usize], rank: usize) -> anyhow::Result<()> {
    if axes.len() != rank {
        anyhow::bail!(
            "Permutation axes length ({}) must match tensor rank ({})",
            axes.len(),
            rank
        );
    }
    let mut sorted = axes.to_vec();
    sorted.sort_unstable();
    if sorted.iter().enumerate().any(|(i, &ax)| ax != i) {
        anyhow::bail!("Invalid permutation: {:?}", axes);
    }
    Ok(())
}

/// Permutation placing `modes` first, followed by the remaining axes in order.
fn row_major_first(modes: &[usize], rank: usize) -> anyhow::Result<Vec<usize>> {
    let mut seen = vec![false; rank];
    for &m in modes {
        if m >= rank {
            anyhow::bail!("Mode {} out of bounds for tensor with rank {}", m, rank);
        }
        if seen[m] {
            anyhow::bail!("Duplicate mode {} in {:?}", m, modes);
        }
        seen[m] = true;
    }
    let mut perm = modes.to_vec();
    perm.extend((0..rank).filter(|&i| !seen[i]));
    Ok(perm)
}

impl<T> std::ops::Index<&[usize]> for DenseND<T> {
    type Output = T;

    fn index(&self, index: &[usize]) -> &Self::Output {
        &self.data[IxDyn(index)]
    }
}

impl<'b, T> std::ops::Sub<&'b DenseND<T>> for &DenseND<T>
where
    T: Clone + Num,
{
    type Output = DenseND<T>;

    /// Elementwise difference; shapes must match exactly.
    fn sub(self, rhs: &'b DenseND<T>) -> Self::Output {
        DenseND {
            data: &self.data - &rhs.data,
        }
    }
}

impl<'b, T> std::ops::Add<&'b DenseND<T>> for &DenseND<T>
where
    T: Clone + Num,
{
    type Output = DenseND<T>;

    /// Elementwise sum; shapes must match exactly.
    fn add(self, rhs: &'b DenseND<T>) -> Self::Output {
        DenseND {
            data: &self.data + &rhs.data,
        }
    }
}

impl<T: fmt::Debug + Clone + Num> fmt::Debug for DenseND<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DenseND")
            .field("shape", &self.shape())
            .field("data", &self.data)
            .finish()
    }
}
