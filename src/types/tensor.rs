//! Dense tensors and the two-dimensional energy field.
//!
//! `Tensor` is what a codec hands back from disk: any rank, not yet
//! validated. `EnergyMap` is a rank-2 field of finite values. Whether an
//! `EnergyMap` is admissible for storage is decided by the shape validator,
//! not by construction, because pyramid layers are energy maps of arbitrary
//! size.

use ndarray::{Array2, Array3, ArrayD, ArrayView2, Axis, Ix2, IxDyn, ShapeBuilder, Zip};

/// Error when constructing an energy map.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum MapError {
    /// Data length does not match the declared dimensions.
    #[error("Data length {len} does not match shape (expected {expected} values)")]
    LengthMismatch {
        /// Number of values the shape requires.
        expected: usize,
        /// Actual number of values.
        len: usize,
    },
    /// Tensor is not two-dimensional.
    #[error("Energy maps must be 2-dimensional, got rank {0}")]
    NotTwoDimensional(usize),
    /// A value is NaN or infinite.
    #[error("Non-finite energy value at index {index}")]
    NonFinite {
        /// Row-major index of the first offending value.
        index: usize,
    },
}

fn checked_len(shape: &[usize], len: usize) -> Result<(), MapError> {
    match shape.iter().try_fold(1usize, |acc, d| acc.checked_mul(*d)) {
        Some(expected) if expected == len => Ok(()),
        expected => Err(MapError::LengthMismatch { expected: expected.unwrap_or(usize::MAX), len }),
    }
}

/// An n-dimensional array of `f64`, always held in standard (row-major) layout.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor(ArrayD<f64>);

impl Tensor {
    /// Create a tensor from row-major values, checking that `data` fills `shape` exactly.
    pub fn new(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, MapError> {
        checked_len(&shape, data.len())?;
        let len = data.len();
        ArrayD::from_shape_vec(IxDyn(&shape), data)
            .map(Self)
            .map_err(|_| MapError::LengthMismatch { expected: len, len })
    }

    /// Create a tensor from column-major values.
    pub fn from_fortran(shape: Vec<usize>, data: Vec<f64>) -> Result<Self, MapError> {
        checked_len(&shape, data.len())?;
        let len = data.len();
        let array = ArrayD::from_shape_vec(IxDyn(&shape).f(), data)
            .map_err(|_| MapError::LengthMismatch { expected: len, len })?;
        Ok(Self(array.as_standard_layout().into_owned()))
    }

    /// Tensor dimensions.
    pub fn shape(&self) -> &[usize] {
        self.0.shape()
    }

    /// Number of dimensions.
    pub fn rank(&self) -> usize {
        self.0.ndim()
    }

    /// The underlying array.
    pub fn array(&self) -> &ArrayD<f64> {
        &self.0
    }

    /// Consume into the underlying array.
    pub fn into_array(self) -> ArrayD<f64> {
        self.0
    }
}

impl From<EnergyMap> for Tensor {
    fn from(map: EnergyMap) -> Self {
        Self(map.0.into_dyn())
    }
}

/// A two-dimensional scalar energy field.
#[derive(Debug, Clone, PartialEq)]
pub struct EnergyMap(Array2<f64>);

impl EnergyMap {
    /// Create a map from row-major data.
    ///
    /// Fails if the length is wrong or any value is not finite.
    pub fn new(height: usize, width: usize, data: Vec<f64>) -> Result<Self, MapError> {
        checked_len(&[height, width], data.len())?;
        let len = data.len();
        let array = Array2::from_shape_vec((height, width), data)
            .map_err(|_| MapError::LengthMismatch { expected: len, len })?;
        Self::from_array(array)
    }

    /// Wrap an existing array, checking that every value is finite.
    pub fn from_array(array: Array2<f64>) -> Result<Self, MapError> {
        let array = array.as_standard_layout().into_owned();
        if let Some(index) = array.iter().position(|v| !v.is_finite()) {
            return Err(MapError::NonFinite { index });
        }
        Ok(Self(array))
    }

    /// Create a map with every cell set to `value`.
    pub fn filled(height: usize, width: usize, value: f64) -> Self {
        Self(Array2::from_elem((height, width), value))
    }

    /// Create a map by evaluating `f(row, col)` for every cell.
    pub fn from_fn(height: usize, width: usize, mut f: impl FnMut(usize, usize) -> f64) -> Self {
        Self(Array2::from_shape_fn((height, width), |(r, c)| f(r, c)))
    }

    /// Wrap values produced by internal numeric routines.
    ///
    /// Skips the finiteness check: resampled or renormalized fields are
    /// checked by the conservation test instead.
    pub(crate) fn from_raw(array: Array2<f64>) -> Self {
        Self(array)
    }

    /// Number of rows.
    pub fn height(&self) -> usize {
        self.0.nrows()
    }

    /// Number of columns.
    pub fn width(&self) -> usize {
        self.0.ncols()
    }

    /// `[height, width]`.
    pub fn shape(&self) -> [usize; 2] {
        [self.height(), self.width()]
    }

    /// Resolved scale: the larger of the two dimensions.
    pub fn scale(&self) -> usize {
        self.height().max(self.width())
    }

    /// Total number of cells.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the map has no cells.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value at `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> f64 {
        self.0[[row, col]]
    }

    /// The underlying array.
    pub fn array(&self) -> &Array2<f64> {
        &self.0
    }

    /// Borrowed view of the field.
    pub fn view(&self) -> ArrayView2<'_, f64> {
        self.0.view()
    }

    /// Sum of all cells.
    pub fn total(&self) -> f64 {
        self.0.sum()
    }

    /// Multiply every cell by `factor`.
    pub fn scale_in_place(&mut self, factor: f64) {
        self.0.mapv_inplace(|v| v * factor);
    }

    /// Largest absolute elementwise difference to another map of the same shape.
    ///
    /// Returns `None` when the shapes differ.
    pub fn max_abs_diff(&self, other: &EnergyMap) -> Option<f64> {
        if self.shape() != other.shape() {
            return None;
        }
        Some(
            Zip::from(&self.0)
                .and(&other.0)
                .fold(0.0, |acc, a, b| acc.max((a - b).abs())),
        )
    }

    /// Consume into the underlying array.
    pub fn into_array(self) -> Array2<f64> {
        self.0
    }
}

impl TryFrom<Tensor> for EnergyMap {
    type Error = MapError;

    fn try_from(tensor: Tensor) -> Result<Self, Self::Error> {
        let rank = tensor.rank();
        let array = tensor
            .into_array()
            .into_dimensionality::<Ix2>()
            .map_err(|_| MapError::NotTwoDimensional(rank))?;
        EnergyMap::from_array(array)
    }
}

/// A stack of equally-shaped energy maps along a leading time axis.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchTensor(Array3<f64>);

impl BatchTensor {
    /// Stack maps in order. Returns `None` if shapes differ or the list is empty.
    pub fn stack(maps: &[EnergyMap]) -> Option<Self> {
        let views: Vec<ArrayView2<'_, f64>> = maps.iter().map(EnergyMap::view).collect();
        ndarray::stack(Axis(0), &views).ok().map(Self)
    }

    /// `[T, H, W]`.
    pub fn shape(&self) -> [usize; 3] {
        let (t, h, w) = self.0.dim();
        [t, h, w]
    }

    /// The underlying `[T, H, W]` array.
    pub fn array(&self) -> &Array3<f64> {
        &self.0
    }

    /// One time step as an `H x W` view.
    pub fn step(&self, t: usize) -> ArrayView2<'_, f64> {
        self.0.index_axis(Axis(0), t)
    }
}
