use std::fmt;

#[derive(Debug, PartialEq)]
pub enum TensorError {
    ShapeOverflow,
    ShapeMismatch { expected: usize, got: usize },
}

impl fmt::Display for TensorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TensorError::ShapeOverflow => write!(f, "shape dimensions overflow when multiplied"),
            TensorError::ShapeMismatch { expected, got } => {
                write!(f, "shape mismatch: expected {expected} elements, got {got}")
            }
        }
    }
}

impl std::error::Error for TensorError {}

/// Dense row-major array.
///
/// Pixel buffers use HWC layout: `[height, width, channels]`, or
/// `[height, width]` for single-channel images.
#[derive(Clone, PartialEq)]
pub struct Tensor<T> {
    pub shape: Vec<usize>,
    pub data: Vec<T>,
}

impl<T: fmt::Debug> fmt::Debug for Tensor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // pixel data is too large to be useful in debug output
        f.debug_struct("Tensor")
            .field("shape", &self.shape)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Number of elements described by `shape`, or `ShapeOverflow`.
pub fn element_count(shape: &[usize]) -> Result<usize, TensorError> {
    shape.iter().try_fold(1usize, |product, &dim| {
        product.checked_mul(dim).ok_or(TensorError::ShapeOverflow)
    })
}

impl<T> Tensor<T> {
    pub fn new(shape: Vec<usize>, data: Vec<T>) -> Result<Self, TensorError> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(TensorError::ShapeMismatch {
                expected,
                got: data.len(),
            });
        }

        Ok(Self { shape, data })
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// First dimension of an HWC buffer.
    pub fn height(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Second dimension of an HWC buffer.
    pub fn width(&self) -> usize {
        self.shape.get(1).copied().unwrap_or(0)
    }

    /// Trailing dimension of an HWC buffer; 1 for 2-D buffers.
    pub fn channels(&self) -> usize {
        if self.shape.len() >= 3 {
            self.shape[2]
        } else {
            1
        }
    }

    /// Elements per row (width times channels).
    pub fn row_stride(&self) -> usize {
        self.width() * self.channels()
    }

    /// Borrow row `y` of an HWC buffer.
    pub fn row(&self, y: usize) -> Option<&[T]> {
        let stride = self.width().checked_mul(self.channels())?;
        let start = y.checked_mul(stride)?;
        self.data.get(start..start.checked_add(stride)?)
    }
}

impl<T: Default + Clone> Tensor<T> {
    pub fn zeros(shape: Vec<usize>) -> Result<Self, TensorError> {
        let count = element_count(&shape)?;
        Ok(Self {
            shape,
            data: vec![T::default(); count],
        })
    }
}
