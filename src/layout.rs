use crate::dtype::DType;
use crate::error::{ConvGradError, Result};

/// Shape, strides and element type of one tensor operand. Strides are in
/// elements, innermost-last, matching NCHW row-major storage.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TensorLayout {
    dims: Vec<usize>,
    strides: Vec<usize>,
    dtype: DType,
}

impl TensorLayout {
    pub fn contiguous(dims: &[usize], dtype: DType) -> Self {
        let mut strides = vec![1; dims.len()];
        let mut cum_prod = 1;
        for (i, &dim) in dims.iter().enumerate().rev() {
            strides[i] = cum_prod;
            cum_prod *= dim;
        }
        Self {
            dims: dims.to_vec(),
            strides,
            dtype,
        }
    }

    pub fn with_strides(dims: &[usize], strides: &[usize], dtype: DType) -> Result<Self> {
        if dims.len() != strides.len() {
            return Err(ConvGradError::InvalidShape(format!(
                "rank mismatch between dims {:?} and strides {:?}",
                dims, strides
            )));
        }
        Ok(Self {
            dims: dims.to_vec(),
            strides: strides.to_vec(),
            dtype,
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    pub fn strides(&self) -> &[usize] {
        &self.strides
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn rank(&self) -> usize {
        self.dims.len()
    }

    pub fn elem_count(&self) -> usize {
        self.dims.iter().product()
    }

    pub fn is_contiguous(&self) -> bool {
        let mut cum_prod = 1;
        for (&dim, &stride) in self.dims.iter().zip(self.strides.iter()).rev() {
            if stride != cum_prod {
                return false;
            }
            cum_prod *= dim;
        }
        true
    }

    pub fn size_in_bytes(&self) -> usize {
        self.elem_count() * self.dtype.size_in_bytes()
    }
}

impl std::fmt::Display for TensorLayout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{{", self.dtype)?;
        for (i, d) in self.dims.iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, "}}")
    }
}
