use thiserror::Error;

pub type Result<T> = std::result::Result<T, ConvGradError>;

#[derive(Error, Debug)]
pub enum ConvGradError {
    #[error("CUDA error: {0}")]
    Cuda(String),

    #[error("cuDNN error: {0}")]
    Cudnn(String),

    #[error("CUBLAS error")]
    CuBlas,

    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    #[error("Unsupported dtype: {0}")]
    UnsupportedDType(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("conv bwd filter algo {algo}: required workspace {required} bytes, got {provided}")]
    WorkspaceTooSmall {
        algo: &'static str,
        required: usize,
        provided: usize,
    },

    #[error("conv bwd filter algo {algo}: exec called before workspace query for {args}")]
    AlgoNotSized { algo: &'static str, args: String },
}

impl From<cudarc::driver::DriverError> for ConvGradError {
    fn from(e: cudarc::driver::DriverError) -> Self {
        ConvGradError::Cuda(format!("{:?}", e))
    }
}

impl From<cudarc::cublas::result::CublasError> for ConvGradError {
    fn from(_: cudarc::cublas::result::CublasError) -> Self {
        ConvGradError::CuBlas
    }
}
