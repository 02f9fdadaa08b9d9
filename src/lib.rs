//! Algorithm selection and dispatch for the convolution backward-filter
//! operator on CUDA. Callers enumerate strategies through [`AlgoPack`],
//! filter them with the predicates on [`ConvGradAlgo`], size and allocate a
//! workspace, then exec the chosen one.

pub mod algo;
pub mod args;
pub mod chanwise;
pub mod config;
pub mod conv;
pub mod dtype;
pub mod error;
pub mod handle;
pub mod kernels;
pub mod layout;
pub mod logging;
pub mod matmul;
pub mod registry;
pub mod vendor;

#[cfg(feature = "cudnn")]
pub mod cudnn;

pub use algo::ConvGradAlgo;
pub use args::{AlgoCacheKey, ExecArgs, SizeArgs, TensorRef, Workspace};
pub use chanwise::ChanwiseAlgo;
pub use conv::{CanonizedFilterMeta, ConvParams, ConvolutionBackwardFilter};
pub use dtype::DType;
pub use error::{ConvGradError, Result};
pub use handle::{ComputeCapability, Handle};
pub use kernels::{CudaKernels, NativeKernels};
pub use layout::TensorLayout;
pub use matmul::MatmulAlgo;
pub use registry::AlgoPack;
pub use vendor::{CudnnAlgo, FoundSubAlgo, VendorConv, VendorDisabled};
