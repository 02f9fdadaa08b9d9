// cuDNN integration for the backward-filter path. Compiled only with the
// `cudnn` feature; the rest of the crate talks to it through the VendorConv
// seam.

pub mod backward_filter;
pub mod descriptors;
pub mod handle;

pub use backward_filter::CudnnRuntime;

pub mod status {
    pub const CUDNN_STATUS_SUCCESS: i32 = 0;
    pub const CUDNN_STATUS_NOT_INITIALIZED: i32 = 1;
    pub const CUDNN_STATUS_ALLOC_FAILED: i32 = 2;
    pub const CUDNN_STATUS_BAD_PARAM: i32 = 3;
    pub const CUDNN_STATUS_INTERNAL_ERROR: i32 = 4;
    pub const CUDNN_STATUS_NOT_SUPPORTED: i32 = 9;
}
