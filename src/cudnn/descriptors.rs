// RAII wrappers around the cuDNN descriptor objects the backward-filter path
// needs: tensor, filter and convolution descriptors.

use std::os::raw::{c_int, c_void};
use std::ptr;

use crate::dtype::DType;
use crate::error::{ConvGradError, Result};

pub const CUDNN_TENSOR_NCHW: c_int = 0;
pub const CUDNN_CROSS_CORRELATION: c_int = 1;

pub const CUDNN_DATA_FLOAT: c_int = 0;
pub const CUDNN_DATA_DOUBLE: c_int = 1;
pub const CUDNN_DATA_HALF: c_int = 2;
pub const CUDNN_DATA_BFLOAT16: c_int = 9;

#[link(name = "cudnn")]
extern "C" {
    fn cudnnCreateTensorDescriptor(desc: *mut *mut c_void) -> c_int;
    fn cudnnDestroyTensorDescriptor(desc: *mut c_void) -> c_int;
    fn cudnnSetTensor4dDescriptor(
        desc: *mut c_void,
        format: c_int,
        datatype: c_int,
        n: c_int,
        c: c_int,
        h: c_int,
        w: c_int,
    ) -> c_int;

    fn cudnnCreateFilterDescriptor(desc: *mut *mut c_void) -> c_int;
    fn cudnnDestroyFilterDescriptor(desc: *mut c_void) -> c_int;
    fn cudnnSetFilter4dDescriptor(
        desc: *mut c_void,
        datatype: c_int,
        format: c_int,
        k: c_int,
        c: c_int,
        h: c_int,
        w: c_int,
    ) -> c_int;

    fn cudnnCreateConvolutionDescriptor(desc: *mut *mut c_void) -> c_int;
    fn cudnnDestroyConvolutionDescriptor(desc: *mut c_void) -> c_int;
    fn cudnnSetConvolution2dDescriptor(
        desc: *mut c_void,
        pad_h: c_int,
        pad_w: c_int,
        stride_h: c_int,
        stride_w: c_int,
        dilation_h: c_int,
        dilation_w: c_int,
        mode: c_int,
        compute_type: c_int,
    ) -> c_int;
    fn cudnnSetConvolutionGroupCount(desc: *mut c_void, group_count: c_int) -> c_int;
}

pub fn dtype_to_cudnn(dtype: DType) -> c_int {
    match dtype {
        DType::F32 => CUDNN_DATA_FLOAT,
        DType::F64 => CUDNN_DATA_DOUBLE,
        DType::F16 => CUDNN_DATA_HALF,
        DType::BF16 => CUDNN_DATA_BFLOAT16,
    }
}

pub struct TensorDescriptor {
    desc: *mut c_void,
}

impl TensorDescriptor {
    pub fn new_4d(dtype: DType, n: usize, c: usize, h: usize, w: usize) -> Result<Self> {
        let mut desc: *mut c_void = ptr::null_mut();
        let status = unsafe { cudnnCreateTensorDescriptor(&mut desc) };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "Failed to create tensor descriptor: {}",
                status
            )));
        }
        let tensor_desc = TensorDescriptor { desc };
        let status = unsafe {
            cudnnSetTensor4dDescriptor(
                tensor_desc.desc,
                CUDNN_TENSOR_NCHW,
                dtype_to_cudnn(dtype),
                n as c_int,
                c as c_int,
                h as c_int,
                w as c_int,
            )
        };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "Failed to set tensor descriptor: {}",
                status
            )));
        }
        Ok(tensor_desc)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.desc
    }
}

impl Drop for TensorDescriptor {
    fn drop(&mut self) {
        if !self.desc.is_null() {
            unsafe {
                cudnnDestroyTensorDescriptor(self.desc);
            }
        }
    }
}

pub struct FilterDescriptor {
    desc: *mut c_void,
}

impl FilterDescriptor {
    pub fn new_4d(dtype: DType, k: usize, c: usize, h: usize, w: usize) -> Result<Self> {
        let mut desc: *mut c_void = ptr::null_mut();
        let status = unsafe { cudnnCreateFilterDescriptor(&mut desc) };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "Failed to create filter descriptor: {}",
                status
            )));
        }
        let filter_desc = FilterDescriptor { desc };
        let status = unsafe {
            cudnnSetFilter4dDescriptor(
                filter_desc.desc,
                dtype_to_cudnn(dtype),
                CUDNN_TENSOR_NCHW,
                k as c_int,
                c as c_int,
                h as c_int,
                w as c_int,
            )
        };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "Failed to set filter descriptor: {}",
                status
            )));
        }
        Ok(filter_desc)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.desc
    }
}

impl Drop for FilterDescriptor {
    fn drop(&mut self) {
        if !self.desc.is_null() {
            unsafe {
                cudnnDestroyFilterDescriptor(self.desc);
            }
        }
    }
}

pub struct ConvolutionDescriptor {
    desc: *mut c_void,
}

impl ConvolutionDescriptor {
    pub fn new_2d(
        padding: [usize; 2],
        stride: [usize; 2],
        dilation: [usize; 2],
        groups: usize,
        compute_dtype: DType,
    ) -> Result<Self> {
        let mut desc: *mut c_void = ptr::null_mut();
        let status = unsafe { cudnnCreateConvolutionDescriptor(&mut desc) };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "Failed to create convolution descriptor: {}",
                status
            )));
        }
        let conv_desc = ConvolutionDescriptor { desc };
        let status = unsafe {
            cudnnSetConvolution2dDescriptor(
                conv_desc.desc,
                padding[0] as c_int,
                padding[1] as c_int,
                stride[0] as c_int,
                stride[1] as c_int,
                dilation[0] as c_int,
                dilation[1] as c_int,
                CUDNN_CROSS_CORRELATION,
                dtype_to_cudnn(compute_dtype),
            )
        };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "Failed to set convolution descriptor: {}",
                status
            )));
        }
        if groups > 1 {
            let status = unsafe { cudnnSetConvolutionGroupCount(conv_desc.desc, groups as c_int) };
            if status != 0 {
                return Err(ConvGradError::Cudnn(format!(
                    "Failed to set convolution group count: {}",
                    status
                )));
            }
        }
        Ok(conv_desc)
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.desc
    }
}

impl Drop for ConvolutionDescriptor {
    fn drop(&mut self) {
        if !self.desc.is_null() {
            unsafe {
                cudnnDestroyConvolutionDescriptor(self.desc);
            }
        }
    }
}
