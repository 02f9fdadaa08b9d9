// cuDNN binding for convolution backward-filter: capability probe, best
// sub-algorithm discovery and the compute dispatch.

use std::os::raw::{c_int, c_void};

use crate::args::{ExecArgs, SizeArgs};
use crate::cudnn::descriptors::{ConvolutionDescriptor, FilterDescriptor, TensorDescriptor};
use crate::cudnn::handle::get_cudnn_handle;
use crate::dtype::DType;
use crate::error::{ConvGradError, Result};
use crate::vendor::{FoundSubAlgo, VendorConv};

const MAX_ALGO_COUNT: usize = 8;

#[repr(C)]
#[derive(Clone, Copy)]
struct ConvBwdFilterAlgoPerf {
    algo: c_int,
    status: c_int,
    time: f32,
    memory: usize,
    determinism: c_int,
    math_type: c_int,
    reserved: [c_int; 3],
}

const EMPTY_PERF: ConvBwdFilterAlgoPerf = ConvBwdFilterAlgoPerf {
    algo: 0,
    status: 0,
    time: 0.0,
    memory: 0,
    determinism: 0,
    math_type: 0,
    reserved: [0; 3],
};

#[link(name = "cudnn")]
extern "C" {
    fn cudnnFindConvolutionBackwardFilterAlgorithm(
        handle: *mut c_void,
        x_desc: *mut c_void,
        dy_desc: *mut c_void,
        conv_desc: *mut c_void,
        dw_desc: *mut c_void,
        requested_algo_count: c_int,
        returned_algo_count: *mut c_int,
        perf_results: *mut ConvBwdFilterAlgoPerf,
    ) -> c_int;

    // Heuristic variant: ranks algorithms without benchmarking or allocating.
    fn cudnnGetConvolutionBackwardFilterAlgorithm_v7(
        handle: *mut c_void,
        x_desc: *mut c_void,
        dy_desc: *mut c_void,
        conv_desc: *mut c_void,
        dw_desc: *mut c_void,
        requested_algo_count: c_int,
        returned_algo_count: *mut c_int,
        perf_results: *mut ConvBwdFilterAlgoPerf,
    ) -> c_int;

    fn cudnnConvolutionBackwardFilter(
        handle: *mut c_void,
        alpha: *const c_void,
        x_desc: *mut c_void,
        x: *const c_void,
        dy_desc: *mut c_void,
        dy: *const c_void,
        conv_desc: *mut c_void,
        algo: c_int,
        workspace: *mut c_void,
        workspace_size: usize,
        beta: *const c_void,
        dw_desc: *mut c_void,
        dw: *mut c_void,
    ) -> c_int;
}

struct BwdFilterDescs {
    x: TensorDescriptor,
    dy: TensorDescriptor,
    dw: FilterDescriptor,
    conv: ConvolutionDescriptor,
}

fn build_descs(args: &SizeArgs) -> Result<BwdFilterDescs> {
    let m = &args.grad_filter_meta;
    let src = args.src_layout.dims();
    let diff = args.diff_layout.dims();
    // Half types run with float accumulation; descriptors keep the io dtype.
    let compute = DType::F32;

    Ok(BwdFilterDescs {
        x: TensorDescriptor::new_4d(args.src_layout.dtype(), src[0], src[1], src[2], src[3])?,
        dy: TensorDescriptor::new_4d(args.diff_layout.dtype(), diff[0], diff[1], diff[2], diff[3])?,
        dw: FilterDescriptor::new_4d(
            m.dtype,
            m.group * m.ocpg,
            m.icpg,
            m.spatial[0],
            m.spatial[1],
        )?,
        conv: ConvolutionDescriptor::new_2d(m.padding, m.stride, m.dilation, m.group, compute)?,
    })
}

/// Production [`VendorConv`] over the cuDNN backward-filter entry points.
pub struct CudnnRuntime;

impl CudnnRuntime {
    pub fn new() -> Self {
        Self
    }
}

impl Default for CudnnRuntime {
    fn default() -> Self {
        Self::new()
    }
}

impl VendorConv for CudnnRuntime {
    fn supports(&self, args: &SizeArgs) -> bool {
        if !args.src_layout.is_contiguous() || !args.diff_layout.is_contiguous() {
            return false;
        }
        let dtypes_ok = matches!(
            args.src_layout.dtype(),
            DType::F32 | DType::F16 | DType::BF16
        ) && args.src_layout.dtype() == args.diff_layout.dtype()
            && args.src_layout.dtype() == args.grad_filter_meta.dtype;
        if !dtypes_ok {
            return false;
        }
        // Ask the library whether any sub-algorithm exists for these shapes.
        // The v7 heuristic query neither benchmarks nor allocates; a problem
        // it rejects is infeasible, not an error.
        let descs = match build_descs(args) {
            Ok(descs) => descs,
            Err(_) => return false,
        };
        let handle = match get_cudnn_handle() {
            Ok(handle) => handle,
            Err(_) => return false,
        };
        let handle_guard = match handle.lock() {
            Ok(guard) => guard,
            Err(_) => return false,
        };

        let mut perf = [EMPTY_PERF; MAX_ALGO_COUNT];
        let mut returned: c_int = 0;
        let status = unsafe {
            cudnnGetConvolutionBackwardFilterAlgorithm_v7(
                handle_guard.as_ptr(),
                descs.x.as_ptr(),
                descs.dy.as_ptr(),
                descs.conv.as_ptr(),
                descs.dw.as_ptr(),
                MAX_ALGO_COUNT as c_int,
                &mut returned,
                perf.as_mut_ptr(),
            )
        };
        status == 0
            && perf
                .iter()
                .take(returned as usize)
                .any(|p| p.status == 0)
    }

    fn find_best(&self, args: &SizeArgs) -> Result<FoundSubAlgo> {
        let descs = build_descs(args)?;
        let handle = get_cudnn_handle()?;
        let handle_guard = handle
            .lock()
            .map_err(|_| ConvGradError::Cudnn("cudnn handle mutex poisoned".into()))?;

        let mut perf = [EMPTY_PERF; MAX_ALGO_COUNT];
        let mut returned: c_int = 0;
        let status = unsafe {
            cudnnFindConvolutionBackwardFilterAlgorithm(
                handle_guard.as_ptr(),
                descs.x.as_ptr(),
                descs.dy.as_ptr(),
                descs.conv.as_ptr(),
                descs.dw.as_ptr(),
                MAX_ALGO_COUNT as c_int,
                &mut returned,
                perf.as_mut_ptr(),
            )
        };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "cudnnFindConvolutionBackwardFilterAlgorithm failed ({}) for {}",
                status, args
            )));
        }

        // Results are sorted fastest-first; take the first successful one.
        perf.iter()
            .take(returned as usize)
            .find(|p| p.status == 0)
            .map(|p| FoundSubAlgo {
                algo: p.algo,
                workspace_in_bytes: p.memory,
            })
            .ok_or_else(|| {
                ConvGradError::Cudnn(format!("no supported bwd filter algorithm for {}", args))
            })
    }

    fn exec(&self, args: &ExecArgs, algo: i32) -> Result<()> {
        let descs = build_descs(args)?;
        let handle = get_cudnn_handle()?;
        let handle_guard = handle
            .lock()
            .map_err(|_| ConvGradError::Cudnn("cudnn handle mutex poisoned".into()))?;

        let alpha: f32 = 1.0;
        let beta: f32 = 0.0;
        let status = unsafe {
            cudnnConvolutionBackwardFilter(
                handle_guard.as_ptr(),
                &alpha as *const f32 as *const c_void,
                descs.x.as_ptr(),
                args.src.ptr as usize as *const c_void,
                descs.dy.as_ptr(),
                args.diff.ptr as usize as *const c_void,
                descs.conv.as_ptr(),
                algo,
                args.workspace.ptr as usize as *mut c_void,
                args.workspace.size,
                &beta as *const f32 as *const c_void,
                descs.dw.as_ptr(),
                args.grad.ptr as usize as *mut c_void,
            )
        };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "cudnnConvolutionBackwardFilter failed ({}) for {}",
                status, args.size
            )));
        }
        Ok(())
    }
}
