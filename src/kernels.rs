//! Native compute entry points for the self-contained strategies, plus the
//! CUDA implementation that backs them in production.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use cudarc::cublas::CudaBlas;
use cudarc::driver::{CudaDevice, LaunchAsync, LaunchConfig};
use lazy_static::lazy_static;

use crate::args::ExecArgs;
use crate::dtype::DType;
use crate::error::{ConvGradError, Result};

/// Outbound boundary to the native kernels. The matmul entry assumes the
/// workspace holds the unfolded column buffer; the channel-wise entry needs no
/// workspace at all.
pub trait NativeKernels: Send + Sync {
    fn matmul_filter_grad(&self, args: &ExecArgs) -> Result<()>;
    fn chanwise_filter_grad(&self, args: &ExecArgs) -> Result<()>;
}

/// im2col over one channel group, batch-major column buffer.
const IM2COL_GROUPED_KERNEL: &str = r#"
extern "C" __global__ void im2col_grouped_kernel(
    const float* src,
    float* col,
    const int* p  // n, icpg, channels, c0, h, w, kh, kw, pad_h, pad_w,
                  // stride_h, stride_w, dil_h, dil_w, oh, ow
) {
    const int n = p[0], icpg = p[1], channels = p[2], c0 = p[3];
    const int h = p[4], w = p[5], kh = p[6], kw = p[7];
    const int pad_h = p[8], pad_w = p[9], stride_h = p[10], stride_w = p[11];
    const int dil_h = p[12], dil_w = p[13], oh = p[14], ow = p[15];

    const int index = blockIdx.x * blockDim.x + threadIdx.x;
    const int total = n * icpg * kh * kw * oh * ow;
    if (index >= total) return;

    int ox = index % ow;
    int oy = (index / ow) % oh;
    int fw = (index / (ow * oh)) % kw;
    int fh = (index / (ow * oh * kw)) % kh;
    int c  = (index / (ow * oh * kw * kh)) % icpg;
    int b  = index / (ow * oh * kw * kh * icpg);

    int iy = oy * stride_h - pad_h + fh * dil_h;
    int ix = ox * stride_w - pad_w + fw * dil_w;

    int col_index = b * (icpg * kh * kw * oh * ow) +
                    ((c * kh + fh) * kw + fw) * (oh * ow) +
                    oy * ow + ox;

    if (iy >= 0 && iy < h && ix >= 0 && ix < w) {
        int src_index = (b * channels + c0 + c) * (h * w) + iy * w + ix;
        col[col_index] = src[src_index];
    } else {
        col[col_index] = 0.0f;
    }
}
"#;

/// Direct per-channel filter-gradient accumulation for depthwise convolution.
/// One thread per filter element, fixed summation order over batch and space.
const CHANWISE_WGRAD_KERNEL: &str = r#"
extern "C" __global__ void chanwise_wgrad_kernel(
    const float* src,
    const float* diff,
    float* grad,
    const int* p  // n, groups, ocpg, h, w, kh, kw, pad_h, pad_w,
                  // stride_h, stride_w, dil_h, dil_w, oh, ow
) {
    const int n = p[0], groups = p[1], ocpg = p[2];
    const int h = p[3], w = p[4], kh = p[5], kw = p[6];
    const int pad_h = p[7], pad_w = p[8], stride_h = p[9], stride_w = p[10];
    const int dil_h = p[11], dil_w = p[12], oh = p[13], ow = p[14];

    const int index = blockIdx.x * blockDim.x + threadIdx.x;
    const int out_channels = groups * ocpg;
    const int total = out_channels * kh * kw;
    if (index >= total) return;

    int fw = index % kw;
    int fh = (index / kw) % kh;
    int oc = index / (kw * kh);
    int g = oc / ocpg;

    float acc = 0.0f;
    for (int b = 0; b < n; ++b) {
        const float* src_c = src + (b * groups + g) * h * w;
        const float* diff_c = diff + (b * out_channels + oc) * oh * ow;
        for (int oy = 0; oy < oh; ++oy) {
            int iy = oy * stride_h - pad_h + fh * dil_h;
            if (iy < 0 || iy >= h) continue;
            for (int ox = 0; ox < ow; ++ox) {
                int ix = ox * stride_w - pad_w + fw * dil_w;
                if (ix < 0 || ix >= w) continue;
                acc += src_c[iy * w + ix] * diff_c[oy * ow + ox];
            }
        }
    }
    grad[index] = acc;
}
"#;

lazy_static! {
    static ref DEVICES: Mutex<HashMap<i32, Arc<CudaDevice>>> = Mutex::new(HashMap::new());
}

/// Production [`NativeKernels`]: NVRTC-compiled CUDA kernels plus cuBLAS for
/// the matmul reduction.
pub struct CudaKernels;

impl CudaKernels {
    pub fn new() -> Self {
        Self
    }

    fn device_for(&self, ordinal: i32) -> Result<Arc<CudaDevice>> {
        let mut devices = DEVICES
            .lock()
            .map_err(|_| ConvGradError::Cuda("device cache mutex poisoned".into()))?;
        if let Some(device) = devices.get(&ordinal) {
            return Ok(device.clone());
        }
        let device = CudaDevice::new(ordinal as usize)?;
        devices.insert(ordinal, device.clone());
        Ok(device)
    }

    fn ensure_kernel(device: &Arc<CudaDevice>, name: &'static str, source: &str) -> Result<()> {
        if device.get_func(name, name).is_some() {
            return Ok(());
        }
        let opts = cudarc::nvrtc::CompileOptions {
            arch: Some("compute_70"),
            ..Default::default()
        };
        let ptx = cudarc::nvrtc::compile_ptx_with_opts(source, opts)
            .map_err(|e| ConvGradError::Cuda(format!("Failed to compile '{}': {:?}", name, e)))?;
        device.load_ptx(ptx, name, &[name])?;
        Ok(())
    }

    fn require_f32(args: &ExecArgs) -> Result<()> {
        for layout in [args.src.layout, args.diff.layout, args.grad.layout] {
            if layout.dtype() != DType::F32 {
                return Err(ConvGradError::UnsupportedDType(format!(
                    "native conv bwd filter kernels are f32 only, got {}",
                    layout.dtype()
                )));
            }
            if !layout.is_contiguous() {
                return Err(ConvGradError::InvalidShape(format!(
                    "native conv bwd filter kernels need contiguous layouts, got {}",
                    layout
                )));
            }
        }
        Ok(())
    }
}

impl Default for CudaKernels {
    fn default() -> Self {
        Self::new()
    }
}

impl NativeKernels for CudaKernels {
    fn matmul_filter_grad(&self, args: &ExecArgs) -> Result<()> {
        Self::require_f32(args)?;
        let device = self.device_for(args.handle.ordinal())?;
        Self::ensure_kernel(&device, "im2col_grouped_kernel", IM2COL_GROUPED_KERNEL)?;

        let m = &args.grad_filter_meta;
        let n = args.batch();
        let src_dims = args.src_layout.dims();
        let (h, w) = (src_dims[2], src_dims[3]);
        let [oh, ow] = args.out_spatial();
        let (kh, kw) = (m.spatial[0], m.spatial[1]);
        let ckk = m.icpg * kh * kw;
        let ohw = oh * ow;
        let out_channels = m.group * m.ocpg;

        let blas = CudaBlas::new(device.clone())?;
        let alpha: f32 = 1.0;

        for g in 0..m.group {
            // Unfold this group's input into the workspace column buffer.
            let params: Vec<i32> = vec![
                n as i32,
                m.icpg as i32,
                args.src_channels() as i32,
                (g * m.icpg) as i32,
                h as i32,
                w as i32,
                kh as i32,
                kw as i32,
                m.padding[0] as i32,
                m.padding[1] as i32,
                m.stride[0] as i32,
                m.stride[1] as i32,
                m.dilation[0] as i32,
                m.dilation[1] as i32,
                oh as i32,
                ow as i32,
            ];
            let params_dev = device.htod_copy(params)?;
            let total = (n * ckk * ohw) as u32;
            let f = device
                .get_func("im2col_grouped_kernel", "im2col_grouped_kernel")
                .ok_or_else(|| ConvGradError::Cuda("im2col kernel missing".into()))?;
            let cfg = LaunchConfig::for_num_elems(total);
            unsafe {
                f.launch(cfg, (args.src.ptr, args.workspace.ptr, &params_dev))?;
            }

            // grad_g[ocpg, ckk] = sum_b diff_bg[ocpg, ohw] * col_b^T, expressed
            // in cuBLAS column-major terms as grad_g^T = col^T^T * diff^T.
            let grad_ptr = args.grad.ptr + (g * m.ocpg * ckk * 4) as u64;
            for b in 0..n {
                let col_ptr = args.workspace.ptr + (b * ckk * ohw * 4) as u64;
                let diff_ptr = args.diff.ptr + ((b * out_channels + g * m.ocpg) * ohw * 4) as u64;
                let beta: f32 = if b == 0 { 0.0 } else { 1.0 };
                unsafe {
                    cudarc::cublas::result::sgemm(
                        *blas.handle(),
                        cudarc::cublas::sys::cublasOperation_t::CUBLAS_OP_T,
                        cudarc::cublas::sys::cublasOperation_t::CUBLAS_OP_N,
                        ckk as i32,
                        m.ocpg as i32,
                        ohw as i32,
                        &alpha,
                        col_ptr as usize as *const f32,
                        ohw as i32,
                        diff_ptr as usize as *const f32,
                        ohw as i32,
                        &beta,
                        grad_ptr as usize as *mut f32,
                        ckk as i32,
                    )?;
                }
            }
        }
        device.synchronize()?;
        Ok(())
    }

    fn chanwise_filter_grad(&self, args: &ExecArgs) -> Result<()> {
        Self::require_f32(args)?;
        let device = self.device_for(args.handle.ordinal())?;
        Self::ensure_kernel(&device, "chanwise_wgrad_kernel", CHANWISE_WGRAD_KERNEL)?;

        let m = &args.grad_filter_meta;
        let src_dims = args.src_layout.dims();
        let [oh, ow] = args.out_spatial();
        let params: Vec<i32> = vec![
            args.batch() as i32,
            m.group as i32,
            m.ocpg as i32,
            src_dims[2] as i32,
            src_dims[3] as i32,
            m.spatial[0] as i32,
            m.spatial[1] as i32,
            m.padding[0] as i32,
            m.padding[1] as i32,
            m.stride[0] as i32,
            m.stride[1] as i32,
            m.dilation[0] as i32,
            m.dilation[1] as i32,
            oh as i32,
            ow as i32,
        ];
        let params_dev = device.htod_copy(params)?;
        let total = (m.group * m.ocpg * m.spatial[0] * m.spatial[1]) as u32;
        let f = device
            .get_func("chanwise_wgrad_kernel", "chanwise_wgrad_kernel")
            .ok_or_else(|| ConvGradError::Cuda("chanwise kernel missing".into()))?;
        let cfg = LaunchConfig::for_num_elems(total);
        unsafe {
            f.launch(
                cfg,
                (args.src.ptr, args.diff.ptr, args.grad.ptr, &params_dev),
            )?;
        }
        device.synchronize()?;
        Ok(())
    }
}
