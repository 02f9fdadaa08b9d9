//! Matmul-based strategy: unfold the input into a column buffer held in the
//! workspace, then reduce to the filter gradient with a matrix multiply.

use std::sync::Arc;

use crate::algo::ConvGradAlgo;
use crate::args::{ExecArgs, SizeArgs};
use crate::error::Result;
use crate::kernels::NativeKernels;

pub struct MatmulAlgo {
    kernels: Arc<dyn NativeKernels>,
}

impl MatmulAlgo {
    pub fn new(kernels: Arc<dyn NativeKernels>) -> Self {
        Self { kernels }
    }
}

impl ConvGradAlgo for MatmulAlgo {
    fn name(&self) -> &'static str {
        "MATMUL"
    }

    /// No shape restriction beyond the generic operator contract. Cheaper
    /// strategies may still win; selection order is the caller's call.
    fn is_available(&self, _args: &SizeArgs) -> bool {
        true
    }

    /// Column buffer for one group pass over the whole batch:
    /// batch x (icpg * kh * kw) x (oh * ow) elements of the src dtype.
    fn workspace_in_bytes(&self, args: &SizeArgs) -> Result<usize> {
        let m = &args.grad_filter_meta;
        let [oh, ow] = args.out_spatial();
        let elems = args.batch() * m.icpg * m.spatial[0] * m.spatial[1] * oh * ow;
        Ok(elems * args.src_layout.dtype().size_in_bytes())
    }

    fn exec(&self, args: &ExecArgs) -> Result<()> {
        self.check_workspace(&args.size, &args.workspace)?;
        self.kernels.matmul_filter_grad(args)
    }

    fn is_reproducible(&self) -> bool {
        true
    }
}
