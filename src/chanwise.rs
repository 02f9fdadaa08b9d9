//! Channel-wise strategy for fully depthwise convolutions: each channel's
//! filter gradient is accumulated directly, no intermediate buffer.

use std::sync::Arc;

use crate::algo::ConvGradAlgo;
use crate::args::{ExecArgs, SizeArgs};
use crate::error::Result;
use crate::kernels::NativeKernels;

pub struct ChanwiseAlgo {
    kernels: Arc<dyn NativeKernels>,
}

impl ChanwiseAlgo {
    pub fn new(kernels: Arc<dyn NativeKernels>) -> Self {
        Self { kernels }
    }
}

impl ConvGradAlgo for ChanwiseAlgo {
    fn name(&self) -> &'static str {
        "CHANNEL_WISE"
    }

    /// Only fully depthwise problems: one input channel per group, group count
    /// equal to the input channel count.
    fn is_available(&self, args: &SizeArgs) -> bool {
        let m = &args.grad_filter_meta;
        m.icpg == 1 && m.group == args.src_channels()
    }

    fn workspace_in_bytes(&self, _args: &SizeArgs) -> Result<usize> {
        Ok(0)
    }

    fn exec(&self, args: &ExecArgs) -> Result<()> {
        self.check_workspace(&args.size, &args.workspace)?;
        self.kernels.chanwise_filter_grad(args)
    }

    fn is_reproducible(&self) -> bool {
        true
    }
}
