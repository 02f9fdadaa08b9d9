//! Problem and execution descriptors handed to the algorithm variants.

use crate::conv::{CanonizedFilterMeta, ConvolutionBackwardFilter};
use crate::error::{ConvGradError, Result};
use crate::handle::{ComputeCapability, Handle};
use crate::layout::TensorLayout;

/// Caller-owned scratch buffer for one exec call. `ptr` is a raw device
/// address; the buffer is never retained past the call.
#[derive(Debug, Clone, Copy)]
pub struct Workspace {
    pub ptr: u64,
    pub size: usize,
}

impl Workspace {
    pub fn empty() -> Self {
        Self { ptr: 0, size: 0 }
    }
}

/// Borrowed view of one device tensor: its layout plus the device address of
/// the first element.
#[derive(Debug, Clone, Copy)]
pub struct TensorRef<'a> {
    pub layout: &'a TensorLayout,
    pub ptr: u64,
}

/// Everything a variant needs to answer feasibility and workspace queries for
/// one problem. Immutable for the duration of the query.
pub struct SizeArgs<'a> {
    pub handle: &'a Handle,
    pub src_layout: &'a TensorLayout,
    pub diff_layout: &'a TensorLayout,
    pub grad_filter_meta: CanonizedFilterMeta,
    pub opr: &'a ConvolutionBackwardFilter,
}

impl<'a> SizeArgs<'a> {
    pub fn new(
        opr: &'a ConvolutionBackwardFilter,
        handle: &'a Handle,
        src_layout: &'a TensorLayout,
        diff_layout: &'a TensorLayout,
        grad_layout: &TensorLayout,
    ) -> Result<Self> {
        let meta = opr.canonize_filter_meta(grad_layout)?;
        Self::with_filter_meta(opr, handle, src_layout, diff_layout, meta)
    }

    pub fn with_filter_meta(
        opr: &'a ConvolutionBackwardFilter,
        handle: &'a Handle,
        src_layout: &'a TensorLayout,
        diff_layout: &'a TensorLayout,
        grad_filter_meta: CanonizedFilterMeta,
    ) -> Result<Self> {
        if src_layout.rank() != 4 || diff_layout.rank() != 4 {
            return Err(ConvGradError::InvalidShape(format!(
                "conv bwd filter expects 4D src/diff, got {} and {}",
                src_layout, diff_layout
            )));
        }
        if src_layout.dims()[0] != diff_layout.dims()[0] {
            return Err(ConvGradError::InvalidShape(format!(
                "batch mismatch between src {} and diff {}",
                src_layout, diff_layout
            )));
        }
        let m = &grad_filter_meta;
        if src_layout.dims()[1] != m.group * m.icpg {
            return Err(ConvGradError::InvalidShape(format!(
                "src channels {} != group({}) * icpg({})",
                src_layout.dims()[1],
                m.group,
                m.icpg
            )));
        }
        if diff_layout.dims()[1] != m.group * m.ocpg {
            return Err(ConvGradError::InvalidShape(format!(
                "diff channels {} != group({}) * ocpg({})",
                diff_layout.dims()[1],
                m.group,
                m.ocpg
            )));
        }
        Ok(Self {
            handle,
            src_layout,
            diff_layout,
            grad_filter_meta,
            opr,
        })
    }

    pub fn batch(&self) -> usize {
        self.src_layout.dims()[0]
    }

    pub fn src_channels(&self) -> usize {
        self.src_layout.dims()[1]
    }

    /// Output spatial extent, [oh, ow], read off the diff layout.
    pub fn out_spatial(&self) -> [usize; 2] {
        [self.diff_layout.dims()[2], self.diff_layout.dims()[3]]
    }

    /// Canonical key for the vendor algorithm caches. Covers every shape,
    /// stride, dtype and parameter field plus the device capability class.
    /// Deliberately excludes the handle's ordinal, so equal problems on
    /// same-generation devices share cache entries.
    pub fn cache_key(&self) -> AlgoCacheKey {
        AlgoCacheKey {
            src: self.src_layout.clone(),
            diff: self.diff_layout.clone(),
            filter: self.grad_filter_meta,
            capability: self.handle.capability(),
        }
    }
}

impl std::fmt::Display for SizeArgs<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "src={}, diff={}, grad_filter={}",
            self.src_layout, self.diff_layout, self.grad_filter_meta
        )
    }
}

/// Key for the vendor variant's sub-algorithm and workspace caches.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AlgoCacheKey {
    src: TensorLayout,
    diff: TensorLayout,
    filter: CanonizedFilterMeta,
    capability: ComputeCapability,
}

/// `SizeArgs` plus live tensors and the workspace; built fresh per exec call.
pub struct ExecArgs<'a> {
    pub size: SizeArgs<'a>,
    pub src: TensorRef<'a>,
    pub diff: TensorRef<'a>,
    pub grad: TensorRef<'a>,
    pub workspace: Workspace,
}

impl<'a> ExecArgs<'a> {
    pub fn new(
        opr: &'a ConvolutionBackwardFilter,
        handle: &'a Handle,
        src: TensorRef<'a>,
        diff: TensorRef<'a>,
        grad: TensorRef<'a>,
        workspace: Workspace,
    ) -> Result<Self> {
        let size = SizeArgs::new(opr, handle, src.layout, diff.layout, grad.layout)?;
        Ok(Self {
            size,
            src,
            diff,
            grad,
            workspace,
        })
    }
}

impl<'a> std::ops::Deref for ExecArgs<'a> {
    type Target = SizeArgs<'a>;

    fn deref(&self) -> &Self::Target {
        &self.size
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conv::ConvParams;
    use crate::dtype::DType;

    fn opr() -> ConvolutionBackwardFilter {
        ConvolutionBackwardFilter::new(ConvParams {
            pad_h: 1,
            pad_w: 1,
            ..ConvParams::default()
        })
        .unwrap()
    }

    #[test]
    fn cache_key_ignores_handle_ordinal() {
        let opr = opr();
        let cc = ComputeCapability { major: 8, minor: 6 };
        let h0 = Handle::new(0, cc);
        let h1 = Handle::new(1, cc);
        let src = TensorLayout::contiguous(&[2, 8, 16, 16], DType::F32);
        let diff = TensorLayout::contiguous(&[2, 16, 16, 16], DType::F32);
        let grad = TensorLayout::contiguous(&[16, 8, 3, 3], DType::F32);

        let a = SizeArgs::new(&opr, &h0, &src, &diff, &grad).unwrap();
        let b = SizeArgs::new(&opr, &h1, &src, &diff, &grad).unwrap();
        assert_eq!(a.cache_key(), b.cache_key());
    }

    #[test]
    fn cache_key_distinguishes_shapes_and_capability() {
        let opr = opr();
        let h = Handle::new(0, ComputeCapability { major: 8, minor: 6 });
        let h_old = Handle::new(0, ComputeCapability { major: 7, minor: 0 });
        let src = TensorLayout::contiguous(&[2, 8, 16, 16], DType::F32);
        let src_big = TensorLayout::contiguous(&[4, 8, 16, 16], DType::F32);
        let diff = TensorLayout::contiguous(&[2, 16, 16, 16], DType::F32);
        let diff_big = TensorLayout::contiguous(&[4, 16, 16, 16], DType::F32);
        let grad = TensorLayout::contiguous(&[16, 8, 3, 3], DType::F32);

        let a = SizeArgs::new(&opr, &h, &src, &diff, &grad).unwrap();
        let b = SizeArgs::new(&opr, &h, &src_big, &diff_big, &grad).unwrap();
        let c = SizeArgs::new(&opr, &h_old, &src, &diff, &grad).unwrap();
        assert_ne!(a.cache_key(), b.cache_key());
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn batch_mismatch_is_rejected() {
        let opr = opr();
        let h = Handle::new(0, ComputeCapability { major: 8, minor: 6 });
        let src = TensorLayout::contiguous(&[2, 8, 16, 16], DType::F32);
        let diff = TensorLayout::contiguous(&[4, 16, 16, 16], DType::F32);
        let grad = TensorLayout::contiguous(&[16, 8, 3, 3], DType::F32);
        assert!(SizeArgs::new(&opr, &h, &src, &diff, &grad).is_err());
    }
}
