//! Convolution parameters, canonized filter metadata and the backward-filter
//! operator that owns them.

use crate::dtype::DType;
use crate::error::{ConvGradError, Result};
use crate::layout::TensorLayout;

/// Raw convolution parameters as the caller specifies them. Already validated
/// by the surrounding operator machinery; this crate only canonizes them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConvParams {
    pub pad_h: usize,
    pub pad_w: usize,
    pub stride_h: usize,
    pub stride_w: usize,
    pub dilate_h: usize,
    pub dilate_w: usize,
    pub groups: usize,
}

impl Default for ConvParams {
    fn default() -> Self {
        Self {
            pad_h: 0,
            pad_w: 0,
            stride_h: 1,
            stride_w: 1,
            dilate_h: 1,
            dilate_w: 1,
            groups: 1,
        }
    }
}

/// Filter metadata normalized from the grad-filter layout plus the operator
/// params. Group-major regardless of whether the caller used a 4D or 5D layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CanonizedFilterMeta {
    pub group: usize,
    /// Output channels per group.
    pub ocpg: usize,
    /// Input channels per group.
    pub icpg: usize,
    /// Kernel spatial extent, [h, w].
    pub spatial: [usize; 2],
    pub padding: [usize; 2],
    pub stride: [usize; 2],
    pub dilation: [usize; 2],
    pub dtype: DType,
}

impl std::fmt::Display for CanonizedFilterMeta {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "g{} {}x{}x{}x{}, pad=[{},{}], stride=[{},{}], dilate=[{},{}]",
            self.group,
            self.ocpg,
            self.icpg,
            self.spatial[0],
            self.spatial[1],
            self.padding[0],
            self.padding[1],
            self.stride[0],
            self.stride[1],
            self.dilation[0],
            self.dilation[1],
        )
    }
}

/// The convolution gradient-with-respect-to-filter operator. Holds the parsed
/// parameters; shape inference and validation live outside this crate.
#[derive(Debug, Clone)]
pub struct ConvolutionBackwardFilter {
    params: ConvParams,
}

impl ConvolutionBackwardFilter {
    pub fn new(params: ConvParams) -> Result<Self> {
        if params.stride_h == 0 || params.stride_w == 0 {
            return Err(ConvGradError::InvalidOperation(
                "convolution stride must be nonzero".into(),
            ));
        }
        if params.dilate_h == 0 || params.dilate_w == 0 {
            return Err(ConvGradError::InvalidOperation(
                "convolution dilation must be nonzero".into(),
            ));
        }
        if params.groups == 0 {
            return Err(ConvGradError::InvalidOperation(
                "convolution group count must be nonzero".into(),
            ));
        }
        Ok(Self { params })
    }

    pub fn param(&self) -> &ConvParams {
        &self.params
    }

    /// Normalize a grad-filter layout into group-major metadata. Accepts the
    /// dense 4D form [oc, icpg, kh, kw] and the grouped 5D form
    /// [g, ocpg, icpg, kh, kw].
    pub fn canonize_filter_meta(&self, grad: &TensorLayout) -> Result<CanonizedFilterMeta> {
        let p = &self.params;
        let dims = grad.dims();
        let (group, ocpg, icpg, kh, kw) = match dims.len() {
            4 => {
                if dims[0] % p.groups != 0 {
                    return Err(ConvGradError::InvalidShape(format!(
                        "output channels {} not divisible by groups {}",
                        dims[0], p.groups
                    )));
                }
                (p.groups, dims[0] / p.groups, dims[1], dims[2], dims[3])
            }
            5 => {
                if dims[0] != p.groups {
                    return Err(ConvGradError::InvalidShape(format!(
                        "grouped filter layout has {} groups, param says {}",
                        dims[0], p.groups
                    )));
                }
                (dims[0], dims[1], dims[2], dims[3], dims[4])
            }
            r => {
                return Err(ConvGradError::InvalidShape(format!(
                    "grad filter layout must be 4D or 5D, got rank {}",
                    r
                )));
            }
        };
        Ok(CanonizedFilterMeta {
            group,
            ocpg,
            icpg,
            spatial: [kh, kw],
            padding: [p.pad_h, p.pad_w],
            stride: [p.stride_h, p.stride_w],
            dilation: [p.dilate_h, p.dilate_w],
            dtype: grad.dtype(),
        })
    }
}
