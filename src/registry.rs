//! Process-wide catalogue of backward-filter strategies.

use std::sync::{Arc, OnceLock};

use crate::algo::ConvGradAlgo;
use crate::chanwise::ChanwiseAlgo;
use crate::config;
use crate::kernels::{CudaKernels, NativeKernels};
use crate::matmul::MatmulAlgo;
use crate::vendor::{CudnnAlgo, VendorConv, VendorDisabled};

/// One instance of every strategy plus three fixed enumeration views.
/// Construction order fixes iteration order; callers may treat it as a
/// priority for first-feasible-wins selection, the pack itself imposes none.
pub struct AlgoPack {
    pub cudnn: Arc<CudnnAlgo>,
    pub matmul: Arc<MatmulAlgo>,
    pub chanwise: Arc<ChanwiseAlgo>,
    all_algos: Vec<Arc<dyn ConvGradAlgo>>,
    vendor_algos: Vec<Arc<dyn ConvGradAlgo>>,
    native_algos: Vec<Arc<dyn ConvGradAlgo>>,
}

impl AlgoPack {
    /// Build a pack over explicit backends. The global pack uses the default
    /// backends; embedders and tests inject their own.
    pub fn new(vendor: Arc<dyn VendorConv>, kernels: Arc<dyn NativeKernels>) -> Self {
        let cudnn = Arc::new(CudnnAlgo::new(vendor, true));
        let matmul = Arc::new(MatmulAlgo::new(kernels.clone()));
        let chanwise = Arc::new(ChanwiseAlgo::new(kernels));

        let all_algos: Vec<Arc<dyn ConvGradAlgo>> =
            vec![cudnn.clone(), matmul.clone(), chanwise.clone()];
        let vendor_algos: Vec<Arc<dyn ConvGradAlgo>> = vec![cudnn.clone()];
        let native_algos: Vec<Arc<dyn ConvGradAlgo>> = vec![matmul.clone(), chanwise.clone()];

        Self {
            cudnn,
            matmul,
            chanwise,
            all_algos,
            vendor_algos,
            native_algos,
        }
    }

    /// The process-wide pack, built once on first use.
    pub fn global() -> &'static AlgoPack {
        static PACK: OnceLock<AlgoPack> = OnceLock::new();
        PACK.get_or_init(|| {
            let vendor: Arc<dyn VendorConv> = if config::vendor_enabled() {
                default_vendor()
            } else {
                Arc::new(VendorDisabled)
            };
            AlgoPack::new(vendor, Arc::new(CudaKernels::new()))
        })
    }

    pub fn all_algos(&self) -> &[Arc<dyn ConvGradAlgo>] {
        &self.all_algos
    }

    pub fn vendor_algos(&self) -> &[Arc<dyn ConvGradAlgo>] {
        &self.vendor_algos
    }

    pub fn native_algos(&self) -> &[Arc<dyn ConvGradAlgo>] {
        &self.native_algos
    }
}

#[cfg(feature = "cudnn")]
fn default_vendor() -> Arc<dyn VendorConv> {
    Arc::new(crate::cudnn::CudnnRuntime::new())
}

#[cfg(not(feature = "cudnn"))]
fn default_vendor() -> Arc<dyn VendorConv> {
    Arc::new(VendorDisabled)
}
