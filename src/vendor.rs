//! Vendor-backed strategy: delegates feasibility, sub-algorithm choice and
//! execution to cuDNN through the [`VendorConv`] seam, memoizing the expensive
//! discovery per canonical descriptor key.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::algo::ConvGradAlgo;
use crate::algo_log;
use crate::args::{AlgoCacheKey, ExecArgs, SizeArgs};
use crate::error::{ConvGradError, Result};

/// Result of one discovery call: the library's preferred sub-algorithm and the
/// scratch bytes it needs for this problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FoundSubAlgo {
    pub algo: i32,
    pub workspace_in_bytes: usize,
}

/// Outbound boundary to the vendor math library.
pub trait VendorConv: Send + Sync {
    /// Cheap capability probe: does any sub-algorithm exist for these shapes
    /// and dtypes? Must not allocate device memory or launch kernels.
    fn supports(&self, args: &SizeArgs) -> bool;

    /// Expensive discovery: benchmark/heuristic query selecting the fastest
    /// supported sub-algorithm. May transiently allocate device memory and
    /// launch kernels; the caller memoizes the result.
    fn find_best(&self, args: &SizeArgs) -> Result<FoundSubAlgo>;

    /// Dispatch the compute call with a previously discovered sub-algorithm.
    fn exec(&self, args: &ExecArgs, algo: i32) -> Result<()>;
}

/// Stand-in used when the crate is built without the `cudnn` feature or the
/// vendor path is disabled at runtime. Reports nothing as supported.
pub struct VendorDisabled;

impl VendorConv for VendorDisabled {
    fn supports(&self, _args: &SizeArgs) -> bool {
        false
    }

    fn find_best(&self, _args: &SizeArgs) -> Result<FoundSubAlgo> {
        Err(ConvGradError::Cudnn("cuDNN support not available".into()))
    }

    fn exec(&self, _args: &ExecArgs, _algo: i32) -> Result<()> {
        Err(ConvGradError::Cudnn("cuDNN support not available".into()))
    }
}

/// The cuDNN-backed variant. Owns two append-only caches keyed by the
/// canonical descriptor key: best sub-algorithm and its workspace bytes.
///
/// Concurrent misses for the same key are not deduplicated: both threads run
/// discovery and race to insert. That is a lost-work race, not a correctness
/// bug; both converge to equivalent entries.
pub struct CudnnAlgo {
    lib: Arc<dyn VendorConv>,
    reproducible: bool,
    algo_cache: Mutex<HashMap<AlgoCacheKey, i32>>,
    ws_cache: Mutex<HashMap<AlgoCacheKey, usize>>,
}

impl CudnnAlgo {
    pub fn new(lib: Arc<dyn VendorConv>, reproducible: bool) -> Self {
        Self {
            lib,
            reproducible,
            algo_cache: Mutex::new(HashMap::new()),
            ws_cache: Mutex::new(HashMap::new()),
        }
    }

    fn lock_poisoned() -> ConvGradError {
        ConvGradError::InvalidOperation("cudnn algo cache mutex poisoned".into())
    }
}

impl ConvGradAlgo for CudnnAlgo {
    fn name(&self) -> &'static str {
        "CudnnConvolutionBackwardFilter"
    }

    fn is_available(&self, args: &SizeArgs) -> bool {
        self.lib.supports(args)
    }

    fn workspace_in_bytes(&self, args: &SizeArgs) -> Result<usize> {
        let key = args.cache_key();
        {
            let cache = self.ws_cache.lock().map_err(|_| Self::lock_poisoned())?;
            if let Some(&bytes) = cache.get(&key) {
                return Ok(bytes);
            }
        }
        // Miss: run discovery outside the locks, then insert into both caches.
        let found = self.lib.find_best(args)?;
        algo_log!(
            "{}: picked sub-algo {} ({} workspace bytes) for {}",
            self.name(),
            found.algo,
            found.workspace_in_bytes,
            args
        );
        self.algo_cache
            .lock()
            .map_err(|_| Self::lock_poisoned())?
            .insert(key.clone(), found.algo);
        self.ws_cache
            .lock()
            .map_err(|_| Self::lock_poisoned())?
            .insert(key, found.workspace_in_bytes);
        Ok(found.workspace_in_bytes)
    }

    fn exec(&self, args: &ExecArgs) -> Result<()> {
        let key = args.cache_key();
        let algo = {
            let cache = self.algo_cache.lock().map_err(|_| Self::lock_poisoned())?;
            cache.get(&key).copied()
        };
        // Sizing must have happened for an equal descriptor; discovery is
        // never run from the exec path.
        let algo = algo.ok_or_else(|| ConvGradError::AlgoNotSized {
            algo: self.name(),
            args: args.size.to_string(),
        })?;
        self.check_workspace(&args.size, &args.workspace)?;
        self.lib.exec(args, algo)
    }

    fn is_reproducible(&self) -> bool {
        self.reproducible
    }

    fn is_vendor(&self) -> bool {
        true
    }
}
