use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use convgrad_core::{
    AlgoPack, ChanwiseAlgo, ComputeCapability, ConvGradAlgo, ConvGradError, ConvParams,
    ConvolutionBackwardFilter, CudnnAlgo, DType, ExecArgs, FoundSubAlgo, Handle, MatmulAlgo,
    NativeKernels, Result, SizeArgs, TensorLayout, TensorRef, VendorConv, Workspace,
};

/// Vendor double that counts discovery and exec calls.
struct CountingVendor {
    supported: bool,
    workspace: usize,
    finds: AtomicUsize,
    execs: AtomicUsize,
}

impl CountingVendor {
    fn new(supported: bool, workspace: usize) -> Self {
        Self {
            supported,
            workspace,
            finds: AtomicUsize::new(0),
            execs: AtomicUsize::new(0),
        }
    }
}

impl VendorConv for CountingVendor {
    fn supports(&self, _args: &SizeArgs) -> bool {
        self.supported
    }

    fn find_best(&self, _args: &SizeArgs) -> Result<FoundSubAlgo> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(FoundSubAlgo {
            algo: 3,
            workspace_in_bytes: self.workspace,
        })
    }

    fn exec(&self, _args: &ExecArgs, algo: i32) -> Result<()> {
        assert_eq!(algo, 3, "exec must reuse the discovered sub-algorithm");
        self.execs.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Vendor double whose capability depends on the problem, the way the real
/// library rejects some shape classes. Grouped problems are unsupported.
#[derive(Default)]
struct GroupGatedVendor {
    finds: AtomicUsize,
}

impl VendorConv for GroupGatedVendor {
    fn supports(&self, args: &SizeArgs) -> bool {
        args.grad_filter_meta.group == 1
    }

    fn find_best(&self, _args: &SizeArgs) -> Result<FoundSubAlgo> {
        self.finds.fetch_add(1, Ordering::SeqCst);
        Ok(FoundSubAlgo {
            algo: 0,
            workspace_in_bytes: 0,
        })
    }

    fn exec(&self, _args: &ExecArgs, _algo: i32) -> Result<()> {
        Ok(())
    }
}

/// Kernel double that records which entry points ran.
#[derive(Default)]
struct RecordingKernels {
    matmul_calls: AtomicUsize,
    chanwise_calls: AtomicUsize,
}

impl NativeKernels for RecordingKernels {
    fn matmul_filter_grad(&self, _args: &ExecArgs) -> Result<()> {
        self.matmul_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn chanwise_filter_grad(&self, _args: &ExecArgs) -> Result<()> {
        self.chanwise_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Owns every value a `SizeArgs`/`ExecArgs` borrows from.
struct Problem {
    opr: ConvolutionBackwardFilter,
    handle: Handle,
    src: TensorLayout,
    diff: TensorLayout,
    grad: TensorLayout,
}

impl Problem {
    /// 3x3 kernel, pad 1, stride 1, so output spatial == input spatial.
    fn conv3x3(batch: usize, channels: usize, out_channels: usize, groups: usize, hw: usize) -> Self {
        let opr = ConvolutionBackwardFilter::new(ConvParams {
            pad_h: 1,
            pad_w: 1,
            groups,
            ..ConvParams::default()
        })
        .unwrap();
        Self {
            opr,
            handle: Handle::new(0, ComputeCapability { major: 8, minor: 6 }),
            src: TensorLayout::contiguous(&[batch, channels, hw, hw], DType::F32),
            diff: TensorLayout::contiguous(&[batch, out_channels, hw, hw], DType::F32),
            grad: TensorLayout::contiguous(
                &[out_channels, channels / groups, 3, 3],
                DType::F32,
            ),
        }
    }

    fn depthwise(batch: usize, channels: usize, hw: usize) -> Self {
        Self::conv3x3(batch, channels, channels, channels, hw)
    }

    fn args(&self) -> SizeArgs<'_> {
        SizeArgs::new(&self.opr, &self.handle, &self.src, &self.diff, &self.grad).unwrap()
    }

    fn exec_args(&self, workspace: Workspace) -> ExecArgs<'_> {
        ExecArgs::new(
            &self.opr,
            &self.handle,
            TensorRef {
                layout: &self.src,
                ptr: 0x1000,
            },
            TensorRef {
                layout: &self.diff,
                ptr: 0x2000,
            },
            TensorRef {
                layout: &self.grad,
                ptr: 0x3000,
            },
            workspace,
        )
        .unwrap()
    }
}

#[test]
fn budget_predicate_matches_its_components() {
    let matmul = MatmulAlgo::new(Arc::new(RecordingKernels::default()));
    let problem = Problem::conv3x3(2, 8, 16, 1, 16);
    let args = problem.args();
    let ws = matmul.workspace_in_bytes(&args).unwrap();
    // batch * icpg * kh * kw * oh * ow * sizeof(f32)
    assert_eq!(ws, 2 * 8 * 3 * 3 * 16 * 16 * 4);

    for limit in [0, ws - 1, ws, ws + 1, usize::MAX] {
        let expected =
            matmul.is_available(&args) && matmul.workspace_in_bytes(&args).unwrap() <= limit;
        assert_eq!(matmul.is_available_within_budget(&args, limit), expected);
    }
}

#[test]
fn reproducibility_requirement_excludes_nonreproducible_variants() {
    let vendor = Arc::new(CountingVendor::new(true, 128));
    let nondeterministic = CudnnAlgo::new(vendor, false);
    let problem = Problem::conv3x3(2, 8, 16, 1, 16);
    let args = problem.args();

    assert!(nondeterministic.is_available(&args));
    // False for every limit, not just the unconstrained one.
    for limit in [0, 1, 128, usize::MAX] {
        assert!(!nondeterministic.is_available_reproducible(&args, true, limit));
    }
    assert!(nondeterministic.is_available_reproducible(&args, false, usize::MAX));
}

#[test]
fn vendor_availability_tracks_library_capability() {
    let vendor = Arc::new(GroupGatedVendor::default());
    let algo = CudnnAlgo::new(vendor.clone(), true);

    let dense = Problem::conv3x3(2, 8, 16, 1, 16);
    assert!(algo.is_available(&dense.args()));

    // A problem the library rejects is infeasible, not an error, and the
    // budget predicate must not fall through to discovery for it.
    let grouped = Problem::conv3x3(2, 4, 4, 2, 16);
    assert!(!algo.is_available(&grouped.args()));
    assert!(!algo.is_available_within_budget(&grouped.args(), usize::MAX));
    assert_eq!(vendor.finds.load(Ordering::SeqCst), 0);
}

#[test]
fn vendor_workspace_query_is_memoized() {
    let vendor = Arc::new(CountingVendor::new(true, 4096));
    let algo = CudnnAlgo::new(vendor.clone(), true);
    let problem = Problem::conv3x3(2, 8, 16, 1, 16);

    let first = algo.workspace_in_bytes(&problem.args()).unwrap();
    let second = algo.workspace_in_bytes(&problem.args()).unwrap();
    assert_eq!(first, 4096);
    assert_eq!(second, 4096);
    assert_eq!(
        vendor.finds.load(Ordering::SeqCst),
        1,
        "second query for an equal descriptor must not re-run discovery"
    );

    // A different shape is a different key and triggers a fresh discovery.
    let other = Problem::conv3x3(4, 8, 16, 1, 16);
    algo.workspace_in_bytes(&other.args()).unwrap();
    assert_eq!(vendor.finds.load(Ordering::SeqCst), 2);
}

#[test]
fn chanwise_requires_fully_depthwise() {
    let chanwise = ChanwiseAlgo::new(Arc::new(RecordingKernels::default()));

    let grouped = Problem::conv3x3(2, 4, 4, 2, 16);
    assert!(!chanwise.is_available(&grouped.args()));

    let depthwise = Problem::depthwise(2, 4, 16);
    assert!(chanwise.is_available(&depthwise.args()));
}

#[test]
fn matmul_is_always_available() {
    let matmul = MatmulAlgo::new(Arc::new(RecordingKernels::default()));
    for problem in [
        Problem::conv3x3(2, 8, 16, 1, 16),
        Problem::conv3x3(2, 4, 4, 2, 16),
        Problem::depthwise(2, 8, 16),
    ] {
        assert!(matmul.is_available(&problem.args()));
    }
}

#[test]
fn workspace_check_fails_fast_with_both_sizes() {
    let matmul = MatmulAlgo::new(Arc::new(RecordingKernels::default()));
    let problem = Problem::conv3x3(2, 8, 16, 1, 16);
    let args = problem.args();
    let required = matmul.workspace_in_bytes(&args).unwrap();

    // Exactly-sized workspace passes.
    matmul
        .check_workspace(
            &args,
            &Workspace {
                ptr: 0x4000,
                size: required,
            },
        )
        .unwrap();

    let err = matmul
        .check_workspace(
            &args,
            &Workspace {
                ptr: 0x4000,
                size: required - 1,
            },
        )
        .unwrap_err();
    match err {
        ConvGradError::WorkspaceTooSmall {
            algo,
            required: r,
            provided,
        } => {
            assert_eq!(algo, "MATMUL");
            assert_eq!(r, required);
            assert_eq!(provided, required - 1);
        }
        other => panic!("expected WorkspaceTooSmall, got {:?}", other),
    }
}

#[test]
fn depthwise_end_to_end_through_the_pack() {
    let kernels = Arc::new(RecordingKernels::default());
    let pack = AlgoPack::new(Arc::new(CountingVendor::new(false, 0)), kernels.clone());
    let problem = Problem::depthwise(2, 8, 16);

    let native: Vec<&str> = pack.native_algos().iter().map(|a| a.name()).collect();
    assert_eq!(native, ["MATMUL", "CHANNEL_WISE"]);
    for algo in pack.native_algos() {
        assert!(algo.is_available(&problem.args()), "{}", algo.name());
    }

    let required = pack.chanwise.workspace_in_bytes(&problem.args()).unwrap();
    assert_eq!(required, 0);
    let exec = problem.exec_args(Workspace {
        ptr: 0,
        size: required,
    });
    pack.chanwise.exec(&exec).unwrap();
    assert_eq!(kernels.chanwise_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn concurrent_misses_converge_to_one_value() {
    let vendor = Arc::new(CountingVendor::new(true, 8192));
    let algo = Arc::new(CudnnAlgo::new(vendor.clone(), true));
    let problem = Problem::conv3x3(2, 8, 16, 1, 16);

    let results: Vec<usize> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let algo = algo.clone();
                let problem = &problem;
                s.spawn(move || algo.workspace_in_bytes(&problem.args()).unwrap())
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results, [8192, 8192]);
    // Both threads may legitimately run discovery (accepted lost-work race),
    // but a later query must hit the cache.
    let finds = vendor.finds.load(Ordering::SeqCst);
    assert!((1..=2).contains(&finds), "finds = {}", finds);
    algo.workspace_in_bytes(&problem.args()).unwrap();
    assert_eq!(vendor.finds.load(Ordering::SeqCst), finds);
}

#[test]
fn vendor_exec_without_sizing_is_a_usage_error() {
    let vendor = Arc::new(CountingVendor::new(true, 256));
    let algo = CudnnAlgo::new(vendor.clone(), true);
    let problem = Problem::conv3x3(2, 8, 16, 1, 16);

    let exec = problem.exec_args(Workspace {
        ptr: 0x5000,
        size: 256,
    });
    match algo.exec(&exec).unwrap_err() {
        ConvGradError::AlgoNotSized { algo: name, .. } => {
            assert_eq!(name, "CudnnConvolutionBackwardFilter");
        }
        other => panic!("expected AlgoNotSized, got {:?}", other),
    }
    assert_eq!(vendor.execs.load(Ordering::SeqCst), 0);

    // After sizing, exec reuses the cached sub-algorithm.
    algo.workspace_in_bytes(&problem.args()).unwrap();
    algo.exec(&exec).unwrap();
    assert_eq!(vendor.execs.load(Ordering::SeqCst), 1);
    assert_eq!(vendor.finds.load(Ordering::SeqCst), 1);
}

#[test]
fn vendor_exec_rechecks_workspace_against_cached_size() {
    let vendor = Arc::new(CountingVendor::new(true, 1024));
    let algo = CudnnAlgo::new(vendor, true);
    let problem = Problem::conv3x3(2, 8, 16, 1, 16);
    algo.workspace_in_bytes(&problem.args()).unwrap();

    let exec = problem.exec_args(Workspace {
        ptr: 0x5000,
        size: 512,
    });
    match algo.exec(&exec).unwrap_err() {
        ConvGradError::WorkspaceTooSmall {
            required, provided, ..
        } => {
            assert_eq!(required, 1024);
            assert_eq!(provided, 512);
        }
        other => panic!("expected WorkspaceTooSmall, got {:?}", other),
    }
}

#[test]
fn pack_views_partition_the_strategies() {
    let pack = AlgoPack::new(
        Arc::new(CountingVendor::new(true, 0)),
        Arc::new(RecordingKernels::default()),
    );
    assert_eq!(pack.all_algos().len(), 3);
    assert_eq!(pack.vendor_algos().len(), 1);
    assert_eq!(pack.native_algos().len(), 2);
    for algo in pack.vendor_algos() {
        assert!(algo.is_vendor());
    }
    for algo in pack.native_algos() {
        assert!(!algo.is_vendor());
    }
}
