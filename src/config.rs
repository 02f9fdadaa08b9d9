//! Global toggles consulted when the process-wide algorithm pack is built.

use std::sync::atomic::{AtomicBool, Ordering};

static VENDOR_ENABLED: AtomicBool = AtomicBool::new(true);

/// Whether the vendor-backed path is allowed. The env var
/// `CONVGRAD_DISABLE_CUDNN=1` forces it off; otherwise the flag set through
/// [`set_vendor_enabled`] wins.
pub fn vendor_enabled() -> bool {
    if std::env::var("CONVGRAD_DISABLE_CUDNN").ok().as_deref() == Some("1") {
        return false;
    }
    VENDOR_ENABLED.load(Ordering::Relaxed)
}

/// Disable or re-enable the vendor-backed path. Only observed before the
/// global pack is first built; existing packs are not reconstructed.
pub fn set_vendor_enabled(enabled: bool) {
    VENDOR_ENABLED.store(enabled, Ordering::Relaxed);
}
