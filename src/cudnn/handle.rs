// cuDNN handle management: one process-wide handle, lazily created.

use std::os::raw::{c_int, c_void};
use std::ptr;
use std::sync::{Arc, Mutex, OnceLock};

use crate::error::{ConvGradError, Result};

// Cached only on success; a failed cudnnCreate is retried on the next call.
static CUDNN_HANDLE: OnceLock<Arc<Mutex<CudnnHandle>>> = OnceLock::new();

#[link(name = "cudnn")]
extern "C" {
    fn cudnnCreate(handle: *mut *mut c_void) -> c_int;
    fn cudnnDestroy(handle: *mut c_void) -> c_int;
}

pub struct CudnnHandle {
    handle: *mut c_void,
}

impl CudnnHandle {
    pub fn new() -> Result<Self> {
        let mut handle: *mut c_void = ptr::null_mut();
        let status = unsafe { cudnnCreate(&mut handle) };
        if status != 0 {
            return Err(ConvGradError::Cudnn(format!(
                "Failed to create cuDNN handle: {}",
                status
            )));
        }
        Ok(CudnnHandle { handle })
    }

    pub fn as_ptr(&self) -> *mut c_void {
        self.handle
    }
}

impl Drop for CudnnHandle {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe {
                cudnnDestroy(self.handle);
            }
        }
    }
}

unsafe impl Send for CudnnHandle {}
unsafe impl Sync for CudnnHandle {}

/// Get or create the global cuDNN handle.
pub fn get_cudnn_handle() -> Result<Arc<Mutex<CudnnHandle>>> {
    if let Some(handle) = CUDNN_HANDLE.get() {
        return Ok(handle.clone());
    }
    let created = Arc::new(Mutex::new(CudnnHandle::new()?));
    // Another thread may have won the race; its handle stays, ours is dropped.
    let _ = CUDNN_HANDLE.set(created);
    CUDNN_HANDLE
        .get()
        .cloned()
        .ok_or_else(|| ConvGradError::Cudnn("cuDNN handle cache empty after init".into()))
}
