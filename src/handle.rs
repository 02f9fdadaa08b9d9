//! Device/context binding a problem descriptor is resolved against.

use crate::error::Result;

/// SM capability class of a device. Algorithm caches key on this rather than
/// the handle identity, so two handles on same-generation devices share entries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComputeCapability {
    pub major: u32,
    pub minor: u32,
}

impl std::fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sm_{}{}", self.major, self.minor)
    }
}

/// Lightweight binding to one CUDA device. The handle does not own the device
/// context; it carries the ordinal and the capability class used for cache keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handle {
    ordinal: i32,
    capability: ComputeCapability,
}

impl Handle {
    pub fn new(ordinal: i32, capability: ComputeCapability) -> Self {
        Self {
            ordinal,
            capability,
        }
    }

    /// Bind to a live device and query its capability through the driver.
    pub fn for_device(ordinal: i32) -> Result<Self> {
        use cudarc::driver::sys::CUdevice_attribute;

        let device = cudarc::driver::CudaDevice::new(ordinal as usize)?;
        let major =
            device.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MAJOR)?;
        let minor =
            device.attribute(CUdevice_attribute::CU_DEVICE_ATTRIBUTE_COMPUTE_CAPABILITY_MINOR)?;
        Ok(Self::new(
            ordinal,
            ComputeCapability {
                major: major as u32,
                minor: minor as u32,
            },
        ))
    }

    pub fn ordinal(&self) -> i32 {
        self.ordinal
    }

    pub fn capability(&self) -> ComputeCapability {
        self.capability
    }
}
