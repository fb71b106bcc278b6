//! Upload of linked binaries to device memory.

use parking_lot::Mutex;

use prism_core::{PrismError, Result};

/// Shader binaries are placed at this alignment.
pub const SHADER_ALIGNMENT: usize = 256;

/// Location of an uploaded binary in device memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GpuAllocation {
    /// Device address.
    pub address: u64,
    pub size: usize,
}

/// Upload-to-device-memory primitive owned by the device.
pub trait GpuUploader: Send + Sync {
    fn upload(&self, code: &[u8], label: &str) -> Result<GpuAllocation>;
}

/// Host-memory bump allocator standing in for a device heap.
///
/// Uploaded bytes are kept so they can be read back.
pub struct HostUploader {
    base_address: u64,
    capacity: Option<usize>,
    heap: Mutex<Vec<u8>>,
}

impl HostUploader {
    /// Default base address of the emulated shader heap.
    pub const DEFAULT_BASE: u64 = 0x1_0000_0000;

    #[must_use]
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            base_address: Self::DEFAULT_BASE,
            capacity,
            heap: Mutex::new(Vec::new()),
        }
    }

    /// Bytes in use, including alignment padding.
    #[must_use]
    pub fn used(&self) -> usize {
        self.heap.lock().len()
    }

    /// Copy of the bytes behind `allocation`.
    #[must_use]
    pub fn read(&self, allocation: &GpuAllocation) -> Option<Vec<u8>> {
        let start = usize::try_from(allocation.address.checked_sub(self.base_address)?).ok()?;
        let heap = self.heap.lock();
        heap.get(start..start + allocation.size).map(<[u8]>::to_vec)
    }
}

impl GpuUploader for HostUploader {
    fn upload(&self, code: &[u8], label: &str) -> Result<GpuAllocation> {
        let mut heap = self.heap.lock();
        let offset = heap.len().next_multiple_of(SHADER_ALIGNMENT);
        let end = offset + code.len();
        if self.capacity.is_some_and(|cap| end > cap) {
            return Err(PrismError::allocation(format!("shader binary '{label}'"), code.len()));
        }
        heap.resize(offset, 0);
        heap.extend_from_slice(code);
        log::trace!("Uploaded '{label}' ({} bytes) at +{offset:#x}", code.len());
        Ok(GpuAllocation {
            address: self.base_address + offset as u64,
            size: code.len(),
        })
    }
}
